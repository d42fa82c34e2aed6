//! Marker overlays drawn onto frames.
//!
//! Drawing goes through `embedded-graphics`: [`RgbCanvas`] and [`LumaCanvas`]
//! adapt `image` buffers to a `DrawTarget<Color = Rgb888>`, so the same
//! primitives land on both halves of a [`Frame`]. Greyscale buffers receive
//! the luma of the requested colour.

use std::convert::Infallible;

use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10, FONT_8X13};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Polyline, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::core::{Marker, PixelCoordinates};
use crate::frame::Frame;
use crate::helpers::normalise_marker_text;

const OUTLINE: Rgb888 = Rgb888::new(0, 255, 0);
const ORIGIN: Rgb888 = Rgb888::new(255, 0, 0);
const LABEL: Rgb888 = Rgb888::new(0, 191, 255);

/// Half the side of the square marking a marker's origin corner.
const ORIGIN_HALF_SIDE: i32 = 3;

/// Draws marker outlines, origin corners and id labels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotator {
    /// Markers were built with the marker-facing convention; the origin
    /// corner is index 1 instead of index 3.
    pub aruco_orientation: bool,
    pub line_thickness: u32,
    /// Multiplier on the automatic label scale.
    pub text_scale: f64,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            aruco_orientation: false,
            line_thickness: 2,
            text_scale: 1.0,
        }
    }
}

impl Annotator {
    pub fn new(aruco_orientation: bool) -> Self {
        Self {
            aruco_orientation,
            ..Self::default()
        }
    }

    /// The corner treated as the marker's top-left in its own frame.
    pub fn origin_corner(&self, marker: &Marker) -> PixelCoordinates {
        let idx = if self.aruco_orientation { 1 } else { 3 };
        marker.pixel_corners()[idx]
    }

    /// Draw every marker onto both the colour and greyscale images.
    pub fn annotate(&self, frame: &mut Frame, markers: &[Marker]) {
        for marker in markers {
            let Ok(()) = self.draw_marker(&mut RgbCanvas::new(&mut frame.colour), marker);
            let Ok(()) = self.draw_marker(&mut LumaCanvas::new(&mut frame.grey), marker);
        }
    }

    fn draw_marker<D>(&self, target: &mut D, marker: &Marker) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        let corners = marker.pixel_corners().map(to_point);
        let outline = [corners[0], corners[1], corners[2], corners[3], corners[0]];
        Polyline::new(&outline)
            .into_styled(PrimitiveStyle::with_stroke(OUTLINE, self.line_thickness))
            .draw(target)?;

        let origin = to_point(self.origin_corner(marker));
        let offset = Point::new(ORIGIN_HALF_SIDE, ORIGIN_HALF_SIDE);
        Rectangle::with_corners(origin - offset, origin + offset)
            .into_styled(PrimitiveStyle::with_stroke(ORIGIN, self.line_thickness))
            .draw(target)?;

        let scale = self.text_scale * normalise_marker_text(marker);
        let centre = marker.pixel_centre();
        let position = Point::new(
            (centre.x - 40.0 * scale) as i32,
            (centre.y + 10.0 * scale) as i32,
        );
        draw_label(target, &format!("id={}", marker.id()), position, scale, LABEL)
    }
}

/// Draw arbitrary text onto both images of a frame.
///
/// `location` is the bottom-left corner of the text. A `text_scale` of 1
/// gives glyphs roughly 22 px tall.
pub fn annotate_text(
    frame: &mut Frame,
    text: &str,
    location: (i32, i32),
    text_scale: f64,
    colour: Rgb<u8>,
) {
    let colour = Rgb888::new(colour[0], colour[1], colour[2]);
    let position = Point::new(location.0, location.1);
    let Ok(()) = draw_label(
        &mut RgbCanvas::new(&mut frame.colour),
        text,
        position,
        text_scale,
        colour,
    );
    let Ok(()) = draw_label(
        &mut LumaCanvas::new(&mut frame.grey),
        text,
        position,
        text_scale,
        colour,
    );
}

fn to_point(p: PixelCoordinates) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

/// Pick a bitmap font and integer magnification for a text scale.
fn label_font(scale: f64) -> (&'static MonoFont<'static>, u32) {
    let height = 22.0 * scale;
    if height >= 20.0 {
        (&FONT_10X20, ((height / 20.0).round() as u32).max(1))
    } else if height >= 13.0 {
        (&FONT_8X13, 1)
    } else {
        (&FONT_6X10, 1)
    }
}

fn draw_label<D>(
    target: &mut D,
    text: &str,
    position: Point,
    scale: f64,
    colour: Rgb888,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let (font, factor) = label_font(scale);
    let style = MonoTextStyle::new(font, colour);
    let mut scaled = Scaled {
        inner: target,
        origin: position,
        factor,
    };
    Text::with_baseline(text, Point::zero(), style, Baseline::Bottom).draw(&mut scaled)?;
    Ok(())
}

/// Magnifies everything drawn on it by an integer factor about `origin`.
struct Scaled<'a, D> {
    inner: &'a mut D,
    origin: Point,
    factor: u32,
}

impl<D: DrawTarget> Dimensions for Scaled<'_, D> {
    fn bounding_box(&self) -> Rectangle {
        let bb = self.inner.bounding_box();
        Rectangle::new(
            Point::zero(),
            Size::new(bb.size.width / self.factor, bb.size.height / self.factor),
        )
    }
}

impl<D: DrawTarget> DrawTarget for Scaled<'_, D> {
    type Color = D::Color;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let side = Size::new(self.factor, self.factor);
        for Pixel(p, colour) in pixels {
            let top_left = self.origin + p * self.factor as i32;
            self.inner.fill_solid(&Rectangle::new(top_left, side), colour)?;
        }
        Ok(())
    }
}

/// `DrawTarget` over an RGB image; pixels outside the image are dropped.
pub struct RgbCanvas<'a> {
    image: &'a mut RgbImage,
}

impl<'a> RgbCanvas<'a> {
    pub fn new(image: &'a mut RgbImage) -> Self {
        Self { image }
    }
}

impl OriginDimensions for RgbCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for RgbCanvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (w, h) = self.image.dimensions();
        for Pixel(p, c) in pixels {
            if let Some((x, y)) = in_bounds(p, w, h) {
                self.image.put_pixel(x, y, Rgb([c.r(), c.g(), c.b()]));
            }
        }
        Ok(())
    }
}

/// `DrawTarget` over a greyscale image, writing the luma of each colour.
pub struct LumaCanvas<'a> {
    image: &'a mut GrayImage,
}

impl<'a> LumaCanvas<'a> {
    pub fn new(image: &'a mut GrayImage) -> Self {
        Self { image }
    }
}

impl OriginDimensions for LumaCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for LumaCanvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (w, h) = self.image.dimensions();
        for Pixel(p, c) in pixels {
            if let Some((x, y)) = in_bounds(p, w, h) {
                self.image.put_pixel(x, y, Luma([luma(c)]));
            }
        }
        Ok(())
    }
}

fn in_bounds(p: Point, w: u32, h: u32) -> Option<(u32, u32)> {
    let x = u32::try_from(p.x).ok()?;
    let y = u32::try_from(p.y).ok()?;
    (x < w && y < h).then_some((x, y))
}

/// Rec. 709 luma, matching `image::imageops::grayscale`.
fn luma(c: Rgb888) -> u8 {
    let l = 2126 * u32::from(c.r()) + 7152 * u32::from(c.g()) + 722 * u32::from(c.b());
    (l / 10_000) as u8
}
