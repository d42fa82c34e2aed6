//! Captured frames.
//!
//! A [`Frame`] pairs the colour image from the source with the greyscale
//! copy handed to the detector.

use std::path::Path;

use image::{GrayImage, RgbImage};

/// A captured image in colour and the greyscale copy used for detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub grey: GrayImage,
    pub colour: RgbImage,
}

impl Frame {
    /// Build a frame from a colour image, deriving the greyscale copy.
    pub fn from_colour(colour: RgbImage) -> Self {
        let grey = image::imageops::grayscale(&colour);
        Self { grey, colour }
    }

    /// Build a frame from a greyscale image; the colour copy is grey too.
    pub fn from_grey(grey: GrayImage) -> Self {
        let colour = image::DynamicImage::ImageLuma8(grey.clone()).to_rgb8();
        Self { grey, colour }
    }

    /// Load an image file into a frame.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        let colour = image::open(path)?.to_rgb8();
        Ok(Self::from_colour(colour))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.colour.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.colour.height()
    }
}
