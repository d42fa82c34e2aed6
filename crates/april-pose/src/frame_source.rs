//! Frame sources feeding the [`Processor`](crate::Processor).
//!
//! Camera and video backends live outside this crate and implement
//! [`FrameSource`]. The sources here cover the cases that need no device:
//! no frames at all, a single still image, and an in-memory sequence.

use std::collections::VecDeque;
use std::io;
use std::path::Path;

use image::RgbImage;

/// Produces colour frames on demand.
pub trait FrameSource {
    /// Read the next frame.
    ///
    /// `fresh` asks the source to discard any buffered frames first so the
    /// returned image is as recent as possible. Sources without a buffer
    /// ignore it.
    fn read(&mut self, fresh: bool) -> io::Result<RgbImage>;

    /// Release the underlying device. Must be safe to call more than once.
    fn close(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self, fresh: bool) -> io::Result<RgbImage> {
        (**self).read(fresh)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// A source that never produces frames.
///
/// Lets a processor be built before any camera is available; frames can
/// still be passed in directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFrameSource;

impl FrameSource for NoFrameSource {
    fn read(&mut self, _fresh: bool) -> io::Result<RgbImage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "this frame source does not produce any frames",
        ))
    }
}

/// Returns the same image on every read.
#[derive(Clone, Debug)]
pub struct ImageSource {
    frame: RgbImage,
}

impl ImageSource {
    pub fn new(frame: RgbImage) -> Self {
        Self { frame }
    }

    /// Load the image from disk once.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        Ok(Self::new(image::open(path)?.to_rgb8()))
    }
}

impl FrameSource for ImageSource {
    fn read(&mut self, _fresh: bool) -> io::Result<RgbImage> {
        Ok(self.frame.clone())
    }
}

/// Plays back a list of frames in order, then fails.
#[derive(Clone, Debug, Default)]
pub struct FrameSequence {
    frames: VecDeque<RgbImage>,
}

impl FrameSequence {
    pub fn new(frames: impl IntoIterator<Item = RgbImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push(&mut self, frame: RgbImage) {
        self.frames.push_back(frame);
    }

    /// Frames not yet read.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for FrameSequence {
    fn read(&mut self, _fresh: bool) -> io::Result<RgbImage> {
        self.frames.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "frame sequence exhausted")
        })
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}
