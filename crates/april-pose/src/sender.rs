//! Publishes JPEG-encoded frames from the detection hook.
//!
//! [`FrameSender::hook`] returns a closure for
//! [`Processor::set_detection_hook`](crate::Processor::set_detection_hook).
//! Every call copies the frame, optionally annotates the copy, encodes it and
//! hands the payload to a publish callback under `camera/annotated` or
//! `camera/image`. The payload defaults to a base64 JPEG data URI
//! (`data:image/jpeg;base64, ...`). Failures are logged and never reach the
//! detection loop.

use std::error::Error;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::annotate::Annotator;
use crate::core::Marker;
use crate::frame::Frame;

pub const TOPIC_ANNOTATED: &str = "camera/annotated";
pub const TOPIC_RAW: &str = "camera/image";
pub const DATA_URI_PREFIX: &[u8] = b"data:image/jpeg;base64, ";

pub type PublishResult = Result<(), Box<dyn Error + Send + Sync>>;
type PublishFn = dyn Fn(&str, &[u8]) -> PublishResult + Send + Sync;

/// Wire format handed to the publish callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Payload {
    /// [`DATA_URI_PREFIX`] followed by the base64 encoded JPEG.
    #[default]
    DataUri,
    /// The JPEG bytes as encoded.
    Jpeg,
}

#[derive(thiserror::Error, Debug)]
pub enum SenderError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("publishing to {topic} failed: {source}")]
    Publish {
        topic: &'static str,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Encodes frames and passes them to a publish callback.
///
/// The callback may run on several background threads at once when
/// threaded sending is enabled.
#[derive(Clone)]
pub struct FrameSender {
    publish: Arc<PublishFn>,
    annotator: Annotator,
    annotated: bool,
    threaded: bool,
    payload: Payload,
}

impl FrameSender {
    /// Annotated, threaded sender using the marker-facing origin corner.
    pub fn new(publish: impl Fn(&str, &[u8]) -> PublishResult + Send + Sync + 'static) -> Self {
        Self {
            publish: Arc::new(publish),
            annotator: Annotator::new(true),
            annotated: true,
            threaded: true,
            payload: Payload::default(),
        }
    }

    pub fn annotated(mut self, annotated: bool) -> Self {
        self.annotated = annotated;
        self
    }

    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn topic(&self) -> &'static str {
        if self.annotated {
            TOPIC_ANNOTATED
        } else {
            TOPIC_RAW
        }
    }

    /// Detection hook forwarding every frame to [`FrameSender::send`].
    pub fn hook(&self) -> impl FnMut(&Frame, &[Marker]) + Send + 'static {
        let sender = self.clone();
        move |frame: &Frame, markers: &[Marker]| {
            sender.send(frame, markers);
        }
    }

    /// Copy, annotate and publish a frame.
    ///
    /// Returns the worker handle when sending in the background.
    pub fn send(&self, frame: &Frame, markers: &[Marker]) -> Option<JoinHandle<()>> {
        let mut copy = frame.clone();
        if self.annotated {
            self.annotator.annotate(&mut copy, markers);
        }
        let colour = copy.colour;

        if !self.threaded {
            self.send_logged(&colour);
            return None;
        }

        let sender = self.clone();
        match thread::Builder::new()
            .name("image send".to_owned())
            .spawn(move || sender.send_logged(&colour))
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("failed to start image send thread: {e}");
                None
            }
        }
    }

    fn send_logged(&self, colour: &RgbImage) {
        if let Err(e) = self.encode_and_send(colour) {
            log::warn!("{e}");
        }
    }

    /// Encode an image and publish it on this sender's topic.
    pub fn encode_and_send(&self, colour: &RgbImage) -> Result<(), SenderError> {
        let jpeg = encode_jpeg(colour)?;
        let bytes = match self.payload {
            Payload::DataUri => data_uri(&jpeg),
            Payload::Jpeg => jpeg,
        };
        let topic = self.topic();
        (self.publish)(topic, &bytes).map_err(|source| SenderError::Publish { topic, source })
    }
}

/// Encode an RGB image as JPEG.
pub fn encode_jpeg(colour: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    JpegEncoder::new(&mut bytes).encode_image(colour)?;
    Ok(bytes)
}

/// Wrap JPEG bytes in a base64 data URI.
pub fn data_uri(jpeg: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DATA_URI_PREFIX.len() + jpeg.len().div_ceil(3) * 4);
    out.extend_from_slice(DATA_URI_PREFIX);
    out.extend_from_slice(STANDARD.encode(jpeg).as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Sent = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

    fn recorder() -> (Sent, impl Fn(&str, &[u8]) -> PublishResult + Send + Sync + 'static) {
        let sent: Sent = Arc::default();
        let sink = Arc::clone(&sent);
        let publish = move |topic: &str, bytes: &[u8]| -> PublishResult {
            sink.lock()
                .map_err(|_| "poisoned")?
                .push((topic.to_owned(), bytes.to_vec()));
            Ok(())
        };
        (sent, publish)
    }

    fn frame() -> Frame {
        Frame::from_colour(RgbImage::new(32, 24))
    }

    #[test]
    fn inline_send_publishes_data_uri_on_annotated_topic() {
        let (sent, publish) = recorder();
        let sender = FrameSender::new(publish).threaded(false);
        assert!(sender.send(&frame(), &[]).is_none());

        let sent = sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, TOPIC_ANNOTATED);

        let payload = &sent[0].1;
        assert!(payload.starts_with(b"data:image/jpeg;base64, "));
        let jpeg = STANDARD
            .decode(&payload[DATA_URI_PREFIX.len()..])
            .expect("valid base64");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).expect("decodable jpeg");
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn jpeg_payload_skips_base64() {
        let (sent, publish) = recorder();
        let sender = FrameSender::new(publish)
            .threaded(false)
            .payload(Payload::Jpeg);
        sender.send(&frame(), &[]);

        let sent = sent.lock().expect("lock");
        assert_eq!(&sent[0].1[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn threaded_send_uses_raw_topic_when_not_annotating() {
        let (sent, publish) = recorder();
        let sender = FrameSender::new(publish).annotated(false);
        let handle = sender.send(&frame(), &[]).expect("worker");
        handle.join().expect("join");

        let sent = sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, TOPIC_RAW);
    }

    #[test]
    fn publish_errors_are_swallowed() {
        let sender = FrameSender::new(|_: &str, _: &[u8]| -> PublishResult {
            Err("broker offline".into())
        })
        .threaded(false);
        sender.send(&frame(), &[]);

        let err = sender
            .encode_and_send(&RgbImage::new(4, 4))
            .expect_err("publish fails");
        assert!(err.to_string().contains("camera/annotated"));
    }

    #[test]
    fn hook_leaves_the_callers_frame_untouched() {
        let (sent, publish) = recorder();
        let sender = FrameSender::new(publish).threaded(false);
        let mut hook = sender.hook();
        let original = frame();
        hook(&original, &[]);
        assert_eq!(original, frame());
        assert_eq!(sent.lock().expect("lock").len(), 1);
    }
}
