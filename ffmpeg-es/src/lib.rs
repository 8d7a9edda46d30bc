/// Registers FFmpeg components (codecs, formats, devices). Call once at startup before
/// opening capture devices like v4l2.
pub fn init() -> Result<()> {
    ffmpeg_next::init().map_err(|e| EncodeError::capture(format!("ffmpeg_next init: {}", e)))
}

pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod input;
pub mod packet;
pub mod pipeline;
pub mod scaler;
pub mod source;
pub mod task;
pub mod writer;


pub use config::{Codec, EncoderConfig, FrameRate, PixelFormat};
pub use encoder::{Drain, Encoder, EncoderState};
pub use error::{EncodeError, Result};
pub use frame::{Frame, Plane};
pub use input::CaptureSource;
pub use packet::EncodedPacket;
pub use pipeline::{PipelineController, RunSummary};
pub use scaler::ColorConverter;
pub use source::{FrameSource, TestPattern};
pub use task::EncodeTask;
pub use writer::{BitstreamWriter, STREAM_TERMINATOR};
