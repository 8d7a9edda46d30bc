use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EncodeError>;

/// Every failure the encoding pipeline can report. Each kind belongs to a single
/// component, see [`EncodeError::component`].
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("codec unavailable: {0}")]
    CodecUnavailable(String),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("could not open codec {codec}: {source}")]
    CodecOpenFailure {
        codec: String,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("encode failure at frame {index}: {source}")]
    EncodeFailure {
        index: i64,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("bitstream writer already finalized")]
    WriterClosed,

    #[error("could not open output {}: {source}", path.display())]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sink write failed: {0}")]
    SinkWrite(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("{operation} not allowed while encoder is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("conversion failure: {0}")]
    ConversionFailure(#[source] ffmpeg_next::Error),

    #[error("capture failure: {0}")]
    Capture(String),
}

impl EncodeError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Name of the component that raised the error.
    pub fn component(&self) -> &'static str {
        match self {
            Self::CodecUnavailable(_)
            | Self::AllocationFailure(_)
            | Self::CodecOpenFailure { .. }
            | Self::EncodeFailure { .. }
            | Self::InvalidState { .. } => "encoder",
            Self::WriterClosed | Self::SinkUnavailable { .. } | Self::SinkWrite(_) => "writer",
            Self::InvalidConfig(_) => "config",
            Self::InvalidFrame(_) => "frame",
            Self::ConversionFailure(_) => "converter",
            Self::Capture(_) => "source",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_attributed_to_components() {
        assert_eq!(EncodeError::CodecUnavailable("x".into()).component(), "encoder");
        assert_eq!(EncodeError::WriterClosed.component(), "writer");
        assert_eq!(EncodeError::invalid_config("x").component(), "config");
        assert_eq!(
            EncodeError::ConversionFailure(ffmpeg_next::Error::Bug).component(),
            "converter"
        );
        assert_eq!(EncodeError::capture("gone").component(), "source");
    }

    #[test]
    fn sink_unavailable_names_path() {
        let err = EncodeError::SinkUnavailable {
            path: PathBuf::from("/nope/out.mpg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nope/out.mpg"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn invalid_state_display() {
        let err = EncodeError::InvalidState {
            operation: "submit_frame",
            state: "closed",
        };
        assert_eq!(
            err.to_string(),
            "submit_frame not allowed while encoder is closed"
        );
    }

    #[test]
    fn io_errors_convert_to_sink_write() {
        let err = EncodeError::from(std::io::Error::other("disk full"));
        assert!(matches!(err, EncodeError::SinkWrite(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
