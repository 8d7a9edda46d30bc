use std::{
    fmt::{Display, Formatter},
    path::Path,
    str::FromStr,
};

use ffmpeg_next::{Rational, format::Pixel};
use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, Result};

/// Pixel layouts understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar 4:2:0, three planes.
    Yuv420p,
    Yuv422p,
    Yuv444p,
    /// Luma plane + interleaved chroma plane, 4:2:0.
    Nv12,
    /// Packed 4:2:2.
    Yuyv422,
    Rgb24,
    Bgr24,
    Rgba,
    Bgra,
    Gray,
}

impl PixelFormat {
    pub fn planes(&self) -> usize {
        match self {
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => 3,
            PixelFormat::Nv12 => 2,
            _ => 1,
        }
    }

    /// Meaningful bytes in one row of `plane` for a picture `width` pixels wide.
    /// Rows in a buffer may be longer (stride padding).
    pub fn row_bytes(&self, plane: usize, width: u32) -> usize {
        let w = width as usize;
        let half = w.div_ceil(2);
        match (self, plane) {
            (PixelFormat::Yuv420p | PixelFormat::Yuv422p, 0) => w,
            (PixelFormat::Yuv420p | PixelFormat::Yuv422p, _) => half,
            (PixelFormat::Yuv444p, _) => w,
            (PixelFormat::Nv12, 0) => w,
            (PixelFormat::Nv12, _) => half * 2,
            (PixelFormat::Yuyv422, _) => half * 4,
            (PixelFormat::Rgb24 | PixelFormat::Bgr24, _) => w * 3,
            (PixelFormat::Rgba | PixelFormat::Bgra, _) => w * 4,
            (PixelFormat::Gray, _) => w,
        }
    }

    /// Number of rows in `plane` for a picture `height` pixels tall.
    pub fn plane_rows(&self, plane: usize, height: u32) -> usize {
        let h = height as usize;
        match (self, plane) {
            (PixelFormat::Yuv420p | PixelFormat::Nv12, p) if p > 0 => h.div_ceil(2),
            _ => h,
        }
    }

    /// True if chroma is subsampled horizontally or vertically, which requires even
    /// encoder dimensions.
    pub fn is_subsampled(&self) -> bool {
        matches!(
            self,
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Nv12 | PixelFormat::Yuyv422
        )
    }

    pub fn to_pixel(self) -> Pixel {
        match self {
            PixelFormat::Yuv420p => Pixel::YUV420P,
            PixelFormat::Yuv422p => Pixel::YUV422P,
            PixelFormat::Yuv444p => Pixel::YUV444P,
            PixelFormat::Nv12 => Pixel::NV12,
            PixelFormat::Yuyv422 => Pixel::YUYV422,
            PixelFormat::Rgb24 => Pixel::RGB24,
            PixelFormat::Bgr24 => Pixel::BGR24,
            PixelFormat::Rgba => Pixel::RGBA,
            PixelFormat::Bgra => Pixel::BGRA,
            PixelFormat::Gray => Pixel::GRAY8,
        }
    }

    pub fn from_pixel(pixel: Pixel) -> Option<Self> {
        let format = match pixel {
            Pixel::YUV420P => PixelFormat::Yuv420p,
            Pixel::YUV422P => PixelFormat::Yuv422p,
            Pixel::YUV444P => PixelFormat::Yuv444p,
            Pixel::NV12 => PixelFormat::Nv12,
            Pixel::YUYV422 => PixelFormat::Yuyv422,
            Pixel::RGB24 => PixelFormat::Rgb24,
            Pixel::BGR24 => PixelFormat::Bgr24,
            Pixel::RGBA => PixelFormat::Rgba,
            Pixel::BGRA => PixelFormat::Bgra,
            Pixel::GRAY8 => PixelFormat::Gray,
            _ => return None,
        };
        Some(format)
    }
}

/// Codec selection. Well-known identifiers resolve through the codec id, anything else
/// is treated as the name of a specific encoder implementation (e.g. "libx264").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Codec {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4,
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
    Encoder(String),
}

impl Codec {
    pub fn id(&self) -> Option<ffmpeg_next::codec::Id> {
        use ffmpeg_next::codec::Id;
        match self {
            Codec::Mpeg1Video => Some(Id::MPEG1VIDEO),
            Codec::Mpeg2Video => Some(Id::MPEG2VIDEO),
            Codec::Mpeg4 => Some(Id::MPEG4),
            Codec::H264 => Some(Id::H264),
            Codec::Hevc => Some(Id::HEVC),
            Codec::Vp8 => Some(Id::VP8),
            Codec::Vp9 => Some(Id::VP9),
            Codec::Av1 => Some(Id::AV1),
            Codec::Encoder(_) => None,
        }
    }

    /// Preset applied when the config leaves it unset.
    pub fn default_preset(&self) -> Option<&'static str> {
        match self {
            Codec::H264 => Some("slow"),
            _ => None,
        }
    }

    /// Finds a registered encoder for this codec.
    pub fn find_encoder(&self) -> Option<ffmpeg_next::Codec> {
        match self {
            Codec::Encoder(name) => ffmpeg_next::encoder::find_by_name(name),
            other => other.id().and_then(ffmpeg_next::encoder::find),
        }
    }
}

impl FromStr for Codec {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self> {
        let codec = match s.trim().to_ascii_lowercase().as_str() {
            "" => return Err(EncodeError::invalid_config("empty codec identifier")),
            "mpeg1video" | "mpeg1" => Codec::Mpeg1Video,
            "mpeg2video" | "mpeg2" => Codec::Mpeg2Video,
            "mpeg4" => Codec::Mpeg4,
            "h264" => Codec::H264,
            "hevc" | "h265" => Codec::Hevc,
            "vp8" => Codec::Vp8,
            "vp9" => Codec::Vp9,
            "av1" => Codec::Av1,
            _ => Codec::Encoder(s.trim().to_string()),
        };
        Ok(codec)
    }
}

impl TryFrom<String> for Codec {
    type Error = EncodeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Codec> for String {
    fn from(value: Codec) -> Self {
        value.to_string()
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Codec::Mpeg1Video => "mpeg1video",
            Codec::Mpeg2Video => "mpeg2video",
            Codec::Mpeg4 => "mpeg4",
            Codec::H264 => "h264",
            Codec::Hevc => "hevc",
            Codec::Vp8 => "vp8",
            Codec::Vp9 => "vp9",
            Codec::Av1 => "av1",
            Codec::Encoder(name) => name,
        };
        f.write_str(name)
    }
}

/// Frames per second as `num/den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: i32,
    pub den: i32,
}

impl FrameRate {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn to_rational(self) -> Rational {
        Rational::new(self.num, self.den)
    }

    /// One tick per frame: presentation indices are used directly as timestamps.
    pub fn time_base(self) -> Rational {
        Rational::new(self.den, self.num)
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// bits/sec
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Distance between intra frames.
    pub gop_size: u32,
    pub max_b_frames: u32,
    pub pixel_format: PixelFormat,
    pub codec: Codec,
    pub preset: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate: 6_400_000,
            width: 640,
            height: 480,
            frame_rate: FrameRate::new(25, 1),
            gop_size: 10,
            max_b_frames: 1,
            pixel_format: PixelFormat::Yuv420p,
            codec: Codec::Mpeg1Video,
            preset: None,
        }
    }
}

impl EncoderConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            EncodeError::invalid_config(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_json_slice(&data)
    }

    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| EncodeError::invalid_config(format!("parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_frame_rate(mut self, num: i32, den: i32) -> Self {
        self.frame_rate = FrameRate::new(num, den);
        self
    }

    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    pub fn with_max_b_frames(mut self, max_b_frames: u32) -> Self {
        self.max_b_frames = max_b_frames;
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Preset handed to the codec, if any.
    pub fn effective_preset(&self) -> Option<&str> {
        self.preset
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.codec.default_preset())
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::invalid_config(format!(
                "width/height must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.pixel_format.is_subsampled()
            && (!self.width.is_multiple_of(2) || !self.height.is_multiple_of(2))
        {
            return Err(EncodeError::invalid_config(format!(
                "width/height must be even for {:?}, got {}x{}",
                self.pixel_format, self.width, self.height
            )));
        }
        if self.frame_rate.num <= 0 || self.frame_rate.den <= 0 {
            return Err(EncodeError::invalid_config(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.gop_size == 0 {
            return Err(EncodeError::invalid_config("gop size must be non-zero"));
        }
        if self.bitrate == 0 {
            return Err(EncodeError::invalid_config("bitrate must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let config = EncoderConfig::default();
        assert_eq!(config.bitrate, 6_400_000);
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.frame_rate, FrameRate::new(25, 1));
        assert_eq!(config.gop_size, 10);
        assert_eq!(config.max_b_frames, 1);
        assert_eq!(config.pixel_format, PixelFormat::Yuv420p);
        assert_eq!(config.codec, Codec::Mpeg1Video);
        assert!(config.preset.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_catches_bad_values() {
        let base = EncoderConfig::default();
        assert!(base.clone().with_size(0, 480).validate().is_err());
        assert!(base.clone().with_size(641, 480).validate().is_err());
        assert!(
            base.clone()
                .with_size(641, 481)
                .with_pixel_format(PixelFormat::Rgb24)
                .validate()
                .is_ok()
        );
        assert!(base.clone().with_frame_rate(0, 1).validate().is_err());
        assert!(base.clone().with_frame_rate(25, -1).validate().is_err());
        assert!(base.clone().with_gop_size(0).validate().is_err());
        assert!(base.with_bitrate(0).validate().is_err());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let json = br#"{ "width": 320, "height": 240, "codec": "h264", "pixel_format": "nv12" }"#;
        let config = EncoderConfig::from_json_slice(json).unwrap();
        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.codec, Codec::H264);
        assert_eq!(config.pixel_format, PixelFormat::Nv12);
        assert_eq!(config.gop_size, 10);
        assert_eq!(config.frame_rate, FrameRate::new(25, 1));
    }

    #[test]
    fn json_rejects_invalid_config() {
        let json = br#"{ "width": 0 }"#;
        let err = EncoderConfig::from_json_slice(json).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidConfig(_)));
    }

    #[test]
    fn codec_identifiers() {
        assert_eq!("mpeg1video".parse::<Codec>().unwrap(), Codec::Mpeg1Video);
        assert_eq!("H265".parse::<Codec>().unwrap(), Codec::Hevc);
        assert_eq!(
            "libx264".parse::<Codec>().unwrap(),
            Codec::Encoder("libx264".to_string())
        );
        assert!("  ".parse::<Codec>().is_err());
        assert_eq!(Codec::Mpeg2Video.to_string(), "mpeg2video");
    }

    #[test]
    fn codec_serializes_as_string() {
        let config = EncoderConfig::default().with_codec(Codec::Encoder("libx264".into()));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["codec"], "libx264");
        assert_eq!(json["pixel_format"], "yuv420p");
    }

    #[test]
    fn h264_defaults_to_slow_preset() {
        let config = EncoderConfig::default().with_codec(Codec::H264);
        assert_eq!(config.effective_preset(), Some("slow"));
        let config = config.with_preset("veryfast");
        assert_eq!(config.effective_preset(), Some("veryfast"));
        assert_eq!(EncoderConfig::default().effective_preset(), None);
    }

    #[test]
    fn plane_geometry() {
        let f = PixelFormat::Yuv420p;
        assert_eq!(f.planes(), 3);
        assert_eq!(f.row_bytes(0, 641), 641);
        assert_eq!(f.row_bytes(1, 641), 321);
        assert_eq!(f.plane_rows(2, 481), 241);
        assert_eq!(PixelFormat::Bgr24.row_bytes(0, 10), 30);
        assert_eq!(PixelFormat::Nv12.row_bytes(1, 10), 10);
        assert_eq!(PixelFormat::Yuyv422.row_bytes(0, 10), 20);
        assert_eq!(PixelFormat::Yuv422p.plane_rows(1, 10), 10);
    }

    #[test]
    fn pixel_round_trip_for_supported_formats() {
        for f in [PixelFormat::Yuv420p, PixelFormat::Bgr24, PixelFormat::Gray] {
            assert_eq!(PixelFormat::from_pixel(f.to_pixel()), Some(f));
        }
        assert_eq!(PixelFormat::from_pixel(Pixel::YUVJ422P), None);
    }
}
