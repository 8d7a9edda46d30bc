use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ffmpeg_next::{
    format::Pixel,
    frame::Video,
    software::scaling::{Context, flag::Flags},
};

use crate::{
    config::PixelFormat,
    error::{EncodeError, Result},
    frame::{Frame, alloc_video},
};

/// Resampling filter used for every conversion.
pub const SCALE_FILTER: Flags = Flags::BICUBIC;

/// Parameters a conversion context is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleKey {
    pub src_width: u32,
    pub src_height: u32,
    pub src_format: Pixel,
    pub dst_width: u32,
    pub dst_height: u32,
    pub dst_format: Pixel,
    pub filter: Flags,
}

impl ScaleKey {
    fn is_identity(&self) -> bool {
        self.src_width == self.dst_width
            && self.src_height == self.dst_height
            && self.src_format == self.dst_format
    }
}

struct Scaler {
    key: ScaleKey,
    context: Context,
}

impl Scaler {
    fn new(key: ScaleKey) -> Result<Self> {
        let context = Context::get(
            key.src_format,
            key.src_width,
            key.src_height,
            key.dst_format,
            key.dst_width,
            key.dst_height,
            key.filter,
        )
        .map_err(EncodeError::ConversionFailure)?;
        Ok(Self { key, context })
    }

    fn run(&mut self, frame: &Video, dst: &mut Video) -> Result<()> {
        self.context
            .run(frame, dst)
            .map_err(EncodeError::ConversionFailure)
    }
}

/// Resizes and reformats frames. Holds at most one conversion context: it is reused while
/// the parameters stay the same and rebuilt (the old one dropped first) when they change.
#[derive(Default)]
pub struct ColorConverter {
    scaler: Option<Scaler>,
    builds: usize,
    build_counter: Option<Arc<AtomicUsize>>,
}

impl ColorConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`ColorConverter::new`], but every context build also increments `counter`.
    pub fn with_build_counter(counter: Arc<AtomicUsize>) -> Self {
        Self {
            build_counter: Some(counter),
            ..Self::default()
        }
    }

    /// Number of conversion contexts built so far.
    pub fn context_builds(&self) -> usize {
        self.builds
    }

    pub fn current_key(&self) -> Option<ScaleKey> {
        self.scaler.as_ref().map(|s| s.key)
    }

    /// Converts `frame` to `width`x`height` in `format`. The input is left untouched and the
    /// presentation index carries over.
    pub fn convert(
        &mut self,
        frame: &Frame,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Frame> {
        if frame.width() == width && frame.height() == height && frame.format() == format {
            return Ok(frame.clone());
        }
        let src = frame.to_video()?;
        let converted = self.scale_video(&src, width, height, format.to_pixel())?;
        Frame::from_video(&converted, frame.index())
    }

    /// Converts an ffmpeg frame. Used directly by capture sources, which already hold
    /// decoded ffmpeg frames.
    pub(crate) fn scale_video(
        &mut self,
        src: &Video,
        width: u32,
        height: u32,
        format: Pixel,
    ) -> Result<Video> {
        let key = ScaleKey {
            src_width: src.width(),
            src_height: src.height(),
            src_format: src.format(),
            dst_width: width,
            dst_height: height,
            dst_format: format,
            filter: SCALE_FILTER,
        };
        if key.is_identity() {
            return Ok(src.clone());
        }
        let scaler = self.scaler_for(key)?;
        let mut dst = alloc_video(format, width, height)?;
        scaler.run(src, &mut dst)?;
        dst.set_pts(src.pts());
        Ok(dst)
    }

    fn scaler_for(&mut self, key: ScaleKey) -> Result<&mut Scaler> {
        if self.current_key() != Some(key) {
            if let Some(old) = self.scaler.take() {
                log::debug!("conversion parameters changed from {:?}, rebuilding", old.key);
                drop(old);
            }
            let scaler = Scaler::new(key)?;
            self.builds += 1;
            if let Some(counter) = &self.build_counter {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            log::debug!("built conversion context {:?}", key);
            self.scaler = Some(scaler);
        }
        self.scaler
            .as_mut()
            .ok_or_else(|| EncodeError::ConversionFailure(ffmpeg_next::Error::Bug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgr_frame(width: u32, height: u32, stride: usize, bgr: [u8; 3], index: i64) -> Frame {
        let mut data = vec![0u8; stride * height as usize];
        for row in data.chunks_mut(stride) {
            for px in row[..width as usize * 3].chunks_mut(3) {
                px.copy_from_slice(&bgr);
            }
        }
        Frame::packed(width, height, PixelFormat::Bgr24, data, stride, index).unwrap()
    }

    #[test]
    fn unchanged_parameters_reuse_context() {
        ffmpeg_next::init().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut converter = ColorConverter::with_build_counter(counter.clone());

        let a = bgr_frame(320, 240, 960, [0, 0, 255], 0);
        let b = bgr_frame(320, 240, 960, [255, 0, 0], 1);
        let out_a = converter.convert(&a, 160, 120, PixelFormat::Yuv420p).unwrap();
        let out_b = converter.convert(&b, 160, 120, PixelFormat::Yuv420p).unwrap();

        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert_eq!(converter.context_builds(), 1);
        assert_eq!(out_a.index(), 0);
        assert_eq!(out_b.index(), 1);
        assert_eq!((out_b.width(), out_b.height()), (160, 120));
        assert_eq!(out_b.format(), PixelFormat::Yuv420p);
    }

    #[test]
    fn changed_parameters_rebuild_context() {
        ffmpeg_next::init().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut converter = ColorConverter::with_build_counter(counter.clone());

        let small = bgr_frame(64, 48, 192, [10, 20, 30], 0);
        let large = bgr_frame(128, 96, 384, [10, 20, 30], 1);
        converter.convert(&small, 64, 48, PixelFormat::Yuv420p).unwrap();
        converter.convert(&large, 64, 48, PixelFormat::Yuv420p).unwrap();
        converter.convert(&large, 64, 48, PixelFormat::Yuv420p).unwrap();
        converter.convert(&large, 64, 48, PixelFormat::Nv12).unwrap();

        assert_eq!(counter.load(Ordering::Relaxed), 3);
        let key = converter.current_key().unwrap();
        assert_eq!(key.src_width, 128);
        assert_eq!(key.dst_format, Pixel::NV12);
        assert_eq!(key.filter, SCALE_FILTER);
    }

    #[test]
    fn padded_source_rows_are_honoured() {
        ffmpeg_next::init().unwrap();
        let mut converter = ColorConverter::new();
        // Same picture, once tightly packed and once with 40 bytes of row padding.
        let tight = bgr_frame(64, 32, 192, [40, 80, 200], 0);
        let padded = bgr_frame(64, 32, 232, [40, 80, 200], 0);
        let a = converter.convert(&tight, 32, 16, PixelFormat::Yuv420p).unwrap();
        let b = converter.convert(&padded, 32, 16, PixelFormat::Yuv420p).unwrap();
        for plane in 0..3 {
            for row in 0..PixelFormat::Yuv420p.plane_rows(plane, 16) {
                assert_eq!(a.row(plane, row), b.row(plane, row));
            }
        }
    }

    #[test]
    fn matching_frame_passes_through() {
        ffmpeg_next::init().unwrap();
        let mut converter = ColorConverter::new();
        let frame = bgr_frame(16, 16, 48, [1, 2, 3], 5);
        let out = converter.convert(&frame, 16, 16, PixelFormat::Bgr24).unwrap();
        assert_eq!(converter.context_builds(), 0);
        assert_eq!(out.row(0, 3), frame.row(0, 3));
    }

    #[test]
    fn solid_colour_survives_conversion() {
        ffmpeg_next::init().unwrap();
        let mut converter = ColorConverter::new();
        let white = bgr_frame(32, 32, 96, [255, 255, 255], 0);
        let out = converter.convert(&white, 32, 32, PixelFormat::Gray).unwrap();
        let row = out.row(0, 16).unwrap();
        assert!(row.iter().all(|&y| y > 200), "{:?}", row);
    }
}
