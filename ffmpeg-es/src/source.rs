use crate::{
    config::PixelFormat,
    error::{EncodeError, Result},
    frame::Frame,
};

/// Anything that hands out raw frames one at a time: a camera, a file reader, a generator.
pub trait FrameSource {
    /// Produces the frame for presentation index `index`. `Ok(None)` means the source has
    /// nothing more to give.
    fn next_frame(&mut self, index: i64) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self, index: i64) -> Result<Option<Frame>> {
        (**self).next_frame(index)
    }
}

/// Default palette, BGR order.
pub const PATTERN_COLORS: [[u8; 3]; 2] = [[0, 0, 255], [255, 128, 0]];

/// Synthetic BGR24 source of solid frames, cycling through a palette one colour per frame.
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u32,
    height: u32,
    padding: usize,
    colors: Vec<[u8; 3]>,
    limit: Option<u64>,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            padding: 0,
            colors: PATTERN_COLORS.to_vec(),
            limit: None,
        }
    }

    /// Extra bytes at the end of every row.
    pub fn with_row_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_colors(mut self, colors: Vec<[u8; 3]>) -> Self {
        if !colors.is_empty() {
            self.colors = colors;
        }
        self
    }

    /// Stops producing frames after `limit` of them.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn color_for(&self, index: i64) -> [u8; 3] {
        self.colors[index.rem_euclid(self.colors.len() as i64) as usize]
    }
}

impl FrameSource for TestPattern {
    fn next_frame(&mut self, index: i64) -> Result<Option<Frame>> {
        if self.limit.is_some_and(|limit| index >= limit as i64) {
            return Ok(None);
        }
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::invalid_frame(format!(
                "test pattern size {}x{}",
                self.width, self.height
            )));
        }
        let row = PixelFormat::Bgr24.row_bytes(0, self.width);
        let stride = row + self.padding;
        let color = self.color_for(index);
        let mut data = vec![0u8; stride * self.height as usize];
        for line in data.chunks_mut(stride) {
            for px in line[..row].chunks_exact_mut(3) {
                px.copy_from_slice(&color);
            }
        }
        Frame::packed(self.width, self.height, PixelFormat::Bgr24, data, stride, index).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternates_colors() {
        let mut source = TestPattern::new(4, 2);
        let a = source.next_frame(0).unwrap().unwrap();
        let b = source.next_frame(1).unwrap().unwrap();
        let c = source.next_frame(2).unwrap().unwrap();
        assert_eq!(&a.row(0, 1).unwrap()[..3], &PATTERN_COLORS[0]);
        assert_eq!(&b.row(0, 0).unwrap()[9..], &PATTERN_COLORS[1]);
        assert_eq!(a.row(0, 0), c.row(0, 0));
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn padding_widens_stride_only() {
        let mut source = TestPattern::new(5, 3).with_row_padding(17);
        let frame = source.next_frame(0).unwrap().unwrap();
        assert_eq!(frame.planes()[0].stride, 32);
        assert_eq!(frame.row(0, 2).unwrap().len(), 15);
        assert_eq!(frame.planes()[0].data[15], 0);
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = TestPattern::new(0, 4).next_frame(0).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidFrame(_)));
        assert!(TestPattern::new(4, 0).next_frame(0).is_err());
    }

    #[test]
    fn limit_ends_source() {
        let mut source = TestPattern::new(2, 2).with_limit(1);
        assert!(source.next_frame(0).unwrap().is_some());
        assert!(source.next_frame(1).unwrap().is_none());
    }
}
