use std::fmt::{Display, Formatter};

use bytes::Bytes;
use ffmpeg_next::frame::Video;

use crate::{
    config::PixelFormat,
    error::{EncodeError, Result},
};

/// One plane of pixel data. `stride` is the distance in bytes between the starts of two
/// consecutive rows and may exceed the meaningful row width.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Bytes,
    pub stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, stride: usize) -> Self {
        Self {
            data: data.into(),
            stride,
        }
    }
}

/// A raw picture tagged with its presentation index.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
    index: i64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: Vec<Plane>,
        index: i64,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EncodeError::invalid_frame(format!(
                "invalid video size {}x{}",
                width, height
            )));
        }
        if planes.len() != format.planes() {
            return Err(EncodeError::invalid_frame(format!(
                "{:?} needs {} planes, got {}",
                format,
                format.planes(),
                planes.len()
            )));
        }
        for (i, plane) in planes.iter().enumerate() {
            let row = format.row_bytes(i, width);
            let rows = format.plane_rows(i, height);
            if plane.stride < row {
                return Err(EncodeError::invalid_frame(format!(
                    "plane {} stride {} shorter than row width {}",
                    i, plane.stride, row
                )));
            }
            let needed = plane.stride * (rows - 1) + row;
            if plane.data.len() < needed {
                return Err(EncodeError::invalid_frame(format!(
                    "plane {} holds {} bytes, {}x{} {:?} needs {}",
                    i,
                    plane.data.len(),
                    width,
                    height,
                    format,
                    needed
                )));
            }
        }
        Ok(Self {
            width,
            height,
            format,
            planes,
            index,
        })
    }

    /// Single-plane frame, e.g. packed BGR24 straight from a camera.
    pub fn packed(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
        stride: usize,
        index: i64,
    ) -> Result<Self> {
        Self::new(width, height, format, vec![Plane::new(data, stride)], index)
    }

    /// Copies an ffmpeg frame into an owned `Frame`.
    pub fn from_video(video: &Video, index: i64) -> Result<Self> {
        let format = PixelFormat::from_pixel(video.format()).ok_or_else(|| {
            EncodeError::invalid_frame(format!("unsupported pixel format {:?}", video.format()))
        })?;
        let planes = (0..format.planes())
            .map(|i| Plane::new(Bytes::copy_from_slice(video.data(i)), video.stride(i)))
            .collect();
        Self::new(video.width(), video.height(), format, planes, index)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Row `row` of `plane`, without stride padding.
    pub fn row(&self, plane: usize, row: usize) -> Option<&[u8]> {
        let p = self.planes.get(plane)?;
        if row >= self.format.plane_rows(plane, self.height) {
            return None;
        }
        let start = row * p.stride;
        p.data.get(start..start + self.format.row_bytes(plane, self.width))
    }

    /// Copies the pixels into `dst`, row by row, honouring both strides.
    pub fn copy_into(&self, dst: &mut Video) -> Result<()> {
        if dst.width() != self.width
            || dst.height() != self.height
            || dst.format() != self.format.to_pixel()
        {
            return Err(EncodeError::invalid_frame(format!(
                "frame {}x{} {:?} does not match buffer {}x{} {:?}",
                self.width,
                self.height,
                self.format,
                dst.width(),
                dst.height(),
                dst.format()
            )));
        }
        for (i, plane) in self.planes.iter().enumerate() {
            let row = self.format.row_bytes(i, self.width);
            let rows = self.format.plane_rows(i, self.height);
            let dst_stride = dst.stride(i);
            let dst_data = dst.data_mut(i);
            for r in 0..rows {
                let src = &plane.data[r * plane.stride..r * plane.stride + row];
                dst_data[r * dst_stride..r * dst_stride + row].copy_from_slice(src);
            }
        }
        Ok(())
    }

    /// Allocates an ffmpeg frame of the same geometry and copies the pixels into it.
    pub fn to_video(&self) -> Result<Video> {
        let mut video = alloc_video(self.format.to_pixel(), self.width, self.height)?;
        self.copy_into(&mut video)?;
        video.set_pts(Some(self.index));
        Ok(video)
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame index: {}, width: {}, height: {}, format: {:?}, planes: {}",
            self.index,
            self.width,
            self.height,
            self.format,
            self.planes.len()
        )
    }
}

/// Allocates a picture buffer with aligned (padded) strides.
pub(crate) fn alloc_video(
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
) -> Result<Video> {
    let video = Video::new(format, width, height);
    let allocated = unsafe { !(*video.as_ptr()).data[0].is_null() };
    if !allocated {
        return Err(EncodeError::AllocationFailure(format!(
            "raw picture buffer {}x{} {:?}",
            width, height, format
        )));
    }
    Ok(video)
}
