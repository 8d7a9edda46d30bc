use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::{Dictionary, format::Pixel, frame::Video};

use crate::{
    error::{EncodeError, Result},
    frame::Frame,
    scaler::ColorConverter,
    source::FrameSource,
};

/// Reads frames from a capture device (e.g. `v4l2` on `/dev/video0`) or a media file and
/// hands them out as packed BGR24 at their native size.
pub struct CaptureSource {
    input: ffmpeg_next::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg_next::codec::decoder::Video,
    converter: ColorConverter,
    eof_sent: bool,
    exhausted: bool,
}

impl CaptureSource {
    /// Resolve input format by name (e.g. "x11grab", "v4l2") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| EncodeError::capture(format!("invalid format name {:?}: {}", name, e)))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(EncodeError::capture(format!("input format not found: {}", name)));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    pub fn open(url: &str, format: Option<&str>, options: Option<Dictionary>) -> Result<Self> {
        use ffmpeg_next::format::format::Format;

        let path = Path::new(url);
        let opened = match format {
            Some(fmt_name) => {
                let fmt = Self::find_input_format(fmt_name)?;
                ffmpeg_next::format::open_with(path, &Format::Input(fmt), options.unwrap_or_default())
                    .map(|ctx| ctx.input())
            }
            None => match options {
                Some(opts) => ffmpeg_next::format::input_with_dictionary(path, opts),
                None => ffmpeg_next::format::input(path),
            },
        };
        let input = opened.map_err(|e| EncodeError::capture(format!("open {}: {}", url, e)))?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| EncodeError::capture(format!("no video stream in {}", url)))?;
        let stream_index = stream.index();
        let decoder = ffmpeg_next::codec::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| EncodeError::capture(format!("video decoder for {}: {}", url, e)))?;
        if decoder.format() == Pixel::None || decoder.width() == 0 || decoder.height() == 0 {
            return Err(EncodeError::capture("missing codec parameters"));
        }
        log::info!(
            "capture {} opened: stream {}, {}x{} {:?}",
            url,
            stream_index,
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            converter: ColorConverter::new(),
            eof_sent: false,
            exhausted: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    fn receive_frame(&mut self) -> Result<Option<Video>> {
        let mut frame = Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg_next::Error::Eof) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(e) => Err(EncodeError::capture(format!("decode: {}", e))),
        }
    }

    /// Feeds the decoder until it yields a picture or the input runs dry.
    fn decode_next(&mut self) -> Result<Option<Video>> {
        loop {
            if let Some(frame) = self.receive_frame()? {
                return Ok(Some(frame));
            }
            if self.exhausted {
                return Ok(None);
            }
            if self.eof_sent {
                // Decoder asked for more input after EOF; nothing more will come.
                self.exhausted = true;
                return Ok(None);
            }
            let next = self.input.packets().next();
            match next {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| EncodeError::capture(format!("send packet: {}", e)))?;
                }
                None => {
                    log::info!("end of capture input");
                    self.decoder
                        .send_eof()
                        .map_err(|e| EncodeError::capture(format!("send eof: {}", e)))?;
                    self.eof_sent = true;
                }
            }
        }
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self, index: i64) -> Result<Option<Frame>> {
        let Some(decoded) = self.decode_next()? else {
            return Ok(None);
        };
        let bgr = self
            .converter
            .scale_video(&decoded, decoded.width(), decoded.height(), Pixel::BGR24)?;
        Frame::from_video(&bgr, index).map(Some)
    }
}
