use std::collections::VecDeque;

use ffmpeg_next::{Dictionary, codec::packet::Packet, frame::Video};

use crate::{
    config::EncoderConfig,
    error::{EncodeError, Result},
    frame::{Frame, alloc_video},
    packet::EncodedPacket,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Uninitialized,
    Open,
    Flushing,
    Closed,
}

impl EncoderState {
    pub fn name(&self) -> &'static str {
        match self {
            EncoderState::Uninitialized => "uninitialized",
            EncoderState::Open => "open",
            EncoderState::Flushing => "flushing",
            EncoderState::Closed => "closed",
        }
    }
}

/// Codec state and the working picture buffer, alive between `open` and `close`.
struct Session {
    codec: ffmpeg_next::codec::encoder::Video,
    picture: Video,
    codec_name: String,
}

impl Session {
    fn open(config: &EncoderConfig) -> Result<Self> {
        let codec = config
            .codec
            .find_encoder()
            .ok_or_else(|| EncodeError::CodecUnavailable(config.codec.to_string()))?;
        if codec.medium() != ffmpeg_next::media::Type::Video {
            return Err(EncodeError::CodecUnavailable(format!(
                "{} is not a video encoder",
                codec.name()
            )));
        }
        let codec_name = codec.name().to_string();
        log::info!("using encoder {} for codec {}", codec_name, config.codec);

        let context = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut encoder = context.encoder().video().map_err(|source| {
            EncodeError::CodecOpenFailure {
                codec: codec_name.clone(),
                source,
            }
        })?;
        encoder.set_bit_rate(config.bitrate as usize);
        encoder.set_width(config.width);
        encoder.set_height(config.height);
        encoder.set_time_base(config.frame_rate.time_base());
        encoder.set_frame_rate(Some(config.frame_rate.to_rational()));
        encoder.set_gop(config.gop_size);
        encoder.set_max_b_frames(config.max_b_frames as usize);
        encoder.set_format(config.pixel_format.to_pixel());

        let mut opts = Dictionary::new();
        if let Some(preset) = config.effective_preset() {
            opts.set("preset", preset);
        }
        let codec = encoder
            .open_with(opts)
            .map_err(|source| EncodeError::CodecOpenFailure {
                codec: codec_name.clone(),
                source,
            })?;

        let picture = alloc_video(config.pixel_format.to_pixel(), config.width, config.height)?;
        log::info!(
            "encoder {} opened: {}x{} {:?} @ {} fps, gop {}, max b-frames {}, luma stride {}",
            codec_name,
            config.width,
            config.height,
            config.pixel_format,
            config.frame_rate,
            config.gop_size,
            config.max_b_frames,
            picture.stride(0)
        );

        Ok(Self {
            codec,
            picture,
            codec_name,
        })
    }

    /// Pulls one packet; `None` when the codec needs more input or is fully drained.
    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>> {
        let mut packet = Packet::empty();
        match self.codec.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(EncodedPacket::from(&packet))),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(source) => Err(EncodeError::EncodeFailure { index: -1, source }),
        }
    }
}

/// Stateful wrapper around one codec instance: `open`, `submit_frame`, `drain`, `close`.
///
/// The codec may hold frames back for B-frame lookahead, so a submitted frame does not
/// necessarily produce a packet right away; whatever it holds comes out of [`Encoder::drain`].
pub struct Encoder {
    config: EncoderConfig,
    state: EncoderState,
    session: Option<Session>,
    pending: VecDeque<EncodedPacket>,
    frames_submitted: u64,
    packets_emitted: u64,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            state: EncoderState::Uninitialized,
            session: None,
            pending: VecDeque::new(),
            frames_submitted: 0,
            packets_emitted: 0,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn packets_emitted(&self) -> u64 {
        self.packets_emitted
    }

    /// True while codec state and the working buffer are allocated.
    pub fn is_allocated(&self) -> bool {
        self.session.is_some()
    }

    pub fn codec_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.codec_name.as_str())
    }

    /// Finds and opens the configured codec and allocates the working picture buffer.
    /// On failure nothing stays allocated and the state remains `Uninitialized`.
    pub fn open(&mut self) -> Result<()> {
        self.expect_state(EncoderState::Uninitialized, "open")?;
        self.config.validate()?;
        self.session = Some(Session::open(&self.config)?);
        self.state = EncoderState::Open;
        Ok(())
    }

    /// Hands `frame` to the codec with `index` as its timestamp. The frame must already be
    /// in the configured size and pixel format.
    pub fn submit_frame(&mut self, frame: &Frame, index: i64) -> Result<Option<EncodedPacket>> {
        self.expect_state(EncoderState::Open, "submit_frame")?;
        if frame.width() != self.config.width
            || frame.height() != self.config.height
            || frame.format() != self.config.pixel_format
        {
            return Err(EncodeError::invalid_frame(format!(
                "encoder expects {}x{} {:?}, got {}x{} {:?}",
                self.config.width,
                self.config.height,
                self.config.pixel_format,
                frame.width(),
                frame.height(),
                frame.format()
            )));
        }
        let session = self.session.as_mut().ok_or(EncodeError::InvalidState {
            operation: "submit_frame",
            state: "unallocated",
        })?;

        // The codec may still reference the previous picture for lookahead.
        let ret = unsafe { ffmpeg_next::ffi::av_frame_make_writable(session.picture.as_mut_ptr()) };
        if ret < 0 {
            return Err(EncodeError::AllocationFailure(format!(
                "working picture for frame {}: {}",
                index,
                ffmpeg_next::Error::from(ret)
            )));
        }
        frame.copy_into(&mut session.picture)?;
        session.picture.set_pts(Some(index));
        session
            .codec
            .send_frame(&session.picture)
            .map_err(|source| EncodeError::EncodeFailure { index, source })?;
        self.frames_submitted += 1;

        while let Some(packet) = session.receive_packet().map_err(|e| match e {
            EncodeError::EncodeFailure { source, .. } => EncodeError::EncodeFailure { index, source },
            other => other,
        })? {
            self.pending.push_back(packet);
        }
        Ok(self.next_pending())
    }

    /// Signals end of input and returns the packets the codec still holds. Moves the encoder
    /// to `Flushing`; draining twice yields nothing the second time.
    pub fn drain(&mut self) -> Result<Drain<'_>> {
        match self.state {
            EncoderState::Open => {
                let session = self.session.as_mut().ok_or(EncodeError::InvalidState {
                    operation: "drain",
                    state: "unallocated",
                })?;
                session
                    .codec
                    .send_eof()
                    .map_err(|source| EncodeError::EncodeFailure { index: -1, source })?;
                self.state = EncoderState::Flushing;
                log::info!(
                    "draining encoder after {} frames, {} packets so far",
                    self.frames_submitted,
                    self.packets_emitted
                );
                Ok(Drain {
                    encoder: self,
                    finished: false,
                })
            }
            EncoderState::Flushing => Ok(Drain {
                encoder: self,
                finished: true,
            }),
            state => Err(EncodeError::InvalidState {
                operation: "drain",
                state: state.name(),
            }),
        }
    }

    /// Releases codec state and the working buffer. Safe to call in any state, any number
    /// of times.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            log::info!(
                "closing encoder {}: {} frames in, {} packets out",
                session.codec_name,
                self.frames_submitted,
                self.packets_emitted
            );
            drop(session);
        }
        if !self.pending.is_empty() {
            log::warn!("discarding {} undelivered packets", self.pending.len());
            self.pending.clear();
        }
        self.state = EncoderState::Closed;
    }

    fn next_pending(&mut self) -> Option<EncodedPacket> {
        let packet = self.pending.pop_front()?;
        self.packets_emitted += 1;
        Some(packet)
    }

    fn expect_state(&self, expected: EncoderState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(EncodeError::InvalidState {
                operation,
                state: self.state.name(),
            });
        }
        Ok(())
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Packets released by [`Encoder::drain`]: first those already queued, then whatever the
/// codec flushes. Finite and not restartable.
pub struct Drain<'a> {
    encoder: &'a mut Encoder,
    finished: bool,
}

impl Iterator for Drain<'_> {
    type Item = Result<EncodedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(packet) = self.encoder.next_pending() {
            return Some(Ok(packet));
        }
        let received = match self.encoder.session.as_mut() {
            Some(session) => session.receive_packet(),
            None => Ok(None),
        };
        match received {
            Ok(Some(packet)) => {
                self.encoder.packets_emitted += 1;
                Some(Ok(packet))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
