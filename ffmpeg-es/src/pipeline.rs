use std::{io::Write, path::Path};

use tokio_util::sync::CancellationToken;

use crate::{
    config::EncoderConfig,
    encoder::Encoder,
    error::Result,
    packet::EncodedPacket,
    scaler::ColorConverter,
    source::FrameSource,
    writer::{BitstreamWriter, STREAM_TERMINATOR},
};

/// What a finished run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_requested: u64,
    pub frames_encoded: u64,
    pub packets_written: u64,
    /// Total stream size, terminator included.
    pub bytes_written: u64,
    /// Presentation index of the first packet written.
    pub first_pts: Option<i64>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn payload_bytes(&self) -> u64 {
        self.bytes_written.saturating_sub(STREAM_TERMINATOR.len() as u64)
    }
}

/// Drives one encoding run: pull, convert, submit and write each frame, then drain,
/// finalize and close.
pub struct PipelineController {
    config: EncoderConfig,
    frame_count: u64,
    cancel: Option<CancellationToken>,
}

impl PipelineController {
    pub fn new(config: EncoderConfig, frame_count: u64) -> Self {
        Self {
            config,
            frame_count,
            cancel: None,
        }
    }

    /// Stop pulling frames once `cancel` fires; the run still drains and finalizes.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Encodes into the file at `path`. The file is only created once the codec opened.
    pub fn run_to_file<S: FrameSource>(&self, source: &mut S, path: &Path) -> Result<RunSummary> {
        self.run(source, || BitstreamWriter::create(path))
    }

    /// Runs the pipeline, opening the sink with `open_sink` after the encoder is open.
    /// Encoder and sink are released on every exit path.
    pub fn run<S, W, F>(&self, source: &mut S, open_sink: F) -> Result<RunSummary>
    where
        S: FrameSource,
        W: Write,
        F: FnOnce() -> Result<BitstreamWriter<W>>,
    {
        let mut encoder = Encoder::new(self.config.clone());
        if let Err(e) = encoder.open() {
            encoder.close();
            return Err(e);
        }
        let mut writer = match open_sink() {
            Ok(writer) => writer,
            Err(e) => {
                encoder.close();
                return Err(e);
            }
        };

        let result = self.encode_all(source, &mut encoder, &mut writer);
        match result {
            Ok(mut summary) => {
                let finalized = writer.finalize();
                encoder.close();
                summary.bytes_written = finalized?;
                log::info!(
                    "run complete: {}/{} frames, {} packets, {} bytes{}",
                    summary.frames_encoded,
                    summary.frames_requested,
                    summary.packets_written,
                    summary.bytes_written,
                    if summary.cancelled { " (cancelled)" } else { "" }
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!("run failed ({}): {}", e.component(), e);
                writer.abandon();
                encoder.close();
                Err(e)
            }
        }
    }

    fn encode_all<S: FrameSource, W: Write>(
        &self,
        source: &mut S,
        encoder: &mut Encoder,
        writer: &mut BitstreamWriter<W>,
    ) -> Result<RunSummary> {
        let (width, height, format) = (
            self.config.width,
            self.config.height,
            self.config.pixel_format,
        );
        let mut converter = ColorConverter::new();
        let mut summary = RunSummary {
            frames_requested: self.frame_count,
            ..RunSummary::default()
        };

        for index in 0..self.frame_count as i64 {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                log::info!("run cancelled after {} frames", summary.frames_encoded);
                summary.cancelled = true;
                break;
            }
            let Some(raw) = source.next_frame(index)? else {
                log::warn!(
                    "frame source ended after {} of {} frames",
                    summary.frames_encoded,
                    self.frame_count
                );
                break;
            };
            let converted = converter.convert(&raw, width, height, format)?;
            drop(raw);
            if let Some(packet) = encoder.submit_frame(&converted, index)? {
                Self::write(writer, &mut summary, &packet)?;
            }
            summary.frames_encoded += 1;
        }

        for packet in encoder.drain()? {
            Self::write(writer, &mut summary, &packet?)?;
        }
        Ok(summary)
    }

    fn write<W: Write>(
        writer: &mut BitstreamWriter<W>,
        summary: &mut RunSummary,
        packet: &EncodedPacket,
    ) -> Result<()> {
        writer.append(packet)?;
        if packet.has_data() {
            summary.packets_written += 1;
            if summary.first_pts.is_none() {
                summary.first_pts = packet.pts();
            }
        }
        Ok(())
    }
}
