use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{
    error::{EncodeError, Result},
    packet::EncodedPacket,
};

/// Sequence end code appended once at the end of every stream.
pub const STREAM_TERMINATOR: [u8; 4] = [0x00, 0x00, 0x01, 0xB7];

/// Appends packets to a sink in call order and terminates the stream on `finalize`.
pub struct BitstreamWriter<W: Write> {
    sink: Option<W>,
    bytes_written: u64,
    packets_written: u64,
}

impl BitstreamWriter<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| EncodeError::SinkUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("writing elementary stream to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> BitstreamWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Some(sink),
            bytes_written: 0,
            packets_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    pub fn append(&mut self, packet: &EncodedPacket) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(EncodeError::WriterClosed)?;
        if !packet.has_data() {
            return Ok(());
        }
        sink.write_all(packet.data())?;
        self.bytes_written += packet.size() as u64;
        self.packets_written += 1;
        log::debug!(
            "write frame {:>3} (size={:>5})",
            packet.pts().unwrap_or(-1),
            packet.size()
        );
        Ok(())
    }

    /// Writes the terminator, flushes and releases the sink. Returns the total number of
    /// bytes in the stream, terminator included.
    pub fn finalize(&mut self) -> Result<u64> {
        let mut sink = self.sink.take().ok_or(EncodeError::WriterClosed)?;
        sink.write_all(&STREAM_TERMINATOR)?;
        self.bytes_written += STREAM_TERMINATOR.len() as u64;
        sink.flush()?;
        log::info!(
            "stream finalized: {} packets, {} bytes",
            self.packets_written,
            self.bytes_written
        );
        Ok(self.bytes_written)
    }

    /// Releases the sink without terminating the stream. Used when a run fails and its
    /// output is unusable anyway.
    pub fn abandon(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush() {
                log::warn!("flush of abandoned stream failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn packet(bytes: &[u8], pts: i64) -> EncodedPacket {
        EncodedPacket::new(bytes.to_vec(), Some(pts), Some(pts), pts == 0)
    }

    #[test]
    fn empty_stream_is_only_the_terminator() {
        let sink = SharedSink::default();
        let mut writer = BitstreamWriter::new(sink.clone());
        assert_eq!(writer.finalize().unwrap(), 4);
        assert_eq!(*sink.0.borrow(), STREAM_TERMINATOR.to_vec());
        assert!(writer.is_closed());
    }

    #[test]
    fn packets_are_written_in_call_order() {
        let sink = SharedSink::default();
        let mut writer = BitstreamWriter::new(sink.clone());
        writer.append(&packet(&[1, 2, 3], 0)).unwrap();
        writer.append(&packet(&[], 1)).unwrap();
        writer.append(&packet(&[4, 5], 2)).unwrap();
        assert_eq!(writer.bytes_written(), 5);
        assert_eq!(writer.packets_written(), 2);

        let total = writer.finalize().unwrap();
        assert_eq!(total, 9);
        assert_eq!(*sink.0.borrow(), vec![1, 2, 3, 4, 5, 0x00, 0x00, 0x01, 0xB7]);
    }

    #[test]
    fn append_after_finalize_fails() {
        let mut writer = BitstreamWriter::new(Vec::new());
        writer.finalize().unwrap();
        let err = writer.append(&packet(&[9], 0)).unwrap_err();
        assert!(matches!(err, EncodeError::WriterClosed));
        assert!(matches!(writer.finalize(), Err(EncodeError::WriterClosed)));
    }

    #[test]
    fn abandoned_stream_has_no_terminator() {
        let sink = SharedSink::default();
        let mut writer = BitstreamWriter::new(sink.clone());
        writer.append(&packet(&[7, 7], 0)).unwrap();
        writer.abandon();
        assert_eq!(*sink.0.borrow(), vec![7, 7]);
        assert!(matches!(writer.append(&packet(&[1], 1)), Err(EncodeError::WriterClosed)));
    }

    #[test]
    fn unopenable_path_is_sink_unavailable() {
        let path = std::env::temp_dir()
            .join("camcode-missing-dir")
            .join("nested")
            .join("out.mpg");
        let err = BitstreamWriter::create(&path).err().unwrap();
        assert!(matches!(err, EncodeError::SinkUnavailable { .. }));
    }

    #[test]
    fn file_sink_round_trip() {
        let path = std::env::temp_dir().join(format!("camcode-writer-{}.mpg", std::process::id()));
        let mut writer = BitstreamWriter::create(&path).unwrap();
        writer.append(&packet(&[0xAA; 10], 0)).unwrap();
        assert_eq!(writer.finalize().unwrap(), 14);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 14);
        assert_eq!(&bytes[10..], &STREAM_TERMINATOR);
        std::fs::remove_file(&path).unwrap();
    }
}
