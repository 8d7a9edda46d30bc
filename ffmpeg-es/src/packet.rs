use bytes::Bytes;
use ffmpeg_next::codec::packet::Packet;

/// Compressed output of the encoder. The bytes are opaque to everything but the codec.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    data: Bytes,
    pts: Option<i64>,
    dts: Option<i64>,
    is_key: bool,
}

impl EncodedPacket {
    pub fn new(data: impl Into<Bytes>, pts: Option<i64>, dts: Option<i64>, is_key: bool) -> Self {
        Self {
            data: data.into(),
            pts,
            dts,
            is_key,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// False for the empty packets some codecs emit while flushing.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Presentation index of the picture this packet carries.
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }
}

impl From<&Packet> for EncodedPacket {
    fn from(packet: &Packet) -> Self {
        Self {
            data: packet.data().map(Bytes::copy_from_slice).unwrap_or_default(),
            pts: packet.pts(),
            dts: packet.dts(),
            is_key: packet.is_key(),
        }
    }
}
