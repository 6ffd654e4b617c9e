use crate::{Result, RtpError};

/// mask, timestamp, SSRC, CSRC and extension, each a little-endian u32.
pub const HEADER_LEN: usize = 20;

const RTP_VERSION: u32 = 2;

/// A bit range inside the packed `mask` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Version,
    Padding,
    Extension,
    CsrcCount,
    Marker,
    PayloadType,
    SequenceNumber,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Version,
        Field::Padding,
        Field::Extension,
        Field::CsrcCount,
        Field::Marker,
        Field::PayloadType,
        Field::SequenceNumber,
    ];

    /// Lowest bit of the field.
    pub const fn shift(self) -> u32 {
        match self {
            Field::Version => 30,
            Field::Padding => 29,
            Field::Extension => 28,
            Field::CsrcCount => 24,
            Field::Marker => 23,
            Field::PayloadType => 16,
            Field::SequenceNumber => 0,
        }
    }

    pub const fn width(self) -> u32 {
        match self {
            Field::Version => 2,
            Field::Padding | Field::Extension | Field::Marker => 1,
            Field::CsrcCount => 4,
            Field::PayloadType => 7,
            Field::SequenceNumber => 16,
        }
    }

    /// Largest value the field holds.
    pub const fn max(self) -> u32 {
        (1 << self.width()) - 1
    }

    pub const fn get(self, mask: u32) -> u32 {
        (mask >> self.shift()) & self.max()
    }

    /// Returns `mask` with this field replaced; `value` is truncated to the
    /// field width and no other bit changes.
    pub const fn set(self, mask: u32, value: u32) -> u32 {
        let bits = self.max() << self.shift();
        (mask & !bits) | ((value & self.max()) << self.shift())
    }
}

/// `Default` is the all-zero record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub mask: u32,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: u32,
    pub extension: u32,
}

impl RtpHeader {
    /// Zeroed header with the version field set to 2.
    pub fn new() -> Self {
        Self::default().with_field(Field::Version, RTP_VERSION)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(RtpError::InvalidLength(bytes.len()));
        }

        let word = |i: usize| {
            let at = i * 4;
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        Ok(Self {
            mask: word(0),
            timestamp: word(1),
            ssrc: word(2),
            csrc: word(3),
            extension: word(4),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let words = [self.mask, self.timestamp, self.ssrc, self.csrc, self.extension];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn field(&self, field: Field) -> u32 {
        field.get(self.mask)
    }

    pub fn with_field(mut self, field: Field, value: u32) -> Self {
        self.mask = field.set(self.mask, value);
        self
    }

    pub fn version(&self) -> u8 {
        self.field(Field::Version) as u8
    }

    pub fn padding(&self) -> bool {
        self.field(Field::Padding) != 0
    }

    pub fn has_extension(&self) -> bool {
        self.field(Field::Extension) != 0
    }

    pub fn csrc_count(&self) -> u8 {
        self.field(Field::CsrcCount) as u8
    }

    pub fn marker(&self) -> bool {
        self.field(Field::Marker) != 0
    }

    pub fn payload_type(&self) -> u8 {
        self.field(Field::PayloadType) as u8
    }

    pub fn sequence_number(&self) -> u16 {
        self.field(Field::SequenceNumber) as u16
    }

    pub fn with_version(self, version: u8) -> Self {
        self.with_field(Field::Version, version.into())
    }

    pub fn with_padding(self, padding: bool) -> Self {
        self.with_field(Field::Padding, padding.into())
    }

    pub fn with_extension_flag(self, extension: bool) -> Self {
        self.with_field(Field::Extension, extension.into())
    }

    pub fn with_csrc_count(self, count: u8) -> Self {
        self.with_field(Field::CsrcCount, count.into())
    }

    pub fn with_marker(self, marker: bool) -> Self {
        self.with_field(Field::Marker, marker.into())
    }

    pub fn with_payload_type(self, payload_type: u8) -> Self {
        self.with_field(Field::PayloadType, payload_type.into())
    }

    pub fn with_sequence_number(self, seq: u16) -> Self {
        self.with_field(Field::SequenceNumber, seq.into())
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }
}
