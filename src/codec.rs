//! Command frames and datablob packing.
//!
//! Everything in here is pure: no I/O and no state. The shield talks in two
//! directions with two different framings:
//!
//! * host → device: a predicate byte (top bit set) followed by up to two
//!   7-bit parameter bytes. The predicate's two low bits carry the number of
//!   parameters that follow.
//! * device → host: after a `0xAA` lead byte, a 7 byte datablob packed as
//!
//! ```text
//!       +------+------+------+------+------+------+------+
//!  byte |  0   |  1   |  2   |  3   |  4   |  5   |  6   |
//!       +------+------+------+------+------+------+------+
//!       |  seq#  | data  |src|  microseconds since SYNC  |
//!  bits |   11   |  10   | 3 |            32             |
//!       +------+------+------+------+------+------+------+
//! ```
//!
//! Fields are packed from the most significant bit of byte 0 onwards, which
//! is exactly how the firmware lays them out.

/// Marks the start of a datablob on the wire.
pub const BLOB_MARKER: u8 = 0xAA;

/// Marks the start of a newline terminated status line on the wire.
pub const STRING_MARKER: u8 = b' ';

/// Payload length of a datablob, not counting the marker.
pub const BLOB_LEN: usize = 7;

const PARAM_MASK: u8 = 0x7F;
const ARITY_MASK: u8 = 0b11;

const SEQUENCE_MASK: u16 = 0x7FF;
const RAW_VALUE_MASK: u16 = 0x3FF;
const SOURCE_MASK: u8 = 0x07;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Predicate 0x{predicate:02x} takes {expected} parameter(s) but {actual} were supplied")]
    InvalidParameterCount {
        predicate: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed datablob: expected {expected} bytes but got {actual}")]
    MalformedFrame { expected: usize, actual: usize },
}

/// Command predicates understood by the shield firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Predicate {
    /// Stop all activity and return to ready.
    Halt = 0x80,
    /// Begin acquisition on the ports named by the bit-mask parameter.
    Arm = 0x84 | 0x01,
    ReadDigital1 = 0x8C,
    ReadDigital2 = 0x90,
    ReadAnalog1Low = 0x94,
    ReadAnalog1High = 0x98,
    ReadAnalog2Low = 0x9C,
    ReadAnalog2High = 0xA0,
    ReadButton = 0xA4,
    BlinkLed = 0xA8 | 0x01,
    SetSampleRate = 0xAC | 0x01,
    SetStopCondition = 0xB0 | 0x02,
    SetTriggerCondition = 0xB4 | 0x02,
    SetDigitalTrigger = 0xB8 | 0x01,
    Version = 0xC8,
    PortStatus = 0xC8 | 0x01,
    SyncClocks = 0xD0,
}

impl Predicate {
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Number of parameter bytes this predicate announces.
    pub const fn param_count(self) -> usize {
        param_count(self as u8)
    }
}

impl From<Predicate> for u8 {
    fn from(predicate: Predicate) -> Self {
        predicate.byte()
    }
}

const fn param_count(predicate: u8) -> usize {
    (predicate & ARITY_MASK) as usize
}

/// A single host → device command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    predicate: u8,
    params: Vec<u8>,
}

impl Command {
    /// Build a fixed-arity command. The number of parameters must match the
    /// predicate's low two bits exactly.
    pub fn new(predicate: impl Into<u8>, params: &[u8]) -> Result<Self, CodecError> {
        let predicate = predicate.into();
        let expected = param_count(predicate);
        if params.len() != expected {
            return Err(CodecError::InvalidParameterCount {
                predicate,
                expected,
                actual: params.len(),
            });
        }
        Ok(Self::unchecked(predicate, params))
    }

    /// Build a variable-arity command, where the predicate's low bits are an
    /// upper bound rather than an exact count.
    pub fn up_to(predicate: impl Into<u8>, params: &[u8]) -> Result<Self, CodecError> {
        let predicate = predicate.into();
        let expected = param_count(predicate);
        if params.len() > expected {
            return Err(CodecError::InvalidParameterCount {
                predicate,
                expected,
                actual: params.len(),
            });
        }
        Ok(Self::unchecked(predicate, params))
    }

    fn unchecked(predicate: u8, params: &[u8]) -> Self {
        Self {
            predicate,
            params: params.iter().map(|p| p & PARAM_MASK).collect(),
        }
    }

    pub fn predicate(&self) -> u8 {
        self.predicate
    }

    /// Parameter bytes, already masked to 7 bits.
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Wire bytes: the predicate followed by its parameters.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.params.len());
        bytes.push(self.predicate);
        bytes.extend_from_slice(&self.params);
        bytes
    }
}

/// Encode a fixed-arity command straight to wire bytes.
pub fn encode_command(predicate: impl Into<u8>, params: &[u8]) -> Result<Vec<u8>, CodecError> {
    Command::new(predicate, params).map(|command| command.to_bytes())
}

/// Parameter bytes of an encoded command frame. Anything past the count the
/// predicate announces is ignored.
pub fn decode_parameters(frame: &[u8]) -> &[u8] {
    match frame.split_first() {
        Some((&predicate, rest)) => &rest[..param_count(predicate).min(rest.len())],
        None => &[],
    }
}

/// The channel a sample came from, as carried in the blob's 3-bit source tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Source {
    /// Tag reserved for strings; never valid as sample data.
    StringMarker = 0x0,
    Digital1 = 0x1,
    Digital2 = 0x2,
    /// Analog port 1, 0..5 V input.
    Analog1Low = 0x3,
    /// Analog port 2, 0..5 V input.
    Analog2Low = 0x4,
    /// Analog port 1, ±10 V input.
    Analog1High = 0x5,
    /// Analog port 2, ±10 V input.
    Analog2High = 0x6,
    Button = 0x7,
}

impl Source {
    /// Map a tag to its source. Only the low three bits are looked at, so
    /// every input has an answer.
    pub const fn from_tag(tag: u8) -> Self {
        match tag & SOURCE_MASK {
            0x1 => Self::Digital1,
            0x2 => Self::Digital2,
            0x3 => Self::Analog1Low,
            0x4 => Self::Analog2Low,
            0x5 => Self::Analog1High,
            0x6 => Self::Analog2High,
            0x7 => Self::Button,
            _ => Self::StringMarker,
        }
    }

    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn is_analog_low(self) -> bool {
        matches!(self, Self::Analog1Low | Self::Analog2Low)
    }

    pub const fn is_analog_high(self) -> bool {
        matches!(self, Self::Analog1High | Self::Analog2High)
    }

    pub const fn is_analog(self) -> bool {
        self.is_analog_low() || self.is_analog_high()
    }

    /// Short label used by the firmware's status reports and the recorder.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StringMarker => "STR",
            Self::Digital1 => "BTD01",
            Self::Digital2 => "BTD02",
            Self::Analog1Low => "BTA01_5V",
            Self::Analog2Low => "BTA02_5V",
            Self::Analog1High => "BTA01_10V",
            Self::Analog2High => "BTA02_10V",
            Self::Button => "BTN",
        }
    }
}

/// A decoded datablob. Field widths follow the wire layout; `source` keeps
/// the raw tag so corrupted frames can still be reported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlob {
    /// 11 bits, wraps at 2048.
    pub sequence: u16,
    /// 10 bits. ADC code for analog sources, 0/1 for digital ones.
    pub raw_value: u16,
    /// 3 bits.
    pub source: u8,
    /// Microseconds since the last clock sync.
    pub elapsed_micros: u32,
}

impl DataBlob {
    pub fn source(&self) -> Source {
        Source::from_tag(self.source)
    }

    pub fn elapsed_seconds(&self) -> f64 {
        f64::from(self.elapsed_micros) / 1_000_000.0
    }

    /// Physical value of this blob, see [`scale_sample`].
    pub fn scaled_value(&self) -> f64 {
        scale_sample(self.raw_value, self.source())
    }
}

/// Unpack a datablob payload (the bytes after the `0xAA` marker).
pub fn decode_data_blob(bytes: &[u8]) -> Result<DataBlob, CodecError> {
    let Some(b) = bytes.get(..BLOB_LEN) else {
        return Err(CodecError::MalformedFrame {
            expected: BLOB_LEN,
            actual: bytes.len(),
        });
    };

    let sequence = (u16::from(b[0]) << 3) | u16::from(b[1] >> 5);
    let raw_value = (u16::from(b[1] & 0x1F) << 5) | u16::from(b[2] >> 3);
    let source = b[2] & SOURCE_MASK;
    let elapsed_micros = u32::from_be_bytes([b[3], b[4], b[5], b[6]]);

    Ok(DataBlob {
        sequence,
        raw_value,
        source,
        elapsed_micros,
    })
}

/// Pack a datablob the way the firmware does. Fields wider than their slot
/// are truncated.
pub fn encode_data_blob(blob: &DataBlob) -> [u8; BLOB_LEN] {
    let sequence = blob.sequence & SEQUENCE_MASK;
    let raw = blob.raw_value & RAW_VALUE_MASK;
    let source = blob.source & SOURCE_MASK;
    let time = blob.elapsed_micros.to_be_bytes();

    [
        (sequence >> 3) as u8,
        (((sequence & 0x07) << 5) as u8) | (raw >> 5) as u8,
        (((raw & 0x1F) << 3) as u8) | source,
        time[0],
        time[1],
        time[2],
        time[3],
    ]
}

/// Convert a raw reading to its physical value.
///
/// Digital and button readings pass through unchanged. The 5 V inputs map
/// `raw * 5 / 1024`; the ±10 V inputs are bipolar around code 512.
pub fn scale_sample(raw_value: u16, source: Source) -> f64 {
    let raw = f64::from(raw_value);
    if source.is_analog_low() {
        raw * 5.0 / 1024.0
    } else if source.is_analog_high() {
        (raw - 512.0) * 10.0 / 512.0
    } else {
        raw
    }
}
