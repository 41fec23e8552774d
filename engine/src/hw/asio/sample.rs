use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Native sample encoding reported by a driver channel, kept as the raw
/// protocol code so unknown values survive the round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SampleType(pub i32);

/// Decoded family of a [`SampleType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Two's complement PCM. `bits` significant bits in a `bytes` wide
    /// container; conversion always scales to the full container.
    Int {
        bytes: usize,
        bits: u32,
        big_endian: bool,
    },
    Float {
        bits: u32,
        big_endian: bool,
    },
    /// Eight 1-bit DSD samples packed per byte.
    Dsd1 { msb_first: bool },
    /// One DSD bit per byte, in bit 0.
    Dsd8Ner,
}

const TABLE: &[(SampleType, &str)] = &[
    (SampleType::INT16_MSB, "Int16MSB"),
    (SampleType::INT24_MSB, "Int24MSB"),
    (SampleType::INT32_MSB, "Int32MSB"),
    (SampleType::FLOAT32_MSB, "Float32MSB"),
    (SampleType::FLOAT64_MSB, "Float64MSB"),
    (SampleType::INT32_MSB16, "Int32MSB16"),
    (SampleType::INT32_MSB18, "Int32MSB18"),
    (SampleType::INT32_MSB20, "Int32MSB20"),
    (SampleType::INT32_MSB24, "Int32MSB24"),
    (SampleType::INT16_LSB, "Int16LSB"),
    (SampleType::INT24_LSB, "Int24LSB"),
    (SampleType::INT32_LSB, "Int32LSB"),
    (SampleType::FLOAT32_LSB, "Float32LSB"),
    (SampleType::FLOAT64_LSB, "Float64LSB"),
    (SampleType::INT32_LSB16, "Int32LSB16"),
    (SampleType::INT32_LSB18, "Int32LSB18"),
    (SampleType::INT32_LSB20, "Int32LSB20"),
    (SampleType::INT32_LSB24, "Int32LSB24"),
    (SampleType::DSD_INT8_LSB1, "DSDInt8LSB1"),
    (SampleType::DSD_INT8_MSB1, "DSDInt8MSB1"),
    (SampleType::DSD_INT8_NER8, "DSDInt8NER8"),
];

impl SampleType {
    pub const INT16_MSB: Self = Self(0);
    pub const INT24_MSB: Self = Self(1);
    pub const INT32_MSB: Self = Self(2);
    pub const FLOAT32_MSB: Self = Self(3);
    pub const FLOAT64_MSB: Self = Self(4);
    pub const INT32_MSB16: Self = Self(8);
    pub const INT32_MSB18: Self = Self(9);
    pub const INT32_MSB20: Self = Self(10);
    pub const INT32_MSB24: Self = Self(11);
    pub const INT16_LSB: Self = Self(16);
    pub const INT24_LSB: Self = Self(17);
    pub const INT32_LSB: Self = Self(18);
    pub const FLOAT32_LSB: Self = Self(19);
    pub const FLOAT64_LSB: Self = Self(20);
    pub const INT32_LSB16: Self = Self(24);
    pub const INT32_LSB18: Self = Self(25);
    pub const INT32_LSB20: Self = Self(26);
    pub const INT32_LSB24: Self = Self(27);
    pub const DSD_INT8_LSB1: Self = Self(32);
    pub const DSD_INT8_MSB1: Self = Self(33);
    pub const DSD_INT8_NER8: Self = Self(40);

    pub fn kind(self) -> Option<SampleKind> {
        let int = |bytes, bits, big_endian| SampleKind::Int {
            bytes,
            bits,
            big_endian,
        };
        let kind = match self.0 {
            0 => int(2, 16, true),
            1 => int(3, 24, true),
            2 => int(4, 32, true),
            3 => SampleKind::Float {
                bits: 32,
                big_endian: true,
            },
            4 => SampleKind::Float {
                bits: 64,
                big_endian: true,
            },
            8 => int(4, 16, true),
            9 => int(4, 18, true),
            10 => int(4, 20, true),
            11 => int(4, 24, true),
            16 => int(2, 16, false),
            17 => int(3, 24, false),
            18 => int(4, 32, false),
            19 => SampleKind::Float {
                bits: 32,
                big_endian: false,
            },
            20 => SampleKind::Float {
                bits: 64,
                big_endian: false,
            },
            24 => int(4, 16, false),
            25 => int(4, 18, false),
            26 => int(4, 20, false),
            27 => int(4, 24, false),
            32 => SampleKind::Dsd1 { msb_first: false },
            33 => SampleKind::Dsd1 { msb_first: true },
            40 => SampleKind::Dsd8Ner,
            _ => return None,
        };
        Some(kind)
    }

    /// Storage width in bits; 0 for codes this sink cannot drive.
    pub fn bits(self) -> u32 {
        self.kind().map_or(0, SampleKind::storage_bits)
    }

    /// Storage width in whole bytes.
    pub fn bytes(self) -> usize {
        (self.bits() as usize).div_ceil(8)
    }

    pub fn name(self) -> Option<&'static str> {
        TABLE
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, name)| *name)
    }
}

impl SampleKind {
    pub fn storage_bits(self) -> u32 {
        match self {
            SampleKind::Int { bytes, .. } => bytes as u32 * 8,
            SampleKind::Float { bits, .. } => bits,
            SampleKind::Dsd1 { .. } => 1,
            SampleKind::Dsd8Ner => 8,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "SampleType({})", self.0),
        }
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((ty, _)) = TABLE.iter().find(|(_, name)| name.eq_ignore_ascii_case(s)) {
            return Ok(*ty);
        }
        s.parse::<i32>()
            .map(SampleType)
            .map_err(|_| format!("unknown ASIO sample type '{s}'"))
    }
}

impl TryFrom<String> for SampleType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SampleType> for String {
    fn from(value: SampleType) -> Self {
        value.to_string()
    }
}

/// Interleaved input encodings accepted from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    /// Packed DSD bytes.
    U8,
    S16LE,
    S16BE,
    S24LE3,
    S24BE3,
    S32LE,
    S32BE,
    /// Native-endian `f32`.
    Float,
    /// Native-endian `f64`.
    Double,
    /// Opaque bitstream; reported for NER8 devices, never convertible.
    Raw,
}

impl DataFormat {
    pub fn bits(self) -> u32 {
        match self {
            DataFormat::U8 | DataFormat::Raw => 8,
            DataFormat::S16LE | DataFormat::S16BE => 16,
            DataFormat::S24LE3 | DataFormat::S24BE3 => 24,
            DataFormat::S32LE | DataFormat::S32BE | DataFormat::Float => 32,
            DataFormat::Double => 64,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// The input format a device natively consumes for a channel of `ty`.
    pub fn native_for(ty: SampleType) -> Option<Self> {
        let format = match ty.kind()? {
            SampleKind::Int {
                bytes: 2,
                big_endian,
                ..
            } => pick(big_endian, DataFormat::S16BE, DataFormat::S16LE),
            SampleKind::Int {
                bytes: 3,
                big_endian,
                ..
            } => pick(big_endian, DataFormat::S24BE3, DataFormat::S24LE3),
            SampleKind::Int { big_endian, .. } => {
                pick(big_endian, DataFormat::S32BE, DataFormat::S32LE)
            }
            SampleKind::Float { bits: 32, .. } => DataFormat::Float,
            SampleKind::Float { .. } => DataFormat::Double,
            SampleKind::Dsd1 { .. } => DataFormat::U8,
            SampleKind::Dsd8Ner => DataFormat::Raw,
        };
        Some(format)
    }
}

impl DataFormat {
    pub const ALL: [DataFormat; 10] = [
        DataFormat::U8,
        DataFormat::S16LE,
        DataFormat::S16BE,
        DataFormat::S24LE3,
        DataFormat::S24BE3,
        DataFormat::S32LE,
        DataFormat::S32BE,
        DataFormat::Float,
        DataFormat::Double,
        DataFormat::Raw,
    ];
}

impl FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        DataFormat::ALL
            .into_iter()
            .find(|f| format!("{f:?}").eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown data format '{s}'"))
    }
}

fn pick(big_endian: bool, be: DataFormat, le: DataFormat) -> DataFormat {
    if big_endian { be } else { le }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_format_names_parse_case_insensitively() {
        assert_eq!("float".parse::<DataFormat>(), Ok(DataFormat::Float));
        assert_eq!(" s24le3 ".parse::<DataFormat>(), Ok(DataFormat::S24LE3));
        assert!("s20".parse::<DataFormat>().is_err());
    }

    #[test]
    fn widths_follow_protocol_table() {
        let expect = [
            (0, 16),
            (1, 24),
            (2, 32),
            (3, 32),
            (4, 64),
            (8, 32),
            (9, 32),
            (10, 32),
            (11, 32),
            (16, 16),
            (17, 24),
            (18, 32),
            (19, 32),
            (20, 64),
            (24, 32),
            (25, 32),
            (26, 32),
            (27, 32),
            (32, 1),
            (33, 1),
            (40, 8),
        ];
        for (code, bits) in expect {
            assert_eq!(SampleType(code).bits(), bits, "code {code}");
        }
        for code in [5, 6, 7, 12, 21, 28, 31, 34, 39, 41, -1, 1000] {
            assert_eq!(SampleType(code).bits(), 0, "code {code}");
            assert_eq!(SampleType(code).bytes(), 0);
        }
    }

    #[test]
    fn byte_width_rounds_up() {
        assert_eq!(SampleType::DSD_INT8_MSB1.bytes(), 1);
        assert_eq!(SampleType::INT24_LSB.bytes(), 3);
        assert_eq!(SampleType::FLOAT64_MSB.bytes(), 8);
    }

    #[test]
    fn names_parse_back() {
        for (ty, name) in TABLE {
            assert_eq!(name.parse::<SampleType>(), Ok(*ty));
            assert_eq!(ty.to_string(), *name);
        }
        assert_eq!("float32lsb".parse::<SampleType>(), Ok(SampleType::FLOAT32_LSB));
        assert_eq!("77".parse::<SampleType>(), Ok(SampleType(77)));
        assert!("Int12".parse::<SampleType>().is_err());
    }

    #[test]
    fn native_input_formats() {
        assert_eq!(
            DataFormat::native_for(SampleType::INT32_MSB20),
            Some(DataFormat::S32BE)
        );
        assert_eq!(
            DataFormat::native_for(SampleType::INT24_LSB),
            Some(DataFormat::S24LE3)
        );
        assert_eq!(
            DataFormat::native_for(SampleType::FLOAT64_MSB),
            Some(DataFormat::Double)
        );
        assert_eq!(
            DataFormat::native_for(SampleType::DSD_INT8_LSB1),
            Some(DataFormat::U8)
        );
        assert_eq!(
            DataFormat::native_for(SampleType::DSD_INT8_NER8),
            Some(DataFormat::Raw)
        );
        assert_eq!(DataFormat::native_for(SampleType(5)), None);
    }
}
