use super::sample::{DataFormat, SampleKind, SampleType};
use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};
use thiserror::Error;

pub const DSD_SILENCE_BYTE: u8 = 0x69;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("no conversion from {from:?} input to {to}")]
    Unsupported { from: DataFormat, to: SampleType },
    #[error("sample buffer too short: need {needed} bytes, got {got}")]
    ShortBuffer { needed: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    DsdCopy,
    Pcm(SampleKind),
}

/// A resolved (input format, driver sample type) pair.
///
/// Resolving once up front keeps the per-sample path to a single match on
/// the destination layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    src: DataFormat,
    path: Path,
    src_bytes: usize,
    dst_bytes: usize,
}

impl Codec {
    pub fn new(src: DataFormat, dst: SampleType) -> Result<Self, ConvertError> {
        let unsupported = ConvertError::Unsupported {
            from: src,
            to: dst,
        };
        let kind = dst.kind().ok_or(unsupported)?;
        let path = match (src, kind) {
            (DataFormat::U8, SampleKind::Dsd1 { .. } | SampleKind::Dsd8Ner) => Path::DsdCopy,
            (DataFormat::U8 | DataFormat::Raw, _) => return Err(unsupported),
            (_, SampleKind::Int { .. } | SampleKind::Float { .. }) => Path::Pcm(kind),
            (_, SampleKind::Dsd1 { .. } | SampleKind::Dsd8Ner) => return Err(unsupported),
        };
        Ok(Self {
            src,
            path,
            src_bytes: src.bytes(),
            dst_bytes: dst.bytes(),
        })
    }

    pub fn src_bytes(&self) -> usize {
        self.src_bytes
    }

    pub fn dst_bytes(&self) -> usize {
        self.dst_bytes
    }

    /// Convert one sample. Fails without writing when either slice is
    /// shorter than one sample of its width.
    pub fn convert(&self, dst: &mut [u8], src: &[u8]) -> Result<(), ConvertError> {
        if src.len() < self.src_bytes {
            return Err(ConvertError::ShortBuffer {
                needed: self.src_bytes,
                got: src.len(),
            });
        }
        if dst.len() < self.dst_bytes {
            return Err(ConvertError::ShortBuffer {
                needed: self.dst_bytes,
                got: dst.len(),
            });
        }
        match self.path {
            Path::DsdCopy => dst[0] = src[0],
            Path::Pcm(kind) => write_pcm(dst, kind, read_normalized(src, self.src)),
        }
        Ok(())
    }

    /// Extract `channel` out of `channels`-wide interleaved frames into a
    /// contiguous run of `samples` destination samples.
    pub fn deinterleave(
        &self,
        dst: &mut [u8],
        src: &[u8],
        channel: usize,
        channels: usize,
        samples: usize,
    ) {
        if channels == 0 || channel >= channels {
            return;
        }
        let stride = channels * self.src_bytes;
        let frames = src
            .get(channel * self.src_bytes..)
            .unwrap_or(&[])
            .chunks(stride);
        for (out, frame) in dst.chunks_exact_mut(self.dst_bytes).take(samples).zip(frames) {
            if self.convert(out, frame).is_err() {
                break;
            }
        }
    }
}

pub fn sample_size_bits(sample_type: SampleType) -> u32 {
    sample_type.bits()
}

pub fn can_convert(src: DataFormat, dst: SampleType) -> bool {
    Codec::new(src, dst).is_ok()
}

/// Convert a single sample. Unsupported pairs leave one sample of silence in
/// `dst`; short slices are reported as [`ConvertError::ShortBuffer`].
pub fn convert_sample(
    dst: &mut [u8],
    dst_type: SampleType,
    src: &[u8],
    src_format: DataFormat,
) -> Result<(), ConvertError> {
    match Codec::new(src_format, dst_type) {
        Ok(codec) => codec.convert(dst, src),
        Err(err) => {
            fill_silence(dst, dst_type, 1);
            Err(err)
        }
    }
}

/// De-interleave and convert one channel of `samples` frames.
pub fn convert_block(
    dst: &mut [u8],
    dst_type: SampleType,
    src: &[u8],
    channel: usize,
    channels: usize,
    src_format: DataFormat,
    samples: usize,
) -> Result<(), ConvertError> {
    match Codec::new(src_format, dst_type) {
        Ok(codec) => {
            codec.deinterleave(dst, src, channel, channels, samples);
            Ok(())
        }
        Err(err) => {
            fill_silence(dst, dst_type, samples);
            Err(err)
        }
    }
}

/// Write `samples` samples of the silence pattern for `sample_type`.
pub fn fill_silence(dst: &mut [u8], sample_type: SampleType, samples: usize) {
    let len = samples.saturating_mul(sample_type.bytes()).min(dst.len());
    let dst = &mut dst[..len];
    match sample_type.kind() {
        Some(SampleKind::Dsd1 { .. }) => dst.fill(DSD_SILENCE_BYTE),
        Some(SampleKind::Dsd8Ner) => {
            for (i, byte) in dst.iter_mut().enumerate() {
                *byte = (DSD_SILENCE_BYTE >> (7 - i % 8)) & 1;
            }
        }
        _ => dst.fill(0),
    }
}

fn read_normalized(src: &[u8], format: DataFormat) -> f64 {
    match format {
        DataFormat::S16LE => f64::from(LittleEndian::read_i16(src)) / 32_768.0,
        DataFormat::S16BE => f64::from(BigEndian::read_i16(src)) / 32_768.0,
        DataFormat::S24LE3 => f64::from(LittleEndian::read_i24(src)) / 8_388_608.0,
        DataFormat::S24BE3 => f64::from(BigEndian::read_i24(src)) / 8_388_608.0,
        DataFormat::S32LE => f64::from(LittleEndian::read_i32(src)) / 2_147_483_648.0,
        DataFormat::S32BE => f64::from(BigEndian::read_i32(src)) / 2_147_483_648.0,
        DataFormat::Float => f64::from(NativeEndian::read_f32(src)),
        DataFormat::Double => NativeEndian::read_f64(src),
        DataFormat::U8 | DataFormat::Raw => 0.0,
    }
}

/// Scale to a signed `bits` wide integer, rounding half away from zero and
/// saturating at both ends. NaN maps to zero.
fn quantize(value: f64, bits: u32) -> i64 {
    let full = (1u64 << (bits - 1)) as f64;
    (value * full).round().clamp(-full, full - 1.0) as i64
}

fn write_pcm(dst: &mut [u8], kind: SampleKind, value: f64) {
    match kind {
        SampleKind::Int {
            bytes: 2,
            big_endian,
            ..
        } => {
            let v = quantize(value, 16) as i16;
            if big_endian {
                BigEndian::write_i16(dst, v);
            } else {
                LittleEndian::write_i16(dst, v);
            }
        }
        SampleKind::Int {
            bytes: 3,
            big_endian,
            ..
        } => {
            // top three bytes of the 32-bit value
            let v = (quantize(value, 32) as i32) >> 8;
            if big_endian {
                BigEndian::write_i24(dst, v);
            } else {
                LittleEndian::write_i24(dst, v);
            }
        }
        // justified Int32 variants share the full 32-bit scale
        SampleKind::Int { big_endian, .. } => {
            let v = quantize(value, 32) as i32;
            if big_endian {
                BigEndian::write_i32(dst, v);
            } else {
                LittleEndian::write_i32(dst, v);
            }
        }
        SampleKind::Float {
            bits: 32,
            big_endian,
        } => {
            let v = value as f32;
            if big_endian {
                BigEndian::write_f32(dst, v);
            } else {
                LittleEndian::write_f32(dst, v);
            }
        }
        SampleKind::Float { big_endian, .. } => {
            if big_endian {
                BigEndian::write_f64(dst, value);
            } else {
                LittleEndian::write_f64(dst, value);
            }
        }
        SampleKind::Dsd1 { .. } | SampleKind::Dsd8Ner => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_f32(dst_type: SampleType, value: f32) -> Vec<u8> {
        let mut out = vec![0xAA; dst_type.bytes()];
        convert_sample(&mut out, dst_type, &value.to_ne_bytes(), DataFormat::Float).unwrap();
        out
    }

    #[test]
    fn full_scale_saturates_every_integer_type() {
        let cases: &[(SampleType, f32, &[u8])] = &[
            (SampleType::INT16_LSB, 1.0, &[0xFF, 0x7F]),
            (SampleType::INT16_LSB, -1.0, &[0x00, 0x80]),
            (SampleType::INT16_MSB, 1.0, &[0x7F, 0xFF]),
            (SampleType::INT16_MSB, -3.0, &[0x80, 0x00]),
            (SampleType::INT24_LSB, 1.0, &[0xFF, 0xFF, 0x7F]),
            (SampleType::INT24_LSB, -1.0, &[0x00, 0x00, 0x80]),
            (SampleType::INT24_MSB, 1.0, &[0x7F, 0xFF, 0xFF]),
            (SampleType::INT24_MSB, -1.0, &[0x80, 0x00, 0x00]),
            (SampleType::INT32_LSB, 1.0, &[0xFF, 0xFF, 0xFF, 0x7F]),
            (SampleType::INT32_LSB, -1.0, &[0x00, 0x00, 0x00, 0x80]),
            (SampleType::INT32_MSB, 2.0, &[0x7F, 0xFF, 0xFF, 0xFF]),
            (SampleType::INT32_MSB, -2.0, &[0x80, 0x00, 0x00, 0x00]),
            (SampleType::INT32_LSB16, 1.0, &[0xFF, 0xFF, 0xFF, 0x7F]),
            (SampleType::INT32_LSB16, -1.0, &[0x00, 0x00, 0x00, 0x80]),
            (SampleType::INT32_LSB18, 1.0, &[0xFF, 0xFF, 0xFF, 0x7F]),
            (SampleType::INT32_LSB20, -1.0, &[0x00, 0x00, 0x00, 0x80]),
            (SampleType::INT32_LSB24, 0.5, &[0x00, 0x00, 0x00, 0x40]),
            (SampleType::INT32_MSB16, 1.0, &[0x7F, 0xFF, 0xFF, 0xFF]),
            (SampleType::INT32_MSB18, -1.0, &[0x80, 0x00, 0x00, 0x00]),
            (SampleType::INT32_MSB20, 0.5, &[0x40, 0x00, 0x00, 0x00]),
            (SampleType::INT32_MSB24, 2.0, &[0x7F, 0xFF, 0xFF, 0xFF]),
        ];
        for (ty, value, expected) in cases {
            assert_eq!(from_f32(*ty, *value), *expected, "{ty} <- {value}");
        }
    }

    #[test]
    fn float_destinations_swap_for_msb() {
        assert_eq!(from_f32(SampleType::FLOAT32_MSB, 0.5), 0.5f32.to_be_bytes());
        assert_eq!(from_f32(SampleType::FLOAT32_LSB, -0.25), (-0.25f32).to_le_bytes());
        assert_eq!(from_f32(SampleType::FLOAT64_MSB, 0.75), 0.75f64.to_be_bytes());
        assert_eq!(from_f32(SampleType::FLOAT64_LSB, 1.5), 1.5f64.to_le_bytes());
    }

    #[test]
    fn double_narrows_to_float32() {
        let mut out = [0u8; 4];
        convert_sample(
            &mut out,
            SampleType::FLOAT32_LSB,
            &0.125f64.to_ne_bytes(),
            DataFormat::Double,
        )
        .unwrap();
        assert_eq!(out, 0.125f32.to_le_bytes());
    }

    #[test]
    fn int24_keeps_top_bytes_of_rounded_value() {
        assert_eq!(from_f32(SampleType::INT24_LSB, 0.5), [0x00, 0x00, 0x40]);
        assert_eq!(from_f32(SampleType::INT24_MSB, -0.5), [0xC0, 0x00, 0x00]);
    }

    #[test]
    fn f32_through_int16_stays_within_one_step() {
        let step = 1.0 / 32_768.0;
        for i in -100..=100 {
            let value = i as f32 / 100.0;
            let bytes = from_f32(SampleType::INT16_LSB, value);
            let back = f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32_768.0;
            let expected = value.min(1.0 - step);
            assert!((back - expected).abs() <= step, "{value} came back as {back}");
        }
    }

    #[test]
    fn integer_inputs_are_rescaled() {
        let mut out = [0u8; 4];
        convert_sample(
            &mut out,
            SampleType::INT32_LSB,
            &0x4000i16.to_le_bytes(),
            DataFormat::S16LE,
        )
        .unwrap();
        assert_eq!(i32::from_le_bytes(out), 0x4000_0000);

        let mut out = [0u8; 2];
        convert_sample(
            &mut out,
            SampleType::INT16_LSB,
            &[0x12, 0x34, 0x56],
            DataFormat::S24BE3,
        )
        .unwrap();
        assert_eq!(i16::from_le_bytes(out), 0x1234);

        let mut out = [0u8; 4];
        convert_sample(
            &mut out,
            SampleType::FLOAT32_LSB,
            &i32::MIN.to_be_bytes(),
            DataFormat::S32BE,
        )
        .unwrap();
        assert_eq!(f32::from_le_bytes(out), -1.0);
    }

    #[test]
    fn nan_becomes_zero() {
        assert_eq!(from_f32(SampleType::INT16_LSB, f32::NAN), [0, 0]);
    }

    #[test]
    fn dsd_bytes_pass_through_unchanged() {
        for ty in [
            SampleType::DSD_INT8_MSB1,
            SampleType::DSD_INT8_LSB1,
            SampleType::DSD_INT8_NER8,
        ] {
            let mut out = [0u8];
            convert_sample(&mut out, ty, &[0xA5], DataFormat::U8).unwrap();
            assert_eq!(out, [0xA5]);
        }
    }

    #[test]
    fn unsupported_pairs_write_silence() {
        let mut out = [0xAAu8; 2];
        let err = convert_sample(&mut out, SampleType::INT16_LSB, &[0x12], DataFormat::U8);
        assert_eq!(
            err,
            Err(ConvertError::Unsupported {
                from: DataFormat::U8,
                to: SampleType::INT16_LSB
            })
        );
        assert_eq!(out, [0, 0]);

        let mut out = [0u8];
        assert!(
            convert_sample(
                &mut out,
                SampleType::DSD_INT8_MSB1,
                &0.5f32.to_ne_bytes(),
                DataFormat::Float
            )
            .is_err()
        );
        assert_eq!(out, [DSD_SILENCE_BYTE]);

        assert!(can_convert(DataFormat::U8, SampleType::DSD_INT8_NER8));
        assert!(!can_convert(DataFormat::Float, SampleType::DSD_INT8_NER8));
        assert!(!can_convert(DataFormat::Raw, SampleType::INT16_LSB));
        assert!(!can_convert(DataFormat::Float, SampleType(5)));
        assert!(can_convert(DataFormat::S24LE3, SampleType::FLOAT64_MSB));
    }

    #[test]
    fn short_slices_are_errors() {
        let codec = Codec::new(DataFormat::S24LE3, SampleType::INT32_LSB).unwrap();
        let mut out = [0xAAu8; 4];
        assert_eq!(
            codec.convert(&mut out, &[1, 2]),
            Err(ConvertError::ShortBuffer { needed: 3, got: 2 })
        );
        assert_eq!(
            codec.convert(&mut out[..3], &[1, 2, 3]),
            Err(ConvertError::ShortBuffer { needed: 4, got: 3 })
        );
        assert_eq!(out, [0xAA; 4]);
        assert!(
            convert_sample(&mut [], SampleType::DSD_INT8_MSB1, &[0x69], DataFormat::U8).is_err()
        );
    }

    #[test]
    fn silence_patterns() {
        let mut buf = [0xAAu8; 16];
        fill_silence(&mut buf, SampleType::DSD_INT8_NER8, 16);
        assert_eq!(buf, [0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1]);

        let mut buf = [0u8; 8];
        fill_silence(&mut buf, SampleType::DSD_INT8_LSB1, 8);
        assert!(buf.iter().all(|&b| b == 0x69));

        let mut buf = [0xAAu8; 12];
        fill_silence(&mut buf, SampleType::FLOAT32_MSB, 2);
        assert_eq!(&buf[..8], &[0; 8]);
        assert_eq!(&buf[8..], &[0xAA; 4]);
    }

    #[test]
    fn block_extracts_one_channel() {
        let frames: Vec<u8> = [0.5f32, -0.5, 0.25, -0.25, 1.0, -1.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let mut right = [0u8; 6];
        convert_block(
            &mut right,
            SampleType::INT16_LSB,
            &frames,
            1,
            2,
            DataFormat::Float,
            3,
        )
        .unwrap();
        let samples: Vec<i16> = right
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, [-16_384, -8_192, -32_768]);
    }

    #[test]
    fn block_with_unsupported_pair_is_silent() {
        let mut out = [0xAAu8; 6];
        let res = convert_block(
            &mut out,
            SampleType::DSD_INT8_NER8,
            &[0u8; 24],
            0,
            2,
            DataFormat::Float,
            6,
        );
        assert!(res.is_err());
        assert_eq!(out, [0, 1, 1, 0, 1, 0]);
    }

    #[test]
    fn sample_size_matches_table() {
        assert_eq!(sample_size_bits(SampleType::INT32_LSB20), 32);
        assert_eq!(sample_size_bits(SampleType::DSD_INT8_MSB1), 1);
        assert_eq!(sample_size_bits(SampleType(99)), 0);
    }
}
