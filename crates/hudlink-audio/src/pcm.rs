//! Conversion between float samples, 16-bit little-endian PCM, and the
//! base64 text encoding used on the wire.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PcmError {
    #[error("PCM payload has odd byte length: {len}")]
    OddLength { len: usize },

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Clamp to [-1, 1], scale to the signed 16-bit range, pack little-endian.
pub fn encode_i16_le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Unpack little-endian i16 and rescale to [-1, 1].
pub fn decode_i16_le(bytes: &[u8]) -> Result<Vec<f32>, PcmError> {
    if bytes.len() % 2 != 0 {
        return Err(PcmError::OddLength { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// i16 capture samples straight to the wire encoding.
pub fn encode_blocks_base64(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Float samples to the wire encoding.
pub fn encode_base64(samples: &[f32]) -> String {
    BASE64.encode(encode_i16_le(samples))
}

/// Wire encoding back to float samples.
pub fn decode_base64(text: &str) -> Result<Vec<f32>, PcmError> {
    let bytes = BASE64.decode(text)?;
    decode_i16_le(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One 16-bit quantization step in float terms.
    const QUANT_STEP: f32 = 1.0 / 32768.0;

    #[test]
    fn round_trip_within_one_quantization_step() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 500.0) - 1.0).collect();
        let decoded = decode_i16_le(&encode_i16_le(&samples)).unwrap();
        assert_eq!(decoded.len(), samples.len());
        for (orig, got) in samples.iter().zip(decoded.iter()) {
            assert!(
                (orig - got).abs() <= QUANT_STEP,
                "sample {} decoded as {}",
                orig,
                got
            );
        }
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let bytes = encode_i16_le(&[2.0, -2.0]);
        let decoded = decode_i16_le(&bytes).unwrap();
        assert!((decoded[0] - 1.0).abs() <= QUANT_STEP);
        assert!((decoded[1] + 1.0).abs() <= QUANT_STEP);
    }

    #[test]
    fn odd_length_input_is_a_decode_error() {
        let err = decode_i16_le(&[0u8, 1, 2]).unwrap_err();
        assert!(matches!(err, PcmError::OddLength { len: 3 }));
    }

    #[test]
    fn base64_round_trip_is_exact_on_bytes() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let text = encode_base64(&samples);
        let decoded = decode_base64(&text).unwrap();
        // Re-encoding decoded samples must produce identical bytes.
        assert_eq!(encode_base64(&decoded), text);
    }

    #[test]
    fn malformed_base64_is_rejected() {
        assert!(decode_base64("not@@base64!!").is_err());
    }

    #[test]
    fn i16_blocks_pack_little_endian() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;
        let encoded = encode_blocks_base64(&[0x0102i16, -1]);
        let bytes = BASE64.decode(encoded).unwrap();
        assert_eq!(bytes, vec![0x02, 0x01, 0xFF, 0xFF]);
    }
}
