//! PCM16 codec helpers for the live voice stream
//!
//! Outbound: `f32` microphone samples in [-1, 1] → PCM16 little-endian → base64.
//! Inbound: base64 → PCM16 little-endian → `f32` playback samples.
//!
//! Both directions use a scale of 32768 so that a round trip stays within one
//! quantization step (1/32768) of the original value.

use base64::{engine::general_purpose::STANDARD, Engine};

/// Scale between normalized float samples and PCM16
pub const PCM16_SCALE: f32 = 32768.0;

/// MIME tag attached to every outbound chunk
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Sample rate assumed for inbound audio when the MIME tag omits `rate=`
pub const DEFAULT_PLAYBACK_RATE: u32 = 24000;

/// Errors produced while decoding an inbound audio fragment.
///
/// These are never fatal: the fragment is skipped and playback continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload was not valid base64
    InvalidBase64(String),
    /// PCM16 payload must contain an even number of bytes
    OddByteCount(usize),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidBase64(e) => write!(f, "Invalid base64 audio payload: {}", e),
            DecodeError::OddByteCount(n) => {
                write!(f, "PCM16 payload has an odd number of bytes ({})", n)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Convert normalized float samples to PCM16.
///
/// Each sample is scaled by 32768 and saturated to the i16 range, so `1.0`
/// maps to `i16::MAX` rather than wrapping.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let scaled = s.clamp(-1.0, 1.0) * PCM16_SCALE;
            scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}

/// Convert PCM16 samples to normalized floats in [-1, 1)
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / PCM16_SCALE).collect()
}

/// Serialize PCM16 samples as little-endian bytes
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|&s| s.to_le_bytes()).collect()
}

/// Parse little-endian PCM16 bytes
pub fn bytes_to_pcm16(bytes: &[u8]) -> Result<Vec<i16>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddByteCount(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode float samples into the base64 PCM16 payload sent on the wire
pub fn encode_samples(samples: &[f32]) -> String {
    STANDARD.encode(pcm16_to_bytes(&f32_to_pcm16(samples)))
}

/// Decode a base64 PCM16 payload into PCM16 samples
pub fn decode_pcm16(data: &str) -> Result<Vec<i16>, DecodeError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    bytes_to_pcm16(&bytes)
}

/// Decode a base64 PCM16 payload straight into float playback samples
pub fn decode_samples(data: &str) -> Result<Vec<f32>, DecodeError> {
    decode_pcm16(data).map(|pcm| pcm16_to_f32(&pcm))
}

/// Extract the sample rate from a MIME tag such as `audio/pcm;rate=24000`
pub fn mime_sample_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse::<u32>().ok())
        .filter(|&rate| rate > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_pcm16_scaling() {
        assert_eq!(f32_to_pcm16(&[0.0, 0.5, -0.5, -1.0]), vec![0, 16384, -16384, -32768]);
    }

    #[test]
    fn test_f32_to_pcm16_saturates() {
        // 1.0 * 32768 does not fit in i16; it must saturate, not wrap
        assert_eq!(f32_to_pcm16(&[1.0, 2.0, -2.0]), vec![i16::MAX, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_round_trip_within_quantization_step() {
        let original: Vec<f32> = (0..1000).map(|i| ((i as f32) * 0.0137).sin() * 0.9).collect();
        let encoded = encode_samples(&original);
        let decoded = decode_samples(&encoded).unwrap();

        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 1.0 / PCM16_SCALE, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(pcm16_to_bytes(&[0x1234, 0x5678]), vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn test_decode_rejects_odd_bytes() {
        let data = STANDARD.encode([1u8, 2, 3]);
        assert_eq!(decode_pcm16(&data), Err(DecodeError::OddByteCount(3)));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(matches!(
            decode_pcm16("not base64!!"),
            Err(DecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_mime_sample_rate() {
        assert_eq!(mime_sample_rate("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(mime_sample_rate("audio/pcm; rate=16000"), Some(16000));
        assert_eq!(mime_sample_rate(CAPTURE_MIME_TYPE), Some(16000));
        assert_eq!(mime_sample_rate("audio/pcm"), None);
        assert_eq!(mime_sample_rate("audio/pcm;rate=0"), None);
    }
}
