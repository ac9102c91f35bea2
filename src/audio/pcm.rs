/// 16-bit PCM frame encoding for the live transport.
///
/// The remote endpoint expects raw little-endian signed 16-bit mono samples.
/// Capture backends hand us normalized f32 samples, which can drift slightly
/// outside [-1.0, 1.0] due to float noise in the processing graph, so every
/// sample is clamped before scaling to avoid wraparound.

/// Scale factor for f32 -> i16 conversion (symmetric range).
const PCM_SCALE: f32 = 32767.0;

/// Encode a frame of normalized f32 samples as little-endian 16-bit PCM.
///
/// Produces exactly `samples.len() * 2` bytes. Pure and infallible.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let quantized = (clamped * PCM_SCALE) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    bytes
}

/// Decode little-endian 16-bit PCM bytes back to i16 samples.
///
/// A trailing odd byte is ignored; the transport never produces one.
pub fn decode_frame(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// MIME-like tag identifying the PCM encoding and sample rate,
/// e.g. `audio/pcm;rate=16000`.
pub fn mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_two_bytes_per_sample() {
        let bytes = encode_frame(&[0.0, 0.5, -0.5, 1.0]);
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn clamps_out_of_range_samples() {
        let high = encode_frame(&[1.5]);
        let low = encode_frame(&[-2.0]);
        assert_eq!(decode_frame(&high), vec![i16::MAX]);
        assert_eq!(decode_frame(&low), vec![-32767]);
    }

    #[test]
    fn integer_round_trip_is_lossless() {
        let samples = [0.0f32, 0.25, -0.25, 0.9999, -1.0];
        let quantized: Vec<i16> = samples
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * PCM_SCALE) as i16)
            .collect();
        assert_eq!(decode_frame(&encode_frame(&samples)), quantized);
    }

    #[test]
    fn empty_frame_encodes_to_empty() {
        assert!(encode_frame(&[]).is_empty());
        assert!(decode_frame(&[]).is_empty());
    }

    #[test]
    fn mime_tag_carries_rate() {
        assert_eq!(mime_type(16000), "audio/pcm;rate=16000");
    }
}
