// Unit tests for the PCM frame encoder contract.

use echosense::audio::{decode_frame, encode_frame, mime_type};

#[test]
fn test_two_bytes_per_sample() {
    let frame: Vec<f32> = (0..4096).map(|i| (i as f32 / 4096.0) - 0.5).collect();
    assert_eq!(encode_frame(&frame).len(), 4096 * 2);
}

#[test]
fn test_little_endian_byte_order() {
    // 0.5 * 32767 = 16383 = 0x3FFF -> LE bytes [0xFF, 0x3F]
    let bytes = encode_frame(&[0.5]);
    assert_eq!(bytes, vec![0xFF, 0x3F]);
}

#[test]
fn test_in_range_quantization_round_trips() {
    let samples: Vec<f32> = vec![-1.0, -0.75, -0.001, 0.0, 0.001, 0.33, 0.9999, 1.0];
    let expected: Vec<i16> = samples.iter().map(|s| (s * 32767.0) as i16).collect();
    assert_eq!(decode_frame(&encode_frame(&samples)), expected);
}

#[test]
fn test_out_of_range_samples_clamp_not_wrap() {
    // Values just past full scale must clamp instead of wrapping sign
    let bytes = encode_frame(&[1.5, 1.0001, -2.0, -1.0001]);
    let decoded = decode_frame(&bytes);
    assert_eq!(decoded, vec![32767, 32767, -32767, -32767]);
    for value in decoded {
        assert!((-32767..=32767).contains(&value));
    }
}

#[test]
fn test_empty_frame() {
    assert!(encode_frame(&[]).is_empty());
}

#[test]
fn test_mime_tag_matches_transport_contract() {
    assert_eq!(mime_type(16000), "audio/pcm;rate=16000");
    assert_eq!(mime_type(24000), "audio/pcm;rate=24000");
}
