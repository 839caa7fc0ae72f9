//! Little-endian 16-bit PCM helpers shared by the audio-persistence job
//! and the streaming ASR consumer, so both decode `audio_data` stream
//! fields the same way instead of duplicating the conversion.

pub fn decode_i16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

pub fn value_as_bytes(v: &redis::Value) -> Option<Vec<u8>> {
    match v {
        redis::Value::BulkString(b) => Some(b.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_pairs() {
        let bytes = [0x01, 0x00, 0xff, 0xff];
        assert_eq!(decode_i16le(&bytes), vec![1, -1]);
    }
}
