//! SLIP framing for packets on a TCP byte stream.
//!
//! Each packet is written as `END payload END`, with `END` and `ESC` bytes
//! inside the payload replaced by two-byte escape sequences. The decoder
//! resets its escape state at every `END`, so a corrupted frame costs at
//! most that frame.

/// Frame delimiter
pub const END: u8 = 0xC0;
/// Escape introducer
pub const ESC: u8 = 0xDB;
/// Escaped form of `END`
pub const ESC_END: u8 = 0xDC;
/// Escaped form of `ESC`
pub const ESC_ESC: u8 = 0xDD;

/// Worst-case frame size for a payload: every byte escaped, plus both
/// delimiters
pub const fn max_encoded_len(payload_len: usize) -> usize {
    2 * payload_len + 2
}

/// Wrap a payload in delimiters, escaping reserved bytes
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2 + payload.len() / 16);
    out.push(END);
    for &byte in payload {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(byte),
        }
    }
    out.push(END);
    out
}

/// Split a received buffer into complete packets.
///
/// Returns the un-escaped packets and the bytes of any unfinished frame,
/// which must be prepended to the next read. The leftover keeps the `END`
/// that opened the unfinished frame. Bytes before the first `END` cannot
/// belong to a frame and are dropped.
pub fn decode_stream(buffer: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
    let mut packets = Vec::new();
    let mut current = Vec::new();
    let mut frame_start: Option<usize> = None;
    let mut escaped = false;

    for (i, &byte) in buffer.iter().enumerate() {
        if byte == END {
            if !current.is_empty() {
                packets.push(std::mem::take(&mut current));
            }
            escaped = false;
            frame_start = Some(i);
            continue;
        }

        if frame_start.is_none() {
            continue;
        }

        if escaped {
            current.push(match byte {
                ESC_END => END,
                ESC_ESC => ESC,
                other => other,
            });
            escaped = false;
        } else if byte == ESC {
            escaped = true;
        } else {
            current.push(byte);
        }
    }

    let leftover = match frame_start {
        Some(start) => buffer[start..].to_vec(),
        None => Vec::new(),
    };
    (packets, leftover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_escapes_reserved_bytes() {
        let encoded = encode(&[0x01, END, 0x02, ESC, 0x03]);
        assert_eq!(
            encoded,
            vec![END, 0x01, ESC, ESC_END, 0x02, ESC, ESC_ESC, 0x03, END]
        );
    }

    #[test]
    fn test_max_encoded_len_bounds_escaped_payload() {
        let payload = [END, ESC, END, ESC];
        assert_eq!(encode(&payload).len(), max_encoded_len(payload.len()));
        assert!(encode(&[1, 2, 3]).len() < max_encoded_len(3));
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut stream = encode(&[1, 2, 3]);
        stream.extend(encode(&[4, END, 5]));
        let (packets, leftover) = decode_stream(&stream);
        assert_eq!(packets, vec![vec![1, 2, 3], vec![4, END, 5]]);
        assert_eq!(leftover, vec![END]);
    }

    #[test]
    fn test_partial_frame_is_carried_over() {
        let full = encode(&[9, 8, ESC, 7]);
        let (first, second) = full.split_at(4);

        let (packets, leftover) = decode_stream(first);
        assert!(packets.is_empty());
        assert_eq!(leftover, first.to_vec());

        let mut next = leftover;
        next.extend_from_slice(second);
        let (packets, _) = decode_stream(&next);
        assert_eq!(packets, vec![vec![9, 8, ESC, 7]]);
    }

    #[test]
    fn test_split_inside_escape_sequence() {
        let full = encode(&[END]);
        // [END, ESC, ESC_END, END]: split between ESC and ESC_END
        let (packets, leftover) = decode_stream(&full[..2]);
        assert!(packets.is_empty());
        let mut next = leftover;
        next.extend_from_slice(&full[2..]);
        let (packets, _) = decode_stream(&next);
        assert_eq!(packets, vec![vec![END]]);
    }

    #[test]
    fn test_noise_before_first_delimiter_is_dropped() {
        let mut stream = vec![0x55, 0x66, ESC];
        stream.extend(encode(&[0x01, 0x02]));
        let (packets, _) = decode_stream(&stream);
        assert_eq!(packets, vec![vec![0x01, 0x02]]);
    }

    #[test]
    fn test_stray_escape_does_not_desync() {
        // A frame ending in a dangling ESC must not swallow the next frame's data
        let mut stream = vec![END, 0x01, ESC, END];
        stream.extend(encode(&[0x02, 0x03]));
        let (packets, _) = decode_stream(&stream);
        assert_eq!(packets, vec![vec![0x01], vec![0x02, 0x03]]);
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let (packets, leftover) = decode_stream(&[END, END, END]);
        assert!(packets.is_empty());
        assert_eq!(leftover, vec![END]);
    }

    #[test]
    fn test_no_delimiter_no_leftover() {
        let (packets, leftover) = decode_stream(&[1, 2, 3]);
        assert!(packets.is_empty());
        assert!(leftover.is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(
            prop_oneof![Just(END), Just(ESC), Just(ESC_END), Just(ESC_ESC), any::<u8>()],
            1..600,
        )) {
            let (packets, _) = decode_stream(&encode(&payload));
            prop_assert_eq!(packets, vec![payload]);
        }

        #[test]
        fn prop_chunked_delivery(
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 1..64),
                1..8,
            ),
            chunk in 1usize..17,
        ) {
            let stream: Vec<u8> = payloads.iter().flat_map(|p| encode(p)).collect();
            let mut pending = Vec::new();
            let mut received = Vec::new();
            for piece in stream.chunks(chunk) {
                pending.extend_from_slice(piece);
                let (packets, leftover) = decode_stream(&pending);
                received.extend(packets);
                pending = leftover;
            }
            prop_assert_eq!(received, payloads);
        }
    }
}
