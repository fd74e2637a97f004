//! Opus frame extraction from WebM/Matroska byte streams.
//!
//! This is not a full EBML parser: it scans for SimpleBlock (0xA3) and
//! Block (0xA1) element IDs, reads the EBML variable-length element size,
//! strips the 4-byte block header (track number vint, 16-bit relative
//! timestamp, flags), and returns the raw codec frames.

/// SimpleBlock element ID.
const SIMPLE_BLOCK: u8 = 0xA3;
/// Block element ID (inside a BlockGroup).
const BLOCK: u8 = 0xA1;
/// Track vint + 16-bit timestamp + flags byte.
const BLOCK_HEADER_LEN: usize = 4;

/// An EBML variable-length integer, 1 to 3 bytes wide.
fn read_vint_size(data: &[u8]) -> Option<(usize, usize)> {
    let first = *data.first()?;
    if first & 0x80 != 0 {
        Some((usize::from(first & 0x7F), 1))
    } else if first & 0x40 != 0 {
        let second = *data.get(1)?;
        Some(((usize::from(first & 0x3F) << 8) | usize::from(second), 2))
    } else if first & 0x20 != 0 {
        let second = *data.get(1)?;
        let third = *data.get(2)?;
        Some((
            (usize::from(first & 0x1F) << 16) | (usize::from(second) << 8) | usize::from(third),
            3,
        ))
    } else {
        None
    }
}

/// Extract raw Opus frames from a WebM byte stream.
///
/// Frames whose declared size runs past the end of the buffer, or is
/// smaller than the block header, are skipped.
pub fn extract_frames(data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let id = data[i];
        if id != SIMPLE_BLOCK && id != BLOCK {
            i += 1;
            continue;
        }
        let Some((size, size_len)) = read_vint_size(&data[i + 1..]) else {
            i += 1;
            continue;
        };
        let start = i + 1 + size_len;
        let end = start + size;
        if size <= BLOCK_HEADER_LEN || end > data.len() {
            i += 1;
            continue;
        }
        frames.push(data[start + BLOCK_HEADER_LEN..end].to_vec());
        i = end;
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_block(payload: &[u8]) -> Vec<u8> {
        let mut block = vec![SIMPLE_BLOCK];
        let size = payload.len() + BLOCK_HEADER_LEN;
        assert!(size < 0x7F);
        block.push(0x80 | size as u8);
        // Track 1, timestamp 0, keyframe flags.
        block.extend_from_slice(&[0x81, 0x00, 0x00, 0x80]);
        block.extend_from_slice(payload);
        block
    }

    #[test]
    fn extracts_simple_block_payloads() {
        let mut data = vec![0x1A, 0x45, 0xDF, 0xA3]; // EBML magic noise up front
        data.extend(simple_block(&[1, 2, 3]));
        data.extend(simple_block(&[4, 5]));

        let frames = extract_frames(&data);
        assert_eq!(frames, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn extracts_two_byte_vint_sizes() {
        let payload = vec![0xABu8; 200];
        let mut data = vec![BLOCK];
        let size = payload.len() + BLOCK_HEADER_LEN;
        data.push(0x40 | (size >> 8) as u8);
        data.push((size & 0xFF) as u8);
        data.extend_from_slice(&[0x81, 0x00, 0x10, 0x00]);
        data.extend_from_slice(&payload);

        let frames = extract_frames(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], payload);
    }

    #[test]
    fn skips_truncated_blocks() {
        let mut data = simple_block(&[9, 9, 9]);
        data.truncate(data.len() - 2);
        assert!(extract_frames(&data).is_empty());
    }

    #[test]
    fn skips_blocks_smaller_than_header() {
        let data = [SIMPLE_BLOCK, 0x83, 0x81, 0x00, 0x00];
        assert!(extract_frames(&data).is_empty());
    }

    #[test]
    fn ignores_non_block_bytes() {
        assert!(extract_frames(&[0x00, 0x42, 0x86, 0x81]).is_empty());
    }
}
