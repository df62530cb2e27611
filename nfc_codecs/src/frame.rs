//! Self-describing backend frame.
//!
//! ```text
//! frame_version:u8 | codec_id:u8 | typesize:u8 | n_filters:u8
//! | filter_ids[n_filters] | raw_len:u64 LE | codec body
//! ```
//!
//! Everything the decoder needs to undo the backend travels in the frame,
//! so a block's payload can be decoded without consulting its metadata.

use nfc_core::{CodecKind, Filter, FormatError, Result};

pub const FRAME_VERSION: u8 = 1;

/// Fixed bytes before the filter list.
const FIXED_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub codec: CodecKind,
    pub typesize: u8,
    pub filters: Vec<Filter>,
    /// Length of the filtered payload before the codec ran.
    pub raw_len: u64,
}

impl FrameHeader {
    pub fn encoded_len(&self) -> usize {
        FIXED_LEN + self.filters.len() + 8
    }

    /// Callers keep `filters` within the one-byte count.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(FRAME_VERSION);
        out.push(self.codec.id());
        out.push(self.typesize);
        out.push(self.filters.len() as u8);
        out.extend(self.filters.iter().map(|f| f.id()));
        out.extend_from_slice(&self.raw_len.to_le_bytes());
    }

    /// Parse the frame header, returning it with the codec body.
    pub fn parse(frame: &[u8]) -> Result<(Self, &[u8])> {
        let bad = |reason: String| FormatError::BackendDecode(reason);
        if frame.len() < FIXED_LEN {
            return Err(bad(format!("backend frame of {} bytes has no header", frame.len())));
        }
        if frame[0] != FRAME_VERSION {
            return Err(bad(format!("unknown backend frame version {}", frame[0])));
        }
        let codec = CodecKind::from_id(frame[1])
            .ok_or_else(|| bad(format!("unknown codec id {}", frame[1])))?;
        let typesize = frame[2];
        let n_filters = frame[3] as usize;

        let raw_len_at = FIXED_LEN + n_filters;
        let body_at = raw_len_at + 8;
        if frame.len() < body_at {
            return Err(bad("backend frame header is truncated".to_string()));
        }
        let filters = frame[FIXED_LEN..raw_len_at]
            .iter()
            .map(|&id| Filter::from_id(id).ok_or_else(|| bad(format!("unknown filter id {id}"))))
            .collect::<Result<Vec<_>>>()?;
        let mut raw_len = [0u8; 8];
        raw_len.copy_from_slice(&frame[raw_len_at..body_at]);

        let header = Self {
            codec,
            typesize,
            filters,
            raw_len: u64::from_le_bytes(raw_len),
        };
        Ok((header, &frame[body_at..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed_fields_then_filters_then_length() {
        let header = FrameHeader {
            codec: CodecKind::Zlib,
            typesize: 8,
            filters: vec![Filter::Shuffle, Filter::Delta],
            raw_len: 0x0102,
        };
        let mut out = Vec::new();
        header.write_to(&mut out);
        assert_eq!(out.len(), header.encoded_len());
        assert_eq!(&out[..6], &[FRAME_VERSION, 4, 8, 2, 1, 2]);
        assert_eq!(&out[6..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);

        out.extend_from_slice(b"body");
        let (parsed, body) = FrameHeader::parse(&out).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(body, b"body");
    }

    #[test]
    fn malformed_frames_are_backend_errors() {
        for frame in [
            &[][..],
            &[9, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0][..],
            &[FRAME_VERSION, 99, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0][..],
            &[FRAME_VERSION, 1, 1, 1, 77, 0, 0, 0, 0, 0, 0, 0, 0][..],
            &[FRAME_VERSION, 1, 1, 3, 1][..],
        ] {
            assert!(matches!(
                FrameHeader::parse(frame),
                Err(FormatError::BackendDecode(_))
            ));
        }
    }
}
