//! Byte-level filters applied before the backend codec.
//!
//! Both filters are length-preserving and work on raw bytes with an element
//! width (`typesize`) hint; neither needs the dtype.

use nfc_core::Filter;

/// Byte-plane transpose: byte `i` of every element is gathered into plane `i`.
///
/// Trailing bytes that do not fill a whole element are copied verbatim.
pub fn shuffle(data: &[u8], typesize: usize) -> Vec<u8> {
    let n = if typesize > 1 { data.len() / typesize } else { 0 };
    if n == 0 {
        return data.to_vec();
    }
    let body = n * typesize;
    let mut out = vec![0u8; data.len()];
    for (j, element) in data[..body].chunks_exact(typesize).enumerate() {
        for (i, &byte) in element.iter().enumerate() {
            out[i * n + j] = byte;
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

pub fn unshuffle(data: &[u8], typesize: usize) -> Vec<u8> {
    let n = if typesize > 1 { data.len() / typesize } else { 0 };
    if n == 0 {
        return data.to_vec();
    }
    let body = n * typesize;
    let mut out = vec![0u8; data.len()];
    for (i, plane) in data[..body].chunks_exact(n).enumerate() {
        for (j, &byte) in plane.iter().enumerate() {
            out[j * typesize + i] = byte;
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

/// Bytewise delta against the byte one element earlier, wrapping.
pub fn delta_encode(data: &[u8], typesize: usize) -> Vec<u8> {
    let stride = typesize.max(1);
    let mut out = data.to_vec();
    for i in (stride..data.len()).rev() {
        out[i] = data[i].wrapping_sub(data[i - stride]);
    }
    out
}

pub fn delta_decode(data: &[u8], typesize: usize) -> Vec<u8> {
    let stride = typesize.max(1);
    let mut out = data.to_vec();
    for i in stride..out.len() {
        out[i] = out[i].wrapping_add(out[i - stride]);
    }
    out
}

/// Run `filters` in order.
pub fn apply(filters: &[Filter], data: &[u8], typesize: usize) -> Vec<u8> {
    let mut buf = data.to_vec();
    for filter in filters {
        buf = match filter {
            Filter::Shuffle => shuffle(&buf, typesize),
            Filter::Delta => delta_encode(&buf, typesize),
        };
    }
    buf
}

/// Undo `filters`, last one first.
pub fn reverse(filters: &[Filter], data: Vec<u8>, typesize: usize) -> Vec<u8> {
    let mut buf = data;
    for filter in filters.iter().rev() {
        buf = match filter {
            Filter::Shuffle => unshuffle(&buf, typesize),
            Filter::Delta => delta_decode(&buf, typesize),
        };
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_gathers_byte_planes() {
        let data = [0x02, 0x01, 0x04, 0x03, 0x06, 0x05];
        assert_eq!(shuffle(&data, 2), vec![0x02, 0x04, 0x06, 0x01, 0x03, 0x05]);
        assert_eq!(unshuffle(&shuffle(&data, 2), 2), data.to_vec());
    }

    #[test]
    fn shuffle_keeps_ragged_tail_in_place() {
        let data: Vec<u8> = (0..11).collect();
        let shuffled = shuffle(&data, 4);
        assert_eq!(&shuffled[8..], &[8, 9, 10]);
        assert_eq!(unshuffle(&shuffled, 4), data);
    }

    #[test]
    fn single_byte_elements_are_untouched() {
        let data = b"plain bytes".to_vec();
        assert_eq!(shuffle(&data, 1), data);
        assert_eq!(shuffle(&data, 0), data);
    }

    #[test]
    fn delta_wraps_per_stride() {
        let data = [10u8, 200, 12, 190, 5, 250];
        let encoded = delta_encode(&data, 2);
        assert_eq!(&encoded[..2], &[10, 200]);
        assert_eq!(encoded[2], 2);
        assert_eq!(encoded[4], 5u8.wrapping_sub(12));
        assert_eq!(delta_decode(&encoded, 2), data.to_vec());
    }

    #[test]
    fn filter_chain_reverses_in_opposite_order() {
        let data: Vec<u8> = (0u32..300).flat_map(|v| (v * 7).to_le_bytes()).collect();
        let filters = [Filter::Shuffle, Filter::Delta];
        let filtered = apply(&filters, &data, 4);
        assert_ne!(filtered, data);
        assert_eq!(reverse(&filters, filtered, 4), data);
    }
}
