//! Static order-0 rANS entropy coder over bytes.
//!
//! Byte-wise renormalization with a 32-bit state and a 12-bit probability
//! scale. The coder is LIFO: symbols are encoded last to first and the
//! emitted bytes reversed, so decoding runs front to back.
//!
//! ```text
//! len:u64 LE | n_symbols:u16 LE | (symbol:u8, freq:u16 LE) * n_symbols
//! | state:u32 LE | renormalization bytes
//! ```
//!
//! No symbol may own more than half of the probability range, which bounds
//! every decoded symbol to at least one bit of input. A lone symbol is paired
//! with an unused neighbour to satisfy that.

use nfc_core::{EntropyCoder, FormatError, Result};

const PROB_BITS: u32 = 12;
const PROB_SCALE: u32 = 1 << PROB_BITS;
const MAX_FREQ: u32 = PROB_SCALE / 2;
/// Lower bound of the normalized state interval `[RANS_L, RANS_L << 8)`.
const RANS_L: u32 = 1 << 23;

#[derive(Debug, Clone, Copy, Default)]
pub struct RansCoder;

impl RansCoder {
    pub const NAME: &'static str = "rans";
}

fn corrupt(reason: impl Into<String>) -> FormatError {
    FormatError::Transform {
        stage: RansCoder::NAME,
        reason: reason.into(),
    }
}

// ── Frequency model ────────────────────────────────────────────────────────

/// Scale byte counts to frequencies summing to `PROB_SCALE`, each present
/// symbol getting at least 1 and none more than `MAX_FREQ`.
fn normalize(counts: &[u64; 256]) -> [u32; 256] {
    let total: u64 = counts.iter().sum();
    let mut freqs = [0u32; 256];
    for (freq, &count) in freqs.iter_mut().zip(counts) {
        if count > 0 {
            *freq = (count * PROB_SCALE as u64 / total).clamp(1, MAX_FREQ as u64) as u32;
        }
    }

    let present: Vec<usize> = (0..256).filter(|&s| freqs[s] > 0).collect();
    if let [only] = present[..] {
        freqs[(only + 1) % 256] = 1;
    }

    let mut sum: u32 = freqs.iter().sum();
    while sum < PROB_SCALE {
        let Some(s) = (0..256)
            .filter(|&s| freqs[s] > 0 && freqs[s] < MAX_FREQ)
            .max_by_key(|&s| freqs[s])
        else {
            break;
        };
        let add = (PROB_SCALE - sum).min(MAX_FREQ - freqs[s]);
        freqs[s] += add;
        sum += add;
    }
    while sum > PROB_SCALE {
        let Some(s) = (0..256).filter(|&s| freqs[s] > 1).max_by_key(|&s| freqs[s]) else {
            break;
        };
        let sub = (sum - PROB_SCALE).min(freqs[s] - 1);
        freqs[s] -= sub;
        sum -= sub;
    }
    freqs
}

fn cumulative(freqs: &[u32; 256]) -> [u32; 256] {
    let mut starts = [0u32; 256];
    let mut acc = 0;
    for (start, &freq) in starts.iter_mut().zip(freqs) {
        *start = acc;
        acc += freq;
    }
    starts
}

// ── Coder ──────────────────────────────────────────────────────────────────

impl EntropyCoder for RansCoder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(raw.len() / 2 + 16);
        out.extend_from_slice(&(raw.len() as u64).to_le_bytes());
        if raw.is_empty() {
            return Ok(out);
        }

        let mut counts = [0u64; 256];
        for &b in raw {
            counts[b as usize] += 1;
        }
        let freqs = normalize(&counts);
        let starts = cumulative(&freqs);

        let table: Vec<(u8, u16)> = (0..256)
            .filter(|&s| freqs[s] > 0)
            .map(|s| (s as u8, freqs[s] as u16))
            .collect();
        out.extend_from_slice(&(table.len() as u16).to_le_bytes());
        for (symbol, freq) in &table {
            out.push(*symbol);
            out.extend_from_slice(&freq.to_le_bytes());
        }

        let mut x = RANS_L;
        let mut emitted = Vec::with_capacity(raw.len() / 2);
        for &b in raw.iter().rev() {
            let freq = freqs[b as usize];
            let x_max = ((RANS_L >> PROB_BITS) << 8) * freq;
            while x >= x_max {
                emitted.push(x as u8);
                x >>= 8;
            }
            x = ((x / freq) << PROB_BITS) + (x % freq) + starts[b as usize];
        }

        out.extend_from_slice(&x.to_le_bytes());
        out.extend(emitted.iter().rev());
        Ok(out)
    }

    fn decompress(&self, coded: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = Cursor { buf: coded, pos: 0 };
        let len = u64::from_le_bytes(cursor.array()?);
        if len == 0 {
            if cursor.remaining() != 0 {
                return Err(corrupt("trailing bytes after empty stream"));
            }
            return Ok(Vec::new());
        }

        let n_symbols = u16::from_le_bytes(cursor.array()?) as usize;
        if n_symbols == 0 || n_symbols > 256 {
            return Err(corrupt(format!("{n_symbols} symbols in frequency table")));
        }
        let mut freqs = [0u32; 256];
        for _ in 0..n_symbols {
            let [symbol] = cursor.array::<1>()?;
            let freq = u16::from_le_bytes(cursor.array()?) as u32;
            if freq == 0 || freq > MAX_FREQ || freqs[symbol as usize] != 0 {
                return Err(corrupt(format!("invalid frequency entry for symbol {symbol}")));
            }
            freqs[symbol as usize] = freq;
        }
        if freqs.iter().sum::<u32>() != PROB_SCALE {
            return Err(corrupt("frequencies do not sum to the probability scale"));
        }
        let starts = cumulative(&freqs);
        let mut slots = vec![0u8; PROB_SCALE as usize];
        for s in 0..256 {
            let (start, freq) = (starts[s] as usize, freqs[s] as usize);
            slots[start..start + freq].fill(s as u8);
        }

        let mut x = u32::from_le_bytes(cursor.array()?);
        if !(RANS_L..RANS_L << 8).contains(&x) {
            return Err(corrupt("initial state out of range"));
        }
        // Every symbol consumes at least one bit of state.
        let budget = (cursor.remaining() as u64 + 8) * 9;
        if len > budget {
            return Err(corrupt(format!("{len} symbols cannot come from {} bytes", coded.len())));
        }

        let mut out = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let slot = x & (PROB_SCALE - 1);
            let s = slots[slot as usize] as usize;
            x = freqs[s] * (x >> PROB_BITS) + slot - starts[s];
            while x < RANS_L {
                let [byte] = cursor.array::<1>()?;
                x = (x << 8) | byte as u32;
            }
            out.push(s as u8);
        }

        if cursor.remaining() != 0 || x != RANS_L {
            return Err(corrupt("stream did not end in the initial state"));
        }
        Ok(out)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or_else(|| corrupt("coded stream ends early"))?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos += N;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_bytes(n: usize, seed: u64, alphabet: u8) -> Vec<u8> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) % alphabet as u64) as u8
            })
            .collect()
    }

    #[test]
    fn skewed_input_round_trips_smaller() {
        let mut raw = vec![0u8; 4000];
        raw.extend(lcg_bytes(1000, 7, 4));
        let coded = RansCoder.compress(&raw).unwrap();
        assert!(coded.len() < raw.len() / 2, "{} bytes", coded.len());
        assert_eq!(RansCoder.decompress(&coded).unwrap(), raw);
    }

    #[test]
    fn full_alphabet_round_trips() {
        let raw: Vec<u8> = lcg_bytes(20_000, 42, 255).into_iter().chain(0..=255).collect();
        let coded = RansCoder.compress(&raw).unwrap();
        assert_eq!(RansCoder.decompress(&coded).unwrap(), raw);
    }

    #[test]
    fn single_symbol_and_tiny_inputs_round_trip() {
        for raw in [vec![], vec![9], vec![255; 3], vec![0xAB; 10_000], vec![1, 2]] {
            let coded = RansCoder.compress(&raw).unwrap();
            assert_eq!(RansCoder.decompress(&coded).unwrap(), raw, "input {raw:?}");
        }
    }

    #[test]
    fn normalized_frequencies_fill_the_scale() {
        let mut counts = [0u64; 256];
        counts[3] = 1;
        counts[200] = 1_000_000;
        let freqs = normalize(&counts);
        assert_eq!(freqs.iter().sum::<u32>(), PROB_SCALE);
        assert!(freqs[3] >= 1);
        assert!(freqs.iter().all(|&f| f <= MAX_FREQ));
    }

    #[test]
    fn truncated_or_inflated_streams_are_rejected() {
        let raw = lcg_bytes(500, 1, 16);
        let coded = RansCoder.compress(&raw).unwrap();
        assert!(RansCoder.decompress(&coded[..coded.len() - 1]).is_err());
        assert!(RansCoder.decompress(&coded[..5]).is_err());

        let mut inflated = coded.clone();
        inflated[..8].copy_from_slice(&(u64::MAX / 2).to_le_bytes());
        assert!(matches!(
            RansCoder.decompress(&inflated),
            Err(FormatError::Transform { stage: "rans", .. })
        ));
    }
}
