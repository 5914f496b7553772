//! Content-defined chunker: the `scan(state, bytes) -> k | NONE` collaborator
//! from design §6. Deterministic function of content, not of length —
//! identical byte streams produce identical cut sequences.
//!
//! Implemented as a Gear-hash, FastCDC-style normalized chunker. The state
//! (`hash`, `count`) is carried across calls so a chunk boundary can be
//! found even when it straddles two separate `scan` calls; already-buffered
//! bytes are never re-scanned (that buffering is the caller's job, per
//! design §4.3/§9).

const fn gear_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut i = 0;
    while i < 256 {
        seed = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = seed;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        table[i] = z;
        i += 1;
    }
    table
}

static GEAR: [u64; 256] = gear_table();

#[derive(Clone, Copy, Debug)]
pub struct ChunkerParams {
    pub min: usize,
    pub avg: usize,
    pub max: usize,
}

impl Default for ChunkerParams {
    fn default() -> Self {
        // ~256 KiB target chunk size, matching the teacher's pack::writer params.
        Self {
            min: 64 * 1024,
            avg: 256 * 1024,
            max: 1024 * 1024,
        }
    }
}

fn mask_for(avg: usize) -> (u64, u64) {
    let bits = (avg.max(2) as f64).log2().round() as u32;
    let strict = bits.saturating_add(1).min(63);
    let loose = bits.saturating_sub(1).min(63);
    ((1u64 << strict) - 1, (1u64 << loose) - 1)
}

/// Rolling gear-hash chunker. One instance is reused across an entire
/// archive byte stream; it never resets itself — the driver resets its
/// `count` implicitly by virtue of emitting a cut.
pub struct Chunker {
    params: ChunkerParams,
    mask_small: u64,
    mask_large: u64,
    hash: u64,
    /// Bytes accumulated since the last emitted cut, across all calls.
    count: usize,
}

impl Chunker {
    pub fn new(params: ChunkerParams) -> Self {
        let (mask_small, mask_large) = mask_for(params.avg);
        Self {
            params,
            mask_small,
            mask_large,
            hash: 0,
            count: 0,
        }
    }

    /// Scan `data`, looking for a content-defined cut point. Returns
    /// `Some(k)` if bytes `data[..k]` complete a chunk (caller must combine
    /// with any previously buffered bytes); returns `None` if no boundary
    /// was found in this call, having consumed all of `data` into rolling
    /// state (the caller must buffer all of `data` itself).
    pub fn scan(&mut self, data: &[u8]) -> Option<usize> {
        for (i, &byte) in data.iter().enumerate() {
            self.count += 1;
            self.hash = (self.hash << 1).wrapping_add(GEAR[byte as usize]);

            if self.count >= self.params.max {
                self.hash = 0;
                self.count = 0;
                return Some(i + 1);
            }

            if self.count < self.params.min {
                continue;
            }

            let mask = if self.count < self.params.avg {
                self.mask_small
            } else {
                self.mask_large
            };

            if self.hash & mask == 0 {
                self.hash = 0;
                self.count = 0;
                return Some(i + 1);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_cuts(params: ChunkerParams, data: &[u8]) -> Vec<usize> {
        let mut chunker = Chunker::new(params);
        let mut cuts = Vec::new();
        let mut base = 0usize;
        let mut rest = data;
        while let Some(k) = chunker.scan(rest) {
            base += k;
            cuts.push(base);
            rest = &data[base..];
        }
        cuts
    }

    #[test]
    fn deterministic_on_identical_content() {
        let params = ChunkerParams {
            min: 16,
            avg: 64,
            max: 256,
        };
        let data: Vec<u8> = (0..4096).map(|i| (i * 7 % 251) as u8).collect();
        assert_eq!(all_cuts(params, &data), all_cuts(params, &data));
    }

    #[test]
    fn respects_min_and_max() {
        let params = ChunkerParams {
            min: 32,
            avg: 64,
            max: 128,
        };
        let data = vec![0x42u8; 4096];
        let cuts = all_cuts(params, &data);
        let mut prev = 0;
        for c in cuts {
            let len = c - prev;
            assert!(len <= params.max, "chunk {len} exceeds max {}", params.max);
            prev = c;
        }
    }

    #[test]
    fn call_boundary_does_not_change_cut_sequence() {
        let params = ChunkerParams {
            min: 16,
            avg: 64,
            max: 256,
        };
        let data: Vec<u8> = (0..4096).map(|i| (i * 13 % 251) as u8).collect();

        let whole = all_cuts(params, &data);

        // Feed the same bytes in small pieces, using the push contract
        // directly instead of the `all_cuts` convenience wrapper.
        let mut chunker = Chunker::new(params);
        let mut piecewise = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut absolute = 0usize;
        for piece in data.chunks(7) {
            let mut input = piece;
            loop {
                match chunker.scan(input) {
                    Some(k) => {
                        absolute += pending.len() + k;
                        piecewise.push(absolute);
                        pending.clear();
                        input = &input[k..];
                    }
                    None => {
                        pending.extend_from_slice(input);
                        break;
                    }
                }
            }
        }

        assert_eq!(whole, piecewise);
    }

    proptest::proptest! {
        /// Chunk partition law: concatenating the byte ranges a chunker cuts
        /// out of a stream reproduces the stream exactly, regardless of how
        /// the input is fed across `scan` calls.
        #[test]
        fn partition_reassembles_original(data in proptest::collection::vec(proptest::num::u8::ANY, 0..8192), feed in 1usize..500) {
            let params = ChunkerParams { min: 32, avg: 128, max: 512 };
            let mut chunker = Chunker::new(params);
            let mut reassembled = Vec::new();
            let mut pending = Vec::new();

            for piece in data.chunks(feed.max(1)) {
                let mut input = piece;
                loop {
                    match chunker.scan(input) {
                        Some(k) => {
                            pending.extend_from_slice(&input[..k]);
                            reassembled.append(&mut pending);
                            input = &input[k..];
                        }
                        None => {
                            pending.extend_from_slice(input);
                            break;
                        }
                    }
                }
            }
            reassembled.append(&mut pending);

            proptest::prop_assert_eq!(reassembled, data);
        }
    }
}
