//! Fade law shared by every overlap layout.
//!
//! [`fade`] is the raw triangular taper. [`FadeTable`] turns it into the
//! write-back weights actually applied by the engine: each raw taper value is
//! divided by the steady-state sum of all tapers landing on the same output
//! phase, so overlapping passes of an identity transform add back up to the
//! input. With an even overlap count `k` that divides the period evenly this
//! reduces to `(2 / k) * fade`.

use crate::Work;

/// Triangular blend weight of a sample `offset` samples into the emitted part
/// of a window whose centre sits at `half`.
///
/// Returns 1 at the centre and 0 at the window start. With `overlap_count <= 1`
/// there is no neighbouring window to blend with and the weight is flat.
#[inline]
pub fn fade(offset: usize, half: Work, overlap_count: usize) -> Work {
    if overlap_count <= 1 || half <= 0.0 {
        return 1.0;
    }
    (1.0 - (offset as Work - half).abs() / half).clamp(0.0, 1.0)
}

/// Where one transform result lands in the output blocks held by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// First output sample (relative to the oldest held output block).
    pub out_offset: usize,
    /// Number of emitted samples.
    pub len: usize,
}

/// Precomputed per-sample write-back weights, one row per placement.
#[derive(Debug, Clone)]
pub struct FadeTable {
    rows: Vec<Box<[Work]>>,
}

impl FadeTable {
    /// Builds the weights for passes made of `placements` that repeat every
    /// `hop` output samples.
    pub fn build(placements: &[Placement], hop: usize, overlap_count: usize) -> Self {
        let raw: Vec<Vec<Work>> = placements
            .iter()
            .map(|p| {
                let half = p.len as Work / 2.0;
                (0..p.len).map(|e| fade(e, half, overlap_count)).collect()
            })
            .collect();

        let span = placements
            .iter()
            .map(|p| p.out_offset + p.len)
            .max()
            .unwrap_or(0);
        let mut pass = vec![0.0; span];
        for (p, taper) in placements.iter().zip(&raw) {
            for (e, w) in taper.iter().enumerate() {
                pass[p.out_offset + e] += w;
            }
        }

        let hop = hop.max(1);
        let mut coverage = vec![0.0; hop];
        for (u, w) in pass.iter().enumerate() {
            coverage[u % hop] += w;
        }

        let rows = placements
            .iter()
            .zip(raw)
            .map(|(p, taper)| {
                taper
                    .into_iter()
                    .enumerate()
                    .map(|(e, w)| {
                        let total = coverage[(p.out_offset + e) % hop];
                        if total > Work::EPSILON {
                            w / total
                        } else {
                            w
                        }
                    })
                    .collect::<Vec<_>>()
                    .into_boxed_slice()
            })
            .collect();

        Self { rows }
    }

    /// Weights of the `index`-th placement.
    pub fn weights(&self, index: usize) -> &[Work] {
        &self.rows[index]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
