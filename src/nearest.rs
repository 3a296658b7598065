use radsort::sort_by_key;

use crate::dsranges_structs::Interval;
use crate::error::{Error, Result};
use crate::merge;
use crate::spliced_subsequence::Transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Sorted insulator positions for one `(contig, orientation)`.
///
/// Read-only once built; shared between all units touching the same contig.
#[derive(Debug, Clone, Default)]
pub struct BoundaryIndex {
    positions: Vec<i64>,
}

impl BoundaryIndex {
    pub fn new(positions: impl IntoIterator<Item = i64>) -> Self {
        let mut positions: Vec<i64> = positions.into_iter().collect();
        sort_by_key(&mut positions, |p| *p);
        positions.dedup();
        BoundaryIndex { positions }
    }

    pub fn positions(&self) -> &[i64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of boundaries strictly left of `pos`, i.e. the id of the
    /// boundary-delimited region `pos` falls into.
    #[inline]
    pub fn rank(&self, pos: i64) -> usize {
        self.positions.partition_point(|p| *p < pos)
    }

    /// Nearest boundary at or past `pos` in the given direction.
    ///
    /// Library entry point for callers that need the insulator flanking a
    /// position; the partition builder itself only compares ranks.
    pub fn closest(&self, pos: i64, side: Side) -> Result<i64> {
        let (first, last) = match (self.positions.first(), self.positions.last()) {
            (Some(&first), Some(&last)) if first <= pos && pos <= last => (first, last),
            (Some(&first), Some(&last)) => return Err(Error::Boundary { pos, first, last }),
            _ => {
                return Err(Error::Boundary {
                    pos,
                    first: 0,
                    last: 0,
                })
            }
        };

        let ind = match side {
            Side::Left => self.positions.partition_point(|p| *p <= pos) - 1,
            Side::Right => self.positions.partition_point(|p| *p < pos),
        };
        self.positions
            .get(ind)
            .copied()
            .ok_or(Error::Boundary { pos, first, last })
    }

    /// Number of boundaries `p` with `min(a, b) <= p < max(a, b)`.
    pub fn crossings(&self, a: i64, b: i64) -> usize {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.rank(hi) - self.rank(lo)
    }

    /// True when `a` and `b` fall into different boundary-delimited regions.
    pub fn separates(&self, a: i64, b: i64) -> bool {
        self.crossings(a, b) != 0
    }
}

/// Regions of `[0, length)` not covered by any interval. Coverage islands
/// closer than `tolerance` are joined first.
pub fn uncovered(covered: &[Interval], length: i64, tolerance: i64) -> Vec<Interval> {
    let islands = merge::merge_within(covered, tolerance);

    let mut gaps = Vec::with_capacity(islands.len() + 1);
    let mut cursor = 0;
    for island in islands {
        if island.start > cursor {
            gaps.push(Interval::new(cursor, island.start.min(length)));
        }
        cursor = cursor.max(island.end);
    }
    if cursor < length {
        gaps.push(Interval::new(cursor, length));
    }
    gaps.retain(|x| !x.is_empty());
    gaps
}

/// Insulator positions: edges of uncovered regions, splice sites of
/// well-annotated transcripts and curated insulators.
///
/// Each splice site contributes the 1bp flank on both sides of the junction.
pub fn derive_boundaries(
    uncovered: &[Interval],
    transcripts: &[Transcript],
    curated: &[Interval],
) -> BoundaryIndex {
    let mut positions = Vec::with_capacity(2 * (uncovered.len() + curated.len()));
    for region in uncovered.iter().chain(curated) {
        positions.push(region.start);
        positions.push(region.end);
    }
    for transcript in transcripts {
        for intron in transcript.introns() {
            positions.extend([intron.start, intron.start + 1]);
            positions.extend([intron.end - 1, intron.end]);
        }
    }
    BoundaryIndex::new(positions)
}
