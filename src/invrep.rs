use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::dsranges_structs::{Interval, Orientation};
use crate::error::{Error, Result};
use crate::merge;

/// One base-paired block: `left` pairs with `right` in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StemSegment {
    pub left: Interval,
    pub right: Interval,
}

impl StemSegment {
    pub fn new(left: Interval, right: Interval) -> Result<Self> {
        let segment = StemSegment { left, right };
        segment.validate()?;
        Ok(segment)
    }

    fn validate(&self) -> Result<()> {
        if self.left.is_empty() || self.left.len() != self.right.len() {
            return Err(Error::MalformedStructure(format!(
                "arm lengths differ or are empty: {} vs {}",
                self.left, self.right
            )));
        }
        if self.left.end > self.right.start {
            return Err(Error::MalformedStructure(format!(
                "left arm {} must precede right arm {}",
                self.left, self.right
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> i64 {
        self.left.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Drop `head` paired positions from the outer end and `tail` from the
    /// inner (loop-facing) end. Base pairing is preserved.
    fn crop(&self, head: i64, tail: i64) -> StemSegment {
        StemSegment {
            left: Interval::new(self.left.start + head, self.left.end - tail),
            right: Interval::new(self.right.start + tail, self.right.end - head),
        }
    }
}

/// Fold-back (inverted repeat) structure: stem segments ordered by left arm.
///
/// Left arms are strictly increasing and non-overlapping, right arms run the
/// opposite way. Instances are immutable; cropping produces new structures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<StemSegment>", into = "Vec<StemSegment>")]
pub struct InvRepeat {
    segments: Vec<StemSegment>,
}

impl InvRepeat {
    pub fn new(segments: Vec<StemSegment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::MalformedStructure(
                "inverted repeat without segments".to_string(),
            ));
        }
        for segment in &segments {
            segment.validate()?;
        }
        for (prv, nxt) in segments.iter().zip(segments.iter().skip(1)) {
            if prv.left.end > nxt.left.start || nxt.right.end > prv.right.start {
                return Err(Error::MalformedStructure(format!(
                    "stem segments overlap or are out of order: ({}, {}) then ({}, {})",
                    prv.left, prv.right, nxt.left, nxt.right
                )));
            }
        }
        Ok(InvRepeat { segments })
    }

    pub fn segments(&self) -> &[StemSegment] {
        &self.segments
    }

    /// Total length of the unrolled coordinate space (sum of arm lengths).
    pub fn unrolled_len(&self) -> i64 {
        self.segments.iter().map(|s| s.len()).sum()
    }

    pub fn bounding_range(&self) -> Interval {
        Interval::new(self.segments[0].left.start, self.segments[0].right.end)
    }

    pub fn left_bound(&self) -> Interval {
        let last = self.segments.len() - 1;
        Interval::new(self.segments[0].left.start, self.segments[last].left.end)
    }

    pub fn right_bound(&self) -> Interval {
        let last = self.segments.len() - 1;
        Interval::new(self.segments[last].right.start, self.segments[0].right.end)
    }

    /// All arm blocks in genomic order.
    pub fn blocks(&self) -> Vec<Interval> {
        let mut blocks = Vec::with_capacity(2 * self.segments.len());
        blocks.extend(self.segments.iter().map(|s| s.left));
        blocks.extend(self.segments.iter().rev().map(|s| s.right));
        blocks
    }

    /// Unrolled offset of every segment.
    fn offsets(&self) -> impl Iterator<Item = (i64, &StemSegment)> {
        self.segments.iter().scan(0i64, |offset, segment| {
            let current = *offset;
            *offset += segment.len();
            Some((current, segment))
        })
    }

    /// Map the part of `interval` covering left arms to unrolled coordinates.
    pub fn map_left(&self, interval: &Interval) -> Vec<Interval> {
        let mut mapped = Vec::new();
        for (offset, segment) in self.offsets() {
            if let Some(ov) = segment.left.intersection(interval) {
                mapped.push(Interval::new(
                    offset + ov.start - segment.left.start,
                    offset + ov.end - segment.left.start,
                ));
            }
        }
        merge::merge(&mapped)
    }

    /// Map the part of `interval` covering right arms to unrolled coordinates.
    pub fn map_right(&self, interval: &Interval) -> Vec<Interval> {
        let mut mapped = Vec::new();
        for (offset, segment) in self.offsets() {
            if let Some(ov) = segment.right.intersection(interval) {
                mapped.push(Interval::new(
                    offset + segment.right.end - ov.end,
                    offset + segment.right.end - ov.start,
                ));
            }
        }
        merge::merge(&mapped)
    }

    /// Unrolled projection of a genomic interval through both arms.
    pub fn to_unrolled(&self, interval: &Interval) -> Vec<Interval> {
        let mut mapped = self.map_left(interval);
        mapped.extend(self.map_right(interval));
        merge::merge(&mapped)
    }

    /// Map unrolled ranges back to genomic structures, one per range.
    ///
    /// The first and last segment touched by a range are cropped on both arms
    /// symmetrically; segments inside the range are copied as is.
    pub fn from_unrolled(&self, ranges: &[Interval]) -> Result<Vec<InvRepeat>> {
        let total = self.unrolled_len();
        let mut ranges = ranges.to_vec();
        radsort::sort_by_key(&mut ranges, |r| r.end);
        radsort::sort_by_key(&mut ranges, |r| r.start);

        let mut result = Vec::with_capacity(ranges.len());

        // [start, end) is the unrolled span of segment `ind`
        let (mut ind, mut start, mut end) = (0usize, 0i64, self.segments[0].len());
        for range in ranges {
            if range.is_empty() {
                continue;
            }
            if range.start < 0 || range.end > total {
                return Err(Error::Unrolled {
                    start: range.start,
                    end: range.end,
                    length: total,
                });
            }

            // Overlapping input ranges may start behind the cursor
            if range.start < start {
                (ind, start, end) = (0, 0, self.segments[0].len());
            }
            while end <= range.start {
                ind += 1;
                start = end;
                end += self.segments[ind].len();
            }

            let mut cache = Vec::new();
            loop {
                let head = (range.start - start).max(0);
                let tail = (end - range.end).max(0);
                cache.push(self.segments[ind].crop(head, tail));

                if range.end <= end || ind + 1 == self.segments.len() {
                    break;
                }
                ind += 1;
                start = end;
                end += self.segments[ind].len();
            }

            debug_assert_eq!(cache.iter().map(|s| s.len()).sum::<i64>(), range.len());
            result.push(InvRepeat::new(cache)?);
        }
        Ok(result)
    }

    /// BED12 line (without trailing newline) with arm blocks as exons.
    pub fn to_bed12(&self, contig: &str, orientation: Orientation, name: &str) -> String {
        bed12(contig, orientation, name, &self.blocks())
    }
}

/// BED12 line spanning all `blocks`; overlapping blocks are merged first.
pub fn bed12(contig: &str, orientation: Orientation, name: &str, blocks: &[Interval]) -> String {
    let blocks = merge::merge(blocks);
    let (start, end) = match (blocks.first(), blocks.last()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => (0, 0),
    };
    let sizes: String = blocks.iter().map(|b| format!("{},", b.len())).collect();
    let starts: String = blocks.iter().map(|b| format!("{},", b.start - start)).collect();
    format!(
        "{}\t{}\t{}\t{}\t0\t{}\t{}\t{}\t0\t{}\t{}\t{}",
        contig,
        start,
        end,
        name,
        orientation,
        start,
        end,
        blocks.len(),
        sizes,
        starts
    )
}

impl TryFrom<Vec<StemSegment>> for InvRepeat {
    type Error = Error;

    fn try_from(segments: Vec<StemSegment>) -> Result<Self> {
        InvRepeat::new(segments)
    }
}

impl From<InvRepeat> for Vec<StemSegment> {
    fn from(value: InvRepeat) -> Self {
        value.segments
    }
}

/// Collapse duplicated predictions, keeping the first occurrence, and sort
/// the survivors by bounding range start.
pub fn deduplicate(structures: Vec<InvRepeat>) -> Vec<InvRepeat> {
    let mut seen: FxHashSet<InvRepeat> = FxHashSet::default();
    let mut unique = Vec::with_capacity(structures.len());
    for rna in structures {
        if seen.insert(rna.clone()) {
            unique.push(rna);
        }
    }
    radsort::sort_by_key(&mut unique, |x| x.bounding_range().start);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: i64, end: i64) -> Interval {
        Interval::new(start, end)
    }

    fn seg(ls: i64, le: i64, rs: i64, re: i64) -> StemSegment {
        StemSegment::new(iv(ls, le), iv(rs, re)).unwrap()
    }

    /// Two stems of 50bp: 100-150 pairs with 450-500, 200-250 with 300-350.
    fn hairpin() -> InvRepeat {
        InvRepeat::new(vec![seg(100, 150, 450, 500), seg(200, 250, 300, 350)]).unwrap()
    }

    #[test]
    fn test_construction_rejects_malformed() {
        assert!(StemSegment::new(iv(0, 10), iv(20, 25)).is_err());
        assert!(StemSegment::new(iv(20, 30), iv(10, 20)).is_err());
        assert!(InvRepeat::new(vec![]).is_err());
        // Right arms must decrease
        let bad = InvRepeat::new(vec![seg(0, 10, 100, 110), seg(20, 30, 120, 130)]);
        assert!(bad.is_err());
        // Left arms must not overlap
        let bad = InvRepeat::new(vec![seg(0, 10, 200, 210), seg(5, 15, 100, 110)]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_bounds() {
        let rna = hairpin();
        assert_eq!(rna.bounding_range(), iv(100, 500));
        assert_eq!(rna.left_bound(), iv(100, 250));
        assert_eq!(rna.right_bound(), iv(300, 500));
        assert_eq!(rna.unrolled_len(), 100);
        assert_eq!(
            rna.blocks(),
            vec![iv(100, 150), iv(200, 250), iv(300, 350), iv(450, 500)]
        );
    }

    #[test]
    fn test_map_arms() {
        let rna = hairpin();
        // Left arm: 110-150 of the first segment, 200-210 of the second
        assert_eq!(rna.map_left(&iv(110, 210)), vec![iv(10, 60)]);
        // Right arm: 490-500 pairs with 100-110
        assert_eq!(rna.map_right(&iv(490, 520)), vec![iv(0, 10)]);
        // 300-310 pairs with 240-250, the inner end of segment two
        assert_eq!(rna.map_right(&iv(290, 310)), vec![iv(90, 100)]);
        assert!(rna.map_left(&iv(150, 200)).is_empty());
        assert_eq!(rna.to_unrolled(&iv(0, 1000)), vec![iv(0, 100)]);
    }

    #[test]
    fn test_round_trip_full_span() {
        let rna = hairpin();
        let unrolled = rna.to_unrolled(&rna.bounding_range());
        let restored = rna.from_unrolled(&unrolled).unwrap();
        assert_eq!(restored, vec![rna]);
    }

    #[test]
    fn test_from_unrolled_crops_symmetrically() {
        let rna = hairpin();
        let cropped = rna.from_unrolled(&[iv(10, 70)]).unwrap();
        assert_eq!(cropped.len(), 1);
        assert_eq!(
            cropped[0].segments(),
            &[seg(110, 150, 450, 490), seg(200, 220, 330, 350)]
        );

        let inner = rna.from_unrolled(&[iv(5, 15)]).unwrap();
        assert_eq!(inner[0].segments(), &[seg(105, 115, 485, 495)]);
    }

    #[test]
    fn test_from_unrolled_segment_boundaries() {
        let rna = hairpin();
        let pieces = rna.from_unrolled(&[iv(50, 100), iv(0, 50)]).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].segments(), &[rna.segments()[0]]);
        assert_eq!(pieces[1].segments(), &[rna.segments()[1]]);

        let covered: i64 = pieces.iter().map(|x| x.unrolled_len()).sum();
        assert_eq!(covered, rna.unrolled_len());
    }

    #[test]
    fn test_round_trip_split_ranges() {
        // Unrolled spans: 0-30, 30-50, 50-90
        let rna = InvRepeat::new(vec![
            seg(0, 30, 370, 400),
            seg(50, 70, 300, 320),
            seg(100, 140, 200, 240),
        ])
        .unwrap();
        // Cut at a segment boundary (30) and inside the last segment (70)
        let ranges = vec![iv(70, 90), iv(0, 30), iv(30, 70)];
        let pieces = rna.from_unrolled(&ranges).unwrap();

        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].segments(), &[seg(0, 30, 370, 400)]);
        assert_eq!(
            pieces[1].segments(),
            &[seg(50, 70, 300, 320), seg(100, 120, 220, 240)]
        );
        assert_eq!(pieces[2].segments(), &[seg(120, 140, 200, 220)]);

        // Every piece maps back onto its own range through either arm
        for (piece, range) in pieces.iter().zip([iv(0, 30), iv(30, 70), iv(70, 90)]) {
            let mut left = Vec::new();
            for segment in piece.segments() {
                assert_eq!(rna.map_left(&segment.left), rna.map_right(&segment.right));
                left.extend(rna.map_left(&segment.left));
            }
            assert_eq!(merge::merge(&left), vec![range]);
        }

        let covered: i64 = pieces.iter().map(|x| x.unrolled_len()).sum();
        assert_eq!(covered, rna.unrolled_len());
        let blocks: Vec<Interval> = pieces.iter().flat_map(|x| x.blocks()).collect();
        assert_eq!(merge::merge(&blocks), merge::merge(&rna.blocks()));
    }

    #[test]
    fn test_from_unrolled_rejects_out_of_range() {
        let rna = hairpin();
        assert!(rna.from_unrolled(&[iv(90, 101)]).is_err());
        assert!(rna.from_unrolled(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_serde_validates() {
        let rna = hairpin();
        let json = serde_json::to_string(&rna).unwrap();
        let parsed: InvRepeat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rna);

        let broken = r#"[{"left":{"start":0,"end":10},"right":{"start":20,"end":25}}]"#;
        assert!(serde_json::from_str::<InvRepeat>(broken).is_err());
    }

    #[test]
    fn test_bed12() {
        let line = hairpin().to_bed12("chr1", Orientation::Forward, "N>=2");
        assert_eq!(
            line,
            "chr1\t100\t500\tN>=2\t0\t+\t100\t500\t0\t4\t50,50,50,50,\t0,100,200,350,"
        );
    }

    #[test]
    fn test_deduplicate() {
        let a = hairpin();
        let b = InvRepeat::new(vec![seg(10, 20, 30, 40)]).unwrap();
        let unique = deduplicate(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(unique, vec![b, a]);
    }
}
