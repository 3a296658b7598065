use crate::dsranges_structs::Interval;
use crate::merge;
use crate::sorts;

/// Subset of `bs` intersecting `a`, in input order.
///
/// Linear scan for one-off queries; repeated queries against the same set
/// should go through [`IntervalIndex`].
pub fn overlap(a: &Interval, bs: &[Interval]) -> Vec<Interval> {
    bs.iter().filter(|b| a.intersects(b)).copied().collect()
}

/// `as` minus every position covered by `bs`. The result is sorted and may
/// split an interval into several pieces.
pub fn subtract(intervals: &[Interval], remove: &[Interval]) -> Vec<Interval> {
    let remove = merge::merge(remove);
    let mut result = Vec::with_capacity(intervals.len());

    for interval in sorts::build_sorted_intervals(intervals) {
        let mut cursor = interval.start;
        // First removed interval that could touch the current one
        let first = remove.partition_point(|r| r.end <= interval.start);
        for r in &remove[first..] {
            if r.start >= interval.end {
                break;
            }
            if r.start > cursor {
                result.push(Interval::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
        }
        if cursor < interval.end {
            result.push(Interval::new(cursor, interval.end));
        }
    }

    result
}

/// Static overlap index over a set of intervals.
#[derive(Debug, Clone, Default)]
pub struct IntervalIndex {
    intervals: Vec<Interval>,
    max_len: i64,
}

impl IntervalIndex {
    pub fn new(intervals: &[Interval]) -> Self {
        let intervals = sorts::build_sorted_intervals(intervals);
        let max_len = intervals.iter().map(|x| x.len()).max().unwrap_or(0);
        IntervalIndex { intervals, max_len }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// All indexed intervals intersecting `query`.
    pub fn overlap<'a>(&'a self, query: &'a Interval) -> impl Iterator<Item = &'a Interval> + 'a {
        let lower = self
            .intervals
            .partition_point(|x| x.start < query.start - self.max_len);
        let upper = self.intervals.partition_point(|x| x.start < query.end);
        self.intervals[lower..upper.max(lower)]
            .iter()
            .filter(move |x| x.intersects(query))
    }

    pub fn overlaps(&self, query: &Interval) -> bool {
        self.overlap(query).next().is_some()
    }

    /// Total number of positions shared between `query` and indexed intervals.
    /// Overlapping indexed intervals are counted separately.
    pub fn overlap_size(&self, query: &Interval) -> i64 {
        self.overlap(query).map(|x| x.overlap_size(query)).sum()
    }

    /// Sum of the lengths of all indexed intervals.
    pub fn total_length(&self) -> i64 {
        self.intervals.iter().map(|x| x.len()).sum()
    }
}
