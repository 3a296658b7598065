use crate::dsranges_structs::Interval;
use crate::sorts;

/// Sweep-line merge. Intervals separated by at most `slack` positions are
/// joined; bookended intervals are always joined.
///
/// Returns the merged intervals together with the number of inputs in each.
pub fn sweep_line_merge(intervals: &[Interval], slack: i64) -> (Vec<Interval>, Vec<usize>) {
    let mut merged = Vec::with_capacity(intervals.len());
    let mut counts = Vec::with_capacity(intervals.len());

    if intervals.is_empty() {
        return (merged, counts);
    };

    let events = sorts::build_sorted_events_single_collection(intervals, slack);

    let mut current_start: i64 = 0;
    let mut active_count: usize = 0;
    let mut current_cluster_count: usize = 0;

    for e in events {
        if active_count == 0 {
            current_start = e.pos;
            current_cluster_count = 0;
        }

        if e.is_start {
            active_count += 1;
            current_cluster_count += 1;
        } else {
            active_count -= 1;
            if active_count == 0 {
                merged.push(Interval::new(current_start, e.pos - slack));
                counts.push(current_cluster_count);
            }
        }
    }

    (merged, counts)
}

/// Sorted, non-overlapping union of `intervals`. `merge(&[]) == []`.
pub fn merge(intervals: &[Interval]) -> Vec<Interval> {
    sweep_line_merge(intervals, 0).0
}

/// Like [`merge`], but also joins intervals at most `distance` apart.
pub fn merge_within(intervals: &[Interval], distance: i64) -> Vec<Interval> {
    sweep_line_merge(intervals, distance.max(0)).0
}
