use radsort::sort_by_key;

use crate::dsranges_structs::{Event, Interval, Node};

pub fn sort_intervals(intervals: &mut [Interval]) {
    sort_by_key(intervals, |i| i.end);
    sort_by_key(intervals, |i| i.start);
}

pub fn build_sorted_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted = intervals.to_vec();
    sort_intervals(&mut sorted);
    sorted
}

/// Nodes sorted by block start (ties broken by end, then owner).
pub fn build_sorted_nodes(mut nodes: Vec<Node>) -> Vec<Node> {
    sort_by_key(&mut nodes, |n| n.idx);
    sort_by_key(&mut nodes, |n| n.block.end);
    sort_by_key(&mut nodes, |n| n.block.start);
    nodes
}

/// Start/end events for a single collection. End events are pushed `slack`
/// positions to the right, so intervals closer than `slack` share a run.
pub fn build_sorted_events_single_collection(intervals: &[Interval], slack: i64) -> Vec<Event> {
    let mut events: Vec<Event> = Vec::with_capacity(2 * intervals.len());

    for (idx, interval) in intervals.iter().enumerate() {
        if interval.is_empty() {
            continue;
        }
        events.push(Event {
            pos: interval.start,
            is_start: true,
            idx,
        });
        events.push(Event {
            pos: interval.end + slack,
            is_start: false,
            idx,
        });
    }

    // Sort events by:
    // 1. pos (ascending)
    // 2. is_start before is_end (if pos ties), so bookended intervals are chained
    sort_by_key(&mut events, |e| !e.is_start);
    sort_by_key(&mut events, |e| e.pos);

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_nodes() {
        let nodes = vec![
            Node { idx: 2, block: Interval::new(50, 60) },
            Node { idx: 0, block: Interval::new(10, 30) },
            Node { idx: 1, block: Interval::new(10, 20) },
        ];
        let sorted = build_sorted_nodes(nodes);
        let order: Vec<usize> = sorted.iter().map(|n| n.idx).collect();
        assert_eq!(order, vec![1, 0, 2]);
    }

    #[test]
    fn test_events_start_before_end() {
        let events = build_sorted_events_single_collection(
            &[Interval::new(0, 5), Interval::new(5, 10)],
            0,
        );
        let kinds: Vec<(i64, bool)> = events.iter().map(|e| (e.pos, e.is_start)).collect();
        assert_eq!(kinds, vec![(0, true), (5, true), (5, false), (10, false)]);
    }
}
