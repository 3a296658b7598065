use std::cmp::Ordering;
use std::time::Instant;

use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cluster;
use crate::config::{ScoringConfig, SelectionConfig};
use crate::dsranges_structs::{ContigKey, Interval};
use crate::error::Result;
use crate::invrep::InvRepeat;
use crate::merge;
use crate::nearest::BoundaryIndex;
use crate::overlaps::IntervalIndex;
use crate::scoring::ScoreState;
use crate::tracks::OpenTracks;

/// A cropped structure together with the structures it was cut from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub structure: InvRepeat,
    /// Indices into the structure list of the `(contig, orientation)`.
    pub origins: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFragment {
    pub score: f64,
    pub fragment: Fragment,
}

/// Fragments accepted for one sample on one `(contig, orientation)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSelection {
    pub sample: String,
    pub key: ContigKey,
    pub fragments: Vec<Fragment>,
}

/// Crop the structures of one group down to the parts supported by peaks.
///
/// Peaks overlapping either arm envelope are projected to unrolled
/// coordinates, padded, merged and mapped back. Structures lacking peak
/// support on one of the arms produce nothing.
pub fn propose_fragments(
    structures: &[InvRepeat],
    group: &[usize],
    peaks: &IntervalIndex,
    padding: i64,
) -> Result<Vec<Fragment>> {
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut seen: FxHashMap<InvRepeat, usize> = FxHashMap::default();

    for &ind in group {
        let rna = &structures[ind];
        let (lbound, rbound) = (rna.left_bound(), rna.right_bound());
        let lov: Vec<Interval> = peaks.overlap(&lbound).copied().collect();
        let rov: Vec<Interval> = peaks.overlap(&rbound).copied().collect();
        if lov.is_empty() || rov.is_empty() {
            continue;
        }

        let length = rna.unrolled_len();
        let mut mapped = Vec::new();
        for peak in &lov {
            mapped.extend(rna.map_left(peak));
        }
        for peak in &rov {
            mapped.extend(rna.map_right(peak));
        }
        let padded: Vec<Interval> = mapped
            .iter()
            .map(|x| x.extend_within(padding, 0, length))
            .collect();

        for piece in rna.from_unrolled(&merge::merge(&padded))? {
            match seen.get(&piece) {
                Some(&pos) => fragments[pos].origins.push(ind),
                None => {
                    seen.insert(piece.clone(), fragments.len());
                    fragments.push(Fragment {
                        structure: piece,
                        origins: vec![ind],
                    });
                }
            }
        }
    }
    Ok(fragments)
}

/// Descending score; ties by bounding range start, then by arm list.
fn by_score(a: &ScoredFragment, b: &ScoredFragment) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            let (x, y) = (&a.fragment.structure, &b.fragment.structure);
            x.bounding_range().start.cmp(&y.bounding_range().start)
        })
        .then_with(|| a.fragment.structure.cmp(&b.fragment.structure))
}

fn clashes(rna: &InvRepeat, taken: &[Interval]) -> bool {
    let (lbound, rbound) = (rna.left_bound(), rna.right_bound());
    taken
        .iter()
        .any(|x| x.intersects(&lbound) || x.intersects(&rbound))
}

/// Iterative greedy selection with signal consumption.
///
/// Every pass rescores the remaining fragments, accepts the best ones whose
/// arm envelopes do not clash with any accepted fragment, resolves them in
/// acceptance order and defers the rest. Fragments clashing with an earlier
/// pass are dropped, so the returned arm envelopes never overlap.
pub fn select(
    state: &mut ScoreState,
    fragments: Vec<Fragment>,
    config: &SelectionConfig,
) -> Result<Vec<ScoredFragment>> {
    let mut unresolved = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let score = state.score(&fragment.structure)?;
        unresolved.push(ScoredFragment { score, fragment });
    }
    let max_score = unresolved.iter().map(|x| x.score).fold(0f64, f64::max);
    let floor = config.prune_ratio * max_score;
    unresolved.retain(|x| x.score >= floor);

    let mut solution: Vec<ScoredFragment> = Vec::new();
    let mut accepted: Vec<Interval> = Vec::new();
    let mut iterations = 0;
    while !unresolved.is_empty() {
        if iterations == config.max_iterations {
            warn!(
                "Selection stopped after {iterations} passes with {} fragments left",
                unresolved.len()
            );
            break;
        }
        iterations += 1;

        let mut rescored = Vec::with_capacity(unresolved.len());
        for mut candidate in unresolved {
            candidate.score = state.score(&candidate.fragment.structure)?;
            if candidate.score >= config.min_score && candidate.score >= floor {
                rescored.push(candidate);
            }
        }
        rescored.sort_by(by_score);

        let mut taken: Vec<Interval> = Vec::new();
        let mut resolved = Vec::new();
        let mut deferred = Vec::new();
        for candidate in rescored {
            let rna = &candidate.fragment.structure;
            if clashes(rna, &accepted) {
                continue;
            }
            if clashes(rna, &taken) {
                deferred.push(candidate);
            } else {
                taken.extend([rna.left_bound(), rna.right_bound()]);
                resolved.push(candidate);
            }
        }

        for candidate in &resolved {
            state.resolve(&candidate.fragment.structure)?;
        }
        accepted.extend(taken);
        solution.extend(resolved);
        unresolved = deferred;
    }
    debug!("{} fragments selected in {iterations} passes", solution.len());
    Ok(solution)
}

/// Keep the smallest top-scoring subset retaining `retention` of the total
/// score.
pub fn trim(mut solution: Vec<ScoredFragment>, retention: f64) -> Vec<ScoredFragment> {
    solution.sort_by(by_score);

    let mut total: f64 = solution.iter().map(|x| x.score).sum();
    let desired = retention * total;
    while let Some(last) = solution.last() {
        if total > desired && total - last.score >= desired {
            total -= last.score;
            solution.pop();
        } else {
            break;
        }
    }
    solution
}

/// Per-sample selection over every connectivity group of one
/// `(contig, orientation)`.
#[allow(clippy::too_many_arguments)]
pub fn optimize(
    sample: &str,
    key: &ContigKey,
    structures: &[InvRepeat],
    peaks: &IntervalIndex,
    tracks: &OpenTracks,
    boundaries: &BoundaryIndex,
    selection: &SelectionConfig,
    scoring: ScoringConfig,
) -> Result<SampleSelection> {
    let start = Instant::now();
    let groups = cluster::structure_groups(structures, selection.max_distance);

    let mut fragments = Vec::new();
    for group in &groups {
        let span = group
            .iter()
            .map(|&ind| structures[ind].bounding_range())
            .reduce(|a, b| Interval::new(a.start.min(b.start), a.end.max(b.end)));
        let Some(span) = span else {
            continue;
        };

        let local: Vec<Interval> = peaks.overlap(&span).copied().collect();
        let pindex = IntervalIndex::new(&local);

        let proposed = propose_fragments(structures, group, &pindex, selection.padding)?;
        if proposed.is_empty() {
            continue;
        }

        let wstart = proposed
            .iter()
            .map(|x| x.structure.bounding_range().start)
            .min()
            .unwrap_or(span.start);
        let wend = proposed
            .iter()
            .map(|x| x.structure.bounding_range().end)
            .max()
            .unwrap_or(span.end);
        let mut state = tracks.score(wstart, wend, boundaries, pindex, scoring)?;

        let solution = select(&mut state, proposed, selection)?;
        fragments.extend(trim(solution, selection.retention).into_iter().map(|x| x.fragment));
    }

    debug!(
        "[{sample}|{key}] {} fragments from {} groups in {:?}",
        fragments.len(),
        groups.len(),
        start.elapsed()
    );
    Ok(SampleSelection {
        sample: sample.to_string(),
        key: key.clone(),
        fragments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsranges_structs::Orientation;
    use crate::invrep::StemSegment;

    fn iv(start: i64, end: i64) -> Interval {
        Interval::new(start, end)
    }

    fn hairpin(ls: i64, le: i64, rs: i64, re: i64) -> InvRepeat {
        InvRepeat::new(vec![StemSegment::new(iv(ls, le), iv(rs, re)).unwrap()]).unwrap()
    }

    fn scored(score: f64, rna: InvRepeat) -> ScoredFragment {
        ScoredFragment {
            score,
            fragment: Fragment {
                structure: rna,
                origins: vec![0],
            },
        }
    }

    fn arms_disjoint(fragments: &[InvRepeat]) -> bool {
        for (i, a) in fragments.iter().enumerate() {
            for b in &fragments[i + 1..] {
                if a.left_bound().intersects(&b.left_bound())
                    || a.right_bound().intersects(&b.right_bound())
                {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_trim_keeps_minimal_prefix() {
        let solution = vec![
            scored(1.0, hairpin(0, 1, 2, 3)),
            scored(50.0, hairpin(10, 11, 12, 13)),
            scored(40.0, hairpin(20, 21, 22, 23)),
            scored(9.0, hairpin(30, 31, 32, 33)),
        ];
        let kept = trim(solution, 0.9);
        let scores: Vec<f64> = kept.iter().map(|x| x.score).collect();
        // total 100: dropping 1 keeps 99, dropping 9 keeps 90, dropping 40 would keep 50
        assert_eq!(scores, vec![50.0, 40.0]);

        let total: f64 = scores.iter().sum();
        let last = scores[scores.len() - 1];
        assert!(total - last < 0.9 * 100.0);
        assert!(trim(vec![], 0.9).is_empty());
    }

    #[test]
    fn test_ties_break_by_position() {
        let mut items = vec![
            scored(1.0, hairpin(30, 31, 32, 33)),
            scored(1.0, hairpin(10, 11, 12, 13)),
            scored(2.0, hairpin(50, 51, 52, 53)),
        ];
        items.sort_by(by_score);
        let starts: Vec<i64> = items
            .iter()
            .map(|x| x.fragment.structure.bounding_range().start)
            .collect();
        assert_eq!(starts, vec![50, 10, 30]);
    }

    #[test]
    fn test_propose_requires_both_arms() {
        let rnas = vec![hairpin(1000, 1100, 2000, 2100), hairpin(5000, 5100, 6000, 6100)];
        // First structure is supported on both arms, the second one only on the left
        let peaks = IntervalIndex::new(&[iv(1040, 1060), iv(2000, 2010), iv(5000, 5100)]);
        let fragments = propose_fragments(&rnas, &[0, 1], &peaks, 20).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].origins, vec![0]);
        // Left peak maps to 40-60, right peak to 90-100; padding merges them into 20-100
        let segments: Vec<(Interval, Interval)> = fragments[0]
            .structure
            .segments()
            .iter()
            .map(|s| (s.left, s.right))
            .collect();
        assert_eq!(segments, vec![(iv(1020, 1100), iv(2000, 2080))]);

        // Without enough padding the gap splits the structure in two
        let fragments = propose_fragments(&rnas, &[0], &peaks, 10).unwrap();
        assert_eq!(fragments.len(), 2);
    }

    #[test]
    fn test_propose_shares_fragments() {
        // The same stem is predicted twice, once with an extra outer segment
        let inner = StemSegment::new(iv(1000, 1100), iv(2000, 2100)).unwrap();
        let outer = StemSegment::new(iv(500, 600), iv(2500, 2600)).unwrap();
        let rnas = vec![
            InvRepeat::new(vec![inner]).unwrap(),
            InvRepeat::new(vec![outer, inner]).unwrap(),
        ];
        let peaks = IntervalIndex::new(&[iv(1000, 1100), iv(2000, 2100)]);
        let fragments = propose_fragments(&rnas, &[0, 1], &peaks, 0).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].structure, rnas[0]);
        assert_eq!(fragments[0].origins, vec![0, 1]);
    }

    #[test]
    fn test_select_consumes_shared_signal() {
        let boundaries = BoundaryIndex::default();
        let mut scores = vec![0f32; 400];
        scores[0..50].fill(10.0);
        scores[300..350].fill(10.0);
        let mut state = ScoreState::new(
            iv(0, 400),
            scores,
            &boundaries,
            IntervalIndex::new(&[iv(0, 50), iv(300, 350)]),
            ScoringConfig::default(),
        );

        let best = hairpin(0, 50, 300, 350);
        // Overlaps the best one on both arms and only explains already used signal
        let shadow = hairpin(10, 40, 310, 340);
        let unrelated = hairpin(100, 150, 200, 250);
        let fragments = vec![
            Fragment { structure: shadow, origins: vec![1] },
            Fragment { structure: best.clone(), origins: vec![0] },
            Fragment { structure: unrelated, origins: vec![2] },
        ];
        let solution = select(&mut state, fragments, &SelectionConfig::default()).unwrap();
        assert_eq!(solution.len(), 1);
        assert_eq!(solution[0].fragment.structure, best);
        assert_eq!(solution[0].score, 500.0);
    }

    #[test]
    fn test_selected_arms_never_overlap() {
        let boundaries = BoundaryIndex::default();
        let mut state = ScoreState::new(
            iv(0, 1000),
            vec![1f32; 1000],
            &boundaries,
            IntervalIndex::new(&[iv(0, 1000)]),
            ScoringConfig::default(),
        );
        let candidates = vec![
            hairpin(0, 100, 900, 1000),
            hairpin(50, 150, 800, 900),
            hairpin(200, 300, 600, 700),
            hairpin(250, 280, 650, 680),
        ];
        let fragments = candidates
            .iter()
            .enumerate()
            .map(|(i, x)| Fragment { structure: x.clone(), origins: vec![i] })
            .collect();

        let solution = select(&mut state, fragments, &SelectionConfig::default()).unwrap();
        let selected: Vec<InvRepeat> =
            solution.iter().map(|x| x.fragment.structure.clone()).collect();
        assert_eq!(selected, vec![hairpin(0, 100, 900, 1000), hairpin(200, 300, 600, 700)]);

        let trimmed = trim(solution, 0.9);
        let kept: Vec<InvRepeat> = trimmed.iter().map(|x| x.fragment.structure.clone()).collect();
        assert!(!kept.is_empty());
        assert!(arms_disjoint(&kept));
    }

    #[test]
    fn test_deferred_fragment_clashing_with_earlier_pass_is_dropped() {
        let boundaries = BoundaryIndex::default();
        let mut state = ScoreState::new(
            iv(0, 1000),
            vec![1f32; 1000],
            &boundaries,
            IntervalIndex::new(&[iv(0, 1000)]),
            ScoringConfig::default(),
        );
        let fragments = vec![
            Fragment { structure: hairpin(0, 100, 900, 1000), origins: vec![0] },
            Fragment { structure: hairpin(50, 150, 800, 900), origins: vec![1] },
        ];
        let solution = select(&mut state, fragments, &SelectionConfig::default()).unwrap();
        assert_eq!(solution.len(), 1);
        assert_eq!(solution[0].fragment.structure, hairpin(0, 100, 900, 1000));
    }

    #[test]
    fn test_optimize_end_to_end() {
        let key = ContigKey::new("chr1", Orientation::Forward).unwrap();
        let mut diff = vec![0f32; 3000];
        diff[1000..1100].fill(5.0);
        diff[2000..2100].fill(5.0);
        let tracks = OpenTracks::from_diff("chr1", Orientation::Forward, diff);
        let rnas = vec![hairpin(1000, 1100, 2000, 2100), hairpin(100, 200, 300, 400)];
        let peaks = IntervalIndex::new(&[iv(990, 1110), iv(1995, 2105)]);

        let selection = optimize(
            "A",
            &key,
            &rnas,
            &peaks,
            &tracks,
            &BoundaryIndex::default(),
            &SelectionConfig::default(),
            ScoringConfig::default(),
        )
        .unwrap();
        assert_eq!(selection.sample, "A");
        assert_eq!(selection.fragments.len(), 1);
        assert_eq!(selection.fragments[0].structure, rnas[0]);
        assert_eq!(selection.fragments[0].origins, vec![0]);
    }
}
