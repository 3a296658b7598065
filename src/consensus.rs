use log::{error, info};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::dsranges_structs::{ContigKey, Interval, Orientation};
use crate::error::Result;
use crate::greedy::SampleSelection;
use crate::invrep::InvRepeat;
use crate::merge;

/// Fragments proposed for one original structure across all samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusRecord {
    pub key: ContigKey,
    pub structure: InvRepeat,
    /// `(sample, fragment)` pairs.
    pub proposals: Vec<(String, InvRepeat)>,
}

/// A structure cropped to its replicated parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredStructure {
    pub contig: String,
    pub orientation: Orientation,
    pub structure: InvRepeat,
    /// Lowest number of samples supporting any kept part.
    pub replication: usize,
    pub tag: String,
}

impl FilteredStructure {
    pub fn to_bed12(&self) -> String {
        self.structure.to_bed12(&self.contig, self.orientation, &self.tag)
    }
}

/// Group per-sample fragments by the structure they were cut from. Records
/// come out in first-seen order.
pub fn aggregate(
    selections: &[SampleSelection],
    structures: &FxHashMap<ContigKey, Vec<InvRepeat>>,
) -> Vec<ConsensusRecord> {
    let mut records: Vec<ConsensusRecord> = Vec::new();
    let mut slot: FxHashMap<(&ContigKey, &InvRepeat), usize> = FxHashMap::default();

    for selection in selections {
        let Some(originals) = structures.get(&selection.key) else {
            continue;
        };
        for fragment in &selection.fragments {
            for &ind in &fragment.origins {
                let Some(rna) = originals.get(ind) else {
                    error!(
                        "[{}|{}] fragment refers to unknown structure #{ind}",
                        selection.sample, selection.key
                    );
                    continue;
                };
                let pos = *slot.entry((&selection.key, rna)).or_insert_with(|| {
                    records.push(ConsensusRecord {
                        key: selection.key.clone(),
                        structure: rna.clone(),
                        proposals: Vec::new(),
                    });
                    records.len() - 1
                });
                records[pos]
                    .proposals
                    .push((selection.sample.clone(), fragment.structure.clone()));
            }
        }
    }
    records
}

/// Keep the parts of `rna` covered by fragments of at least
/// `min_replication` distinct samples.
///
/// Returns the cropped structure and the lowest support among kept parts,
/// or `None` when nothing is replicated.
pub fn filter_segments(
    rna: &InvRepeat,
    proposals: &[(String, InvRepeat)],
    min_replication: usize,
) -> Result<Option<(InvRepeat, usize)>> {
    // Left arms are enough: the right arm mirrors them in unrolled space
    let mut samples: FxHashMap<&str, usize> = FxHashMap::default();
    let mut mapped: Vec<(Interval, usize)> = Vec::new();
    for (sample, fragment) in proposals {
        let next = samples.len();
        let sid = *samples.entry(sample.as_str()).or_insert(next);
        for segment in fragment.segments() {
            for x in rna.map_left(&segment.left) {
                mapped.push((x, sid));
            }
        }
    }

    let mut breakpoints: Vec<i64> = mapped.iter().flat_map(|(x, _)| [x.start, x.end]).collect();
    radsort::sort(&mut breakpoints);
    breakpoints.dedup();

    let mut replicated = Vec::new();
    let mut min_count = usize::MAX;
    for w in breakpoints.windows(2) {
        let piece = Interval::new(w[0], w[1]);
        let support: FxHashSet<usize> = mapped
            .iter()
            .filter(|(x, _)| x.intersects(&piece))
            .map(|(_, sid)| *sid)
            .collect();
        if support.len() >= min_replication {
            replicated.push(piece);
            min_count = min_count.min(support.len());
        }
    }
    if replicated.is_empty() {
        return Ok(None);
    }

    let mut segments: Vec<_> = rna
        .from_unrolled(&merge::merge(&replicated))?
        .into_iter()
        .flat_map(|x| x.segments().to_vec())
        .collect();
    radsort::sort_by_key(&mut segments, |s| s.left.start);
    Ok(Some((InvRepeat::new(segments)?, min_count)))
}

/// Run the replication filter over all records. A record that fails is
/// reported and skipped.
pub fn filter(records: &[ConsensusRecord], min_replication: usize) -> Vec<FilteredStructure> {
    let mut result = Vec::new();
    for record in records {
        match filter_segments(&record.structure, &record.proposals, min_replication) {
            Ok(Some((structure, replication))) => result.push(FilteredStructure {
                contig: record.key.contig.clone(),
                orientation: record.key.orientation,
                structure,
                replication,
                tag: format!("N>={replication}"),
            }),
            Ok(None) => {}
            Err(e) => error!(
                "[{}] consensus failed for structure {:?}: {e}",
                record.key,
                record.structure.segments()
            ),
        }
    }
    info!(
        "{} / {} proposed structures are replicated in >= {min_replication} samples",
        result.len(),
        records.len()
    );
    result
}
