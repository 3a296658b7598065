use std::time::Instant;

use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::dsranges_structs::{ContigKey, Interval, Node, Orientation};
use crate::error::{Error, Result};
use crate::invrep::{self, InvRepeat};
use crate::merge;
use crate::nearest::BoundaryIndex;
use crate::overlaps::{self, IntervalIndex};
use crate::sorts;
use crate::spliced_subsequence::TranscriptIndex;

/// A member of the connectivity graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Peak(Interval),
    Structure(InvRepeat),
}

impl Element {
    /// Genomic blocks anchoring this element in the graph.
    fn blocks(&self) -> Vec<Interval> {
        match self {
            Element::Peak(peak) => vec![*peak],
            Element::Structure(rna) => rna.blocks(),
        }
    }
}

/// Connected group of peaks and structures on one `(contig, orientation)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub id: String,
    pub contig: String,
    pub orientation: Orientation,
    pub structures: Vec<InvRepeat>,
    pub peaks: Vec<Interval>,
}

impl Partition {
    /// Span of every peak and structure arm in the partition.
    pub fn envelope(&self) -> Option<Interval> {
        let ranges = self
            .structures
            .iter()
            .map(|x| x.bounding_range())
            .chain(self.peaks.iter().copied());
        ranges.fold(None, |acc: Option<Interval>, x| match acc {
            None => Some(x),
            Some(acc) => Some(Interval::new(acc.start.min(x.start), acc.end.max(x.end))),
        })
    }

    pub fn blocks(&self) -> Vec<Interval> {
        let mut blocks: Vec<Interval> = self.structures.iter().flat_map(|x| x.blocks()).collect();
        blocks.extend_from_slice(&self.peaks);
        merge::merge(&blocks)
    }

    pub fn to_bed12(&self) -> String {
        invrep::bed12(&self.contig, self.orientation, &self.id, &self.blocks())
    }
}

/// Manually curated regions of one contig. Applied to both orientations.
#[derive(Debug, Clone, Default)]
pub struct CuratedRegions {
    regions: IntervalIndex,
}

impl CuratedRegions {
    pub fn new(regions: &[Interval]) -> Self {
        CuratedRegions {
            regions: IntervalIndex::new(regions),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn intervals(&self) -> &[Interval] {
        self.regions.intervals()
    }

    /// Region holding the whole peak. A peak touching a region without
    /// lying fully inside exactly one of them is ambiguous.
    fn assign_peak(&self, key: &ContigKey, peak: &Interval) -> Result<Option<Interval>> {
        let hits: Vec<Interval> = self.regions.overlap(peak).copied().collect();
        match hits.as_slice() {
            [] => Ok(None),
            [region] if region.contains(peak) => Ok(Some(*region)),
            [region] => Err(curated_error(
                key,
                format!("peak {peak} is only partially inside curated region {region}"),
            )),
            _ => Err(curated_error(
                key,
                format!("peak {peak} overlaps {} curated regions", hits.len()),
            )),
        }
    }

    /// Region holding both arm envelopes of the structure, if any.
    fn assign_structure(&self, key: &ContigKey, rna: &InvRepeat) -> Result<Option<Interval>> {
        let (lb, rb) = (rna.left_bound(), rna.right_bound());
        let brange = rna.bounding_range();
        let hits: Vec<Interval> = self
            .regions
            .overlap(&brange)
            .filter(|x| x.contains(&lb) && x.contains(&rb))
            .copied()
            .collect();
        match hits.as_slice() {
            [] => Ok(None),
            [region] => Ok(Some(*region)),
            _ => Err(curated_error(
                key,
                format!("structure at {brange} fits {} curated regions", hits.len()),
            )),
        }
    }
}

fn curated_error(key: &ContigKey, message: String) -> Error {
    Error::CuratedOverlap {
        contig: key.contig.clone(),
        orientation: key.orientation.to_string(),
        message,
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        UnionFind {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Members of every component, components ordered by their smallest member.
    fn components(mut self) -> Vec<Vec<usize>> {
        let mut slot: FxHashMap<usize, usize> = FxHashMap::default();
        let mut components: Vec<Vec<usize>> = Vec::new();
        for ind in 0..self.parent.len() {
            let root = self.find(ind);
            let pos = *slot.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[pos].push(ind);
        }
        components
    }
}

/// Connect nodes closer than `max_distance` unless a boundary lies between
/// them. `nodes` must be sorted by start.
fn connect_proximal(
    nodes: &[Node],
    boundaries: Option<&BoundaryIndex>,
    max_distance: i64,
    uf: &mut UnionFind,
) {
    for (i, first) in nodes.iter().enumerate() {
        let region = boundaries.map(|b| b.rank(first.block.end));
        for second in &nodes[i + 1..] {
            if second.block.start - first.block.end > max_distance {
                break;
            }
            if region == boundaries.map(|b| b.rank(second.block.start)) {
                uf.union(first.idx, second.idx);
            }
        }
    }
}

/// Group the peaks and structures of one `(contig, orientation)` into
/// connected components.
///
/// Structures without any peak overlap are discarded up front. Elements
/// fully inside a curated region form one group per region.
pub fn group_all(
    key: &ContigKey,
    structures: Vec<InvRepeat>,
    peaks: Vec<Interval>,
    transcripts: Option<&TranscriptIndex>,
    curated: Option<&CuratedRegions>,
    boundaries: &BoundaryIndex,
    max_distance: i64,
) -> Result<Vec<Vec<Element>>> {
    let start = Instant::now();

    let index = IntervalIndex::new(&peaks);
    let total = structures.len();
    let structures: Vec<InvRepeat> = structures
        .into_iter()
        .filter(|x| {
            index.overlaps(&x.bounding_range()) && x.blocks().iter().any(|b| index.overlaps(b))
        })
        .collect();
    debug!(
        "[{key}] {} / {total} structures overlap with {} peaks",
        structures.len(),
        peaks.len()
    );

    let mut groups: Vec<Vec<Element>> = Vec::new();
    let mut elements: Vec<Element> = Vec::with_capacity(peaks.len() + structures.len());

    match curated.filter(|x| !x.is_empty()) {
        Some(curated) => {
            let mut by_region: FxHashMap<Interval, usize> = FxHashMap::default();
            let mut assign = |region: Interval, element: Element, groups: &mut Vec<Vec<Element>>| {
                let pos = *by_region.entry(region).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[pos].push(element);
            };
            for peak in peaks {
                match curated.assign_peak(key, &peak)? {
                    Some(region) => assign(region, Element::Peak(peak), &mut groups),
                    None => elements.push(Element::Peak(peak)),
                }
            }
            for rna in structures {
                match curated.assign_structure(key, &rna)? {
                    Some(region) => assign(region, Element::Structure(rna), &mut groups),
                    None => elements.push(Element::Structure(rna)),
                }
            }
        }
        None => {
            elements.extend(peaks.into_iter().map(Element::Peak));
            elements.extend(structures.into_iter().map(Element::Structure));
        }
    }

    let mut nodes = Vec::with_capacity(elements.len());
    for (idx, element) in elements.iter().enumerate() {
        nodes.extend(element.blocks().into_iter().map(|block| Node { idx, block }));
    }
    let nodes = sorts::build_sorted_nodes(nodes);

    let mut uf = UnionFind::new(elements.len());
    connect_proximal(&nodes, Some(boundaries), max_distance, &mut uf);

    // Elements sitting on the same exon chain are adjacent in the transcript
    if let Some(transcripts) = transcripts {
        let mut anchor: FxHashMap<usize, usize> = FxHashMap::default();
        for node in &nodes {
            for transcript in transcripts.mapping(&node.block) {
                let first = *anchor.entry(transcript).or_insert(node.idx);
                uf.union(first, node.idx);
            }
        }
    }

    let mut slots: Vec<Option<Element>> = elements.into_iter().map(Some).collect();
    for component in uf.components() {
        let group: Vec<Element> = component
            .into_iter()
            .filter_map(|ind| slots[ind].take())
            .collect();
        groups.push(group);
    }

    debug!(
        "[{key}] {} groups in {:?}",
        groups.len(),
        start.elapsed()
    );
    Ok(groups)
}

/// Split a group into a partition, dropping peaks already explained by the
/// arm envelopes of its structures. With `trim_partial_peaks`, partially
/// explained peaks are cut down to their unexplained pieces.
pub fn postprocess_group(key: &ContigKey, group: Vec<Element>, trim_partial_peaks: bool) -> Partition {
    let mut structures = Vec::new();
    let mut peaks = Vec::new();
    for element in group {
        match element {
            Element::Peak(peak) => peaks.push(peak),
            Element::Structure(rna) => structures.push(rna),
        }
    }

    if !peaks.is_empty() && !structures.is_empty() {
        let bounds: Vec<Interval> = structures
            .iter()
            .flat_map(|x| [x.left_bound(), x.right_bound()])
            .collect();
        let covered = merge::merge(&bounds);

        let mut kept = Vec::with_capacity(peaks.len());
        for peak in sorts::build_sorted_intervals(&peaks) {
            let pieces = overlaps::subtract(&[peak], &covered);
            if pieces.is_empty() {
                continue;
            }
            if trim_partial_peaks {
                kept.extend(pieces);
            } else {
                kept.push(peak);
            }
        }
        peaks = kept;
    }
    sorts::sort_intervals(&mut peaks);

    Partition {
        id: String::new(),
        contig: key.contig.clone(),
        orientation: key.orientation,
        structures,
        peaks,
    }
}

/// Order partitions by `(contig, orientation, envelope start)` and number
/// them `P0, P1, ...`.
pub fn number_partitions(mut partitions: Vec<Partition>) -> Vec<Partition> {
    partitions.sort_by_key(|p| {
        (
            p.contig.clone(),
            p.orientation,
            p.envelope().map(|x| (x.start, x.end)),
        )
    });
    for (ind, partition) in partitions.iter_mut().enumerate() {
        partition.id = format!("P{ind}");
    }
    partitions
}

/// Connectivity groups of structures for fragment selection: structures
/// whose arm envelopes lie within `max_distance` end up together.
pub fn structure_groups(structures: &[InvRepeat], max_distance: i64) -> Vec<Vec<usize>> {
    let mut nodes = Vec::with_capacity(2 * structures.len());
    for (idx, rna) in structures.iter().enumerate() {
        nodes.push(Node {
            idx,
            block: rna.left_bound(),
        });
        nodes.push(Node {
            idx,
            block: rna.right_bound(),
        });
    }
    let nodes = sorts::build_sorted_nodes(nodes);

    let mut uf = UnionFind::new(structures.len());
    connect_proximal(&nodes, None, max_distance, &mut uf);
    uf.components()
}
