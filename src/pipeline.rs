use std::time::Instant;

use log::{debug, error, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::cluster::{self, CuratedRegions, Partition};
use crate::config::{ClusteringConfig, Config, SampleConfig};
use crate::consensus::{self, FilteredStructure};
use crate::dsranges_structs::{ContigKey, Interval, Orientation};
use crate::error::{Error, Result};
use crate::greedy::{self, SampleSelection};
use crate::invrep::InvRepeat;
use crate::io;
use crate::nearest::{self, BoundaryIndex};
use crate::overlaps::IntervalIndex;
use crate::spliced_subsequence::{Transcript, TranscriptIndex};
use crate::tracks::ExperimentTracks;

/// Outcome counts of independent work units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunReport {
    fn record<T>(&mut self, result: &Result<T>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

fn sorted_keys<'a, I>(keys: I) -> Vec<ContigKey>
where
    I: IntoIterator<Item = &'a ContigKey>,
{
    let mut keys: Vec<ContigKey> = keys.into_iter().cloned().collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Boundary index of every `(contig, orientation)` listed in `contig_sizes`.
///
/// Uncovered regions are only derived when a coverage track is supplied.
/// Insulators are shared by both orientations, transcripts are not.
pub fn assemble_boundaries(
    contig_sizes: &FxHashMap<String, i64>,
    covered: Option<&FxHashMap<String, Vec<Interval>>>,
    transcripts: &FxHashMap<ContigKey, Vec<Transcript>>,
    insulators: &FxHashMap<String, Vec<Interval>>,
    tolerance: i64,
) -> Result<FxHashMap<ContigKey, BoundaryIndex>> {
    let mut result = FxHashMap::default();
    for (contig, &length) in contig_sizes {
        let uncovered = match covered {
            Some(covered) => {
                let regions = covered.get(contig).map(Vec::as_slice).unwrap_or(&[]);
                nearest::uncovered(regions, length, tolerance)
            }
            None => Vec::new(),
        };
        let curated = insulators.get(contig).map(Vec::as_slice).unwrap_or(&[]);

        for orientation in [Orientation::Forward, Orientation::Reverse] {
            let key = ContigKey::new(contig, orientation)?;
            let rnas = transcripts.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            let index = nearest::derive_boundaries(&uncovered, rnas, curated);
            result.insert(key, index);
        }
    }
    debug!(
        "{} boundaries over {} contigs",
        result.values().map(BoundaryIndex::len).sum::<usize>(),
        contig_sizes.len()
    );
    Ok(result)
}

/// Everything the partition builder reads, grouped by `(contig, orientation)`.
#[derive(Debug, Default)]
pub struct PartitionInputs {
    pub structures: FxHashMap<ContigKey, Vec<InvRepeat>>,
    pub peaks: FxHashMap<ContigKey, Vec<Interval>>,
    pub transcripts: FxHashMap<ContigKey, TranscriptIndex>,
    /// Curated regions per contig, applied to both orientations.
    pub curated: FxHashMap<String, CuratedRegions>,
    pub boundaries: FxHashMap<ContigKey, BoundaryIndex>,
}

impl PartitionInputs {
    pub fn load(config: &Config) -> Result<Self> {
        let peaks = config
            .peaks
            .as_deref()
            .ok_or_else(|| Error::Config("partitioning requires 'peaks'".to_string()))?;

        let contig_sizes = io::read_contig_sizes(&config.contig_sizes)?;
        let transcripts = match &config.boundaries.transcripts {
            Some(path) => io::read_transcripts(path)?,
            None => FxHashMap::default(),
        };
        let boundaries = load_boundaries(config, &contig_sizes, &transcripts)?;
        let curated = match &config.curated {
            Some(path) => io::read_regions(path)?
                .into_iter()
                .map(|(contig, regions)| (contig, CuratedRegions::new(&regions)))
                .collect(),
            None => FxHashMap::default(),
        };

        Ok(PartitionInputs {
            structures: io::read_structures(&config.structures)?,
            peaks: io::read_peaks(peaks)?,
            transcripts: transcripts
                .into_iter()
                .map(|(key, rnas)| (key, TranscriptIndex::new(rnas)))
                .collect(),
            curated,
            boundaries,
        })
    }
}

fn load_boundaries(
    config: &Config,
    contig_sizes: &FxHashMap<String, i64>,
    transcripts: &FxHashMap<ContigKey, Vec<Transcript>>,
) -> Result<FxHashMap<ContigKey, BoundaryIndex>> {
    let covered = match &config.boundaries.covered {
        Some(path) => Some(io::read_regions(path)?),
        None => None,
    };
    let insulators = match &config.boundaries.insulators {
        Some(path) => io::read_regions(path)?,
        None => FxHashMap::default(),
    };
    assemble_boundaries(
        contig_sizes,
        covered.as_ref(),
        transcripts,
        &insulators,
        config.boundaries.coverage_gap_tolerance,
    )
}

fn partition_unit(
    key: &ContigKey,
    inputs: &PartitionInputs,
    boundaries: &BoundaryIndex,
    config: &ClusteringConfig,
) -> Result<Vec<Partition>> {
    let structures = inputs.structures.get(key).cloned().unwrap_or_default();
    let peaks = inputs.peaks.get(key).cloned().unwrap_or_default();
    let groups = cluster::group_all(
        key,
        structures,
        peaks,
        inputs.transcripts.get(key),
        inputs.curated.get(&key.contig),
        boundaries,
        config.max_distance,
    )?;
    Ok(groups
        .into_iter()
        .map(|group| cluster::postprocess_group(key, group, config.trim_partial_peaks))
        .collect())
}

/// Build and number the partitions of every `(contig, orientation)`. A unit
/// that fails is logged and contributes nothing.
pub fn partition(inputs: &PartitionInputs, config: &ClusteringConfig) -> (Vec<Partition>, RunReport) {
    let start = Instant::now();
    let keys = sorted_keys(inputs.peaks.keys().chain(inputs.structures.keys()));
    let empty = BoundaryIndex::default();

    let results: Vec<(ContigKey, Result<Vec<Partition>>)> = keys
        .into_par_iter()
        .map(|key| {
            let boundaries = inputs.boundaries.get(&key).unwrap_or(&empty);
            let result = partition_unit(&key, inputs, boundaries, config);
            (key, result)
        })
        .collect();

    let mut report = RunReport::default();
    let mut partitions = Vec::new();
    for (key, result) in results {
        report.record(&result);
        match result {
            Ok(x) => partitions.extend(x),
            Err(e) => error!("[{key}] partitioning failed: {e}"),
        }
    }
    let partitions = cluster::number_partitions(partitions);

    info!(
        "{} partitions from {} units ({} failed) in {:?}",
        partitions.len(),
        report.succeeded + report.failed,
        report.failed,
        start.elapsed()
    );
    (partitions, report)
}

/// Peaks and signal tracks of one experiment.
#[derive(Debug)]
pub struct Sample {
    pub id: String,
    pub peaks: FxHashMap<ContigKey, Vec<Interval>>,
    pub tracks: ExperimentTracks,
}

impl Sample {
    pub fn load(config: &SampleConfig) -> Result<Self> {
        Ok(Sample {
            id: config.id.clone(),
            peaks: io::read_peaks(&config.peaks)?,
            tracks: ExperimentTracks::from_bigwigs(&config.id, &config.signal, &config.control),
        })
    }
}

/// Everything the selection and consensus stages read.
#[derive(Debug, Default)]
pub struct FilterInputs {
    /// De-duplicated structures; fragment origins index into these lists.
    pub structures: FxHashMap<ContigKey, Vec<InvRepeat>>,
    pub contig_sizes: FxHashMap<String, i64>,
    pub boundaries: FxHashMap<ContigKey, BoundaryIndex>,
    pub samples: Vec<Sample>,
}

impl FilterInputs {
    pub fn load(config: &Config) -> Result<Self> {
        if config.samples.is_empty() {
            return Err(Error::Config("no samples configured".to_string()));
        }
        let contig_sizes = io::read_contig_sizes(&config.contig_sizes)?;
        let transcripts = match &config.boundaries.transcripts {
            Some(path) => io::read_transcripts(path)?,
            None => FxHashMap::default(),
        };
        let boundaries = load_boundaries(config, &contig_sizes, &transcripts)?;
        let samples = config
            .samples
            .iter()
            .map(Sample::load)
            .collect::<Result<Vec<_>>>()?;

        Ok(FilterInputs {
            structures: io::read_structures(&config.structures)?,
            contig_sizes,
            boundaries,
            samples,
        })
    }
}

fn select_unit(
    sample: &Sample,
    key: &ContigKey,
    structures: &[InvRepeat],
    inputs: &FilterInputs,
    boundaries: &BoundaryIndex,
    config: &Config,
) -> Result<SampleSelection> {
    let length = *inputs.contig_sizes.get(&key.contig).ok_or_else(|| {
        Error::Config(format!("contig {} is missing from the contig sizes", key.contig))
    })?;
    let peaks = sample
        .peaks
        .get(key)
        .map(|x| IntervalIndex::new(x))
        .unwrap_or_default();
    let tracks = sample.tracks.open(&key.contig, length, key.orientation)?;
    greedy::optimize(
        &sample.id,
        key,
        structures,
        &peaks,
        &tracks,
        boundaries,
        &config.selection,
        config.scoring,
    )
}

/// Per-sample fragment selection followed by the replication filter.
///
/// Every `(sample, contig, orientation)` is an independent unit; samples
/// without peaks on a key are skipped.
pub fn filter(inputs: &FilterInputs, config: &Config) -> (Vec<FilteredStructure>, RunReport) {
    let start = Instant::now();
    let keys = sorted_keys(inputs.structures.keys());
    let empty = BoundaryIndex::default();

    let units: Vec<(&Sample, &ContigKey)> = inputs
        .samples
        .iter()
        .flat_map(|sample| {
            keys.iter()
                .filter(|key| sample.peaks.contains_key(*key))
                .map(move |key| (sample, key))
        })
        .collect();

    let results: Vec<(&Sample, &ContigKey, Result<SampleSelection>)> = units
        .into_par_iter()
        .map(|(sample, key)| {
            let structures = inputs.structures.get(key).map(Vec::as_slice).unwrap_or(&[]);
            let boundaries = inputs.boundaries.get(key).unwrap_or(&empty);
            let result = select_unit(sample, key, structures, inputs, boundaries, config);
            (sample, key, result)
        })
        .collect();

    let mut report = RunReport::default();
    let mut selections = Vec::new();
    for (sample, key, result) in results {
        report.record(&result);
        match result {
            Ok(x) => selections.push(x),
            Err(e) => error!("[{}|{key}] fragment selection failed: {e}", sample.id),
        }
    }

    let records = consensus::aggregate(&selections, &inputs.structures);
    let filtered = consensus::filter(&records, config.consensus.min_replication);

    let before: usize = inputs.structures.values().map(Vec::len).sum();
    info!(
        "{} / {} ({:.2}%) structures are supported in >= {} samples, {} units failed, {:?}",
        filtered.len(),
        before,
        percent(filtered.len(), before),
        config.consensus.min_replication,
        report.failed,
        start.elapsed()
    );
    (filtered, report)
}
