use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bigtools::BigWigRead;
use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::config::{ScoringConfig, TrackPaths};
use crate::dsranges_structs::{Interval, Orientation, PerOrientation};
use crate::error::{Error, Result};
use crate::nearest::BoundaryIndex;
use crate::overlaps::IntervalIndex;
use crate::scoring::ScoreState;

/// Dense per-base values of one replicate file.
pub trait TrackSource: Send + Sync + fmt::Debug {
    /// Values for `[0, length)` of `contig`. Missing data is reported as 0.
    fn values(&self, contig: &str, length: i64) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone)]
pub struct BigWigSource {
    path: PathBuf,
}

impl BigWigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BigWigSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrackSource for BigWigSource {
    fn values(&self, contig: &str, length: i64) -> Result<Vec<f32>> {
        let path = self.path.to_string_lossy();
        let mut reader = BigWigRead::open_file(&*path)
            .map_err(|e| Error::Signal(format!("cannot open {path}: {e:?}")))?;

        let mut values = vec![0f32; length.max(0) as usize];
        let chrom = reader
            .chroms()
            .iter()
            .find(|c| c.name == contig)
            .map(|c| c.length);
        let Some(chrom_length) = chrom else {
            warn!("{contig} is missing from {path}, using zero signal");
            return Ok(values);
        };

        let end = chrom_length.min(values.len() as u32);
        let fetched = reader
            .values(contig, 0, end)
            .map_err(|e| Error::Signal(format!("cannot read {contig} from {path}: {e:?}")))?;
        for (dst, src) in values.iter_mut().zip(fetched) {
            if !src.is_nan() {
                *dst = src;
            }
        }
        Ok(values)
    }
}

/// Per-contig values held in memory. Contigs absent from the map read as 0.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tracks: FxHashMap<String, Vec<f32>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contig(mut self, contig: &str, values: Vec<f32>) -> Self {
        self.tracks.insert(contig.to_string(), values);
        self
    }
}

impl TrackSource for InMemorySource {
    fn values(&self, contig: &str, length: i64) -> Result<Vec<f32>> {
        let mut values = vec![0f32; length.max(0) as usize];
        if let Some(track) = self.tracks.get(contig) {
            for (dst, src) in values.iter_mut().zip(track) {
                if !src.is_nan() {
                    *dst = *src;
                }
            }
        }
        Ok(values)
    }
}

pub type Sources = PerOrientation<Vec<Arc<dyn TrackSource>>>;

/// Signal and control replicates of one sample.
#[derive(Debug, Clone)]
pub struct ExperimentTracks {
    pub id: String,
    signal: Sources,
    control: Sources,
}

impl ExperimentTracks {
    pub fn new(id: &str, signal: Sources, control: Sources) -> Self {
        ExperimentTracks {
            id: id.to_string(),
            signal,
            control,
        }
    }

    pub fn from_bigwigs(id: &str, signal: &TrackPaths, control: &TrackPaths) -> Self {
        let open = |paths: &TrackPaths| -> Sources {
            let wrap = |files: &[PathBuf]| -> Vec<Arc<dyn TrackSource>> {
                files
                    .iter()
                    .map(|p| Arc::new(BigWigSource::new(p)) as Arc<dyn TrackSource>)
                    .collect()
            };
            PerOrientation {
                forward: wrap(&paths.forward),
                reverse: wrap(&paths.reverse),
            }
        };
        Self::new(id, open(signal), open(control))
    }

    /// Load one contig: replicate average of signal minus control, shifted so
    /// that the minimum is 0.
    pub fn open(&self, contig: &str, length: i64, orientation: Orientation) -> Result<OpenTracks> {
        let start = Instant::now();

        let control = average(self.control.get(orientation), contig, length)?;
        let mut diff = average(self.signal.get(orientation), contig, length)?;
        for (d, c) in diff.iter_mut().zip(&control) {
            *d -= c;
        }
        shift_to_zero(&mut diff);

        debug!(
            "[{}] loaded {contig}:{orientation} ({length}bp) in {:?}",
            self.id,
            start.elapsed()
        );
        Ok(OpenTracks {
            contig: contig.to_string(),
            orientation,
            diff,
        })
    }
}

fn average(sources: &[Arc<dyn TrackSource>], contig: &str, length: i64) -> Result<Vec<f32>> {
    let mut values = vec![0f32; length.max(0) as usize];
    if sources.is_empty() {
        return Ok(values);
    }
    for source in sources {
        let fetched = source.values(contig, length)?;
        for (dst, src) in values.iter_mut().zip(fetched) {
            *dst += src;
        }
    }
    let n = sources.len() as f32;
    values.iter_mut().for_each(|x| *x /= n);
    Ok(values)
}

fn shift_to_zero(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    if min.is_finite() {
        values.iter_mut().for_each(|x| *x -= min);
    }
}

/// Difference track of one `(sample, contig, orientation)`. Read-only; every
/// scoring window gets its own copy.
#[derive(Debug, Clone)]
pub struct OpenTracks {
    pub contig: String,
    pub orientation: Orientation,
    diff: Vec<f32>,
}

impl OpenTracks {
    pub fn from_diff(contig: &str, orientation: Orientation, mut diff: Vec<f32>) -> Self {
        shift_to_zero(&mut diff);
        OpenTracks {
            contig: contig.to_string(),
            orientation,
            diff,
        }
    }

    pub fn len(&self) -> usize {
        self.diff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    pub fn diff(&self) -> &[f32] {
        &self.diff
    }

    /// Scoring state for `[start, end)`, re-baselined to the window minimum.
    pub fn score<'a>(
        &self,
        start: i64,
        end: i64,
        boundaries: &'a BoundaryIndex,
        peaks: IntervalIndex,
        params: ScoringConfig,
    ) -> Result<ScoreState<'a>> {
        if start < 0 || end > self.diff.len() as i64 || start >= end {
            return Err(Error::Window {
                start,
                end,
                wstart: 0,
                wend: self.diff.len() as i64,
            });
        }
        let mut scores = self.diff[start as usize..end as usize].to_vec();
        shift_to_zero(&mut scores);
        Ok(ScoreState::new(
            Interval::new(start, end),
            scores,
            boundaries,
            peaks,
            params,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(values: Vec<Vec<f32>>) -> Sources {
        let forward = values
            .into_iter()
            .map(|v| Arc::new(InMemorySource::new().with_contig("chr1", v)) as Arc<dyn TrackSource>)
            .collect();
        PerOrientation {
            forward,
            reverse: vec![],
        }
    }

    #[test]
    fn test_open_averages_and_shifts() {
        let signal = sources(vec![vec![2.0, 4.0, f32::NAN, 8.0], vec![0.0, 0.0, 2.0, 0.0]]);
        let control = sources(vec![vec![1.0, 1.0, 1.0, 1.0]]);
        let tracks = ExperimentTracks::new("A", signal, control);

        let open = tracks.open("chr1", 5, Orientation::Forward).unwrap();
        // avg signal: 1, 2, 1, 4, 0; minus control: 0, 1, 0, 3, 0
        assert_eq!(open.diff(), &[0.0, 1.0, 0.0, 3.0, 0.0]);

        // No replicates for the reverse strand: flat zero track
        let open = tracks.open("chr1", 3, Orientation::Reverse).unwrap();
        assert_eq!(open.diff(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_negative_difference_is_shifted() {
        let tracks = ExperimentTracks::new(
            "A",
            sources(vec![vec![0.0, 1.0]]),
            sources(vec![vec![2.0, 0.0]]),
        );
        let open = tracks.open("chr1", 2, Orientation::Forward).unwrap();
        assert_eq!(open.diff(), &[0.0, 3.0]);
    }

    #[test]
    fn test_window_is_rebaselined() {
        let open = OpenTracks::from_diff("chr1", Orientation::Forward, vec![0.0, 5.0, 6.0, 9.0]);
        let boundaries = BoundaryIndex::default();
        let state = open
            .score(1, 4, &boundaries, IntervalIndex::default(), ScoringConfig::default())
            .unwrap();
        assert_eq!(state.scores(), &[0.0, 1.0, 4.0]);

        assert!(open
            .score(2, 10, &boundaries, IntervalIndex::default(), ScoringConfig::default())
            .is_err());
    }
}
