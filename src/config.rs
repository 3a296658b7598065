use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dsranges_structs::PerOrientation;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Max gap between peaks / arm blocks chained into one partition.
    pub max_distance: i64,
    pub trim_partial_peaks: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            max_distance: 5_000,
            trim_partial_peaks: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Max gap between arm envelopes of structures selected together.
    pub max_distance: i64,
    /// Unrolled padding around mapped peaks.
    pub padding: i64,
    pub prune_ratio: f64,
    pub retention: f64,
    pub min_score: f64,
    pub max_iterations: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            max_distance: 5_000,
            padding: 128,
            prune_ratio: 0.1,
            retention: 0.9,
            min_score: 1e-32,
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Arm distance above which the score decays linearly.
    pub distance_threshold: i64,
    /// Cap on the boundary penalty exponent.
    pub max_boundary_penalty: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            distance_threshold: 1_000,
            max_boundary_penalty: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub min_replication: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig { min_replication: 2 }
    }
}

/// Boundary sources shared by every sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// BED3 of regions covered by at least one experiment.
    pub covered: Option<PathBuf>,
    /// Coverage islands closer than this are joined before taking the gaps.
    pub coverage_gap_tolerance: i64,
    /// BED12 of well-annotated transcripts.
    pub transcripts: Option<PathBuf>,
    /// BED3 of curated insulators, applied to both strands.
    pub insulators: Option<PathBuf>,
}

/// bigWig files of one condition, one entry per replicate.
pub type TrackPaths = PerOrientation<Vec<PathBuf>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub id: String,
    /// BED6 of this sample's peaks.
    pub peaks: PathBuf,
    pub signal: TrackPaths,
    pub control: TrackPaths,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON collection of raw structure predictions.
    pub structures: PathBuf,
    /// Two-column contig sizes table.
    pub contig_sizes: PathBuf,
    /// BED6 of peaks used to build partitions.
    pub peaks: Option<PathBuf>,
    /// BED3 of curated clusters.
    pub curated: Option<PathBuf>,
    pub boundaries: BoundaryConfig,
    pub samples: Vec<SampleConfig>,

    pub clustering: ClusteringConfig,
    pub selection: SelectionConfig,
    pub scoring: ScoringConfig,
    pub consensus: ConsensusConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let config: Config = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ratio = |name: &str, value: f64| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} must be in (0, 1], got {value}")))
            }
        };
        ratio("selection.prune_ratio", self.selection.prune_ratio)?;
        ratio("selection.retention", self.selection.retention)?;

        if self.selection.min_score < 0.0 {
            return Err(Error::Config("selection.min_score must be >= 0".to_string()));
        }
        if self.selection.max_iterations == 0 {
            return Err(Error::Config(
                "selection.max_iterations must be positive".to_string(),
            ));
        }
        if self.consensus.min_replication == 0 {
            return Err(Error::Config(
                "consensus.min_replication must be positive".to_string(),
            ));
        }
        if self.scoring.distance_threshold <= 0 {
            return Err(Error::Config(
                "scoring.distance_threshold must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("clustering.max_distance", self.clustering.max_distance),
            ("selection.max_distance", self.selection.max_distance),
            ("selection.padding", self.selection.padding),
            (
                "boundaries.coverage_gap_tolerance",
                self.boundaries.coverage_gap_tolerance,
            ),
        ] {
            if value < 0 {
                return Err(Error::Config(format!("{name} must be >= 0, got {value}")));
            }
        }

        let mut ids: Vec<&str> = self.samples.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::Config(format!("duplicated sample id '{}'", w[0])));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.clustering.max_distance, 5_000);
        assert_eq!(config.selection.padding, 128);
        assert_eq!(config.selection.max_iterations, 10_000);
        assert_eq!(config.scoring.max_boundary_penalty, 20);
        assert_eq!(config.consensus.min_replication, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let json = r#"{
            "selection": {"retention": 0.5},
            "samples": [{
                "id": "A",
                "peaks": "a.bed",
                "signal": {"forward": ["s1+.bw", "s2+.bw"], "reverse": ["s1-.bw", "s2-.bw"]},
                "control": {"forward": ["c+.bw"], "reverse": ["c-.bw"]}
            }]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.selection.retention, 0.5);
        assert_eq!(config.selection.prune_ratio, 0.1);
        assert_eq!(config.samples[0].signal.forward.len(), 2);
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let mut config = Config::default();
        config.selection.prune_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.consensus.min_replication = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.selection.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        let sample = SampleConfig {
            id: "A".to_string(),
            peaks: PathBuf::from("a.bed"),
            signal: TrackPaths::default(),
            control: TrackPaths::default(),
        };
        config.samples = vec![sample.clone(), sample];
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
