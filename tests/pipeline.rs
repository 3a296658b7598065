use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use dsranges::config::Config;
use dsranges::dsranges_structs::{ContigKey, Interval, Orientation, PerOrientation};
use dsranges::invrep::{InvRepeat, StemSegment};
use dsranges::io::{self, StructureRecord};
use dsranges::pipeline::{self, FilterInputs, PartitionInputs, RunReport, Sample};
use dsranges::tracks::{ExperimentTracks, InMemorySource, TrackSource};

fn iv(start: i64, end: i64) -> Interval {
    Interval::new(start, end)
}

fn hairpin(ls: i64, le: i64, rs: i64, re: i64) -> InvRepeat {
    InvRepeat::new(vec![StemSegment::new(iv(ls, le), iv(rs, re)).unwrap()]).unwrap()
}

fn forward() -> ContigKey {
    ContigKey::new("chr1", Orientation::Forward).unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_partition_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = write(dir.path(), "chrom.sizes", "chr1\t1000\n");
    // 300-350 is not covered by any experiment
    let covered = write(dir.path(), "covered.bed", "chr1\t0\t300\nchr1\t350\t1000\n");
    let peaks = write(
        dir.path(),
        "peaks.bed",
        "chr1\t100\t150\ta\t0\t+\nchr1\t400\t450\tb\t0\t+\n\
         chr1\t100\t150\tc\t0\t-\nchr1\t400\t450\td\t0\t-\n",
    );

    let structures = dir.path().join("structures.json");
    let record = StructureRecord {
        contig: "chr1".to_string(),
        orientation: Orientation::Forward,
        structure: hairpin(100, 150, 400, 450),
    };
    // Overlapping prediction windows report the same structure twice
    io::write_json(&structures, &vec![record.clone(), record]).unwrap();

    let mut config = Config {
        structures,
        contig_sizes: sizes,
        peaks: Some(peaks),
        ..Config::default()
    };
    config.boundaries.covered = Some(covered);
    let config_path = dir.path().join("config.json");
    io::write_json(&config_path, &config).unwrap();

    let config = Config::load(&config_path).unwrap();
    let inputs = PartitionInputs::load(&config).unwrap();
    assert_eq!(inputs.structures[&forward()].len(), 1);

    let (partitions, report) = pipeline::partition(&inputs, &config.clustering);
    assert_eq!(report, RunReport { succeeded: 2, failed: 0 });

    // Forward: the structure arms bridge the uncovered gap and explain both
    // peaks. Reverse: the gap keeps the two peaks apart.
    assert_eq!(partitions.len(), 3);
    assert_eq!(partitions[0].id, "P0");
    assert_eq!(partitions[0].orientation, Orientation::Forward);
    assert_eq!(partitions[0].structures.len(), 1);
    assert!(partitions[0].peaks.is_empty());
    assert_eq!(partitions[1].peaks, vec![iv(100, 150)]);
    assert_eq!(partitions[2].peaks, vec![iv(400, 450)]);
    assert_eq!(partitions[2].id, "P2");

    let bed = dir.path().join("out").join("partitions.bed");
    io::write_bed(&bed, partitions.iter().map(|x| x.to_bed12())).unwrap();
    let text = std::fs::read_to_string(&bed).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("chr1\t100\t450\tP0\t0\t+\t"));
}

fn sample(id: &str, peaks: Vec<Interval>, signal: Vec<f32>) -> Sample {
    let source: Arc<dyn TrackSource> = Arc::new(InMemorySource::new().with_contig("chr1", signal));
    let tracks = ExperimentTracks::new(
        id,
        PerOrientation {
            forward: vec![source],
            reverse: vec![],
        },
        PerOrientation::default(),
    );
    let mut by_key = FxHashMap::default();
    by_key.insert(forward(), peaks);
    Sample {
        id: id.to_string(),
        peaks: by_key,
        tracks,
    }
}

fn signal_on(length: usize, ranges: &[Interval]) -> Vec<f32> {
    let mut values = vec![0f32; length];
    for r in ranges {
        for x in &mut values[r.start as usize..r.end as usize] {
            *x = 5.0;
        }
    }
    values
}

#[test]
fn test_selection_and_consensus() {
    let shared = hairpin(100, 200, 400, 500);
    let private = hairpin(10_000, 10_050, 10_300, 10_350);

    let mut inputs = FilterInputs::default();
    inputs.contig_sizes.insert("chr1".to_string(), 20_000);
    inputs
        .structures
        .insert(forward(), vec![shared.clone(), private.clone()]);

    // A and B only support the inner half of the shared stem; C supports the
    // other structure alone.
    let inner = vec![iv(150, 200), iv(400, 450)];
    let signal = signal_on(20_000, &[iv(100, 200), iv(400, 500)]);
    let other = vec![iv(10_000, 10_050), iv(10_300, 10_350)];
    inputs.samples = vec![
        sample("A", inner.clone(), signal.clone()),
        sample("B", inner, signal),
        sample("C", other.clone(), signal_on(20_000, &other)),
    ];

    let mut config = Config::default();
    config.selection.padding = 10;

    let (filtered, report) = pipeline::filter(&inputs, &config);
    assert_eq!(report, RunReport { succeeded: 3, failed: 0 });
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].structure, hairpin(140, 200, 400, 460));
    assert_eq!(filtered[0].replication, 2);

    config.consensus.min_replication = 1;
    let (filtered, _) = pipeline::filter(&inputs, &config);
    assert_eq!(filtered.len(), 2);
    assert!(filtered.iter().any(|x| x.structure == private));
}
