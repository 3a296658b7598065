use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use polars::datatypes::DataType;
use polars::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::dsranges_structs::{ContigKey, Interval, Orientation};
use crate::error::{Error, Result};
use crate::invrep::InvRepeat;
use crate::spliced_subsequence::Transcript;

/// Structure collection entry as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub contig: String,
    pub orientation: Orientation,
    pub structure: InvRepeat,
}

fn field(index: usize, dtype: DataType) -> Field {
    Field::new(format!("column_{}", index + 1).into(), dtype)
}

fn contig_field() -> Field {
    field(0, DataType::Categorical(None, CategoricalOrdering::Physical))
}

/// Headerless tab-separated table restricted to `fields`. Empty files yield `None`.
fn read_table(path: &Path, fields: Vec<(usize, Field)>) -> Result<Option<DataFrame>> {
    let metadata = std::fs::metadata(path).map_err(|e| Error::io(e, path))?;
    if metadata.len() == 0 {
        return Ok(None);
    }

    let columns: Vec<usize> = fields.iter().map(|(i, _)| *i).collect();
    let schema = Schema::from_iter(fields.into_iter().map(|(_, f)| f));
    let parse_options = CsvParseOptions::default().with_separator(b'\t');

    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_schema_overwrite(Some(Arc::new(schema)))
        .with_projection(Some(Arc::new(columns)))
        .with_rechunk(true)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(Some(df))
}

fn required<T>(value: Option<T>, path: &Path, row: usize, column: &str) -> Result<T> {
    value.ok_or_else(|| Error::Record {
        path: path.to_path_buf(),
        message: format!("row {}: missing {column}", row + 1),
    })
}

fn interval(start: i64, end: i64, path: &Path, row: usize) -> Result<Interval> {
    Interval::try_new(start, end).map_err(|_| Error::Record {
        path: path.to_path_buf(),
        message: format!("row {}: invalid interval {start}-{end}", row + 1),
    })
}

fn contigs(df: &DataFrame) -> Result<Column> {
    Ok(df.column("column_1")?.cast(&DataType::String)?)
}

/// BED6 peaks grouped by `(contig, strand)`.
pub fn read_peaks(path: &Path) -> Result<FxHashMap<ContigKey, Vec<Interval>>> {
    let started = Instant::now();
    let mut result: FxHashMap<ContigKey, Vec<Interval>> = FxHashMap::default();
    let Some(df) = read_table(
        path,
        vec![
            (0, contig_field()),
            (1, field(1, DataType::Int64)),
            (2, field(2, DataType::Int64)),
            (5, field(5, DataType::String)),
        ],
    )?
    else {
        return Ok(result);
    };

    let contig = contigs(&df)?;
    let rows = contig
        .str()?
        .into_iter()
        .zip(df.column("column_2")?.i64()?)
        .zip(df.column("column_3")?.i64()?)
        .zip(df.column("column_6")?.str()?);
    for (row, (((contig, start), end), strand)) in rows.enumerate() {
        let key = ContigKey::parse(
            required(contig, path, row, "contig")?,
            required(strand, path, row, "strand")?,
        )?;
        let start = required(start, path, row, "start")?;
        let end = required(end, path, row, "end")?;
        result.entry(key).or_default().push(interval(start, end, path, row)?);
    }

    debug!(
        "{} peaks from {} in {:?}",
        result.values().map(|x| x.len()).sum::<usize>(),
        path.display(),
        started.elapsed()
    );
    Ok(result)
}

/// BED3 regions grouped by contig.
pub fn read_regions(path: &Path) -> Result<FxHashMap<String, Vec<Interval>>> {
    let mut result: FxHashMap<String, Vec<Interval>> = FxHashMap::default();
    let Some(df) = read_table(
        path,
        vec![
            (0, contig_field()),
            (1, field(1, DataType::Int64)),
            (2, field(2, DataType::Int64)),
        ],
    )?
    else {
        return Ok(result);
    };

    let contig = contigs(&df)?;
    let rows = contig
        .str()?
        .into_iter()
        .zip(df.column("column_2")?.i64()?)
        .zip(df.column("column_3")?.i64()?);
    for (row, ((contig, start), end)) in rows.enumerate() {
        let contig = required(contig, path, row, "contig")?;
        let start = required(start, path, row, "start")?;
        let end = required(end, path, row, "end")?;
        result
            .entry(contig.to_string())
            .or_default()
            .push(interval(start, end, path, row)?);
    }
    Ok(result)
}

fn parse_list(text: &str, path: &Path, row: usize) -> Result<Vec<i64>> {
    text.split(',')
        .filter(|x| !x.trim().is_empty())
        .map(|x| {
            x.trim().parse::<i64>().map_err(|e| Error::Record {
                path: path.to_path_buf(),
                message: format!("row {}: bad block list '{text}': {e}", row + 1),
            })
        })
        .collect()
}

/// BED12 transcripts grouped by `(contig, strand)`; blocks are the exons.
pub fn read_transcripts(path: &Path) -> Result<FxHashMap<ContigKey, Vec<Transcript>>> {
    let mut result: FxHashMap<ContigKey, Vec<Transcript>> = FxHashMap::default();
    let Some(df) = read_table(
        path,
        vec![
            (0, contig_field()),
            (1, field(1, DataType::Int64)),
            (3, field(3, DataType::String)),
            (5, field(5, DataType::String)),
            (10, field(10, DataType::String)),
            (11, field(11, DataType::String)),
        ],
    )?
    else {
        return Ok(result);
    };

    let contig = contigs(&df)?;
    let rows = contig
        .str()?
        .into_iter()
        .zip(df.column("column_2")?.i64()?)
        .zip(df.column("column_4")?.str()?)
        .zip(df.column("column_6")?.str()?)
        .zip(df.column("column_11")?.str()?)
        .zip(df.column("column_12")?.str()?);
    for (row, (((((contig, start), name), strand), sizes), starts)) in rows.enumerate() {
        let key = ContigKey::parse(
            required(contig, path, row, "contig")?,
            required(strand, path, row, "strand")?,
        )?;
        let start = required(start, path, row, "start")?;
        let sizes = parse_list(required(sizes, path, row, "block sizes")?, path, row)?;
        let offsets = parse_list(required(starts, path, row, "block starts")?, path, row)?;
        if sizes.len() != offsets.len() {
            return Err(Error::Record {
                path: path.to_path_buf(),
                message: format!("row {}: block sizes and starts differ in length", row + 1),
            });
        }

        let mut exons = Vec::with_capacity(sizes.len());
        for (size, offset) in sizes.into_iter().zip(offsets) {
            exons.push(interval(start + offset, start + offset + size, path, row)?);
        }
        let name = name.unwrap_or(".");
        result
            .entry(key)
            .or_default()
            .push(Transcript::new(name, exons)?);
    }
    Ok(result)
}

/// Two-column contig sizes table.
pub fn read_contig_sizes(path: &Path) -> Result<FxHashMap<String, i64>> {
    let mut result = FxHashMap::default();
    let Some(df) = read_table(
        path,
        vec![(0, field(0, DataType::String)), (1, field(1, DataType::Int64))],
    )?
    else {
        return Ok(result);
    };

    let rows = df
        .column("column_1")?
        .str()?
        .into_iter()
        .zip(df.column("column_2")?.i64()?);
    for (row, (contig, length)) in rows.enumerate() {
        let contig = required(contig, path, row, "contig")?;
        let length = required(length, path, row, "length")?;
        result.insert(contig.to_string(), length);
    }
    Ok(result)
}

/// Structure collection grouped and de-duplicated by `(contig, orientation)`.
pub fn read_structures(path: &Path) -> Result<FxHashMap<ContigKey, Vec<InvRepeat>>> {
    let file = File::open(path).map_err(|e| Error::io(e, path))?;
    let records: Vec<StructureRecord> = serde_json::from_reader(BufReader::new(file))?;
    let total = records.len();

    let mut result: FxHashMap<ContigKey, Vec<InvRepeat>> = FxHashMap::default();
    for record in records {
        let key = ContigKey::new(&record.contig, record.orientation)?;
        result.entry(key).or_default().push(record.structure);
    }
    for structures in result.values_mut() {
        *structures = crate::invrep::deduplicate(std::mem::take(structures));
    }

    info!(
        "{} unique structures ({} records) from {}",
        result.values().map(|x| x.len()).sum::<usize>(),
        total,
        path.display()
    );
    Ok(result)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
    }
    let file = File::create(path).map_err(|e| Error::io(e, path))?;
    Ok(BufWriter::new(file))
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = create(path)?;
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| Error::io(e, path))?;
    Ok(())
}

pub fn write_bed<I>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = String>,
{
    let mut writer = create(path)?;
    for line in lines {
        writeln!(writer, "{line}").map_err(|e| Error::io(e, path))?;
    }
    writer.flush().map_err(|e| Error::io(e, path))?;
    Ok(())
}
