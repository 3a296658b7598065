use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-open genomic range `[start, end)`. Ordering is by `(start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        debug_assert!(start <= end, "{start} > {end}");
        Interval { start, end }
    }

    pub fn try_new(start: i64, end: i64) -> Result<Self> {
        if start > end || start < 0 {
            return Err(Error::MalformedStructure(format!(
                "invalid interval {start}-{end}"
            )));
        }
        Ok(Interval { start, end })
    }

    #[inline]
    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn intersects(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Interval { start, end })
        } else {
            None
        }
    }

    #[inline]
    pub fn overlap_size(&self, other: &Interval) -> i64 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0)
    }

    /// True if `other` lies entirely within `self`.
    #[inline]
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Extend both sides by `by`, clamping to `[lower, upper)`.
    pub fn extend_within(&self, by: i64, lower: i64, upper: i64) -> Interval {
        Interval {
            start: (self.start - by).max(lower),
            end: (self.end + by).min(upper),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Transcription orientation. Elements on opposite orientations never interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

impl Orientation {
    pub fn symbol(&self) -> &'static str {
        match self {
            Orientation::Forward => "+",
            Orientation::Reverse => "-",
        }
    }
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "+" => Ok(Orientation::Forward),
            "-" => Ok(Orientation::Reverse),
            other => Err(Error::InvalidKey(format!(
                "unknown orientation '{other}', expected '+' or '-'"
            ))),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A value stored separately for each orientation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerOrientation<T> {
    pub forward: T,
    pub reverse: T,
}

impl<T> PerOrientation<T> {
    pub fn get(&self, orientation: Orientation) -> &T {
        match orientation {
            Orientation::Forward => &self.forward,
            Orientation::Reverse => &self.reverse,
        }
    }
}

/// The `(contig, orientation)` pair partitioning every spatial index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContigKey {
    pub contig: String,
    pub orientation: Orientation,
}

impl ContigKey {
    pub fn new(contig: &str, orientation: Orientation) -> Result<Self> {
        if contig.is_empty() || contig.chars().any(char::is_whitespace) {
            return Err(Error::InvalidKey(format!("malformed contig name '{contig}'")));
        }
        Ok(ContigKey {
            contig: contig.to_string(),
            orientation,
        })
    }

    /// Parse a contig name and a strand column value (`+` / `-`).
    pub fn parse(contig: &str, strand: &str) -> Result<Self> {
        let orientation = strand
            .parse::<Orientation>()
            .map_err(|_| Error::InvalidKey(format!("{contig}:{strand}")))?;
        ContigKey::new(contig, orientation)
    }
}

impl fmt::Display for ContigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.contig, self.orientation)
    }
}

/// An "event" in the sweep line:
/// - `pos`: the coordinate (start or end of an interval)
/// - `is_start`: true if it's a start event, false if it's an end event
/// - `idx`: the interval's ID/index
#[derive(Debug, Clone, Hash)]
pub struct Event {
    pub pos: i64,
    pub is_start: bool,
    pub idx: usize,
}

/// A sortable graph node: one genomic block owned by element `idx`.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub idx: usize,
    pub block: Interval,
}
