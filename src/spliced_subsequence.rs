use crate::dsranges_structs::Interval;
use crate::error::{Error, Result};
use crate::merge;

/// A well-annotated transcript: merged exon chain plus the spliced length
/// preceding every exon.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub id: String,
    exons: Vec<Interval>,
    cumsum: Vec<i64>,
}

impl Transcript {
    pub fn new(id: &str, exons: Vec<Interval>) -> Result<Self> {
        let exons = merge::merge(&exons);
        if exons.is_empty() {
            return Err(Error::MalformedStructure(format!(
                "transcript {id} without exons"
            )));
        }

        let mut cumsum = Vec::with_capacity(exons.len());
        let mut running_sum = 0;
        for exon in &exons {
            cumsum.push(running_sum);
            running_sum += exon.len();
        }

        Ok(Transcript {
            id: id.to_string(),
            exons,
            cumsum,
        })
    }

    pub fn exons(&self) -> &[Interval] {
        &self.exons
    }

    pub fn bbox(&self) -> Interval {
        Interval::new(self.exons[0].start, self.exons[self.exons.len() - 1].end)
    }

    /// Spliced length of the transcript.
    pub fn len(&self) -> i64 {
        self.cumsum[self.cumsum.len() - 1] + self.exons[self.exons.len() - 1].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn introns(&self) -> impl Iterator<Item = Interval> + '_ {
        self.exons
            .windows(2)
            .map(|w| Interval::new(w[0].end, w[1].start))
    }

    /// Genomic interval in spliced (exon-only) coordinates, counted from the
    /// transcript's leftmost base. `None` unless the interval is exonic.
    pub fn map_interval(&self, interval: &Interval) -> Option<Interval> {
        if interval.is_empty() {
            return None;
        }
        let ind = self.exons.partition_point(|e| e.end < interval.end);
        let exon = self.exons.get(ind)?;
        if !exon.contains(interval) {
            return None;
        }
        let offset = self.cumsum[ind] - exon.start;
        Some(Interval::new(interval.start + offset, interval.end + offset))
    }
}

/// Transcripts of one `(contig, orientation)` sorted by their bounding box.
#[derive(Debug, Clone, Default)]
pub struct TranscriptIndex {
    transcripts: Vec<Transcript>,
    max_len: i64,
}

impl TranscriptIndex {
    pub fn new(mut transcripts: Vec<Transcript>) -> Self {
        radsort::sort_by_key(&mut transcripts, |t| t.bbox().end);
        radsort::sort_by_key(&mut transcripts, |t| t.bbox().start);
        let max_len = transcripts.iter().map(|t| t.bbox().len()).max().unwrap_or(0);
        TranscriptIndex {
            transcripts,
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    pub fn transcripts(&self) -> &[Transcript] {
        &self.transcripts
    }

    /// Indices of transcripts whose exon chain contains `interval`.
    pub fn mapping(&self, interval: &Interval) -> Vec<usize> {
        let lower = self
            .transcripts
            .partition_point(|t| t.bbox().start < interval.start - self.max_len);
        let upper = self
            .transcripts
            .partition_point(|t| t.bbox().start < interval.end);

        (lower..upper.max(lower))
            .filter(|&ind| self.transcripts[ind].map_interval(interval).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: i64, end: i64) -> Interval {
        Interval::new(start, end)
    }

    #[test]
    fn test_transcript_chain() {
        let rna = Transcript::new("T1", vec![iv(500, 600), iv(100, 200), iv(150, 250)]).unwrap();
        assert_eq!(rna.exons(), &[iv(100, 250), iv(500, 600)]);
        assert_eq!(rna.bbox(), iv(100, 600));
        assert_eq!(rna.len(), 250);
        assert_eq!(rna.introns().collect::<Vec<_>>(), vec![iv(250, 500)]);
        assert!(Transcript::new("T2", vec![]).is_err());
    }

    #[test]
    fn test_map_interval() {
        let rna = Transcript::new("T1", vec![iv(100, 200), iv(500, 600)]).unwrap();
        assert_eq!(rna.map_interval(&iv(110, 120)), Some(iv(10, 20)));
        assert_eq!(rna.map_interval(&iv(550, 600)), Some(iv(150, 200)));
        // Intronic or exon-spanning intervals do not map
        assert_eq!(rna.map_interval(&iv(190, 510)), None);
        assert_eq!(rna.map_interval(&iv(300, 310)), None);
        assert_eq!(rna.map_interval(&iv(50, 110)), None);
    }

    #[test]
    fn test_index_mapping() {
        let index = TranscriptIndex::new(vec![
            Transcript::new("B", vec![iv(1000, 1100), iv(5000, 5100)]).unwrap(),
            Transcript::new("A", vec![iv(0, 100), iv(1000, 1200)]).unwrap(),
        ]);
        assert_eq!(index.len(), 2);
        let hits: Vec<&str> = index
            .mapping(&iv(1010, 1050))
            .into_iter()
            .map(|i| index.transcripts()[i].id.as_str())
            .collect();
        assert_eq!(hits, vec!["A", "B"]);
        assert_eq!(index.mapping(&iv(1150, 1160)), vec![0]);
        assert!(index.mapping(&iv(2000, 2010)).is_empty());
    }
}
