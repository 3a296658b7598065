use std::ops::Range;

use crate::config::ScoringConfig;
use crate::dsranges_structs::Interval;
use crate::error::{Error, Result};
use crate::invrep::{InvRepeat, StemSegment};
use crate::nearest::BoundaryIndex;
use crate::overlaps::IntervalIndex;

/// Working copy of the difference track for one scoring window.
///
/// `resolve` consumes signal in place, so a state must be owned by a single
/// selection pass and resolved in acceptance order.
#[derive(Debug)]
pub struct ScoreState<'a> {
    window: Interval,
    scores: Vec<f32>,
    boundaries: &'a BoundaryIndex,
    peaks: IntervalIndex,
    max_overlap: i64,
    params: ScoringConfig,
}

impl<'a> ScoreState<'a> {
    pub fn new(
        window: Interval,
        scores: Vec<f32>,
        boundaries: &'a BoundaryIndex,
        peaks: IntervalIndex,
        params: ScoringConfig,
    ) -> Self {
        debug_assert_eq!(window.len() as usize, scores.len());
        let max_overlap = peaks.total_length();
        ScoreState {
            window,
            scores,
            boundaries,
            peaks,
            max_overlap,
            params,
        }
    }

    pub fn window(&self) -> Interval {
        self.window
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    fn slice(&self, interval: &Interval) -> Result<Range<usize>> {
        if !self.window.contains(interval) {
            return Err(Error::Window {
                start: interval.start,
                end: interval.end,
                wstart: self.window.start,
                wend: self.window.end,
            });
        }
        let start = (interval.start - self.window.start) as usize;
        Ok(start..start + interval.len() as usize)
    }

    /// Signal explained by one segment: elementwise minimum of the left arm
    /// and the reversed right arm.
    fn explained(&self, segment: &StemSegment) -> Result<Vec<f32>> {
        let left = &self.scores[self.slice(&segment.left)?];
        let right = &self.scores[self.slice(&segment.right)?];
        Ok(left
            .iter()
            .zip(right.iter().rev())
            .map(|(l, r)| l.min(*r))
            .collect())
    }

    pub fn raw_score(&self, rna: &InvRepeat) -> Result<f64> {
        let mut score = 0f64;
        for segment in rna.segments() {
            score += self
                .explained(segment)?
                .iter()
                .map(|x| *x as f64)
                .sum::<f64>();
        }
        Ok(score)
    }

    /// Multiplier combining peak support, arm distance and boundary decay.
    pub fn weight(&self, rna: &InvRepeat) -> f64 {
        let (left, right) = (rna.left_bound(), rna.right_bound());

        if self.max_overlap == 0 {
            return 0.0;
        }
        let overlap = self.peaks.overlap_size(&left) + self.peaks.overlap_size(&right);
        let mut weight = overlap as f64 / self.max_overlap as f64;

        let distance = right.start - left.end;
        if distance > self.params.distance_threshold {
            weight /= distance as f64 / self.params.distance_threshold as f64;
        }

        let crossings = self.boundaries.crossings(left.end, right.start);
        if crossings > 0 {
            let exponent = crossings.min(self.params.max_boundary_penalty as usize) as i32;
            weight /= 2f64.powi(exponent);
        }
        weight
    }

    pub fn score(&self, rna: &InvRepeat) -> Result<f64> {
        Ok(self.raw_score(rna)? * self.weight(rna))
    }

    /// Consume the signal explained by `rna` on both arms and return its total.
    pub fn resolve(&mut self, rna: &InvRepeat) -> Result<f64> {
        let mut total = 0f64;
        for segment in rna.segments() {
            let explained = self.explained(segment)?;
            total += explained.iter().map(|x| *x as f64).sum::<f64>();

            let left = self.slice(&segment.left)?;
            for (x, e) in self.scores[left].iter_mut().zip(&explained) {
                *x = (*x - e).max(0.0);
            }
            let right = self.slice(&segment.right)?;
            for (x, e) in self.scores[right].iter_mut().zip(explained.iter().rev()) {
                *x = (*x - e).max(0.0);
            }
        }
        Ok(total)
    }
}
