//! Step grid: one boolean row per instrument.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dsp::percussion::Drum;
use crate::error::{Result, SynthError};

/// Rows every pattern starts with.
pub const DEFAULT_ROWS: [Drum; 4] = [Drum::Kick, Drum::Snare, Drum::ClosedHat, Drum::OpenHat];

pub const MAX_STEPS: usize = 64;

/// Serializes as `{ "step_count": 16, "rows": { "kick": [..], ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    step_count: usize,
    rows: BTreeMap<Drum, Vec<bool>>,
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::new(16)
    }
}

impl Pattern {
    /// Empty pattern; `step_count` is clamped to `1..=MAX_STEPS`.
    pub fn new(step_count: usize) -> Self {
        let step_count = step_count.clamp(1, MAX_STEPS);
        Pattern {
            step_count,
            rows: DEFAULT_ROWS
                .iter()
                .map(|&drum| (drum, vec![false; step_count]))
                .collect(),
        }
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn get(&self, drum: Drum, step: usize) -> bool {
        self.rows
            .get(&drum)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Set one cell. Rows outside [`DEFAULT_ROWS`] are created on demand.
    pub fn set(&mut self, drum: Drum, step: usize, on: bool) -> Result<()> {
        self.check_step(step)?;
        let count = self.step_count;
        self.rows.entry(drum).or_insert_with(|| vec![false; count])[step] = on;
        Ok(())
    }

    /// Flip one cell and return its new state.
    pub fn toggle(&mut self, drum: Drum, step: usize) -> Result<bool> {
        let on = !self.get(drum, step);
        self.set(drum, step, on)?;
        Ok(on)
    }

    /// Turn every cell off. Rows are kept.
    pub fn clear(&mut self) {
        for row in self.rows.values_mut() {
            row.fill(false);
        }
    }

    pub fn row(&self, drum: Drum) -> Option<&[bool]> {
        self.rows.get(&drum).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = (Drum, &[bool])> {
        self.rows.iter().map(|(&drum, row)| (drum, row.as_slice()))
    }

    /// Instruments with a hit on `step`, in [`Drum`] order.
    pub fn active_at(&self, step: usize) -> impl Iterator<Item = Drum> + '_ {
        self.rows
            .iter()
            .filter(move |(_, row)| row.get(step).copied().unwrap_or(false))
            .map(|(&drum, _)| drum)
    }

    pub fn hit_count(&self) -> usize {
        self.rows.values().flatten().filter(|&&on| on).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SynthError::Config(e.to_string()))
    }

    /// Parse and validate: every row must be exactly `step_count` long.
    pub fn from_json(json: &str) -> Result<Self> {
        let pattern: Pattern =
            serde_json::from_str(json).map_err(|e| SynthError::Config(e.to_string()))?;
        pattern.validate()?;
        Ok(pattern)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_count == 0 || self.step_count > MAX_STEPS {
            return Err(SynthError::configuration(
                "step_count",
                self.step_count as f64,
                format!("expected 1 to {MAX_STEPS} steps"),
            ));
        }
        for (drum, row) in &self.rows {
            if row.len() != self.step_count {
                return Err(SynthError::configuration(
                    drum.name(),
                    row.len() as f64,
                    format!("row length must equal step_count ({})", self.step_count),
                ));
            }
        }
        Ok(())
    }

    fn check_step(&self, step: usize) -> Result<()> {
        if step >= self.step_count {
            return Err(SynthError::StepOutOfRange {
                step,
                step_count: self.step_count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pattern_is_empty_with_default_rows() {
        let p = Pattern::new(16);
        assert_eq!(p.step_count(), 16);
        assert_eq!(p.hit_count(), 0);
        for drum in DEFAULT_ROWS {
            assert_eq!(p.row(drum).map(<[bool]>::len), Some(16));
        }
    }

    #[test]
    fn toggle_flips_and_reports() {
        let mut p = Pattern::new(16);
        assert!(p.toggle(Drum::Snare, 4).unwrap());
        assert!(p.get(Drum::Snare, 4));
        assert!(!p.toggle(Drum::Snare, 4).unwrap());
        assert!(!p.get(Drum::Snare, 4));
    }

    #[test]
    fn out_of_range_step_is_rejected() {
        let mut p = Pattern::new(8);
        let err = p.toggle(Drum::Kick, 8).unwrap_err();
        assert_eq!(err, SynthError::StepOutOfRange { step: 8, step_count: 8 });
        assert_eq!(p.hit_count(), 0);
    }

    #[test]
    fn extra_rows_are_created_on_demand() {
        let mut p = Pattern::new(4);
        p.set(Drum::Clap, 2, true).unwrap();
        assert_eq!(p.active_at(2).collect::<Vec<_>>(), vec![Drum::Clap]);
    }

    #[test]
    fn clear_keeps_rows() {
        let mut p = Pattern::new(16);
        p.set(Drum::Kick, 0, true).unwrap();
        p.set(Drum::ClosedHat, 3, true).unwrap();
        p.clear();
        assert_eq!(p.hit_count(), 0);
        assert!(p.row(Drum::Kick).is_some());
    }

    #[test]
    fn json_shape_uses_instrument_names() {
        let mut p = Pattern::new(2);
        p.set(Drum::Kick, 0, true).unwrap();
        let json = p.to_json().unwrap();
        assert!(json.starts_with(r#"{"step_count":2,"rows":{"kick":[true,false]"#), "got {json}");
        assert!(json.contains(r#""hihat":[false,false]"#));
        assert_eq!(Pattern::from_json(&json).unwrap(), p);
    }

    #[test]
    fn ragged_rows_fail_validation() {
        let err = Pattern::from_json(r#"{"step_count":4,"rows":{"kick":[true]}}"#).unwrap_err();
        assert!(matches!(err, SynthError::Configuration { .. }));
        let err = Pattern::from_json(r#"{"step_count":4,"rows":{"cowbell":[true,true,true,true]}}"#)
            .unwrap_err();
        assert!(matches!(err, SynthError::Config(_)));
    }
}
