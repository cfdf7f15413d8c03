//! Style-based pattern generation.
//!
//! Each style lays down a fixed skeleton and then adds Bernoulli fills whose
//! probabilities grow with `complexity`. Draws happen in a fixed order, so a
//! seeded [`Rng`] reproduces the same pattern. Positions past the end of a
//! short pattern are skipped; their draws are still consumed.

use super::Style;
use super::pattern::Pattern;
use crate::dsp::percussion::Drum;
use crate::rng::Rng;

const KICK: Drum = Drum::Kick;
const SNARE: Drum = Drum::Snare;
const HIHAT: Drum = Drum::ClosedHat;
const OPENHAT: Drum = Drum::OpenHat;

/// Build a `step_count`-step pattern for `style`. `complexity` is clamped
/// to `[0, 1]`.
pub fn generate(style: Style, complexity: f64, step_count: usize, rng: &mut Rng) -> Pattern {
    let c = if complexity.is_nan() { 0.0 } else { complexity.clamp(0.0, 1.0) };
    let mut grid = Grid(Pattern::new(step_count));
    match style {
        Style::Rock => rock(&mut grid, c, rng),
        Style::Electronic => electronic(&mut grid, c, rng),
        Style::Jazz => jazz(&mut grid, c, rng),
        Style::Funk => funk(&mut grid, c, rng),
    }
    log::debug!("generated {style} pattern, complexity {c:.2}, {} hits", grid.0.hit_count());
    grid.0
}

/// Writes that ignore positions past the end.
struct Grid(Pattern);

impl Grid {
    fn put(&mut self, drum: Drum, step: usize, on: bool) {
        if step < self.0.step_count() {
            // in range, cannot fail
            let _ = self.0.set(drum, step, on);
        }
    }

    fn get(&self, drum: Drum, step: usize) -> bool {
        self.0.get(drum, step)
    }

    fn steps(&self) -> usize {
        self.0.step_count()
    }
}

fn rock(g: &mut Grid, c: f64, rng: &mut Rng) {
    g.put(KICK, 0, true);
    g.put(KICK, 8, true);
    g.put(SNARE, 4, true);
    g.put(SNARE, 12, true);
    for i in (0..g.steps()).step_by(2) {
        g.put(HIHAT, i, true);
    }
    if c > 0.3 {
        g.put(KICK, 6, rng.chance(c));
        g.put(KICK, 14, rng.chance(c));
    }
    if c > 0.5 {
        for i in (1..g.steps()).step_by(4) {
            g.put(HIHAT, i, rng.chance(c * 0.7));
        }
    }
    if c > 0.7 {
        g.put(SNARE, 10, rng.chance(c - 0.5));
        g.put(OPENHAT, 7, rng.chance(c - 0.5));
    }
}

fn electronic(g: &mut Grid, c: f64, rng: &mut Rng) {
    for i in (0..g.steps()).step_by(4) {
        g.put(KICK, i, true);
    }
    g.put(SNARE, 4, true);
    g.put(SNARE, 12, true);
    for i in 0..g.steps() {
        if i % 2 == 0 {
            g.put(HIHAT, i, true);
        } else if c > 0.4 {
            g.put(HIHAT, i, rng.chance(c));
        }
    }
    if c > 0.6 {
        g.put(KICK, 6, true);
        g.put(KICK, 10, rng.chance(c - 0.4));
    }
    if c > 0.7 {
        g.put(OPENHAT, 3, true);
        g.put(OPENHAT, 11, rng.chance(c - 0.5));
    }
}

fn jazz(g: &mut Grid, c: f64, rng: &mut Rng) {
    for i in 0..g.steps() {
        if i % 3 == 0 || (i % 6 == 4 && c > 0.3) {
            g.put(HIHAT, i, true);
        }
    }
    g.put(KICK, 0, true);
    g.put(KICK, 9, rng.chance(c));
    g.put(SNARE, 6, true);
    g.put(SNARE, 14, true);
    if c > 0.5 {
        // ghost notes; the second draw only happens when the first passes
        for i in 0..g.steps() {
            if !g.get(SNARE, i) && rng.chance(c * 0.3) {
                g.put(SNARE, i, rng.chance(0.3));
            }
        }
    }
    if c > 0.6 {
        g.put(OPENHAT, 7, rng.chance(c - 0.4));
        g.put(OPENHAT, 15, rng.chance(c - 0.4));
    }
}

fn funk(g: &mut Grid, c: f64, rng: &mut Rng) {
    g.put(KICK, 0, true);
    g.put(KICK, 6, true);
    g.put(KICK, 10, rng.chance(c));
    g.put(KICK, 13, rng.chance(c));
    g.put(SNARE, 4, true);
    g.put(SNARE, 12, true);
    for i in 0..g.steps() {
        if i % 2 == 1 || c > 0.4 {
            g.put(HIHAT, i, rng.chance(0.5 + c * 0.5));
        }
    }
    if c > 0.5 {
        g.put(OPENHAT, 3, rng.chance(c - 0.3));
        g.put(OPENHAT, 11, rng.chance(c - 0.3));
    }
    if c > 0.7 {
        g.put(KICK, 2, rng.chance(c - 0.5));
        g.put(KICK, 14, rng.chance(c - 0.5));
    }
}
