//! Fixed-length circular buffer shared by the string model and the
//! time-based effects.

/// Circular buffer with a single wrapping cursor.
///
/// The length is fixed at construction and is always at least 1. Reads
/// look back from the cursor; [`DelayLine::push`] writes at the cursor and
/// advances it.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    cursor: usize,
}

impl DelayLine {
    pub fn new(length: usize) -> Self {
        DelayLine {
            buffer: vec![0.0; length.max(1)],
            cursor: 0,
        }
    }

    /// A line one period long for `frequency`: `round(sample_rate / frequency)`.
    pub fn for_frequency(sample_rate: f64, frequency: f64) -> Self {
        Self::new(period_length(sample_rate, frequency))
    }

    /// A line able to hold `seconds` of delay (plus one frame for interpolation).
    pub fn for_seconds(sample_rate: f64, seconds: f64) -> Self {
        Self::new((sample_rate * seconds.max(0.0)).ceil() as usize + 2)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Value at the cursor (the oldest sample).
    #[inline]
    pub fn current(&self) -> f32 {
        self.buffer[self.cursor]
    }

    /// Value one past the cursor, wrapping.
    #[inline]
    pub fn next_cell(&self) -> f32 {
        self.buffer[(self.cursor + 1) % self.buffer.len()]
    }

    /// Overwrite the cell under the cursor.
    #[inline]
    pub fn write(&mut self, value: f32) {
        self.buffer[self.cursor] = value;
    }

    #[inline]
    pub fn advance(&mut self) {
        self.cursor += 1;
        if self.cursor == self.buffer.len() {
            self.cursor = 0;
        }
    }

    /// Write at the cursor and advance.
    #[inline]
    pub fn push(&mut self, value: f32) {
        self.write(value);
        self.advance();
    }

    /// Sample written `delay` pushes ago (1 = most recent). Clamped to the line.
    #[inline]
    pub fn read(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1, len);
        self.buffer[(self.cursor + len - delay) % len]
    }

    /// Linearly interpolated read `delay` samples back.
    #[inline]
    pub fn read_interpolated(&self, delay: f64) -> f32 {
        let max = (self.buffer.len() - 1) as f64;
        let delay = delay.clamp(1.0, max.max(1.0));
        let whole = delay.floor() as usize;
        let frac = (delay - whole as f64) as f32;
        let a = self.read(whole);
        let b = self.read(whole + 1);
        a + (b - a) * frac
    }

    /// Replace every cell, keeping the length.
    pub fn fill_with(&mut self, mut f: impl FnMut() -> f32) {
        for cell in &mut self.buffer {
            *cell = f();
        }
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.cursor = 0;
    }
}

/// `max(1, round(sample_rate / frequency))`.
pub fn period_length(sample_rate: f64, frequency: f64) -> usize {
    if frequency.is_nan() || frequency <= 0.0 {
        return 1;
    }
    ((sample_rate / frequency).round() as usize).max(1)
}
