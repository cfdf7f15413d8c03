//! Note names, MIDI numbers and frequencies.

/// Parse a note name (e.g. "C4", "F#3", "Bb5") into a MIDI note number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let (semitone, rest) = parse_pitch_class(note)?;
    let octave: i32 = rest.parse().ok()?;
    // C4 = 60
    Some((octave + 1) * 12 + semitone)
}

/// Split a leading pitch class ("C", "F#", "Bb") from the rest of `text`.
///
/// Returns the semitone offset from C (may be -1 for "Cb") and the
/// unparsed remainder.
pub fn parse_pitch_class(text: &str) -> Option<(i32, &str)> {
    let mut chars = text.chars();
    let base = match chars.next()? {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    match rest.chars().next() {
        Some('#') => Some((base + 1, &rest[1..])),
        Some('b') => Some((base - 1, &rest[1..])),
        _ => Some((base, rest)),
    }
}

/// `tuning_pitch * 2^((midi - 69) / 12)`, where `tuning_pitch` is A4.
pub fn midi_to_frequency(midi: i32, tuning_pitch: f64) -> f64 {
    tuning_pitch * (2.0_f64).powf((midi as f64 - 69.0) / 12.0)
}

/// Note name to frequency with A4 = 440 Hz.
pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(|m| midi_to_frequency(m, 440.0))
}

/// Nearest MIDI note for a frequency.
pub fn frequency_to_midi(freq: f64, tuning_pitch: f64) -> i32 {
    (69.0 + 12.0 * (freq / tuning_pitch).log2()).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_note_names() {
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("A4"), Some(69));
        assert_eq!(note_to_midi("F#3"), Some(54));
        assert_eq!(note_to_midi("Bb5"), Some(82));
        assert_eq!(note_to_midi("H4"), None);
        assert_eq!(note_to_midi("C"), None);
    }

    #[test]
    fn a4_is_440() {
        let f = note_to_frequency("A4").unwrap();
        assert!((f - 440.0).abs() < 1e-9);
        assert!((midi_to_frequency(81, 440.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn frequency_round_trips_to_midi() {
        for midi in [40, 57, 69, 88] {
            assert_eq!(frequency_to_midi(midi_to_frequency(midi, 440.0), 440.0), midi);
        }
    }

    #[test]
    fn pitch_class_leaves_remainder() {
        assert_eq!(parse_pitch_class("C#m7"), Some((1, "m7")));
        assert_eq!(parse_pitch_class("Ebmaj7"), Some((3, "maj7")));
        assert_eq!(parse_pitch_class("x"), None);
    }
}
