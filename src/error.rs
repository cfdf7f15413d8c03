use thiserror::Error;

/// Errors surfaced to callers of the synthesis core.
///
/// Nothing on the render path returns these: validation happens when
/// parameters are set or resources are built, never per sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthError {
    /// A value supplied directly (not through a clamping setter) is out of range.
    #[error("invalid value {value} for `{param}`: {reason}")]
    Configuration {
        param: String,
        value: f64,
        reason: String,
    },

    /// A configuration document could not be parsed.
    #[error("config parse error: {0}")]
    Config(String),

    #[error("invalid time range: start {start}s, end {end}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("no audio file loaded")]
    NotLoaded,

    #[error("unknown style '{0}'")]
    UnknownStyle(String),

    #[error("unknown effect '{0}'")]
    UnknownEffect(String),

    #[error("effect '{effect}' has no parameter '{param}'")]
    UnknownParameter { effect: String, param: String },

    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("unknown chord '{0}'")]
    UnknownChord(String),

    #[error("step {step} out of range for a {step_count}-step pattern")]
    StepOutOfRange { step: usize, step_count: usize },

    #[error("sample bank is full ({0} pads)")]
    BankFull(usize),

    #[error("no sample pad with id {0}")]
    UnknownPad(u32),

    #[error("WAV error: {0}")]
    Wav(String),
}

impl SynthError {
    pub fn configuration(param: impl Into<String>, value: f64, reason: impl Into<String>) -> Self {
        SynthError::Configuration {
            param: param.into(),
            value,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;

/// Reject `value` unless it lies in `[min, max]`.
pub fn check_range(param: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(SynthError::configuration(
            param,
            value,
            format!("expected a value in [{min}, {max}]"),
        ));
    }
    Ok(())
}
