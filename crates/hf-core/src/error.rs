use thiserror::Error;

pub type HfResult<T> = Result<T, HfError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HfError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Empty interval for {what}: [{lower}, {upper}]")]
    EmptyInterval {
        what: &'static str,
        lower: f64,
        upper: f64,
    },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },
}
