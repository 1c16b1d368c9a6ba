//! Crate-wide error type (spec §7).
//!
//! Only the fatal categories (Configuration, Ordering, I/O) are modeled as a
//! returned `Result`. The local categories (Parse, Numeric coercion, Allele
//! mismatch, Script) are handled in place via `log::warn!` and a skipped
//! value, per the §7 policy that local errors never abort the stream.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VannoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed record in {file} at line {line}: {message}")]
    Parse { file: String, line: usize, message: String },

    #[error("out of order record in {file}: previous {prev}, current {cur}")]
    OutOfOrder { file: String, prev: String, cur: String },

    #[error("script error: {0}")]
    Script(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, VannoError>;
