//! Command-line front end. `clap`-derived: a thin struct mapped straight
//! onto flags; all real work happens in `config`, `driver`, and the `run`
//! entry point this module calls into.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Result, VannoError};
use crate::order::ChromOrder;

#[derive(Parser, Debug)]
#[command(name = "vanno", about = "Annotate a sorted VCF/BED stream against sorted annotation files")]
pub struct Cli {
    /// Annotate each query Variant's CIPOS/CIEND breakpoints separately,
    /// emitting left_/right_-prefixed fields.
    #[arg(long = "ends")]
    pub ends: bool,

    /// Disable strict chrom/start/ref/alt matching for Variant annotation
    /// sources (equivalent to `strict = false`).
    #[arg(long = "permissive-overlap")]
    pub permissive_overlap: bool,

    /// File of `name = lua:<expr>` preload definitions, required before any
    /// source or post-annotation rule may use a `lua:` op.
    #[arg(long = "lua")]
    pub lua: Option<PathBuf>,

    /// Prepended to every relative annotation file path in the config.
    #[arg(long = "base-path")]
    pub base_path: Option<PathBuf>,

    /// Worker pool size (spec §5 `P`, default 2).
    #[arg(short = 'p', default_value_t = 2)]
    pub workers: usize,

    /// Use lexicographic chromosome order instead of natural order. All
    /// streams must share the chosen order.
    #[arg(long = "lexicographical")]
    pub lexicographical: bool,

    pub config: PathBuf,

    /// `query.vcf[.gz]`, `query.bed[.gz]`, or `-` for stdin (VCF assumed).
    pub query: String,
}

impl Cli {
    pub fn chrom_order(&self) -> ChromOrder {
        if self.lexicographical {
            ChromOrder::Lexicographic
        } else {
            ChromOrder::Natural
        }
    }

    pub fn strict(&self) -> bool {
        !self.permissive_overlap
    }
}

/// `IRELATE_MAX_GAP`/`IRELATE_MAX_CHUNK`/`IRELATE_PROFILE` (spec §6).
pub struct EnvOverrides {
    pub max_gap: Option<u32>,
    pub max_chunk: Option<usize>,
    pub profile: bool,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            max_gap: std::env::var("IRELATE_MAX_GAP").ok().and_then(|v| v.parse().ok()),
            max_chunk: std::env::var("IRELATE_MAX_CHUNK").ok().and_then(|v| v.parse().ok()),
            profile: std::env::var("IRELATE_PROFILE").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false),
        }
    }
}

/// Exit codes (spec §6): 0 success, 2 missing input, 1 any fatal error.
pub fn exit_code_for(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(VannoError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => 2,
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::parse_from(["vanno", "config.toml", "query.vcf"]);
        assert!(!cli.ends);
        assert!(cli.strict());
        assert_eq!(cli.workers, 2);
    }

    #[test]
    fn permissive_overlap_flag_disables_strict() {
        let cli = Cli::parse_from(["vanno", "--permissive-overlap", "config.toml", "query.vcf"]);
        assert!(!cli.strict());
    }

    #[test]
    fn lexicographical_flag_selects_order() {
        let cli = Cli::parse_from(["vanno", "--lexicographical", "config.toml", "query.vcf"]);
        assert_eq!(cli.chrom_order(), ChromOrder::Lexicographic);
    }

    #[test]
    fn not_found_io_error_maps_to_exit_code_two() {
        let err: Result<()> = Err(VannoError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x")));
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn other_errors_map_to_exit_code_one() {
        let err: Result<()> = Err(VannoError::Config("bad".to_string()));
        assert_eq!(exit_code_for(&err), 1);
    }
}
