// Clippy allows
#![allow(clippy::too_many_arguments)]

//! vanno: annotate a sorted VCF/BED stream against sorted annotation files.
//!
//! Usage: vanno [OPTIONS] <CONFIG> <QUERY>

use clap::Parser;

use vanno::cli::{exit_code_for, Cli};

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = vanno::run(&cli);
    if let Err(e) = &result {
        log::error!("{e}");
    }
    std::process::exit(exit_code_for(&result));
}
