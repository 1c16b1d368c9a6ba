// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! vanno: a `vcfanno`-style streaming annotation engine. Joins a sorted
//! query stream (VCF or BED) against N sorted annotation streams
//! (VCF/BED/BAM) in one forward pass, reduces each source's overlapping
//! values with a configured op, and writes the result back into the
//! query's `INFO`/appended-column output.

pub mod annotate;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod header;
pub mod io;
pub mod merge;
pub mod order;
pub mod output;
pub mod postannotate;
pub mod record;
pub mod reducers;
pub mod script;
pub mod source;

use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use error::Result;
use header::{end_declarations, post_rule_declaration, source_declaration, InfoDeclaration, UpstreamType};
use io::alignment::AlignmentSource;
use io::bed::BedSource;
use io::variant::{buffer_and_open, VariantSource};
use merge::{MergeEngine, RecordSource};
use record::RecordKind;

/// Library version, surfaced in `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Variant,
    Interval,
}

fn annotation_kind(path: &Path) -> QueryKind {
    let lower = path.to_string_lossy().to_lowercase();
    let stripped = lower.strip_suffix(".gz").unwrap_or(&lower);
    if stripped.ends_with(".bed") {
        QueryKind::Interval
    } else {
        QueryKind::Variant
    }
}

fn open_query_reader(query: &str) -> Result<Box<dyn Read>> {
    if query == "-" {
        Ok(Box::new(std::io::stdin()))
    } else {
        io::open_possibly_gzipped(Path::new(query))
    }
}

/// Open one annotation file as a boxed `RecordSource`, dispatching on
/// extension (`.vcf[.gz]`, `.bed[.gz]`, `.bam`) the same way `config::load`
/// classified it.
fn open_annotation(path: &Path, source_id: u32) -> Result<Box<dyn RecordSource>> {
    if path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("bam")).unwrap_or(false) {
        return Ok(Box::new(AlignmentSource::open(path, source_id)?));
    }
    match annotation_kind(path) {
        QueryKind::Interval => Ok(Box::new(BedSource::open(path, source_id)?)),
        QueryKind::Variant => Ok(Box::new(VariantSource::open(path, source_id)?)),
    }
}

/// Build every `InfoDeclaration` the output header needs: one per source
/// (honoring the "inherit upstream type" rule), its `left_`/`right_`
/// duplicates when `-ends` is set, and one per post-annotation rule that
/// doesn't replace `ID`.
fn build_declarations(cfg: &config::Config, ends: bool) -> Vec<InfoDeclaration> {
    let mut decls = Vec::new();
    for (source, upstream) in cfg.sources.iter().zip(&cfg.upstream_types) {
        let upstream = upstream.map(|out_type| UpstreamType { out_type });
        let decl = source_declaration(source, upstream);
        if ends && source.op != "by_alt" {
            let [left, right] = end_declarations(&decl);
            decls.push(left);
            decls.push(right);
        } else {
            decls.push(decl);
        }
    }
    for rule in &cfg.post_rules {
        if let Some(decl) = post_rule_declaration(rule) {
            decls.push(decl);
        }
    }
    decls
}

/// The full `vanno` pipeline: load the config, open the query and
/// annotation streams, run the merge engine through the parallel driver,
/// and write the annotated output to stdout.
pub fn run(cli: &cli::Cli) -> Result<()> {
    let env = cli::EnvOverrides::from_env();
    if env.profile {
        log::info!("IRELATE_PROFILE=TRUE requested; this build has no profiling hooks wired in");
    }

    let lua_preload = cli.lua.as_ref().map(std::fs::read_to_string).transpose()?;
    let cfg = config::load(&cli.config, cli.base_path.as_deref(), lua_preload.as_deref())?;

    let order = cli.chrom_order();
    let strict = cli.strict();
    let declarations = build_declarations(&cfg, cli.ends);

    let query_reader = open_query_reader(&cli.query)?;
    let kind = if cli.query == "-" { QueryKind::Variant } else { annotation_kind(Path::new(&cli.query)) };

    let mut file_names = vec![cli.query.clone()];
    for f in &cfg.annotation_files {
        file_names.push(f.display().to_string());
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let annotation_files = cfg.annotation_files.clone();
    let mut sources: Vec<Box<dyn RecordSource>> = Vec::with_capacity(1 + annotation_files.len());
    let query_record_kind;

    match kind {
        QueryKind::Variant => {
            let (query_src, header_lines) = buffer_and_open(query_reader, cli.query.clone(), 0)?;
            output::write_header(&mut out, &header_lines, &declarations)?;
            sources.push(Box::new(query_src));
            query_record_kind = RecordKind::Variant;
        }
        QueryKind::Interval => {
            sources.push(Box::new(BedSource::new(query_reader, cli.query.clone(), 0)));
            query_record_kind = RecordKind::Interval;
        }
    }
    for (idx, path) in annotation_files.iter().enumerate() {
        sources.push(open_annotation(path, (idx + 1) as u32)?);
    }

    let driver_config = driver::DriverConfig {
        max_chunk: env.max_chunk.unwrap_or(8_000),
        max_gap: env.max_gap.unwrap_or(20_000),
        workers: cli.workers,
        ends: cli.ends,
        strict,
    };

    // When `-ends` is enabled, CIPOS/CIEND may place the left/right proxy
    // ranges outside the variant's own [start,end) — widen the merge
    // engine's overlap window by the same ceiling the driver already uses
    // to bound "how far apart is still adjacent" (`IRELATE_MAX_GAP`) so
    // those annotation records are still in `related` when `ends.rs` filters
    // down to the exact CI-resolved range.
    let slop = if cli.ends { driver_config.max_gap } else { 0 };
    let mut engine = MergeEngine::new(sources, file_names, order, slop)?;
    let sources_arc = Arc::new(cfg.sources);
    let post_rules_arc = Arc::new(cfg.post_rules);

    driver::run(
        || engine.next(),
        &driver_config,
        sources_arc,
        post_rules_arc,
        |item| {
            match (&item.record.body, query_record_kind) {
                (record::RecordBody::Variant(v), RecordKind::Variant) => {
                    writeln!(out, "{}", output::render_variant_line(&item.record.chrom, item.record.start, v))?;
                }
                (record::RecordBody::Interval(iv), RecordKind::Interval) => {
                    let appended = iv.fields.last().map(|f| String::from_utf8_lossy(f).into_owned()).unwrap_or_default();
                    let original = &iv.fields[..iv.fields.len().saturating_sub(1)];
                    writeln!(
                        out,
                        "{}",
                        output::render_bed_line(&item.record.chrom, item.record.start, item.record.end, original, &appended)
                    )?;
                }
                _ => {}
            }
            Ok(())
        },
    )?;
    out.flush()?;
    Ok(())
}
