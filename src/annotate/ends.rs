//! SV breakpoint end annotation (spec §4.4).
//!
//! `CIPOS`/`CIEND` each get an independent annotation pass against an
//! ephemeral proxy Variant with a collapsed range, re-using the exact same
//! `annotate::annotate` entry point the primary pass uses — the "scope +
//! prefix" pattern from spec §9 rather than mutating and restoring the
//! original record.

use crate::error::Result;
use crate::record::{Info, InfoValue, Record, VariantData};
use crate::source::Source;

use super::{annotate, QueryView};

const LEFT_PREFIX: &str = "left_";
const RIGHT_PREFIX: &str = "right_";

/// Run the left-end and right-end annotation passes for a Variant query,
/// copying their produced fields back into `variant.info` under the
/// appropriate prefix. No-op for a side whose resolved range equals the
/// full variant range (nothing new to learn).
pub fn annotate_ends(
    chrom: &str,
    start: u32,
    end: u32,
    variant: &mut VariantData,
    related: &[Record],
    sources: &[Source],
    strict: bool,
) -> Result<()> {
    let (ll, lr) = variant.ci_pos.unwrap_or((start, start + 1));
    if (ll, lr) != (start, end) {
        run_side(chrom, ll, lr, related, sources, strict, LEFT_PREFIX, &mut variant.info)?;
    }

    let (rl, rr) = variant.ci_end.unwrap_or((end.saturating_sub(1), end));
    if (rl, rr) != (start, end) {
        run_side(chrom, rl, rr, related, sources, strict, RIGHT_PREFIX, &mut variant.info)?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_side(
    chrom: &str,
    proxy_start: u32,
    proxy_end: u32,
    related: &[Record],
    sources: &[Source],
    strict: bool,
    prefix: &str,
    dest_info: &mut Info,
) -> Result<()> {
    let filtered: Vec<Record> =
        related.iter().filter(|r| r.overlaps_range(chrom, proxy_start, proxy_end)).cloned().collect();

    let mut proxy_info = Info::new();
    proxy_info.insert("SVLEN", InfoValue::Integer(proxy_end as i64 - proxy_start as i64 - 1));
    proxy_info.insert("END", InfoValue::Integer(proxy_end as i64));

    let alts = vec!["<DEL>".to_string()];
    let mut view = QueryView {
        chrom,
        start: proxy_start,
        end: proxy_end,
        reference: "A",
        alts: &alts,
        info: &mut proxy_info,
    };

    annotate(&mut view, &filtered, sources, strict, "")?;

    for (key, value) in proxy_info.iter() {
        if key == "SVLEN" || key == "END" {
            continue;
        }
        dest_info.insert(format!("{prefix}{key}"), value.clone());
    }

    Ok(())
}
