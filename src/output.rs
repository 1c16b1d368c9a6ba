//! Output serialization (spec §6 "Output formats", "Overlap semantics on the
//! wire"): VCF queries re-emit as VCF with an updated header; BED queries
//! re-emit as BED with one appended column. Chromosome casing/order mirror
//! the query stream untouched.

use std::io::Write;

use crate::error::Result;
use crate::header::InfoDeclaration;
use crate::record::{Info, InfoValue, VariantData};

/// Render one `##INFO=<...>` declaration block, inserted just before the
/// `#CHROM` header line of a passthrough VCF header.
pub fn render_header_additions(declarations: &[InfoDeclaration]) -> String {
    declarations.iter().map(|d| d.render()).collect::<Vec<_>>().join("\n")
}

/// Write every passthrough header line, inserting the new `##INFO` lines
/// immediately before `#CHROM...`, then the `#CHROM` line itself.
pub fn write_header(
    out: &mut impl Write,
    passthrough_lines: &[String],
    declarations: &[InfoDeclaration],
) -> Result<()> {
    for line in passthrough_lines {
        if line.starts_with("#CHROM") {
            for decl in declarations {
                writeln!(out, "{}", decl.render())?;
            }
        }
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Render one annotated Variant back to a VCF data line. 0-based half-open
/// `start` converts back to 1-based inclusive `POS` (spec §6 "VCF positions
/// are 1-based inclusive and are converted on read/write").
pub fn render_variant_line(chrom: &str, start: u32, variant: &VariantData) -> String {
    let alt = if variant.alt.is_empty() { ".".to_string() } else { variant.alt.join(",") };
    let filter = if variant.filter.is_empty() { ".".to_string() } else { variant.filter.clone() };
    let id = if variant.id.is_empty() { ".".to_string() } else { variant.id.clone() };
    format!(
        "{chrom}\t{}\t{id}\t{}\t{alt}\t.\t{filter}\t{}",
        start + 1,
        variant.reference,
        render_info(&variant.info)
    )
}

pub fn render_info(info: &Info) -> String {
    if info.is_empty() {
        return ".".to_string();
    }
    info.iter()
        .map(|(k, v)| match v {
            InfoValue::Flag => k.clone(),
            other => format!("{k}={}", other.display_value()),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Append a would-be-INFO column to an original BED record's columns (spec
/// §4.5, §6).
pub fn render_bed_line(chrom: &str, start: u32, end: u32, fields: &[Vec<u8>], appended: &str) -> String {
    let mut out = format!("{chrom}\t{start}\t{end}");
    for f in fields {
        out.push('\t');
        out.push_str(&String::from_utf8_lossy(f));
    }
    out.push('\t');
    out.push_str(appended);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::InfoValue;

    #[test]
    fn variant_line_converts_start_back_to_one_based_pos() {
        let mut info = Info::new();
        info.insert("DP", InfoValue::Integer(35));
        let variant = VariantData {
            id: ".".to_string(),
            reference: "A".to_string(),
            alt: vec!["T".to_string(), "G".to_string()],
            filter: "PASS".to_string(),
            info,
            ci_pos: None,
            ci_end: None,
        };
        let line = render_variant_line("chr1", 233, &variant);
        assert_eq!(line, "chr1\t234\t.\tA\tT,G\t.\tPASS\tDP=35");
    }

    #[test]
    fn empty_info_renders_dot() {
        let variant = VariantData {
            id: ".".to_string(),
            reference: "A".to_string(),
            alt: vec!["T".to_string()],
            filter: ".".to_string(),
            info: Info::new(),
            ci_pos: None,
            ci_end: None,
        };
        assert!(render_variant_line("chr1", 0, &variant).ends_with('.'));
    }

    #[test]
    fn bed_line_appends_info_column_after_original_fields() {
        let fields = vec![b"name".to_vec()];
        let line = render_bed_line("chr1", 10, 20, &fields, "fitcons_mean=111");
        assert_eq!(line, "chr1\t10\t20\tname\tfitcons_mean=111");
    }
}
