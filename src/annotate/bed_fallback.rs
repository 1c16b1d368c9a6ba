//! BED-query fallback (spec §4.5).
//!
//! When the query stream is BED rather than VCF, each Interval record is
//! wrapped in a synthetic `<DEL>` Variant proxy, annotated exactly like a
//! real variant query (strict mode forced off — a bare interval has no
//! ref/alt to match strictly against), and the resulting `info` is rendered
//! as one appended tab-separated column instead of written back into a VCF
//! INFO field.

use crate::error::Result;
use crate::record::{Info, InfoValue, Record};
use crate::source::Source;

use super::{annotate, QueryView};

/// Annotate a BED query interval and render the result as the VCF-INFO-style
/// string (`key=value` pairs joined by `;`, bare key for flags) that gets
/// appended as the query's extra output column.
pub fn annotate_bed_query(
    chrom: &str,
    start: u32,
    end: u32,
    related: &[Record],
    sources: &[Source],
) -> Result<String> {
    let mut info = Info::new();
    info.insert("SVLEN", InfoValue::Integer(end as i64 - start as i64 - 1));

    let alts = vec!["<DEL>".to_string()];
    let mut view = QueryView { chrom, start, end, reference: "A", alts: &alts, info: &mut info };

    annotate(&mut view, related, sources, false, "")?;

    info.remove("SVLEN");
    Ok(render_info_column(&info))
}

fn render_info_column(info: &Info) -> String {
    info.iter()
        .map(|(key, value)| match value {
            InfoValue::Flag => key.clone(),
            other => format!("{key}={}", other.display_value()),
        })
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{IntervalData, RecordBody};
    use crate::source::Selector;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn bed(chrom: &str, start: u32, end: u32, source_id: u32, col: &str) -> Record {
        Record {
            chrom: Arc::from(chrom),
            start,
            end,
            source_id,
            body: RecordBody::Interval(IntervalData { fields: vec![col.as_bytes().to_vec()] }),
        }
    }

    #[test]
    fn renders_semicolon_joined_info_string_without_svlen() {
        let related = vec![bed("chr1", 224, 244, 1, "111")];
        let source = Source {
            file: PathBuf::from("fitcons.bed"),
            op: "mean".to_string(),
            name: "fitcons_mean".to_string(),
            selector: Selector::Column(4),
            index: 1,
            number_a: false,
            script: None,
        };
        let out = annotate_bed_query("chr1", 230, 231, &related, &[source]).unwrap();
        assert_eq!(out, "fitcons_mean=111");
    }

    #[test]
    fn no_overlapping_annotations_yields_empty_column() {
        let out = annotate_bed_query("chr1", 230, 231, &[], &[]).unwrap();
        assert_eq!(out, "");
    }
}
