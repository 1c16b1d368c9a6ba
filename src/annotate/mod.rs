//! Per-query annotator (spec §4.3).
//!
//! Turns one query record's attached overlap set into reduced `INFO` values.
//! Operates over a `QueryView` rather than directly on a `VariantData` so
//! the same code path serves the primary pass, the two SV-end passes
//! (`crate::annotate::ends`, proxy variants with a collapsed range), and the
//! BED-query fallback (`crate::annotate::bed_fallback`, a synthetic
//! variant wrapping a BED interval) — the "scope + prefix" pattern spec §9
//! calls for instead of mutate-and-restore.

pub mod alleles;
pub mod bed_fallback;
pub mod ends;

use rhai::Dynamic;

use crate::error::{Result, VannoError};
use crate::header::emitted_name;
use crate::merge::RelatedRecord;
use crate::record::{Info, InfoValue, Record, RecordBody};
use crate::reducers::{reduce_scalar, ReduceOp, ScalarValue};
use crate::script::as_flag;
use crate::source::{PostAnnotationRule, Source};

use alleles::{by_alt_reduce, self_alt_reduce, AltContribution};

/// Drive the whole per-query pipeline for one query record from the merge
/// engine: primary annotation, the two SV-end passes (when enabled), and
/// the post-annotator. BED-query records take the §4.5 fallback path
/// instead and get their rendered INFO string appended as an extra column.
pub fn annotate_query_record(
    item: &mut RelatedRecord,
    sources: &[Source],
    post_rules: &[PostAnnotationRule],
    do_ends: bool,
    strict: bool,
) -> Result<()> {
    let related = item.related.clone();
    let chrom = item.record.chrom.clone();
    let start = item.record.start;
    let end = item.record.end;

    match &mut item.record.body {
        RecordBody::Variant(variant) => {
            {
                let alts = variant.alt.clone();
                let reference = variant.reference.clone();
                let mut view =
                    QueryView { chrom: &chrom, start, end, reference: &reference, alts: &alts, info: &mut variant.info };
                annotate(&mut view, &related, sources, strict, "")?;
            }
            if do_ends {
                ends::annotate_ends(&chrom, start, end, variant, &related, sources, strict)?;
            }
            let mut id = variant.id.clone();
            crate::postannotate::apply_post_annotations(&mut variant.info, &mut id, post_rules)?;
            variant.id = id;
            Ok(())
        }
        RecordBody::Interval(interval) => {
            let rendered = bed_fallback::annotate_bed_query(&chrom, start, end, &related, sources)?;
            interval.fields.push(rendered.into_bytes());
            Ok(())
        }
        RecordBody::Alignment(_) => Ok(()),
    }
}

/// A query record reduced to the shape the annotator needs, independent of
/// whether it's a real VCF Variant, an SV-end proxy, or a BED-wrapped proxy.
pub struct QueryView<'a> {
    pub chrom: &'a str,
    pub start: u32,
    pub end: u32,
    pub reference: &'a str,
    pub alts: &'a [String],
    pub info: &'a mut Info,
}

/// One overlapping annotation record's extracted contribution: its own alt
/// list (used for per-alt alignment; empty when not applicable) and the
/// values it contributed.
struct SourceContribution {
    o_alts: Vec<String>,
    values: Vec<ScalarValue>,
}

/// Run every configured source against `view`'s attached overlap set,
/// writing `prefix + header::emitted_name(source)` into `view.info` for each
/// source that collected at least one value (spec §4.3 steps 1-4).
pub fn annotate(view: &mut QueryView, related: &[Record], sources: &[Source], strict: bool, prefix: &str) -> Result<()> {
    for source in sources {
        let contributions = collect_contributions(view, related, source, strict)?;
        if contributions.is_empty() {
            continue;
        }
        let key = format!("{prefix}{}", emitted_name(source));

        if source.is_script() {
            apply_script_source(view, source, &contributions, &key);
            continue;
        }

        let Some(op) = ReduceOp::parse(&source.op) else {
            return Err(VannoError::Config(format!("unknown reducer op `{}`", source.op)));
        };

        match op {
            ReduceOp::ByAlt => {
                let entries: Vec<AltContribution> =
                    contributions.iter().map(|c| (c.o_alts.clone(), c.values.clone())).collect();
                let per_alt = by_alt_reduce(view.alts, &entries);
                view.info.insert(key, InfoValue::StringArray(per_alt));
            }
            ReduceOp::SelfOp if source.number_a => {
                let entries: Vec<AltContribution> =
                    contributions.iter().map(|c| (c.o_alts.clone(), c.values.clone())).collect();
                let per_alt = self_alt_reduce(view.alts, &entries);
                let rendered: Vec<String> =
                    per_alt.into_iter().map(|v| v.map(|s| s.display()).unwrap_or_else(|| ".".to_string())).collect();
                view.info.insert(key, InfoValue::StringArray(rendered));
            }
            ReduceOp::SelfOp => {
                let flat: Vec<ScalarValue> = contributions.into_iter().flat_map(|c| c.values).collect();
                if flat.len() == 1 {
                    view.info.insert(key, flat[0].to_info_value());
                } else {
                    view.info.insert(key, scalar_list_to_info_value(&flat));
                }
            }
            ReduceOp::Delete => {} // only meaningful from the post-annotator
            _ => {
                let flat: Vec<ScalarValue> = contributions.into_iter().flat_map(|c| c.values).collect();
                if let Some(v) = reduce_scalar(op, &flat) {
                    view.info.insert(key, v);
                }
            }
        }
    }
    Ok(())
}

fn collect_contributions(
    view: &QueryView,
    related: &[Record],
    source: &Source,
    strict: bool,
) -> Result<Vec<SourceContribution>> {
    let numeric = ReduceOp::parse(&source.op).map(|op| op.is_numeric()).unwrap_or(false);
    let mut out = Vec::new();
    for r in related {
        if r.source_id != source.index {
            continue;
        }
        if !r.overlaps_range(view.chrom, view.start, view.end) {
            continue;
        }
        match &r.body {
            RecordBody::Variant(ann) => {
                if let Some(c) = collect_from_variant(view, r, ann, source, strict) {
                    out.push(c);
                }
            }
            RecordBody::Interval(ann) => {
                if let Some(c) = collect_from_interval(ann, source, numeric)? {
                    out.push(c);
                }
            }
            RecordBody::Alignment(ann) => {
                if let Some(c) = collect_from_alignment(ann, source)? {
                    out.push(c);
                }
            }
        }
    }
    Ok(out)
}

fn collect_from_variant(
    view: &QueryView,
    r: &Record,
    ann: &crate::record::VariantData,
    source: &Source,
    strict: bool,
) -> Option<SourceContribution> {
    if strict {
        let same_position = r.chrom.as_ref() == view.chrom && r.start == view.start;
        let shares_allele =
            same_position && view.reference == ann.reference && view.alts.iter().any(|a| ann.alt.contains(a));
        if !shares_allele {
            return None;
        }
    }

    match source.field_name() {
        Some("ID") => {
            if ann.id.is_empty() || ann.id == "." {
                None
            } else {
                Some(SourceContribution { o_alts: vec![], values: vec![ScalarValue::Str(ann.id.replace(';', ","))] })
            }
        }
        Some("FILTER") => {
            if ann.filter.is_empty() || ann.filter == "PASS" {
                None
            } else {
                Some(SourceContribution {
                    o_alts: vec![],
                    values: vec![ScalarValue::Str(ann.filter.replace(';', ","))],
                })
            }
        }
        Some(field) => {
            let v = ann.info.get(field)?;
            Some(SourceContribution { o_alts: ann.alt.clone(), values: ScalarValue::from_info_value(v) })
        }
        None => None,
    }
}

fn collect_from_interval(
    ann: &crate::record::IntervalData,
    source: &Source,
    numeric: bool,
) -> Result<Option<SourceContribution>> {
    let crate::source::Selector::Column(col) = &source.selector else {
        return Ok(None);
    };
    let col = *col;
    let Some(raw) = ann.column(col) else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(raw);

    if numeric {
        let parsed: f64 = text.trim().parse().map_err(|_| VannoError::Parse {
            file: source.file.display().to_string(),
            line: 0,
            message: format!("column {col} value `{text}` is not numeric"),
        })?;
        Ok(Some(SourceContribution { o_alts: vec![], values: vec![ScalarValue::Float(parsed)] }))
    } else {
        Ok(Some(SourceContribution {
            o_alts: vec![],
            values: vec![ScalarValue::Str(text.replace(';', ","))],
        }))
    }
}

fn collect_from_alignment(ann: &crate::record::AlignmentData, source: &Source) -> Result<Option<SourceContribution>> {
    if ann.is_excluded() {
        return Ok(None);
    }
    use crate::source::Selector;
    match &source.selector {
        Selector::BamField(None) => {
            Ok(Some(SourceContribution { o_alts: vec![], values: vec![ScalarValue::Int(1)] }))
        }
        Selector::BamField(Some(field)) => match field.as_str() {
            "mapq" => Ok(Some(SourceContribution { o_alts: vec![], values: vec![ScalarValue::Int(ann.mapq as i64)] })),
            "seq" => Ok(Some(SourceContribution {
                o_alts: vec![],
                values: vec![ScalarValue::Str(String::from_utf8_lossy(&ann.seq).into_owned())],
            })),
            "DP2" => {
                Ok(Some(SourceContribution { o_alts: vec![], values: vec![ScalarValue::Bool(ann.is_reverse())] }))
            }
            other if source.op == "count" => {
                log::warn!("unknown BAM field `{other}` with op `count`; treating as a read counter for backward compatibility");
                Ok(Some(SourceContribution { o_alts: vec![], values: vec![ScalarValue::Int(1)] }))
            }
            other => Err(VannoError::Config(format!("unknown BAM field `{other}`"))),
        },
        Selector::Field(_) => Ok(None),
    }
}

fn apply_script_source(view: &mut QueryView, source: &Source, contributions: &[SourceContribution], key: &str) {
    let Some(state) = &source.script else { return };
    let vals: rhai::Array = contributions.iter().flat_map(|c| c.values.iter().map(scalar_to_dynamic)).collect();
    let vars: Vec<(&str, Dynamic)> = vec![
        ("chrom", Dynamic::from(view.chrom.to_string())),
        ("start", Dynamic::from(view.start as i64)),
        ("stop", Dynamic::from(view.end as i64)),
        ("ref", Dynamic::from(view.reference.to_string())),
        ("alt", Dynamic::from(view.alts.join(","))),
        ("vals", Dynamic::from(vals)),
    ];
    let Some(result) = state.eval(&vars) else { return };

    if source.op.contains("_flag(") {
        if as_flag(&result) {
            view.info.insert(key, InfoValue::Flag);
        }
    } else {
        view.info.insert(key, InfoValue::String(result));
    }
}

fn scalar_to_dynamic(v: &ScalarValue) -> Dynamic {
    match v {
        ScalarValue::Float(f) => Dynamic::from(*f),
        ScalarValue::Int(i) => Dynamic::from(*i),
        ScalarValue::Str(s) => Dynamic::from(s.clone()),
        ScalarValue::Bool(b) => Dynamic::from(*b),
    }
}

fn scalar_list_to_info_value(values: &[ScalarValue]) -> InfoValue {
    if values.iter().all(|v| matches!(v, ScalarValue::Int(_))) {
        InfoValue::IntegerArray(values.iter().filter_map(|v| v.as_f64()).map(|f| f as i64).collect())
    } else if values.iter().all(|v| matches!(v, ScalarValue::Float(_) | ScalarValue::Int(_))) {
        InfoValue::FloatArray(values.iter().filter_map(|v| v.as_f64()).collect())
    } else {
        InfoValue::StringArray(values.iter().map(ScalarValue::display).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{IntervalData, RecordBody, VariantData};
    use crate::source::Selector;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn variant_record(chrom: &str, start: u32, end: u32, source_id: u32, alt: Vec<&str>, info: Vec<(&str, InfoValue)>) -> Record {
        let mut i = Info::new();
        for (k, v) in info {
            i.insert(k, v);
        }
        Record {
            chrom: Arc::from(chrom),
            start,
            end,
            source_id,
            body: RecordBody::Variant(VariantData {
                id: ".".to_string(),
                reference: "A".to_string(),
                alt: alt.into_iter().map(String::from).collect(),
                filter: "PASS".to_string(),
                info: i,
                ci_pos: None,
                ci_end: None,
            }),
        }
    }

    fn interval_record(chrom: &str, start: u32, end: u32, source_id: u32, fields: Vec<&str>) -> Record {
        Record {
            chrom: Arc::from(chrom),
            start,
            end,
            source_id,
            body: RecordBody::Interval(IntervalData {
                fields: fields.into_iter().map(|s| s.as_bytes().to_vec()).collect(),
            }),
        }
    }

    fn source(file: &str, op: &str, name: &str, selector: Selector, index: u32) -> Source {
        Source { file: PathBuf::from(file), op: op.to_string(), name: name.to_string(), selector, index, number_a: false, script: None }
    }

    // Spec §8 scenario 1. `DP=35` is the query's own pre-existing INFO value
    // (not an annotation source); the two configured sources are
    // `first(AC_AFR)` over the DP=44/DP=88 annotation variants and
    // `mean(col 4)` over the BED record.
    #[test]
    fn end_to_end_scenario_first_and_bed_column_mean() {
        let related = vec![
            variant_record("chr1", 233, 234, 1, vec!["T"], vec![("AC_AFR", InfoValue::Integer(33))]),
            variant_record("chr1", 233, 234, 1, vec!["T"], vec![("AC_AFR", InfoValue::Integer(77))]),
            interval_record("chr1", 224, 244, 2, vec!["111", "222"]),
        ];
        let mut info = Info::new();
        info.insert("DP", InfoValue::Integer(35));
        let alts = vec!["T".to_string(), "G".to_string()];
        let mut view =
            QueryView { chrom: "chr1", start: 233, end: 234, reference: "A", alts: &alts, info: &mut info };

        let sources = vec![
            source("afr.vcf", "first", "AC_AFR", Selector::Field("AC_AFR".to_string()), 1),
            source("fitcons.bed", "mean", "fitcons_mean", Selector::Column(4), 2),
        ];

        annotate(&mut view, &related, &sources, false, "").unwrap();

        assert_eq!(info.get("DP"), Some(&InfoValue::Integer(35)));
        assert_eq!(info.get("AC_AFR"), Some(&InfoValue::Integer(33)));
        assert_eq!(info.get("fitcons_mean"), Some(&InfoValue::Float(111.0)));
    }

    #[test]
    fn bam_counter_source_counts_qualifying_reads() {
        let related = vec![
            Record {
                chrom: Arc::from("chr1"),
                start: 230,
                end: 260,
                source_id: 1,
                body: RecordBody::Alignment(crate::record::AlignmentData { mapq: 30, flags: 0, seq: vec![] }),
            },
            Record {
                chrom: Arc::from("chr1"),
                start: 230,
                end: 260,
                source_id: 1,
                body: RecordBody::Alignment(crate::record::AlignmentData { mapq: 30, flags: 0, seq: vec![] }),
            },
            Record {
                chrom: Arc::from("chr1"),
                start: 230,
                end: 260,
                source_id: 1,
                body: RecordBody::Alignment(crate::record::AlignmentData {
                    mapq: 30,
                    flags: crate::record::sam_flags::UNMAPPED,
                    seq: vec![],
                }),
            },
        ];
        let mut info = Info::new();
        let alts = vec!["T".to_string()];
        let mut view =
            QueryView { chrom: "chr1", start: 233, end: 234, reference: "A", alts: &alts, info: &mut info };
        let sources = vec![source("reads.bam", "count", "coverage", Selector::BamField(Some("mapq".to_string())), 1)];

        annotate(&mut view, &related, &sources, false, "").unwrap();
        assert_eq!(info.get("coverage"), Some(&InfoValue::Integer(2)));
    }

    #[test]
    fn strict_mode_rejects_mismatched_allele() {
        let related = vec![variant_record("chr1", 233, 234, 1, vec!["G"], vec![("DP", InfoValue::Integer(10))])];
        let mut info = Info::new();
        let alts = vec!["T".to_string()];
        let mut view =
            QueryView { chrom: "chr1", start: 233, end: 234, reference: "A", alts: &alts, info: &mut info };
        let sources = vec![source("dp.vcf", "sum", "DP", Selector::Field("DP".to_string()), 1)];

        annotate(&mut view, &related, &sources, true, "").unwrap();
        assert!(info.get("DP").is_none());
    }

    #[test]
    fn numeric_bed_column_parse_failure_is_fatal() {
        let related = vec![interval_record("chr1", 224, 244, 1, vec!["not-a-number"])];
        let mut info = Info::new();
        let alts: Vec<String> = vec![];
        let mut view =
            QueryView { chrom: "chr1", start: 230, end: 231, reference: "A", alts: &alts, info: &mut info };
        let sources = vec![source("fitcons.bed", "mean", "fitcons_mean", Selector::Column(4), 1)];

        let err = annotate(&mut view, &related, &sources, false, "").unwrap_err();
        assert!(matches!(err, VannoError::Parse { .. }));
    }
}
