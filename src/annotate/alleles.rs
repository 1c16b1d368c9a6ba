//! Per-alt alignment (spec §4.3 "Per-alt alignment", §8 `handleA`).
//!
//! Multi-allelic variants need their per-alt annotation values re-aligned
//! when the annotating file enumerates alts in a different order (or a
//! different subset). `handle_a` is the alignment law §8 calls out by name;
//! `by_alt_reduce`/`self_alt_reduce` fold it over the (possibly many)
//! overlapping annotation records a query variant collected.

use crate::reducers::ScalarValue;

/// Align `w` (one value per entry of `o_alts`) onto `q_alts`: for each query
/// alt, find its position in `o_alts` and take the corresponding value, or
/// `None` ("．" on output) when the alt isn't present in `w` or isn't found at
/// all.
///
/// Permutation-invariant: permuting `o_alts` together with `w` never changes
/// the result (spec §8 "Alignment law").
pub fn handle_a(q_alts: &[String], o_alts: &[String], w: &[ScalarValue]) -> Vec<Option<ScalarValue>> {
    q_alts
        .iter()
        .map(|qa| o_alts.iter().position(|oa| oa == qa).and_then(|j| w.get(j).cloned()))
        .collect()
}

/// One overlapping annotation variant's contribution: its own alt list and
/// the (already-collected) values aligned to that alt list.
pub type AltContribution = (Vec<String>, Vec<ScalarValue>);

/// `by_alt` reducer: accumulate every overlapping record's aligned value per
/// query alt into a `|`-joined string list; an alt with no contributions
/// renders as `.` (spec §4.3 step 3 `by_alt`).
pub fn by_alt_reduce(q_alts: &[String], entries: &[AltContribution]) -> Vec<String> {
    let mut per_alt: Vec<Vec<String>> = vec![Vec::new(); q_alts.len()];
    for (o_alts, w) in entries {
        for (i, v) in handle_a(q_alts, o_alts, w).into_iter().enumerate() {
            if let Some(v) = v {
                per_alt[i].push(v.display());
            }
        }
    }
    per_alt
        .into_iter()
        .map(|list| if list.is_empty() { ".".to_string() } else { list.join("|") })
        .collect()
}

/// `self` reducer when the source's upstream field is `Number=A`: take the
/// first non-missing aligned value per alt across overlapping records
/// (later records never overwrite an already-filled alt — spec §4.3 "second
/// pass ... overwrites only positions that are currently missing").
pub fn self_alt_reduce(q_alts: &[String], entries: &[AltContribution]) -> Vec<Option<ScalarValue>> {
    let mut out: Vec<Option<ScalarValue>> = vec![None; q_alts.len()];
    for (o_alts, w) in entries {
        for (i, v) in handle_a(q_alts, o_alts, w).into_iter().enumerate() {
            if out[i].is_none() {
                out[i] = v;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_a_literal_vectors_from_spec() {
        let q = vec!["C".to_string(), "G".to_string()];
        let o = vec!["C".to_string(), "T".to_string()];
        let w = vec![ScalarValue::Int(22), ScalarValue::Int(23)];
        let got: Vec<Option<i64>> = handle_a(&q, &o, &w)
            .into_iter()
            .map(|v| v.and_then(|s| if let ScalarValue::Int(i) = s { Some(i) } else { None }))
            .collect();
        assert_eq!(got, vec![Some(22), None]);
    }

    #[test]
    fn handle_a_second_literal_vector() {
        let q = vec!["G".to_string(), "C".to_string()];
        let o = vec!["C".to_string(), "G".to_string()];
        let w = vec![ScalarValue::Int(22), ScalarValue::Int(23)];
        let got: Vec<Option<i64>> = handle_a(&q, &o, &w)
            .into_iter()
            .map(|v| v.and_then(|s| if let ScalarValue::Int(i) = s { Some(i) } else { None }))
            .collect();
        assert_eq!(got, vec![Some(23), Some(22)]);
    }

    #[test]
    fn handle_a_is_invariant_under_permutation_of_annotation_alts() {
        let q = vec!["A".to_string(), "T".to_string(), "G".to_string()];
        let o1 = vec!["A".to_string(), "T".to_string(), "G".to_string()];
        let w1 = vec![ScalarValue::Int(1), ScalarValue::Int(2), ScalarValue::Int(3)];
        let o2 = vec!["G".to_string(), "A".to_string(), "T".to_string()];
        let w2 = vec![ScalarValue::Int(3), ScalarValue::Int(1), ScalarValue::Int(2)];

        let extract = |v: Vec<Option<ScalarValue>>| -> Vec<Option<i64>> {
            v.into_iter()
                .map(|x| x.and_then(|s| if let ScalarValue::Int(i) = s { Some(i) } else { None }))
                .collect()
        };
        assert_eq!(extract(handle_a(&q, &o1, &w1)), extract(handle_a(&q, &o2, &w2)));
    }

    #[test]
    fn by_alt_joins_multiple_records_with_pipe_and_dot_for_missing() {
        let q = vec!["A".to_string(), "T".to_string()];
        let entries: Vec<AltContribution> = vec![
            (vec!["A".to_string()], vec![ScalarValue::Int(1)]),
            (vec!["A".to_string(), "T".to_string()], vec![ScalarValue::Int(2), ScalarValue::Int(3)]),
        ];
        assert_eq!(by_alt_reduce(&q, &entries), vec!["1|2".to_string(), "3".to_string()]);
    }

    #[test]
    fn by_alt_alt_with_no_contributions_is_dot() {
        let q = vec!["A".to_string(), "T".to_string()];
        let entries: Vec<AltContribution> = vec![(vec!["A".to_string()], vec![ScalarValue::Int(1)])];
        assert_eq!(by_alt_reduce(&q, &entries), vec!["1".to_string(), ".".to_string()]);
    }

    #[test]
    fn self_alt_reduce_keeps_first_fill_per_alt() {
        let q = vec!["A".to_string(), "T".to_string()];
        let entries: Vec<AltContribution> = vec![
            (vec!["T".to_string()], vec![ScalarValue::Int(9)]),
            (vec!["A".to_string(), "T".to_string()], vec![ScalarValue::Int(1), ScalarValue::Int(2)]),
        ];
        let out = self_alt_reduce(&q, &entries);
        let as_ints: Vec<Option<i64>> = out
            .into_iter()
            .map(|v| v.and_then(|s| if let ScalarValue::Int(i) = s { Some(i) } else { None }))
            .collect();
        assert_eq!(as_ints, vec![Some(1), Some(9)]);
    }
}
