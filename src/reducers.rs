//! Reducers (spec §2 item 2, §4.3 step 3): the closed set of pure functions
//! mapping a list of observed annotation values to one output value.
//!
//! `by_alt` and the `number_a` flavor of `self` need the query's and the
//! overlapping record's allele lists to realign per-alt values; that logic
//! lives in `crate::annotate::alleles` since it isn't a pure list-reduction.
//! This module only covers the scalar reducers, dispatched from
//! `crate::annotate`.

use crate::record::InfoValue;

/// One value collected from a single overlapping annotation record, before
/// reduction. Distinct from `InfoValue` because collection can yield bare
/// numbers/strings/bools that were never wrapped in a VCF INFO cell (e.g. a
/// BED column, a BAM mapq).
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Float(f64),
    Int(i64),
    Str(String),
    Bool(bool),
}

impl ScalarValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Int(v) => Some(*v as f64),
            ScalarValue::Str(v) => v.parse().ok(),
            ScalarValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        }
    }

    pub fn display(&self) -> String {
        match self {
            ScalarValue::Float(v) => crate::record::format_float(*v),
            ScalarValue::Int(v) => v.to_string(),
            ScalarValue::Str(v) => v.clone(),
            ScalarValue::Bool(v) => v.to_string(),
        }
    }

    pub fn to_info_value(&self) -> InfoValue {
        match self {
            ScalarValue::Float(v) => InfoValue::Float(*v),
            ScalarValue::Int(v) => InfoValue::Integer(*v),
            ScalarValue::Str(v) => InfoValue::String(v.clone()),
            ScalarValue::Bool(v) => {
                if *v {
                    InfoValue::Flag
                } else {
                    InfoValue::String("false".to_string())
                }
            }
        }
    }

    pub fn from_info_value(v: &InfoValue) -> Vec<ScalarValue> {
        match v {
            InfoValue::Integer(i) => vec![ScalarValue::Int(*i)],
            InfoValue::Float(f) => vec![ScalarValue::Float(*f)],
            InfoValue::String(s) => vec![ScalarValue::Str(s.clone())],
            InfoValue::Flag => vec![ScalarValue::Bool(true)],
            InfoValue::IntegerArray(v) => v.iter().map(|i| ScalarValue::Int(*i)).collect(),
            InfoValue::FloatArray(v) => v.iter().map(|f| ScalarValue::Float(*f)).collect(),
            InfoValue::StringArray(v) => v.iter().map(|s| ScalarValue::Str(s.clone())).collect(),
        }
    }
}

/// The closed set of built-in reducer operators, plus the two ops
/// (`by_alt`, `self` when per-alt) that are *dispatched* here but whose
/// actual alignment work lives in `crate::annotate::alleles`, and `delete`,
/// which is only meaningful from the post-annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Mean,
    Sum,
    Max,
    Min,
    Median,
    Count,
    First,
    SelfOp,
    Uniq,
    Concat,
    Flag,
    ByAlt,
    Div2,
    Dp2,
    Delete,
}

impl ReduceOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "mean" => ReduceOp::Mean,
            "sum" => ReduceOp::Sum,
            "max" => ReduceOp::Max,
            "min" => ReduceOp::Min,
            "median" => ReduceOp::Median,
            "count" => ReduceOp::Count,
            "first" => ReduceOp::First,
            "self" => ReduceOp::SelfOp,
            "uniq" => ReduceOp::Uniq,
            "concat" => ReduceOp::Concat,
            "flag" => ReduceOp::Flag,
            "by_alt" => ReduceOp::ByAlt,
            "div2" => ReduceOp::Div2,
            "DP2" => ReduceOp::Dp2,
            "delete" => ReduceOp::Delete,
            _ => return None,
        })
    }

    /// Numeric reducers coerce every collected value to a float; used to
    /// decide whether BED/BAM column extraction should parse eagerly.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ReduceOp::Mean | ReduceOp::Sum | ReduceOp::Max | ReduceOp::Min | ReduceOp::Median | ReduceOp::Count
        )
    }
}

/// Apply a scalar (non-per-alt) reducer to a flat value list. Returns `None`
/// when the op needs per-alt context (`by_alt`, `self`) or is meaningless
/// here (`delete`) — callers dispatch those separately.
pub fn reduce_scalar(op: ReduceOp, values: &[ScalarValue]) -> Option<InfoValue> {
    match op {
        ReduceOp::Mean => {
            let xs = numeric(values);
            if xs.is_empty() {
                None
            } else {
                Some(InfoValue::Float(xs.iter().sum::<f64>() / xs.len() as f64))
            }
        }
        ReduceOp::Sum => {
            let xs = numeric(values);
            if xs.is_empty() {
                None
            } else {
                Some(InfoValue::Float(xs.iter().sum()))
            }
        }
        ReduceOp::Max => {
            let xs = numeric(values);
            xs.into_iter().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v)))).map(InfoValue::Float)
        }
        ReduceOp::Min => {
            let xs = numeric(values);
            xs.into_iter().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v)))).map(InfoValue::Float)
        }
        ReduceOp::Median => {
            let mut xs = numeric(values);
            if xs.is_empty() {
                return None;
            }
            xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = xs.len();
            let median = if n % 2 == 1 {
                xs[n / 2]
            } else {
                (xs[n / 2 - 1] + xs[n / 2]) / 2.0
            };
            Some(InfoValue::Float(median))
        }
        ReduceOp::Count => Some(InfoValue::Integer(values.len() as i64)),
        ReduceOp::First => values.first().map(ScalarValue::to_info_value),
        ReduceOp::Uniq => {
            let mut seen = std::collections::HashSet::new();
            let mut out = Vec::new();
            for v in values {
                let s = v.display();
                if seen.insert(s.clone()) {
                    out.push(s);
                }
            }
            Some(InfoValue::String(out.join(",")))
        }
        ReduceOp::Concat => Some(InfoValue::String(
            values.iter().map(ScalarValue::display).collect::<Vec<_>>().join(","),
        )),
        ReduceOp::Flag => Some(InfoValue::Flag),
        ReduceOp::Div2 => {
            if values.len() < 2 {
                return None;
            }
            let v0 = values[0].as_f64()?;
            let v1 = values[1].as_f64()?;
            let result = if v0 == 0.0 { 0.0 } else { v0 / v1 };
            Some(InfoValue::Float(result))
        }
        ReduceOp::Dp2 => {
            let (mut fwd, mut rev) = (0i64, 0i64);
            for v in values {
                match v {
                    ScalarValue::Bool(true) => rev += 1,
                    ScalarValue::Bool(false) => fwd += 1,
                    other => {
                        if other.as_f64().map(|f| f != 0.0).unwrap_or(false) {
                            rev += 1;
                        } else {
                            fwd += 1;
                        }
                    }
                }
            }
            Some(InfoValue::IntegerArray(vec![fwd, rev]))
        }
        ReduceOp::ByAlt | ReduceOp::SelfOp | ReduceOp::Delete => None,
    }
}

/// Coerce every value to float, dropping (and letting the caller log) ones
/// that can't be coerced — the §7 "Numeric coercion" policy for VCF INFO
/// fields feeding a numeric reducer.
fn numeric(values: &[ScalarValue]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| {
            let f = v.as_f64();
            if f.is_none() {
                log::warn!("numeric reducer skipped non-numeric value {:?}", v);
            }
            f
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(vals: &[f64]) -> Vec<ScalarValue> {
        vals.iter().map(|v| ScalarValue::Float(*v)).collect()
    }

    #[test]
    fn mean_divides_by_count() {
        let v = floats(&[44.0, 88.0]);
        assert_eq!(reduce_scalar(ReduceOp::Mean, &v), Some(InfoValue::Float(66.0)));
    }

    #[test]
    fn median_averages_two_middles() {
        let v = floats(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reduce_scalar(ReduceOp::Median, &v), Some(InfoValue::Float(2.5)));
    }

    #[test]
    fn median_odd_count_picks_middle() {
        let v = floats(&[5.0, 1.0, 3.0]);
        assert_eq!(reduce_scalar(ReduceOp::Median, &v), Some(InfoValue::Float(3.0)));
    }

    #[test]
    fn uniq_preserves_first_seen_order() {
        let v = vec![
            ScalarValue::Str("b".into()),
            ScalarValue::Str("a".into()),
            ScalarValue::Str("b".into()),
        ];
        assert_eq!(reduce_scalar(ReduceOp::Uniq, &v), Some(InfoValue::String("b,a".to_string())));
    }

    #[test]
    fn div2_handles_zero_numerator_without_dividing() {
        let v = vec![ScalarValue::Float(0.0), ScalarValue::Float(0.0)];
        assert_eq!(reduce_scalar(ReduceOp::Div2, &v), Some(InfoValue::Float(0.0)));
    }

    #[test]
    fn div2_skips_when_fewer_than_two_values() {
        let v = vec![ScalarValue::Float(1.0)];
        assert_eq!(reduce_scalar(ReduceOp::Div2, &v), None);
    }

    #[test]
    fn dp2_counts_forward_and_reverse() {
        let v = vec![
            ScalarValue::Bool(false),
            ScalarValue::Bool(true),
            ScalarValue::Bool(false),
        ];
        assert_eq!(reduce_scalar(ReduceOp::Dp2, &v), Some(InfoValue::IntegerArray(vec![2, 1])));
    }

    #[test]
    fn flag_is_true_whenever_reached() {
        let v = vec![ScalarValue::Bool(true)];
        assert_eq!(reduce_scalar(ReduceOp::Flag, &v), Some(InfoValue::Flag));
    }
}
