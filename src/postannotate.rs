//! Post-annotator (spec §4.6).
//!
//! Runs after the primary annotator and the SV-end passes, in declaration
//! order, reading already-computed `info` fields and writing derived ones.
//! Each rule either applies a built-in reducer or leases an independent
//! script state from its fixed pool (spec §5) so concurrent workers never
//! share mutable script state.

use rhai::Dynamic;

use crate::error::{Result, VannoError};
use crate::record::{Info, InfoValue};
use crate::reducers::{reduce_scalar, ReduceOp, ScalarValue};
use crate::script::as_flag;
use crate::source::{OutputType, PostAnnotationRule};

/// Apply every configured post-annotation rule, in order, against `info` and
/// `id`. `id` is both a readable pseudo-field (`rule.fields` may name `"ID"`)
/// and a write target (`rule.name == "ID"` replaces it).
pub fn apply_post_annotations(info: &mut Info, id: &mut String, rules: &[PostAnnotationRule]) -> Result<()> {
    for rule in rules {
        apply_rule(info, id, rule)?;
    }
    Ok(())
}

fn apply_rule(info: &mut Info, id: &mut String, rule: &PostAnnotationRule) -> Result<()> {
    let present: Vec<(String, InfoValue)> = rule
        .fields
        .iter()
        .filter_map(|f| read_field(info, id, f).map(|v| (f.clone(), v)))
        .collect();

    if rule.is_script() {
        return apply_script_rule(info, id, rule, &present);
    }

    let Some(op) = ReduceOp::parse(&rule.op) else {
        return Err(VannoError::Config(format!("unknown post-annotation op `{}`", rule.op)));
    };

    if op == ReduceOp::Delete {
        for f in &rule.fields {
            info.remove(f);
        }
        return Ok(());
    }

    let values: Vec<ScalarValue> = present.iter().flat_map(|(_, v)| ScalarValue::from_info_value(v)).collect();
    if op == ReduceOp::Div2 && values.len() < 2 {
        return Ok(());
    }

    let Some(result) = reduce_scalar(op, &values) else { return Ok(()) };
    write_result(info, id, rule, result);
    Ok(())
}

fn read_field(info: &Info, id: &str, field: &str) -> Option<InfoValue> {
    if field == "ID" {
        if id.is_empty() || id == "." {
            None
        } else {
            Some(InfoValue::String(id.to_string()))
        }
    } else {
        info.get(field).cloned()
    }
}

fn write_result(info: &mut Info, id: &mut String, rule: &PostAnnotationRule, value: InfoValue) {
    if rule.replaces_id() {
        *id = value.display_value();
    } else {
        info.insert(rule.name.clone(), coerce_output_type(value, rule.out_type));
    }
}

fn coerce_output_type(value: InfoValue, out_type: OutputType) -> InfoValue {
    match out_type {
        OutputType::Float => InfoValue::Float(value.as_f64().unwrap_or(0.0)),
        OutputType::Integer => InfoValue::Integer(value.as_f64().unwrap_or(0.0) as i64),
        OutputType::String => InfoValue::String(value.display_value()),
        OutputType::Flag => {
            if as_flag(&value.display_value()) {
                InfoValue::Flag
            } else {
                InfoValue::String("false".to_string())
            }
        }
    }
}

fn apply_script_rule(
    info: &mut Info,
    id: &mut String,
    rule: &PostAnnotationRule,
    present: &[(String, InfoValue)],
) -> Result<()> {
    let Some(pool) = &rule.script else { return Ok(()) };
    let leased = pool.lease();

    let mut vars: Vec<(&str, Dynamic)> = vec![("id", Dynamic::from(id.clone()))];
    for (name, value) in present {
        vars.push((name.as_str(), info_value_to_dynamic(value)));
    }

    let Some(result) = leased.eval(&vars) else { return Ok(()) };

    if rule.replaces_id() {
        *id = result;
        return Ok(());
    }

    let value = match rule.out_type {
        OutputType::Flag => {
            if as_flag(&result) {
                InfoValue::Flag
            } else {
                return Ok(()); // absent, not written
            }
        }
        OutputType::Float => InfoValue::Float(result.parse().unwrap_or(0.0)),
        OutputType::Integer => InfoValue::Integer(result.parse().unwrap_or(0)),
        OutputType::String => InfoValue::String(result),
    };
    info.insert(rule.name.clone(), value);
    Ok(())
}

fn info_value_to_dynamic(v: &InfoValue) -> Dynamic {
    match v {
        InfoValue::Integer(i) => Dynamic::from(*i),
        InfoValue::Float(f) => Dynamic::from(*f),
        InfoValue::String(s) => Dynamic::from(s.clone()),
        InfoValue::Flag => Dynamic::from(true),
        other => Dynamic::from(other.display_value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Selector;
    use std::path::PathBuf;

    fn rule(fields: Vec<&str>, op: &str, name: &str, out_type: OutputType) -> PostAnnotationRule {
        PostAnnotationRule { fields: fields.into_iter().map(String::from).collect(), op: op.to_string(), name: name.to_string(), out_type, script: None }
    }

    #[test]
    fn div2_computes_allele_frequency() {
        let mut info = Info::new();
        info.insert("AC", InfoValue::Integer(10));
        info.insert("AN", InfoValue::Integer(100));
        let mut id = ".".to_string();
        let rules = vec![rule(vec!["AC", "AN"], "div2", "AF_calc", OutputType::Float)];
        apply_post_annotations(&mut info, &mut id, &rules).unwrap();
        assert_eq!(info.get("AF_calc"), Some(&InfoValue::Float(0.1)));
    }

    #[test]
    fn delete_removes_every_listed_field() {
        let mut info = Info::new();
        info.insert("AF", InfoValue::Float(0.1));
        info.insert("AC", InfoValue::Integer(10));
        let mut id = ".".to_string();
        let rules = vec![rule(vec!["AF"], "delete", "", OutputType::String)];
        apply_post_annotations(&mut info, &mut id, &rules).unwrap();
        assert!(info.get("AF").is_none());
        assert!(info.get("AC").is_some());
    }

    #[test]
    fn name_id_replaces_record_id() {
        let mut info = Info::new();
        info.insert("RSID", InfoValue::String("rs123".to_string()));
        let mut id = ".".to_string();
        let rules = vec![rule(vec!["RSID"], "first", "ID", OutputType::String)];
        apply_post_annotations(&mut info, &mut id, &rules).unwrap();
        assert_eq!(id, "rs123");
    }

    #[test]
    fn div2_skipped_when_fewer_than_two_source_fields_present() {
        let mut info = Info::new();
        info.insert("AC", InfoValue::Integer(10));
        let mut id = ".".to_string();
        let rules = vec![rule(vec!["AC", "AN"], "div2", "AF_calc", OutputType::Float)];
        apply_post_annotations(&mut info, &mut id, &rules).unwrap();
        assert!(info.get("AF_calc").is_none());
    }
}
