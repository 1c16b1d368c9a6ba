//! Header updater (spec §4.7): derives the `Number`/`Type` VCF header
//! declaration for every source and post-annotation rule output, including
//! the `left_`/`right_` duplicates when SV-end annotation is enabled.

use crate::source::{OutputType, PostAnnotationRule, Source};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Number {
    /// One value per alternate allele.
    PerAlt,
    Fixed(u32),
}

impl Number {
    pub fn header_str(&self) -> String {
        match self {
            Number::PerAlt => "A".to_string(),
            Number::Fixed(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InfoDeclaration {
    pub id: String,
    pub number: Number,
    pub out_type: OutputType,
    pub description: String,
}

impl InfoDeclaration {
    /// Render a `##INFO=<ID=...,Number=...,Type=...,Description="...">` line.
    pub fn render(&self) -> String {
        format!(
            "##INFO=<ID={},Number={},Type={},Description=\"{}\">",
            self.id,
            self.number.header_str(),
            self.out_type.header_str(),
            self.description
        )
    }
}

/// The upstream type a Source's annotation file declares for the field it
/// reads, when known; used to honor `self`/`first`'s "inherit the upstream
/// type" rule.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamType {
    pub out_type: OutputType,
}

pub fn source_declaration(source: &Source, upstream: Option<UpstreamType>) -> InfoDeclaration {
    let (emitted_name, out_type, number) = derive(source, upstream);
    InfoDeclaration {
        id: emitted_name,
        number,
        out_type,
        description: format!("Annotation from {} via {}", source.file.display(), source.op),
    }
}

/// The name a source's value is actually keyed under in `INFO`, with any
/// `_float`/`_int`/`_flag` type suffix consumed (spec §4.7) — shared between
/// the header declaration and `annotate::annotate`'s own key so the two
/// never disagree.
pub fn emitted_name(source: &Source) -> String {
    if source.op == "by_alt" {
        return source.name.clone();
    }
    if (source.op == "self" || source.op == "first") && source.number_a {
        return source.name.clone();
    }
    if let Some(base) = source.name.strip_suffix("_float") {
        return base.to_string();
    }
    if let Some(base) = source.name.strip_suffix("_int") {
        return base.to_string();
    }
    if let Some(base) = source.name.strip_suffix("_flag") {
        return base.to_string();
    }
    source.name.clone()
}

fn derive(source: &Source, upstream: Option<UpstreamType>) -> (String, OutputType, Number) {
    let name = emitted_name(source);

    if source.op == "by_alt" {
        return (name, OutputType::String, Number::PerAlt);
    }

    if (source.op == "self" || source.op == "first") && source.number_a {
        if let Some(u) = upstream {
            return (name, u.out_type, Number::PerAlt);
        }
    }

    if source.name.ends_with("_float") {
        return (name, OutputType::Float, Number::Fixed(1));
    }
    if source.name.ends_with("_int") {
        return (name, OutputType::Integer, Number::Fixed(1));
    }
    if source.name.ends_with("_flag") {
        return (name, OutputType::Flag, Number::Fixed(0));
    }

    match source.op.as_str() {
        "mean" | "max" | "min" | "median" | "sum" | "count" => (name, OutputType::Float, Number::Fixed(1)),
        "flag" => (name, OutputType::Flag, Number::Fixed(0)),
        "uniq" | "concat" => (name, OutputType::String, Number::Fixed(1)),
        "DP2" => (name, OutputType::Integer, Number::Fixed(2)),
        op if op.starts_with("lua:") => {
            if op.contains("_flag(") {
                (name, OutputType::Flag, Number::Fixed(0))
            } else {
                (name, OutputType::String, Number::Fixed(1))
            }
        }
        _ => (name, OutputType::String, Number::Fixed(1)),
    }
}

pub fn post_rule_declaration(rule: &PostAnnotationRule) -> Option<InfoDeclaration> {
    if rule.replaces_id() {
        return None;
    }
    Some(InfoDeclaration {
        id: rule.name.clone(),
        number: Number::Fixed(1),
        out_type: rule.out_type,
        description: format!("Post-annotation {} of {}", rule.op, rule.fields.join(",")),
    })
}

/// When SV-end annotation is enabled, every non-`by_alt` source declaration
/// gets `left_`/`right_` duplicates sharing the same Number/Type.
pub fn end_declarations(decl: &InfoDeclaration) -> [InfoDeclaration; 2] {
    [
        InfoDeclaration {
            id: format!("left_{}", decl.id),
            number: decl.number.clone(),
            out_type: decl.out_type,
            description: format!("{} (left breakpoint)", decl.description),
        },
        InfoDeclaration {
            id: format!("right_{}", decl.id),
            number: decl.number.clone(),
            out_type: decl.out_type,
            description: format!("{} (right breakpoint)", decl.description),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Selector;
    use std::path::PathBuf;

    fn source(op: &str, name: &str, number_a: bool) -> Source {
        Source {
            file: PathBuf::from("anno.vcf"),
            op: op.to_string(),
            name: name.to_string(),
            selector: Selector::Field("X".to_string()),
            index: 1,
            number_a,
            script: None,
        }
    }

    #[test]
    fn by_alt_is_per_alt_string() {
        let decl = source_declaration(&source("by_alt", "fitcons", false), None);
        assert_eq!(decl.number, Number::PerAlt);
        assert_eq!(decl.out_type, OutputType::String);
    }

    #[test]
    fn numeric_reducers_are_float() {
        let decl = source_declaration(&source("mean", "fitcons_mean", false), None);
        assert_eq!(decl.out_type, OutputType::Float);
        assert_eq!(decl.number, Number::Fixed(1));
    }

    #[test]
    fn name_suffix_flag_strips_suffix_and_sets_type() {
        let decl = source_declaration(&source("lua:x", "near_exon_flag", false), None);
        assert_eq!(decl.id, "near_exon");
        assert_eq!(decl.out_type, OutputType::Flag);
    }

    #[test]
    fn emitted_name_matches_declared_header_id() {
        let src = source("lua:x", "near_exon_flag", false);
        let decl = source_declaration(&src, None);
        assert_eq!(emitted_name(&src), decl.id);
    }

    #[test]
    fn dp2_is_integer_pair() {
        let decl = source_declaration(&source("DP2", "strand_counts", false), None);
        assert_eq!(decl.number, Number::Fixed(2));
        assert_eq!(decl.out_type, OutputType::Integer);
    }

    #[test]
    fn self_with_number_a_inherits_upstream_type() {
        let decl = source_declaration(
            &source("self", "fitcons", true),
            Some(UpstreamType { out_type: OutputType::Float }),
        );
        assert_eq!(decl.out_type, OutputType::Float);
        assert_eq!(decl.number, Number::PerAlt);
    }
}
