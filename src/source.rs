//! Source and post-annotation rule definitions (spec §3).

use std::path::PathBuf;

use crate::script::{script_expr, ScriptPool, ScriptState};

/// Exactly one of these identifies what a `Source` extracts from a Variant
/// or Interval annotation record (spec §3: "exactly one of `field` ... or
/// `column` ... must be set").
#[derive(Debug, Clone)]
pub enum Selector {
    /// VCF INFO key, or the literal `ID`/`FILTER`.
    Field(String),
    /// 1-based BED column.
    Column(usize),
    /// BAM record attribute: `mapq`, `seq`, `DP2`, or an empty counter field.
    BamField(Option<String>),
}

/// A named annotation rule binding one annotation file to one
/// (selector, reducer, output name).
#[derive(Debug)]
pub struct Source {
    pub file: PathBuf,
    /// Raw op string, e.g. `"mean"` or `"lua:vals[0]*2"`.
    pub op: String,
    pub name: String,
    pub selector: Selector,
    /// Annotation stream id (1-based, matches the merge engine's
    /// `source_id`).
    pub index: u32,
    /// Whether the upstream annotation file declares this field
    /// `Number=A` (derived from its header at load time).
    pub number_a: bool,
    pub script: Option<ScriptState>,
}

impl Source {
    pub fn is_script(&self) -> bool {
        script_expr(&self.op).is_some()
    }

    pub fn field_name(&self) -> Option<&str> {
        match &self.selector {
            Selector::Field(f) => Some(f.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Float,
    Integer,
    String,
    Flag,
}

impl OutputType {
    pub fn header_str(&self) -> &'static str {
        match self {
            OutputType::Float => "Float",
            OutputType::Integer => "Integer",
            OutputType::String => "String",
            OutputType::Flag => "Flag",
        }
    }
}

/// A post-annotation rule (spec §3, §4.6).
pub struct PostAnnotationRule {
    pub fields: Vec<String>,
    pub op: String,
    pub name: String,
    pub out_type: OutputType,
    pub script: Option<ScriptPool>,
}

impl PostAnnotationRule {
    pub fn is_script(&self) -> bool {
        script_expr(&self.op).is_some()
    }

    pub fn replaces_id(&self) -> bool {
        self.name == "ID"
    }
}

impl std::fmt::Debug for PostAnnotationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostAnnotationRule")
            .field("fields", &self.fields)
            .field("op", &self.op)
            .field("name", &self.name)
            .field("out_type", &self.out_type)
            .field("has_script", &self.script.is_some())
            .finish()
    }
}
