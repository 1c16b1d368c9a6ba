//! Configuration loader (spec §6 "Configuration file (TOML)").
//!
//! Parses `[[annotation]]`/`[[postannotation]]` tables, validates array
//! arity, resolves relative annotation paths against `-base-path`, peeks
//! each VCF annotation file's header for `Number=A` declarations, and
//! compiles every `lua:`-prefixed op into its script state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, VannoError};
use crate::io::variant::peek_info_header;
use crate::script::{script_expr, ScriptPool, ScriptState, DEFAULT_POOL_SIZE};
use crate::source::{OutputType, PostAnnotationRule, Selector, Source};

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default, rename = "annotation")]
    annotations: Vec<RawAnnotation>,
    #[serde(default, rename = "postannotation")]
    postannotations: Vec<RawPostAnnotation>,
}

#[derive(Debug, Deserialize)]
struct RawAnnotation {
    file: String,
    #[serde(default)]
    ops: Vec<String>,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    columns: Vec<i64>,
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPostAnnotation {
    fields: Vec<String>,
    op: String,
    name: String,
    #[serde(rename = "type")]
    out_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Vcf,
    Bed,
    Bam,
}

fn file_kind(path: &Path) -> Result<FileKind> {
    let name = path.to_string_lossy().to_lowercase();
    let stripped = name.strip_suffix(".gz").unwrap_or(&name);
    if stripped.ends_with(".vcf") {
        Ok(FileKind::Vcf)
    } else if stripped.ends_with(".bed") {
        Ok(FileKind::Bed)
    } else if stripped.ends_with(".bam") {
        Ok(FileKind::Bam)
    } else {
        Err(VannoError::Config(format!("cannot infer file kind of annotation file `{}`", path.display())))
    }
}

/// Fully resolved configuration: the `Source` list (indices assigned in
/// declaration order, 1-based — `source_id` 0 is reserved for the query) and
/// the post-annotation rule list, both ready to drive the merge engine and
/// annotator directly.
pub struct Config {
    pub sources: Vec<Source>,
    pub post_rules: Vec<PostAnnotationRule>,
    /// Annotation file paths in `Source.index` order, for opening merge
    /// engine streams.
    pub annotation_files: Vec<PathBuf>,
    /// Upstream `Type=` for each `sources[i]` that reads a `Number=A` VCF
    /// INFO field, parallel to `sources` — feeds `header::UpstreamType` for
    /// the `self`/`first` "inherit upstream type" rule (spec §4.7).
    pub upstream_types: Vec<Option<OutputType>>,
}

/// Load and validate `config.toml`, resolving relative annotation paths
/// against `base_path` (the `-base-path` flag; pass `None` to resolve
/// against the config file's own directory, spec §6). `lua_preload` is the
/// `-lua path` file's contents, prepended to every compiled `lua:` script;
/// using a `lua:` op anywhere without `-lua` given is a configuration error
/// (spec §7: "script without `-lua`").
pub fn load(config_path: impl AsRef<Path>, base_path: Option<&Path>, lua_preload: Option<&str>) -> Result<Config> {
    let config_path = config_path.as_ref();
    let text = std::fs::read_to_string(config_path)?;
    let raw: RawConfig = toml::from_str(&text)?;

    let resolve_dir = base_path
        .map(Path::to_path_buf)
        .or_else(|| config_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let preamble = lua_preload.unwrap_or("");

    let mut sources = Vec::new();
    let mut upstream_types = Vec::new();
    let mut annotation_files = Vec::new();
    let mut index: u32 = 1;

    for ann in &raw.annotations {
        let resolved = resolve_path(&resolve_dir, &ann.file);
        let kind = file_kind(&resolved)?;
        let (ops, selectors, names) = expand_annotation(ann, kind)?;

        let header_fields: HashMap<String, OutputType> = if kind == FileKind::Vcf {
            peek_info_header(&resolved)?
                .into_iter()
                .filter(|e| e.number_a)
                .map(|e| (e.id, e.out_type))
                .collect()
        } else {
            HashMap::new()
        };

        annotation_files.push(resolved.clone());
        for ((op, selector), name) in ops.into_iter().zip(selectors).zip(names) {
            let upstream = match &selector {
                Selector::Field(f) => header_fields.get(f).copied(),
                _ => None,
            };
            let field_is_number_a = upstream.is_some();
            if script_expr(&op).is_some() && lua_preload.is_none() {
                return Err(VannoError::Config(format!(
                    "annotation `{}` uses a `lua:` op but no `-lua` preload file was given",
                    ann.file
                )));
            }
            let script = script_expr(&op)
                .map(|expr| ScriptState::compile_with_preamble(expr, preamble))
                .transpose()?;
            sources.push(Source {
                file: resolved.clone(),
                op,
                name,
                selector,
                index,
                number_a: field_is_number_a,
                script,
            });
            upstream_types.push(upstream);
        }
        index += 1;
    }

    let mut post_rules = Vec::with_capacity(raw.postannotations.len());
    for p in &raw.postannotations {
        let out_type = parse_output_type(&p.out_type)?;
        if script_expr(&p.op).is_some() && lua_preload.is_none() {
            return Err(VannoError::Config(format!(
                "post-annotation `{}` uses a `lua:` op but no `-lua` preload file was given",
                p.name
            )));
        }
        let script = script_expr(&p.op)
            .map(|expr| ScriptPool::new_with_preamble(expr, DEFAULT_POOL_SIZE, preamble))
            .transpose()?;
        post_rules.push(PostAnnotationRule {
            fields: p.fields.clone(),
            op: p.op.clone(),
            name: p.name.clone(),
            out_type,
            script,
        });
    }

    Ok(Config { sources, post_rules, annotation_files, upstream_types })
}

fn resolve_path(base: &Path, file: &str) -> PathBuf {
    let candidate = PathBuf::from(file);
    if candidate.is_absolute() {
        candidate
    } else {
        base.join(candidate)
    }
}

/// Expand one `[[annotation]]` table into parallel `(op, selector, name)`
/// triples, applying the BAM shortcut defaults and validating arity (spec
/// §6: "Array lengths must match, except BAM shortcut").
fn expand_annotation(ann: &RawAnnotation, kind: FileKind) -> Result<(Vec<String>, Vec<Selector>, Vec<String>)> {
    let is_bam = kind == FileKind::Bam;

    let ops = if ann.ops.is_empty() && is_bam {
        vec!["count".to_string()]
    } else {
        ann.ops.clone()
    };

    let selectors: Vec<Selector> = match kind {
        FileKind::Vcf => {
            if ann.fields.is_empty() {
                return Err(VannoError::Config(format!("annotation `{}` needs `fields`", ann.file)));
            }
            ann.fields.iter().map(|f| Selector::Field(f.clone())).collect()
        }
        FileKind::Bed => {
            if ann.columns.is_empty() {
                return Err(VannoError::Config(format!("annotation `{}` needs `columns`", ann.file)));
            }
            ann.columns
                .iter()
                .map(|c| Selector::Column(*c as usize))
                .collect()
        }
        FileKind::Bam => {
            if ann.fields.is_empty() {
                vec![Selector::BamField(None); ops.len().max(1)]
            } else {
                ann.fields.iter().map(|f| Selector::BamField(Some(f.clone()))).collect()
            }
        }
    };

    let names = if !ann.names.is_empty() {
        ann.names.clone()
    } else if !ann.fields.is_empty() {
        ann.fields.clone()
    } else {
        return Err(VannoError::Config(format!("annotation `{}` needs `names`", ann.file)));
    };

    if ops.len() != selectors.len() || ops.len() != names.len() {
        return Err(VannoError::Config(format!(
            "annotation `{}` has mismatched array lengths: {} ops, {} fields/columns, {} names",
            ann.file,
            ops.len(),
            selectors.len(),
            names.len()
        )));
    }

    Ok((ops, selectors, names))
}

fn parse_output_type(s: &str) -> Result<OutputType> {
    match s {
        "Float" => Ok(OutputType::Float),
        "Integer" => Ok(OutputType::Integer),
        "String" => Ok(OutputType::String),
        "Flag" => Ok(OutputType::Flag),
        other => Err(VannoError::Config(format!("unknown post-annotation type `{other}`"))),
    }
}
