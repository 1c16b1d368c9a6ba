//! Parsers and writers: thin ecosystem-crate glue satisfying the
//! `RecordSource` trait contract in `crate::merge` — a from-scratch BED
//! reader (`bed`), a lightweight sequential VCF text codec (`variant`, since
//! tabix/BCF random access is unneeded for a forward streaming join), and a
//! `noodles`-backed BAM adapter (`alignment`).

pub mod alignment;
pub mod bed;
pub mod variant;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Open a path for sequential reading, transparently decompressing `.gz`.
/// bgzip-compressed VCF/BED files are themselves members of the gzip family
/// and decode fine through a standard gzip reader for sequential (non
/// block-indexed) access.
pub fn open_possibly_gzipped(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    let is_gz = path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("gz")).unwrap_or(false);
    if is_gz {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}
