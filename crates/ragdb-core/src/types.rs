//! Domain types shared by the sparse, dense and hybrid engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub type PassageId = String;
pub type Meta = BTreeMap<String, serde_json::Value>;

/// Characters of passage text that feed the id derivation.
const ID_TEXT_PREFIX: usize = 50;

/// A single retrievable unit: one chunk of a source document.
///
/// - `id`: derived from `(source, page, chunk_index, text prefix)`, so the
///   same content ingested twice gets the same id
/// - `source`: logical origin (file path or name)
/// - `page`: page number for paginated sources
/// - `chunk_index`: position within the source for its ingestion batch
/// - `metadata`: open key/value map used by filters
/// - `embedding`: attached once by the dense index build; persisted separately
///   from the JSON header, hence skipped by serde
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: usize,
    #[serde(default)]
    pub metadata: Meta,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Passage {
    pub fn new(source: impl Into<String>, page: Option<u32>, chunk_index: usize, text: impl Into<String>) -> Self {
        let source = source.into();
        let text = text.into();
        let id = passage_id(&source, page, chunk_index, &text);
        Self { id, text, source, page, chunk_index, metadata: Meta::new(), embedding: None }
    }

    pub fn with_metadata(mut self, metadata: Meta) -> Self {
        self.metadata = metadata;
        self
    }

    /// Copy without the embedding, for handing passages to callers.
    pub fn detached(&self) -> Self {
        Self {
            id: self.id.clone(),
            text: self.text.clone(),
            source: self.source.clone(),
            page: self.page,
            chunk_index: self.chunk_index,
            metadata: self.metadata.clone(),
            embedding: None,
        }
    }

    /// `[stem, p. N]` for paginated sources, `[stem]` otherwise.
    pub fn citation(&self) -> String {
        let stem = source_stem(&self.source);
        match self.page {
            Some(page) => format!("[{stem}, p. {page}]"),
            None => format!("[{stem}]"),
        }
    }
}

pub fn passage_id(source: &str, page: Option<u32>, chunk_index: usize, text: &str) -> PassageId {
    let prefix: String = text.chars().take(ID_TEXT_PREFIX).collect();
    let page = page.map(|p| p.to_string()).unwrap_or_default();
    let key = format!("{source}_{page}_{chunk_index}_{prefix}");
    let hash = blake3::hash(key.as_bytes()).to_hex();
    hash.as_str()[..32].to_string()
}

/// blake3 over the passage ids in store order. Index snapshots carry it so a
/// cached index can be matched against the passages it was built from.
pub fn ids_fingerprint(passages: &[Passage]) -> String {
    let mut hasher = blake3::Hasher::new();
    for p in passages {
        hasher.update(p.id.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

pub fn source_stem(source: &str) -> String {
    Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| source.to_string())
}

/// File name of a source, used to key per-source statistics.
pub fn source_name(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

/// Already-extracted text handed over by a document reader: one entry per
/// plain-text file or per page of a paginated file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceText {
    pub source: String,
    pub text: String,
    pub page: Option<u32>,
    #[serde(default)]
    pub metadata: Meta,
}

impl SourceText {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source: source.into(), text: text.into(), ..Self::default() }
    }

    pub fn page(source: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self { source: source.into(), text: text.into(), page: Some(page), ..Self::default() }
    }
}

/// Indicates which index produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Dense,
    Sparse,
}

/// The minimal surface returned by both indices.
///
/// `id` matches `Passage::id`. `score` is index-specific (BM25 or cosine) but
/// higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: PassageId,
    pub score: f32,
    pub source: SourceKind,
}
