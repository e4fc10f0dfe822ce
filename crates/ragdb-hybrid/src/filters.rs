//! Post-retrieval filters.

use serde::{Deserialize, Serialize};

use ragdb_core::types::{Meta, Passage};
use ragdb_core::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Exact match on `Passage::source`.
    pub source: Option<String>,
    /// Minimum final score, inclusive.
    pub min_score: Option<f32>,
    /// Metadata equality; a passage without the key passes that clause.
    #[serde(default)]
    pub metadata: Meta,
}

impl SearchFilters {
    pub fn source(source: impl Into<String>) -> Self {
        Self { source: Some(source.into()), ..Self::default() }
    }

    pub fn min_score(min_score: f32) -> Self {
        Self { min_score: Some(min_score), ..Self::default() }
    }

    /// Interpret a loose mapping: `source` and `min_score` are recognized,
    /// everything else is metadata equality.
    pub fn from_map(map: &Meta) -> Result<Self> {
        let mut filters = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "source" => {
                    let s = value
                        .as_str()
                        .ok_or_else(|| Error::InvalidArgument(format!("filter 'source' must be a string, got {value}")))?;
                    filters.source = Some(s.to_string());
                }
                "min_score" => {
                    let v = value
                        .as_f64()
                        .ok_or_else(|| Error::InvalidArgument(format!("filter 'min_score' must be a number, got {value}")))?;
                    filters.min_score = Some(v as f32);
                }
                _ => {
                    filters.metadata.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(filters)
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.min_score.is_none() && self.metadata.is_empty()
    }

    pub fn matches(&self, passage: &Passage, score: f32) -> bool {
        if let Some(source) = &self.source {
            if passage.source != *source { return false; }
        }
        if let Some(min) = self.min_score {
            if score < min { return false; }
        }
        self.metadata
            .iter()
            .all(|(k, v)| passage.metadata.get(k).map_or(true, |actual| actual == v))
    }
}
