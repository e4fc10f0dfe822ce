//! Engine configuration, read from the `retrieval` table.
//!
//! ```toml
//! [retrieval]
//! cache_dir = "~/.cache/ragdb"
//!
//! [retrieval.dense]
//! batch_size = 64
//! ```
//!
//! Every field has a default; `APP_RETRIEVAL__DENSE__ENABLED=false` style
//! environment overrides apply through `ragdb_core::config::Config`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use ragdb_core::config::{expand_path, Config};
use ragdb_core::{ChunkingConfig, Error, Result};
use ragdb_vector::{BackfillOptions, DenseOptions};

pub const CONFIG_KEY: &str = "retrieval";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_dir: PathBuf,
    /// Write the cache after every successful ingestion.
    pub persist_on_ingest: bool,
    pub chunking: ChunkingConfig,
    pub sparse: SparseConfig,
    pub dense: DenseConfig,
    pub fusion: FusionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("rag_cache"),
            persist_on_ingest: true,
            chunking: ChunkingConfig::default(),
            sparse: SparseConfig::default(),
            dense: DenseConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseConfig {
    pub enabled: bool,
}

impl Default for SparseConfig {
    fn default() -> Self { Self { enabled: true } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseConfig {
    pub enabled: bool,
    pub batch_size: usize,
    /// Passage count at which the accelerated backend switches to IVF_PQ.
    pub flat_threshold: usize,
    pub use_accel: bool,
    pub show_progress: bool,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self { enabled: true, batch_size: 32, flat_threshold: 10_000, use_accel: true, show_progress: false }
    }
}

impl DenseConfig {
    pub fn index_options(&self) -> DenseOptions {
        DenseOptions { enabled: self.enabled, use_accel: self.use_accel, flat_threshold: self.flat_threshold }
    }

    pub fn backfill_options(&self) -> BackfillOptions {
        BackfillOptions { batch_size: self.batch_size, show_progress: self.show_progress }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Dense weight used by `search` when the request leaves alpha unset.
    pub default_alpha: f32,
    /// Dense weight used by `retrieve` when the request leaves alpha unset.
    pub retrieve_alpha: f32,
    /// Candidates fetched from each index, as a multiple of `k`.
    pub overfetch_factor: usize,
    /// Fused candidates kept for reranking, as a multiple of `k`.
    pub rerank_pool_factor: usize,
    pub retrieval_weight: f32,
    pub rerank_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            default_alpha: 0.5,
            retrieve_alpha: 0.7,
            overfetch_factor: 2,
            rerank_pool_factor: 4,
            retrieval_weight: 0.3,
            rerank_weight: 0.7,
        }
    }
}

impl EngineConfig {
    /// Read the `retrieval` table, falling back to defaults when absent.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut cfg: Self = config.get_or_default(CONFIG_KEY)?;
        cfg.cache_dir = expand_path(cfg.cache_dir.to_string_lossy());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load() -> Result<Self> { Self::from_config(&Config::load()?) }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("cache_dir must not be empty".into()));
        }
        if self.dense.batch_size == 0 {
            return Err(Error::InvalidConfig("dense.batch_size must be at least 1".into()));
        }
        let f = &self.fusion;
        for (name, alpha) in [("default_alpha", f.default_alpha), ("retrieve_alpha", f.retrieve_alpha)] {
            if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
                return Err(Error::InvalidConfig(format!("fusion.{name} must be within [0, 1], got {alpha}")));
            }
        }
        if f.overfetch_factor == 0 || f.rerank_pool_factor == 0 {
            return Err(Error::InvalidConfig("fusion factors must be at least 1".into()));
        }
        for (name, w) in [("retrieval_weight", f.retrieval_weight), ("rerank_weight", f.rerank_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!("fusion.{name} must be a non-negative number, got {w}")));
            }
        }
        Ok(())
    }
}
