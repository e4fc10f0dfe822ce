use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::Config as XLMRobertaConfig;
use tokenizers::Tokenizer;
use tracing::info;

/// Files of a local Hugging Face style model directory.
pub struct ModelFiles {
    pub dir: PathBuf,
    pub tokenizer: Tokenizer,
    pub config: XLMRobertaConfig,
}

impl ModelFiles {
    pub fn open(dir: &Path) -> Result<Self> {
        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
            .map_err(|e| anyhow!("Failed to parse {}: {}", config_path.display(), e))?;
        Ok(Self { dir: dir.to_path_buf(), tokenizer, config })
    }

    /// `model.safetensors` when present, `pytorch_model.bin` otherwise.
    pub fn var_builder(&self, device: &Device) -> Result<VarBuilder<'static>> {
        let safetensors = self.dir.join("model.safetensors");
        let tensors: HashMap<String, Tensor> = if safetensors.exists() {
            info!(path = %safetensors.display(), "loading weights");
            candle_core::safetensors::load(&safetensors, device)?
        } else {
            let pickle = self.dir.join("pytorch_model.bin");
            info!(path = %pickle.display(), "loading weights");
            candle_core::pickle::read_all(&pickle)?.into_iter().collect()
        };
        Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
    }
}

/// First existing directory among the env var candidates and fallbacks.
pub fn first_existing_dir(env_vars: &[&str], fallbacks: &[&str]) -> Option<PathBuf> {
    for var in env_vars {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { info!(var = *var, dir = %p.display(), "model dir"); return Some(p); }
        }
    }
    fallbacks.iter().map(Path::new).find(|p| p.exists()).map(|p| {
        info!(dir = %p.display(), "model dir");
        p.to_path_buf()
    })
}
