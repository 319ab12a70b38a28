//! Model file resolution
//!
//! A model reference is either a local directory or a HuggingFace Hub id.
//! Hub files are downloaded once into the hf-hub cache.

use hf_hub::{api::sync::Api, Repo, RepoType};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, Result};

/// Files of one model, local or cached
pub struct ModelFiles {
    source: Source,
}

enum Source {
    Local(PathBuf),
    Hub(hf_hub::api::sync::ApiRepo),
}

impl ModelFiles {
    /// Resolve a directory path or hub id
    pub fn resolve(model: &str) -> Result<Self> {
        let local = Path::new(model);
        if local.is_dir() {
            return Ok(Self {
                source: Source::Local(local.to_path_buf()),
            });
        }

        let api = Api::new()
            .map_err(|e| PipelineError::Model(format!("Failed to create HuggingFace API client: {}", e)))?;
        let repo = api.repo(Repo::new(model.to_string(), RepoType::Model));
        Ok(Self {
            source: Source::Hub(repo),
        })
    }

    /// Path to one file, downloading when needed
    pub fn get(&self, file: &str) -> Result<PathBuf> {
        match &self.source {
            Source::Local(dir) => {
                let path = dir.join(file);
                if path.exists() {
                    Ok(path)
                } else {
                    Err(PipelineError::Model(format!("{} not found", path.display())))
                }
            }
            Source::Hub(repo) => repo
                .get(file)
                .map_err(|e| PipelineError::Model(format!("Failed to download {}: {}", file, e))),
        }
    }

    /// Safetensors weights, single file or sharded via the index
    pub fn weights(&self) -> Result<Vec<PathBuf>> {
        if let Ok(single) = self.get("model.safetensors") {
            return Ok(vec![single]);
        }

        let index_path = self.get("model.safetensors.index.json")?;
        let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(index_path)?)?;
        let shards: BTreeSet<&str> = index
            .get("weight_map")
            .and_then(|m| m.as_object())
            .ok_or_else(|| PipelineError::Model("weight index has no weight_map".to_string()))?
            .values()
            .filter_map(|v| v.as_str())
            .collect();

        shards.into_iter().map(|shard| self.get(shard)).collect()
    }

    /// Read and deserialize a JSON file such as `config.json`
    pub fn json<T: serde::de::DeserializeOwned>(&self, file: &str) -> Result<T> {
        let contents = std::fs::read_to_string(self.get(file)?)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
