//! Model folder discovery under `prompt_generator`

use crate::error::{Result, VlmNodeError};
use std::path::{Path, PathBuf};

pub const MODEL_FOLDER: &str = "prompt_generator";
pub const NO_MODELS_PLACEHOLDER: &str = "No models found in models/prompt_generator";

/// Folders searched for model directories, primary first
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    search_paths: Vec<PathBuf>,
}

impl ModelCatalog {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Names of folders containing a `config.json`, sorted
    ///
    /// The placeholder entry is returned when nothing is installed so that
    /// the selector is never empty.
    pub fn installed_models(&self) -> Vec<String> {
        if let Some(primary) = self.search_paths.first() {
            if !primary.exists() {
                if let Err(e) = std::fs::create_dir_all(primary) {
                    tracing::debug!(path = %primary.display(), error = %e, "Cannot create model folder");
                }
            }
        }

        let mut names: Vec<String> = self
            .search_paths
            .iter()
            .filter_map(|path| std::fs::read_dir(path).ok())
            .flat_map(|entries| entries.flatten())
            .filter(|entry| is_model_dir(&entry.path()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();

        if names.is_empty() {
            return vec![NO_MODELS_PLACEHOLDER.to_string()];
        }
        names.sort();
        names
    }

    /// First existing `{path}/{model_name}` across the search paths
    pub fn resolve(&self, model_name: &str) -> Result<PathBuf> {
        self.search_paths
            .iter()
            .map(|path| path.join(model_name))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| VlmNodeError::ModelNotFound(model_name.to_string()))
    }
}

fn is_model_dir(path: &Path) -> bool {
    path.is_dir() && path.join("config.json").exists()
}
