use std::path::PathBuf;

use anyhow::{Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tracing::info;

use crate::model::{ModelKind, QUANTIZED_REPO};

/// How to reach the model registry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubOptions {
    /// Alternate endpoint, e.g. a mirror such as `https://hf-mirror.com`.
    pub endpoint: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub token: Option<String>,
    /// Overrides the weights revision of the selected model.
    pub revision: Option<String>,
    #[serde(skip)]
    pub progress: bool,
}

/// Local paths of everything a captioner needs.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub weights: PathBuf,
    pub tokenizer: PathBuf,
    pub preprocessor: PathBuf,
    pub quantized: bool,
}

fn api(opts: &HubOptions) -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(opts.progress);
    if let Some(endpoint) = &opts.endpoint {
        builder = builder.with_endpoint(endpoint.clone());
    }
    if let Some(dir) = &opts.cache_dir {
        builder = builder.with_cache_dir(dir.clone());
    }
    if opts.token.is_some() {
        builder = builder.with_token(opts.token.clone());
    }
    builder.build().context("failed to build hub client")
}

/// Resolve (downloading if needed) the weights, tokenizer and preprocessor config.
pub fn fetch(kind: ModelKind, quantized: bool, opts: &HubOptions) -> Result<ModelFiles> {
    let api = api(opts)?;
    let repo = api.model(kind.repo_id().to_string());

    let weights = if quantized {
        let file = kind
            .quantized_file()
            .ok_or_else(|| anyhow::anyhow!("no quantized weights published for {}", kind))?;
        api.model(QUANTIZED_REPO.to_string())
            .get(file)
            .with_context(|| format!("failed to fetch {} from {}", file, QUANTIZED_REPO))?
    } else {
        let revision = opts
            .revision
            .clone()
            .unwrap_or_else(|| kind.weights_revision().to_string());
        api.repo(Repo::with_revision(
            kind.repo_id().to_string(),
            RepoType::Model,
            revision.clone(),
        ))
        .get("model.safetensors")
        .with_context(|| {
            format!(
                "failed to fetch model.safetensors from {}@{}",
                kind.repo_id(),
                revision
            )
        })?
    };

    let tokenizer = repo
        .get("tokenizer.json")
        .with_context(|| format!("failed to fetch tokenizer.json from {}", kind.repo_id()))?;
    let preprocessor = repo.get("preprocessor_config.json").with_context(|| {
        format!(
            "failed to fetch preprocessor_config.json from {}",
            kind.repo_id()
        )
    })?;

    Ok(ModelFiles {
        weights,
        tokenizer,
        preprocessor,
        quantized,
    })
}

/// Download a model ahead of first use.
pub fn precache(kind: ModelKind, quantized: bool, opts: &HubOptions) -> Result<ModelFiles> {
    info!("Caching {} model and processor...", kind.label());
    let files = fetch(kind, quantized, opts)?;
    info!("Caching complete: {}", files.weights.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantized_base_is_rejected_before_download() {
        let cache = tempfile::tempdir().unwrap();
        let opts = HubOptions {
            cache_dir: Some(cache.path().to_path_buf()),
            ..Default::default()
        };
        let err = fetch(ModelKind::Blip, true, &opts).unwrap_err();
        assert!(err.to_string().contains("no quantized weights"));
    }

    #[test]
    fn hub_options_from_json() {
        let opts: HubOptions = serde_json::from_str(
            r#"{"endpoint":"https://hf-mirror.com","revision":"refs/pr/1"}"#,
        )
        .unwrap();
        assert_eq!(opts.endpoint.as_deref(), Some("https://hf-mirror.com"));
        assert_eq!(opts.revision.as_deref(), Some("refs/pr/1"));
        assert!(opts.cache_dir.is_none());
        assert!(!opts.progress);
    }
}
