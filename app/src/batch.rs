use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use i2t_core::Captioner;
use tracing::{error, info};
use walkdir::{DirEntry, WalkDir};

use crate::output::CaptionRecord;

pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"];

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path. Dotfiles are skipped.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = vec![];
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        if entry.file_type().is_file() && !is_hidden(&entry) && is_supported(entry.path()) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

pub struct BatchOutcome {
    pub records: Vec<CaptionRecord>,
    pub failed: usize,
}

/// Caption each image in turn. A failing image is logged and left out.
pub fn caption_all(
    service: &mut dyn Captioner,
    paths: &[PathBuf],
    mut before_each: impl FnMut(&Path),
) -> BatchOutcome {
    let model = service.model();
    let mut records = Vec::with_capacity(paths.len());
    let mut failed = 0;
    for (i, path) in paths.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, paths.len(), path.display());
        before_each(path);
        match service.caption_image_path(path, None) {
            Ok(caption) => records.push(CaptionRecord::new(path, model, caption)),
            Err(e) => {
                error!("failed to caption {}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }
    BatchOutcome { records, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use i2t_core::{CaptionRequest, ModelKind};

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn discovers_supported_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "c.JPEG", "notes.txt", "d.webp", "noext"] {
            touch(dir.path(), name);
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();
        touch(&dir.path().join("nested.png"), "inner.jpg");

        let found: Vec<String> = discover_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["a.jpg", "b.png", "c.JPEG", "d.webp"]);
    }

    #[test]
    fn dotfiles_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["._a.jpg", ".hidden.png", "a.jpg"] {
            touch(dir.path(), name);
        }
        let found = discover_images(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("a.jpg")]);
    }

    #[test]
    fn discovered_paths_keep_directory_prefix() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x.gif");
        let found = discover_images(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("x.gif")]);
    }

    #[test]
    fn empty_and_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_images(dir.path()).unwrap().is_empty());
        assert!(discover_images(&dir.path().join("missing")).is_err());
    }

    struct FailOn(&'static str);

    impl Captioner for FailOn {
        fn model(&self) -> ModelKind {
            ModelKind::BlipLarge
        }

        fn generate_caption(&mut self, _request: &CaptionRequest) -> Result<String> {
            Ok("a small square".to_string())
        }

        fn caption_image_path(&mut self, path: &Path, _prompt: Option<&str>) -> Result<String> {
            if path.ends_with(self.0) {
                anyhow::bail!("broken image");
            }
            Ok(format!("caption of {}", path.display()))
        }
    }

    #[test]
    fn failures_are_skipped_and_counted() {
        let paths = vec![
            PathBuf::from("a.jpg"),
            PathBuf::from("b.jpg"),
            PathBuf::from("c.jpg"),
        ];
        let mut seen = vec![];
        let outcome = caption_all(&mut FailOn("b.jpg"), &paths, |p| seen.push(p.to_path_buf()));
        assert_eq!(seen, paths);
        assert_eq!(outcome.failed, 1);
        let images: Vec<&str> = outcome.records.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(images, vec!["a.jpg", "c.jpg"]);
        assert!(outcome.records.iter().all(|r| r.model == "blip-large"));
    }
}
