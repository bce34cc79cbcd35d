use std::path::Path;

use anyhow::Result;
use i2t_core::ModelKind;
use serde::{Deserialize, Serialize};

use crate::cli::Format;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub image: String,
    pub model: String,
    pub caption: String,
}

impl CaptionRecord {
    pub fn new(image: &Path, model: ModelKind, caption: String) -> Self {
        Self {
            image: image.display().to_string(),
            model: model.name().to_string(),
            caption,
        }
    }
}

pub fn render_single(record: &CaptionRecord, format: Format) -> Result<String> {
    Ok(match format {
        Format::Text => format!("\nGenerated caption: {}\n", record.caption),
        Format::Json => serde_json::to_string_pretty(record)?,
    })
}

pub fn render_batch(records: &[CaptionRecord], format: Format) -> Result<String> {
    Ok(match format {
        Format::Text => records
            .iter()
            .map(|r| format!("{}: {}", r.image, r.caption))
            .collect::<Vec<_>>()
            .join("\n"),
        Format::Json => serde_json::to_string_pretty(records)?,
    })
}

/// What batch mode writes to stdout; nothing for an empty text result.
pub fn batch_stdout(records: &[CaptionRecord], format: Format) -> Result<Option<String>> {
    if records.is_empty() && format == Format::Text {
        return Ok(None);
    }
    render_batch(records, format).map(Some)
}
