use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::background::BackgroundConfig;
use crate::content::ContentConfig;
use crate::document::DocumentConfig;
use crate::note::NoteConfig;
use crate::paragraph::ParagraphConfig;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub note: NoteConfig,
    pub document: DocumentConfig,
    pub content: ContentConfig,
    pub background: BackgroundConfig,
    pub paragraph: ParagraphConfig,
}

/// Embedded defaults, then `./settings.toml`, `./settings.local.toml` and
/// finally `extra_path`, each merged table by table over the previous.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }
    load_layers(&ordered_paths)
}

fn load_layers(paths: &[PathBuf]) -> Result<Settings> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    for path in paths {
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let layer: toml::Value = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        merge_values(&mut merged, layer);
    }
    let settings: Settings = merged
        .try_into()
        .with_context(|| "invalid settings")?;
    settings.validate()?;
    Ok(settings)
}

fn merge_values(base: &mut toml::Value, incoming: toml::Value) {
    match (base, incoming) {
        (toml::Value::Table(base), toml::Value::Table(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let note = &self.note;
        check_probability("note.landscape", note.landscape)?;
        check_range_u32("note.short_size", note.short_size)?;
        check_range("note.aspect_ratio", note.aspect_ratio)?;
        if note.short_size[0] == 0 {
            return Err(anyhow!("note.short_size must be positive"));
        }
        if note.max_attempts == 0 {
            return Err(anyhow!("note.max_attempts must be at least 1"));
        }
        check_quality("note.output.quality", note.output.quality)?;
        if note.output.prefix.trim().is_empty() || note.output.extension.trim().is_empty() {
            return Err(anyhow!("note.output prefix and extension must not be empty"));
        }

        let document = &self.document;
        check_probability("document.fullscreen", document.fullscreen)?;
        check_probability("document.landscape", document.landscape)?;
        check_range_u32("document.short_size", document.short_size)?;
        check_range("document.aspect_ratio", document.aspect_ratio)?;

        let content = &self.content;
        check_range("content.margin", content.margin)?;
        if content.margin[1] >= 0.5 {
            return Err(anyhow!("content.margin must stay below 0.5"));
        }
        if content.text.path.as_os_str().is_empty() {
            return Err(anyhow!("content.text.path must not be empty"));
        }
        if content.text.block_size == 0 {
            return Err(anyhow!("content.text.block_size must be positive"));
        }
        check_range("content.header.offset", content.header.offset)?;
        check_range("content.textbox.fill", content.textbox.fill)?;
        check_range_u32("content.textbox.lines", content.textbox.lines)?;
        if content.textbox.lines[0] == 0 {
            return Err(anyhow!("content.textbox.lines must be at least 1"));
        }

        let layout = &content.layout;
        check_range("content.layout.stack_spacing", layout.stack_spacing)?;
        check_range("content.layout.stack_fill", layout.stack_fill)?;
        check_probability("content.layout.stack_full", layout.stack_full)?;
        check_range("content.layout.grid.text_scale", layout.grid.text_scale)?;
        check_range("content.layout.grid.fill", layout.grid.fill)?;
        check_probability("content.layout.grid.full", layout.grid.full)?;
        if layout.grid.max_row == 0 || layout.grid.max_col == 0 {
            return Err(anyhow!("content.layout.grid max_row and max_col must be positive"));
        }
        if layout.grid.align.is_empty() {
            return Err(anyhow!("content.layout.grid.align must not be empty"));
        }

        check_quality("background.quality", self.background.quality)?;
        check_quality("paragraph.quality", self.paragraph.quality)?;
        let paragraph = &self.paragraph;
        if paragraph.min_length > paragraph.max_length {
            return Err(anyhow!(
                "paragraph.min_length ({}) exceeds max_length ({})",
                paragraph.min_length,
                paragraph.max_length
            ));
        }
        if paragraph.n_sentence == 0 || paragraph.n_paragraph == 0 {
            return Err(anyhow!("paragraph.n_sentence and n_paragraph must be positive"));
        }
        Ok(())
    }
}

fn check_range(name: &str, range: [f32; 2]) -> Result<()> {
    if range.iter().any(|value| !value.is_finite() || *value < 0.0) || range[0] > range[1] {
        return Err(anyhow!("{} must be an ordered non-negative range, got {:?}", name, range));
    }
    Ok(())
}

fn check_range_u32(name: &str, range: [u32; 2]) -> Result<()> {
    if range[0] > range[1] {
        return Err(anyhow!("{} must be an ordered range, got {:?}", name, range));
    }
    Ok(())
}

fn check_probability(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

fn check_quality(name: &str, value: u8) -> Result<()> {
    if !(1..=100).contains(&value) {
        return Err(anyhow!("{} must be within [1, 100], got {}", name, value));
    }
    Ok(())
}
