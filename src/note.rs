use anyhow::{Context, Result};
use image::RgbaImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::document::Document;
use crate::error::GenError;
use crate::geometry::{BBoxPx, Rect};
use crate::metadata::{METADATA_FILE, MetadataRecord, append_metadata, format_metadata};
use crate::render::{RenderStyle, Renderer, crop, save_rgb, scene_svg};
use crate::roi::RoiMap;
use crate::sample::{chance, randint, uniform_range};
use crate::settings::Settings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub prefix: String,
    pub extension: String,
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: "note_ko".to_string(),
            extension: "jpg".to_string(),
            quality: 95,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteConfig {
    pub landscape: f32,
    pub short_size: [u32; 2],
    pub aspect_ratio: [f32; 2],
    /// Attempts per image before the batch gives up.
    pub max_attempts: usize,
    pub output: OutputConfig,
    pub style: RenderStyle,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            landscape: 0.5,
            short_size: [720, 1024],
            aspect_ratio: [1.0, 2.0],
            max_attempts: 8,
            output: OutputConfig::default(),
            style: RenderStyle::default(),
        }
    }
}

/// A rendered note cropped to its text, with ground truth in image-local
/// coordinates.
#[derive(Debug, Clone)]
pub struct NoteSample {
    pub image: RgbaImage,
    pub label: String,
    pub roi: RoiMap,
}

pub struct Note {
    config: NoteConfig,
    document: Document,
    renderer: Renderer,
}

impl Note {
    pub fn new(settings: &Settings) -> Result<Self> {
        let document = Document::new(settings.document.clone(), settings.content.clone())?;
        let renderer = Renderer::new(document.content().fonts());
        Ok(Self::with_parts(settings.note.clone(), document, renderer))
    }

    pub fn with_parts(config: NoteConfig, document: Document, renderer: Renderer) -> Self {
        Self {
            config,
            document,
            renderer,
        }
    }

    pub fn config(&self) -> &NoteConfig {
        &self.config
    }

    pub fn canvas_size<R: Rng>(&self, rng: &mut R) -> (u32, u32) {
        let landscape = chance(rng, self.config.landscape);
        let short_size = randint(rng, self.config.short_size[0], self.config.short_size[1]).max(1);
        let aspect_ratio = uniform_range(rng, self.config.aspect_ratio);
        let long_size = ((short_size as f32 * aspect_ratio) as u32).max(1);
        if landscape {
            (long_size, short_size)
        } else {
            (short_size, long_size)
        }
    }

    pub fn generate<R: Rng>(&mut self, rng: &mut R) -> Result<NoteSample> {
        let canvas = self.canvas_size(rng);
        let mut paper = self.document.generate(canvas, rng)?;

        let left = rng.gen_range(0..=canvas.0.saturating_sub(paper.size.0));
        let top = rng.gen_range(0..=canvas.1.saturating_sub(paper.size.1));
        let composition = &mut paper.composition;
        composition.translate(left as f32, top as f32);
        let paper_rect = Rect::new(
            left as f32,
            top as f32,
            paper.size.0 as f32,
            paper.size.1 as f32,
        );

        let svg = scene_svg(
            canvas.0,
            canvas.1,
            Some(paper_rect),
            &composition.elements,
            &self.config.style,
        );
        let image = self.renderer.rasterize(&svg)?;

        let crop_box = composition
            .document_bbox
            .to_pixel_box(image.width(), image.height());
        if crop_box.w == 0 || crop_box.h == 0 {
            return Err(GenError::invalid(format!(
                "document box {:?} lies outside the {}x{} canvas",
                composition.document_bbox, canvas.0, canvas.1
            ))
            .into());
        }
        let image = crop(&image, crop_box);

        let mut roi = RoiMap::new();
        if let Some(header) = composition.header {
            roi.insert("note", BBoxPx::from_rect(&header));
        }
        roi.insert("layouts", BBoxPx::from_rect(&composition.layout_bbox));
        let roi = roi.rebase((crop_box.x, crop_box.y));

        Ok(NoteSample {
            image,
            label: join_label(&composition.texts),
            roi,
        })
    }

    pub fn file_name(&self, idx: usize) -> String {
        format!(
            "{}_{}.{}",
            self.config.output.prefix, idx, self.config.output.extension
        )
    }

    /// Writes the image under `root` and returns its ground-truth record
    /// without touching `metadata.jsonl`.
    pub fn save_image(&self, root: &Path, sample: &NoteSample, idx: usize) -> Result<MetadataRecord> {
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create output directory: {}", root.display()))?;
        let file_name = self.file_name(idx);
        save_rgb(&sample.image, &root.join(&file_name), self.config.output.quality)?;
        let roi = serde_json::to_value(&sample.roi)?;
        let record = format_metadata(
            &file_name,
            &["text_sequence", "roi"],
            vec![Value::String(sample.label.clone()), roi],
        )?;
        Ok(record)
    }

    pub fn save(&self, root: &Path, sample: &NoteSample, idx: usize) -> Result<()> {
        let record = self.save_image(root, sample, idx)?;
        append_metadata(&root.join(METADATA_FILE), &[record])
    }
}

/// Concatenates element texts, collapsing whitespace runs to one space.
pub fn join_label(texts: &[String]) -> String {
    texts.concat().split_whitespace().collect::<Vec<_>>().join(" ")
}
