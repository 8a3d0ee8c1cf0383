use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::{OffsetDateTime, format_description};
use tracing::info;

use crate::content::FontConfig;
use crate::font::{FontMetrics, FontPool};
use crate::geometry::Rect;
use crate::render::{RenderStyle, Renderer, save_rgb, scene_svg};
use crate::sentences::{dictionary_sentences, wikipedia_sentences};
use crate::textbox::TextElement;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParagraphConfig {
    pub output_dir: PathBuf,
    pub extension: String,
    pub quality: u8,
    /// Nominal image width; lines wrap at a tenth of it in characters.
    pub width: u32,
    pub font_size: f32,
    pub margin: u32,
    pub line_height: u32,
    pub paragraph_spacing: u32,
    pub n_sentence: usize,
    pub n_paragraph: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub lang: String,
    pub max_requests: usize,
    pub dictionary: PathBuf,
    pub font: FontConfig,
}

impl Default for ParagraphConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            extension: "jpg".to_string(),
            quality: 95,
            width: 400,
            font_size: 20.0,
            margin: 20,
            line_height: 30,
            paragraph_spacing: 20,
            n_sentence: 5,
            n_paragraph: 4,
            min_length: 1,
            max_length: 7,
            lang: "ko".to_string(),
            max_requests: 200,
            dictionary: PathBuf::from("resources/ksx1001.txt"),
            font: FontConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentenceSource {
    Wikipedia,
    Dictionary(PathBuf),
}

/// Greedy word wrap at `width` characters. Words longer than a line are
/// split across lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        let gap = usize::from(current_len > 0);
        if current_len + gap + chars.len() <= width {
            if gap == 1 {
                current.push(' ');
            }
            current.extend(chars.iter());
            current_len += gap + chars.len();
            continue;
        }
        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
        }
        while chars.len() > width {
            let rest = chars.split_off(width);
            lines.push(chars.iter().collect());
            chars = rest;
        }
        current.extend(chars.iter());
        current_len = chars.len();
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Joins every `n_sentence` consecutive sentences into one paragraph.
pub fn group_paragraphs(sentences: &[String], n_sentence: usize) -> Vec<String> {
    sentences
        .chunks(n_sentence.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

pub fn file_stem(now: OffsetDateTime, idx: usize) -> Result<String> {
    let format = format_description::parse("[year repr:last_two][month][day]_[hour][minute][second]")
        .map_err(|err| anyhow!("invalid timestamp format: {}", err))?;
    let stamp = now
        .format(&format)
        .with_context(|| "failed to format timestamp")?;
    Ok(format!("{}_{}", stamp, idx))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphLayout {
    pub width: u32,
    pub height: u32,
    pub paragraphs: Vec<Vec<String>>,
}

pub struct Paragraph {
    config: ParagraphConfig,
    fonts: FontPool,
    renderer: Renderer,
}

impl Paragraph {
    pub fn new(config: ParagraphConfig) -> Result<Self> {
        let fonts = FontPool::load(&config.font.paths, &config.font.fallback_families)?;
        let renderer = Renderer::new(&fonts);
        Ok(Self::with_parts(config, fonts, renderer))
    }

    pub fn with_parts(config: ParagraphConfig, fonts: FontPool, renderer: Renderer) -> Self {
        Self {
            config,
            fonts,
            renderer,
        }
    }

    fn glyph_line_height(&self, font: &FontMetrics) -> f32 {
        self.config.font_size / font.font_size_for_line(1.0)
    }

    pub fn layout(&self, sentences: &[String], font: &FontMetrics) -> ParagraphLayout {
        let config = &self.config;
        let glyph_height = self.glyph_line_height(font);
        let wrap_width = (config.width / 10) as usize;

        let paragraphs: Vec<Vec<String>> = group_paragraphs(sentences, config.n_sentence)
            .iter()
            .map(|paragraph| wrap_text(paragraph, wrap_width))
            .filter(|lines| !lines.is_empty())
            .collect();

        let mut width = config.margin * 2;
        let mut height = config.margin * 2;
        for lines in &paragraphs {
            let widest = lines
                .iter()
                .map(|line| font.measure_text_width_px(line, glyph_height).ceil() as u32)
                .max()
                .unwrap_or(0);
            width = width.max(widest + config.margin * 2);
            height += lines.len() as u32 * config.line_height + config.paragraph_spacing;
        }
        if !paragraphs.is_empty() {
            height -= config.paragraph_spacing;
        }
        ParagraphLayout {
            width,
            height,
            paragraphs,
        }
    }

    pub fn render<R: Rng>(&self, sentences: &[String], rng: &mut R) -> Result<RgbaImage> {
        let font = self.fonts.sample(rng);
        let layout = self.layout(sentences, font);
        let glyph_height = self.glyph_line_height(font);

        let mut elements = Vec::new();
        let mut y = self.config.margin as f32;
        for lines in &layout.paragraphs {
            for line in lines {
                let mut element = TextElement::single_line(line, glyph_height, font);
                element.move_to(self.config.margin as f32, y);
                elements.push(element);
                y += self.config.line_height as f32;
            }
            y += self.config.paragraph_spacing as f32;
        }

        let page = Rect::new(0.0, 0.0, layout.width as f32, layout.height as f32);
        let svg = scene_svg(
            layout.width,
            layout.height,
            Some(page),
            &elements,
            &RenderStyle::default(),
        );
        self.renderer.rasterize(&svg)
    }

    pub fn save(&self, image: &RgbaImage, idx: usize, now: OffsetDateTime) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "failed to create output directory: {}",
                self.config.output_dir.display()
            )
        })?;
        let name = format!("{}.{}", file_stem(now, idx)?, self.config.extension);
        let path = self.config.output_dir.join(name);
        save_rgb(image, &path, self.config.quality)?;
        Ok(path)
    }

    /// Renders `count` paragraph images with sentences drawn from `source`.
    pub async fn generate<R: Rng>(
        &self,
        source: &SentenceSource,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<PathBuf>> {
        let config = &self.config;
        let per_image = config.n_sentence * config.n_paragraph;
        let mut written = Vec::with_capacity(count);
        for idx in 0..count {
            let sentences = match source {
                SentenceSource::Wikipedia => {
                    wikipedia_sentences(
                        &config.lang,
                        config.min_length,
                        config.max_length,
                        per_image,
                        config.max_requests,
                    )
                    .await?
                }
                SentenceSource::Dictionary(path) => dictionary_sentences(path, per_image, rng)?,
            };
            let image = self.render(&sentences, rng)?;
            let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
            let path = self.save(&image, idx, now)?;
            info!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}
