use anyhow::{Context, Result, anyhow};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{GenError, GenResult};
use crate::font::FontPool;
use crate::geometry::{Margins, Rect, aggregate};
use crate::layout::{Align, GridStack, GridStackConfig, Layout, layout_bbox};
use crate::reader::{DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_SIZE, TextReader};
use crate::sample::uniform_range;
use crate::textbox::{TextBox, TextBoxConfig, TextElement};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub path: PathBuf,
    pub cache_size: usize,
    pub block_size: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("resources/corpus.txt"),
            cache_size: DEFAULT_CACHE_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Font files or directories searched recursively.
    pub paths: Vec<PathBuf>,
    pub fallback_families: Vec<String>,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            fallback_families: vec!["sans-serif".to_string()],
        }
    }
}

/// Title drawn in the top-left margin of every note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// An empty text disables the header.
    pub text: String,
    /// Header height relative to the first layout region.
    pub scale: f32,
    /// Position as a fraction of the layout margin.
    pub offset: [f32; 2],
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            text: "주기".to_string(),
            scale: 0.66,
            offset: [0.4, 0.5],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Layout margin as a fraction of the paper size.
    pub margin: [f32; 2],
    pub bbox_margins: Margins,
    pub text: TextConfig,
    pub font: FontConfig,
    pub header: HeaderConfig,
    pub layout: GridStackConfig,
    pub textbox: TextBoxConfig,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            margin: [0.0, 0.1],
            bbox_margins: Margins::default(),
            text: TextConfig::default(),
            font: FontConfig::default(),
            header: HeaderConfig::default(),
            layout: GridStackConfig::default(),
            textbox: TextBoxConfig::default(),
        }
    }
}

/// Text elements of one paper, positioned in paper coordinates.
#[derive(Debug, Clone)]
pub struct Composition {
    /// The header, when configured, comes first.
    pub elements: Vec<TextElement>,
    pub texts: Vec<String>,
    pub header: Option<Rect>,
    pub document_bbox: Rect,
    pub layout_bbox: Rect,
}

impl Composition {
    pub fn translate(&mut self, dx: f32, dy: f32) {
        for element in &mut self.elements {
            element.translate(dx, dy);
        }
        self.header = self.header.map(|rect| rect.translate(dx, dy));
        self.document_bbox = self.document_bbox.translate(dx, dy);
        self.layout_bbox = self.layout_bbox.translate(dx, dy);
    }
}

pub struct Content {
    margin: [f32; 2],
    bbox_margins: Margins,
    header: HeaderConfig,
    reader: TextReader,
    fonts: FontPool,
    layout: GridStack,
    textbox: TextBox,
}

impl Content {
    pub fn new(config: ContentConfig) -> Result<Self> {
        let reader = TextReader::open(
            &config.text.path,
            config.text.cache_size,
            config.text.block_size,
        )
        .with_context(|| "failed to open text corpus")?;
        if reader.is_empty() {
            return Err(anyhow!(
                "text corpus is empty: {}",
                config.text.path.display()
            ));
        }
        let fonts = FontPool::load(&config.font.paths, &config.font.fallback_families)?;
        Ok(Self::with_parts(config, reader, fonts))
    }

    pub fn with_parts(config: ContentConfig, reader: TextReader, fonts: FontPool) -> Self {
        Self {
            margin: config.margin,
            bbox_margins: config.bbox_margins,
            header: config.header,
            reader,
            fonts,
            layout: GridStack::new(config.layout),
            textbox: TextBox::new(config.textbox),
        }
    }

    pub fn fonts(&self) -> &FontPool {
        &self.fonts
    }

    /// Lays out a paper of `size` pixels and fills it from a random corpus
    /// position.
    pub fn generate<R: Rng>(&mut self, size: (u32, u32), rng: &mut R) -> GenResult<Composition> {
        let (width, height) = (size.0 as f32, size.1 as f32);
        let left = width * uniform_range(rng, self.margin);
        let top = height * uniform_range(rng, self.margin);
        let area = Rect::new(
            left,
            top,
            (width - left * 2.0).max(0.0),
            (height - top * 2.0).max(0.0),
        );
        let layouts = self.layout.generate(area, rng)?;

        if self.reader.is_empty() {
            return Err(GenError::invalid("text corpus is empty"));
        }
        let start = rng.gen_range(0..self.reader.len());
        self.reader.seek(start)?;

        self.compose(area, &layouts, rng)
    }

    /// Places text into every region of `layouts`. Regions that cannot hold
    /// any text are skipped; the cursor steps back one character after every
    /// attempt.
    pub fn compose<R: Rng>(
        &mut self,
        area: Rect,
        layouts: &Layout,
        rng: &mut R,
    ) -> GenResult<Composition> {
        let mut elements = Vec::new();
        let mut texts = Vec::new();

        let header = match (self.header.text.trim().is_empty(), layouts.first()) {
            (false, Some(stack)) if !stack.is_empty() => {
                let font = self.fonts.sample(rng);
                let line_height = (stack[0].bbox.h * self.header.scale).max(1.0);
                let mut element = TextElement::single_line(&self.header.text, line_height, font);
                element.move_to(
                    area.x * uniform_range(rng, self.header.offset),
                    area.y * uniform_range(rng, self.header.offset),
                );
                let bbox = element.bbox;
                elements.push(element);
                texts.push(self.header.text.clone());
                Some(bbox)
            }
            _ => None,
        };

        let mut placed = 0;
        for stack in layouts {
            let font = self.fonts.sample(rng);
            for region in stack {
                let region_box = region.bbox;
                let placement =
                    self.textbox
                        .place((region_box.w, region_box.h), &mut self.reader, font, rng)?;
                self.reader.retreat()?;

                let Some(mut element) = placement.element else {
                    continue;
                };
                let (cx, cy) = region_box.center();
                let y = cy - element.bbox.h / 2.0;
                let x = match region.align {
                    Align::Left => region_box.x,
                    Align::Center => cx - element.bbox.w / 2.0,
                    Align::Right => region_box.right() - element.bbox.w,
                };
                element.move_to(x, y);
                elements.push(element);
                texts.push(placement.text);
                placed += 1;
            }
        }
        if placed == 0 {
            return Err(GenError::NothingPlaced);
        }

        let boxes: Vec<Rect> = elements.iter().map(|element| element.bbox).collect();
        let document_bbox = aggregate(&boxes, self.bbox_margins)?;
        let layout_bbox = layout_bbox(layouts, self.bbox_margins)?;
        Ok(Composition {
            elements,
            texts,
            header,
            document_bbox,
            layout_bbox,
        })
    }
}
