use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GenResult;
use crate::font::FontMetrics;
use crate::geometry::Rect;
use crate::reader::TextReader;
use crate::sample::{randint, uniform_range};

/// Lines shorter than this cannot hold a legible glyph.
const MIN_LINE_HEIGHT: f32 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBoxConfig {
    /// Fraction of the region width the text may use.
    pub fill: [f32; 2],
    pub lines: [u32; 2],
}

impl Default for TextBoxConfig {
    fn default() -> Self {
        Self {
            fill: [1.0, 1.0],
            lines: [1, 1],
        }
    }
}

/// Placed text with its rendered extent. `bbox` starts at the origin until
/// the composer moves it into its region.
#[derive(Debug, Clone)]
pub struct TextElement {
    pub bbox: Rect,
    pub lines: Vec<String>,
    pub line_height: f32,
    pub font: FontMetrics,
}

impl TextElement {
    pub fn single_line(text: &str, line_height: f32, font: &FontMetrics) -> Self {
        let width = font.measure_text_width_px(text, line_height);
        Self {
            bbox: Rect::new(0.0, 0.0, width, line_height),
            lines: vec![text.to_string()],
            line_height,
            font: font.clone(),
        }
    }

    pub fn text(&self) -> String {
        self.lines.concat()
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.bbox.x = x;
        self.bbox.y = y;
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.bbox = self.bbox.translate(dx, dy);
    }
}

#[derive(Debug, Clone)]
pub struct Placement {
    pub element: Option<TextElement>,
    pub text: String,
    /// Characters pulled from the reader, including an overflow character
    /// that was read but not placed.
    pub consumed: usize,
}

impl Placement {
    fn skipped(consumed: usize) -> Self {
        Self {
            element: None,
            text: String::new(),
            consumed,
        }
    }
}

pub struct TextBox {
    config: TextBoxConfig,
}

impl TextBox {
    pub fn new(config: TextBoxConfig) -> Self {
        Self { config }
    }

    /// Fills a `(width, height)` region with characters pulled from `reader`,
    /// wrapping onto the sampled number of lines.
    pub fn place<R: Rng>(
        &self,
        size: (f32, f32),
        reader: &mut TextReader,
        font: &FontMetrics,
        rng: &mut R,
    ) -> GenResult<Placement> {
        let (region_w, region_h) = size;
        let fill = uniform_range(rng, self.config.fill);
        let width = (region_w * fill).max(region_h).min(region_w);
        let line_count = randint(rng, self.config.lines[0].max(1), self.config.lines[1].max(1));
        let line_height = region_h / line_count as f32;

        if line_height < MIN_LINE_HEIGHT || width < line_height * 0.25 {
            // The first character is still consumed, so callers rewind the
            // same way after every attempt.
            reader.read_char()?;
            return Ok(Placement::skipped(1));
        }

        let measurer = font.measurer();
        let mut lines = vec![String::new()];
        let mut line_width = 0.0f32;
        let mut consumed = 0;
        let limit = reader.len();

        while consumed < limit {
            let ch = reader.read_char()?;
            consumed += 1;
            if ch == '\r' || ch == '\n' {
                continue;
            }
            let advance = measurer.advance_px(ch, line_height);
            if line_width + advance <= width {
                if let Some(line) = lines.last_mut() {
                    line.push(ch);
                }
                line_width += advance;
                continue;
            }
            if lines.len() >= line_count as usize || advance > width {
                break;
            }
            lines.push(ch.to_string());
            line_width = advance;
        }

        let text = lines.concat().trim().to_string();
        if text.is_empty() {
            return Ok(Placement::skipped(consumed));
        }

        let extent = lines
            .iter()
            .map(|line| font.measure_text_width_px(line, line_height))
            .fold(0.0f32, f32::max);
        let element = TextElement {
            bbox: Rect::new(0.0, 0.0, extent, line_height * lines.len() as f32),
            lines,
            line_height,
            font: font.clone(),
        };
        Ok(Placement {
            element: Some(element),
            text,
            consumed,
        })
    }
}
