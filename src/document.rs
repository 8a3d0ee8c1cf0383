use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::content::{Composition, Content, ContentConfig};
use crate::error::GenResult;
use crate::sample::{chance, randint, uniform};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Probability that the paper covers the whole canvas.
    pub fullscreen: f32,
    pub landscape: f32,
    pub short_size: [u32; 2],
    pub aspect_ratio: [f32; 2],
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            fullscreen: 0.5,
            landscape: 0.5,
            short_size: [480, 1024],
            aspect_ratio: [1.0, 2.0],
        }
    }
}

/// A sheet of paper and the text composed on it, in paper coordinates.
#[derive(Debug, Clone)]
pub struct Paper {
    pub size: (u32, u32),
    pub composition: Composition,
}

pub struct Document {
    fullscreen: f32,
    landscape: f32,
    short_size: [u32; 2],
    aspect_ratio: [f32; 2],
    content: Content,
}

impl Document {
    pub fn new(config: DocumentConfig, content: ContentConfig) -> Result<Self> {
        let content = Content::new(content)?;
        Ok(Self::with_content(config, content))
    }

    pub fn with_content(config: DocumentConfig, content: Content) -> Self {
        Self {
            fullscreen: config.fullscreen,
            landscape: config.landscape,
            short_size: config.short_size,
            aspect_ratio: config.aspect_ratio,
            content,
        }
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Paper size that fits inside `canvas`.
    pub fn paper_size<R: Rng>(&self, canvas: (u32, u32), rng: &mut R) -> (u32, u32) {
        let (width, height) = canvas;
        if chance(rng, self.fullscreen) {
            return canvas;
        }
        let landscape = chance(rng, self.landscape);
        let max_size = if landscape { width } else { height };
        let shortest = width.min(height);
        let short_size = randint(
            rng,
            shortest.min(self.short_size[0]),
            shortest.min(self.short_size[1]),
        )
        .max(1);
        let limit = max_size as f32 / short_size as f32;
        let aspect_ratio = uniform(
            rng,
            limit.min(self.aspect_ratio[0]),
            limit.min(self.aspect_ratio[1]),
        );
        let long_size = ((short_size as f32 * aspect_ratio) as u32).min(max_size);
        if landscape {
            (long_size, short_size)
        } else {
            (short_size, long_size)
        }
    }

    pub fn generate<R: Rng>(&mut self, canvas: (u32, u32), rng: &mut R) -> GenResult<Paper> {
        let size = self.paper_size(canvas, rng);
        let composition = self.content.generate(size, rng)?;
        Ok(Paper { size, composition })
    }
}
