use anyhow::Result;
use std::path::PathBuf;

pub mod background;
pub mod content;
pub mod document;
pub mod error;
pub mod font;
pub mod generate;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod metadata;
pub mod note;
pub mod paragraph;
pub mod reader;
pub mod render;
pub mod roi;
pub mod sample;
pub mod sentences;
pub mod settings;
pub mod textbox;
#[cfg(test)]
mod test_util;

pub use error::{GenError, GenResult};
pub use geometry::{BBoxPx, Margins, Rect, aggregate};
pub use note::{Note, NoteSample};
pub use paragraph::SentenceSource;
pub use reader::TextReader;
pub use roi::RoiMap;
pub use settings::{Settings, load_settings};

#[derive(Debug, Clone)]
pub enum Command {
    Note {
        count: usize,
        output_dir: PathBuf,
        workers: Option<usize>,
        seed: Option<u64>,
    },
    Background {
        input_dir: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        background_dir: Option<PathBuf>,
        seed: Option<u64>,
    },
    Paragraph {
        count: usize,
        output_dir: Option<PathBuf>,
        source: Option<SentenceSource>,
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: Option<PathBuf>,
    pub command: Command,
}

/// Runs one subcommand and returns a one-line summary.
pub async fn run(config: Config) -> Result<String> {
    let mut settings = load_settings(config.settings_path.as_deref())?;

    match config.command {
        Command::Note {
            count,
            output_dir,
            workers,
            seed,
        } => {
            let options = generate::BatchOptions {
                count,
                output_dir: output_dir.clone(),
                workers,
                seed,
            };
            let written = generate::generate_notes(&settings, options).await?;
            Ok(format!("generated {} note(s) in {}", written, output_dir.display()))
        }
        Command::Background {
            input_dir,
            output_dir,
            background_dir,
            seed,
        } => {
            let background = &mut settings.background;
            if let Some(dir) = input_dir {
                background.input_dir = dir;
            }
            if let Some(dir) = output_dir {
                background.output_dir = dir;
            }
            if let Some(dir) = background_dir {
                background.background_dir = dir;
            }
            let config = settings.background;
            let mut rng = sample::seeded_rng(seed, 0);
            let report = tokio::task::spawn_blocking(move || background::composite(&config, &mut rng))
                .await
                .map_err(|err| anyhow::anyhow!("background task failed: {}", err))??;
            Ok(format!(
                "processed {} image(s), skipped {}",
                report.processed, report.skipped
            ))
        }
        Command::Paragraph {
            count,
            output_dir,
            source,
            seed,
        } => {
            if let Some(dir) = output_dir {
                settings.paragraph.output_dir = dir;
            }
            let source = source
                .unwrap_or_else(|| SentenceSource::Dictionary(settings.paragraph.dictionary.clone()));
            let output_dir = settings.paragraph.output_dir.clone();
            let generator = paragraph::Paragraph::new(settings.paragraph)?;
            let mut rng = sample::seeded_rng(seed, 0);
            let written = generator.generate(&source, count, &mut rng).await?;
            Ok(format!(
                "generated {} paragraph image(s) in {}",
                written.len(),
                output_dir.display()
            ))
        }
    }
}
