use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use synthnote::{Command, Config, SentenceSource};

#[derive(Parser, Debug)]
#[command(
    name = "synthnote",
    version,
    about = "Generate synthetic note images with OCR ground truth"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "settings", global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Render note images and append their ground truth to metadata.jsonl
    Note {
        /// Number of images to create
        #[arg(short = 'c', long = "count")]
        count: usize,

        #[arg(short = 'o', long = "output-dir", default_value = "out/")]
        output_dir: PathBuf,

        /// Worker threads (default: number of CPUs)
        #[arg(short = 'w', long = "workers")]
        workers: Option<usize>,

        /// Seed for reproducible output
        #[arg(short = 's', long = "seed")]
        seed: Option<u64>,
    },
    /// Paste generated images onto random backgrounds
    Background {
        #[arg(long = "input-dir")]
        input_dir: Option<PathBuf>,

        #[arg(long = "output-dir")]
        output_dir: Option<PathBuf>,

        #[arg(long = "background-dir")]
        background_dir: Option<PathBuf>,

        #[arg(short = 's', long = "seed")]
        seed: Option<u64>,
    },
    /// Render paragraph images from Wikipedia or a dictionary file
    Paragraph {
        #[arg(short = 'c', long = "count", default_value_t = 1)]
        count: usize,

        #[arg(short = 'o', long = "output-dir")]
        output_dir: Option<PathBuf>,

        /// Use random Wikipedia summaries as the sentence source
        #[arg(long = "wikipedia", conflicts_with = "dict")]
        wikipedia: bool,

        /// Dictionary file, one sentence per line
        #[arg(long = "dict", alias = "dictionary")]
        dict: Option<PathBuf>,

        #[arg(short = 's', long = "seed")]
        seed: Option<u64>,
    },
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Note {
                count,
                output_dir,
                workers,
                seed,
            } => Command::Note {
                count,
                output_dir,
                workers,
                seed,
            },
            CliCommand::Background {
                input_dir,
                output_dir,
                background_dir,
                seed,
            } => Command::Background {
                input_dir,
                output_dir,
                background_dir,
                seed,
            },
            CliCommand::Paragraph {
                count,
                output_dir,
                wikipedia,
                dict,
                seed,
            } => {
                let source = if wikipedia {
                    Some(SentenceSource::Wikipedia)
                } else {
                    dict.map(SentenceSource::Dictionary)
                };
                Command::Paragraph {
                    count,
                    output_dir,
                    source,
                    seed,
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    synthnote::logging::init(cli.verbose)?;
    let config = Config {
        settings_path: cli.settings,
        command: cli.command.into(),
    };
    let summary = synthnote::run(config).await?;
    println!("{}", summary);
    Ok(())
}
