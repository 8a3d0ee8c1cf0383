use anyhow::{Context, Result, anyhow};
use globset::{GlobBuilder, GlobMatcher};
use image::RgbaImage;
use image::imageops::FilterType;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::metadata::{METADATA_FILE, MetadataRecord, read_metadata};
use crate::render::{paste, save_rgb};
use crate::roi::RoiMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub background_dir: PathBuf,
    /// Background size `[width, height]` every image is pasted onto.
    pub size: [u32; 2],
    pub quality: u8,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("out"),
            output_dir: PathBuf::from("out_bg"),
            background_dir: PathBuf::from("resources/backgrounds"),
            size: [1280, 1280],
            quality: 95,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackgroundReport {
    pub processed: usize,
    pub skipped: usize,
}

fn background_matcher() -> Result<GlobMatcher> {
    let glob = GlobBuilder::new("*.{png,jpg,jpeg}")
        .case_insensitive(true)
        .build()
        .with_context(|| "invalid background glob")?;
    Ok(glob.compile_matcher())
}

pub fn list_backgrounds(dir: &Path) -> Result<Vec<PathBuf>> {
    let matcher = background_matcher()?;
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list backgrounds: {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file()
            && path
                .file_name()
                .is_some_and(|name| matcher.is_match(Path::new(name)))
        {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(anyhow!("no background images in {}", dir.display()));
    }
    Ok(files)
}

/// Pastes every generated image of `input_dir` onto a random background and
/// writes the shifted ground truth next to the results.
pub fn composite<R: Rng>(config: &BackgroundConfig, rng: &mut R) -> Result<BackgroundReport> {
    let backgrounds = list_backgrounds(&config.background_dir)?;
    let records = read_metadata(&config.input_dir.join(METADATA_FILE))?;
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    let mut report = BackgroundReport::default();
    let mut updated = Vec::with_capacity(records.len());
    for record in records {
        let input_path = config.input_dir.join(&record.file_name);
        if !input_path.exists() {
            warn!("image not found for {}, skipping", record.file_name);
            report.skipped += 1;
            continue;
        }
        let foreground = image::open(&input_path)
            .with_context(|| format!("failed to open image: {}", input_path.display()))?
            .to_rgba8();
        let Some(background_path) = backgrounds.choose(rng) else {
            return Err(anyhow!("no background images available"));
        };
        let background = image::open(background_path)
            .with_context(|| format!("failed to open background: {}", background_path.display()))?
            .resize_exact(config.size[0], config.size[1], FilterType::Nearest)
            .to_rgba8();

        let (image, record) = composite_record(record, &foreground, background, rng)?;
        save_rgb(&image, &config.output_dir.join(&record.file_name), config.quality)?;
        info!("processed {}", record.file_name);
        updated.push(record);
        report.processed += 1;
    }

    write_metadata_atomic(&config.output_dir, &updated)?;
    info!(
        "background compositing complete: {} processed, {} skipped",
        report.processed, report.skipped
    );
    Ok(report)
}

/// Pastes `foreground` at a random offset inside `background` and shifts the
/// record's regions by the same offset.
pub fn composite_record<R: Rng>(
    mut record: MetadataRecord,
    foreground: &RgbaImage,
    mut background: RgbaImage,
    rng: &mut R,
) -> Result<(RgbaImage, MetadataRecord)> {
    let x_offset = rng.gen_range(0..=background.width().saturating_sub(foreground.width()));
    let y_offset = rng.gen_range(0..=background.height().saturating_sub(foreground.height()));
    paste(&mut background, foreground, i64::from(x_offset), i64::from(y_offset));

    let mut fields = record.gt_parse()?;
    if let Some(roi) = fields.get("roi") {
        let roi: RoiMap = serde_json::from_value(roi.clone())
            .with_context(|| format!("{}: invalid roi", record.file_name))?;
        let roi = roi.offset(x_offset as i32, y_offset as i32);
        let yolo = roi.to_yolo(background.width(), background.height());
        fields.insert("roi".to_string(), serde_json::to_value(&roi)?);
        fields.insert("roi_yolo".to_string(), serde_json::to_value(&yolo)?);
    }
    record.set_gt_parse(fields)?;
    Ok((background, record))
}

fn write_metadata_atomic(dir: &Path, records: &[MetadataRecord]) -> Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix("synthnote-")
        .suffix(".jsonl")
        .tempfile_in(dir)
        .with_context(|| "failed to create temp metadata file")?;
    for record in records {
        writeln!(file, "{}", record.to_line()?).with_context(|| "failed to write metadata")?;
    }
    let path = dir.join(METADATA_FILE);
    file.persist(&path)
        .with_context(|| format!("failed to persist metadata: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::format_metadata;
    use crate::sample::seeded_rng;
    use image::Rgba;
    use serde_json::json;

    fn record(name: &str) -> MetadataRecord {
        format_metadata(
            name,
            &["text_sequence", "roi"],
            vec![json!("가나"), json!({"note": [0, 0, 10, 10], "layouts": [5, 5, 20, 20]})],
        )
        .expect("format")
    }

    #[test]
    fn shifts_roi_by_the_paste_offset() {
        let foreground = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let background = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let mut rng = seeded_rng(Some(3), 0);
        let (image, updated) =
            composite_record(record("a.jpg"), &foreground, background, &mut rng).expect("composite");

        let fields = updated.gt_parse().expect("gt_parse");
        let roi: RoiMap = serde_json::from_value(fields["roi"].clone()).expect("roi");
        let note = roi.get("note").expect("note");
        let (x, y) = (note.x as u32, note.y as u32);
        assert!(x <= 60 && y <= 60);
        assert_eq!(image.get_pixel(x, y), &Rgba([0, 0, 0, 255]));
        assert_eq!(roi.get("layouts").map(|bbox| (bbox.x - note.x, bbox.y - note.y)), Some((5, 5)));

        let yolo = fields["roi_yolo"]["note"].as_array().expect("yolo");
        assert_eq!(yolo[2].as_f64(), Some(0.1));
    }

    #[test]
    fn lists_only_image_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.JPG"), b"x").expect("write");
        std::fs::write(dir.path().join("a.png"), b"x").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"x").expect("write");
        let files = list_backgrounds(dir.path()).expect("list");
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG"]);
    }

    #[test]
    fn missing_images_are_skipped() {
        let root = tempfile::tempdir().expect("tempdir");
        let input_dir = root.path().join("in");
        let background_dir = root.path().join("bg");
        std::fs::create_dir_all(&input_dir).expect("mkdir");
        std::fs::create_dir_all(&background_dir).expect("mkdir");

        RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255]))
            .save(background_dir.join("paper.png"))
            .expect("save background");
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))
            .save(input_dir.join("present.png"))
            .expect("save input");
        crate::metadata::append_metadata(
            &input_dir.join(METADATA_FILE),
            &[record("missing.png"), record("present.png")],
        )
        .expect("metadata");

        let config = BackgroundConfig {
            input_dir,
            output_dir: root.path().join("out"),
            background_dir,
            size: [16, 16],
            quality: 95,
        };
        let mut rng = seeded_rng(Some(1), 0);
        let report = composite(&config, &mut rng).expect("composite");
        assert_eq!(report, BackgroundReport { processed: 1, skipped: 1 });

        let written = read_metadata(&config.output_dir.join(METADATA_FILE)).expect("read");
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].file_name, "present.png");
        assert!(config.output_dir.join("present.png").exists());
    }
}
