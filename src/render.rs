use anyhow::{Context, Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use resvg::render;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::font::{FontMetrics, FontPool};
use crate::geometry::{BBoxPx, Rect};
use crate::textbox::TextElement;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    pub background: String,
    pub paper: String,
    pub text: String,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            background: "#ffffff".to_string(),
            paper: "#ffffff".to_string(),
            text: "#000000".to_string(),
        }
    }
}

/// Rasterizes SVG scenes with the system fonts plus every file-backed font
/// of the pool.
pub struct Renderer {
    fontdb: Arc<fontdb::Database>,
}

impl Renderer {
    pub fn new(fonts: &FontPool) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        // Collection faces share one buffer; fontdb registers every face of it.
        for font in fonts.fonts().iter().filter(|font| font.face_index() == 0) {
            if let Some(data) = font.data() {
                db.load_font_data(data.to_vec());
            }
        }
        Self {
            fontdb: Arc::new(db),
        }
    }

    pub fn with_fontdb(db: fontdb::Database) -> Self {
        Self {
            fontdb: Arc::new(db),
        }
    }

    pub fn rasterize(&self, svg: &str) -> Result<RgbaImage> {
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
        let size = tree.size().to_int_size();
        let mut pixmap =
            Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
        let mut pixmap_mut = pixmap.as_mut();
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
        RgbaImage::from_raw(size.width(), size.height(), pixmap.take())
            .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
    }
}

/// Canvas filled with the background colour, an optional paper rectangle and
/// the text elements on top.
pub fn scene_svg(
    width: u32,
    height: u32,
    paper: Option<Rect>,
    elements: &[TextElement],
    style: &RenderStyle,
) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<rect x="0" y="0" width="{w}" height="{h}" fill="{fill}"/>"#,
        w = width,
        h = height,
        fill = escape_xml(&style.background)
    ));
    if let Some(paper) = paper {
        svg.push_str(&format!(
            r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{fill}"/>"#,
            x = paper.x,
            y = paper.y,
            w = paper.w,
            h = paper.h,
            fill = escape_xml(&style.paper)
        ));
    }
    for element in elements {
        push_text_element(&mut svg, element, &style.text);
    }
    svg.push_str("</svg>");
    svg
}

fn push_text_element(svg: &mut String, element: &TextElement, fill: &str) {
    let font = &element.font;
    let font_size = font.font_size_for_line(element.line_height);
    let ascent = font.ascent_for_line(element.line_height);
    let family = font_family_attr(font);
    for (idx, line) in element.lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let baseline = element.bbox.y + element.line_height * idx as f32 + ascent;
        svg.push_str(&format!(
            r#"<text x="{x:.2}" y="{y:.2}" font-family="{family}" font-size="{size:.2}" fill="{fill}" xml:space="preserve">{text}</text>"#,
            x = element.bbox.x,
            y = baseline,
            family = family,
            size = font_size,
            fill = escape_xml(fill),
            text = escape_xml(line)
        ));
    }
}

fn font_family_attr(font: &FontMetrics) -> String {
    match font.family() {
        Some(family) => escape_xml(&format!("'{}', sans-serif", family.replace('\'', ""))),
        None => "sans-serif".to_string(),
    }
}

pub fn crop(image: &RgbaImage, bbox: BBoxPx) -> RgbaImage {
    let x = bbox.x.max(0) as u32;
    let y = bbox.y.max(0) as u32;
    image::imageops::crop_imm(image, x, y, bbox.w, bbox.h).to_image()
}

/// Alpha-blends `top` onto `base` with its top-left corner at `(x, y)`.
pub fn paste(base: &mut RgbaImage, top: &RgbaImage, x: i64, y: i64) {
    image::imageops::overlay(base, top, x, y);
}

/// Saves without alpha; JPEG output uses `quality`, other formats follow the
/// extension.
pub fn save_rgb(image: &RgbaImage, path: &Path, quality: u8) -> Result<()> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unsupported image extension: {}", path.display()))?;
    if format == ImageFormat::Jpeg {
        let file = File::create(path)
            .with_context(|| format!("failed to create image: {}", path.display()))?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100));
        encoder
            .encode_image(&rgb)
            .with_context(|| format!("failed to encode image: {}", path.display()))?;
        return Ok(());
    }
    rgb.save_with_format(path, format)
        .with_context(|| format!("failed to write image: {}", path.display()))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn renderer() -> Renderer {
        Renderer::with_fontdb(fontdb::Database::new())
    }

    #[test]
    fn text_lines_sit_on_their_baselines() {
        let font = FontMetrics::estimated();
        let element = TextElement {
            bbox: Rect::new(10.0, 20.0, 100.0, 80.0),
            lines: vec!["a<b".to_string(), "c&d".to_string()],
            line_height: 40.0,
            font,
        };
        let svg = scene_svg(200, 200, None, &[element], &RenderStyle::default());
        assert!(svg.contains(r#"<text x="10.00" y="55.20" font-family="sans-serif" font-size="40.00""#));
        assert!(svg.contains(r#"y="95.20""#));
        assert!(svg.contains("a&lt;b"));
        assert!(svg.contains("c&amp;d"));
    }

    #[test]
    fn rasterizes_background_and_paper() {
        let style = RenderStyle {
            background: "#000000".to_string(),
            paper: "#ffffff".to_string(),
            ..RenderStyle::default()
        };
        let svg = scene_svg(40, 30, Some(Rect::new(10.0, 10.0, 20.0, 10.0)), &[], &style);
        let image = renderer().rasterize(&svg).expect("rasterize");
        assert_eq!(image.dimensions(), (40, 30));
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(image.get_pixel(15, 15), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn crop_and_paste() {
        let mut base = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let top = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        paste(&mut base, &top, 3, 4);
        assert_eq!(base.get_pixel(3, 4), &Rgba([255, 0, 0, 255]));
        assert_eq!(base.get_pixel(5, 4), &Rgba([255, 255, 255, 255]));

        let cropped = crop(&base, BBoxPx::new(3, 4, 2, 2));
        assert_eq!(cropped.dimensions(), (2, 2));
        assert!(cropped.pixels().all(|pixel| *pixel == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn saves_jpeg_without_alpha() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.jpg");
        let image = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        save_rgb(&image, &path, 95).expect("save");
        let loaded = image::open(&path).expect("open");
        assert_eq!(loaded.color(), image::ColorType::Rgb8);
        assert_eq!((loaded.width(), loaded.height()), (8, 8));
    }

    #[test]
    fn file_backed_text_is_drawn_inside_its_box() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Tuffy.ttf");
        let font = crate::font::load_font_metrics(&path).expect("font").remove(0);
        let mut db = fontdb::Database::new();
        db.load_font_file(&path).expect("fontdb");
        let mut element = TextElement::single_line("Hello, jumpy", 32.0, &font);
        element.move_to(20.0, 24.0);
        let bbox = element.bbox;

        let svg = scene_svg(240, 80, None, &[element], &RenderStyle::default());
        let image = Renderer::with_fontdb(db).rasterize(&svg).expect("rasterize");
        let mut ink = 0;
        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel.0[0] < 128 {
                ink += 1;
                let (x, y) = (x as f32, y as f32);
                assert!(x >= bbox.x - 2.0 && x <= bbox.right() + 2.0, "x {x} outside {bbox:?}");
                assert!(y >= bbox.y - 2.0 && y <= bbox.bottom() + 2.0, "y {y} outside {bbox:?}");
            }
        }
        assert!(ink > 0);
    }
}
