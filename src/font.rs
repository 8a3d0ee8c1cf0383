use anyhow::{Context, Result, anyhow};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

const ESTIMATED_UNITS_PER_EM: u16 = 1000;
const ESTIMATED_ASCENDER: i16 = 880;
const ESTIMATED_DESCENDER: i16 = -120;

/// Glyph metrics of one font face, or script-based estimates when no font
/// file backs it.
#[derive(Clone)]
pub struct FontMetrics {
    data: Option<Arc<Vec<u8>>>,
    face_index: u32,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    space_advance: u16,
    family: Option<String>,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .field("estimated", &self.data.is_none())
            .finish()
    }
}

impl FontMetrics {
    pub fn estimated() -> Self {
        Self {
            data: None,
            face_index: 0,
            units_per_em: ESTIMATED_UNITS_PER_EM,
            ascender: ESTIMATED_ASCENDER,
            descender: ESTIMATED_DESCENDER,
            space_advance: ESTIMATED_UNITS_PER_EM / 4,
            family: None,
        }
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref().map(|data| data.as_slice())
    }

    /// Face index inside the backing file; non-zero only for collections.
    pub fn face_index(&self) -> u32 {
        self.face_index
    }

    fn line_units(&self) -> f32 {
        (i32::from(self.ascender) - i32::from(self.descender)).max(1) as f32
    }

    /// Pixels per font unit for a text line of `line_height` pixels.
    pub fn scale_for_line(&self, line_height: f32) -> f32 {
        line_height / self.line_units()
    }

    /// SVG font size that renders a line of `line_height` pixels.
    pub fn font_size_for_line(&self, line_height: f32) -> f32 {
        f32::from(self.units_per_em) * self.scale_for_line(line_height)
    }

    /// Distance from the line top to the baseline for a line of `line_height` pixels.
    pub fn ascent_for_line(&self, line_height: f32) -> f32 {
        f32::from(self.ascender.max(0)) * self.scale_for_line(line_height)
    }

    pub fn measurer(&self) -> GlyphMeasurer<'_> {
        let face = self
            .data
            .as_ref()
            .and_then(|data| Face::parse(data.as_slice(), self.face_index).ok());
        GlyphMeasurer {
            metrics: self,
            face,
        }
    }

    pub fn measure_text_width_px(&self, text: &str, line_height: f32) -> f32 {
        let measurer = self.measurer();
        text.chars()
            .filter(|ch| *ch != '\n' && *ch != '\r')
            .map(|ch| measurer.advance_px(ch, line_height))
            .sum()
    }
}

pub struct GlyphMeasurer<'a> {
    metrics: &'a FontMetrics,
    face: Option<Face<'a>>,
}

impl GlyphMeasurer<'_> {
    pub fn advance_units(&self, ch: char) -> f32 {
        let Some(face) = self.face.as_ref() else {
            return estimate_char_units(ch) * f32::from(self.metrics.units_per_em);
        };
        if ch == ' ' {
            return f32::from(self.metrics.space_advance);
        }
        let advance = face
            .glyph_index(ch)
            .and_then(|glyph| face.glyph_hor_advance(glyph))
            .unwrap_or(self.metrics.space_advance);
        f32::from(advance)
    }

    pub fn advance_px(&self, ch: char, line_height: f32) -> f32 {
        self.advance_units(ch) * self.metrics.scale_for_line(line_height)
    }
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7A3 | 0x1100..=0x11FF
    ) {
        1.0
    } else {
        0.9
    }
}

/// Loads every face of a font file. A `.ttc` collection yields one entry per
/// face, all sharing the same file data.
pub fn load_font_metrics(path: &Path) -> Result<Vec<FontMetrics>> {
    let data = Arc::new(
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?,
    );
    let faces = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    (0..faces)
        .map(|index| {
            load_font_metrics_from_data(Arc::clone(&data), index).map_err(|err| {
                anyhow!(
                    "failed to parse font: {} face {} ({})",
                    path.display(),
                    index,
                    err
                )
            })
        })
        .collect()
}

fn load_font_metrics_from_data(data: Arc<Vec<u8>>, face_index: u32) -> Result<FontMetrics> {
    let face = Face::parse(data.as_slice(), face_index).map_err(|err| anyhow!("{}", err))?;
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);
    let ascender = face.ascender();
    let descender = face.descender();
    let family = extract_family_name(&face);
    Ok(FontMetrics {
        face_index,
        units_per_em,
        ascender,
        descender,
        space_advance,
        family,
        data: Some(data),
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

/// Fonts text is rendered with; one is sampled per layout stack.
#[derive(Debug, Clone)]
pub struct FontPool {
    fonts: Vec<FontMetrics>,
}

impl FontPool {
    pub fn new(fonts: Vec<FontMetrics>) -> Self {
        if fonts.is_empty() {
            return Self::estimated();
        }
        Self { fonts }
    }

    pub fn estimated() -> Self {
        Self {
            fonts: vec![FontMetrics::estimated()],
        }
    }

    /// Loads every font file under `paths` (files or directories). Falls back
    /// to a system font, then to estimated metrics, when nothing is found.
    pub fn load(paths: &[PathBuf], fallback_families: &[String]) -> Result<Self> {
        let matcher = font_file_matcher()?;
        let mut files = Vec::new();
        for path in paths {
            if !path.exists() {
                warn!("font path not found: {}", path.display());
                continue;
            }
            collect_font_files(path, &matcher, &mut files)?;
        }
        files.sort();

        let mut fonts = Vec::new();
        for file in &files {
            match load_font_metrics(file) {
                Ok(metrics) => fonts.extend(metrics),
                Err(err) => warn!("skipping font: {}", err),
            }
        }
        if fonts.is_empty() {
            match resolve_system_font(fallback_families) {
                Ok(metrics) => fonts.push(metrics),
                Err(err) => warn!("using estimated font metrics: {}", err),
            }
        }
        debug!("loaded {} font(s)", fonts.len());
        Ok(Self::new(fonts))
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn fonts(&self) -> &[FontMetrics] {
        &self.fonts
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> &FontMetrics {
        &self.fonts[rng.gen_range(0..self.fonts.len())]
    }
}

fn font_file_matcher() -> Result<GlobSet> {
    let glob = GlobBuilder::new("*.{ttf,otf,ttc}")
        .case_insensitive(true)
        .literal_separator(false)
        .build()
        .with_context(|| "invalid font glob")?;
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    builder.build().with_context(|| "failed to build font matcher")
}

fn collect_font_files(path: &Path, matcher: &GlobSet, out: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    if !path.is_dir() {
        return Err(anyhow!("font path not found: {}", path.display()));
    }
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("failed to list fonts: {}", path.display()))?;
    for entry in entries {
        let entry_path = entry?.path();
        if entry_path.is_dir() {
            collect_font_files(&entry_path, matcher, out)?;
        } else if entry_path
            .file_name()
            .is_some_and(|name| matcher.is_match(Path::new(name)))
        {
            out.push(entry_path);
        }
    }
    Ok(())
}

fn resolve_system_font(families: &[String]) -> Result<FontMetrics> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    for family in families {
        let is_sans = family.eq_ignore_ascii_case("sans-serif");
        let query_families = if is_sans {
            vec![fontdb::Family::SansSerif]
        } else {
            vec![fontdb::Family::Name(family)]
        };
        let query = fontdb::Query {
            families: &query_families,
            ..Default::default()
        };
        let Some(id) = db.query(&query) else {
            continue;
        };
        let Some((data, index)) = db.with_face_data(id, |data, index| (data.to_vec(), index))
        else {
            continue;
        };
        return load_font_metrics_from_data(Arc::new(data), index);
    }
    Err(anyhow!("no system font matched {:?}", families))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn estimated_metrics_fill_one_em_per_line() {
        let metrics = FontMetrics::estimated();
        assert!((metrics.font_size_for_line(40.0) - 40.0).abs() < 1e-3);
        assert!((metrics.ascent_for_line(40.0) - 35.2).abs() < 1e-3);
        let measurer = metrics.measurer();
        assert!((measurer.advance_px('가', 20.0) - 20.0).abs() < 1e-3);
        assert!((measurer.advance_px('a', 20.0) - 11.0).abs() < 1e-3);
        assert!((measurer.advance_px(' ', 20.0) - 5.0).abs() < 1e-3);
    }

    #[test]
    fn measured_width_ignores_line_breaks() {
        let metrics = FontMetrics::estimated();
        let plain = metrics.measure_text_width_px("ab", 10.0);
        let broken = metrics.measure_text_width_px("a\r\nb", 10.0);
        assert!((plain - broken).abs() < 1e-4);
    }

    #[test]
    fn empty_pool_falls_back_to_estimates() {
        let pool = FontPool::new(Vec::new());
        assert_eq!(pool.len(), 1);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert!(pool.sample(&mut rng).data().is_none());
    }

    #[test]
    fn font_matcher_is_case_insensitive() {
        let matcher = font_file_matcher().expect("matcher");
        assert!(matcher.is_match("NanumGothic.TTF"));
        assert!(matcher.is_match("noto.otf"));
        assert!(!matcher.is_match("readme.txt"));
    }

    #[test]
    fn missing_font_path_falls_back_to_estimates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = FontPool::load(&[dir.path().join("nope")], &[]).expect("load");
        assert_eq!(pool.len(), 1);
        assert!(pool.fonts()[0].data().is_none());
    }

    #[test]
    fn unreadable_fonts_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.ttf"), b"not a font").expect("write");
        let pool = FontPool::load(&[dir.path().to_path_buf()], &[]).expect("load");
        assert_eq!(pool.len(), 1);
    }

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[test]
    fn collection_yields_every_face() {
        let faces = load_font_metrics(&fixture("TTC.ttc")).expect("collection");
        let indices: Vec<_> = faces.iter().map(FontMetrics::face_index).collect();
        assert_eq!(indices, vec![0, 1]);
        let first = faces[0].data().expect("data").as_ptr();
        assert_eq!(faces[1].data().expect("data").as_ptr(), first);
    }

    #[test]
    fn single_font_file_yields_one_face() {
        let faces = load_font_metrics(&fixture("Tuffy.ttf")).expect("font");
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face_index(), 0);
        assert_eq!(faces[0].family(), Some("Tuffy"));
    }

    #[test]
    fn pool_counts_collection_faces() {
        let pool = FontPool::load(&[fixture("")], &[]).expect("load");
        assert_eq!(pool.len(), 3);
        assert!(pool.fonts().iter().all(|font| font.data().is_some()));
    }
}
