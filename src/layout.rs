//! Caption overlay layout
//!
//! Wraps caption text into lines that fit a white box anchored in the lower
//! third of the canvas. The computation is backend independent; `media`
//! turns a [`LayoutResult`] into drawbox/drawtext filters.

use anyhow::{Context, anyhow};
use fontdue::{Font, FontSettings};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Inter-line spacing in pixels.
pub const LINE_SPACING: u32 = 8;
/// Total vertical padding of the box (half above, half below the text).
pub const VERTICAL_PADDING: u32 = 24;

// Percentages of the canvas size.
const PADDING_X_PCT: u64 = 6;
const MAX_WIDTH_PCT: u64 = 85;
const ANCHOR_Y_PCT: u64 = 68;

fn percent_of(value: u32, pct: u64) -> u32 {
    (value as u64 * pct / 100) as u32
}

/// Measured size of a rendered string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextSize {
    pub width: u32,
    pub height: u32,
}

/// Something that can tell how wide a string renders.
pub trait TextMeasure {
    fn measure(&self, text: &str) -> TextSize;

    /// Height reported for an empty line.
    fn line_height(&self) -> u32;
}

/// Approximate proportional font metrics.
///
/// Advances are expressed as a fraction of the font size per glyph class,
/// close to a bold sans face. Widths are additive so the same words always
/// measure the same regardless of where a line breaks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub font_size: u32,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self { font_size: 80 }
    }
}

impl FontMetrics {
    pub fn new(font_size: u32) -> Self {
        Self { font_size }
    }

    fn advance(c: char) -> f64 {
        match c {
            ' ' | 'i' | 'j' | 'l' | '.' | ',' | '\'' | '!' | '|' | ':' | ';' => 0.28,
            'f' | 't' | 'r' | 'I' | '(' | ')' | '-' => 0.36,
            'm' | 'w' => 0.89,
            'M' | 'W' => 0.94,
            c if c.is_ascii_uppercase() => 0.70,
            c if c.is_ascii() => 0.56,
            // CJK, emoji and the like are roughly square
            _ => 1.0,
        }
    }
}

impl TextMeasure for FontMetrics {
    fn measure(&self, text: &str) -> TextSize {
        let em: f64 = text.chars().map(Self::advance).sum();
        let width = (em * self.font_size as f64).ceil() as u32;
        let height = if text.is_empty() { 0 } else { self.font_size };
        TextSize { width, height }
    }

    fn line_height(&self) -> u32 {
        self.font_size
    }
}

/// Advances read from the glyph tables of a TrueType/OpenType face.
#[derive(Clone)]
pub struct GlyphMetrics {
    font: Arc<Font>,
    font_size: u32,
}

impl GlyphMetrics {
    pub fn from_file(path: &Path, font_size: u32) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow!("failed to parse font {}: {}", path.display(), e))?;
        Ok(Self {
            font: Arc::new(font),
            font_size,
        })
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }
}

impl fmt::Debug for GlyphMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlyphMetrics")
            .field("font_size", &self.font_size)
            .finish_non_exhaustive()
    }
}

impl TextMeasure for GlyphMetrics {
    fn measure(&self, text: &str) -> TextSize {
        let px = self.font_size as f32;
        let advance: f32 = text
            .chars()
            .map(|c| self.font.metrics(c, px).advance_width)
            .sum();
        let height = if text.is_empty() { 0 } else { self.line_height() };
        TextSize {
            width: advance.ceil().max(0.0) as u32,
            height,
        }
    }

    fn line_height(&self) -> u32 {
        let px = self.font_size as f32;
        self.font
            .horizontal_line_metrics(px)
            .map(|m| m.new_line_size.ceil() as u32)
            .unwrap_or(self.font_size)
    }
}

/// Measure used for caption layout: the caption font's real glyphs when one
/// is configured, the approximate table otherwise.
#[derive(Debug, Clone)]
pub enum CaptionFont {
    Approximate(FontMetrics),
    Glyphs(GlyphMetrics),
}

impl Default for CaptionFont {
    fn default() -> Self {
        Self::Approximate(FontMetrics::default())
    }
}

impl CaptionFont {
    /// Load `font_file`, falling back to approximate metrics when it is
    /// missing or unreadable.
    pub fn load(font_file: Option<&Path>, font_size: u32) -> Self {
        let Some(path) = font_file else {
            return Self::Approximate(FontMetrics::new(font_size));
        };
        match GlyphMetrics::from_file(path, font_size) {
            Ok(glyphs) => {
                info!("Caption layout measures glyphs from {}", path.display());
                Self::Glyphs(glyphs)
            }
            Err(e) => {
                warn!("{:#}; captions use approximate metrics", e);
                Self::Approximate(FontMetrics::new(font_size))
            }
        }
    }

    pub fn font_size(&self) -> u32 {
        match self {
            Self::Approximate(metrics) => metrics.font_size,
            Self::Glyphs(glyphs) => glyphs.font_size(),
        }
    }
}

impl TextMeasure for CaptionFont {
    fn measure(&self, text: &str) -> TextSize {
        match self {
            Self::Approximate(metrics) => metrics.measure(text),
            Self::Glyphs(glyphs) => glyphs.measure(text),
        }
    }

    fn line_height(&self) -> u32 {
        match self {
            Self::Approximate(metrics) => metrics.line_height(),
            Self::Glyphs(glyphs) => glyphs.line_height(),
        }
    }
}

/// One wrapped line, positioned relative to the box origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaidLine {
    pub text: String,
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutResult {
    pub lines: Vec<LaidLine>,
    pub box_width: u32,
    pub box_height: u32,
    /// Canvas offset of the box's top-left corner.
    pub placement: (u32, u32),
    pub padding_x: u32,
    pub max_text_width: u32,
}

impl LayoutResult {
    pub fn line_texts(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.text.is_empty())
    }
}

/// Greedily pack words into lines no wider than `max_width`.
///
/// A single word wider than the limit ends up alone on its line.
pub fn wrap_words(text: &str, max_width: u32, measure: &impl TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let trial = format!("{} {}", current, word);
        if measure.measure(&trial).width <= max_width {
            current = trial;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Lay out `text` for a `canvas_width` x `canvas_height` frame.
///
/// Never fails: empty or whitespace-only text yields a single empty line
/// inside a minimal box.
pub fn layout(
    text: &str,
    canvas_width: u32,
    canvas_height: u32,
    measure: &impl TextMeasure,
) -> LayoutResult {
    let padding_x = percent_of(canvas_width, PADDING_X_PCT);
    let max_width = percent_of(canvas_width, MAX_WIDTH_PCT);
    let max_text_width = max_width.saturating_sub(2 * padding_x);

    let mut wrapped = wrap_words(text, max_text_width, measure);
    if wrapped.is_empty() {
        wrapped.push(String::new());
    }

    let sizes: Vec<TextSize> = wrapped
        .iter()
        .map(|line| {
            let size = measure.measure(line);
            if line.is_empty() {
                TextSize {
                    width: 0,
                    height: measure.line_height(),
                }
            } else {
                size
            }
        })
        .collect();

    let widest = sizes.iter().map(|s| s.width).max().unwrap_or(0);
    let text_width = widest.min(max_text_width);
    let text_height: u32 = sizes.iter().map(|s| s.height).sum::<u32>()
        + LINE_SPACING * (sizes.len() as u32 - 1);

    let box_width = text_width + 2 * padding_x;
    let box_height = text_height + VERTICAL_PADDING;
    let box_x = canvas_width.saturating_sub(box_width) / 2;
    let box_y = percent_of(canvas_height, ANCHOR_Y_PCT);

    let mut cursor_y = VERTICAL_PADDING / 2;
    let lines = wrapped
        .into_iter()
        .zip(sizes)
        .map(|(text, size)| {
            let line = LaidLine {
                text,
                width: size.width,
                height: size.height,
                x: box_width.saturating_sub(size.width) / 2,
                y: cursor_y,
            };
            cursor_y += size.height + LINE_SPACING;
            line
        })
        .collect();

    LayoutResult {
        lines,
        box_width,
        box_height,
        placement: (box_x, box_y),
        padding_x,
        max_text_width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every char is 10px wide, lines are 20px tall.
    struct Mono;

    impl TextMeasure for Mono {
        fn measure(&self, text: &str) -> TextSize {
            TextSize {
                width: text.chars().count() as u32 * 10,
                height: if text.is_empty() { 0 } else { 20 },
            }
        }

        fn line_height(&self) -> u32 {
            20
        }
    }

    #[test]
    fn test_geometry_constants() {
        // 1000px canvas: padding 60, max width 850, text limit 730
        let result = layout("hi", 1000, 1000, &Mono);
        assert_eq!(result.padding_x, 60);
        assert_eq!(result.max_text_width, 730);
        assert_eq!(result.box_width, 20 + 120);
        assert_eq!(result.box_height, 20 + 24);
        assert_eq!(result.placement, ((1000 - 140) / 2, 680));
    }

    #[test]
    fn test_wraps_at_limit() {
        // limit 730px = 73 chars
        let text = "word ".repeat(40);
        let result = layout(&text, 1000, 1000, &Mono);
        assert!(result.lines.len() > 1);
        for line in &result.lines {
            assert!(line.width <= result.max_text_width, "{:?}", line);
        }
        // 14 words fit (14*5-1 = 69 chars), the 15th would make 74
        assert_eq!(result.lines[0].text.split(' ').count(), 14);
    }

    #[test]
    fn test_box_height_counts_spacing() {
        let text = "word ".repeat(40);
        let result = layout(&text, 1000, 1000, &Mono);
        let n = result.lines.len() as u32;
        assert_eq!(result.box_height, n * 20 + (n - 1) * LINE_SPACING + VERTICAL_PADDING);
        assert_eq!(result.lines[0].y, 12);
        assert_eq!(result.lines[1].y, 12 + 20 + 8);
    }

    #[test]
    fn test_overwide_word_stays_whole() {
        let long = "x".repeat(100);
        let text = format!("a {} b", long);
        let result = layout(&text, 1000, 1000, &Mono);
        assert_eq!(result.line_texts(), vec!["a", long.as_str(), "b"]);
        // box is capped even though the word overflows
        assert_eq!(result.box_width, result.max_text_width + 2 * result.padding_x);
    }

    #[test]
    fn test_empty_text_degenerates() {
        for text in ["", "   ", "\n\t"] {
            let result = layout(text, 1920, 1080, &Mono);
            assert_eq!(result.lines.len(), 1);
            assert!(result.is_blank());
            assert_eq!(result.lines[0].width, 0);
            assert_eq!(result.box_height, 20 + VERTICAL_PADDING);
            assert_eq!(result.box_width, 2 * result.padding_x);
        }
    }

    #[test]
    fn test_wrapping_is_idempotent() {
        let metrics = FontMetrics::default();
        let text = "A robot learns to dance under the neon lights of a city that never sleeps, \
                    and every step it takes brings it closer to the rhythm of the crowd";
        for width in [480, 720, 1080, 1920] {
            let first = layout(text, width, 1920, &metrics);
            let joined = first.line_texts().join(" ");
            let second = layout(&joined, width, 1920, &metrics);
            assert_eq!(first.line_texts(), second.line_texts());
        }
    }

    #[test]
    fn test_lines_never_exceed_limit() {
        let metrics = FontMetrics::new(64);
        let words = ["I'm", "a", "cat", "of", "course", "I", "knock", "things", "WWW", "mmm"];
        for width in [720_u32, 1080, 1920] {
            for n in 1..40 {
                let text: Vec<&str> = words.iter().cycle().take(n).copied().collect();
                let result = layout(&text.join(" "), width, 1080, &metrics);
                for line in &result.lines {
                    assert!(line.width <= result.max_text_width);
                }
            }
        }
    }

    #[test]
    fn test_lines_centered_in_box() {
        let result = layout("ab abcd", 200, 400, &Mono);
        // limit: 170 - 24 = 146px, "ab abcd" is 70px
        assert_eq!(result.lines.len(), 1);
        let line = &result.lines[0];
        assert_eq!(line.x, (result.box_width - 70) / 2);
    }

    #[test]
    fn test_font_metrics_additive() {
        let m = FontMetrics::new(100);
        assert_eq!(m.measure("").width, 0);
        assert!(m.measure("WWW").width > m.measure("iii").width);
        assert_eq!(m.measure("hello").height, 100);
    }

    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    #[test]
    fn test_missing_font_file_falls_back() {
        let path = Path::new("/nonexistent/caption.ttf");
        assert!(GlyphMetrics::from_file(path, 64).is_err());

        let font = CaptionFont::load(Some(path), 64);
        assert!(matches!(font, CaptionFont::Approximate(_)));
        assert_eq!(font.font_size(), 64);
        assert_eq!(font.measure("hello"), FontMetrics::new(64).measure("hello"));
        assert!(matches!(CaptionFont::load(None, 80), CaptionFont::Approximate(_)));
    }

    #[test]
    fn test_garbage_font_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(CaptionFont::load(Some(&path), 48), CaptionFont::Approximate(_)));
    }

    #[test]
    fn test_glyph_metrics_from_font_file() {
        let path = Path::new(SYSTEM_FONT);
        if !path.exists() {
            return;
        }
        let font = CaptionFont::load(Some(path), 80);
        assert!(matches!(font, CaptionFont::Glyphs(_)));
        assert_eq!(font.measure("").width, 0);
        assert!(font.measure("WWW").width > font.measure("iii").width);
        assert!(font.line_height() >= 80);

        let text = "A robot learns to dance under the neon lights of a city that never sleeps";
        let result = layout(text, 1080, 1920, &font);
        for line in &result.lines {
            assert!(line.width <= result.max_text_width);
        }
        let joined = result.line_texts().join(" ");
        assert_eq!(layout(&joined, 1080, 1920, &font).line_texts(), result.line_texts());
    }
}
