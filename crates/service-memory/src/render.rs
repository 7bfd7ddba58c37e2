//! Page layout and rendering.
//!
//! [`PageRenderer`] is a deliberately small engine: it lays text out in
//! fixed-size lines on US-Letter pages and emits either a text-only PDF or
//! a raster preview per page. It exists so the conversion operations have
//! real, deterministic output, not to reproduce a word processor.

use std::fmt::{Debug, Write as _};
use std::io::Cursor;

use docflow_protocol::{ImageFormat, MAX_DPI};
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

use crate::document::{Block, Document};
use crate::error::Error;

const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;
const MARGIN_PT: f32 = 72.0;
const BODY_FONT_SIZE: f32 = 11.0;
const BAND_FONT_SIZE: f32 = 9.0;
const LINE_SPACING: f32 = 1.2;
/// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.5;
/// Pixel count of one page at [`MAX_DPI`].
const MAX_PAGE_PIXELS: u64 =
    (PAGE_WIDTH_PT as u64 * MAX_DPI as u64 / 72) * (PAGE_HEIGHT_PT as u64 * MAX_DPI as u64 / 72);

/// Turns a document into output file contents.
///
/// Implementations are synchronous; the service runs them on the blocking
/// thread pool.
pub trait Renderer: Debug + Send + Sync + 'static {
    /// Renders the whole document as one PDF file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] if the engine cannot produce output.
    fn render_pdf(&self, document: &Document) -> Result<Vec<u8>, Error>;

    /// Renders each page as an encoded image, in page order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] or [`Error::Image`] if a page cannot be
    /// rasterized or encoded.
    fn render_images(
        &self,
        document: &Document,
        format: ImageFormat,
        dpi: u32,
    ) -> Result<Vec<Vec<u8>>, Error>;
}

/// One laid-out line of text.
#[derive(Clone, Debug, PartialEq)]
struct Line {
    text: String,
    size: f32,
    indent: f32,
}

/// Body lines for one page.
#[derive(Debug, Default)]
struct Page {
    lines: Vec<Line>,
}

/// The built-in renderer.
#[derive(Clone, Copy, Debug, Default)]
pub struct PageRenderer;

impl PageRenderer {
    /// Creates the renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Renderer for PageRenderer {
    fn render_pdf(&self, document: &Document) -> Result<Vec<u8>, Error> {
        let pages = layout(document);
        let bytes = write_pdf(document, &pages)?;
        debug!("Rendered {} page PDF ({} bytes)", pages.len(), bytes.len());
        Ok(bytes)
    }

    fn render_images(
        &self,
        document: &Document,
        format: ImageFormat,
        dpi: u32,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let width = (PAGE_WIDTH_PT / 72.0 * dpi as f32).round() as u32;
        let height = (PAGE_HEIGHT_PT / 72.0 * dpi as f32).round() as u32;
        if u64::from(width) * u64::from(height) > MAX_PAGE_PIXELS {
            return Err(Error::Render(format!(
                "{width}x{height} pixel page at {dpi} dpi exceeds the {MAX_PAGE_PIXELS} pixel limit"
            )));
        }

        let scale = dpi as f32 / 72.0;
        layout(document)
            .iter()
            .map(|page| {
                let raster = rasterize(document, page, width, height, scale);
                encode(raster, format)
            })
            .collect()
    }
}

/// Splits the body into pages at page breaks and lays out each page.
///
/// Lines that do not fit on a page are dropped, so the page count always
/// matches [`Document::page_count`].
fn layout(document: &Document) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut lines = Vec::new();

    for block in &document.blocks {
        let lines = &mut lines;
        match block {
            Block::Heading { text, level } => {
                let size = (24.0 - 2.0 * f32::from(level.saturating_sub(1))).max(BODY_FONT_SIZE);
                wrap(lines, text, size, 0.0);
            }
            Block::Paragraph { text, style } => {
                let size = style
                    .as_ref()
                    .and_then(|style| style.font_size)
                    .map_or(BODY_FONT_SIZE, |size| size.clamp(6, 72) as f32);
                match style.as_ref().and_then(|style| style.ordered) {
                    Some(true) => wrap(lines, &format!("1. {text}"), size, 18.0),
                    Some(false) => wrap(lines, &format!("- {text}"), size, 18.0),
                    None => wrap(lines, text, size, 0.0),
                }
            }
            Block::Table { rows } => {
                for row in rows {
                    wrap(lines, &row.join(" | "), BODY_FONT_SIZE, 0.0);
                }
            }
            Block::List { items, ordered } => {
                for (index, item) in items.iter().enumerate() {
                    let text = if *ordered {
                        format!("{}. {item}", index + 1)
                    } else {
                        format!("- {item}")
                    };
                    wrap(lines, &text, BODY_FONT_SIZE, 18.0);
                }
            }
            Block::PageBreak => pages.push(Page {
                lines: std::mem::take(lines),
            }),
        }
    }
    pages.push(Page { lines });

    let available = PAGE_HEIGHT_PT - 2.0 * MARGIN_PT;
    for (number, page) in pages.iter_mut().enumerate() {
        let mut used = 0.0;
        let fitting = page
            .lines
            .iter()
            .take_while(|line| {
                used += line.size * LINE_SPACING;
                used <= available
            })
            .count();
        if fitting < page.lines.len() {
            debug!(
                "Page {} overflows; dropping {} lines",
                number + 1,
                page.lines.len() - fitting
            );
            page.lines.truncate(fitting);
        }
    }

    pages
}

/// Appends `text` to `lines`, word-wrapped to the body width.
fn wrap(lines: &mut Vec<Line>, text: &str, size: f32, indent: f32) {
    let width = PAGE_WIDTH_PT - 2.0 * MARGIN_PT - indent;
    let max_chars = ((width / (size * GLYPH_WIDTH)) as usize).max(1);

    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if !current.is_empty() && needed > max_chars {
            lines.push(Line {
                text: std::mem::take(&mut current),
                size,
                indent,
            });
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    lines.push(Line {
        text: current,
        size,
        indent,
    });
}

/// Escapes text for a PDF literal string. Helvetica here only covers
/// printable ASCII, so anything else becomes `?`.
fn pdf_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            _ => escaped.push('?'),
        }
    }
    escaped
}

fn text_op(stream: &mut String, text: &str, size: f32, x: f32, y: f32) -> std::fmt::Result {
    writeln!(
        stream,
        "BT /F1 {size:.1} Tf {x:.1} {y:.1} Td ({}) Tj ET",
        pdf_string(text)
    )
}

fn content_stream(document: &Document, page: &Page) -> Result<String, std::fmt::Error> {
    let mut stream = String::new();

    if let Some(header) = &document.header {
        text_op(&mut stream, header, BAND_FONT_SIZE, MARGIN_PT, PAGE_HEIGHT_PT - MARGIN_PT / 2.0)?;
    }

    let mut y = PAGE_HEIGHT_PT - MARGIN_PT;
    for line in &page.lines {
        y -= line.size * LINE_SPACING;
        text_op(&mut stream, &line.text, line.size, MARGIN_PT + line.indent, y)?;
    }

    if let Some(footer) = &document.footer {
        text_op(&mut stream, footer, BAND_FONT_SIZE, MARGIN_PT, MARGIN_PT / 2.0)?;
    }

    Ok(stream)
}

/// Writes a PDF 1.4 file with one page per laid-out page.
///
/// Object layout: 1 catalog, 2 page tree, 3 font, then a page object and
/// its content stream for each page.
fn write_pdf(document: &Document, pages: &[Page]) -> Result<Vec<u8>, Error> {
    let render_err = |e: std::fmt::Error| Error::Render(e.to_string());

    let mut objects = Vec::with_capacity(3 + 2 * pages.len());
    let kids = (0..pages.len())
        .map(|index| format!("{} 0 R", 4 + 2 * index))
        .collect::<Vec<_>>()
        .join(" ");

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {} >>",
        pages.len()
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    for (index, page) in pages.iter().enumerate() {
        let content = content_stream(document, page).map_err(render_err)?;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH_PT} {PAGE_HEIGHT_PT}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * index
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        writeln!(pdf, "{} 0 obj\n{object}\nendobj", index + 1).map_err(render_err)?;
    }

    let xref = pdf.len();
    writeln!(pdf, "xref\n0 {}\n0000000000 65535 f ", objects.len() + 1).map_err(render_err)?;
    for offset in offsets {
        writeln!(pdf, "{offset:010} 00000 n ").map_err(render_err)?;
    }
    write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    )
    .map_err(render_err)?;

    Ok(pdf.into_bytes())
}

/// Draws each line as a grey bar whose length follows the text length.
fn rasterize(document: &Document, page: &Page, width: u32, height: u32, scale: f32) -> GrayImage {
    let mut raster = GrayImage::from_pixel(width, height, Luma([255]));

    let mut bar = |text: &str, size: f32, x: f32, baseline: f32, shade: u8| {
        let length = text.chars().count() as f32 * size * GLYPH_WIDTH;
        let x0 = (x * scale) as u32;
        let x1 = (((x + length) * scale) as u32).min(width);
        let y1 = ((PAGE_HEIGHT_PT - baseline) * scale) as u32;
        let y0 = y1.saturating_sub((size * 0.7 * scale).max(1.0) as u32);
        for y in y0..y1.min(height) {
            for x in x0..x1 {
                raster.put_pixel(x, y, Luma([shade]));
            }
        }
    };

    if let Some(header) = &document.header {
        bar(header, BAND_FONT_SIZE, MARGIN_PT, PAGE_HEIGHT_PT - MARGIN_PT / 2.0, 160);
    }

    let mut y = PAGE_HEIGHT_PT - MARGIN_PT;
    for line in &page.lines {
        y -= line.size * LINE_SPACING;
        bar(&line.text, line.size, MARGIN_PT + line.indent, y, 64);
    }

    if let Some(footer) = &document.footer {
        bar(footer, BAND_FONT_SIZE, MARGIN_PT, MARGIN_PT / 2.0, 160);
    }

    raster
}

fn encode(raster: GrayImage, format: ImageFormat) -> Result<Vec<u8>, Error> {
    let format = match format {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
    };

    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(raster).write_to(&mut bytes, format)?;
    Ok(bytes.into_inner())
}
