//! Minimal page-layout engine over `lopdf`: text, rules, wrapped paragraphs
//! and tables with repeated headers, plus the per-page chrome (header,
//! footer, watermark).

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
pub const MARGIN_X: f32 = 30.0;
pub const MARGIN_Y: f32 = 72.0;
pub const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_X;

const WATERMARK: &str = "CONFIDENTIAL";
const WATERMARK_SIZE: f32 = 60.0;
const WATERMARK_ALPHA: f32 = 0.3;
const LINE_SPACING: f32 = 1.35;
const CELL_PADDING: f32 = 4.0;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("PDF encoding failed: {0}")]
    Encode(#[from] lopdf::Error),
    #[error("PDF write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub f32, pub f32, pub f32);

impl Color {
    pub const BLACK: Color = Color(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color(1.0, 1.0, 1.0);
    pub const GREY: Color = Color(0.5, 0.5, 0.5);
    pub const DARK_GREY: Color = Color(0.33, 0.33, 0.33);
    pub const LIGHT_GREY: Color = Color(0.83, 0.83, 0.83);
    pub const WHITE_SMOKE: Color = Color(0.96, 0.96, 0.96);
    pub const DARK_BLUE: Color = Color(0.0, 0.0, 0.55);
    pub const BLUE: Color = Color(0.0, 0.35, 0.8);
    pub const ORANGE: Color = Color(0.9, 0.5, 0.0);
    pub const GREEN: Color = Color(0.0, 0.55, 0.2);
    pub const RED: Color = Color(0.8, 0.1, 0.1);

    fn operands(self) -> Vec<Object> {
        vec![self.0.into(), self.1.into(), self.2.into()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
        }
    }
}

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

/// Approximate rendered width of `text` in points.
pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| {
            let code = c as u32;
            if (32..=126).contains(&code) {
                HELVETICA_WIDTHS[(code - 32) as usize] as u32
            } else {
                556
            }
        })
        .sum();
    let scale = match font {
        Font::Regular => 1.0,
        Font::Bold => 1.06,
    };
    units as f32 * size / 1000.0 * scale
}

/// WinAnsi bytes for the standard fonts. Anything outside Latin-1 becomes `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

/// Cuts `text` so it fits in `max_width`, ending with "...".
pub fn fit_text(text: &str, font: Font, size: f32, max_width: f32) -> String {
    if text_width(text, font, size) <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    for c in text.chars() {
        let candidate = format!("{out}{c}...");
        if text_width(&candidate, font, size) > max_width {
            break;
        }
        out.push(c);
    }
    format!("{}...", out.trim_end())
}

/// Greedy word wrap. Words longer than a line are split by character.
pub fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.replace("\r\n", "\n").split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if text_width(&candidate, font, size) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if text_width(word, font, size) <= max_width {
                line = word.to_string();
            } else {
                for c in word.chars() {
                    let next = format!("{line}{c}");
                    if text_width(&next, font, size) > max_width && !line.is_empty() {
                        lines.push(std::mem::take(&mut line));
                        line.push(c);
                    } else {
                        line = next;
                    }
                }
            }
        }
        lines.push(line);
    }
    lines
}

/// One table cell: text plus optional text color.
#[derive(Debug, Clone)]
pub struct Cell {
    pub text: String,
    pub color: Option<Color>,
    pub bold: bool,
}

impl Cell {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            bold: false,
        }
    }

    pub fn colored(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
            bold: true,
        }
    }
}

/// Accumulates pages of drawing operations; page chrome is added by
/// [`ReportBuilder::finish`] once the page count is known.
pub struct ReportBuilder {
    company: String,
    generated_at: String,
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl ReportBuilder {
    pub fn new(company: &str, generated_at: &str) -> Self {
        Self {
            company: company.to_string(),
            generated_at: generated_at.to_string(),
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN_Y,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN_Y;
    }

    /// Starts a new page unless `height` still fits. Returns true on a break.
    pub fn ensure_space(&mut self, height: f32) -> bool {
        if self.y - height < MARGIN_Y {
            self.new_page();
            true
        } else {
            false
        }
    }

    pub fn space(&mut self, height: f32) {
        self.y -= height;
        if self.y < MARGIN_Y {
            self.new_page();
        }
    }

    fn text_ops(ops: &mut Vec<Operation>, x: f32, y: f32, font: Font, size: f32, color: Color, text: &str) {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![font.resource().into(), size.into()]));
        ops.push(Operation::new("rg", color.operands()));
        ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        ops.push(Operation::new("Tj", vec![Object::string_literal(encode_text(text))]));
        ops.push(Operation::new("ET", vec![]));
    }

    fn line_ops(ops: &mut Vec<Operation>, from: (f32, f32), to: (f32, f32), width: f32, color: Color) {
        ops.push(Operation::new("w", vec![width.into()]));
        ops.push(Operation::new("RG", color.operands()));
        ops.push(Operation::new("m", vec![from.0.into(), from.1.into()]));
        ops.push(Operation::new("l", vec![to.0.into(), to.1.into()]));
        ops.push(Operation::new("S", vec![]));
    }

    fn rect_ops(ops: &mut Vec<Operation>, x: f32, y: f32, w: f32, h: f32, fill: Color) {
        ops.push(Operation::new("rg", fill.operands()));
        ops.push(Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]));
        ops.push(Operation::new("f", vec![]));
    }

    /// A single line of text at the cursor.
    pub fn line(&mut self, text: &str, font: Font, size: f32, color: Color) {
        let height = size * LINE_SPACING;
        self.ensure_space(height);
        self.y -= height;
        Self::text_ops(&mut self.current, MARGIN_X, self.y + size * 0.3, font, size, color, text);
    }

    pub fn heading(&mut self, text: &str, size: f32) {
        for line in wrap_text(text, Font::Bold, size, CONTENT_WIDTH) {
            self.line(&line, Font::Bold, size, Color::DARK_BLUE);
        }
        self.space(size * 0.4);
    }

    pub fn paragraph(&mut self, text: &str, size: f32, color: Color) {
        for line in wrap_text(text, Font::Regular, size, CONTENT_WIDTH) {
            self.line(&line, Font::Regular, size, color);
        }
    }

    /// Horizontal rule across the content width.
    pub fn rule(&mut self, color: Color) {
        self.space(6.0);
        Self::line_ops(
            &mut self.current,
            (MARGIN_X, self.y),
            (PAGE_WIDTH - MARGIN_X, self.y),
            0.5,
            color,
        );
        self.space(6.0);
    }

    fn table_row(&mut self, cells: &[Cell], widths: &[f32], size: f32, background: Option<Color>, header: bool) {
        let height = size + 2.0 * CELL_PADDING + 2.0;
        let total: f32 = widths.iter().sum();
        let top = self.y;
        let bottom = top - height;

        if let Some(fill) = background {
            Self::rect_ops(&mut self.current, MARGIN_X, bottom, total, height, fill);
        }

        let mut x = MARGIN_X;
        for (cell, width) in cells.iter().zip(widths) {
            let font = if header || cell.bold { Font::Bold } else { Font::Regular };
            let color = if header {
                Color::WHITE
            } else {
                cell.color.unwrap_or(Color::BLACK)
            };
            let text = fit_text(&cell.text, font, size, width - 2.0 * CELL_PADDING);
            Self::text_ops(
                &mut self.current,
                x + CELL_PADDING,
                bottom + CELL_PADDING + 2.0,
                font,
                size,
                color,
                &text,
            );
            Self::line_ops(&mut self.current, (x, top), (x, bottom), 0.5, Color::GREY);
            x += width;
        }
        Self::line_ops(&mut self.current, (x, top), (x, bottom), 0.5, Color::GREY);
        Self::line_ops(&mut self.current, (MARGIN_X, bottom), (MARGIN_X + total, bottom), 0.5, Color::GREY);
        if header {
            Self::line_ops(&mut self.current, (MARGIN_X, top), (MARGIN_X + total, top), 1.0, Color::DARK_BLUE);
        }
        self.y = bottom;
    }

    /// Table whose header row is repeated at the top of every page it spans.
    pub fn table(&mut self, headers: &[&str], widths: &[f32], rows: &[Vec<Cell>], size: f32) {
        let row_height = size + 2.0 * CELL_PADDING + 2.0;
        let header: Vec<Cell> = headers.iter().map(|h| Cell::plain(*h)).collect();

        self.ensure_space(row_height * 2.0);
        self.table_row(&header, widths, size, Some(Color::DARK_BLUE), true);

        for (i, row) in rows.iter().enumerate() {
            if self.ensure_space(row_height) {
                self.table_row(&header, widths, size, Some(Color::DARK_BLUE), true);
            }
            let background = if i % 2 == 1 { Some(Color::WHITE_SMOKE) } else { None };
            self.table_row(row, widths, size, background, false);
        }
        self.space(10.0);
    }

    fn watermark_ops() -> Vec<Operation> {
        let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();
        let half = text_width(WATERMARK, Font::Regular, WATERMARK_SIZE) / 2.0;
        let x = PAGE_WIDTH / 2.0 - half * cos;
        let y = PAGE_HEIGHT / 2.0 - half * sin;
        vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec!["GS1".into()]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Font::Regular.resource().into(), WATERMARK_SIZE.into()]),
            Operation::new("rg", Color::LIGHT_GREY.operands()),
            Operation::new(
                "Tm",
                vec![cos.into(), sin.into(), (-sin).into(), cos.into(), x.into(), y.into()],
            ),
            Operation::new("Tj", vec![Object::string_literal(encode_text(WATERMARK))]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]
    }

    fn chrome_ops(&self, page: usize, total: usize) -> Vec<Operation> {
        let mut ops = Vec::new();
        let right = PAGE_WIDTH - MARGIN_X;

        let header_y = PAGE_HEIGHT - MARGIN_Y + 30.0;
        Self::text_ops(&mut ops, MARGIN_X, header_y, Font::Bold, 12.0, Color::DARK_BLUE, &self.company);
        let stamp = format!("Generated: {}", self.generated_at);
        let stamp_x = right - text_width(&stamp, Font::Regular, 9.0);
        Self::text_ops(&mut ops, stamp_x, header_y, Font::Regular, 9.0, Color::DARK_GREY, &stamp);
        Self::line_ops(&mut ops, (MARGIN_X, header_y - 8.0), (right, header_y - 8.0), 1.0, Color::DARK_BLUE);

        let footer_y = MARGIN_Y - 42.0;
        Self::line_ops(&mut ops, (MARGIN_X, footer_y + 14.0), (right, footer_y + 14.0), 1.0, Color::DARK_BLUE);
        Self::text_ops(&mut ops, MARGIN_X, footer_y, Font::Regular, 8.0, Color::DARK_GREY, "CONFIDENTIAL - INTERNAL USE");
        let center = format!("Ticket System - {}", self.company);
        let center_x = PAGE_WIDTH / 2.0 - text_width(&center, Font::Regular, 8.0) / 2.0;
        Self::text_ops(&mut ops, center_x, footer_y, Font::Regular, 8.0, Color::DARK_GREY, &center);
        let numbering = format!("Page {page} of {total}");
        let numbering_x = right - text_width(&numbering, Font::Regular, 8.0);
        Self::text_ops(&mut ops, numbering_x, footer_y, Font::Regular, 8.0, Color::DARK_GREY, &numbering);
        ops
    }

    /// Serializes every page with watermark, header and footer.
    pub fn finish(mut self) -> Result<Vec<u8>, PdfError> {
        let last = std::mem::take(&mut self.current);
        self.pages.push(last);
        let total = self.pages.len();

        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let translucent = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => WATERMARK_ALPHA,
            "CA" => WATERMARK_ALPHA,
        });
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => regular, "F2" => bold },
            "ExtGState" => dictionary! { "GS1" => translucent },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(total);
        for (index, body) in std::mem::take(&mut self.pages).into_iter().enumerate() {
            let mut operations = Self::watermark_ops();
            operations.extend(body);
            operations.extend(self.chrome_ops(index + 1, total));

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(total as i64),
                "Resources" => resources,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(PAGE_WIDTH),
                    Object::Real(PAGE_HEIGHT),
                ],
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}
