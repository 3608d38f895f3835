use super::pdf::{FragmentWriter, PageSize, PdfFragment, LETTER, POINTS_PER_INCH};
use super::RenderError;
use lopdf::content::Operation;
use lopdf::{dictionary, Object, ObjectId, StringFormat};
use std::str::FromStr;

const FONT_SIZE: f32 = 14.0;
const LEADING: f32 = 17.0;
const CELL_PADDING_X: f32 = 6.0;
const CELL_PADDING_Y: f32 = 3.0;
const PAGE_MARGIN: f32 = POINTS_PER_INCH;
/// Blank space above the table on the first page
const LEAD_SPACE: f32 = 2.0 * POINTS_PER_INCH;
const LABEL_COLUMN: f32 = 1.5 * POINTS_PER_INCH;
const TITLE_COLUMN: f32 = 4.5 * POINTS_PER_INCH;
const RULE_GREY: f32 = 0.5;

/// Font the table of contents is set in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocFont {
    /// Adobe-GB1 `STSong-Light`, supplied by the viewer (not embedded)
    Cjk,
    /// Standard Type1 Helvetica, WinAnsi encoded
    Helvetica,
}

impl FromStr for TocFont {
    type Err = RenderError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cjk" | "stsong" | "stsong-light" => Ok(TocFont::Cjk),
            "helvetica" => Ok(TocFont::Helvetica),
            other => Err(RenderError::MissingFont(other.to_string())),
        }
    }
}

impl TocFont {
    fn name(self) -> &'static str {
        match self {
            TocFont::Cjk => "STSong-Light",
            TocFont::Helvetica => "Helvetica",
        }
    }

    /// Add the font to the fragment, returning the font dictionary's id
    fn add_to(self, writer: &mut FragmentWriter) -> ObjectId {
        match self {
            TocFont::Cjk => {
                let descriptor_id = writer.add_object(dictionary! {
                    "Type" => "FontDescriptor",
                    "FontName" => "STSong-Light",
                    "Flags" => 6,
                    "FontBBox" => vec![(-25).into(), (-254).into(), 1000.into(), 880.into()],
                    "ItalicAngle" => 0,
                    "Ascent" => 880,
                    "Descent" => -120,
                    "CapHeight" => 880,
                    "StemV" => 93,
                });
                writer.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type0",
                    "BaseFont" => "STSong-Light",
                    "Encoding" => "UniGB-UCS2-H",
                    "DescendantFonts" => vec![Object::Dictionary(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "CIDFontType0",
                        "BaseFont" => "STSong-Light",
                        "CIDSystemInfo" => dictionary! {
                            "Registry" => Object::string_literal("Adobe"),
                            "Ordering" => Object::string_literal("GB1"),
                            "Supplement" => 2,
                        },
                        "FontDescriptor" => descriptor_id,
                        "DW" => 1000,
                        // Half-width ASCII range
                        "W" => vec![1.into(), 95.into(), 500.into()],
                    })],
                })
            }
            TocFont::Helvetica => writer.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }),
        }
    }

    /// Approximate advance width of a character in em
    fn advance(self, ch: char) -> f32 {
        match self {
            TocFont::Cjk => {
                if ch.is_ascii() {
                    0.5
                } else {
                    1.0
                }
            }
            TocFont::Helvetica => match ch {
                ' ' | 'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '!' | '|' | '\'' => 0.278,
                'f' | 't' | 'r' | 'I' | '(' | ')' | '-' => 0.333,
                'm' | 'M' | 'W' => 0.833,
                'w' => 0.722,
                c if c.is_ascii_uppercase() => 0.667,
                _ => 0.556,
            },
        }
    }

    fn encode(self, text: &str) -> Result<Object, RenderError> {
        match self {
            TocFont::Cjk => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for ch in text.chars() {
                    let code = u16::try_from(ch as u32).map_err(|_| RenderError::Unencodable {
                        ch,
                        font: self.name(),
                    })?;
                    bytes.extend_from_slice(&code.to_be_bytes());
                }
                Ok(Object::String(bytes, StringFormat::Hexadecimal))
            }
            TocFont::Helvetica => {
                let bytes = text
                    .chars()
                    .map(|ch| match u8::try_from(ch as u32) {
                        // C1 controls are not Latin-1 in WinAnsi
                        Ok(byte) if !(0x80..=0x9F).contains(&byte) => Ok(byte),
                        _ => Err(RenderError::Unencodable {
                            ch,
                            font: self.name(),
                        }),
                    })
                    .collect::<Result<Vec<u8>, _>>()?;
                Ok(Object::String(bytes, StringFormat::Literal))
            }
        }
    }

    fn text_width(self, text: &str) -> f32 {
        text.chars().map(|ch| self.advance(ch) * FONT_SIZE).sum()
    }
}

/// How chapter labels and titles are set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocStyle {
    pub font: TocFont,
    /// Label for each row; `{n}` is replaced by the chapter number
    pub label_template: String,
}

impl Default for TocStyle {
    fn default() -> Self {
        TocStyle {
            font: TocFont::Cjk,
            label_template: "第{n}章".to_string(),
        }
    }
}

/// One row of the table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocRow {
    pub number: usize,
    pub label: String,
    pub title: String,
}

struct LaidOutRow {
    label: String,
    title_lines: Vec<String>,
    height: f32,
}

/// Renders the table of contents pages of a collection document
#[derive(Debug, Clone, Default)]
pub struct TableOfContentsBuilder {
    style: TocStyle,
}

impl TableOfContentsBuilder {
    pub fn new(style: TocStyle) -> Self {
        TableOfContentsBuilder { style }
    }

    /// Rows for the given titles, numbered from 1 in the order given
    pub fn rows<S: AsRef<str>>(&self, titles: &[S]) -> Vec<TocRow> {
        titles
            .iter()
            .enumerate()
            .map(|(i, title)| TocRow {
                number: i + 1,
                label: self.style.label_template.replace("{n}", &(i + 1).to_string()),
                title: title.as_ref().trim().to_string(),
            })
            .collect()
    }

    /// Lay the table out over as many Letter pages as it needs
    pub fn build<S: AsRef<str>>(&self, titles: &[S]) -> Result<PdfFragment, RenderError> {
        let font = self.style.font;
        let rows = self
            .rows(titles)
            .into_iter()
            .map(|row| self.lay_out(row))
            .collect::<Vec<_>>();
        let pages = paginate(rows, LETTER)?;

        let mut writer = FragmentWriter::new();
        let font_id = font.add_to(&mut writer);
        let resources_id = writer.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let table_x = PAGE_MARGIN + (LETTER.width - 2.0 * PAGE_MARGIN - LABEL_COLUMN - TITLE_COLUMN) / 2.0;

        for (page_index, page_rows) in pages.iter().enumerate() {
            let mut top = table_top(page_index, LETTER);
            let mut grid = vec![
                Operation::new("q", vec![]),
                Operation::new("G", vec![RULE_GREY.into()]),
                Operation::new("w", vec![1.into()]),
            ];
            let mut text = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            ];
            let mut cursor = (0.0f32, 0.0f32);

            for row in page_rows {
                let bottom = top - row.height;
                grid.push(rectangle(table_x, bottom, LABEL_COLUMN, row.height));
                grid.push(rectangle(table_x + LABEL_COLUMN, bottom, TITLE_COLUMN, row.height));

                let first_baseline = top - CELL_PADDING_Y - FONT_SIZE;
                let mut place = |x: f32, y: f32, content: &str| -> Result<(), RenderError> {
                    text.push(Operation::new("Td", vec![(x - cursor.0).into(), (y - cursor.1).into()]));
                    text.push(Operation::new("Tj", vec![font.encode(content)?]));
                    cursor = (x, y);
                    Ok(())
                };
                place(table_x + CELL_PADDING_X, first_baseline, &row.label)?;
                for (line_index, line) in row.title_lines.iter().enumerate() {
                    let baseline = first_baseline - line_index as f32 * LEADING;
                    place(table_x + LABEL_COLUMN + CELL_PADDING_X, baseline, line)?;
                }

                top = bottom;
            }

            grid.push(Operation::new("S", vec![]));
            grid.push(Operation::new("Q", vec![]));
            text.push(Operation::new("ET", vec![]));

            let mut operations = Vec::new();
            if !page_rows.is_empty() {
                operations.extend(grid);
                operations.extend(text);
            }
            writer.add_page(LETTER, resources_id, operations)?;
        }

        writer.finish()
    }

    fn lay_out(&self, row: TocRow) -> LaidOutRow {
        let title_lines = wrap(self.style.font, &row.title, TITLE_COLUMN - 2.0 * CELL_PADDING_X);
        let height = title_lines.len() as f32 * LEADING + 2.0 * CELL_PADDING_Y;
        LaidOutRow {
            label: row.label,
            title_lines,
            height,
        }
    }
}

fn table_top(page_index: usize, page: PageSize) -> f32 {
    if page_index == 0 {
        page.height - PAGE_MARGIN - LEAD_SPACE
    } else {
        page.height - PAGE_MARGIN
    }
}

/// Split rows into pages; rows are never split and the first page is
/// always emitted, even without rows
fn paginate(rows: Vec<LaidOutRow>, page: PageSize) -> Result<Vec<Vec<LaidOutRow>>, RenderError> {
    let mut pages: Vec<Vec<LaidOutRow>> = vec![Vec::new()];
    let mut available = table_top(0, page) - PAGE_MARGIN;

    for row in rows {
        if row.height > available {
            let fresh_page = table_top(pages.len(), page) - PAGE_MARGIN;
            if row.height > fresh_page {
                return Err(RenderError::RowTooTall(row.title_lines.concat()));
            }
            pages.push(Vec::new());
            available = fresh_page;
        }
        available -= row.height;
        if let Some(current) = pages.last_mut() {
            current.push(row);
        }
    }

    Ok(pages)
}

fn rectangle(x: f32, y: f32, width: f32, height: f32) -> Operation {
    Operation::new(
        "re",
        vec![x.into(), y.into(), width.into(), height.into()],
    )
}

/// Greedy line breaking, preferring the last space on an overfull line
fn wrap(font: TocFont, text: &str, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut width = 0.0;

    for ch in text.chars() {
        let advance = font.advance(ch) * FONT_SIZE;
        if width + advance > max_width && !line.is_empty() {
            match line.rfind(' ').filter(|&pos| pos > 0) {
                Some(pos) => {
                    let rest = line[pos + 1..].to_string();
                    line.truncate(pos);
                    lines.push(std::mem::replace(&mut line, rest));
                }
                None => lines.push(std::mem::take(&mut line)),
            }
            width = font.text_width(&line);
            if width + advance > max_width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                width = 0.0;
            }
        }
        if line.is_empty() && ch == ' ' {
            continue;
        }
        line.push(ch);
        width += advance;
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}
