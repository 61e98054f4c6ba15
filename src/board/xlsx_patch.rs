//! In-place editing of an xlsx package.
//!
//! Only the patched cells of one worksheet are rewritten. The other parts of the
//! package (other sheets, themes, drawings, defined names) are copied as they are,
//! and a patched cell keeps the style it had, so number formats, fonts and
//! borders stay where they were in the sheet.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{Cursor, Read, Write};

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::board::grid::Cell;
use crate::board::*;

const CALC_CHAIN: &str = "xl/calcChain.xml";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const STYLES: &str = "xl/styles.xml";
const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";

#[derive(Debug)]
pub enum XmlError {
    Xml(quick_xml::Error),
    Attr(AttrError),
    Io(std::io::Error),
    Invalid(String),
}

impl Display for XmlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XmlError::Xml(e) => write!(f, "xml error: {}", e),
            XmlError::Attr(e) => write!(f, "xml attribute error: {}", e),
            XmlError::Io(e) => write!(f, "io error: {}", e),
            XmlError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for XmlError {}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError::Xml(e)
    }
}

impl From<AttrError> for XmlError {
    fn from(e: AttrError) -> Self {
        XmlError::Attr(e)
    }
}

impl From<std::io::Error> for XmlError {
    fn from(e: std::io::Error) -> Self {
        XmlError::Io(e)
    }
}

type XmlResult<T> = Result<T, XmlError>;

/// Fill change on a patched cell.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum FillPatch {
    /// Solid fill in the highlight colour.
    Highlight,
    /// No fill.
    Clear,
}

/// New content for one cell. The style of the cell is kept, apart from the fill.
#[derive(PartialEq, Debug, Clone)]
pub struct CellPatch {
    pub value: Cell,
    pub fill: Option<FillPatch>,
}

/// The cell edits of one worksheet, keyed by (row, column), both starting at 0.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SheetPatches {
    cells: BTreeMap<(u32, u32), CellPatch>,
}

impl SheetPatches {
    pub fn set(&mut self, row: usize, col: usize, patch: CellPatch) {
        self.cells.insert((row as u32, col as u32), patch);
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&CellPatch> {
        self.cells.get(&(row as u32, col as u32))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    // Rows are numbered from 1 here, as in the sheet xml.
    fn by_row(&self) -> BTreeMap<u32, Vec<(u32, &CellPatch)>> {
        let mut rows: BTreeMap<u32, Vec<(u32, &CellPatch)>> = BTreeMap::new();
        for (&(row, col), patch) in self.cells.iter() {
            rows.entry(row + 1).or_default().push((col, patch));
        }
        rows
    }
}

/// The name of a cell ("B3") from its row and column, both starting at 0.
pub fn cell_name(row: u32, col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        letters.push((b'A' + ((n - 1) % 26) as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect::<String>() + &(row + 1).to_string()
}

/// The row and column (both starting at 0) of a cell name.
pub fn parse_cell_name(name: &str) -> Option<(u32, u32)> {
    let split = name.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = name.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let col = letters
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + (b - b'A' + 1) as u32);
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

/// The parts of a zip package, in their original order.
struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

impl Package {
    fn read(path: &str) -> BoardResult<Package> {
        let file = File::open(path)
            .map_err(ZipError::Io)
            .context(ReadingPackageSnafu { path })?;
        let mut archive = ZipArchive::new(file).context(ReadingPackageSnafu { path })?;
        let mut parts = Vec::new();
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx).context(ReadingPackageSnafu { path })?;
            if !entry.is_file() {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(ZipError::Io)
                .context(ReadingPackageSnafu { path })?;
            parts.push((name, bytes));
        }
        debug!("Package::read: {} parts in {:?}", parts.len(), path);
        Ok(Package { parts })
    }

    fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some(part) => part.1 = bytes,
            None => self.parts.push((name.to_string(), bytes)),
        }
    }

    fn remove_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|(n, _)| n != name);
        self.parts.len() != before
    }

    // The archive is built in memory so that a failure leaves no partial file.
    fn write(&self, path: &str) -> BoardResult<()> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in self.parts.iter() {
            zip.start_file(name.as_str(), options)
                .context(WritingExcelSnafu { path })?;
            zip.write_all(bytes)
                .map_err(ZipError::Io)
                .context(WritingExcelSnafu { path })?;
        }
        let cursor = zip.finish().context(WritingExcelSnafu { path })?;
        fs::write(path, cursor.into_inner())
            .map_err(ZipError::Io)
            .context(WritingExcelSnafu { path })?;
        Ok(())
    }
}

/// Copies the workbook at `input` to `output` with the cells of `sheet_name` patched.
///
/// Patched cells that had a formula lose it. In that case the calculation chain is
/// dropped so that spreadsheet programs rebuild it.
pub fn patch_workbook(
    input: &str,
    output: &str,
    sheet_name: &str,
    patches: &SheetPatches,
    highlight_rgb: u32,
) -> BoardResult<()> {
    let mut package = Package::read(input)?;
    let sheet_part = worksheet_part(&package, sheet_name, input)?;
    info!(
        "patch_workbook: {} cells to patch in {:?} ({})",
        patches.len(),
        sheet_name,
        sheet_part
    );

    let (sheet_xml, styles_xml, formula_removed) = {
        let sheet = package.part(&sheet_part).context(MissingPartSnafu {
            part: sheet_part.as_str(),
            path: input,
        })?;
        let styles = package
            .part(STYLES)
            .context(MissingPartSnafu { part: STYLES, path: input })?;
        let mut style_table =
            StyleTable::read(styles, highlight_rgb).context(PatchingPartSnafu { part: STYLES })?;
        let (sheet_xml, formula_removed) = patch_worksheet(sheet, patches, &mut style_table)
            .context(PatchingPartSnafu {
                part: sheet_part.as_str(),
            })?;
        let styles_xml = style_table
            .write(styles)
            .context(PatchingPartSnafu { part: STYLES })?;
        (sheet_xml, styles_xml, formula_removed)
    };

    package.set_part(&sheet_part, sheet_xml);
    if let Some(styles_xml) = styles_xml {
        package.set_part(STYLES, styles_xml);
    }
    if formula_removed {
        drop_calc_chain(&mut package)?;
    }
    package.write(output)?;
    info!("patch_workbook: wrote {:?}", output);
    Ok(())
}

fn worksheet_part(package: &Package, sheet_name: &str, path: &str) -> BoardResult<String> {
    let workbook = package
        .part(WORKBOOK)
        .context(MissingPartSnafu { part: WORKBOOK, path })?;
    let rel_id = find_element_attribute(workbook, b"sheet", b"name", sheet_name, b"id")
        .context(PatchingPartSnafu { part: WORKBOOK })?
        .context(MissingSheetSnafu {
            sheet: sheet_name,
            path,
        })?;
    let rels = package
        .part(WORKBOOK_RELS)
        .context(MissingPartSnafu {
            part: WORKBOOK_RELS,
            path,
        })?;
    let target = find_element_attribute(rels, b"Relationship", b"Id", &rel_id, b"Target")
        .context(PatchingPartSnafu {
            part: WORKBOOK_RELS,
        })?
        .context(MissingPartSnafu {
            part: rel_id.as_str(),
            path,
        })?;
    Ok(match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    })
}

fn drop_calc_chain(package: &mut Package) -> BoardResult<()> {
    if !package.remove_part(CALC_CHAIN) {
        return Ok(());
    }
    info!("drop_calc_chain: formulas were replaced, removing {}", CALC_CHAIN);
    if let Some(rels) = package.part(WORKBOOK_RELS) {
        let rels = drop_elements(rels, b"Relationship", b"Target", "calcChain.xml").context(
            PatchingPartSnafu {
                part: WORKBOOK_RELS,
            },
        )?;
        package.set_part(WORKBOOK_RELS, rels);
    }
    if let Some(types) = package.part(CONTENT_TYPES) {
        let types = drop_elements(types, b"Override", b"PartName", "calcChain.xml").context(
            PatchingPartSnafu {
                part: CONTENT_TYPES,
            },
        )?;
        package.set_part(CONTENT_TYPES, types);
    }
    Ok(())
}

/// The fills and cell formats of `styles.xml`, plus the formats added by patching.
struct StyleTable {
    fill_count: u32,
    xfs: Vec<Vec<Event<'static>>>,
    highlight_rgb: u32,
    highlight_fill: Option<u32>,
    added: Vec<Vec<Event<'static>>>,
    derived: BTreeMap<(u32, FillPatch), u32>,
}

impl StyleTable {
    fn read(xml: &[u8], highlight_rgb: u32) -> XmlResult<StyleTable> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut fill_count = 0u32;
        let mut in_fills = false;
        let mut in_cell_xfs = false;
        let mut depth = 0usize;
        let mut xfs: Vec<Vec<Event<'static>>> = Vec::new();
        loop {
            let ev = reader.read_event_into(&mut buf)?.into_owned();
            buf.clear();
            if depth > 0 {
                match &ev {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth -= 1,
                    _ => {}
                }
                if let Some(xf) = xfs.last_mut() {
                    xf.push(ev);
                }
                continue;
            }
            match ev {
                Event::Start(ref e) if local_name(e.name().as_ref()) == b"fills" => in_fills = true,
                Event::End(ref e) if local_name(e.name().as_ref()) == b"fills" => in_fills = false,
                Event::Start(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    in_cell_xfs = true
                }
                Event::End(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    in_cell_xfs = false
                }
                Event::Start(ref e) | Event::Empty(ref e)
                    if in_fills && local_name(e.name().as_ref()) == b"fill" =>
                {
                    fill_count += 1;
                }
                Event::Start(ref e) if in_cell_xfs && local_name(e.name().as_ref()) == b"xf" => {
                    depth = 1;
                    xfs.push(vec![ev.clone()]);
                }
                Event::Empty(ref e) if in_cell_xfs && local_name(e.name().as_ref()) == b"xf" => {
                    xfs.push(vec![ev.clone()]);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        debug!("StyleTable::read: {} fills, {} cell formats", fill_count, xfs.len());
        Ok(StyleTable {
            fill_count,
            xfs,
            highlight_rgb,
            highlight_fill: None,
            added: Vec::new(),
            derived: BTreeMap::new(),
        })
    }

    fn format(&self, style: u32) -> Option<&Vec<Event<'static>>> {
        let idx = style as usize;
        match idx.checked_sub(self.xfs.len()) {
            Some(added) => self.added.get(added),
            None => self.xfs.get(idx),
        }
    }

    /// The cell format to use for a cell of format `style` once `fill` is applied.
    fn style_for(&mut self, style: u32, fill: FillPatch) -> XmlResult<u32> {
        let base = self
            .format(style)
            .cloned()
            .ok_or_else(|| XmlError::Invalid(format!("unknown cell format {}", style)))?;
        let current_fill = match base.first() {
            Some(Event::Start(e)) | Some(Event::Empty(e)) => attribute(e, b"fillId")?
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0),
            _ => 0,
        };
        let target_fill = match fill {
            FillPatch::Clear => 0,
            FillPatch::Highlight => match self.highlight_fill {
                Some(id) => id,
                None => {
                    self.highlight_fill = Some(self.fill_count);
                    self.fill_count
                }
            },
        };
        if current_fill == target_fill {
            return Ok(style);
        }
        if let Some(idx) = self.derived.get(&(style, fill)) {
            return Ok(*idx);
        }

        let fill_id = target_fill.to_string();
        let mut xf = base.clone();
        xf[0] = match &xf[0] {
            Event::Start(e) => Event::Start(with_attribute(
                &with_attribute(e, "fillId", &fill_id)?,
                "applyFill",
                "1",
            )?),
            Event::Empty(e) => Event::Empty(with_attribute(
                &with_attribute(e, "fillId", &fill_id)?,
                "applyFill",
                "1",
            )?),
            other => other.clone(),
        };
        let idx = (self.xfs.len() + self.added.len()) as u32;
        debug!(
            "style_for: cell format {} with fill {} becomes format {}",
            style, target_fill, idx
        );
        self.added.push(xf);
        self.derived.insert((style, fill), idx);
        Ok(idx)
    }

    /// The updated `styles.xml`, or nothing if no format was added.
    fn write(&self, xml: &[u8]) -> XmlResult<Option<Vec<u8>>> {
        if self.added.is_empty() {
            return Ok(None);
        }
        let mut reader = Reader::from_reader(xml);
        let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"fills" => {
                    let count = self.fill_count.to_string();
                    writer.write_event(Event::Start(with_attribute(&e, "count", &count)?))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"fills" => {
                    if self.highlight_fill.is_some() {
                        writer.get_mut().extend_from_slice(
                            format!(
                                r#"<fill><patternFill patternType="solid"><fgColor rgb="FF{:06X}"/><bgColor indexed="64"/></patternFill></fill>"#,
                                self.highlight_rgb
                            )
                            .as_bytes(),
                        );
                    }
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::Start(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    let count = (self.xfs.len() + self.added.len()).to_string();
                    writer.write_event(Event::Start(with_attribute(&e, "count", &count)?))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    for xf in self.added.iter() {
                        for ev in xf.iter() {
                            writer.write_event(ev.clone())?;
                        }
                    }
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::Eof => break,
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
        Ok(Some(writer.into_inner()))
    }
}

/// Rewrites the patched cells of a worksheet. Returns the new xml and whether a
/// formula was replaced.
fn patch_worksheet(
    xml: &[u8],
    patches: &SheetPatches,
    styles: &mut StyleTable,
) -> XmlResult<(Vec<u8>, bool)> {
    let rows = patches.by_row();
    let mut pending = rows.iter().peekable();
    let mut formula_removed = false;

    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + patches.len() * 64));
    let mut buf = Vec::new();
    let mut in_sheet_data = false;
    loop {
        let ev = reader.read_event_into(&mut buf)?.into_owned();
        buf.clear();
        match ev {
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                in_sheet_data = true;
                writer.write_event(ev.clone())?;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                writer.write_event(Event::Start(e.clone()))?;
                for (row, cells) in pending.by_ref() {
                    write_new_row(&mut writer, *row, cells, styles)?;
                }
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                for (row, cells) in pending.by_ref() {
                    write_new_row(&mut writer, *row, cells, styles)?;
                }
                in_sheet_data = false;
                writer.write_event(ev.clone())?;
            }
            Event::Start(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row_num = row_number(e)?;
                while let Some((row, cells)) = pending.next_if(|(row, _)| Some(**row) < row_num) {
                    write_new_row(&mut writer, *row, cells, styles)?;
                }
                match pending.next_if(|(row, _)| Some(**row) == row_num) {
                    Some((row, cells)) => {
                        writer.write_event(Event::Start(without_attribute(e, b"spans")?))?;
                        formula_removed |= patch_row(&mut reader, &mut writer, *row, cells, styles)?;
                    }
                    None => writer.write_event(ev.clone())?,
                }
            }
            Event::Empty(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row_num = row_number(e)?;
                while let Some((row, cells)) = pending.next_if(|(row, _)| Some(**row) < row_num) {
                    write_new_row(&mut writer, *row, cells, styles)?;
                }
                match pending.next_if(|(row, _)| Some(**row) == row_num) {
                    Some((row, cells)) => {
                        writer.write_event(Event::Start(without_attribute(e, b"spans")?))?;
                        for (col, patch) in cells.iter() {
                            write_cell(&mut writer, *row, *col, patch, 0, styles)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new("row")))?;
                    }
                    None => writer.write_event(ev.clone())?,
                }
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }
    Ok((writer.into_inner(), formula_removed))
}

// Called after the start of a patched row. Consumes the row up to its end.
fn patch_row(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &CellPatch)],
    styles: &mut StyleTable,
) -> XmlResult<bool> {
    let mut pending = cells.iter().peekable();
    let mut formula_removed = false;
    let mut buf = Vec::new();
    loop {
        let ev = reader.read_event_into(&mut buf)?.into_owned();
        buf.clear();
        match ev {
            Event::Start(ref e) | Event::Empty(ref e) if local_name(e.name().as_ref()) == b"c" => {
                let is_start = matches!(ev, Event::Start(_));
                let position = attribute(e, b"r")?.and_then(|r| parse_cell_name(&r));
                let col = match position {
                    Some((row, col)) if row + 1 == row_num => col,
                    // Cells without a usable reference are left alone.
                    _ => {
                        writer.write_event(ev.clone())?;
                        continue;
                    }
                };
                while let Some((c, patch)) = pending.next_if(|(c, _)| *c < col) {
                    write_cell(writer, row_num, *c, patch, 0, styles)?;
                }
                match pending.next_if(|(c, _)| *c == col) {
                    Some((c, patch)) => {
                        let style = attribute(e, b"s")?
                            .and_then(|s| s.parse::<u32>().ok())
                            .unwrap_or(0);
                        if is_start {
                            formula_removed |= skip_cell(reader)?;
                        }
                        write_cell(writer, row_num, *c, patch, style, styles)?;
                    }
                    None => writer.write_event(ev.clone())?,
                }
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"row" => {
                for (c, patch) in pending.by_ref() {
                    write_cell(writer, row_num, *c, patch, 0, styles)?;
                }
                writer.write_event(ev.clone())?;
                return Ok(formula_removed);
            }
            Event::Eof => {
                return Err(XmlError::Invalid(format!(
                    "unexpected end of the sheet in row {}",
                    row_num
                )))
            }
            other => writer.write_event(other)?,
        }
    }
}

// Skips the content of a cell up to its end. Returns whether it held a formula.
fn skip_cell(reader: &mut Reader<&[u8]>) -> XmlResult<bool> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    let mut formula = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                formula |= depth == 1 && local_name(e.name().as_ref()) == b"f";
                depth += 1;
            }
            Event::Empty(e) => {
                formula |= depth == 1 && local_name(e.name().as_ref()) == b"f";
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(formula);
                }
            }
            Event::Eof => return Err(XmlError::Invalid("unexpected end of a cell".to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &CellPatch)],
    styles: &mut StyleTable,
) -> XmlResult<()> {
    let mut row = BytesStart::new("row");
    row.push_attribute(("r", row_num.to_string().as_str()));
    writer.write_event(Event::Start(row))?;
    for (col, patch) in cells.iter() {
        write_cell(writer, row_num, *col, patch, 0, styles)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    col: u32,
    patch: &CellPatch,
    style: u32,
    styles: &mut StyleTable,
) -> XmlResult<()> {
    let style = match patch.fill {
        Some(fill) => styles.style_for(style, fill)?,
        None => style,
    };
    let mut c = BytesStart::new("c");
    c.push_attribute(("r", cell_name(row_num - 1, col).as_str()));
    if style != 0 {
        c.push_attribute(("s", style.to_string().as_str()));
    }
    match &patch.value {
        Cell::Empty => {
            writer.write_event(Event::Empty(c))?;
            return Ok(());
        }
        Cell::Number(_) => {}
        Cell::Bool(_) => c.push_attribute(("t", "b")),
        Cell::Text(_) => c.push_attribute(("t", "inlineStr")),
    }
    writer.write_event(Event::Start(c))?;
    match &patch.value {
        Cell::Number(x) => write_text_element(writer, "v", &x.to_string())?,
        Cell::Bool(b) => write_text_element(writer, "v", if *b { "1" } else { "0" })?,
        Cell::Text(s) => {
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut t = BytesStart::new("t");
            if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
                t.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(s)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
        Cell::Empty => {}
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> XmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Finds the first `element` whose `key` attribute is `value` and returns its `wanted` attribute.
fn find_element_attribute(
    xml: &[u8],
    element: &[u8],
    key: &[u8],
    value: &str,
    wanted: &[u8],
) -> XmlResult<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == element => {
                if attribute(&e, key)?.as_deref() == Some(value) {
                    return attribute(&e, wanted);
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

/// Removes the `element`s whose `key` attribute ends with `suffix`.
fn drop_elements(xml: &[u8], element: &[u8], key: &[u8], suffix: &str) -> XmlResult<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut skipping = 0usize;
    loop {
        let ev = reader.read_event_into(&mut buf)?.into_owned();
        buf.clear();
        if skipping > 0 {
            match ev {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }
        let dropped = match &ev {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == element => {
                attribute(e, key)?.map_or(false, |v| v.ends_with(suffix))
            }
            _ => false,
        };
        if dropped {
            if matches!(ev, Event::Start(_)) {
                skipping = 1;
            }
            continue;
        }
        match ev {
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }
    Ok(writer.into_inner())
}

fn row_number(e: &BytesStart<'_>) -> XmlResult<Option<u32>> {
    Ok(attribute(e, b"r")?.and_then(|r| r.parse::<u32>().ok()))
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> XmlResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

// A copy of the tag with `key` set to `value`. Attribute order is kept.
fn with_attribute(e: &BytesStart<'_>, key: &str, value: &str) -> XmlResult<BytesStart<'static>> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    let mut found = false;
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            out.push_attribute((key, value));
            found = true;
        } else {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    if !found {
        out.push_attribute((key, value));
    }
    Ok(out)
}

fn without_attribute(e: &BytesStart<'_>, key: &[u8]) -> XmlResult<BytesStart<'static>> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != key {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    Ok(out)
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES_XML: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/></numFmts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"><alignment horizontal="center"/></xf></cellXfs><dxfs count="1"><dxf><fill><patternFill><bgColor rgb="FF00FF00"/></patternFill></fill></dxf></dxfs></styleSheet>"#;

    const SHEET_XML: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1" spans="1:3"><c r="A1" s="1"><v>45000</v></c></row><row r="2" spans="1:3"><c r="A2"><v>1</v></c><c r="B2" t="s"><v>0</v></c><c r="C2"><f>SUM(C4:C5)</f><v>9</v></c></row><row r="4"><c r="B4" s="1" t="s"><v>1</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A1:C1"/></mergeCells></worksheet>"#;

    fn text(value: &str) -> CellPatch {
        CellPatch {
            value: Cell::Text(value.to_string()),
            fill: None,
        }
    }

    #[test]
    fn cell_names() {
        assert_eq!(cell_name(0, 0), "A1");
        assert_eq!(cell_name(2, 1), "B3");
        assert_eq!(cell_name(9, 25), "Z10");
        assert_eq!(cell_name(0, 26), "AA1");
        assert_eq!(cell_name(0, 701), "ZZ1");
        assert_eq!(parse_cell_name("AA1"), Some((0, 26)));
        assert_eq!(parse_cell_name("B3"), Some((2, 1)));
        assert_eq!(parse_cell_name("B0"), None);
        assert_eq!(parse_cell_name("12"), None);
    }

    #[test]
    fn highlight_adds_one_fill_and_derived_formats() {
        let mut styles = StyleTable::read(STYLES_XML.as_bytes(), 0xFF0000).unwrap();
        assert_eq!(styles.fill_count, 2);
        assert_eq!(styles.xfs.len(), 2);
        assert_eq!(styles.style_for(0, FillPatch::Clear).unwrap(), 0);
        assert_eq!(styles.style_for(0, FillPatch::Highlight).unwrap(), 2);
        assert_eq!(styles.style_for(1, FillPatch::Highlight).unwrap(), 3);
        assert_eq!(styles.style_for(0, FillPatch::Highlight).unwrap(), 2);
        // Formats that already carry the highlight are kept.
        assert_eq!(styles.style_for(3, FillPatch::Highlight).unwrap(), 3);

        let out = String::from_utf8(styles.write(STYLES_XML.as_bytes()).unwrap().unwrap()).unwrap();
        assert!(out.contains(r#"<fills count="3">"#));
        assert!(out.contains(r#"<fgColor rgb="FFFF0000"/>"#));
        assert!(out.contains(r#"<cellXfs count="4">"#));
        assert!(out.contains(
            r#"<xf numFmtId="164" fontId="0" fillId="2" borderId="0" xfId="0" applyNumberFormat="1" applyFill="1"><alignment horizontal="center"/></xf></cellXfs>"#
        ));
        // The fill of the differential format is not a cell fill.
        assert!(out.contains(r#"<bgColor rgb="FF00FF00"/>"#));
    }

    #[test]
    fn unchanged_styles_are_not_rewritten() {
        let mut styles = StyleTable::read(STYLES_XML.as_bytes(), 0xFF0000).unwrap();
        assert_eq!(styles.style_for(1, FillPatch::Clear).unwrap(), 1);
        assert!(styles.write(STYLES_XML.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn patched_cells_keep_their_format() {
        let mut styles = StyleTable::read(STYLES_XML.as_bytes(), 0xFF0000).unwrap();
        let mut patches = SheetPatches::default();
        patches.set(1, 1, text("Bea & co"));
        patches.set(1, 2, CellPatch {
            value: Cell::Number(12.5),
            fill: None,
        });
        patches.set(3, 1, CellPatch {
            value: Cell::Text("Zed".to_string()),
            fill: Some(FillPatch::Highlight),
        });
        patches.set(2, 0, CellPatch {
            value: Cell::Number(3.0),
            fill: None,
        });
        patches.set(3, 3, CellPatch {
            value: Cell::Empty,
            fill: None,
        });

        let (out, formula_removed) =
            patch_worksheet(SHEET_XML.as_bytes(), &patches, &mut styles).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(formula_removed);
        // Untouched cells and parts.
        assert!(out.contains(r#"<row r="1" spans="1:3"><c r="A1" s="1"><v>45000</v></c></row>"#));
        assert!(out.contains(r#"<c r="A2"><v>1</v></c>"#));
        assert!(out.contains(r#"<mergeCell ref="A1:C1"/>"#));
        // Patched cells.
        assert!(out.contains(r#"<row r="2"><c r="A2">"#));
        assert!(out.contains(r#"<c r="B2" t="inlineStr"><is><t>Bea &amp; co</t></is></c>"#));
        assert!(out.contains(r#"<c r="C2"><v>12.5</v></c>"#));
        assert!(!out.contains("SUM(C4:C5)"));
        // A new row goes between the existing ones.
        assert!(out.contains(r#"</row><row r="3"><c r="A3"><v>3</v></c></row><row r="4">"#));
        // The date format of B4 is kept under the highlight.
        assert!(out.contains(
            r#"<c r="B4" s="2" t="inlineStr"><is><t>Zed</t></is></c><c r="D4"/></row>"#
        ));
    }

    #[test]
    fn rows_after_the_last_one_are_appended() {
        let mut styles = StyleTable::read(STYLES_XML.as_bytes(), 0xFF0000).unwrap();
        let mut patches = SheetPatches::default();
        patches.set(6, 0, CellPatch {
            value: Cell::Bool(true),
            fill: None,
        });
        let (out, formula_removed) =
            patch_worksheet(SHEET_XML.as_bytes(), &patches, &mut styles).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(!formula_removed);
        assert!(out.contains(r#"<row r="7"><c r="A7" t="b"><v>1</v></c></row></sheetData>"#));
        assert!(out.contains("SUM(C4:C5)"));
    }

    #[test]
    fn calc_chain_entries_are_dropped() {
        let rels = r#"<Relationships><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="calcChain" Target="calcChain.xml"/></Relationships>"#;
        let out = drop_elements(rels.as_bytes(), b"Relationship", b"Target", "calcChain.xml").unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("worksheets/sheet1.xml"));
        assert!(!out.contains("calcChain"));

        assert_eq!(
            find_element_attribute(rels.as_bytes(), b"Relationship", b"Id", "rId1", b"Target")
                .unwrap(),
            Some("worksheets/sheet1.xml".to_string())
        );
        assert_eq!(
            find_element_attribute(rels.as_bytes(), b"Relationship", b"Id", "rId9", b"Target")
                .unwrap(),
            None
        );
    }
}
