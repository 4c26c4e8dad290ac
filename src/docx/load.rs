use std::path::Path;

use anyhow::{anyhow, Context};

use super::model::{
    Document, Paragraph, RunSlot, RunSpan, RunStyle, StyledRun, Table, TableCell, TableRow,
};
use super::package::DocxPackage;
use super::xml::{attr_value, parse_events, XmlEvent};

impl Document {
    /// Reads the package from storage and indexes its body paragraphs and tables.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let package = DocxPackage::read(path)?;
        let events = parse_events(package.main_document()?)
            .with_context(|| format!("parse main document: {}", path.display()))?;
        let (paragraphs, tables) = index_body(&events)?;
        Ok(Self {
            paragraphs,
            tables,
            package: Some(package),
            events,
        })
    }
}

#[derive(Default)]
struct RunBuilder {
    start: usize,
    depth: usize,
    text: String,
    style: RunStyle,
    rpr_start: Option<usize>,
    rpr: Option<(usize, usize)>,
}

#[derive(Default)]
struct CellBuilder {
    start: usize,
    depth: usize,
    paragraphs: Vec<String>,
    tc_pr_start: Option<usize>,
    tc_pr: Option<(usize, usize)>,
    /// Text of the direct paragraph currently open in the cell.
    para: Option<String>,
    /// Depth of the `w:r` currently open inside that paragraph.
    run_depth: Option<usize>,
}

/// Walk state of `index_body`. Depth is the element stack height *after* entering an
/// element, so `w:body` sits at 2 and body-level blocks at 3.
#[derive(Default)]
struct BodyIndex {
    paragraphs: Vec<Paragraph>,
    tables: Vec<Table>,
    in_body: bool,
    para: Option<Paragraph>,
    run: Option<RunBuilder>,
    table_depth: Option<usize>,
    cell: Option<CellBuilder>,
}

const BLOCK_DEPTH: usize = 3;

fn index_body(events: &[XmlEvent]) -> anyhow::Result<(Vec<Paragraph>, Vec<Table>)> {
    let mut index = BodyIndex::default();
    let mut stack: Vec<&str> = Vec::new();

    for (idx, ev) in events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => {
                let is_empty = matches!(ev, XmlEvent::Empty { .. });
                let name = name.as_str();
                let depth = stack.len() + 1;
                index.open(idx, name, attrs, depth, is_empty);
                if is_empty {
                    index.close(idx, name, depth)?;
                } else {
                    stack.push(name);
                }
            }
            XmlEvent::End { name } => {
                let name = name.as_str();
                let depth = stack.len();
                let open = stack
                    .pop()
                    .ok_or_else(|| anyhow!("unbalanced end tag </{name}> at event {idx}"))?;
                if open != name {
                    return Err(anyhow!(
                        "mismatched end tag </{name}> for <{open}> at event {idx}"
                    ));
                }
                index.close(idx, name, depth)?;
            }
            XmlEvent::Text { text } => {
                if stack.last().copied() == Some("w:t") {
                    index.text(text, stack.len());
                }
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(anyhow!("unclosed elements: {}", stack.join(" > ")));
    }
    Ok((index.paragraphs, index.tables))
}

impl BodyIndex {
    fn open(
        &mut self,
        idx: usize,
        name: &str,
        attrs: &[(String, String)],
        depth: usize,
        is_empty: bool,
    ) {
        if name == "w:body" && depth == 2 {
            self.in_body = true;
        }

        if self.in_body && depth == BLOCK_DEPTH && name == "w:p" {
            self.para = Some(Paragraph::default());
        } else if self.in_body && depth == BLOCK_DEPTH && name == "w:tbl" {
            self.table_depth = Some(depth);
            self.tables.push(Table::default());
        }

        if self.para.is_some() && self.run.is_none() && name == "w:r" && depth == BLOCK_DEPTH + 1 {
            self.run = Some(RunBuilder {
                start: idx,
                depth,
                ..RunBuilder::default()
            });
        }
        if let Some(r) = self.run.as_mut() {
            if name == "w:rPr" && depth == r.depth + 1 {
                r.rpr_start = Some(idx);
                if is_empty {
                    r.rpr = Some((idx, idx));
                }
            } else if r.rpr_start.is_some() && r.rpr.is_none() && depth == r.depth + 2 {
                read_run_property(&mut r.style, name, attrs);
            } else if depth == r.depth + 1 {
                control_text(&mut r.text, name, attrs);
            }
        }

        if let Some(td) = self.table_depth {
            if name == "w:tr" && depth == td + 1 {
                if let Some(t) = self.tables.last_mut() {
                    t.rows.push(TableRow::default());
                }
            } else if name == "w:tc" && depth == td + 2 {
                self.cell = Some(CellBuilder {
                    start: idx,
                    depth,
                    ..CellBuilder::default()
                });
            }
        }
        if let Some(c) = self.cell.as_mut() {
            if name == "w:tcPr" && depth == c.depth + 1 {
                c.tc_pr_start = Some(idx);
                if is_empty {
                    c.tc_pr = Some((idx, idx));
                }
            } else if name == "w:p" && depth == c.depth + 1 {
                c.para = Some(String::new());
            } else if let Some(buf) = c.para.as_mut() {
                // Only run content counts; `w:pPr` also holds `w:tab` (tab stops).
                match c.run_depth {
                    None if name == "w:r" => c.run_depth = Some(depth),
                    Some(rd) if depth == rd + 1 => control_text(buf, name, attrs),
                    _ => {}
                }
            }
        }
    }

    fn close(&mut self, idx: usize, name: &str, depth: usize) -> anyhow::Result<()> {
        if name == "w:body" && depth == 2 {
            self.in_body = false;
        }

        if let Some(r) = self.run.as_mut() {
            if name == "w:rPr" && depth == r.depth + 1 {
                if let Some(start) = r.rpr_start {
                    r.rpr = Some((start, idx));
                }
            }
            if name == "w:r" && depth == r.depth {
                if let (Some(r), Some(p)) = (self.run.take(), self.para.as_mut()) {
                    let mut slot = RunSlot::new(StyledRun::new(r.text, r.style));
                    slot.span = RunSpan {
                        start: r.start,
                        end: idx,
                        rpr: r.rpr,
                    };
                    p.runs.push(slot);
                }
            }
        }

        if name == "w:p" && depth == BLOCK_DEPTH {
            if let Some(mut p) = self.para.take() {
                p.end = idx;
                self.paragraphs.push(p);
            }
        }

        if let Some(c) = self.cell.as_mut() {
            if name == "w:tcPr" && depth == c.depth + 1 {
                if let Some(start) = c.tc_pr_start {
                    c.tc_pr = Some((start, idx));
                }
            }
            if name == "w:r" && c.run_depth == Some(depth) {
                c.run_depth = None;
            }
            if name == "w:p" && depth == c.depth + 1 {
                if let Some(text) = c.para.take() {
                    c.paragraphs.push(text);
                }
            }
            if name == "w:tc" && depth == c.depth {
                if let Some(c) = self.cell.take() {
                    let row = self
                        .tables
                        .last_mut()
                        .and_then(|t| t.rows.last_mut())
                        .ok_or_else(|| anyhow!("table cell outside of a row at event {idx}"))?;
                    row.cells.push(TableCell {
                        text: c.paragraphs.join("\n"),
                        replacement: None,
                        start: c.start,
                        end: idx,
                        tc_pr: c.tc_pr,
                    });
                }
            }
        }

        if name == "w:tbl" && self.table_depth == Some(depth) {
            self.table_depth = None;
        }
        Ok(())
    }

    /// `depth` is the depth of the enclosing `w:t`.
    fn text(&mut self, text: &str, depth: usize) {
        if let Some(r) = self.run.as_mut() {
            if depth == r.depth + 1 {
                r.text.push_str(text);
            }
        }
        if let Some(buf) = self.cell.as_mut().and_then(|c| c.para.as_mut()) {
            buf.push_str(text);
        }
    }
}

fn read_run_property(style: &mut RunStyle, name: &str, attrs: &[(String, String)]) {
    match name {
        "w:b" => style.bold = Some(on_off(attrs)),
        "w:i" => style.italic = Some(on_off(attrs)),
        "w:u" => {
            let val = attr_value(attrs, "w:val");
            style.underline = Some(!matches!(val.as_deref(), Some("none")));
        }
        "w:rFonts" => {
            if let Some(font) = attr_value(attrs, "w:ascii").filter(|f| !f.trim().is_empty()) {
                style.font_family = Some(font);
            }
        }
        "w:sz" => {
            let half_points = attr_value(attrs, "w:val").and_then(|v| v.trim().parse::<u32>().ok());
            if let Some(half_points) = half_points {
                style.font_size = Some(half_points as f32 / 2.0);
            }
        }
        "w:color" => {
            style.color_rgb = attr_value(attrs, "w:val").and_then(|v| parse_rgb(&v));
        }
        _ => {}
    }
}

/// `<w:b/>` and `<w:b w:val="true"/>` are on; `0`, `false` and `off` switch it off.
fn on_off(attrs: &[(String, String)]) -> bool {
    match attr_value(attrs, "w:val") {
        None => true,
        Some(v) => !matches!(v.trim(), "0" | "false" | "off"),
    }
}

pub(crate) fn parse_rgb(val: &str) -> Option<u32> {
    let val = val.trim();
    if val.len() != 6 {
        return None;
    }
    u32::from_str_radix(val, 16).ok()
}

fn control_text(buf: &mut String, name: &str, attrs: &[(String, String)]) {
    match name {
        "w:tab" | "w:ptab" => buf.push('\t'),
        "w:cr" => buf.push('\n'),
        "w:br" => {
            let br_type = attr_value(attrs, "w:type");
            if br_type.as_deref().unwrap_or("textWrapping") == "textWrapping" {
                buf.push('\n');
            }
        }
        "w:noBreakHyphen" => buf.push('-'),
        _ => {}
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::index_body;
    use crate::docx::xml::parse_events;

    pub(crate) const W_NS: &str =
        "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    pub(crate) fn wrap_body(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        )
    }

    #[test]
    fn reads_runs_and_styles() {
        let xml = wrap_body(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial"/><w:b/><w:i w:val="0"/><w:color w:val="FF0000"/><w:sz w:val="24"/><w:u w:val="single"/></w:rPr><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t><w:tab/><w:t>!</w:t></w:r></w:p>"#,
        );
        let events = parse_events(xml.as_bytes()).expect("parse");
        let (paras, tables) = index_body(&events).expect("index");
        assert!(tables.is_empty());
        assert_eq!(paras.len(), 1);

        let p = &paras[0];
        assert_eq!(p.runs.len(), 2);
        assert_eq!(p.text(), "Hello world\t!");

        let s = &p.runs[0].original.style;
        assert_eq!(s.bold, Some(true));
        assert_eq!(s.italic, Some(false));
        assert_eq!(s.underline, Some(true));
        assert_eq!(s.font_family.as_deref(), Some("Arial"));
        assert_eq!(s.font_size, Some(12.0));
        assert_eq!(s.color_rgb, Some(0xFF0000));

        assert!(p.runs[1].original.style.is_empty());
        assert!(p.runs[1].span.rpr.is_none());
    }

    #[test]
    fn only_body_level_blocks_are_indexed() {
        let xml = wrap_body(
            r#"<w:p><w:hyperlink><w:r><w:t>link</w:t></w:r></w:hyperlink><w:r><w:t>direct</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:tcPr><w:tcW w:w="100"/></w:tcPr><w:p><w:r><w:t>A</w:t></w:r></w:p><w:p><w:r><w:t>B</w:t></w:r></w:p></w:tc><w:tc><w:p/></w:tc></w:tr></w:tbl><w:p/>"#,
        );
        let events = parse_events(xml.as_bytes()).expect("parse");
        let (paras, tables) = index_body(&events).expect("index");

        // Table paragraphs are not body paragraphs.
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].text(), "direct");
        assert!(paras[1].runs.is_empty());

        assert_eq!(tables.len(), 1);
        let row = &tables[0].rows[0];
        assert_eq!(row.cells.len(), 2);
        assert_eq!(row.cells[0].text, "A\nB");
        assert!(row.cells[0].tc_pr.is_some());
        assert_eq!(row.cells[1].text, "");
    }

    #[test]
    fn nested_table_cells_are_not_rows_of_the_outer_table() {
        let xml = wrap_body(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>outer</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>inner</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p/></w:tc></w:tr></w:tbl>"#,
        );
        let events = parse_events(xml.as_bytes()).expect("parse");
        let (_, tables) = index_body(&events).expect("index");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 1);
        assert_eq!(tables[0].rows[0].cells.len(), 1);
        assert_eq!(tables[0].rows[0].cells[0].text, "outer\n");
    }

    #[test]
    fn cell_tab_stops_do_not_leak_into_text() {
        let xml = wrap_body(
            r#"<w:tbl><w:tr><w:tc><w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/><w:tab w:val="center" w:pos="1440"/></w:tabs></w:pPr><w:r><w:t>Hello</w:t></w:r></w:p></w:tc><w:tc><w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/></w:r><w:hyperlink><w:r><w:t>c</w:t></w:r></w:hyperlink></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let events = parse_events(xml.as_bytes()).expect("parse");
        let (_, tables) = index_body(&events).expect("index");
        let cells = &tables[0].rows[0].cells;
        assert_eq!(cells[0].text, "Hello");
        assert_eq!(cells[1].text, "a\tb\nc");
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        let events = parse_events(b"<w:document><w:body></w:document>");
        // quick-xml already refuses mismatched end tags; either layer may report it.
        if let Ok(events) = events {
            assert!(index_body(&events).is_err());
        }
    }
}
