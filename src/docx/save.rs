use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context};

use super::model::{Document, OutputRun, Paragraph, RunSlot, RunStyle, StyledRun, TableCell};
use super::package::MAIN_DOCUMENT_PART;
use super::xml::{write_events, XmlEvent};

/// Replace `events[start..=end]` with `events`.
struct Splice {
    start: usize,
    end: usize,
    events: Vec<XmlEvent>,
}

impl Document {
    /// Writes the document to `path`. Untouched parts and elements are copied as read.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let package = self
            .package
            .as_ref()
            .context("document has no backing package")?;
        let events = self.render_events()?;
        let bytes = write_events(&events).context("serialize main document")?;
        let mut replacements = HashMap::new();
        replacements.insert(MAIN_DOCUMENT_PART.to_string(), bytes);
        package.write_with_replacements(path, &replacements)
    }

    pub(crate) fn render_events(&self) -> anyhow::Result<Vec<XmlEvent>> {
        let mut splices: Vec<Splice> = Vec::new();
        for p in self.paragraphs.iter().filter(|p| p.is_translated()) {
            paragraph_splices(&self.events, p, &mut splices)?;
        }
        for cell in self.cells() {
            if let Some(text) = cell.replacement.as_deref() {
                splices.push(cell_splice(&self.events, cell, text)?);
            }
        }
        splices.sort_by_key(|s| s.start);

        let mut out: Vec<XmlEvent> = Vec::with_capacity(self.events.len());
        let mut cursor = 0usize;
        for s in splices {
            if s.start < cursor || s.end >= self.events.len() {
                return Err(anyhow!(
                    "overlapping or out-of-range edit at events {}..={}",
                    s.start,
                    s.end
                ));
            }
            out.extend_from_slice(&self.events[cursor..s.start]);
            out.extend(s.events);
            cursor = s.end + 1;
        }
        out.extend_from_slice(&self.events[cursor..]);
        Ok(out)
    }
}

/// Cleared originals shrink to their run properties in place; appended runs go right
/// before `</w:p>`, in the order `Paragraph::output_runs` yields them.
fn paragraph_splices(
    events: &[XmlEvent],
    p: &Paragraph,
    splices: &mut Vec<Splice>,
) -> anyhow::Result<()> {
    for slot in p.runs.iter().filter(|r| r.cleared) {
        splices.push(Splice {
            start: slot.span.start,
            end: slot.span.end,
            events: cleared_run_events(events, slot)?,
        });
    }

    let mut tail: Vec<XmlEvent> = Vec::new();
    for run in p.output_runs() {
        if let OutputRun::Appended(run) = run {
            tail.extend(styled_run_events(run));
        }
    }
    if tail.is_empty() {
        return Ok(());
    }
    // Paragraphs without runs have nothing to translate, so the end is always a close tag.
    let Some(end @ XmlEvent::End { .. }) = events.get(p.end) else {
        return Err(anyhow!("paragraph end not found at event {}", p.end));
    };
    tail.push(end.clone());
    splices.push(Splice {
        start: p.end,
        end: p.end,
        events: tail,
    });
    Ok(())
}

fn cleared_run_events(events: &[XmlEvent], slot: &RunSlot) -> anyhow::Result<Vec<XmlEvent>> {
    let span = slot.span;
    let open = events
        .get(span.start)
        .with_context(|| format!("run start out of range: {}", span.start))?;
    let (name, attrs) = match open {
        XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => (name, attrs),
        _ => return Err(anyhow!("expected run element at event {}", span.start)),
    };
    if matches!(open, XmlEvent::Empty { .. }) {
        return Ok(vec![open.clone()]);
    }
    let mut out = vec![XmlEvent::Start {
        name: name.clone(),
        attrs: attrs.clone(),
    }];
    if let Some((a, b)) = span.rpr {
        out.extend_from_slice(&events[a..=b]);
    }
    out.push(XmlEvent::End { name: name.clone() });
    Ok(out)
}

fn cell_splice(events: &[XmlEvent], cell: &TableCell, text: &str) -> anyhow::Result<Splice> {
    let open = events
        .get(cell.start)
        .with_context(|| format!("cell start out of range: {}", cell.start))?;
    let (name, attrs) = match open {
        XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => (name, attrs),
        _ => return Err(anyhow!("expected table cell at event {}", cell.start)),
    };
    let mut out = vec![XmlEvent::Start {
        name: name.clone(),
        attrs: attrs.clone(),
    }];
    if let Some((a, b)) = cell.tc_pr {
        out.extend_from_slice(&events[a..=b]);
    }
    out.push(XmlEvent::start("w:p", &[]));
    out.extend(styled_run_events(&StyledRun::new(text, RunStyle::default())));
    out.push(XmlEvent::end("w:p"));
    out.push(XmlEvent::End { name: name.clone() });
    Ok(Splice {
        start: cell.start,
        end: cell.end,
        events: out,
    })
}

/// `w:r` for a run, properties in schema order (rFonts, b, i, color, sz, u).
pub(crate) fn styled_run_events(run: &StyledRun) -> Vec<XmlEvent> {
    let mut out = vec![XmlEvent::start("w:r", &[])];
    let style = &run.style;
    if !style.is_empty() {
        out.push(XmlEvent::start("w:rPr", &[]));
        if let Some(font) = style.font_family.as_deref() {
            out.push(XmlEvent::empty(
                "w:rFonts",
                &[("w:ascii", font), ("w:hAnsi", font)],
            ));
        }
        if let Some(b) = style.bold {
            out.push(toggle("w:b", b));
        }
        if let Some(i) = style.italic {
            out.push(toggle("w:i", i));
        }
        if let Some(rgb) = style.color_rgb {
            let hex = format!("{:06X}", rgb & 0x00FF_FFFF);
            out.push(XmlEvent::empty("w:color", &[("w:val", hex.as_str())]));
        }
        if let Some(pt) = style.font_size {
            let half_points = ((pt * 2.0).round().max(1.0) as u32).to_string();
            out.push(XmlEvent::empty("w:sz", &[("w:val", half_points.as_str())]));
        }
        if let Some(u) = style.underline {
            out.push(XmlEvent::empty(
                "w:u",
                &[("w:val", if u { "single" } else { "none" })],
            ));
        }
        out.push(XmlEvent::end("w:rPr"));
    }
    push_run_text(&mut out, &run.text);
    out.push(XmlEvent::end("w:r"));
    out
}

fn toggle(name: &str, on: bool) -> XmlEvent {
    if on {
        XmlEvent::empty(name, &[])
    } else {
        XmlEvent::empty(name, &[("w:val", "0")])
    }
}

/// Tabs become `w:tab`, line breaks `w:br`; everything else lands in `w:t` elements.
fn push_run_text(out: &mut Vec<XmlEvent>, text: &str) {
    let mut buf = String::new();
    let flush = |out: &mut Vec<XmlEvent>, buf: &mut String| {
        if buf.is_empty() {
            return;
        }
        out.push(XmlEvent::start("w:t", &[("xml:space", "preserve")]));
        out.push(XmlEvent::text(buf));
        out.push(XmlEvent::end("w:t"));
        buf.clear();
    };
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\t' => {
                flush(out, &mut buf);
                out.push(XmlEvent::empty("w:tab", &[]));
            }
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                flush(out, &mut buf);
                out.push(XmlEvent::empty("w:br", &[]));
            }
            _ => buf.push(ch),
        }
    }
    flush(out, &mut buf);
}
