use serde::Serialize;

use super::package::DocxPackage;
use super::xml::XmlEvent;

/// Character formatting carried by a run. `None` means "inherit", which is distinct
/// from an explicit `Some(false)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunStyle {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub font_family: Option<String>,
    /// Points.
    pub font_size: Option<f32>,
    pub color_rgb: Option<u32>,
}

impl RunStyle {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StyledRun {
    pub text: String,
    pub style: RunStyle,
}

impl StyledRun {
    pub fn new(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// Event indices of a `w:r` element inside the main document part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct RunSpan {
    pub start: usize,
    pub end: usize,
    pub rpr: Option<(usize, usize)>,
}

/// An original run plus what translation did to it.
///
/// The original stays in place; when `cleared` it is written back with its
/// properties but without content. `appended` is the translated counterpart and is
/// written after every original run of the paragraph.
#[derive(Clone, Debug, Serialize)]
pub struct RunSlot {
    pub original: StyledRun,
    pub cleared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appended: Option<StyledRun>,
    #[serde(skip)]
    pub(crate) span: RunSpan,
}

impl RunSlot {
    pub fn new(original: StyledRun) -> Self {
        Self {
            original,
            cleared: false,
            appended: None,
            span: RunSpan::default(),
        }
    }
}

/// A run as it ends up in the saved document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputRun<'a> {
    /// Original run, `text` is empty when it was cleared.
    Kept { text: &'a str, style: &'a RunStyle },
    Appended(&'a StyledRun),
}

impl OutputRun<'_> {
    pub fn text(&self) -> &str {
        match self {
            Self::Kept { text, .. } => text,
            Self::Appended(run) => &run.text,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Paragraph {
    pub runs: Vec<RunSlot>,
    /// Event index of the paragraph's closing tag.
    #[serde(skip)]
    pub(crate) end: usize,
}

impl Paragraph {
    pub fn from_runs(runs: impl IntoIterator<Item = StyledRun>) -> Self {
        Self {
            runs: runs.into_iter().map(RunSlot::new).collect(),
            end: 0,
        }
    }

    /// Concatenated text of the original runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.original.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.original.text.trim().is_empty())
    }

    pub fn is_translated(&self) -> bool {
        self.runs.iter().any(|r| r.cleared || r.appended.is_some())
    }

    /// Final run order: every original (possibly cleared) in place, then the appended
    /// runs in the order their originals appear.
    pub fn output_runs(&self) -> Vec<OutputRun<'_>> {
        let kept = self.runs.iter().map(|r| OutputRun::Kept {
            text: if r.cleared { "" } else { r.original.text.as_str() },
            style: &r.original.style,
        });
        let appended = self
            .runs
            .iter()
            .filter_map(|r| r.appended.as_ref())
            .map(OutputRun::Appended);
        kept.chain(appended).collect()
    }

    pub fn output_text(&self) -> String {
        self.output_runs().iter().map(|r| r.text()).collect()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TableCell {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(skip)]
    pub(crate) start: usize,
    #[serde(skip)]
    pub(crate) end: usize,
    #[serde(skip)]
    pub(crate) tc_pr: Option<(usize, usize)>,
}

impl TableCell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn output_text(&self) -> &str {
        self.replacement.as_deref().unwrap_or(&self.text)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

/// Body-level paragraphs and tables of one DOCX, bound to the package they were read
/// from. Load a new instance for every pass; a document is never translated twice.
pub struct Document {
    pub paragraphs: Vec<Paragraph>,
    pub tables: Vec<Table>,
    pub(crate) package: Option<DocxPackage>,
    pub(crate) events: Vec<XmlEvent>,
}

#[derive(Serialize)]
pub struct DocumentOutline<'a> {
    pub paragraphs: &'a [Paragraph],
    pub tables: &'a [Table],
}

impl Document {
    /// A detached document with no backing package (cannot be saved).
    pub fn detached(paragraphs: Vec<Paragraph>, tables: Vec<Table>) -> Self {
        Self {
            paragraphs,
            tables,
            package: None,
            events: Vec::new(),
        }
    }

    pub fn outline(&self) -> DocumentOutline<'_> {
        DocumentOutline {
            paragraphs: &self.paragraphs,
            tables: &self.tables,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = &TableCell> {
        self.tables
            .iter()
            .flat_map(|t| t.rows.iter())
            .flat_map(|r| r.cells.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::{OutputRun, Paragraph, RunStyle, StyledRun};

    fn bold() -> RunStyle {
        RunStyle {
            bold: Some(true),
            ..RunStyle::default()
        }
    }

    #[test]
    fn output_runs_keep_cleared_originals_before_appended() {
        let mut p = Paragraph::from_runs([
            StyledRun::new("Hello ", bold()),
            StyledRun::new("world", RunStyle::default()),
        ]);
        for slot in &mut p.runs {
            slot.appended = Some(StyledRun::new(
                slot.original.text.to_uppercase(),
                slot.original.style.clone(),
            ));
            slot.cleared = true;
        }

        let out = p.output_runs();
        assert_eq!(out.len(), 4);
        assert!(matches!(out[0], OutputRun::Kept { text: "", .. }));
        assert!(matches!(out[1], OutputRun::Kept { text: "", .. }));
        assert_eq!(out[2].text(), "HELLO ");
        assert_eq!(out[3].text(), "WORLD");
        assert_eq!(p.output_text(), "HELLO WORLD");
        // Source text stays readable after clearing.
        assert_eq!(p.text(), "Hello world");
    }

    #[test]
    fn blank_detection_uses_all_runs() {
        let p = Paragraph::from_runs([
            StyledRun::new("  ", RunStyle::default()),
            StyledRun::new("\t", bold()),
        ]);
        assert!(p.is_blank());
        let p = Paragraph::from_runs([
            StyledRun::new(" ", RunStyle::default()),
            StyledRun::new("x", RunStyle::default()),
        ]);
        assert!(!p.is_blank());
    }
}
