use serde::Serialize;

use crate::docx::model::Document;
use crate::error::TranslateError;
use crate::runs::translate_slot;
use crate::translate::{LanguageCode, Translator};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub paragraphs: usize,
    pub runs: usize,
    pub cells: usize,
}

impl WalkStats {
    pub fn add(&mut self, other: WalkStats) {
        self.paragraphs += other.paragraphs;
        self.runs += other.runs;
        self.cells += other.cells;
    }
}

pub fn translate_document(
    doc: &mut Document,
    src: &LanguageCode,
    tgt: &LanguageCode,
    translator: &mut dyn Translator,
) -> Result<WalkStats, TranslateError> {
    translate_document_with(doc, src, tgt, translator, &mut |_, _| {})
}

/// Translates every non-blank body paragraph run by run, then every non-blank table
/// cell as plain text. `on_unit(done, total)` is called after each paragraph or cell.
///
/// The first failing call aborts the walk; the document is then partially translated
/// and must be discarded.
pub fn translate_document_with(
    doc: &mut Document,
    src: &LanguageCode,
    tgt: &LanguageCode,
    translator: &mut dyn Translator,
    on_unit: &mut dyn FnMut(usize, usize),
) -> Result<WalkStats, TranslateError> {
    for code in [src, tgt] {
        if !translator.supports(code) {
            return Err(TranslateError::InvalidLanguageCode(code.to_string()));
        }
    }

    let total = doc.paragraphs.iter().filter(|p| !p.is_blank()).count()
        + doc.cells().filter(|c| !c.text.trim().is_empty()).count();
    let mut stats = WalkStats::default();
    let mut done = 0usize;

    for para in doc.paragraphs.iter_mut().filter(|p| !p.is_blank()) {
        for slot in para.runs.iter_mut() {
            translate_slot(slot, src, tgt, translator)?;
            stats.runs += 1;
        }
        stats.paragraphs += 1;
        done += 1;
        on_unit(done, total);
    }

    let cells = doc
        .tables
        .iter_mut()
        .flat_map(|t| t.rows.iter_mut())
        .flat_map(|r| r.cells.iter_mut());
    for cell in cells.filter(|c| !c.text.trim().is_empty()) {
        cell.replacement = Some(translator.translate(&cell.text, src, tgt)?);
        stats.cells += 1;
        done += 1;
        on_unit(done, total);
    }

    Ok(stats)
}
