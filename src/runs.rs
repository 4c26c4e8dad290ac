//! Run-level translation that keeps character formatting.

use crate::docx::model::{RunSlot, StyledRun};
use crate::error::TranslateError;
use crate::translate::{LanguageCode, Translator};

pub const TRADEMARK: char = '™';

/// Letter case of a whole text, judged on cased characters only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Casing {
    Upper,
    Lower,
    /// Mixed case, or no cased characters at all.
    Other,
}

pub fn casing_of(text: &str) -> Casing {
    let mut upper = false;
    let mut lower = false;
    for ch in text.chars() {
        upper |= ch.is_uppercase();
        lower |= ch.is_lowercase();
    }
    match (upper, lower) {
        (true, false) => Casing::Upper,
        (false, true) => Casing::Lower,
        _ => Casing::Other,
    }
}

pub fn apply_casing(text: &str, casing: Casing) -> String {
    match casing {
        Casing::Upper => text.to_uppercase(),
        Casing::Lower => text.to_lowercase(),
        Casing::Other => text.to_string(),
    }
}

/// The model tends to spell `™` out as `TM`. Only that substitution is undone, and
/// only when the source actually had the glyph.
pub fn restore_trademark(source: &str, translated: &str) -> String {
    if source.contains(TRADEMARK) && translated.contains("TM") {
        translated.replace("TM", "™")
    } else {
        translated.to_string()
    }
}

/// Translates one run into a new run with the same style. `run` is left untouched.
pub fn translate_run(
    run: &StyledRun,
    src: &LanguageCode,
    tgt: &LanguageCode,
    translator: &mut dyn Translator,
) -> Result<StyledRun, TranslateError> {
    let translated = translator.translate(&run.text, src, tgt)?;
    let translated = restore_trademark(&run.text, &translated);
    let text = apply_casing(&translated, casing_of(&run.text));
    Ok(StyledRun::new(text, run.style.clone()))
}

/// Attaches the translated run to `slot` and clears the original in place.
pub fn translate_slot(
    slot: &mut RunSlot,
    src: &LanguageCode,
    tgt: &LanguageCode,
    translator: &mut dyn Translator,
) -> Result<(), TranslateError> {
    let translated = translate_run(&slot.original, src, tgt, translator)?;
    slot.appended = Some(translated);
    slot.cleared = true;
    Ok(())
}
