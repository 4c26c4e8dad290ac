use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TranslateError;
use crate::languages::{self, Language};

#[cfg(feature = "native")]
pub mod native;

/// A registry-backed language code. Only codes the registry knows can be constructed,
/// so an unknown name never reaches a translator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LanguageCode(Language);

impl LanguageCode {
    pub fn of(language: Language) -> Self {
        Self(language)
    }

    pub fn parse(code: &str) -> Result<Self, TranslateError> {
        languages::by_code(code)
            .map(Self)
            .ok_or_else(|| TranslateError::InvalidLanguageCode(code.trim().to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        self.0.code
    }

    pub fn language(&self) -> Language {
        self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.code)
    }
}

/// The translation client contract.
///
/// Implementations hold their model for as long as they live and must return
/// whitespace-only input unchanged without failing. The source code is passed on
/// every call; implementations keep no per-call language state.
pub trait Translator {
    fn translate(
        &mut self,
        text: &str,
        src: &LanguageCode,
        tgt: &LanguageCode,
    ) -> Result<String, TranslateError>;

    /// Whether the backing model accepts `code`. Checked once per pass, before any call.
    fn supports(&self, _code: &LanguageCode) -> bool {
        true
    }
}

pub const DEFAULT_PROMPT: &str = r#"Translate the following text from {{source_lang}} ({{source_code}}) to {{target_lang}} ({{target_code}}).
Output ONLY the translation. Do not explain, do not add notes, do not answer questions in the text.
Keep numbers, symbols, line breaks and punctuation as they are.

{{text}}"#;

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn render_prompt(template: &str, text: &str, src: &LanguageCode, tgt: &LanguageCode) -> String {
    render_template(
        template,
        &[
            ("source_lang", src.language().name),
            ("source_code", src.as_str()),
            ("target_lang", tgt.language().name),
            ("target_code", tgt.as_str()),
            ("text", text),
        ],
    )
}

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:translation|translated text)\s*:\s*").expect("label re")
});
static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\n(.*?)\n?```$").expect("fence re"));

/// Strips chat-model wrapping the source did not have: a leading label, a code
/// fence, or a pair of enclosing quotes.
pub fn clean_model_output(source: &str, raw: &str) -> String {
    let mut out = raw.trim().to_string();
    if let Some(c) = FENCE_RE.captures(&out) {
        out = c[1].trim().to_string();
    }
    if !LABEL_RE.is_match(source) {
        out = LABEL_RE.replace(&out, "").into_owned();
    }
    let src = source.trim();
    for (open, close) in [('"', '"'), ('“', '”'), ('«', '»')] {
        let wrapped = out.len() >= 2 && out.starts_with(open) && out.ends_with(close);
        if wrapped && !src.starts_with(open) {
            out = out[open.len_utf8()..out.len() - close.len_utf8()].to_string();
            break;
        }
    }
    // Runs are joined back without separators, so the source's edge whitespace is kept.
    let lead = &source[..source.len() - source.trim_start().len()];
    let trail = &source[source.trim_end().len()..];
    format!("{lead}{}{trail}", out.trim())
}
