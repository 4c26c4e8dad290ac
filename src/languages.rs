use std::fmt;

use serde::Serialize;

/// A language the translation model can be asked for, keyed by its display name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Language {
    pub name: &'static str,
    pub code: &'static str,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

const REGISTRY: &[Language] = &[
    Language { name: "Bulgarian", code: "bg" },
    Language { name: "Chinese", code: "zh" },
    Language { name: "Croatian", code: "hr" },
    Language { name: "Czech", code: "cs" },
    Language { name: "Danish", code: "da" },
    Language { name: "Dutch", code: "nl" },
    Language { name: "Estonian", code: "et" },
    Language { name: "English", code: "en" },
    Language { name: "Finnish", code: "fi" },
    Language { name: "French", code: "fr" },
    Language { name: "German", code: "de" },
    Language { name: "Greek", code: "el" },
    Language { name: "Hungarian", code: "hu" },
    Language { name: "Icelandic", code: "is" },
    Language { name: "Indonesian", code: "id" },
    Language { name: "Italian", code: "it" },
    Language { name: "Kazakh", code: "kk" },
    Language { name: "Korean", code: "ko" },
    Language { name: "Latvian", code: "lv" },
    Language { name: "Lithuanian", code: "lt" },
    Language { name: "Macedonian", code: "mk" },
    Language { name: "Norwegian", code: "no" },
    Language { name: "Polish", code: "pl" },
    Language { name: "Portuguese", code: "pt" },
    Language { name: "Romanian", code: "ro" },
    Language { name: "Russian", code: "ru" },
    Language { name: "Serbian", code: "sr" },
    Language { name: "Slovak", code: "sk" },
    Language { name: "Slovenian", code: "sl" },
    Language { name: "Spanish", code: "es" },
    Language { name: "Swedish", code: "sv" },
    Language { name: "Turkish", code: "tr" },
    Language { name: "Vietnamese", code: "vi" },
];

pub fn all() -> &'static [Language] {
    REGISTRY
}

/// Exact name match wins; otherwise falls back to an ASCII case-insensitive match.
pub fn lookup(name: &str) -> Option<Language> {
    let name = name.trim();
    REGISTRY
        .iter()
        .find(|l| l.name == name)
        .or_else(|| REGISTRY.iter().find(|l| l.name.eq_ignore_ascii_case(name)))
        .copied()
}

pub fn by_code(code: &str) -> Option<Language> {
    let code = code.trim();
    REGISTRY
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(code))
        .copied()
}
