use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::bridge::CommandConverter;

pub const CONFIG_FILE_NAME: &str = "docx-polyglot.toml";
pub const CONFIG_ENV: &str = "DOCX_POLYGLOT_CONFIG";

const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub convert: ConvertSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ModelSection {
    /// GGUF file. Relative paths are looked up in `model_dir`, the current directory
    /// and the config file directory, in that order.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default)]
    pub template_hint: Option<String>,
    #[serde(default)]
    pub ctx_size: Option<u32>,
    #[serde(default)]
    pub threads: Option<i32>,
    #[serde(default)]
    pub gpu_layers: Option<i32>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Prompt template; see `translate::DEFAULT_PROMPT` for the placeholders.
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ConvertSection {
    #[serde(default)]
    pub pdf_to_docx: Option<Vec<String>>,
    #[serde(default)]
    pub docx_to_pdf: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OutputSection {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub keep_docx: Option<bool>,
}

impl ModelSection {
    pub fn resolve_path(&self, config_dir: &Path) -> Option<PathBuf> {
        let path = self.path.as_ref()?;
        if path.is_absolute() {
            return Some(path.clone());
        }
        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(md) = self.model_dir.as_ref() {
            dirs.push(if md.is_relative() {
                config_dir.join(md)
            } else {
                md.clone()
            });
        }
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        dirs.push(config_dir.to_path_buf());
        dirs.iter()
            .map(|d| d.join(path))
            .find(|p| p.exists())
            .or_else(|| Some(path.clone()))
    }

    #[cfg(feature = "native")]
    pub fn native_config(&self, model_path: PathBuf) -> crate::translate::native::NativeModelConfig {
        crate::translate::native::NativeModelConfig {
            model_path,
            template_hint: self
                .template_hint
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ctx_size: self.ctx_size.unwrap_or(0),
            threads: self.threads.unwrap_or(-1),
            gpu_layers: self.gpu_layers.unwrap_or(-1),
            batch_size: self.batch_size,
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            prompt: self
                .prompt
                .clone()
                .unwrap_or_else(|| crate::translate::DEFAULT_PROMPT.to_string()),
        }
    }
}

impl ConvertSection {
    pub fn converter(&self) -> CommandConverter {
        let defaults = CommandConverter::default();
        CommandConverter {
            pdf_to_docx: self.pdf_to_docx.clone().unwrap_or(defaults.pdf_to_docx),
            docx_to_pdf: self.docx_to_pdf.clone().unwrap_or(defaults.docx_to_pdf),
        }
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

/// `explicit`, else `$DOCX_POLYGLOT_CONFIG`, else the nearest `docx-polyglot.toml`.
pub fn locate_config(explicit: Option<PathBuf>, workdir: &Path) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| find_default_config(workdir, CONFIG_FILE_NAME))
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

const DEFAULT_CONFIG_TOML: &str = r#"# docx-polyglot configuration.
# CLI flags override the values below.

[model]
# GGUF translation model. Relative paths are searched in model_dir, the current
# directory and this file's directory.
path = "model.gguf"
# model_dir = "models"
# template_hint = "chatml"
# 0 = derive from the model's training context
ctx_size = 0
# -1 = auto
threads = -1
# -1 = offload as many layers as possible, 0 = CPU only
gpu_layers = -1
# batch_size = 512
max_tokens = 1024
# prompt = """Translate from {{source_lang}} to {{target_lang}}: {{text}}"""

[convert]
# {input}, {output} and {outdir} are substituted before running.
pdf_to_docx = ["soffice", "--headless", "--infilter=writer_pdf_import", "--convert-to", "docx:MS Word 2007 XML", "--outdir", "{outdir}", "{input}"]
docx_to_pdf = ["soffice", "--headless", "--convert-to", "pdf", "--outdir", "{outdir}", "{input}"]

[output]
# dir = "translated"
keep_docx = false
"#;

/// Writes a commented default config into `dir`. An existing file is kept unless
/// `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{
        find_file_upwards, init_default_config, load_config, AppConfig, ModelSection,
        CONFIG_FILE_NAME,
    };
    use crate::bridge::CommandConverter;

    #[test]
    fn default_config_parses_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = init_default_config(dir.path(), false).expect("init");
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.model.path, Some(PathBuf::from("model.gguf")));
        assert_eq!(cfg.model.max_tokens, Some(1024));
        assert_eq!(cfg.output.keep_docx, Some(false));
        assert_eq!(cfg.convert.converter(), CommandConverter::default());
    }

    #[test]
    fn init_keeps_existing_file_unless_forced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[output]\nkeep_docx = true\n").expect("write");

        init_default_config(dir.path(), false).expect("init");
        assert_eq!(load_config(&path).expect("load").output.keep_docx, Some(true));

        init_default_config(dir.path(), true).expect("init");
        assert_eq!(load_config(&path).expect("load").output.keep_docx, Some(false));
    }

    #[test]
    fn sections_are_optional() {
        let cfg: AppConfig = toml::from_str("[convert]\ndocx_to_pdf = [\"pdfit\", \"{input}\"]\n")
            .expect("parse");
        assert!(cfg.model.path.is_none());
        let conv = cfg.convert.converter();
        assert_eq!(conv.docx_to_pdf, vec!["pdfit", "{input}"]);
        assert_eq!(conv.pdf_to_docx, CommandConverter::default().pdf_to_docx);
    }

    #[test]
    fn bad_toml_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[model\npath = 1").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("parse config toml"));
    }

    #[test]
    fn upward_search_stops_at_level_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deep = dir.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&deep).expect("mkdir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "").expect("write");
        assert_eq!(
            find_file_upwards(&deep, CONFIG_FILE_NAME, 3),
            Some(dir.path().join(CONFIG_FILE_NAME))
        );
        assert_eq!(find_file_upwards(&deep, CONFIG_FILE_NAME, 2), None);
    }

    #[test]
    fn model_path_found_in_model_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("models")).expect("mkdir");
        std::fs::write(dir.path().join("models").join("mt.gguf"), b"").expect("write");
        let section = ModelSection {
            path: Some(PathBuf::from("mt.gguf")),
            model_dir: Some(PathBuf::from("models")),
            ..ModelSection::default()
        };
        assert_eq!(
            section.resolve_path(dir.path()),
            Some(dir.path().join("models").join("mt.gguf"))
        );
        assert_eq!(ModelSection::default().resolve_path(dir.path()), None);
    }
}
