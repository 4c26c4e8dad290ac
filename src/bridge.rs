use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::docx::model::Document;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// External PDF <-> DOCX conversion. Both directions are best-effort and may lose
/// layout; callers treat any error as fatal for the job.
pub trait FormatConverter {
    fn pdf_to_docx(&self, pdf: &Path, docx: &Path) -> anyhow::Result<()>;
    fn docx_to_pdf(&self, docx: &Path, pdf: &Path) -> anyhow::Result<()>;
}

/// Runs a converter program per direction. Arguments may use `{input}`, `{output}`
/// and `{outdir}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CommandConverter {
    pub pdf_to_docx: Vec<String>,
    pub docx_to_pdf: Vec<String>,
}

impl Default for CommandConverter {
    fn default() -> Self {
        let soffice = |filter: &[&str], target: &str| -> Vec<String> {
            let mut args = vec!["soffice", "--headless"];
            args.extend_from_slice(filter);
            args.extend_from_slice(&["--convert-to", target, "--outdir", "{outdir}", "{input}"]);
            args.into_iter().map(str::to_string).collect()
        };
        Self {
            pdf_to_docx: soffice(&["--infilter=writer_pdf_import"], "docx:MS Word 2007 XML"),
            docx_to_pdf: soffice(&[], "pdf"),
        }
    }
}

impl CommandConverter {
    fn run(&self, template: &[String], input: &Path, output: &Path) -> anyhow::Result<()> {
        let (program, args) = template
            .split_first()
            .ok_or_else(|| anyhow!("converter command is empty"))?;
        let outdir = output.parent().unwrap_or_else(|| Path::new("."));
        let fill = |s: &str| {
            s.replace("{input}", &input.to_string_lossy())
                .replace("{output}", &output.to_string_lossy())
                .replace("{outdir}", &outdir.to_string_lossy())
        };

        let result = Command::new(fill(program.as_str()))
            .args(args.iter().map(|a| fill(a.as_str())))
            .output()
            .with_context(|| format!("spawn converter: {program}"))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!(
                "converter {program} exited with {}: {}",
                result.status,
                stderr.trim()
            ));
        }

        if output.exists() {
            return Ok(());
        }
        // Office-style converters name the result after the input stem.
        let produced = match (input.file_stem(), output.extension()) {
            (Some(stem), Some(ext)) => {
                let mut name = stem.to_os_string();
                name.push(".");
                name.push(ext);
                outdir.join(name)
            }
            _ => PathBuf::new(),
        };
        if produced.is_file() {
            std::fs::rename(&produced, output).with_context(|| {
                format!("move {} -> {}", produced.display(), output.display())
            })?;
            return Ok(());
        }
        Err(anyhow!(
            "converter {program} produced no output for {}",
            input.display()
        ))
    }
}

impl FormatConverter for CommandConverter {
    fn pdf_to_docx(&self, pdf: &Path, docx: &Path) -> anyhow::Result<()> {
        self.run(&self.pdf_to_docx, pdf, docx)
    }

    fn docx_to_pdf(&self, docx: &Path, pdf: &Path) -> anyhow::Result<()> {
        self.run(&self.docx_to_pdf, docx, pdf)
    }
}

pub fn has_pdf_magic(path: &Path) -> anyhow::Result<bool> {
    let mut f = std::fs::File::open(path).with_context(|| format!("open pdf: {}", path.display()))?;
    let mut head = [0u8; PDF_MAGIC.len()];
    let mut filled = 0;
    while filled < head.len() {
        let n = f.read(&mut head[filled..]).context("read pdf header")?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled == head.len() && head == PDF_MAGIC)
}

/// Converts `pdf` into `<dir>/<stem>.docx` and checks the result loads as a document.
pub fn pdf_to_editable(
    converter: &dyn FormatConverter,
    pdf: &Path,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    if !has_pdf_magic(pdf)? {
        return Err(anyhow!("not a PDF file: {}", pdf.display()));
    }
    let stem = pdf.file_stem().and_then(|s| s.to_str()).unwrap_or("source");
    let docx = dir.join(format!("{stem}.docx"));
    converter
        .pdf_to_docx(pdf, &docx)
        .with_context(|| format!("pdf -> docx: {}", pdf.display()))?;
    Document::load(&docx).context("converted document is unreadable")?;
    Ok(docx)
}

/// Converts `docx` into a sibling `.pdf` and removes the intermediate DOCX.
pub fn editable_to_pdf(converter: &dyn FormatConverter, docx: &Path) -> anyhow::Result<PathBuf> {
    let pdf = docx.with_extension("pdf");
    converter
        .docx_to_pdf(docx, &pdf)
        .with_context(|| format!("docx -> pdf: {}", docx.display()))?;
    if !has_pdf_magic(&pdf)? {
        return Err(anyhow!("converter output is not a PDF: {}", pdf.display()));
    }
    std::fs::remove_file(docx)
        .with_context(|| format!("remove intermediate docx: {}", docx.display()))?;
    Ok(pdf)
}
