use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Serialize, Serializer};

use crate::bridge::{editable_to_pdf, pdf_to_editable, FormatConverter};
use crate::docx::model::Document;
use crate::error::{JobError, MissingField};
use crate::languages::{self, Language};
use crate::progress::{completion_message, ConsoleProgress};
use crate::translate::{LanguageCode, Translator};
use crate::walker::{translate_document_with, WalkStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Docx,
    Pdf,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("docx") {
            Some(Self::Docx)
        } else if ext.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else {
            None
        }
    }
}

/// Raw user input, before validation.
#[derive(Clone, Debug, Default)]
pub struct JobRequest {
    pub source_path: Option<PathBuf>,
    pub source_language: Option<String>,
    pub target_languages: Vec<String>,
    /// Defaults to the input file's directory.
    pub output_dir: Option<PathBuf>,
    pub keep_docx: bool,
    /// Parent for the staging directory; the system temp dir when unset.
    pub staging_root: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct TranslationJob {
    pub source_path: PathBuf,
    pub source_language: Language,
    pub target_languages: Vec<Language>,
    pub input_kind: InputKind,
    pub output_dir: PathBuf,
    pub keep_docx: bool,
    pub staging_root: Option<PathBuf>,
}

impl TranslationJob {
    /// Validates a request. Nothing is read or written besides checking that the
    /// input file exists.
    pub fn from_request(req: JobRequest) -> Result<Self, JobError> {
        let source_path = req
            .source_path
            .filter(|p| p.is_file())
            .ok_or(JobError::MissingInput(MissingField::File))?;
        let input_kind = InputKind::from_path(&source_path)
            .ok_or_else(|| JobError::UnsupportedInput(source_path.clone()))?;

        let source_name = req
            .source_language
            .filter(|s| !s.trim().is_empty())
            .ok_or(JobError::MissingInput(MissingField::SourceLanguage))?;
        let source_language = languages::lookup(&source_name)
            .ok_or_else(|| JobError::UnknownLanguage(source_name.trim().to_string()))?;

        let names: Vec<&str> = req
            .target_languages
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(JobError::MissingInput(MissingField::TargetLanguages));
        }
        let mut target_languages: Vec<Language> = Vec::with_capacity(names.len());
        for name in names {
            let lang =
                languages::lookup(name).ok_or_else(|| JobError::UnknownLanguage(name.to_string()))?;
            if !target_languages.contains(&lang) {
                target_languages.push(lang);
            }
        }

        let output_dir = req.output_dir.unwrap_or_else(|| {
            source_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

        Ok(Self {
            source_path,
            source_language,
            target_languages,
            input_kind,
            output_dir,
            keep_docx: req.keep_docx,
            staging_root: req.staging_root,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct JobReport {
    pub outputs: Vec<(Language, PathBuf)>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub paragraphs_translated: usize,
    pub cells_translated: usize,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

pub fn output_file_name(source: Language, target: Language, kind: InputKind) -> String {
    let ext = match kind {
        InputKind::Docx => "docx",
        InputKind::Pdf => "pdf",
    };
    format!("translated_{}_to_{}.{ext}", source.name, target.name)
}

/// Runs a validated job. Every target is produced in a private staging directory and
/// nothing lands in `job.output_dir` unless all targets succeed. The staging directory
/// is removed on every exit path.
pub fn run_job(
    job: &TranslationJob,
    translator: &mut dyn Translator,
    converter: &dyn FormatConverter,
    progress: &ConsoleProgress,
) -> Result<JobReport, JobError> {
    let t0 = Instant::now();
    let mut builder = tempfile::Builder::new();
    builder.prefix("docx-polyglot-");
    let staging = match job.staging_root.as_ref() {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .context("create staging directory")
    .map_err(JobError::Filesystem)?;

    progress.info(format!(
        "Translating {} from {} into {}",
        job.source_path.display(),
        job.source_language,
        job.target_languages
            .iter()
            .map(|l| l.name)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let editable = stage_input(job, staging.path(), converter, progress)?;
    let src = LanguageCode::of(job.source_language);

    let mut staged: Vec<(Language, PathBuf)> = Vec::new();
    let mut totals = WalkStats::default();
    for &target in &job.target_languages {
        progress.info(format!("Translating into {target}"));
        let tgt = LanguageCode::of(target);

        // Each pass starts from the untouched source.
        let mut doc = Document::load(&editable).map_err(JobError::Document)?;
        let label = format!("Translate {target}");
        let stats = translate_document_with(&mut doc, &src, &tgt, translator, &mut |done, total| {
            if done == total || done % 25 == 0 {
                progress.progress(&label, done, total);
            }
        })
        .map_err(|source| JobError::Translation {
            language: target.name.to_string(),
            source,
        })?;
        totals.add(stats);

        let docx_name = output_file_name(job.source_language, target, InputKind::Docx);
        let docx_path = staging.path().join(&docx_name);
        doc.save(&docx_path).map_err(JobError::Filesystem)?;

        match job.input_kind {
            InputKind::Docx => staged.push((target, docx_path)),
            InputKind::Pdf => {
                if job.keep_docx {
                    let kept = staging.path().join("kept");
                    std::fs::create_dir_all(&kept)
                        .context("create staging subdirectory")
                        .map_err(JobError::Filesystem)?;
                    let kept_path = kept.join(&docx_name);
                    std::fs::copy(&docx_path, &kept_path)
                        .with_context(|| format!("copy {}", docx_path.display()))
                        .map_err(JobError::Filesystem)?;
                    staged.push((target, kept_path));
                }
                progress.info(format!("Converting {docx_name} to PDF"));
                let pdf = editable_to_pdf(converter, &docx_path).map_err(JobError::Conversion)?;
                staged.push((target, pdf));
            }
        }
    }

    let outputs = deliver(&staged, &job.output_dir).map_err(JobError::Filesystem)?;
    for (lang, path) in &outputs {
        progress.info(format!("{lang}: {}", path.display()));
    }

    let elapsed = t0.elapsed();
    progress.info(completion_message(elapsed));
    Ok(JobReport {
        outputs,
        elapsed,
        paragraphs_translated: totals.paragraphs,
        cells_translated: totals.cells,
    })
}

/// Copies the input into staging and returns an editable DOCX path.
fn stage_input(
    job: &TranslationJob,
    staging: &Path,
    converter: &dyn FormatConverter,
    progress: &ConsoleProgress,
) -> Result<PathBuf, JobError> {
    let staged = staging.join(match job.input_kind {
        InputKind::Docx => "source.docx",
        InputKind::Pdf => "source.pdf",
    });
    std::fs::copy(&job.source_path, &staged)
        .with_context(|| format!("stage input: {}", job.source_path.display()))
        .map_err(JobError::Filesystem)?;

    match job.input_kind {
        InputKind::Docx => Ok(staged),
        InputKind::Pdf => {
            progress.info("Converting PDF to DOCX");
            pdf_to_editable(converter, &staged, staging).map_err(JobError::Conversion)
        }
    }
}

/// Copies staged files into `dir`. On failure the files already copied are removed.
fn deliver(staged: &[(Language, PathBuf)], dir: &Path) -> anyhow::Result<Vec<(Language, PathBuf)>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output dir: {}", dir.display()))?;
    let mut delivered: Vec<(Language, PathBuf)> = Vec::with_capacity(staged.len());
    for (lang, from) in staged {
        let name = from
            .file_name()
            .with_context(|| format!("staged file has no name: {}", from.display()))?;
        let to = dir.join(name);
        if let Err(err) = std::fs::copy(from, &to) {
            for (_, path) in &delivered {
                let _ = std::fs::remove_file(path);
            }
            return Err(err).with_context(|| format!("write output: {}", to.display()));
        }
        delivered.push((*lang, to));
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{output_file_name, run_job, InputKind, JobRequest, TranslationJob};
    use crate::bridge::FormatConverter;
    use crate::docx::load::tests::wrap_body;
    use crate::docx::model::Document;
    use crate::docx::package::tests::write_test_docx;
    use crate::error::{JobError, MissingField, Stage, TranslateError};
    use crate::languages;
    use crate::progress::ConsoleProgress;
    use crate::translate::{LanguageCode, Translator};

    struct Tagging;

    impl Translator for Tagging {
        fn translate(
            &mut self,
            text: &str,
            _src: &LanguageCode,
            tgt: &LanguageCode,
        ) -> Result<String, TranslateError> {
            Ok(format!("[{tgt}]{text}"))
        }
    }

    /// Fails on the n-th call.
    struct FailAt(usize);

    impl Translator for FailAt {
        fn translate(
            &mut self,
            text: &str,
            _src: &LanguageCode,
            _tgt: &LanguageCode,
        ) -> Result<String, TranslateError> {
            if self.0 == 0 {
                return Err(TranslateError::Generation("boom".to_string()));
            }
            self.0 -= 1;
            Ok(text.to_string())
        }
    }

    struct NoConverter;

    impl FormatConverter for NoConverter {
        fn pdf_to_docx(&self, _pdf: &Path, _docx: &Path) -> anyhow::Result<()> {
            anyhow::bail!("no converter")
        }
        fn docx_to_pdf(&self, _docx: &Path, _pdf: &Path) -> anyhow::Result<()> {
            anyhow::bail!("no converter")
        }
    }

    fn sample_docx(dir: &Path) -> PathBuf {
        let path = dir.join("input.docx");
        write_test_docx(
            &path,
            &wrap_body(
                r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Hello</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
            ),
        );
        path
    }

    fn request(input: &Path, out: &Path, targets: &[&str]) -> JobRequest {
        JobRequest {
            source_path: Some(input.to_path_buf()),
            source_language: Some("English".to_string()),
            target_languages: targets.iter().map(|s| s.to_string()).collect(),
            output_dir: Some(out.to_path_buf()),
            keep_docx: false,
            staging_root: None,
        }
    }

    #[test]
    fn preflight_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = sample_docx(dir.path());
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "x").expect("write");

        let err = TranslationJob::from_request(JobRequest::default()).expect_err("no file");
        assert!(matches!(err, JobError::MissingInput(MissingField::File)));

        let err = TranslationJob::from_request(JobRequest {
            source_path: Some(dir.path().join("missing.docx")),
            ..JobRequest::default()
        })
        .expect_err("missing file");
        assert!(matches!(err, JobError::MissingInput(MissingField::File)));

        let err = TranslationJob::from_request(request(&txt, dir.path(), &["French"]))
            .expect_err("txt");
        assert!(matches!(err, JobError::UnsupportedInput(_)));

        let mut req = request(&input, dir.path(), &["French"]);
        req.source_language = Some("  ".to_string());
        let err = TranslationJob::from_request(req).expect_err("no source");
        assert!(matches!(err, JobError::MissingInput(MissingField::SourceLanguage)));

        let mut req = request(&input, dir.path(), &["French"]);
        req.source_language = Some("Klingon".to_string());
        let err = TranslationJob::from_request(req).expect_err("unknown source");
        assert!(matches!(err, JobError::UnknownLanguage(ref n) if n == "Klingon"));

        let err = TranslationJob::from_request(request(&input, dir.path(), &[" "]))
            .expect_err("no targets");
        assert!(matches!(err, JobError::MissingInput(MissingField::TargetLanguages)));
        assert_eq!(err.stage(), Stage::Validation);

        let err = TranslationJob::from_request(request(&input, dir.path(), &["French", "Elvish"]))
            .expect_err("unknown target");
        assert!(matches!(err, JobError::UnknownLanguage(ref n) if n == "Elvish"));
    }

    #[test]
    fn duplicate_targets_collapse_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = sample_docx(dir.path());
        let job = TranslationJob::from_request(request(
            &input,
            dir.path(),
            &["German", "french", "German", "French"],
        ))
        .expect("valid");
        let names: Vec<&str> = job.target_languages.iter().map(|l| l.name).collect();
        assert_eq!(names, ["German", "French"]);
        assert_eq!(job.input_kind, InputKind::Docx);
    }

    #[test]
    fn output_names() {
        let en = languages::lookup("English").expect("en");
        let fr = languages::lookup("French").expect("fr");
        assert_eq!(
            output_file_name(en, fr, InputKind::Docx),
            "translated_English_to_French.docx"
        );
        assert_eq!(
            output_file_name(en, fr, InputKind::Pdf),
            "translated_English_to_French.pdf"
        );
    }

    #[test]
    fn docx_job_writes_one_file_per_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = sample_docx(dir.path());
        let out = dir.path().join("out");
        let job = TranslationJob::from_request(request(&input, &out, &["French", "German"]))
            .expect("valid");

        let report = run_job(&job, &mut Tagging, &NoConverter, &ConsoleProgress::new(false))
            .expect("run");
        assert_eq!(report.outputs.len(), 2);
        assert_eq!(report.paragraphs_translated, 2);
        assert_eq!(report.cells_translated, 2);

        let fr = Document::load(&out.join("translated_English_to_French.docx")).expect("load fr");
        assert_eq!(fr.paragraphs[0].text(), "[fr]Hello");
        assert_eq!(fr.paragraphs[0].runs[0].original.style.bold, Some(true));
        assert_eq!(fr.tables[0].rows[0].cells[0].text, "[fr]Cell");

        // The German pass starts from the source, not from the French output.
        let de = Document::load(&out.join("translated_English_to_German.docx")).expect("load de");
        assert_eq!(de.paragraphs[0].text(), "[de]Hello");
    }

    #[test]
    fn failed_target_leaves_no_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = sample_docx(dir.path());
        let out = dir.path().join("out");
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).expect("mkdir");
        let mut req = request(&input, &out, &["French", "German"]);
        req.staging_root = Some(staging.clone());
        let job = TranslationJob::from_request(req).expect("valid");

        // French needs two calls; German fails on its first.
        let err = run_job(&job, &mut FailAt(2), &NoConverter, &ConsoleProgress::new(false))
            .expect_err("german fails");
        match &err {
            JobError::Translation { language, .. } => assert_eq!(language, "German"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.stage(), Stage::Translation);
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(&staging).expect("read").count(), 0);
    }

    #[test]
    fn pdf_conversion_failure_is_conversion_stage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n").expect("write");
        let out = dir.path().join("out");
        let job = TranslationJob::from_request(request(&pdf, &out, &["French"])).expect("valid");
        assert_eq!(job.input_kind, InputKind::Pdf);

        let err = run_job(&job, &mut Tagging, &NoConverter, &ConsoleProgress::new(false))
            .expect_err("no converter");
        assert_eq!(err.stage(), Stage::Conversion);
        assert!(!out.exists());
    }
}
