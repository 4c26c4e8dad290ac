use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};

use docx_polyglot::config::{init_default_config, load_config, locate_config, AppConfig};
use docx_polyglot::docx::model::Document;
use docx_polyglot::error::JobError;
use docx_polyglot::job::{run_job, InputKind, JobRequest, TranslationJob};
use docx_polyglot::languages;
use docx_polyglot::progress::ConsoleProgress;
use docx_polyglot::translate::Translator;

#[derive(Parser, Debug)]
#[command(name = "docx-polyglot")]
#[command(about = "Translate Word and PDF documents with a local model, keeping run formatting", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file into (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Print the supported languages and exit
    #[arg(long)]
    list_languages: bool,

    /// Input .docx or .pdf
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Source language name (e.g. English)
    #[arg(short, long, value_name = "NAME")]
    source: Option<String>,

    /// Target language name; repeat or separate with commas
    #[arg(short, long, value_name = "NAME", value_delimiter = ',')]
    target: Vec<String>,

    /// Output directory (default: next to the input)
    #[arg(short = 'o', long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Config file path (default: search for docx-polyglot.toml upwards)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Translation model GGUF (overrides [model].path)
    #[arg(long, value_name = "GGUF")]
    model: Option<PathBuf>,

    /// Threads for llama.cpp (default: -1 = auto)
    #[arg(long)]
    threads: Option<i32>,

    /// GPU layers for llama.cpp (default: -1 = offload as much as possible)
    #[arg(long)]
    gpu_layers: Option<i32>,

    /// Context size for the translation model (0 = from model)
    #[arg(long)]
    ctx_size: Option<u32>,

    /// For PDF input, also deliver the translated DOCX
    #[arg(long)]
    keep_docx: bool,

    /// Write the job report as JSON
    #[arg(long, value_name = "FILE")]
    report_json: Option<PathBuf>,

    /// Dump the parsed document model as JSON (no translation)
    #[arg(long, value_name = "FILE")]
    extract_json: Option<PathBuf>,

    /// No progress output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if args.list_languages {
        for lang in languages::all() {
            println!("{}\t{}", lang.name, lang.code);
        }
        return Ok(());
    }

    let input = match args.input.clone() {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  docx-polyglot report.docx --source English --target French,German\n\nTIPS:\n  - Default config search: docx-polyglot.toml (upwards), or set DOCX_POLYGLOT_CONFIG.\n  - --list-languages shows every accepted language name.\n"
            );
            return Ok(());
        }
    };

    if let Some(json_path) = args.extract_json.as_ref() {
        return extract_json(&input, json_path);
    }

    let workdir = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let explicit_config = args.config.is_some();
    let cfg_file = locate_config(args.config.clone(), &workdir);
    let mut cfg = AppConfig::default();
    if let Some(p) = cfg_file.as_ref() {
        if p.exists() {
            cfg = load_config(p)?;
        } else if explicit_config {
            return Err(anyhow!("config not found: {}", p.display()));
        } else {
            progress.warn(format!("config not found, using defaults: {}", p.display()));
        }
    } else {
        progress.warn("no docx-polyglot.toml found, using defaults");
    }
    let config_dir = cfg_file
        .as_ref()
        .and_then(|p| p.parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| workdir.clone());

    if let Some(model) = args.model.clone() {
        cfg.model.path = Some(model);
    }
    cfg.model.threads = args.threads.or(cfg.model.threads);
    cfg.model.gpu_layers = args.gpu_layers.or(cfg.model.gpu_layers);
    cfg.model.ctx_size = args.ctx_size.or(cfg.model.ctx_size);

    let job = TranslationJob::from_request(JobRequest {
        source_path: Some(input),
        source_language: args.source.clone(),
        target_languages: args.target.clone(),
        output_dir: args.output_dir.clone().or_else(|| cfg.output.dir.clone()),
        keep_docx: args.keep_docx || cfg.output.keep_docx.unwrap_or(false),
        staging_root: None,
    })
    .map_err(with_stage)?;

    let model_path = cfg.model.resolve_path(&config_dir).ok_or_else(|| {
        anyhow!("no translation model configured: set [model].path or pass --model")
    })?;
    let mut translator = build_translator(&cfg, model_path)?;
    let converter = cfg.convert.converter();

    let report = run_job(&job, translator.as_mut(), &converter, &progress).map_err(with_stage)?;

    if let Some(path) = args.report_json.as_ref() {
        let json = serde_json::to_string_pretty(&report).context("serialize report")?;
        std::fs::write(path, json).with_context(|| format!("write report: {}", path.display()))?;
    }
    Ok(())
}

fn with_stage(err: JobError) -> anyhow::Error {
    let stage = err.stage();
    anyhow::Error::new(err).context(format!("{stage} stage failed"))
}

#[cfg(feature = "native")]
fn build_translator(cfg: &AppConfig, model_path: PathBuf) -> anyhow::Result<Box<dyn Translator>> {
    use docx_polyglot::translate::native::NativeTranslator;
    Ok(Box::new(NativeTranslator::new(cfg.model.native_config(model_path))))
}

#[cfg(not(feature = "native"))]
fn build_translator(_cfg: &AppConfig, _model_path: PathBuf) -> anyhow::Result<Box<dyn Translator>> {
    Err(anyhow!(
        "built without the native backend; rebuild with `--features native`"
    ))
}

fn extract_json(input: &Path, json_path: &Path) -> anyhow::Result<()> {
    if InputKind::from_path(input) != Some(InputKind::Docx) {
        return Err(anyhow!("--extract-json expects a .docx input: {}", input.display()));
    }
    let doc = Document::load(input)?;
    let json = serde_json::to_string_pretty(&doc.outline()).context("serialize document")?;
    std::fs::write(json_path, json)
        .with_context(|| format!("write json: {}", json_path.display()))?;
    Ok(())
}
