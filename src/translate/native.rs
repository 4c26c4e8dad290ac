use std::num::NonZeroU32;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use encoding_rs::UTF_8;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaChatTemplate, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::DecodeError;
use once_cell::sync::OnceCell;

use super::{clean_model_output, render_prompt, LanguageCode, Translator};
use crate::error::TranslateError;

// llama.cpp allows a single backend initialization per process.
static LLAMA_BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

fn backend() -> anyhow::Result<&'static LlamaBackend> {
    LLAMA_BACKEND.get_or_try_init(|| LlamaBackend::init().context("init llama backend"))
}

#[derive(Clone, Debug)]
pub struct NativeModelConfig {
    pub model_path: PathBuf,
    pub template_hint: Option<String>,
    pub ctx_size: u32,
    pub threads: i32,
    pub gpu_layers: i32,
    pub batch_size: Option<u32>,
    pub max_tokens: u32,
    pub prompt: String,
}

enum ModelState {
    Unloaded,
    Ready(Box<NativeModel>),
    Failed(String),
}

/// Translation client backed by a GGUF model run through llama.cpp.
///
/// The model is loaded on the first non-empty call and kept until the translator is
/// dropped. A failed load is remembered and reported again on every later call; it is
/// never retried.
pub struct NativeTranslator {
    cfg: NativeModelConfig,
    state: ModelState,
}

impl NativeTranslator {
    pub fn new(cfg: NativeModelConfig) -> Self {
        Self {
            cfg,
            state: ModelState::Unloaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Ready(_))
    }

    fn model(&mut self) -> Result<&mut NativeModel, TranslateError> {
        if matches!(self.state, ModelState::Unloaded) {
            self.state = match NativeModel::load(&self.cfg) {
                Ok(m) => ModelState::Ready(Box::new(m)),
                Err(err) => ModelState::Failed(format!("{err:#}")),
            };
        }
        match &mut self.state {
            ModelState::Ready(m) => Ok(m.as_mut()),
            ModelState::Failed(msg) => Err(TranslateError::ModelUnavailable(msg.clone())),
            ModelState::Unloaded => Err(TranslateError::ModelUnavailable(
                "model not loaded".to_string(),
            )),
        }
    }
}

impl Translator for NativeTranslator {
    fn translate(
        &mut self,
        text: &str,
        src: &LanguageCode,
        tgt: &LanguageCode,
    ) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let prompt = render_prompt(&self.cfg.prompt, text, src, tgt);
        let max_tokens = self.cfg.max_tokens;
        let model = self.model()?;
        let raw = model
            .chat(&prompt, max_tokens)
            .map_err(|err| TranslateError::Generation(format!("{err:#}")))?;
        Ok(clean_model_output(text, &raw))
    }
}

struct NativeModel {
    name: String,
    model: Option<Box<LlamaModel>>,
    ctx: Option<LlamaContext<'static>>,
    template: LlamaChatTemplate,
}

impl NativeModel {
    fn load(cfg: &NativeModelConfig) -> anyhow::Result<Self> {
        if !cfg.model_path.exists() {
            return Err(anyhow!("model not found: {}", cfg.model_path.display()));
        }
        let backend = backend()?;
        let name = cfg
            .model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        let mut model_params = LlamaModelParams::default();
        if cfg.gpu_layers == -1 {
            // llama.cpp clamps values above n_layer to "all layers".
            model_params = model_params.with_n_gpu_layers(9999);
        } else if cfg.gpu_layers >= 0 {
            model_params = model_params.with_n_gpu_layers(cfg.gpu_layers as u32);
        }

        let model = Box::new(
            LlamaModel::load_from_file(backend, &cfg.model_path, &model_params)
                .with_context(|| format!("load model {}", cfg.model_path.display()))?,
        );
        // SAFETY: `LlamaContext` borrows the model. The model is boxed (stable address),
        // lives as long as `self.model` is `Some`, and `Drop` releases the context first.
        let model_ptr: *const LlamaModel = &*model;
        let model_ref: &'static LlamaModel = unsafe { &*model_ptr };

        let ctx_train = model_ref.n_ctx_train();
        let mut ctx_size = cfg.ctx_size;
        if ctx_size == 0 {
            ctx_size = ctx_train.clamp(256, 4096);
        }
        if ctx_train > 0 && ctx_size > ctx_train {
            ctx_size = ctx_train;
        }
        let ctx_size = ctx_size.max(256);

        let n_batch: u32 = cfg.batch_size.unwrap_or(512).clamp(8, 65536);
        let mut ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(ctx_size))
            .with_n_batch(n_batch)
            .with_n_ubatch(n_batch);
        if cfg.threads > 0 {
            ctx_params = ctx_params
                .with_n_threads(cfg.threads)
                .with_n_threads_batch(cfg.threads);
        }
        let ctx = model_ref
            .new_context(backend, ctx_params)
            .context("create model context")?;

        let template = match model_ref.chat_template(None) {
            Ok(t) => t,
            Err(_) => {
                let hint = cfg.template_hint.as_deref().unwrap_or("chatml");
                LlamaChatTemplate::new(hint).context("build fallback chat template")?
            }
        };

        Ok(Self {
            name,
            model: Some(model),
            ctx: Some(ctx),
            template,
        })
    }

    fn chat(&mut self, user_prompt: &str, max_tokens: u32) -> anyhow::Result<String> {
        let ctx = self.ctx.as_ref().context("model context released")?;
        let chat = vec![LlamaChatMessage::new("user".to_string(), user_prompt.to_string())
            .context("build user message")?];
        let prompt = ctx
            .model
            .apply_chat_template(&self.template, &chat, true)
            .context("apply chat template")?;
        self.generate(&prompt, max_tokens)
    }

    /// Greedy decoding so a fixed model gives the same output for the same input.
    fn generate(&mut self, prompt: &str, max_tokens: u32) -> anyhow::Result<String> {
        let name = self.name.as_str();
        let ctx = self.ctx.as_mut().context("model context released")?;
        let model: &'static LlamaModel = ctx.model;
        ctx.clear_kv_cache();

        let prompt_tokens = model
            .str_to_token(prompt, decide_add_bos(prompt))
            .context("tokenize prompt")?;
        if prompt_tokens.is_empty() {
            return Err(anyhow!("empty prompt tokens"));
        }

        let n_ctx = ctx.n_ctx() as usize;
        if prompt_tokens.len() + 1 >= n_ctx {
            return Err(anyhow!(
                "prompt_too_long: prompt_tokens={} n_ctx={}",
                prompt_tokens.len(),
                n_ctx
            ));
        }
        let max_tokens = (max_tokens as usize).min(n_ctx - prompt_tokens.len() - 1);

        let n_batch = ctx.n_batch() as usize;
        if n_batch == 0 {
            return Err(anyhow!("invalid n_batch=0"));
        }

        let last_index = prompt_tokens.len() - 1;
        let mut chunk_start = 0;
        while chunk_start < prompt_tokens.len() {
            let chunk_end = (chunk_start + n_batch).min(prompt_tokens.len());
            let chunk = &prompt_tokens[chunk_start..chunk_end];
            let mut batch = LlamaBatch::new(chunk.len().max(512), 1);
            for (i, token) in chunk.iter().copied().enumerate() {
                let pos = (chunk_start + i) as i32;
                batch
                    .add(token, pos, &[0], chunk_start + i == last_index)
                    .context("batch.add(prompt)")?;
            }
            decode_checked(ctx, &mut batch, name, "decode prompt")?;
            chunk_start = chunk_end;
        }

        let mut sampler = LlamaSampler::greedy();
        let mut decoder = UTF_8.new_decoder();
        let mut out = String::new();
        let mut batch = LlamaBatch::new(512, 1);
        let mut n_cur = prompt_tokens.len() as i32;
        for _ in 0..max_tokens {
            let token = sampler.sample(ctx, -1);
            if model.is_eog_token(token) {
                break;
            }
            let bytes = model
                .token_to_bytes(token, Special::Tokenize)
                .context("token_to_bytes")?;
            let mut piece = String::with_capacity(32);
            let _ = decoder.decode_to_string(&bytes, &mut piece, false);
            out.push_str(&piece);

            batch.clear();
            batch.add(token, n_cur, &[0], true).context("batch.add(gen)")?;
            n_cur += 1;
            decode_checked(ctx, &mut batch, name, "decode(gen)")?;
        }
        let mut tail = String::new();
        let _ = decoder.decode_to_string(&[], &mut tail, true);
        out.push_str(&tail);

        Ok(out.trim().to_string())
    }
}

fn decode_checked(
    ctx: &mut LlamaContext<'static>,
    batch: &mut LlamaBatch,
    name: &str,
    stage: &str,
) -> anyhow::Result<()> {
    ctx.decode(batch).map_err(|err| match err {
        DecodeError::Unknown(-2) => anyhow!(
            "llama_decode threw a foreign exception (likely OOM) (model={name}, stage={stage})"
        ),
        other => anyhow!(other),
    })
}

impl Drop for NativeModel {
    fn drop(&mut self) {
        // The context borrows the model; release it first.
        let _ = self.ctx.take();
        let _ = self.model.take();
    }
}

fn decide_add_bos(prompt: &str) -> AddBos {
    let p = prompt.trim_start();
    if p.starts_with("<s>")
        || p.starts_with("<|begin_of_text|>")
        || p.starts_with("<bos>")
        || p.starts_with("<BOS>")
        || p.starts_with("<|startoftext|>")
    {
        AddBos::Never
    } else {
        AddBos::Always
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{NativeModelConfig, NativeTranslator};
    use crate::error::TranslateError;
    use crate::translate::{LanguageCode, Translator, DEFAULT_PROMPT};

    fn cfg(path: &str) -> NativeModelConfig {
        NativeModelConfig {
            model_path: PathBuf::from(path),
            template_hint: None,
            ctx_size: 0,
            threads: -1,
            gpu_layers: 0,
            batch_size: None,
            max_tokens: 64,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    #[test]
    fn empty_text_never_loads_the_model() {
        let mut t = NativeTranslator::new(cfg("/nonexistent/model.gguf"));
        let en = LanguageCode::parse("en").expect("en");
        let fr = LanguageCode::parse("fr").expect("fr");
        assert_eq!(t.translate("   ", &en, &fr).expect("noop"), "   ");
        assert!(!t.is_loaded());
    }

    #[test]
    fn missing_model_is_unavailable_and_sticky() {
        let mut t = NativeTranslator::new(cfg("/nonexistent/model.gguf"));
        let en = LanguageCode::parse("en").expect("en");
        let fr = LanguageCode::parse("fr").expect("fr");
        for _ in 0..2 {
            match t.translate("Hello", &en, &fr) {
                Err(TranslateError::ModelUnavailable(msg)) => assert!(msg.contains("not found")),
                other => panic!("expected ModelUnavailable, got {other:?}"),
            }
        }
    }
}
