use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use textgen_backend::mock::MockBackend;
use textgen_backend::{BackendTokenizer, HfTokenizer, InferenceBackend, LoadParams, Tokenize};
use textgen_backend_llamacpp::LlamaCppBackend;
use textgen_common::config::TextgenConfig;
use textgen_core::decode::SamplingSettings;
use textgen_core::length::LengthUnit;
use textgen_core::session::{CompareOptions, OutputFormat, RunOptions, Session};
use textgen_core::{LengthBounds, ValidatedBounds};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "textgen", version, about = "GPT-2 text generation with length and repetition checks")]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Use the deterministic mock backend instead of a real model
    #[arg(long, global = true)]
    mock: bool,
    /// GGUF model file (overrides TEXTGEN_MODEL)
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// tokenizer.json used for trigram and token counts
    #[arg(long, global = true)]
    tokenizer: Option<PathBuf>,
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prompt loop with a length check after every answer
    Run(RunArgs),
    /// Generate with and without an n-gram restriction and compare repetition
    Compare(CompareArgs),
    Pull(PullArgs),
    List,
    Version,
}

#[derive(Args, Debug)]
struct BoundArgs {
    #[arg(allow_hyphen_values = true)]
    min_length: String,
    #[arg(allow_hyphen_values = true)]
    max_length: String,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    bounds: BoundArgs,
    #[arg(short = 'n', long)]
    iterations: Option<usize>,
    /// Count the answer in words or tokens
    #[arg(long, default_value = "words")]
    unit: LengthUnit,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[command(flatten)]
    bounds: BoundArgs,
    /// n-gram size that may not repeat in the restricted run
    #[arg(long)]
    ngram: Option<usize>,
    /// Required reduction of duplicate trigrams, in percent
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PullArgs {
    /// Source URL (hf://org/repo/file or https URL)
    source: String,
    /// File name to save under the model directory
    #[arg(short, long)]
    name: Option<String>,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(target: "cli", "{:#}", e);
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }
    let mut cfg = TextgenConfig::load().context("loading configuration")?;
    apply_overrides(&mut cfg, &cli.model);
    match cli.command {
        Commands::Run(args) => run(&cfg, cli.model.mock, args).map(|()| ExitCode::SUCCESS),
        Commands::Compare(args) => compare(&cfg, cli.model.mock, args),
        Commands::Pull(args) => pull_model(&cfg, args).map(|()| ExitCode::SUCCESS),
        Commands::List => {
            list_models(&cfg);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => Ok(ExitCode::SUCCESS),
    }
}

fn apply_overrides(cfg: &mut TextgenConfig, args: &ModelArgs) {
    if let Some(p) = &args.model { cfg.model_path = Some(p.clone()); }
    if let Some(p) = &args.tokenizer { cfg.tokenizer_path = Some(p.clone()); }
    if let Some(s) = args.seed { cfg.seed = Some(s); }
}

fn validate_bounds(cfg: &TextgenConfig, args: &BoundArgs) -> anyhow::Result<LengthBounds> {
    let ValidatedBounds { bounds, clamped_from } =
        LengthBounds::parse(&args.min_length, &args.max_length, cfg.context_limit)?;
    if clamped_from.is_some() {
        println!("{}", clamp_warning(cfg.context_limit));
    }
    Ok(bounds)
}

fn clamp_warning(limit: usize) -> String {
    format!("Warning: the model supports at most {} tokens. Clamping to {}.", limit, limit)
}

fn select_backend(cfg: &TextgenConfig, mock: bool) -> anyhow::Result<Box<dyn InferenceBackend>> {
    if mock {
        tracing::info!(target: "cli", "using mock backend");
        return Ok(Box::new(MockBackend::new()));
    }
    let Some(path) = cfg.model_path.as_ref() else {
        bail!("no model configured; pass --model, set TEXTGEN_MODEL, or use --mock");
    };
    let llama = LlamaCppBackend::new();
    llama
        .load_model(&path.to_string_lossy(), LoadParams { n_ctx: cfg.context_limit })
        .with_context(|| {
            format!(
                "could not load {} (possible causes: file not downloaded, see `textgen pull`; not enough memory; llama.cpp not linked)",
                path.display()
            )
        })?;
    Ok(Box::new(llama))
}

fn load_tokenizer(cfg: &TextgenConfig) -> anyhow::Result<Option<HfTokenizer>> {
    Ok(cfg.tokenizer_path.as_deref().map(HfTokenizer::from_file).transpose()?)
}

fn run(cfg: &TextgenConfig, mock: bool, args: RunArgs) -> anyhow::Result<()> {
    let bounds = validate_bounds(cfg, &args.bounds)?;
    let backend = select_backend(cfg, mock)?;
    let hf = load_tokenizer(cfg)?;
    let fallback = BackendTokenizer::new(backend.as_ref());
    let tokenizer: &dyn Tokenize = match &hf {
        Some(t) => t,
        None => &fallback,
    };

    let opts = RunOptions { bounds, iterations: args.iterations.unwrap_or(cfg.iterations), unit: args.unit };
    let mut session = Session::new(
        backend.as_ref(),
        tokenizer,
        SamplingSettings::from_config(cfg),
        io::stdin().lock(),
        io::stdout().lock(),
    );
    let outcomes = session.run(&opts)?;
    let within = outcomes.iter().filter(|o| o.within_bounds()).count();
    tracing::info!(target: "cli", "{} of {} answers within bounds", within, outcomes.len());
    Ok(())
}

/// A JSON run that ends without a report exits with failure; the error
/// object on stdout is the only output.
fn compare(cfg: &TextgenConfig, mock: bool, args: CompareArgs) -> anyhow::Result<ExitCode> {
    let bounds = validate_bounds(cfg, &args.bounds)?;
    let ngram = args.ngram.unwrap_or(cfg.no_repeat_ngram_size);
    if ngram == 0 {
        bail!("n-gram size must be positive");
    }
    let backend = select_backend(cfg, mock)?;
    let hf = load_tokenizer(cfg)?;
    let fallback = BackendTokenizer::new(backend.as_ref());
    let tokenizer: &dyn Tokenize = match &hf {
        Some(t) => t,
        None => &fallback,
    };

    let opts = CompareOptions {
        bounds,
        no_repeat_ngram_size: ngram,
        threshold: args.threshold.unwrap_or(cfg.reduction_threshold),
        format: if args.json { OutputFormat::Json } else { OutputFormat::Text },
    };
    let mut session = Session::new(
        backend.as_ref(),
        tokenizer,
        SamplingSettings::from_config(cfg),
        io::stdin().lock(),
        io::stdout().lock(),
    );
    Ok(match session.compare(&opts)? {
        Some(report) => {
            tracing::info!(target: "cli", "verdict: {:?}", report.verdict);
            ExitCode::SUCCESS
        }
        None if args.json => ExitCode::FAILURE,
        None => ExitCode::SUCCESS,
    })
}

fn list_models(cfg: &TextgenConfig) {
    let path = &cfg.model_dir;
    match std::fs::read_dir(path) {
        Ok(read_dir) => {
            println!("models dir: {}", path.display());
            for entry in read_dir.flatten() {
                println!("- {}", entry.path().display());
            }
        }
        Err(_) => println!("no models directory at {}", path.display()),
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );

    // stdout carries the interactive session
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Download URL and default file name for `hf://org/repo/path` or a plain URL.
fn resolve_source(source: &str) -> anyhow::Result<(String, String)> {
    if let Some(rest) = source.strip_prefix("hf://") {
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            bail!("invalid hf:// URL; expected hf://org/repo/file");
        }
        let file = parts[2..].join("/");
        let name = parts[parts.len() - 1].to_string();
        return Ok((format!("https://huggingface.co/{}/{}/resolve/main/{}", parts[0], parts[1], file), name));
    }
    if !(source.starts_with("https://") || source.starts_with("http://")) {
        bail!("unsupported source {}; use hf://org/repo/file or an http(s) URL", source);
    }
    let name = source.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("model.gguf");
    Ok((source.to_string(), name.to_string()))
}

fn pull_model(cfg: &TextgenConfig, args: PullArgs) -> anyhow::Result<()> {
    let (url, filename) = resolve_source(&args.source)?;
    let models_dir = &cfg.model_dir;
    std::fs::create_dir_all(models_dir).with_context(|| format!("creating {}", models_dir.display()))?;
    let target_path = models_dir.join(args.name.unwrap_or(filename));
    println!("Downloading to {}", target_path.display());

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let bytes = rt.block_on(download(&url))?;
    std::fs::write(&target_path, &bytes).with_context(|| format!("writing {}", target_path.display()))?;
    println!("Saved {} bytes", bytes.len());
    Ok(())
}

async fn download(url: &str) -> anyhow::Result<Vec<u8>> {
    let resp = reqwest::get(url).await.with_context(|| format!("request to {}", url))?;
    if !resp.status().is_success() {
        bail!("download failed: status {}", resp.status());
    }
    Ok(resp.bytes().await?.to_vec())
}
