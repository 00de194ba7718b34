use std::path::{Component, Path, PathBuf};
use std::sync::Once;

static PERF_TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "lama::vm=info,lama::vm::image=debug,lama::rt::gc=debug,lama_core=info,lama_cli=info";

use anyhow::Context;
use clap::{Parser, Subcommand};
use lama_core::{
    config::InterpreterConfig,
    vm::{BytecodeImage, Interpreter, disassemble, frequency},
};


#[derive(Debug, Parser)]
#[command(name = "lama", author, version, about = "Interpreter for Lama bytecode files", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a bytecode file to completion
    Interpret {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,

        /// TOML file with interpreter settings
        #[arg(long, value_name = "PATH", value_parser = parse_sanitized_path)]
        config: Option<PathBuf>,

        /// Operand stack capacity in words
        #[arg(long, value_name = "N")]
        stack_words: Option<usize>,
    },

    /// Report how often each instruction occurs
    Analyze {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a disassembly listing
    Disasm {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Installs a stderr subscriber when `LAMA_TRACE` is set. The value is either
/// a toggle (`1`, `true`, `on`) or a filter expression.
fn maybe_init_perf_tracing() {
    let raw = match std::env::var("LAMA_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    PERF_TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Defaults, then the optional file, then `LAMA_*` variables, then flags.
fn resolve_config(path: Option<&Path>, stack_words: Option<usize>) -> anyhow::Result<InterpreterConfig> {
    let base = match path {
        Some(path) => InterpreterConfig::load(path)?,
        None => InterpreterConfig::default(),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(words) = stack_words {
        config.stack_words = words;
    }
    config.validate()?;
    Ok(config)
}

fn interpret(file: &Path, config: &InterpreterConfig) -> anyhow::Result<()> {
    let image = BytecodeImage::load(file)?;
    tracing::debug!(target: "lama_cli", file = %file.display(), stack = config.stack_words, "interpreting");
    let mut interp = Interpreter::new(image, config).context("failed to set up the interpreter")?;
    if let Err(fault) = interp.run() {
        eprintln!("Error: {}", fault);
        std::process::exit(1);
    }
    Ok(())
}

fn analyze(file: &Path, json: bool) -> anyhow::Result<()> {
    let image = BytecodeImage::load(file)?;
    let report = frequency(&image).with_context(|| format!("cannot analyze {}", file.display()))?;
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn disasm(file: &Path) -> anyhow::Result<()> {
    let image = BytecodeImage::load(file)?;
    let lines = disassemble(&image).with_context(|| format!("cannot disassemble {}", file.display()))?;
    for line in &lines {
        println!("{line}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_perf_tracing();

    let CliArgs { command } = CliArgs::parse();

    match command {
        Commands::Interpret {
            file,
            config,
            stack_words,
        } => {
            let config = resolve_config(config.as_deref(), stack_words)?;
            interpret(&file, &config)
        }
        Commands::Analyze { file, json } => analyze(&file, json),
        Commands::Disasm { file } => disasm(&file),
    }
}
