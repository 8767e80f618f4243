use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bundle_compiler::{load_bundle_dir, BundleType, CodeVariant, Compiler, CompilerConfig, Severity};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "bundlec", about = "Compile a component bundle directory", version)]
struct Cli {
    /// Bundle directory, `<namespace>/<name>`
    dir: PathBuf,

    /// Trust classification: internal, platform or thirdParty
    #[arg(long, default_value = "internal")]
    bundle_type: BundleType,

    /// YAML compiler configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Code variant to print
    #[arg(long, default_value = "dev")]
    variant: CodeVariant,

    /// Print the whole compile result as JSON
    #[arg(long)]
    json: bool,

    /// Print the code escaped for embedding as a JSON function body
    #[arg(long, conflicts_with = "json")]
    json_function: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<Arc<CompilerConfig>> {
    match path {
        Some(path) => {
            let config = CompilerConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("validating config {}", path.display()))?;
            Ok(Arc::new(config))
        }
        None => Ok(CompilerConfig::shared_default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let bundle = load_bundle_dir(&cli.dir, cli.bundle_type)
        .with_context(|| format!("loading bundle {}", cli.dir.display()))?;

    let result = Compiler::new()
        .with_config(config)
        .compile_bundle(&bundle)
        .map_err(|e| anyhow!("{}: {}", e.kind(), e))
        .with_context(|| format!("compiling {}", bundle.entry_path))?;

    for diagnostic in &result.compiler_report.diagnostics {
        let level = match diagnostic.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        eprintln!(
            "{}[{}]: {} ({}:{}:{})",
            level,
            diagnostic.code,
            diagnostic.message,
            diagnostic.file,
            diagnostic.location.line,
            diagnostic.location.column
        );
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let code = if cli.json_function {
            result.json_function_code(cli.variant)
        } else {
            result.code(cli.variant).map(str::to_string)
        };
        let Some(code) = code else {
            bail!("variant {} was not emitted; check `variants` in the config", cli.variant);
        };
        println!("{}", code);
    }

    if !result.compiler_report.success {
        std::process::exit(2);
    }
    Ok(())
}
