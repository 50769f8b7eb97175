// protolua CLI - run Lua scripts against protobuf schemas

mod exit_codes;
mod logging;
mod registry;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::debug;
use prost_reflect::DescriptorPool;
use protolua_bridge::{ProtoLib, ResourceBudget, RuntimeLimits, ScriptResult, ScriptRuntime};
use protolua_config::{ConfigError, Settings};

use exit_codes::{
    EXIT_CONFIG_INVALID, EXIT_DESCRIPTOR_INVALID, EXIT_IO, EXIT_LIMIT_EXCEEDED, EXIT_SCRIPT_ERROR,
    EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "protolua")]
#[command(about = "Run Lua scripts against protobuf messages")]
#[command(version)]
struct Cli {
    /// Serialized FileDescriptorSet to load into the registry (repeatable)
    #[arg(long = "descriptor-set", short = 'd', value_name = "FILE", global = true)]
    descriptor_sets: Vec<PathBuf>,

    /// Settings file [default: <config dir>/protolua/settings.toml]
    #[arg(long, value_name = "FILE", env = "PROTOLUA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log more to stderr (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Lua script with the `proto` module loaded
    #[command(after_help = "\
Examples:
  protolua run fix_prices.lua -d catalog.pb
  protolua run - -d catalog.pb < script.lua")]
    Run {
        /// Script file, or - for stdin
        script: PathBuf,
    },

    /// Evaluate a chunk; a bare expression prints its value
    #[command(after_help = "\
Examples:
  protolua eval 'proto.new(\"shop.Item\")' -d catalog.pb
  protolua eval 'local m = proto.new(\"shop.Item\"); m.sku = \"A1\"; return #m:Marshal()' -d catalog.pb")]
    Eval {
        /// Lua source
        chunk: String,
    },

    /// List message types in the registry
    Types {
        /// Only names starting with this prefix (e.g. a package name)
        prefix: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Run { script } => cmd_run(&script, cli.config.as_deref(), &cli.descriptor_sets),
        Commands::Eval { chunk } => cmd_eval(&chunk, cli.config.as_deref(), &cli.descriptor_sets),
        Commands::Types { prefix } => cmd_types(prefix.as_deref(), cli.config.as_deref(), &cli.descriptor_sets),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn script(msg: impl Into<String>) -> Self {
        Self { code: EXIT_SCRIPT_ERROR, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn descriptor(msg: impl Into<String>) -> Self {
        Self { code: EXIT_DESCRIPTOR_INVALID, message: msg.into(), hint: None }
    }

    pub fn limit(msg: impl Into<String>) -> Self {
        Self { code: EXIT_LIMIT_EXCEEDED, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        match err {
            ConfigError::Io { .. } => Self::io(err.to_string()),
            _ => Self { code: EXIT_CONFIG_INVALID, message: err.to_string(), hint: None },
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Setup shared by all commands
// ============================================================================

fn load_settings(config: Option<&Path>) -> Result<Settings, CliError> {
    match config {
        // An explicit path must exist; the default location may not.
        Some(path) if !path.exists() => {
            Err(CliError::io(format!("{}: config file not found", path.display())))
        }
        Some(path) => Settings::load_from(path).map_err(CliError::config),
        None => Settings::load().map_err(CliError::config),
    }
}

/// Descriptor sets from the settings file first, then from the command line.
fn load_registry(settings: &Settings, extra: &[PathBuf]) -> Result<DescriptorPool, CliError> {
    let mut paths = settings.proto.descriptor_sets.clone();
    paths.extend(extra.iter().cloned());
    registry::load(&paths)
}

fn runtime_limits(settings: &Settings) -> RuntimeLimits {
    let runtime = &settings.runtime;
    RuntimeLimits {
        instruction_limit: runtime.instruction_limit,
        hook_interval: runtime.hook_interval,
        timeout: Duration::from_secs(runtime.timeout_secs),
        memory_limit: runtime.memory_limit_bytes,
        max_output_lines: runtime.max_output_lines,
    }
}

fn build_runtime(config: Option<&Path>, descriptor_sets: &[PathBuf]) -> Result<ScriptRuntime, CliError> {
    let settings = load_settings(config)?;
    let pool = load_registry(&settings, descriptor_sets)?;
    let budget = ResourceBudget::new(
        settings.proto.enumeration_budget_bytes,
        settings.proto.producer_overhead_bytes,
    );
    let lib = ProtoLib::new(pool).with_budget(budget);
    ScriptRuntime::new(&lib, runtime_limits(&settings))
        .map_err(|e| CliError::script(format!("cannot start Lua runtime: {e}")))
}

/// Print captured output and the returned value, then turn a failure into
/// the matching exit code.
fn report(result: ScriptResult) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for line in &result.output {
        writeln!(handle, "{}", line).map_err(|e| CliError::io(e.to_string()))?;
    }
    if let Some(returned) = &result.returned {
        writeln!(handle, "{}", returned).map_err(|e| CliError::io(e.to_string()))?;
    }

    let hit_limit = result.hit_limit();
    match result.error {
        None => Ok(()),
        Some(message) if hit_limit => Err(CliError::limit(message)
            .with_hint("raise the limits in the [runtime] section of the settings file")),
        Some(message) => Err(CliError::script(message)),
    }
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(script: &Path, config: Option<&Path>, descriptor_sets: &[PathBuf]) -> Result<(), CliError> {
    let (source, name) = if script == Path::new("-") {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| CliError::io(format!("stdin: {e}")))?;
        (source, "stdin".to_string())
    } else {
        let source = fs::read_to_string(script)
            .map_err(|e| CliError::io(format!("{}: {}", script.display(), e)))?;
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());
        (source, name)
    };

    let rt = build_runtime(config, descriptor_sets)?;
    debug!("running {name} ({} bytes)", source.len());
    report(rt.run(&source, &name))
}

// ============================================================================
// eval
// ============================================================================

fn cmd_eval(chunk: &str, config: Option<&Path>, descriptor_sets: &[PathBuf]) -> Result<(), CliError> {
    if chunk.trim().is_empty() {
        return Err(CliError::usage("empty chunk"));
    }
    let rt = build_runtime(config, descriptor_sets)?;
    report(rt.eval(chunk))
}

// ============================================================================
// types
// ============================================================================

fn cmd_types(prefix: Option<&str>, config: Option<&Path>, descriptor_sets: &[PathBuf]) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let pool = load_registry(&settings, descriptor_sets)?;
    let names = registry::message_names(&pool, prefix);
    if names.is_empty() && pool.files().count() == 0 {
        return Err(CliError::usage("no descriptor sets loaded")
            .with_hint("pass -d <file> or list descriptor_sets under [proto] in the settings file"));
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for name in names {
        writeln!(handle, "{}", name).map_err(|e| CliError::io(e.to_string()))?;
    }
    Ok(())
}
