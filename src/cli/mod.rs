//! OD-017: CLI subcommands — init, list, show, run, add, check, config, history.

use crate::audit::{eventlog, hasher};
use crate::core::augment::Augmenter;
use crate::core::config::{self, AppConfig};
use crate::core::parser::{self, Definition};
use crate::core::registry::Registry;
use crate::core::resolver::Environment;
use crate::core::session::Session;
use crate::core::state;
use crate::core::types::{AuditEvent, TimestampedEvent};
use crate::prompt::scripted::ScriptedPrompter;
use crate::prompt::terminal::TerminalPrompter;
use crate::prompt::Prompter;
use crate::resources::ConfiguredResources;
use crate::transport::local::ProcessValidator;
use crate::transport::sandbox::SandboxValidator;
use crate::transport::DefinitionValidator;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "opdeck",
    version,
    about = "Operator deck — run data operations, add new ones at runtime"
)]
pub struct Cli {
    #[command(flatten)]
    pub paths: Paths,

    #[command(subcommand)]
    pub command: Commands,
}

/// Files every command works against.
#[derive(Args, Debug, Clone)]
pub struct Paths {
    /// Application definition
    #[arg(short, long, global = true, default_value = "opdeck.ops")]
    pub definition: PathBuf,

    /// Connection config
    #[arg(short, long, global = true, default_value = "opdeck.yaml")]
    pub config: PathBuf,

    /// State directory (audit journal)
    #[arg(long, global = true, default_value = "state")]
    pub state_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a definition, a default config, and the state directory
    Init,

    /// List operations by display label
    List,

    /// Show an operation's parameters and prompt binding
    Show {
        /// Display label or internal name
        operation: String,
    },

    /// Run an operation, prompting for anything not given with --arg
    Run {
        /// Display label or internal name
        operation: String,

        /// Preset answer, `key=value` (repeatable)
        #[arg(short, long = "arg")]
        args: Vec<String>,
    },

    /// Add a script operation from a file (`-` for stdin)
    Add {
        source: PathBuf,

        /// Validate in-process with a restricted connection instead of a child process
        #[arg(long)]
        in_process: bool,
    },

    /// Validate a candidate definition (`-` for stdin)
    Check { file: PathBuf },

    /// Show or edit the connection config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show recent executions and augmentations
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Generate shell completions
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective config
    Show,
    /// Set a dotted key, e.g. `database.server`
    Set { key: String, value: String },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands, paths: &Paths) -> Result<(), String> {
    match cmd {
        Commands::Init => cmd_init(paths),
        Commands::List => cmd_list(&paths.definition),
        Commands::Show { operation } => cmd_show(&paths.definition, &operation),
        Commands::Run { operation, args } => {
            let stdin = std::io::stdin().lock();
            let terminal = TerminalPrompter::new(stdin, std::io::stdout());
            let mut prompter = ScriptedPrompter::from_pairs(&args)
                .map_err(|e| e.to_string())?
                .with_fallback(Box::new(terminal));
            cmd_run(paths, &operation, &mut prompter)
        }
        Commands::Add { source, in_process } => cmd_add(paths, &source, in_process),
        Commands::Check { file } => cmd_check(&paths.config, &file),
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&paths.config),
            ConfigAction::Set { key, value } => cmd_config_set(&paths.config, &key, &value),
        },
        Commands::History { limit } => cmd_history(paths, limit),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "opdeck", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(paths: &Paths) -> Result<(), String> {
    state::init_definition(&paths.definition).map_err(|e| e.to_string())?;
    println!("Initialized opdeck definition at {}", paths.definition.display());

    if !paths.config.exists() {
        config::save_config(&paths.config, &AppConfig::default()).map_err(|e| e.to_string())?;
        println!("  Created: {}", paths.config.display());
    }
    std::fs::create_dir_all(&paths.state_dir)
        .map_err(|e| format!("cannot create state dir: {}", e))?;
    println!("  Created: {}/", paths.state_dir.display());
    Ok(())
}

/// Parse the definition. A missing file means built-ins only.
fn load_definition(path: &Path) -> Result<Definition, String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no definition, built-ins only");
        return Ok(Definition::default());
    }
    let text = state::load_definition(path).map_err(|e| e.to_string())?;
    parser::parse_definition(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

fn load_registry(path: &Path) -> Result<(Definition, Registry), String> {
    let definition = load_definition(path)?;
    let registry = Registry::load(&definition).map_err(|e| e.to_string())?;
    Ok((definition, registry))
}

fn cmd_list(definition: &Path) -> Result<(), String> {
    let (_, registry) = load_registry(definition)?;
    println!("Operations ({}):", registry.len());
    for (name, label) in registry.list_operations() {
        println!("  {:<32} {}", label, name);
    }
    Ok(())
}

fn cmd_show(definition_path: &Path, operation: &str) -> Result<(), String> {
    let (definition, registry) = load_registry(definition_path)?;
    let entry = registry.resolve_name(operation).map_err(|e| e.to_string())?;
    let spec = entry.operation.spec();
    let script = definition.operation(&spec.name);

    println!("{} ({})", entry.label, spec.name);
    println!("  Source: {}", if script.is_some() { "definition" } else { "built-in" });
    if spec.params.is_empty() {
        println!("  Parameters: none");
    } else {
        println!("  Parameters:");
    }
    for param in &spec.params {
        let widget = entry
            .binding
            .as_ref()
            .and_then(|b| b.widget_for(&param.name))
            .map(|w| format!(" [{}]", w))
            .unwrap_or_default();
        println!(
            "    {}: {} ({}){}",
            param.name, param.declared_type, param.kind, widget
        );
    }
    if let Some(script) = script {
        println!();
        for line in script.source.trim_end().lines() {
            println!("  {}", line);
        }
    }
    Ok(())
}

fn cmd_run(paths: &Paths, operation: &str, prompter: &mut dyn Prompter) -> Result<(), String> {
    let (_, registry) = load_registry(&paths.definition)?;
    let label = registry
        .resolve_name(operation)
        .map_err(|e| e.to_string())?
        .label
        .clone();
    let app_config = config::load_config(&paths.config).map_err(|e| e.to_string())?;
    let resources = ConfiguredResources::new(app_config);
    let mut env = Environment::new(&resources, prompter);
    Session::new(&registry, &paths.state_dir)
        .run(&label, &mut env)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Read a file, or stdin for `-`.
fn read_input(path: &Path) -> Result<String, String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("cannot read stdin: {}", e))?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

fn cmd_add(paths: &Paths, source: &Path, in_process: bool) -> Result<(), String> {
    let text = read_input(source)?;
    let validator: Box<dyn DefinitionValidator> = if in_process {
        let app_config = config::load_config(&paths.config).map_err(|e| e.to_string())?;
        Box::new(SandboxValidator::for_config(&app_config))
    } else {
        Box::new(ProcessValidator::current_exe(&paths.config)?)
    };
    let added = Augmenter::new(&paths.definition, &paths.state_dir, validator)
        .add_operation(&text)
        .map_err(|e| e.to_string())?;
    println!("Operation '{}' added as '{}'", added.name, added.label);
    Ok(())
}

fn cmd_check(config_path: &Path, file: &Path) -> Result<(), String> {
    let text = read_input(file)?;
    let app_config = config::load_config(config_path).map_err(|e| e.to_string())?;
    SandboxValidator::for_config(&app_config).validate(&text)?;
    let definition = parser::parse_definition(&text).map_err(|e| e.to_string())?;
    println!("OK: {} operation(s)", definition.operations.len());
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<(), String> {
    let mut app_config = config::load_config(config_path).map_err(|e| e.to_string())?;
    if !app_config.database.pwd.is_empty() {
        app_config.database.pwd = "********".to_string();
    }
    let yaml = serde_yaml_ng::to_string(&app_config).map_err(|e| e.to_string())?;
    print!("{}", yaml);
    Ok(())
}

fn cmd_config_set(config_path: &Path, key: &str, value: &str) -> Result<(), String> {
    let mut app_config = config::load_config(config_path).map_err(|e| e.to_string())?;
    app_config.set(key, value).map_err(|e| e.to_string())?;
    config::save_config(config_path, &app_config).map_err(|e| e.to_string())?;
    println!("Saved {} = {}", key, if key.ends_with("pwd") { "********" } else { value });
    Ok(())
}

fn cmd_history(paths: &Paths, limit: usize) -> Result<(), String> {
    let events = eventlog::read_events(&paths.state_dir, usize::MAX).map_err(|e| e.to_string())?;
    if events.is_empty() {
        println!("No history.");
        return Ok(());
    }
    for event in &events[events.len().saturating_sub(limit)..] {
        println!("{}", describe_event(event));
    }
    if let Some(note) = definition_drift(&paths.definition, &events)? {
        println!("{}", note);
    }
    Ok(())
}

/// Compare the definition on disk with the hash recorded by the last addition.
fn definition_drift(definition: &Path, events: &[TimestampedEvent]) -> Result<Option<String>, String> {
    let Some(recorded) = events.iter().rev().find_map(|e| match &e.event {
        AuditEvent::OperationAdded { definition_after, .. } => Some(definition_after),
        _ => None,
    }) else {
        return Ok(None);
    };
    if !definition.exists() {
        return Ok(Some(format!("{} is missing", definition.display())));
    }
    let current = hasher::hash_file(definition).map_err(|e| e.to_string())?;
    if &current == recorded {
        return Ok(None);
    }
    Ok(Some(format!(
        "{} changed outside `opdeck add` (recorded {}, now {})",
        definition.display(),
        hasher::short(recorded),
        hasher::short(&current)
    )))
}

fn describe_event(event: &TimestampedEvent) -> String {
    let detail = match &event.event {
        AuditEvent::OperationAdded {
            name,
            label,
            definition_after,
            ..
        } => format!(
            "added     {} as '{}' (definition {})",
            name,
            label,
            hasher::short(definition_after)
        ),
        AuditEvent::AugmentationRejected { reason } => format!("rejected  {}", reason),
        AuditEvent::ExecutionStarted { run_id, operation } => {
            format!("started   {} [{}]", operation, run_id)
        }
        AuditEvent::ExecutionSucceeded {
            run_id,
            operation,
            result,
            committed,
            duration_seconds,
        } => format!(
            "ok        {} [{}] {} result, {} committed ({:.2}s)",
            operation, run_id, result, committed, duration_seconds
        ),
        AuditEvent::ExecutionFailed {
            run_id,
            operation,
            error,
            rolled_back,
        } => format!(
            "FAILED    {} [{}] {} ({} rolled back)",
            operation, run_id, error, rolled_back
        ),
    };
    format!("{}  {}", event.ts, detail)
}
