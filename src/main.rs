use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use wsl_toast::bridge::{default_config_dir, default_templates_dir};
use wsl_toast::config::{
    config_exists, get_config_path, read_persisted, validate_config, ToastDuration, ToastType,
};
use wsl_toast::overrides::EnvOverrides;
use wsl_toast::{DispatchOutcome, Notifier, ToastBridge};

#[derive(Parser)]
#[command(name = "wsl-toast", bin_name = "wsl-toast", version, about = "Windows toast notifications from WSL2")]
struct Cli {
    /// Directory holding config.json (default: ~/.wsl-toast)
    #[arg(long, global = true, env = "WSL_TOAST_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Directory holding <lang>.json templates (default: <config-dir>/templates/notifications)
    #[arg(long, global = true, env = "WSL_TOAST_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Print the PowerShell command instead of running it
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a notification with the given title and message
    Send {
        title: String,
        message: String,
        /// Information, Warning, Error or Success
        #[arg(short = 't', long = "type")]
        toast_type: Option<ToastType>,
        /// Short, Normal or Long
        #[arg(short, long)]
        duration: Option<ToastDuration>,
    },
    /// Show a localized notification from a template key (e.g. tool_completed)
    Event {
        key: String,
        /// Language code (default: configured language)
        #[arg(short, long)]
        lang: Option<String>,
        /// Placeholder value, repeatable: --var name=World
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        #[arg(short = 't', long = "type")]
        toast_type: Option<ToastType>,
        /// Print the resolved title and message without notifying
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or edit config.json
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List languages with a loadable template file
    Languages,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print one value
    Get { key: String },
    /// Set one value (JSON literals like true/false are parsed)
    Set { key: String, value: String },
    /// Overwrite config.json with the defaults
    Reset,
    /// Check config.json for invalid values
    Validate,
    /// Print the config file path
    Path,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ログ初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wsl_toast=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };
    let templates_dir = cli
        .templates
        .unwrap_or_else(|| default_templates_dir(&config_dir));
    let notifier = if cli.mock {
        Notifier::mock()
    } else {
        Notifier::detect()
    };

    let mut bridge =
        ToastBridge::new(config_dir, templates_dir, notifier).with_overrides(EnvOverrides::from_env());

    match cli.command {
        Commands::Send {
            title,
            message,
            toast_type,
            duration,
        } => {
            let outcome = bridge.send(&title, &message, toast_type, duration);
            report(outcome.map_err(anyhow::Error::from))
        }
        Commands::Event {
            key,
            lang,
            vars,
            toast_type,
            dry_run,
        } => {
            let vars: HashMap<String, String> = vars.into_iter().collect();
            if dry_run {
                let template = bridge.resolve_event(&key, lang.as_deref(), &vars)?;
                println!("{}\n{}", template.title, template.message);
                return Ok(());
            }
            report(bridge.send_event(&key, lang.as_deref(), &vars, toast_type))
        }
        Commands::Config { action } => run_config(&mut bridge, action),
        Commands::Languages => {
            let languages = bridge.templates().get_available_languages();
            if languages.is_empty() {
                println!("No templates in {:?}", bridge.templates().base_dir());
            }
            for lang in languages {
                println!("{}", lang);
            }
            Ok(())
        }
    }
}

fn report(outcome: Result<DispatchOutcome>) -> Result<()> {
    match outcome {
        Ok(DispatchOutcome::Launched { pid }) => {
            tracing::debug!(pid, "Launched");
            Ok(())
        }
        Ok(DispatchOutcome::Disabled) => Ok(()),
        Ok(DispatchOutcome::Mocked { command }) => {
            println!("[mock] {}", command.join(" "));
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_config(bridge: &mut ToastBridge, action: ConfigAction) -> Result<()> {
    let dir = bridge.config_dir().to_path_buf();

    match action {
        ConfigAction::Show => {
            let settings = bridge.settings();
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigAction::Get { key } => match bridge.configs().get_config_value(&key, &dir, None) {
            Some(Value::String(s)) => println!("{}", s),
            Some(value) => println!("{}", value),
            None => bail!("Unknown config key: {}", key),
        },
        ConfigAction::Set { key, value } => {
            bridge.configs().set_config_value(&key, parse_value(&value), &dir)?;
            println!("{} updated in {:?}", key, get_config_path(&dir));
        }
        ConfigAction::Reset => {
            bridge.configs().reset_config(&dir)?;
            println!("Config reset to defaults: {:?}", get_config_path(&dir));
        }
        ConfigAction::Validate => {
            if !config_exists(&dir) {
                println!("No config file; defaults in use");
                return Ok(());
            }
            let persisted = read_persisted(&dir)
                .with_context(|| format!("Config file is unreadable: {:?}", get_config_path(&dir)))?
                .unwrap_or_default();
            let validation = validate_config(&persisted);
            if validation.is_valid() {
                println!("Config OK");
            } else {
                for issue in validation.issues() {
                    eprintln!("  {}", issue);
                }
                bail!("{} invalid setting(s)", validation.issues().len());
            }
        }
        ConfigAction::Path => println!("{}", get_config_path(&dir).display()),
    }
    Ok(())
}
