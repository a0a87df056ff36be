//! bkt-guard - operator tooling for the authentication and policy core
//!
//! Validates and evaluates policy documents, generates access keys and checks
//! configuration files.

use anyhow::Context;
use bkt_guard::authz::{evaluate, validate_policy_document, EvaluationContext};
use bkt_guard::config::{Config, LogFormat};
use bkt_guard::credentials::keygen::{generate_access_key, generate_secret_key};
use bkt_guard::credentials::SecretCipher;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// bkt-guard - SigV4 authentication and IAM-style policy tooling
#[derive(Parser, Debug)]
#[command(name = "bkt-guard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a policy document and print its normalized form
    Validate {
        /// Policy document (JSON)
        policy: PathBuf,
    },

    /// Evaluate one policy document against an action and resource
    Evaluate {
        #[arg(long)]
        policy: PathBuf,

        /// e.g. s3:GetObject
        #[arg(long)]
        action: String,

        /// e.g. arn:aws:s3:::bucket/key
        #[arg(long)]
        resource: String,

        /// Evaluate as an administrator
        #[arg(long)]
        admin: bool,
    },

    /// Generate an access key pair and the stored form of its secret
    Keygen,

    /// Load and validate the configuration file
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.command {
        Command::Keygen | Command::CheckConfig => Some(
            Config::load(&args.config)
                .with_context(|| format!("loading {}", args.config.display()))?,
        ),
        _ => None,
    };

    let level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "warn".to_string());
    let format = config
        .as_ref()
        .map(|c| c.logging.format)
        .unwrap_or(LogFormat::Pretty);
    init_logging(&level, format)?;

    debug!("bkt-guard v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Validate { policy } => {
            let raw = std::fs::read_to_string(&policy)
                .with_context(|| format!("reading {}", policy.display()))?;
            match validate_policy_document(&raw) {
                Ok(document) => println!("{}", document.to_json_pretty()?),
                Err(e) => {
                    eprintln!("invalid policy: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Command::Evaluate {
            policy,
            action,
            resource,
            admin,
        } => {
            let raw = std::fs::read_to_string(&policy)
                .with_context(|| format!("reading {}", policy.display()))?;
            let document = match validate_policy_document(&raw) {
                Ok(document) => document,
                Err(e) => {
                    eprintln!("invalid policy: {}", e);
                    std::process::exit(1);
                }
            };

            let mut ctx = EvaluationContext::new("cli", &action, &resource);
            ctx.is_admin = admin;
            let decision = evaluate(&document, &ctx);
            debug!(?decision, "Evaluated policy");
            println!("{}", if decision.is_allowed() { "allow" } else { "deny" });
        }

        Command::Keygen => {
            let config = config.context("configuration required")?;
            let cipher = SecretCipher::from_passphrase(&config.auth.encryption_key)?;

            let access_key_id = generate_access_key();
            let secret_key = generate_secret_key();
            let encrypted = cipher.encrypt(secret_key.expose_secret())?;

            println!("access_key_id:     {}", access_key_id);
            println!("secret_access_key: {}", secret_key.expose_secret());
            println!("secret_encrypted:  {}", encrypted);
        }

        Command::CheckConfig => {
            let config = config.context("configuration required")?;
            info!(path = %args.config.display(), "Configuration is valid");
            println!("{}: ok", args.config.display());
            println!("  region:              {} (informational)", config.auth.region);
            println!("  service:             {} (informational)", config.auth.service);
            println!("  max_clock_skew_secs: {}", config.auth.max_clock_skew_secs);
            println!(
                "  combination_rule:    {:?}",
                config.authorization.combination_rule
            );
            println!(
                "  max_active_keys:     {}",
                config.credentials.max_active_keys_per_principal
            );
            println!("  metrics:             {}", config.metrics.enabled);
        }
    }

    Ok(())
}

/// Initialize logging to stderr. RUST_LOG takes precedence over `level`.
fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}
