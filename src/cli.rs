//!
//! This module implements the CLI interface for cms-sync: command parsing, merging flags with the
//! optional settings file, and printing progress and per-kind outcomes.
//!
//! All reconciliation logic lives in the [`cms-sync-core`] crate. This module is strictly CLI
//! glue: it builds a [`DirectusClient`], moves snapshot documents between disk and the engine,
//! and renders failures.
//!
//! ## How To Use
//! - For command-line users: `cms-sync snapshot --help` / `cms-sync apply --help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! [`cms-sync-core`]: ../../cms_sync_core/
use crate::client::{Credentials, DirectusClient, DEFAULT_HOST};
use crate::load_config::{load_config, FileConfig};
use crate::store::{ensure_dir, read_snapshot, write_snapshot};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cms_sync_core::contract::ResourceKind;
use cms_sync_core::error::{
    ReconcileError, SectionError, Stage, StructuralError, TransportError, ValidationError,
};
use cms_sync_core::synchronise::{
    apply_snapshots, requested_kinds, take_snapshots, validate_filter, KindSnapshot,
    SnapshotOptions,
};
use futures::future::join_all;
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};

const DEFAULT_SNAPSHOT_DIR: &str = "./snapshot";

/// CLI for cms-sync: snapshot and apply CMS configuration.
#[derive(Parser, Debug)]
#[clap(
    name = "cms-sync",
    version,
    about = "Snapshot the configuration of a Directus instance and apply it to another"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export schema, translations, permissions and folders into a snapshot directory
    Snapshot {
        #[clap(flatten)]
        common: CommonArgs,
        /// Directory the snapshot files are written to
        #[clap(short = 'd', long)]
        dest: Option<PathBuf>,
        /// Directus filter (JSON) limiting which roles are exported
        #[clap(long, value_parser = parse_filter)]
        roles_filter: Option<Value>,
        /// Directus filter (JSON) limiting which folders are exported
        #[clap(long, value_parser = parse_filter)]
        folders_filter: Option<Value>,
    },
    /// Converge an instance towards the snapshot files in a directory
    Apply {
        #[clap(flatten)]
        common: CommonArgs,
        /// Directory the snapshot files are read from
        #[clap(short = 's', long)]
        src: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Static access token
    #[clap(short = 't', long, env = "DIRECTUS_TOKEN", conflicts_with_all = ["email", "password", "otp"])]
    pub token: Option<String>,
    /// Login email
    #[clap(short = 'e', long, env = "DIRECTUS_USER_EMAIL")]
    pub email: Option<String>,
    /// Login password
    #[clap(short = 'p', long, env = "DIRECTUS_USER_PASSWORD")]
    pub password: Option<String>,
    /// One-time password for accounts with two-factor authentication
    #[clap(short = 'o', long, env = "DIRECTUS_USER_OTP")]
    pub otp: Option<String>,
    /// Instance URL [default: http://localhost:8055]
    #[clap(short = 'H', long, env = "DIRECTUS_HOST")]
    pub host: Option<String>,
    /// Only process these kinds (comma-separated)
    #[clap(long, value_delimiter = ',', conflicts_with = "except")]
    pub only: Option<Vec<ResourceKind>>,
    /// Process every kind except these (comma-separated)
    #[clap(long, value_delimiter = ',')]
    pub except: Option<Vec<ResourceKind>>,
    /// Optional YAML settings file
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// Settings after merging flags, environment, the settings file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub credentials: Credentials,
    pub kinds: Vec<ResourceKind>,
}

impl Settings {
    pub fn resolve(common: CommonArgs, file: &FileConfig) -> Result<Self, ValidationError> {
        let pick = |flag: Option<String>, from_file: &Option<String>| flag.or_else(|| from_file.clone());

        let token = pick(common.token, &file.token);
        let email = pick(common.email, &file.email);
        let password = pick(common.password, &file.password);
        let otp = pick(common.otp, &file.otp);
        let credentials = match (token, email, password) {
            (Some(token), _, _) => Credentials::Token(token),
            (None, Some(email), Some(password)) => Credentials::Login {
                email,
                password,
                otp,
            },
            _ => Credentials::Anonymous,
        };

        // A kind filter given on the command line replaces both filters from the file.
        let (only, except) = if common.only.is_some() || common.except.is_some() {
            (common.only, common.except)
        } else {
            (file.only.clone(), file.except.clone())
        };
        let kinds = requested_kinds(only.as_deref(), except.as_deref())?;

        Ok(Self {
            host: pick(common.host, &file.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            credentials,
            kinds,
        })
    }
}

fn parse_filter(raw: &str) -> Result<Value, ValidationError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ValidationError::InvalidFilter(format!("not valid JSON: {e}")))?;
    validate_filter(value)
}

fn file_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(FileConfig::default()),
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Snapshot {
            common,
            dest,
            roles_filter,
            folders_filter,
        } => {
            let file = file_config(common.config.as_deref())?;
            let settings = Settings::resolve(common, &file)?;
            let dest = dest
                .or_else(|| file.dest.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
            let options = SnapshotOptions {
                roles_filter: roles_filter.or(file.roles_filter),
                folders_filter: folders_filter.or(file.folders_filter),
            };
            tracing::info!(command = "snapshot", host = %settings.host, dest = %dest.display(), "Starting snapshot");
            snapshot(&settings, &dest, &options).await
        }
        Commands::Apply { common, src } => {
            let file = file_config(common.config.as_deref())?;
            let settings = Settings::resolve(common, &file)?;
            let src = src
                .or_else(|| file.src.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
            tracing::info!(command = "apply", host = %settings.host, src = %src.display(), "Starting apply");
            apply(&settings, &src).await
        }
    }
}

async fn snapshot(settings: &Settings, dest: &Path, options: &SnapshotOptions) -> Result<()> {
    let client = DirectusClient::connect(&settings.host, settings.credentials.clone()).await?;
    ensure_dir(dest).await?;

    println!("Generating snapshots...");
    let mut failures = Vec::new();
    let mut taken = Vec::new();
    for outcome in take_snapshots(&client, &settings.kinds, options).await {
        match outcome {
            Ok(snapshot) => {
                println!("  [{}] OK", snapshot.kind());
                taken.push(snapshot);
            }
            Err(e) => failures.push(e),
        }
    }

    println!("Writing snapshots...");
    let written = join_all(taken.iter().map(|snapshot| async move {
        write_snapshot(dest, snapshot)
            .await
            .map(|_| snapshot.kind())
            .map_err(|e| SectionError::new(snapshot.kind(), Stage::Snapshot, e))
    }))
    .await;
    for outcome in written {
        match outcome {
            Ok(kind) => println!("  [{kind}] OK"),
            Err(e) => failures.push(e),
        }
    }

    finish(failures)
}

async fn apply(settings: &Settings, src: &Path) -> Result<()> {
    let client = DirectusClient::connect(&settings.host, settings.credentials.clone()).await?;

    println!("Reading snapshots...");
    let read = join_all(settings.kinds.iter().map(|&kind| async move {
        read_snapshot(src, kind)
            .await
            .map_err(|e| SectionError::new(kind, Stage::Apply, e))
    }))
    .await;
    let mut failures = Vec::new();
    let mut snapshots: Vec<KindSnapshot> = Vec::new();
    for outcome in read {
        match outcome {
            Ok(snapshot) => {
                println!("  [{}] OK", snapshot.kind());
                snapshots.push(snapshot);
            }
            Err(e) => failures.push(e),
        }
    }

    println!("Applying snapshots...");
    let report = apply_snapshots(&client, snapshots).await;
    for outcome in report.outcomes {
        match outcome {
            Ok(kind_report) => {
                tracing::info!(kind = %kind_report.kind, tally = ?kind_report.tally(), "Kind applied");
                println!("  [{}] OK", kind_report.kind);
            }
            Err(e) => failures.push(e),
        }
    }

    finish(failures)
}

fn finish(failures: Vec<SectionError>) -> Result<()> {
    if failures.is_empty() {
        println!("Done!");
        return Ok(());
    }
    for failure in &failures {
        tracing::error!(kind = %failure.kind, stage = %failure.stage, "Resource kind failed");
        eprintln!("{}", render_error(failure));
    }
    anyhow::bail!("{} resource kind(s) failed", failures.len())
}

/// Render an error chain for humans, preferring a recognised transport or structural cause
/// over the raw chain.
pub fn render_error(err: &(dyn Error + 'static)) -> String {
    if let Some(message) = recognised(err) {
        return message;
    }
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(current) = cause {
        if let Some(known) = recognised(current) {
            return format!("{message}: {known}");
        }
        message.push_str(": ");
        message.push_str(&current.to_string());
        cause = current.source();
    }
    message
}

fn recognised(err: &(dyn Error + 'static)) -> Option<String> {
    if let Some(e) = err.downcast_ref::<ReconcileError>() {
        return match e {
            ReconcileError::Transport(t) => Some(t.to_string()),
            ReconcileError::Structural(s) => Some(s.to_string()),
            ReconcileError::Format(_) => None,
        };
    }
    if let Some(e) = err.downcast_ref::<TransportError>() {
        return Some(e.to_string());
    }
    err.downcast_ref::<StructuralError>().map(ToString::to_string)
}
