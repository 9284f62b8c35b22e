//! # buildvariant
//!
//! Command-line tool that resolves the build variants of an Android package
//! from a declarative descriptor.
//!
//! ## Overview
//!
//! `buildvariant` reads a `buildvariant.toml` (or `.yaml`) descriptor, fills
//! every variant's unset fields from `[defaults]`, attaches signing
//! identities and validates manifest metadata. The result is either printed
//! as a resolved configuration or as the packaging steps each variant needs.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter descriptor
//! buildvariant init --application-id com.example.app
//!
//! # Resolve, supplying the values the SDK tool normally provides
//! buildvariant resolve --target-sdk 34 --version-code 1 --version-name 1.0.0
//!
//! # Show packaging steps as JSON
//! buildvariant plan --target-sdk 34 --version-code 1 --version-name 1.0.0 --format json
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `resolve` | Print the resolved configuration of every variant |
//! | `plan` | Print the packaging steps of every variant |
//! | `init` | Write a starter descriptor |
//!
//! ## Exit Status
//!
//! - `0` - every variant and the manifest resolved
//! - `1` - the descriptor could not be loaded
//! - `2` - at least one resolution error; one `error:` line per failure on stderr
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. `--verbose` enables debug
//! output; otherwise `RUST_LOG` is honoured. Passwords are never logged.
//!
//! ## Modules
//!
//! - [`config`] - Descriptor file loading and discovery

use anyhow::{Context, Result, bail};
use buildvariant_core::{PackagingStep, ProvidedValues, Resolution, plan, resolve_build};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub mod config;

use config::{CONFIG_FILE_NAME, DescriptorFile};

/// Exit status when any variant or the manifest fails to resolve.
const EXIT_RESOLUTION_FAILED: u8 = 2;

/// Resolve Android build variants from a declarative descriptor.
#[derive(Parser, Debug)]
#[command(name = "buildvariant", author, version, about = "Android build-variant resolver", long_about = None)]
struct Cli {
    /// Print debug diagnostics to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve every declared variant and print the result.
    Resolve(ResolveArgs),
    /// Print the packaging steps (version, shrink, sign) of every variant.
    Plan(ResolveArgs),
    /// Write a starter descriptor.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, default_value = "com.example.app")]
        application_id: String,
    },
}

#[derive(Args, Debug)]
struct ResolveArgs {
    #[arg(long, help = "Descriptor path (default: discover buildvariant.toml upwards)")]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[arg(long, help = "Write output to this file instead of stdout")]
    output: Option<PathBuf>,
    #[arg(long, help = "Minimum SDK supplied by the SDK tool")]
    min_sdk: Option<u32>,
    #[arg(long, help = "Target SDK supplied by the SDK tool")]
    target_sdk: Option<u32>,
    #[arg(long, help = "Compile SDK supplied by the SDK tool")]
    compile_sdk: Option<u32>,
    #[arg(long, help = "Version code supplied by the SDK tool")]
    version_code: Option<u32>,
    #[arg(long, help = "Version name supplied by the SDK tool")]
    version_name: Option<String>,
    #[arg(long, help = "Android debug keystore (default: ~/.android/debug.keystore)")]
    debug_keystore: Option<PathBuf>,
}

impl ResolveArgs {
    fn provided(&self) -> ProvidedValues {
        ProvidedValues {
            min_sdk: self.min_sdk,
            target_sdk: self.target_sdk,
            compile_sdk: self.compile_sdk,
            version_code: self.version_code,
            version_name: self.version_name.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[clap(rename_all = "lowercase")]
enum OutputFormat {
    Text,
    Json,
}

/// Entry point for the `buildvariant` binary.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    load_dotenv();

    match cli.command {
        Command::Resolve(args) => cmd_resolve(&args),
        Command::Plan(args) => cmd_plan(&args),
        Command::Init {
            output,
            application_id,
        } => {
            cmd_init(&output, &application_id)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => debug!(error = %err, "ignoring unreadable .env"),
    }
}

fn cmd_resolve(args: &ResolveArgs) -> Result<ExitCode> {
    let resolution = load_and_resolve(args)?;
    let rendered = match args.format {
        OutputFormat::Text => render_resolution_text(&resolution),
        OutputFormat::Json => to_json(&resolution)?,
    };
    emit(&rendered, args.output.as_deref())?;
    Ok(report_errors(&resolution))
}

fn cmd_plan(args: &ResolveArgs) -> Result<ExitCode> {
    let resolution = load_and_resolve(args)?;
    let steps = plan(&resolution);
    let rendered = match args.format {
        OutputFormat::Text => render_plan_text(&steps),
        OutputFormat::Json => to_json(&steps)?,
    };
    emit(&rendered, args.output.as_deref())?;
    Ok(report_errors(&resolution))
}

fn cmd_init(output: &Path, application_id: &str) -> Result<()> {
    if let Err(reason) = buildvariant_core::validate_application_id(application_id) {
        bail!("application id '{application_id}' is invalid: {reason}");
    }
    ensure_can_write(output)?;
    let contents = DescriptorFile::generate_starter_toml(application_id);
    fs::write(output, contents).with_context(|| format!("writing file {:?}", output))?;

    println!("✓ Wrote starter descriptor to {:?}", output);
    println!("\nNext steps:");
    println!("  1. Point [signing.release] at your upload keystore");
    println!("  2. Export KEYSTORE_PASSWORD and KEY_PASSWORD (or put them in .env)");
    println!("  3. Run: buildvariant resolve --target-sdk 34 --version-code 1 --version-name 1.0.0");
    Ok(())
}

fn load_and_resolve(args: &ResolveArgs) -> Result<Resolution> {
    let (file, path) = match &args.config {
        Some(path) => (DescriptorFile::load_from_file(path)?, path.clone()),
        None => DescriptorFile::discover()?.with_context(|| {
            format!("no {CONFIG_FILE_NAME} found in this directory or its parents; run `buildvariant init` or pass --config")
        })?,
    };
    info!(path = %path.display(), "using descriptor");

    let descriptor = file
        .into_descriptor()
        .with_context(|| format!("loading signing identities from {:?}", path))?;
    let debug_keystore = args
        .debug_keystore
        .clone()
        .unwrap_or_else(default_debug_keystore);

    Ok(resolve_build(&descriptor, &args.provided(), &debug_keystore))
}

/// Location of the Android debug keystore for the current user.
fn default_debug_keystore() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_default();
    home.join(".android").join("debug.keystore")
}

/// Prints one `error:` line per failed variant (manifest errors get their
/// own lines) and returns the exit status.
fn report_errors(resolution: &Resolution) -> ExitCode {
    for line in error_lines(resolution) {
        eprintln!("error: {line}");
    }
    ExitCode::from(exit_status(resolution))
}

fn error_lines(resolution: &Resolution) -> Vec<String> {
    let mut lines = Vec::new();
    let mut by_variant: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for err in &resolution.errors {
        match err.variant() {
            Some(variant) => by_variant.entry(variant).or_default().push(err.to_string()),
            None => lines.push(err.to_string()),
        }
    }
    for (variant, messages) in by_variant {
        match messages.as_slice() {
            [single] => lines.push(single.clone()),
            _ => lines.push(format!(
                "variant '{variant}' failed with {} errors: {}",
                messages.len(),
                messages.join("; ")
            )),
        }
    }
    lines
}

fn exit_status(resolution: &Resolution) -> u8 {
    if resolution.is_success() {
        0
    } else {
        EXIT_RESOLUTION_FAILED
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("serializing output")?;
    json.push('\n');
    Ok(json)
}

fn emit(contents: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            ensure_parent_dir(path)?;
            fs::write(path, contents).with_context(|| format!("writing file {:?}", path))?;
            info!(path = %path.display(), "wrote output");
        }
        None => print!("{contents}"),
    }
    Ok(())
}

fn render_resolution_text(resolution: &Resolution) -> String {
    let mut out = String::new();

    match &resolution.manifest {
        Some(manifest) => {
            let _ = writeln!(out, "Manifest");
            let _ = writeln!(out, "  application_id: {}", manifest.application_id);
            let _ = writeln!(out, "  namespace:      {}", manifest.namespace);
            let _ = writeln!(
                out,
                "  sdk:            min {} / target {} / compile {}",
                manifest.min_sdk, manifest.target_sdk, manifest.compile_sdk
            );
            let _ = writeln!(
                out,
                "  version:        {} ({})",
                manifest.version_name, manifest.version_code
            );
            if let Some(ndk) = &manifest.ndk_version {
                let _ = writeln!(out, "  ndk:            {ndk}");
            }
            let _ = writeln!(out, "  java:           {}", manifest.java_version);
        }
        None => {
            let _ = writeln!(out, "Manifest: unresolved");
        }
    }

    for (name, variant) in &resolution.variants {
        let _ = writeln!(out, "\nVariant {name}");
        let _ = writeln!(out, "  debuggable:       {}", variant.debuggable);
        let _ = writeln!(out, "  minify_enabled:   {}", variant.minify_enabled);
        let _ = writeln!(out, "  shrink_resources: {}", variant.shrink_resources);
        if let Some(rules) = variant.default_rules {
            let _ = writeln!(out, "  default_rules:    {}", rules.file_name());
        }
        if !variant.shrink_rule_files.is_empty() {
            let _ = writeln!(
                out,
                "  rule_files:       {}",
                variant.shrink_rule_files.join(", ")
            );
        }
        if let Some(suffix) = &variant.version_name_suffix {
            let _ = writeln!(out, "  version_suffix:   {suffix}");
        }
        match &variant.signing {
            Some(signing) => {
                let _ = writeln!(
                    out,
                    "  signing:          {} (alias {}, keystore {})",
                    signing.name,
                    signing.identity.key_alias,
                    signing.identity.store_path.display()
                );
            }
            None => {
                let _ = writeln!(out, "  signing:          unsigned");
            }
        }
    }

    if !resolution.errors.is_empty() {
        let _ = writeln!(
            out,
            "\n{} error(s); see stderr",
            resolution.errors.len()
        );
    }
    out
}

fn render_plan_text(steps: &BTreeMap<String, Vec<PackagingStep>>) -> String {
    let mut out = String::new();
    for (name, variant_steps) in steps {
        let _ = writeln!(out, "{name}:");
        for (index, step) in variant_steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", index + 1, step.describe());
        }
    }
    out
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating directory {:?}", parent))?;
    }
    Ok(())
}

fn ensure_can_write(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing file: {:?}", path);
    }
    ensure_parent_dir(path)
}
