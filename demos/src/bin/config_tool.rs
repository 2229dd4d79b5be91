//! SAM-HQ Configuration Tool
//!
//! Generates, inspects and validates SAM-HQ model configuration files.
//!
//! ## Usage
//!
//! ```bash
//! # Print the default (ViT-B) configuration
//! cargo run --bin config_tool -- defaults
//!
//! # Write the ViT-H preset to a file
//! cargo run --bin config_tool -- defaults --variant vit-h --output config.json
//!
//! # Summarize an existing configuration
//! cargo run --bin config_tool -- show config.json
//!
//! # Validate, including the cross-module consistency checks
//! cargo run --bin config_tool -- check config.json --strict
//! ```
//!
//! Set `RUST_LOG=debug` to see discarded derived fields and other details.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use sam_hq_burn::{ConfigMapping, SamHqConfig, SamHqVariant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print or save a default configuration
    Defaults {
        /// Published architecture to generate
        #[arg(long, value_enum, default_value_t = Variant::VitB)]
        variant: Variant,

        /// Write the configuration here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },
    /// Load a configuration and print a summary followed by the normalized JSON
    Show {
        /// Path to the configuration file
        path: PathBuf,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        path: PathBuf,

        /// Also require the sub-configurations to be consistent with each other
        #[arg(long)]
        strict: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Variant {
    VitB,
    VitL,
    VitH,
}

impl From<Variant> for SamHqVariant {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::VitB => Self::VitB,
            Variant::VitL => Self::VitL,
            Variant::VitH => Self::VitH,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Defaults {
            variant,
            output,
            force,
        } => defaults(variant.into(), output.as_deref(), force),
        Command::Show { path } => show(&path),
        Command::Check { path, strict } => check(&path, strict),
    }
}

fn defaults(variant: SamHqVariant, output: Option<&Path>, force: bool) -> Result<()> {
    let config = SamHqConfig::from_variant(variant);

    let Some(output) = output else {
        println!("{config}");
        return Ok(());
    };

    if output.exists() && !force {
        anyhow::bail!(
            "Output file already exists: {} (use --force to overwrite)",
            output.display()
        );
    }
    config
        .save(output)
        .with_context(|| format!("Failed to write configuration: {}", output.display()))?;
    tracing::info!(?variant, output = %output.display(), "configuration written");
    Ok(())
}

fn load(path: &Path) -> Result<SamHqConfig> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }
    SamHqConfig::load_json(path)
        .with_context(|| format!("Failed to load configuration: {}", path.display()))
}

fn show(path: &Path) -> Result<()> {
    let config = load(path)?;
    let vision = config.vision_config();
    let prompt = config.prompt_encoder_config();
    let decoder = config.mask_decoder_config();

    tracing::info!(
        hidden_size = vision.hidden_size(),
        layers = vision.num_hidden_layers(),
        heads = vision.num_attention_heads(),
        mlp_dim = vision.mlp_dim(),
        window_size = vision.window_size(),
        global_layers = ?vision.global_attn_indexes(),
        grid = vision.grid_size(),
        "vision encoder",
    );
    tracing::info!(
        hidden_size = prompt.hidden_size(),
        image_embedding_size = prompt.image_embedding_size(),
        point_embeddings = prompt.num_point_embeddings(),
        hidden_act = %prompt.hidden_act(),
        "prompt encoder",
    );
    tracing::info!(
        hidden_size = decoder.hidden_size(),
        layers = decoder.num_hidden_layers(),
        heads = decoder.num_attention_heads(),
        multimask_outputs = decoder.num_multimask_outputs(),
        vision_encoder_dim = decoder.vision_encoder_dim(),
        "mask decoder",
    );
    if !config.extra().is_empty() {
        tracing::info!(keys = ?config.extra().keys().collect::<Vec<_>>(), "extra metadata");
    }

    println!("{}", config.to_json_string()?);
    Ok(())
}

fn check(path: &Path, strict: bool) -> Result<()> {
    let config = load(path)?;
    if strict {
        config
            .check_consistency()
            .with_context(|| format!("Inconsistent configuration: {}", path.display()))?;
    }
    tracing::info!(path = %path.display(), strict, "configuration is valid");
    Ok(())
}
