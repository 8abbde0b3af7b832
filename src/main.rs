use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facethumb::{config, report, Thumbnailer};
use log::info;

#[derive(Parser)]
#[command(name = "facethumb")]
#[command(version, about = "Pick a face-centred thumbnail for a video")]
struct Cli {
    /// Config file (defaults to the installed location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a video and write the best face frame as a JPEG thumbnail
    Video {
        input: PathBuf,
        output: PathBuf,
        /// Number of evenly spaced frames to probe
        #[arg(short, long)]
        probes: Option<usize>,
    },
    /// Detect faces in an image and print them as JSON (`-` reads stdin)
    Image { input: String },
    /// Open config file in editor, writing defaults first if it is missing
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Video {
            input,
            output,
            probes,
        } => video(&cfg, &input, &output, probes.unwrap_or(cfg.probes)),
        Commands::Image { input } => image(&cfg, &input),
        Commands::Config => open_config(&cfg, cli.config.as_deref()),
    }
}

fn thumbnailer(cfg: &config::Config) -> Result<Thumbnailer> {
    Thumbnailer::init(
        &cfg.detect_model,
        cfg.assess_model.as_deref(),
        &cfg.thumbnailer_config(),
    )
    .context("Failed to initialize face models")
}

fn video(cfg: &config::Config, input: &Path, output: &Path, probes: usize) -> Result<()> {
    info!("Sampling {} frames from {}", probes, input.display());

    let mut thumbnailer = thumbnailer(cfg)?;
    if thumbnailer.run(input, output, probes)? {
        info!("Thumbnail written to {}", output.display());
    } else {
        info!("No qualifying face found, nothing written");
    }
    Ok(())
}

fn image(cfg: &config::Config, input: &str) -> Result<()> {
    let mut thumbnailer = thumbnailer(cfg)?;
    let detections = if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read image from stdin")?;
        thumbnailer.run_image_buf(&buf)?
    } else {
        thumbnailer.run_image(Path::new(input))?
    };

    info!("Found {} face(s)", detections.len());
    println!("{}", report::to_json(&detections)?);
    Ok(())
}

fn open_config(cfg: &config::Config, path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        info!("Writing default config to {:?}", config_path);
        config::save_config(cfg, Some(config_path)).context("Failed to write config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
