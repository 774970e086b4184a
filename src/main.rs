//! CLI Entry Point for sonar-daq
//!
//! Provides command-line interface for:
//! - Writing a survey configuration file from a TOML survey description
//! - Running an acquisition session until Ctrl-C
//! - Post-processing a raw log into corrected soundings
//! - Deleting sounding ranges from an exported sounding file
//!
//! # Usage
//!
//! ```bash
//! sonar-daq configure --survey survey.toml --output Harbour_config.csv
//! sonar-daq acquire --survey-config Harbour_config.csv --sound-speed probe
//! sonar-daq process --raw Output/Harbour_raw_101500.csv --profile svp.csv \
//!     --soundings-out soundings.csv
//! sonar-daq clean --soundings soundings.csv --delete 120-135 --output clean.csv
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use figment::providers::{Format, Toml};
use figment::Figment;
use serde_json::json;
use sonar_daq::acquisition::{AcquisitionSession, Sensors, SoundSpeedSource};
use sonar_daq::config::Settings;
use sonar_daq::data::reader::{read_config_file, read_raw_log};
use sonar_daq::data::storage::{export_csv, write_meta_header};
use sonar_daq::logging;
use sonar_daq::metadata::{LogKind, Metadata};
use sonar_daq::processing::soundings::read_soundings;
use sonar_daq::processing::{
    extract_dops, extract_soundings, Extent, SoundSpeedProfile, SoundingEditor,
};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tracing::info;

#[derive(Parser)]
#[command(name = "sonar-daq")]
#[command(about = "Single-beam sonar acquisition and sound-speed correction", long_about = None)]
struct Cli {
    /// Settings file (missing keys fall back to defaults)
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a survey description and write the survey configuration file
    Configure {
        /// TOML survey description
        #[arg(long)]
        survey: PathBuf,

        /// Configuration file to write
        #[arg(long)]
        output: PathBuf,
    },

    /// Run an acquisition session until Ctrl-C
    Acquire {
        /// Survey configuration file written by `configure`
        #[arg(long)]
        survey_config: PathBuf,

        /// probe, default, or a sound speed in m/s
        #[arg(long, default_value = "default")]
        sound_speed: SoundSpeedSource,
    },

    /// Extract soundings and DOPs from a raw log, optionally correcting depths
    Process {
        /// Raw log written by `acquire`
        #[arg(long)]
        raw: PathBuf,

        /// Two-column depth,speed profile
        #[arg(long)]
        profile: Option<PathBuf>,

        #[arg(long)]
        soundings_out: Option<PathBuf>,

        #[arg(long)]
        dops_out: Option<PathBuf>,

        /// Harmonic-mean profile export (needs --profile)
        #[arg(long)]
        profile_out: Option<PathBuf>,
    },

    /// Delete sequence-number ranges from exported soundings
    Clean {
        /// Sounding export written by `process`
        #[arg(long)]
        soundings: PathBuf,

        /// Closed range to delete, as `first-last`; repeatable
        #[arg(long = "delete", value_parser = parse_range)]
        delete: Vec<(u64, u64)>,

        /// Window to report the depth range for, as `left:right`
        #[arg(long, default_value = "min:max")]
        window: String,

        /// Save the edited soundings here; nothing is saved without it
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    logging::init_from_settings(&settings).context("initialising logging")?;

    match cli.command {
        Commands::Configure { survey, output } => configure(&survey, &output),
        Commands::Acquire {
            survey_config,
            sound_speed,
        } => acquire(&settings, &survey_config, sound_speed).await,
        Commands::Process {
            raw,
            profile,
            soundings_out,
            dops_out,
            profile_out,
        } => process(
            &raw,
            profile.as_deref(),
            soundings_out.as_deref(),
            dops_out.as_deref(),
            profile_out.as_deref(),
        ),
        Commands::Clean {
            soundings,
            delete,
            window,
            output,
        } => clean(&soundings, &delete, &window, output.as_deref()),
    }
}

fn configure(survey: &Path, output: &Path) -> Result<()> {
    let metadata: Metadata = Figment::from(Toml::file(survey))
        .extract()
        .with_context(|| format!("reading survey description {}", survey.display()))?;
    metadata.validate().context("survey description rejected")?;
    write_meta_header(output, LogKind::Config, &metadata)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

async fn acquire(settings: &Settings, survey_config: &Path, source: SoundSpeedSource) -> Result<()> {
    let metadata = read_config_file(survey_config)
        .with_context(|| format!("reading survey configuration {}", survey_config.display()))?;
    let sensors = Sensors::serial(&metadata, &settings.acquisition);
    let session = AcquisitionSession::start(metadata, settings, sensors, source)
        .await
        .context("starting acquisition")?;
    println!("Raw log:    {}", session.raw_log_path().display());
    println!("Simple log: {}", session.simple_log_path().display());
    println!("Press Ctrl-C to stop.");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let summary = session.run(shutdown_rx).await.context("acquisition failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn process(
    raw: &Path,
    profile: Option<&Path>,
    soundings_out: Option<&Path>,
    dops_out: Option<&Path>,
    profile_out: Option<&Path>,
) -> Result<()> {
    let log = read_raw_log(raw).with_context(|| format!("reading raw log {}", raw.display()))?;
    let mut soundings = extract_soundings(&log.header.metadata, &log.records);
    let dops = extract_dops(&log.records);

    let mut corrected = 0;
    match (profile, profile_out) {
        (Some(path), profile_out) => {
            let profile = SoundSpeedProfile::load(path)
                .with_context(|| format!("loading profile {}", path.display()))?;
            corrected = profile.correct_soundings(&mut soundings);
            if let Some(out) = profile_out {
                export_csv(out, &profile.rows())?;
            }
        }
        (None, Some(_)) => bail!("--profile-out needs --profile"),
        (None, None) => {}
    }

    if let Some(out) = soundings_out {
        export_csv(out, &soundings)?;
    }
    if let Some(out) = dops_out {
        export_csv(out, &dops)?;
    }

    let summary = json!({
        "survey": log.header.metadata.survey.name,
        "rows": log.records.len(),
        "soundings": soundings.len(),
        "corrected": corrected,
        "dop_samples": dops.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn clean(
    soundings: &Path,
    delete: &[(u64, u64)],
    window: &str,
    output: Option<&Path>,
) -> Result<()> {
    let loaded = read_soundings(soundings)
        .with_context(|| format!("reading soundings {}", soundings.display()))?;
    let mut editor = SoundingEditor::new(loaded);

    for &(first, last) in delete {
        editor.delete_range(first, last);
    }

    let (left, right) = window
        .split_once(':')
        .context("window must look like left:right")?;
    editor.set_window(left.parse::<Extent>()?, right.parse::<Extent>()?)?;
    let (left, right) = editor.window();
    match editor.depth_range() {
        Some((min, max)) => println!(
            "Window [{}, {}]: depth {:.3} .. {:.3} m",
            left, right, min, max
        ),
        None => println!("Window [{}, {}]: no soundings", left, right),
    }

    let kept = editor.finish(output)?;
    info!("{} soundings kept", kept.len());
    Ok(())
}

fn parse_range(value: &str) -> Result<(u64, u64), String> {
    let (first, last) = value
        .split_once('-')
        .ok_or_else(|| format!("'{}' is not a first-last range", value))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u64>()
            .map_err(|e| format!("'{}': {}", s, e))
    };
    Ok((parse(first)?, parse(last)?))
}
