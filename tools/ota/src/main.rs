use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use ota_core::{report, ManifestSource, OtaConfig, UpdateManager};
use std::fs;
use std::path::PathBuf;

mod host;
mod release;

use host::{FileSlot, HostPlatform, ReqwestConnection};
use release::ReleaseMetadata;

#[derive(Parser)]
#[command(name = "ota")]
#[command(about = "Friyay firmware release and OTA check tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate version.json for a firmware build
    Manifest {
        /// Firmware image (firmware.bin)
        firmware: PathBuf,

        /// Release version, a leading `v` is stripped
        #[arg(long)]
        version: String,

        /// Release notes
        #[arg(long)]
        notes: Option<String>,

        /// Mark the release as critical
        #[arg(long)]
        critical: bool,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the device update check against a manifest URL
    Check {
        /// Manifest URL (release API endpoint or direct version.json)
        url: String,

        /// Version to compare against, as the device would report it
        #[arg(long, default_value = "unknown")]
        current: String,

        /// Manifest shape (inferred from the URL when omitted)
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Firmware URL for direct manifests (defaults to firmware.bin next to the manifest)
        #[arg(long)]
        firmware_url: Option<String>,

        /// Download and verify the image into this file when an update is available
        #[arg(long)]
        download: Option<PathBuf>,

        /// Size of the simulated update slot in bytes
        #[arg(long, default_value = "3145728")]
        slot_size: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Direct,
    Release,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Manifest { firmware, version, notes, critical, out } => {
            write_manifest(firmware, &version, notes, critical, out)
        }
        Command::Check { url, current, source, firmware_url, download, slot_size } => {
            check(url, &current, source, firmware_url, download, slot_size)
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "❌".red(), e);
        std::process::exit(1);
    }
}

fn write_manifest(
    firmware: PathBuf,
    version: &str,
    notes: Option<String>,
    critical: bool,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let image = fs::read(&firmware)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", firmware.display(), e))?;

    let max = OtaConfig::default().max_firmware_size;
    if image.len() as u64 > max as u64 {
        eprintln!(
            "{} {} bytes exceeds the device limit of {} bytes, devices will refuse it",
            "⚠️".yellow(),
            image.len(),
            max
        );
    }

    let json = ReleaseMetadata::for_image(&image, version, notes, critical).to_json()?;
    match out {
        Some(path) => {
            fs::write(&path, format!("{}\n", json))?;
            println!("{} Wrote {} ({} bytes firmware)", "✅".green(), path.display(), image.len());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn check(
    url: String,
    current: &str,
    source: Option<SourceArg>,
    firmware_url: Option<String>,
    download: Option<PathBuf>,
    slot_size: usize,
) -> anyhow::Result<()> {
    let source = match source {
        Some(SourceArg::Direct) => ManifestSource::Direct,
        Some(SourceArg::Release) => ManifestSource::ReleaseListing,
        None if url.contains("/releases/") => ManifestSource::ReleaseListing,
        None => ManifestSource::Direct,
    };
    let firmware_url = firmware_url.unwrap_or_else(|| match url.rfind('/') {
        Some(idx) => format!("{}/firmware.bin", &url[..idx]),
        None => String::new(),
    });

    let config = OtaConfig {
        manifest_url: url,
        source,
        firmware_url,
        ..OtaConfig::default()
    };
    config.validate().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    println!("{} Checking {}", "🔍".blue(), config.manifest_url);
    let slot_path = download.clone().unwrap_or_else(|| PathBuf::from("firmware.bin"));
    let mut manager = UpdateManager::new(
        config,
        current,
        ReqwestConnection::default(),
        FileSlot::new(slot_path, slot_size),
        HostPlatform::new(),
    );

    let available = manager.check_for_update();
    println!("\n{}\n", report::check_result(manager.current_version(), manager.status()));

    let Some(path) = download else {
        return Ok(());
    };
    if !available {
        println!("{}Nothing to download", "   ".dimmed());
        return Ok(());
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}%")?
            .progress_chars("#>-"),
    );
    let bar = pb.clone();
    manager.set_progress_sink(move |percent: u8| bar.set_position(percent as u64));

    if manager.perform_update() {
        pb.finish_and_clear();
        println!("{} Image verified and written to {}", "✅".green(), path.display());
        if manager.platform().restart_requested() {
            println!("{}A device would restart now", "   ".dimmed());
        }
        Ok(())
    } else {
        pb.abandon();
        Err(anyhow::anyhow!("{}", report::install_failed(manager.status())))
    }
}
