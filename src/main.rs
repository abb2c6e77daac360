use clap::Parser;
use episode_sorter::{load_rules, start, ReportKind, WatcherConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "sorter")]
#[command(
	about = "Watches download folders and copies matching episodes into a media library with sequential names"
)]
struct Cli {
	/// Path of the JSON rules document (a sample is written if missing)
	#[arg(short, long, default_value = "rules.json")]
	config: PathBuf,

	/// Enable verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// Seconds a file's size must hold before it is copied
	#[arg(long, default_value_t = 3)]
	stability_secs: u64,

	/// Window in milliseconds for merging repeated events on one file
	#[arg(long, default_value_t = 500)]
	debounce_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	let level = if cli.verbose {
		Level::DEBUG
	} else {
		Level::INFO
	};
	tracing_subscriber::fmt().with_max_level(level).init();

	let rules = match load_rules(&cli.config) {
		Ok(rules) => rules,
		Err(e) => {
			if e.is_configuration_error() {
				error!("Fix the rules in {} and start again", cli.config.display());
			}
			return Err(e.into());
		}
	};

	let config = WatcherConfig {
		stability_interval: Duration::from_secs(cli.stability_secs),
		debounce_window: Duration::from_millis(cli.debounce_ms),
		..Default::default()
	};

	let (handle, mut reports) = start(rules, config)?;

	info!("Press ENTER to run manual scan on all files. Ctrl+C to exit.");

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut stdin_open = true;
	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);

	loop {
		tokio::select! {
			_ = &mut ctrl_c => break,
			line = lines.next_line(), if stdin_open => match line {
				Ok(Some(line)) if line.trim().is_empty() => {
					handle.rescan().await?;
				}
				Ok(Some(_)) => {}
				Ok(None) => stdin_open = false,
				Err(e) => {
					warn!("Console input unavailable: {}", e);
					stdin_open = false;
				}
			},
			Some(report) = reports.recv() => {
				if let ReportKind::RescanCompleted { .. } = report.kind {
					info!("Press ENTER to run manual scan on all files. Ctrl+C to exit.");
				}
			}
		}
	}

	info!("Shutting down watcher...");
	handle.stop().await?;

	Ok(())
}
