use promotion_content_sync::source::HttpContentSource;
use promotion_content_sync::store::Store;
use promotion_content_sync::sync::SyncScheduler;
use promotion_content_sync::{SyncConfig, SyncOrchestrator};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

const USAGE: &str = "Usage: promotion-content-sync [CONFIG] [--once | --entity <key>]";

enum Mode {
	Scheduled,
	Once,
	Entity(String),
}

struct Args {
	config_path: Option<String>,
	mode: Mode,
}

fn parse_args() -> Result<Args, String> {
	let mut config_path = std::env::var("SYNC_CONFIG").ok();
	let mut mode = Mode::Scheduled;
	let mut args = std::env::args().skip(1);

	while let Some(arg) = args.next() {
		match arg.as_str() {
			"--once" => mode = Mode::Once,
			"--entity" => {
				let key = args.next().ok_or_else(|| "--entity requires a key".to_string())?;
				mode = Mode::Entity(key);
			}
			"-h" | "--help" => return Err(USAGE.to_string()),
			flag if flag.starts_with("--") => return Err(format!("Unknown flag {}\n{}", flag, USAGE)),
			path => config_path = Some(path.to_string()),
		}
	}

	Ok(Args { config_path, mode })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("reqwest=warn".parse()?)
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let args = match parse_args() {
		Ok(args) => args,
		Err(message) => {
			eprintln!("{}", message);
			std::process::exit(2);
		}
	};

	let mut config = match &args.config_path {
		Some(path) => {
			info!("Loading configuration from {}", path);
			SyncConfig::from_file(path)?
		}
		None => SyncConfig::default(),
	};
	config.apply_env_overrides()?;

	let source = Arc::new(HttpContentSource::new(&config.source)?);
	let orchestrator = Arc::new(SyncOrchestrator::with_store(config, source, Store::in_memory()));

	match args.mode {
		Mode::Once => {
			let report = orchestrator.run_manual().await;
			println!("{}", serde_json::to_string_pretty(&report)?);
			if !report.is_success() {
				std::process::exit(1);
			}
		}
		Mode::Entity(key) => {
			let result = orchestrator.run_one_by_key(&key).await;
			println!("{}", serde_json::to_string_pretty(&result)?);
			if !result.success {
				std::process::exit(1);
			}
		}
		Mode::Scheduled => {
			let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
			let scheduler = SyncScheduler::new(orchestrator.clone());
			let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

			tokio::signal::ctrl_c().await?;
			info!("Received interrupt, stopping");
			if shutdown_tx.send(()).is_err() {
				error!("Scheduler already stopped");
			}
			let ticks = handle.await?;
			info!("Completed {} scheduled runs", ticks);
			info!("{}", serde_json::to_string(&orchestrator.status())?);
		}
	}

	Ok(())
}
