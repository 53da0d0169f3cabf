// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The infra registry server binary.

use clap::{Parser, Subcommand};
use infra_server::{bootstrap, create_app_state, create_router};
use infra_server_db::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// infra-server - the registry for identities, destinations, and grants.
#[derive(Parser, Debug)]
#[command(name = "infra-server", about = "infra registry server", version)]
struct Args {
	/// Path to the server configuration file.
	#[arg(long)]
	config_file: Option<std::path::PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information.
	Version,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("infra-server {}", env!("CARGO_PKG_VERSION"));
		return std::process::ExitCode::SUCCESS;
	}

	dotenvy::dotenv().ok();

	match run(args).await {
		Ok(()) => std::process::ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!(error = %e, "server failed to start");
			eprintln!("infra-server: {e}");
			std::process::ExitCode::FAILURE
		}
	}
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
	let config = match &args.config_file {
		Some(path) => infra_server_config::load_config_with_file(path)?,
		None => infra_server_config::load_config()?,
	};

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"starting infra-server"
	);

	let pool =
		infra_server_db::create_pool(&config.database.url, config.database.max_connections).await?;
	infra_server_db::run_migrations(&pool).await?;

	let addr = config.socket_addr();
	let state = create_app_state(config, Store::new(pool)).await?;

	// reconcile configured users, keys, and providers; any failure here is
	// fatal and the process exits non-zero
	bootstrap::load(&state).await?;

	let app = create_router(state)
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("received shutdown signal");
		}
	}

	tracing::info!("server shutdown complete");
	Ok(())
}
