//! `slugnote-server` entry point.

use log::{error, info};
use slugnote_core::db::open_shared_db;
use slugnote_core::{init_logging, AppConfig};
use slugnote_server::{router, AppState, ServerSettings};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("slugnote-server: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging(&config.log_level, config.log_dir.as_deref()) {
        eprintln!("slugnote-server: {err}");
        return ExitCode::FAILURE;
    }

    let conn = match open_shared_db(&config.db_path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=server_start module=server status=error stage=db_open error={}",
                err
            );
            return ExitCode::FAILURE;
        }
    };
    let state = AppState::new(conn, ServerSettings::from_config(&config));

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(
                "event=server_start module=server status=error stage=bind addr={} error={}",
                config.bind_addr, err
            );
            return ExitCode::FAILURE;
        }
    };
    info!(
        "event=server_start module=server status=ok addr={} revalidate_hook={}",
        config.bind_addr,
        config.revalidate_token.is_configured()
    );

    let serve = axum::serve(listener, router(state)).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    if let Err(err) = serve.await {
        error!("event=server_stop module=server status=error error={}", err);
        return ExitCode::FAILURE;
    }
    info!("event=server_stop module=server status=ok");
    ExitCode::SUCCESS
}
