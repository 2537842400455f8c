use std::sync::Arc;

use anyhow::{Context, Result};

use drive_auth::auth::{preview, AuthManager, RefreshDaemon, Session};
use drive_auth::config::Config;
use drive_auth::prompt::TerminalPrompter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level; stdout is reserved for tokens
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("Credential store: {}", config.config_file.display());

    let manager = Arc::new(AuthManager::new(config.clone(), Arc::new(TerminalPrompter))?);

    if config.list_accounts {
        let accounts = manager.list_accounts()?;
        if accounts.is_empty() {
            eprintln!("No accounts configured yet.");
        }
        for (i, name) in accounts.iter().enumerate() {
            println!("{}. {}", i + 1, name);
        }
        return Ok(());
    }

    if let Some(name) = &config.delete_account {
        manager
            .delete_account(name)
            .with_context(|| format!("Failed to delete account \"{name}\""))?;
        return Ok(());
    }

    let session = match &config.service_account {
        Some(key_file) => manager.check_service_account(key_file).await,
        None => manager.check_credentials(&config.selection()).await,
    };
    let session = match session {
        Ok(session) => Arc::new(session),
        Err(e) => {
            tracing::error!("❌ Credential check failed: {}", e);
            anyhow::bail!("Credential check failed: {e}");
        }
    };

    let token = session.access_token().await?;
    tracing::info!(
        account = %session.account(),
        "✅ Authenticated (token: {}...)",
        preview(&token, 12)
    );
    println!("{token}");

    if config.no_token_service {
        return Ok(());
    }

    let daemon = session.spawn_refresh_daemon()?;
    serve_tokens(&session, daemon).await;

    Ok(())
}

/// Print every renewed token until a shutdown signal arrives
async fn serve_tokens(session: &Session, daemon: RefreshDaemon) {
    let mut tokens = daemon.subscribe();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    tracing::info!(account = %session.account(), "Token service running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            changed = tokens.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = tokens.borrow_and_update().clone();
                println!("{}", state.value);
            }
            _ = &mut shutdown => break,
        }
    }

    daemon.shutdown().await;
    tracing::info!("👋 Token service stopped");
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, stopping token service...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping token service...");
        },
    }
}
