use std::sync::Arc;

use anyhow::Context;
use frpc_supervisor::config::Settings;
use frpc_supervisor::ipc::IPCServer;
use frpc_supervisor::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    tracing::info!("frpc supervisor starting");

    let settings = Settings::load().context("Failed to load settings")?;
    tracing::info!(
        "frpc binary: {}, config: {}",
        settings.binary_path.display(),
        settings.config_path().display()
    );

    let listen_addr = settings.listen_addr.clone();
    let supervisor = Arc::new(Supervisor::new(settings));
    let ipc_server = IPCServer::new(supervisor.clone(), &listen_addr);

    // Ctrl+C 시 IPC 서버를 내리고 frpc를 정리
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received, cleaning up...");
    };

    if let Err(e) = ipc_server.start(shutdown).await {
        tracing::error!("IPC server error: {}", e);
    }

    match supervisor.stop().await {
        Ok(outcome) => tracing::info!("frpc cleanup: {:?}", outcome),
        Err(e) => tracing::error!("frpc cleanup failed: {}", e),
    }

    tracing::info!("frpc supervisor shutting down");
    Ok(())
}
