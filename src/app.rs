use crate::config::Config;
use crate::controller::UploadController;
use crate::picker::ImagePicker;
use crate::prediction::HttpPredictionClient;
use crate::server::HttpServer;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let prediction_client = match HttpPredictionClient::new(&config.prediction_endpoint) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to initialize prediction client: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let controller_shutdown_rx = shutdown_tx.subscribe();
    let server_shutdown_rx = shutdown_tx.subscribe();

    let controller = UploadController::spawn(ImagePicker, prediction_client, controller_shutdown_rx);

    let server = HttpServer::new(controller, &config).await?;
    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
