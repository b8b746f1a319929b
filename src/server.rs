use crate::{
    config::Config, controller::UploadController, routes::api_routes, telemetry::Metrics,
};
use axum::Router;
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

#[derive(Clone)]
pub struct SharedState {
    pub controller: UploadController,
    pub metrics: Arc<Metrics>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(controller: UploadController, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics = Arc::new(Metrics::new());
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let app_state = SharedState {
            controller,
            metrics,
        };

        let router = Router::new()
            .merge(api_routes())
            .with_state(app_state)
            .layer(metrics_layer);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictionEndpointConfig;
    use crate::picker::ImagePicker;
    use crate::prediction::HttpPredictionClient;
    use axum::{routing::post, Json};
    use reqwest::header::CONTENT_TYPE;
    use tokio::sync::broadcast;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn app_with_endpoint(disease: &'static str) -> (String, broadcast::Sender<()>) {
        let endpoint = Router::new().route(
            "/predict",
            post(move || async move { Json(serde_json::json!({ "disease": disease })) }),
        );
        let endpoint_url = format!("{}/predict", serve(endpoint).await);

        let client = HttpPredictionClient::new(&PredictionEndpointConfig {
            url: endpoint_url,
            api_key: None,
        })
        .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let controller = UploadController::spawn(ImagePicker, Arc::new(client), shutdown_rx);
        let state = SharedState {
            controller,
            metrics: Arc::new(Metrics::new()),
        };

        let base = serve(api_routes().with_state(state)).await;
        (base, shutdown_tx)
    }

    #[tokio::test]
    async fn upload_analyze_view_round_trip() {
        let (base, _shutdown_tx) = app_with_endpoint("Leaf Blight").await;
        let http = reqwest::Client::new();

        let health: serde_json::Value = http
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "Available");

        let selected: serde_json::Value = http
            .post(format!("{base}/image"))
            .header(CONTENT_TYPE, "image/png")
            .body(&b"leaf bytes"[..])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(selected["phase"], "selected");
        assert!(selected["selected_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let resolved: serde_json::Value = http
            .post(format!("{base}/analyze"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resolved["phase"], "resolved");
        assert_eq!(resolved["prediction"], "Leaf Blight");
        assert_eq!(resolved["is_loading"], false);

        let view: serde_json::Value = http
            .get(format!("{base}/view"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["prediction"], "Leaf Blight");

        let removed: serde_json::Value = http
            .delete(format!("{base}/image"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(removed["phase"], "empty");
        assert_eq!(removed["selected_image"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn invalid_upload_surfaces_error_banner() {
        let (base, _shutdown_tx) = app_with_endpoint("Leaf Blight").await;
        let http = reqwest::Client::new();

        let failed: serde_json::Value = http
            .post(format!("{base}/image"))
            .header(CONTENT_TYPE, "text/plain")
            .body("not an image")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(failed["phase"], "failed");
        assert_eq!(failed["error"], "Please upload a valid image file.");

        // Analyze with nothing selected keeps the service interactive.
        let failed: serde_json::Value = http
            .post(format!("{base}/analyze"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(failed["phase"], "failed");
        assert_eq!(
            failed["error"],
            "Failed to analyze the image. Please try again."
        );
    }
}
