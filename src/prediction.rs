use crate::config::PredictionEndpointConfig;
use crate::picker::DataUri;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

pub const NO_DISEASE_FALLBACK: &str = "No disease detected.";
pub const ANALYZE_FAILURE_MESSAGE: &str = "Failed to analyze the image. Please try again.";

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("no image selected")]
    MissingImage,
    #[error("invalid prediction endpoint url: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("request to prediction endpoint failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("prediction endpoint returned status {0}")]
    BadStatus(StatusCode),
    #[error("malformed prediction response: {0}")]
    MalformedResponse(reqwest::Error),
}

impl PredictionError {
    /// Every failure cause collapses to the same banner; the distinction
    /// stays available on the variant for callers that want it.
    pub fn user_message(&self) -> &'static str {
        ANALYZE_FAILURE_MESSAGE
    }
}

#[async_trait]
pub trait PredictionClient: Send + Sync {
    async fn predict(&self, image: &DataUri) -> Result<String, PredictionError>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    disease: Option<String>,
}

#[derive(Debug)]
pub struct HttpPredictionClient {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpPredictionClient {
    pub fn new(config: &PredictionEndpointConfig) -> Result<Self, PredictionError> {
        let endpoint = Url::parse(&config.url)?;
        Ok(Self {
            http: Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl PredictionClient for HttpPredictionClient {
    #[instrument(skip(self, image))]
    async fn predict(&self, image: &DataUri) -> Result<String, PredictionError> {
        // The endpoint wants the bare base64 payload, without the data-URI
        // header.
        let payload = image.payload();

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&PredictRequest { image: payload });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(%status, "prediction endpoint responded");

        if !status.is_success() {
            return Err(PredictionError::BadStatus(status));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(PredictionError::MalformedResponse)?;

        Ok(body
            .disease
            .unwrap_or_else(|| NO_DISEASE_FALLBACK.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn client(url: &str) -> HttpPredictionClient {
        HttpPredictionClient::new(&PredictionEndpointConfig {
            url: url.to_string(),
            api_key: None,
        })
        .unwrap()
    }

    fn sample_image() -> DataUri {
        DataUri::encode("image/png", b"leafy bytes")
    }

    #[tokio::test]
    async fn extracts_disease_label_and_strips_data_uri_header() {
        let seen = Arc::new(Mutex::new(None));
        let seen_by_handler = seen.clone();
        let router = Router::new().route(
            "/",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen = seen_by_handler.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(serde_json::json!({ "disease": "Leaf Blight" }))
                }
            }),
        );
        let url = serve(router).await;

        let image = sample_image();
        let label = client(&url).predict(&image).await.unwrap();
        assert_eq!(label, "Leaf Blight");

        let body = seen.lock().unwrap().take().unwrap();
        assert_eq!(body["image"], image.payload());
    }

    #[tokio::test]
    async fn missing_disease_field_yields_fallback() {
        let router = Router::new().route(
            "/",
            post(|| async { Json(serde_json::json!({})) }),
        );
        let url = serve(router).await;

        let label = client(&url).predict(&sample_image()).await.unwrap();
        assert_eq!(label, NO_DISEASE_FALLBACK);
    }

    #[tokio::test]
    async fn non_success_status_is_bad_status() {
        let router = Router::new().route(
            "/",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
        );
        let url = serve(router).await;

        let err = client(&url).predict(&sample_image()).await.unwrap_err();
        assert!(matches!(
            err,
            PredictionError::BadStatus(StatusCode::INTERNAL_SERVER_ERROR)
        ));
        assert_eq!(err.user_message(), ANALYZE_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn non_json_body_is_malformed_response() {
        let router = Router::new().route("/", post(|| async { "definitely not json" }));
        let url = serve(router).await;

        let err = client(&url).predict(&sample_image()).await.unwrap_err();
        assert!(matches!(err, PredictionError::MalformedResponse(_)));
        assert_eq!(err.user_message(), ANALYZE_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn connection_failure_is_request_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let err = client(&url).predict(&sample_image()).await.unwrap_err();
        assert!(matches!(err, PredictionError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn api_key_is_sent_as_bearer_credential() {
        let seen = Arc::new(Mutex::new(None));
        let seen_by_handler = seen.clone();
        let router = Router::new().route(
            "/",
            post(move |headers: HeaderMap| {
                let seen = seen_by_handler.clone();
                async move {
                    *seen.lock().unwrap() = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    Json(serde_json::json!({ "disease": "Rust" }))
                }
            }),
        );
        let url = serve(router).await;

        let with_key = HttpPredictionClient::new(&PredictionEndpointConfig {
            url,
            api_key: Some("sekrit".into()),
        })
        .unwrap();
        with_key.predict(&sample_image()).await.unwrap();

        assert_eq!(seen.lock().unwrap().take().as_deref(), Some("Bearer sekrit"));
    }

    #[test]
    fn invalid_endpoint_is_rejected_at_construction() {
        let err = HttpPredictionClient::new(&PredictionEndpointConfig {
            url: "not a url".into(),
            api_key: None,
        })
        .unwrap_err();
        assert!(matches!(err, PredictionError::InvalidEndpoint(_)));
    }
}
