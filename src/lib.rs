//! azure-relay - an OpenAI-compatible front for Azure OpenAI deployments
//!
//! Clients speak the OpenAI chat completions API. Each request's `model` is mapped onto an Azure
//! deployment, forwarded with the resource's API key, and the answer is reshaped into the OpenAI
//! schema (or streamed back untouched).

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tracing::{info, instrument};

pub mod client;
pub mod deployments;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod upstream;

use client::{HttpClient, HyperClient};
use deployments::DeploymentMap;
use handlers::{chat_completions, models as models_handler};
use upstream::UpstreamConfig;

/// Shared, read-only state handed to every request.
#[derive(Clone, Debug)]
pub struct AppState<T: HttpClient> {
    pub http_client: T,
    pub deployments: DeploymentMap,
    pub upstream: Arc<UpstreamConfig>,
}

impl AppState<HyperClient> {
    /// Create a new AppState with the default Hyper client
    pub fn new(deployments: DeploymentMap, upstream: UpstreamConfig) -> Self {
        Self::with_client(deployments, upstream, client::create_hyper_client())
    }
}

impl<T: HttpClient> AppState<T> {
    /// Create a new AppState with a custom HTTP client (useful for testing)
    pub fn with_client(deployments: DeploymentMap, upstream: UpstreamConfig, http_client: T) -> Self {
        Self {
            http_client,
            deployments,
            upstream: Arc::new(upstream),
        }
    }
}

/// Build the main router for the proxy
/// This creates routes for:
/// - `/v1/chat/completions` - Forwards to the Azure deployment for the requested model
/// - `/v1/models` - Returns the models that have a deployment
#[instrument(skip(state))]
pub fn build_router<T: HttpClient + Clone + Send + Sync + 'static>(state: AppState<T>) -> Router {
    info!("Building router");
    Router::new()
        .route("/v1/chat/completions", post(chat_completions::<T>))
        .route("/v1/models", get(models_handler::<T>))
        .with_state(state)
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::client::ClientError;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use std::time::Duration;

    type ResponseBuilder = dyn Fn() -> Result<axum::response::Response, ClientError> + Send + Sync;

    /// Records every request it receives and answers with a canned response.
    pub struct MockHttpClient {
        pub requests: Arc<Mutex<Vec<MockRequest>>>,
        response_builder: Arc<ResponseBuilder>,
        delay: Option<Duration>,
    }

    #[derive(Debug, Clone)]
    pub struct MockRequest {
        pub method: String,
        pub uri: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl MockRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    impl MockHttpClient {
        fn from_builder(response_builder: Arc<ResponseBuilder>) -> Self {
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                response_builder,
                delay: None,
            }
        }

        pub fn new(status: StatusCode, body: &str) -> Self {
            let body = body.to_string();
            Self::from_builder(Arc::new(move || {
                Ok::<_, ClientError>(axum::response::Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body.clone()))
                    .unwrap())
            }))
        }

        pub fn new_streaming(status: StatusCode, chunks: Vec<String>) -> Self {
            Self::from_builder(Arc::new(move || {
                use axum::body::Body;
                use futures_util::stream;

                let stream = stream::iter(
                    chunks
                        .clone()
                        .into_iter()
                        .map(|chunk| Ok::<_, std::io::Error>(chunk.into_bytes())),
                );

                Ok::<_, ClientError>(axum::response::Response::builder()
                    .status(status)
                    .header("content-type", "text/event-stream")
                    .body(Body::from_stream(stream))
                    .unwrap())
            }))
        }

        /// A client whose every request fails before reaching upstream.
        pub fn failing(message: &str) -> Self {
            let message = message.to_string();
            Self::from_builder(Arc::new(move || {
                Err::<axum::response::Response, _>(Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    message.clone(),
                )) as ClientError)
            }))
        }

        /// Wait before answering.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn get_requests(&self) -> Vec<MockRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl std::fmt::Debug for MockHttpClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockHttpClient")
                .field("requests", &self.requests)
                .field("response_builder", &"<closure>")
                .field("delay", &self.delay)
                .finish()
        }
    }

    impl Clone for MockHttpClient {
        fn clone(&self) -> Self {
            Self {
                requests: Arc::clone(&self.requests),
                response_builder: Arc::clone(&self.response_builder),
                delay: self.delay,
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(
            &self,
            req: axum::extract::Request,
        ) -> Result<axum::response::Response, ClientError> {
            let method = req.method().to_string();
            let uri = req.uri().to_string();
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .map_err(|e| Box::new(e) as ClientError)?
                .to_vec();

            self.requests.lock().unwrap().push(MockRequest {
                method,
                uri,
                headers,
                body,
            });

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            (self.response_builder)()
        }
    }
}
