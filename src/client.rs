//! HTTP client used to reach the Azure resource.
//!
//! The proxy only talks to upstream through [`HttpClient`], so tests can swap in a recording mock
//! while production uses a hyper client with TLS.
use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};

pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

pub type HyperClient = Client<
    hyper_tls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    axum::body::Body,
>;

#[async_trait]
pub trait HttpClient: std::fmt::Debug {
    /// Send a fully-built request. Resolves once the response head has arrived; the body is
    /// left unread so it can be streamed.
    async fn request(&self, req: axum::extract::Request) -> Result<Response, ClientError>;
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn request(&self, req: axum::extract::Request) -> Result<Response, ClientError> {
        let response: hyper::Response<hyper::body::Incoming> = Client::request(self, req)
            .await
            .map_err(|e| Box::new(e) as ClientError)?;
        Ok(response.into_response())
    }
}

pub fn create_hyper_client() -> HyperClient {
    let https = hyper_tls::HttpsConnector::new();
    tracing::debug!("Creating upstream HTTP client");
    Client::builder(TokioExecutor::new())
        .pool_timer(hyper_util::rt::TokioTimer::new())
        .build(https)
}
