use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::protocol::SocketTokenResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// The app session behind the request is gone; retrying cannot help.
    #[error("token endpoint rejected the session")]
    Unauthorized,
    #[error("failed to fetch socket token: {0}")]
    Fetch(#[source] anyhow::Error),
}

/// Where the session manager gets a fresh handshake credential. A new token
/// is fetched for every connection attempt.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<String, TokenError>;
}

/// Fetches tokens from the gateway's `/api/auth/socket-token` route,
/// forwarding any headers the deployment needs to prove the app session.
pub struct HttpTokenSource {
    base_url: String,
    client: Client,
    headers: Vec<(String, String)>,
}

impl HttpTokenSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            headers: Vec::new(),
        }
    }

    /// Attach a header to every token request, e.g. the app session cookie.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch_token(&self) -> Result<String, TokenError> {
        let url = format!(
            "{}/api/auth/socket-token",
            self.base_url.trim_end_matches('/')
        );
        let mut request = self.client.get(&url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|error| TokenError::Fetch(error.into()))?;
        match response.status() {
            StatusCode::OK => {
                let body: SocketTokenResponse = response
                    .json()
                    .await
                    .map_err(|error| TokenError::Fetch(error.into()))?;
                Ok(body.token)
            }
            StatusCode::UNAUTHORIZED => Err(TokenError::Unauthorized),
            status => Err(TokenError::Fetch(anyhow::anyhow!(
                "token endpoint returned {status}"
            ))),
        }
    }
}

#[cfg(test)]
#[path = "tests/token_tests.rs"]
mod tests;
