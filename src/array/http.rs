//! HTTPS transport for the array REST endpoint.

use std::time::Duration;

use serde_json::Value;

use crate::config::K2Config;

use super::{ArrayError, ArrayRequest, BackendFuture, Method, Transport};

/// Transport that talks to the array over HTTPS with basic authentication.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    login: String,
    password: String,
}

impl HttpTransport {
    /// Builds a transport for the management endpoint named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError::Connection`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: &K2Config) -> Result<Self, ArrayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .danger_accept_invalid_certs(!config.validates_tls())
            .build()
            .map_err(|err| ArrayError::Connection {
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            login: config.san_login.clone(),
            password: config.san_password.clone(),
        })
    }

    /// Returns the API root every request path is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn exchange(&self, request: &ArrayRequest) -> Result<Value, ArrayError> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &url)
            .basic_auth(&self.login, Some(&self.password));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| ArrayError::Connection {
            message: err.to_string(),
        })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ArrayError::Connection {
                message: err.to_string(),
            })?;

        if !status.is_success() {
            return Err(ArrayError::Request {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|err| ArrayError::decode(&request.path, &err))
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a ArrayRequest) -> BackendFuture<'a, Value, ArrayError> {
        Box::pin(self.exchange(request))
    }
}
