//! Serialised, retry-aware access to the array management API.
//!
//! Every request issued by the driver funnels through one [`ArraySession`].
//! The session holds a single lock for the whole life of a request,
//! including its retries, so at most one request is in flight per array
//! session. Busy answers from the array are retried a bounded number of
//! times without backoff; the lock itself throttles the retries.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

mod error;
mod http;

pub use error::{ArrayError, RETRYABLE_ERROR_CODES};
pub use http::HttpTransport;

/// Total number of attempts made for a request that keeps hitting busy
/// errors.
pub const MAX_ATTEMPTS: u32 = 5;

/// Future returned by transport and host-connector operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// HTTP verb used by an [`ArrayRequest`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// Search a collection or fetch one object.
    Get,
    /// Create a new object in a collection.
    Post,
    /// Persist changed fields of an existing object.
    Patch,
    /// Remove an object.
    Delete,
}

impl Method {
    /// Returns the verb as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A single request against the array REST API.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayRequest {
    /// HTTP verb.
    pub method: Method,
    /// Path relative to the API root, always starting with `/`.
    pub path: String,
    /// Query string pairs, used by searches.
    pub query: Vec<(String, String)>,
    /// JSON payload for creates and updates.
    pub body: Option<Value>,
}

impl ArrayRequest {
    /// Builds a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    /// Builds a `POST` request carrying `body`.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    /// Builds a `PATCH` request carrying `body`.
    #[must_use]
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path, Some(body))
    }

    /// Builds a `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, None)
    }

    /// Replaces the query string pairs.
    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }
}

/// Raw request/response exchange with the array.
///
/// Implementations perform exactly one round trip per call and report any
/// non-success status as [`ArrayError::Request`]; classification and retry
/// happen in [`ArraySession`].
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the decoded JSON body (`Null` when empty).
    fn send<'a>(&'a self, request: &'a ArrayRequest) -> BackendFuture<'a, Value, ArrayError>;
}

/// Serialising, retrying wrapper around a [`Transport`].
#[derive(Debug)]
pub struct ArraySession<T> {
    transport: T,
    lock: Mutex<()>,
    max_attempts: u32,
}

impl<T: Transport> ArraySession<T> {
    /// Wraps `transport` with the default retry bound.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            lock: Mutex::const_new(()),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Returns the wrapped transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Executes `request`, retrying busy answers up to the attempt bound.
    ///
    /// The session lock is held across every attempt of this request.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError::Request`] when the array rejects the request or
    /// stays busy for every attempt, and [`ArrayError::Connection`] or
    /// [`ArrayError::Decode`] for lower level failures.
    pub async fn execute(&self, request: &ArrayRequest) -> Result<Value, ArrayError> {
        let _guard = self.lock.lock().await;
        let mut attempt = 1;
        loop {
            match self.transport.send(request).await.map_err(ArrayError::classify) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    debug!(
                        method = request.method.as_str(),
                        path = %request.path,
                        attempt,
                        error = %err,
                        "retrying busy array request"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(
                            method = request.method.as_str(),
                            path = %request.path,
                            attempts = attempt,
                            "array stayed busy, giving up"
                        );
                    }
                    return Err(err.into_exhausted());
                }
            }
        }
    }
}
