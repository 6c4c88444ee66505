//! Authenticated HTTP-style service handle with single-flight
//! re-authentication and an auth-retry policy (spec §2.4, §4.2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::connector::Connector;
use crate::error::{TransportError, UnauthorizedError};

/// Outcome of a single (non-retried) request attempt.
enum Attempt<T> {
    Ok(T),
    Unauthorized,
    /// A non-401 failure (transport error or HTTP >= 400). Carries the
    /// caller-supplied fallback, already substituted in (spec §4.2: "...
    /// surfaced as defaultOnFailure").
    Default(T),
}

struct AuthState {
    authenticated: AtomicBool,
    /// Guards the "check `authenticated`, then exchange credentials"
    /// sequence so N concurrent callers collapse to one exchange
    /// (spec §4.2, §9 "Single-flight auth"). Re-checked *inside* the lock.
    lock: tokio::sync::Mutex<()>,
}

/// An authenticated client for one `(endpoint, serviceClass)` pair.
/// Built once per endpoint by [`crate::app_connectors::AppConnectors`] and
/// shared across all concurrent pipelines touching that endpoint.
pub struct RemoteClient {
    endpoint_id: String,
    connector: Connector,
    http: reqwest::Client,
    auth: Arc<AuthState>,
}

impl RemoteClient {
    pub fn new(endpoint_id: impl Into<String>, connector: Connector) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(connector.connect_timeout)
            .timeout(connector.read_timeout + connector.write_timeout);

        if let Some(proxy_url) = connector.proxy_url() {
            if let Ok(proxy) = reqwest::Proxy::all(format!("http://{proxy_url}")) {
                builder = builder.proxy(proxy);
            }
        }

        let http = builder.build()?;
        Ok(Self {
            endpoint_id: endpoint_id.into(),
            connector,
            http,
            auth: Arc::new(AuthState {
                authenticated: AtomicBool::new(false),
                lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.authenticated.load(Ordering::SeqCst)
    }

    pub fn reset_auth(&self) {
        self.auth.authenticated.store(false, Ordering::SeqCst);
    }

    /// Builds a GET request against this client's endpoint, reusing its
    /// configured timeouts and proxy.
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.get(format!("{}{}", self.connector.endpoint, path))
    }

    /// Builds a POST request against this client's endpoint.
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(format!("{}{}", self.connector.endpoint, path))
    }

    /// Ensures the client is authenticated. If N concurrent callers find
    /// `is_authenticated() == false`, the underlying exchange happens
    /// exactly once and all N observe its outcome (spec §4.2, §8).
    pub async fn authenticate(&self) -> Result<(), UnauthorizedError> {
        if self.is_authenticated() {
            return Ok(());
        }
        let _guard = self.auth.lock.lock().await;
        // Re-check inside the lock: another caller may have already
        // completed the exchange while we were waiting for it.
        if self.is_authenticated() {
            return Ok(());
        }
        self.exchange_credentials().await?;
        self.auth.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn exchange_credentials(&self) -> Result<(), UnauthorizedError> {
        let mut password = self.connector.read_password_bytes().map_err(|e| {
            UnauthorizedError::AuthExchangeFailed {
                endpoint_id: self.endpoint_id.clone(),
                reason: e.to_string(),
            }
        })?;
        let mut password_str = String::from_utf8_lossy(&password).into_owned();

        let result = self
            .http
            .post(format!("{}/login", self.connector.endpoint))
            .basic_auth(&self.connector.username, Some(&password_str))
            .send()
            .await;

        password.zeroize();
        password_str.zeroize();

        match result {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(UnauthorizedError::AuthExchangeFailed {
                endpoint_id: self.endpoint_id.clone(),
                reason: format!("login responded with {}", resp.status()),
            }),
            Err(e) => Err(UnauthorizedError::AuthExchangeFailed {
                endpoint_id: self.endpoint_id.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, default_on_failure: &T) -> Attempt<T>
    where
        T: Clone,
    {
        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(endpoint = %self.endpoint_id, error = %e, "remote request failed");
                let _ = TransportError::Io {
                    endpoint_id: self.endpoint_id.clone(),
                    source: e,
                };
                return Attempt::Default(default_on_failure.clone());
            }
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            return Attempt::Unauthorized;
        }
        if response.status().as_u16() >= 400 {
            warn!(
                endpoint = %self.endpoint_id,
                status = response.status().as_u16(),
                "remote request returned an error status"
            );
            return Attempt::Default(default_on_failure.clone());
        }

        match response.json::<T>().await {
            Ok(value) => Attempt::Ok(value),
            Err(e) => {
                warn!(endpoint = %self.endpoint_id, error = %e, "failed to parse remote response body");
                Attempt::Default(default_on_failure.clone())
            }
        }
    }

    /// One request attempt, no retry. A 401 is surfaced as
    /// [`UnauthorizedError`]; any other failure resolves to
    /// `default_on_failure` (spec §4.2).
    pub async fn execute<T: DeserializeOwned + Clone>(
        &self,
        request: reqwest::RequestBuilder,
        default_on_failure: T,
    ) -> Result<T, UnauthorizedError> {
        match self.attempt(request, &default_on_failure).await {
            Attempt::Ok(v) => Ok(v),
            Attempt::Default(v) => Ok(v),
            Attempt::Unauthorized => Err(UnauthorizedError::RetryExhausted {
                endpoint_id: self.endpoint_id.clone(),
            }),
        }
    }

    /// Authenticates, executes, and on a 401 resets auth, re-authenticates,
    /// and retries exactly once with a fresh clone of `request`. A second
    /// 401 propagates as [`UnauthorizedError::RetryExhausted`]
    /// (spec §4.2).
    pub async fn execute_with_auth_retry<T: DeserializeOwned + Clone>(
        &self,
        request: reqwest::RequestBuilder,
        default_on_failure: T,
    ) -> Result<T, UnauthorizedError> {
        self.authenticate().await?;

        let retryable = request
            .try_clone()
            .expect("requests built from JSON bodies/queries are always cloneable");

        match self.attempt(request, &default_on_failure).await {
            Attempt::Ok(v) => return Ok(v),
            Attempt::Default(v) => return Ok(v),
            Attempt::Unauthorized => {
                debug!(endpoint = %self.endpoint_id, "401 on first attempt, retrying once after re-auth");
            }
        }

        self.reset_auth();
        self.authenticate().await?;

        match self.attempt(retryable, &default_on_failure).await {
            Attempt::Ok(v) => Ok(v),
            Attempt::Default(v) => Ok(v),
            Attempt::Unauthorized => Err(UnauthorizedError::RetryExhausted {
                endpoint_id: self.endpoint_id.clone(),
            }),
        }
    }
}
