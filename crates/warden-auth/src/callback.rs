//! Loopback listener for the OAuth redirect.
//!
//! The identity provider sends the browser back to the configured redirect URI
//! with either `?code=…` or `?error=…&error_description=…`. A short-lived axum
//! server bound to that URI's host and port captures the first such request
//! and hands it to the waiting sign-in flow.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{AuthError, Result};

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// The authorization code, or the provider's error as a backend error.
    pub fn into_code(self) -> Result<String> {
        if let Some(error) = self.error {
            let message = self
                .error_description
                .filter(|d| !d.is_empty())
                .unwrap_or(error);
            return Err(AuthError::Backend(message));
        }
        match self.code {
            Some(code) if !code.trim().is_empty() => Ok(code.trim().to_string()),
            _ => Err(AuthError::Backend(
                "callback did not include an authorization code".to_string(),
            )),
        }
    }
}

/// Accept either a full redirect URL (as pasted from the browser) or a bare code.
pub fn parse_callback(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AuthError::Backend("no authorization code given".to_string()));
    }

    match Url::parse(trimmed) {
        Ok(url) => {
            let mut params = CallbackParams::default();
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "code" => params.code = Some(value.into_owned()),
                    "error" => params.error = Some(value.into_owned()),
                    "error_description" => params.error_description = Some(value.into_owned()),
                    _ => {}
                }
            }
            params.into_code()
        }
        Err(_) => Ok(trimmed.to_string()),
    }
}

type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Router answering `GET <path>` once.
pub fn callback_router(path: &str, tx: oneshot::Sender<CallbackParams>) -> Router {
    let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));
    Router::new()
        .route(path, get(handle_callback))
        .with_state(slot)
}

async fn handle_callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let failed = params.error.is_some() || params.code.is_none();
    let Some(tx) = slot.lock().take() else {
        return (
            StatusCode::GONE,
            "This sign-in link has already been used. You can close this window.",
        );
    };
    if tx.send(params).is_err() {
        tracing::debug!("Callback received after the sign-in flow gave up");
    }

    if failed {
        (
            StatusCode::BAD_REQUEST,
            "Sign-in failed. Return to the terminal for details.",
        )
    } else {
        (
            StatusCode::OK,
            "Sign-in complete. You can close this window.",
        )
    }
}

/// A bound callback server waiting for its one request.
#[derive(Debug)]
pub struct CallbackListener {
    local_addr: SocketAddr,
    rx: oneshot::Receiver<CallbackParams>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind to the host and port of `redirect_uri` and start serving.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::Config(format!("invalid redirect_uri: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| AuthError::Config("redirect_uri has no host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AuthError::Config("redirect_uri has no port".to_string()))?;
        let path = if url.path().is_empty() { "/" } else { url.path() };

        let bind_host = host.trim_start_matches('[').trim_end_matches(']');
        let listener = TcpListener::bind((bind_host, port))
            .await
            .map_err(|e| AuthError::Config(format!("cannot listen on {}:{}: {}", host, port, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::Config(format!("listener has no address: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let (relay_tx, relay_rx) = oneshot::channel();
        let router = callback_router(path, relay_tx);

        // Relay so the server can shut itself down as soon as the callback lands.
        tokio::spawn(async move {
            if let Ok(params) = relay_rx.await {
                let _ = tx.send(params);
            }
            let _ = done_tx.send(());
        });

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = done_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!(error = %e, "Callback listener failed");
            }
        });

        tracing::info!(addr = %local_addr, path, "Waiting for sign-in callback");
        Ok(Self {
            local_addr,
            rx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the callback and return its authorization code.
    pub async fn wait(self) -> Result<String> {
        let params = self
            .rx
            .await
            .map_err(|_| AuthError::Backend("callback listener closed".to_string()))?;
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "Callback server task ended abnormally");
        }
        params.into_code()
    }
}
