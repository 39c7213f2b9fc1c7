//! In-process transport for tests and offline development.
//!
//! [`ScriptedTransport`] replays queued responses in order and records every
//! request it receives. When the script runs dry it fails with
//! `connection refused`, like an upstream that is down.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ProviderFailure, ProviderResult};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

/// A transport that answers from a script.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ProviderResult<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn push(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queue a JSON response with the given status.
    pub fn push_json(&self, status: u16, body: &serde_json::Value) {
        self.push(HttpResponse::new(status, body.to_string()));
    }

    /// Queue a transport-level failure (timeout, DNS, ...).
    pub fn push_failure(&self, failure: ProviderFailure) {
        self.script.lock().push_back(Err(failure));
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send_raw(&self, request: HttpRequest) -> ProviderResult<HttpResponse> {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderFailure::network("connection refused (script exhausted)")))
    }
}
