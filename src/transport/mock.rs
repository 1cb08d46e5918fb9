//! Scripted transport for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::app::ApiErrorKind;
use crate::transport::{ApiRequest, Method, Transport};

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), std::result::Result<Value, ApiErrorKind>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the response for `method path`. Unrouted calls fail with `NotFound`.
    pub fn respond(&self, method: Method, path: &str, response: std::result::Result<Value, ApiErrorKind>) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), response);
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> std::result::Result<Value, ApiErrorKind> {
        self.calls.lock().unwrap().push(request.clone());

        let delay = self.delays.lock().unwrap().get(&request.path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.routes
            .lock()
            .unwrap()
            .get(&(request.method, request.path.clone()))
            .cloned()
            .unwrap_or(Err(ApiErrorKind::NotFound))
    }
}
