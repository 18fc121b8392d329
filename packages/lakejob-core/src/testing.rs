//! Scripted HTTP mock shared by the unit tests.

use crate::http::HttpClient;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: http::Method,
    pub uri: String,
    pub headers: http::HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn form(&self) -> HashMap<String, String> {
        serde_html_form::from_bytes(&self.body).unwrap()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("mock transport: {0}")]
pub struct MockError(pub String);

/// Replays queued responses in order and records every request it sees.
#[derive(Clone, Default)]
pub struct MockHttp {
    responses: Arc<Mutex<VecDeque<Result<http::Response<Vec<u8>>, String>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        let mut response = http::Response::new(serde_json::to_vec(&body).unwrap());
        *response.status_mut() = http::StatusCode::from_u16(status).unwrap();
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_empty(&self, status: u16) -> &Self {
        let mut response = http::Response::new(Vec::new());
        *response.status_mut() = http::StatusCode::from_u16(status).unwrap();
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_transport_error(&self, message: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: http::Method) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }
}

impl HttpClient for MockHttp {
    type Error = MockError;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = Result<http::Response<Vec<u8>>, Self::Error>> + Send {
        let (parts, body) = request.into_parts();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response left".to_string()));
        async move { next.map_err(MockError) }
    }
}
