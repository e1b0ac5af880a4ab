//! 测试用的内存传输实现，记录每一次调用

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::error::{ClientError, ClientResult};
use crate::infrastructure::{ApiRequest, RequestBody, Transport};

type SendHandler = Box<dyn Fn(&ApiRequest) -> ClientResult<Value> + Send + Sync>;
type FetchHandler = Box<dyn Fn(&str) -> ClientResult<Vec<u8>> + Send + Sync>;

/// 被记录下来的请求
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub json: Option<Value>,
    pub multipart_files: Vec<String>,
}

pub struct FakeTransport {
    handler: SendHandler,
    fetch_handler: FetchHandler,
    calls: Mutex<Vec<RecordedCall>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> ClientResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            fetch_handler: Box::new(|url| {
                Err(ClientError::NetworkUnreachable {
                    endpoint: url.to_string(),
                    message: "no fetch handler".to_string(),
                })
            }),
            calls: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fetch(
        mut self,
        handler: impl Fn(&str) -> ClientResult<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.fetch_handler = Box::new(handler);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.endpoint).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> ClientResult<Value> {
        let (json, multipart_files) = match &request.body {
            RequestBody::Empty => (None, Vec::new()),
            RequestBody::Json(v) => (Some(v.clone()), Vec::new()),
            RequestBody::Multipart(files) => {
                (None, files.iter().map(|f| f.filename.clone()).collect())
            }
        };
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: request.endpoint(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            json,
            multipart_files,
        });
        (self.handler)(&request)
    }

    async fn fetch(&self, url: &str) -> ClientResult<Vec<u8>> {
        self.fetches.lock().unwrap().push(url.to_string());
        (self.fetch_handler)(url)
    }
}
