//! 传输网关 - 基础设施层
//!
//! 唯一持有 HTTP 客户端的地方，只暴露"发请求"的能力：
//! - 统一的根路径与超时
//! - 请求侧：未显式设置时注入 `X-User-Id`
//! - 响应侧：把所有线路级失败归一化为 `NetworkUnreachable` / `Timeout` / `ServerRejected`
//!
//! 网关本身不做重试，重试策略由调用方决定。

use async_trait::async_trait;
use phf::phf_map;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::models::UploadFile;

/// 身份请求头
pub const USER_ID_HEADER: &str = "X-User-Id";

/// 上传进度回调，参数为 0..=100 的百分比
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// 流式上传的分块大小
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

static STATUS_MESSAGES: phf::Map<u16, &'static str> = phf_map! {
    400u16 => "请求参数错误",
    401u16 => "未授权，请重新登录",
    403u16 => "没有权限访问",
    404u16 => "请求的资源不存在",
    500u16 => "服务器错误，请稍后重试",
    502u16 => "网关错误，请稍后重试",
    503u16 => "服务暂时不可用，请稍后重试",
};

/// 状态码 → 用户可读的提示
pub fn status_message(status: u16) -> String {
    STATUS_MESSAGES
        .get(&status)
        .map(|m| m.to_string())
        .unwrap_or_else(|| format!("请求失败 ({})", status))
}

/// 提取服务端返回的 `detail`（字符串原样返回，结构化内容序列化为字符串）
pub fn extract_detail(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// 请求体
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Vec<UploadFile>),
}

/// 一次 API 调用的描述
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub on_progress: Option<ProgressFn>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            on_progress: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn queries(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, files: Vec<UploadFile>) -> Self {
        self.body = RequestBody::Multipart(files);
        self
    }

    pub fn on_progress(mut self, callback: ProgressFn) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// 请求头名称不区分大小写
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// 用于日志和错误信息的端点描述
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// 传输能力
///
/// 业务层只依赖这个 trait，测试中可以替换为内存实现
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送 API 请求，返回 JSON 响应体（空响应体为 `Value::Null`）
    async fn send(&self, request: ApiRequest) -> ClientResult<Value>;

    /// 按绝对地址拉取原始字节（用于下载导出产物）
    async fn fetch(&self, url: &str) -> ClientResult<Vec<u8>>;
}

impl dyn Transport {
    /// 发送请求并反序列化为指定类型
    pub async fn send_as<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let endpoint = request.endpoint();
        let value = self.send(request).await?;
        serde_json::from_value(value).map_err(|e| ClientError::invalid_response(endpoint, e))
    }
}

/// 基于 reqwest 的网关实现
pub struct HttpGateway {
    client: Client,
    base_url: String,
    user_id: String,
}

impl HttpGateway {
    /// 创建网关
    ///
    /// # 参数
    /// - `base_url`: API 根路径
    /// - `timeout`: 单次请求超时上限
    /// - `user_id`: 默认注入的身份标识
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        user_id: impl Into<String>,
    ) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Setup {
                message: format!("无法创建 HTTP 客户端: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 身份头注入：调用方已设置则不覆盖
    ///
    /// API 请求与下载请求都经过这一步
    fn apply_identity(&self, builder: RequestBuilder, caller_supplied: bool) -> RequestBuilder {
        if caller_supplied {
            builder
        } else {
            builder.header(USER_ID_HEADER, self.user_id.as_str())
        }
    }

    fn build_request(&self, request: ApiRequest) -> ClientResult<RequestBuilder> {
        let url = self.build_url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = self.apply_identity(builder, request.has_header(USER_ID_HEADER));

        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart(files) => {
                builder.multipart(build_form(files, request.on_progress)?)
            }
        };
        Ok(builder)
    }

    async fn read_body(endpoint: &str, response: Response) -> ClientResult<Value> {
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(endpoint, e))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    async fn reject(endpoint: &str, response: Response) -> ClientError {
        let status = response.status().as_u16();
        let body: Option<Value> = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok());
        let message = body
            .as_ref()
            .and_then(extract_detail)
            .unwrap_or_else(|| status_message(status));

        warn!("请求被拒绝 ({}): status={}, {}", endpoint, status, message);
        ClientError::ServerRejected {
            status,
            message,
            body,
        }
    }
}

#[async_trait]
impl Transport for HttpGateway {
    async fn send(&self, request: ApiRequest) -> ClientResult<Value> {
        let endpoint = request.endpoint();
        debug!("发送请求: {}", endpoint);

        let builder = self.build_request(request)?;
        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(&endpoint, e))?;

        if !response.status().is_success() {
            return Err(Self::reject(&endpoint, response).await);
        }

        let body = Self::read_body(&endpoint, response).await?;
        debug!("请求完成: {}", endpoint);
        Ok(body)
    }

    async fn fetch(&self, url: &str) -> ClientResult<Vec<u8>> {
        let target = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.build_url(url)
        };
        let endpoint = format!("GET {}", target);
        debug!("下载: {}", target);

        let response = self
            .apply_identity(self.client.get(&target), false)
            .send()
            .await
            .map_err(|e| classify_transport_error(&endpoint, e))?;

        if !response.status().is_success() {
            return Err(Self::reject(&endpoint, response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(&endpoint, e))?;
        Ok(bytes.to_vec())
    }
}

/// 超时与无响应分开归类
fn classify_transport_error(endpoint: &str, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        warn!("请求超时: {}", endpoint);
        ClientError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else {
        warn!("网络不可达 ({}): {}", endpoint, err);
        ClientError::NetworkUnreachable {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

/// 按已发送字节数 / 总字节数汇总进度
struct ProgressTracker {
    total: u64,
    sent: AtomicU64,
    callback: ProgressFn,
}

impl ProgressTracker {
    fn advance(&self, bytes: u64) {
        let sent = self.sent.fetch_add(bytes, Ordering::SeqCst) + bytes;
        let percent = if self.total == 0 {
            100
        } else {
            ((sent as f64 * 100.0) / self.total as f64).round().min(100.0) as u8
        };
        (self.callback)(percent);
    }
}

/// 把整批文件编码为一个 multipart 表单（字段名 `files`）
fn build_form(files: Vec<UploadFile>, on_progress: Option<ProgressFn>) -> ClientResult<Form> {
    let total: u64 = files.iter().map(UploadFile::size).sum();
    let tracker = on_progress.map(|callback| {
        Arc::new(ProgressTracker {
            total,
            sent: AtomicU64::new(0),
            callback,
        })
    });

    let mut form = Form::new();
    for file in files {
        let length = file.size();
        let part = match &tracker {
            Some(tracker) => {
                Part::stream_with_length(tracked_body(file.data, tracker.clone()), length)
            }
            None => Part::bytes(file.data),
        }
        .file_name(file.filename);

        let part = match file.content_type {
            Some(content_type) => part
                .mime_str(&content_type)
                .map_err(|_| ClientError::unsupported("Content-Type", content_type))?,
            None => part,
        };
        form = form.part("files", part);
    }
    Ok(form)
}

fn tracked_body(data: Vec<u8>, tracker: Arc<ProgressTracker>) -> reqwest::Body {
    let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        tracker.advance(chunk.len() as u64);
        Ok::<_, std::io::Error>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}
