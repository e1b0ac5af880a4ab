use serde_json::Value;
use thiserror::Error;

/// 客户端错误类型
///
/// 传输层只会产生前三类（网络不可达 / 超时 / 服务端拒绝），
/// `NotReady` 与 `Unsupported` 只来自本地前置检查，不会触发任何网络请求。
#[derive(Debug, Error)]
pub enum ClientError {
    /// 没有收到任何响应
    #[error("网络不可达 ({endpoint}): {message}")]
    NetworkUnreachable { endpoint: String, message: String },

    /// 超过单次请求的超时上限
    #[error("请求超时 ({endpoint})")]
    Timeout { endpoint: String },

    /// 服务端返回 4xx/5xx
    #[error("服务端拒绝请求 (status={status}): {message}")]
    ServerRejected {
        status: u16,
        message: String,
        /// 原始响应体（用于提取批量上传的逐文件结果）
        body: Option<Value>,
    },

    /// 在所需状态到达之前调用了操作
    #[error("文件 {file_id} 尚未就绪 (当前状态: {status})")]
    NotReady { file_id: String, status: String },

    /// 调用方传入了不支持的取值
    #[error("不支持的 {field}: {value}")]
    Unsupported { field: String, value: String },

    /// 2xx 响应体无法解析为预期结构
    #[error("响应解析失败 ({endpoint}): {message}")]
    InvalidResponse { endpoint: String, message: String },

    /// 本地组件初始化失败（不涉及网络请求）
    #[error("客户端初始化失败: {message}")]
    Setup { message: String },
}

impl ClientError {
    /// 面向用户的单条提示信息（不含堆栈、不含技术细节）
    pub fn user_message(&self) -> String {
        match self {
            ClientError::NetworkUnreachable { .. } => "网络连接失败，请检查网络后重试".to_string(),
            ClientError::Timeout { .. } => "请求超时，请稍后重试".to_string(),
            ClientError::ServerRejected { message, .. } => message.clone(),
            ClientError::NotReady { .. } => "文件尚未解析完成，请稍后再试".to_string(),
            ClientError::Unsupported { field, value } => format!("不支持的{}: {}", field, value),
            ClientError::InvalidResponse { .. } => "服务器返回的数据格式有误".to_string(),
            ClientError::Setup { message } => message.clone(),
        }
    }

    /// 是否为可重试的瞬时错误（网络不可达 / 超时）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::NetworkUnreachable { .. } | ClientError::Timeout { .. }
        )
    }

    /// HTTP 状态码（仅 `ServerRejected` 有）
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::ServerRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    // ========== 便捷构造函数 ==========

    /// 创建不支持取值错误
    pub fn unsupported(field: impl Into<String>, value: impl Into<String>) -> Self {
        ClientError::Unsupported {
            field: field.into(),
            value: value.into(),
        }
    }

    /// 创建未就绪错误
    pub fn not_ready(file_id: impl Into<String>, status: impl Into<String>) -> Self {
        ClientError::NotReady {
            file_id: file_id.into(),
            status: status.into(),
        }
    }

    /// 创建响应解析错误
    pub fn invalid_response(endpoint: impl Into<String>, source: impl std::fmt::Display) -> Self {
        ClientError::InvalidResponse {
            endpoint: endpoint.into(),
            message: source.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 客户端结果类型
pub type ClientResult<T> = Result<T, ClientError>;
