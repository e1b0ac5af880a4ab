use serde::{Deserialize, Serialize};

use super::file::BackendType;

/// 设置中可选的解析后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsBackend {
    #[serde(rename = "pipeline")]
    Pipeline,
    #[serde(rename = "vlm-http-client")]
    VlmHttpClient,
}

impl SettingsBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingsBackend::Pipeline => "pipeline",
            SettingsBackend::VlmHttpClient => "vlm-http-client",
        }
    }

    /// 设置后端 → 文件记录上的后端标签
    pub fn to_file_backend(self) -> BackendType {
        match self {
            SettingsBackend::Pipeline => BackendType::Pipeline,
            SettingsBackend::VlmHttpClient => BackendType::Vlm,
        }
    }
}

/// 解析偏好设置，与用户标识一一对应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub user_id: String,
    pub force_ocr: bool,
    pub ocr_lang: String,
    pub formula_recognition: bool,
    pub table_recognition: bool,
    pub backend: SettingsBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Settings {
    /// 服务端在没有存储记录时返回的默认值
    pub fn default_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            force_ocr: false,
            ocr_lang: "ch".to_string(),
            formula_recognition: true,
            table_recognition: true,
            backend: SettingsBackend::Pipeline,
            version: None,
        }
    }
}
