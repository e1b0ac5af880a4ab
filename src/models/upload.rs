use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 待上传的文件内容
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// 从本地路径读取文件
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("无法读取文件: {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("无效的文件名: {}", path.display()))?
            .to_string();

        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some("pdf") => Some("application/pdf"),
            Some("png") => Some("image/png"),
            Some("jpg") | Some("jpeg") => Some("image/jpeg"),
            _ => None,
        };

        Ok(Self {
            filename,
            content_type: content_type.map(str::to_string),
            data,
        })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// 上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Waiting,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Waiting => "waiting",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }
}

/// 单个文件的上传结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFileResult {
    pub filename: String,
    pub status: UploadStatus,
    pub file_id: Option<String>,
    /// 失败原因（仅失败时有）
    pub error: Option<String>,
}

impl UploadFileResult {
    pub fn success(filename: impl Into<String>, file_id: Option<String>) -> Self {
        Self {
            filename: filename.into(),
            status: UploadStatus::Success,
            file_id,
            error: None,
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: UploadStatus::Error,
            file_id: None,
            error: Some(error.into()),
        }
    }
}

/// 一次批量上传的汇总结果
///
/// 保证 `success + failed == total == files.len()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub files: Vec<UploadFileResult>,
    /// 整批失败时的提示信息
    pub batch_error: Option<String>,
}

impl UploadOutcome {
    /// 由逐文件结果重新计算汇总数
    pub fn from_results(files: Vec<UploadFileResult>, batch_error: Option<String>) -> Self {
        let success = files
            .iter()
            .filter(|f| f.status == UploadStatus::Success)
            .count();
        Self {
            total: files.len(),
            success,
            failed: files.len() - success,
            files,
            batch_error,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.success + self.failed == self.total && self.files.len() == self.total
    }

    /// 上传成功的文件 id（按提交顺序）
    pub fn uploaded_ids(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| f.status == UploadStatus::Success)
            .filter_map(|f| f.file_id.clone())
            .collect()
    }
}
