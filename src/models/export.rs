use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::ClientError;

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Markdown
    Markdown,
    /// 带页码的 Markdown
    MarkdownPage,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::MarkdownPage => "markdown_page",
        }
    }

    /// 显示名称
    pub fn display_name(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "Markdown",
            ExportFormat::MarkdownPage => "Markdown带页码",
        }
    }

    /// 根据源文件名推导下载文件名：`<stem>.md` 或 `<stem>_pages.md`
    pub fn download_filename(self, source_filename: &str) -> String {
        let stem = Path::new(source_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source_filename);
        match self {
            ExportFormat::Markdown => format!("{}.md", stem),
            ExportFormat::MarkdownPage => format!("{}_pages.md", stem),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(ExportFormat::Markdown),
            "markdown_page" => Ok(ExportFormat::MarkdownPage),
            other => Err(ClientError::unsupported("导出格式", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 导出产物（每次导出都可能重新生成，不做缓存）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub status: String,
    pub download_url: String,
    #[serde(default)]
    pub filename: String,
}

impl ExportArtifact {
    /// 服务端未给出文件名时，按源文件名与格式补全
    pub fn ensure_filename(&mut self, format: ExportFormat, source_filename: &str) {
        if self.filename.trim().is_empty() {
            self.filename = format.download_filename(source_filename);
        }
    }
}

/// 短时有效的下载地址，不保证多次调用结果相同
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadHandle {
    pub url: String,
}
