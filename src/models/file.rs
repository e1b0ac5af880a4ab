use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::serde_helpers::{
    deserialize_id, deserialize_opt_id, deserialize_opt_timestamp, deserialize_timestamp,
};
use crate::error::ClientError;

/// 文件解析状态
///
/// `pending → parsing → {parsed, parse_failed}`，后两者为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// 等待解析
    Pending,
    /// 解析中
    Parsing,
    /// 已完成
    Parsed,
    /// 解析失败
    ParseFailed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Parsing => "parsing",
            FileStatus::Parsed => "parsed",
            FileStatus::ParseFailed => "parse_failed",
        }
    }

    /// 状态序号，状态只能前进不能后退
    pub fn rank(self) -> u8 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Parsing => 1,
            FileStatus::Parsed | FileStatus::ParseFailed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Parsed | FileStatus::ParseFailed)
    }
}

impl FromStr for FileStatus {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "parsing" => Ok(FileStatus::Parsing),
            "parsed" => Ok(FileStatus::Parsed),
            "parse_failed" => Ok(FileStatus::ParseFailed),
            other => Err(ClientError::unsupported("文件状态", other)),
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文件使用的解析后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Pipeline,
    Vlm,
}

impl BackendType {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendType::Pipeline => "pipeline",
            BackendType::Vlm => "vlm",
        }
    }
}

/// 文件记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub filename: String,
    pub size: u64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub upload_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub finish_at: Option<DateTime<Utc>>,
    pub status: FileStatus,
    #[serde(default)]
    pub backend: Option<BackendType>,
}

impl FileRecord {
    /// 校验时间戳与状态是否一致：
    /// pending 时没有 start/finish；finish 存在当且仅当处于终态
    pub fn is_consistent(&self) -> bool {
        if self.status == FileStatus::Pending
            && (self.start_at.is_some() || self.finish_at.is_some())
        {
            return false;
        }
        self.finish_at.is_some() == self.status.is_terminal()
    }
}

/// 文件列表查询参数
#[derive(Debug, Clone)]
pub struct FileListParams {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub status: Option<FileStatus>,
}

impl Default for FileListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            search: None,
            status: None,
        }
    }
}

impl FileListParams {
    /// 本地校验分页参数
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.page == 0 {
            return Err(ClientError::unsupported("页码", "0"));
        }
        if self.page_size == 0 {
            return Err(ClientError::unsupported("每页数量", "0"));
        }
        Ok(())
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        if let Some(search) = self.search.as_ref().filter(|s| !s.is_empty()) {
            query.push(("search".to_string(), search.clone()));
        }
        if let Some(status) = self.status {
            query.push(("status".to_string(), status.as_str().to_string()));
        }
        query
    }
}

/// 文件列表响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileRecord>,
    pub total: u64,
}

/// 解析状态查询响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseStatusResponse {
    #[serde(deserialize_with = "deserialize_id")]
    pub file_id: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ParseStatusResponse {
    pub fn file_status(&self) -> Result<FileStatus, ClientError> {
        self.status.parse()
    }
}

/// 触发解析的确认响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseAck {
    #[serde(default)]
    pub msg: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub file_id: Option<String>,
}
