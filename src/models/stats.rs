use serde::{Deserialize, Serialize};

use super::serde_helpers::deserialize_id;

/// 使用统计
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_files: u64,
    pub today_uploads: u64,
    pub used_space: u64,
    #[serde(default)]
    pub recent_files: Vec<RecentFile>,
}

/// 最近上传的文件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFile {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    pub size: u64,
    pub upload_time: String,
    pub status: String,
}
