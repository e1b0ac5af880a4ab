//! 文件管理服务 - 业务能力层
//!
//! 只负责文件列表、删除与使用统计，不关心解析流程

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ClientResult;
use crate::infrastructure::{ApiRequest, Transport};
use crate::models::{FileListParams, FileListResponse, StatsResponse};
use crate::workflow::StatusBoard;

/// 文件管理服务
pub struct FileService {
    transport: Arc<dyn Transport>,
    board: Arc<StatusBoard>,
}

impl FileService {
    pub fn new(transport: Arc<dyn Transport>, board: Arc<StatusBoard>) -> Self {
        Self { transport, board }
    }

    /// 分页查询文件列表
    ///
    /// 分页参数不合法时直接返回 `Unsupported`，不发请求
    pub async fn list(&self, params: &FileListParams) -> ClientResult<FileListResponse> {
        params.validate()?;
        debug!("查询文件列表: {:?}", params);

        let response: FileListResponse = self
            .transport
            .send_as(ApiRequest::get("/files").queries(params.to_query()))
            .await?;

        // 列表里的状态同样是一次观测，只会推进不会回退
        for record in &response.files {
            self.board.record(&record.id, record.status);
        }
        Ok(response)
    }

    /// 删除文件
    pub async fn delete(&self, file_id: &str) -> ClientResult<()> {
        self.transport
            .send(ApiRequest::delete(format!("/files/{}", file_id)))
            .await?;
        self.board.forget(file_id);
        info!("[文件 {}] 🗑️ 已删除", file_id);
        Ok(())
    }

    /// 使用统计
    pub async fn stats(&self) -> ClientResult<StatsResponse> {
        self.transport.send_as(ApiRequest::get("/stats")).await
    }
}
