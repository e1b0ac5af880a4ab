//! 导出服务 - 业务能力层
//!
//! 导出产物与下载地址都由服务端按需生成，客户端不缓存。
//! 下载失败时重新获取一次下载地址再试，不复用旧地址。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::infrastructure::{ApiRequest, Transport};
use crate::models::{DownloadHandle, ExportArtifact, ExportFormat};

/// 导出服务
pub struct ExportService {
    transport: Arc<dyn Transport>,
}

impl ExportService {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// 按格式名导出
    ///
    /// # 参数
    /// - `file_id`: 文件 id
    /// - `format`: 格式名（`markdown` / `markdown_page`）
    ///
    /// # 返回
    /// 格式名不受支持时返回 `Unsupported`，不发请求
    pub async fn export_file(&self, file_id: &str, format: &str) -> ClientResult<ExportArtifact> {
        let format: ExportFormat = format.parse()?;
        self.export(file_id, format).await
    }

    /// 导出为指定格式
    pub async fn export(&self, file_id: &str, format: ExportFormat) -> ClientResult<ExportArtifact> {
        info!(
            "[文件 {}] 📦 导出为 {}",
            file_id,
            format.display_name()
        );
        let request =
            ApiRequest::get(format!("/files/{}/export", file_id)).query("format", format.as_str());
        let artifact: ExportArtifact = self.transport.send_as(request).await?;
        debug!("[文件 {}] 导出完成: {:?}", file_id, artifact);
        Ok(artifact)
    }

    /// 获取下载地址（短时有效）
    pub async fn get_download_url(&self, file_id: &str) -> ClientResult<DownloadHandle> {
        let request = ApiRequest::get(format!("/files/{}/download_url", file_id));
        let endpoint = request.endpoint();
        let handle: DownloadHandle = self.transport.send_as(request).await?;
        if handle.url.trim().is_empty() {
            return Err(ClientError::invalid_response(endpoint, "下载地址为空"));
        }
        Ok(handle)
    }

    /// 下载原始文件
    ///
    /// 第一次下载失败时重新获取下载地址，再试一次
    pub async fn download(&self, file_id: &str) -> ClientResult<Vec<u8>> {
        let handle = self.get_download_url(file_id).await?;
        match self.transport.fetch(&handle.url).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!(
                    "[文件 {}] ⚠️ 下载失败，重新获取下载地址: {}",
                    file_id, e
                );
                let fresh = self.get_download_url(file_id).await?;
                self.transport.fetch(&fresh.url).await
            }
        }
    }

    /// 下载导出产物
    ///
    /// 产物地址失效时退回到 `download`
    pub async fn download_artifact(
        &self,
        file_id: &str,
        artifact: &ExportArtifact,
    ) -> ClientResult<Vec<u8>> {
        if !artifact.download_url.trim().is_empty() {
            match self.transport.fetch(&artifact.download_url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => warn!(
                    "[文件 {}] ⚠️ 导出产物下载失败，改用下载地址: {}",
                    file_id, e
                ),
            }
        }
        self.download(file_id).await
    }
}
