//! 解析服务 - 业务能力层
//!
//! 触发解析、查询解析状态、获取解析内容。
//! 获取解析内容前先看本地观测到的状态，未到 `parsed` 直接拒绝，不发请求。

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::infrastructure::{ApiRequest, Transport};
use crate::models::{FileStatus, ParseAck, ParseStatusResponse};
use crate::workflow::StatusBoard;

/// 解析服务
pub struct ParseService {
    transport: Arc<dyn Transport>,
    board: Arc<StatusBoard>,
}

impl ParseService {
    pub fn new(transport: Arc<dyn Transport>, board: Arc<StatusBoard>) -> Self {
        Self { transport, board }
    }

    /// 本地状态表（轮询器写入，其它服务读取）
    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    /// 触发解析
    ///
    /// 每个文件由调用方保证只触发一次
    pub async fn request_parse(&self, file_id: &str) -> ClientResult<ParseAck> {
        info!("[文件 {}] 🚀 请求解析", file_id);
        let ack: ParseAck = self
            .transport
            .send_as(ApiRequest::post(format!("/files/{}/parse", file_id)))
            .await?;
        debug!("[文件 {}] 解析请求已受理: {}", file_id, ack.msg);
        Ok(ack)
    }

    /// 查询一次解析状态
    pub async fn status(&self, file_id: &str) -> ClientResult<ParseStatusResponse> {
        self.transport
            .send_as(ApiRequest::get(format!("/files/{}/parse/status", file_id)))
            .await
    }

    /// 获取解析内容
    ///
    /// # 返回
    /// 本地最近一次观测不是 `parsed` 时返回 `NotReady`（从未观测过记为 `unknown`）
    pub async fn fetch_parsed_content(&self, file_id: &str) -> ClientResult<Value> {
        match self.board.get(file_id) {
            Some(FileStatus::Parsed) => {}
            Some(status) => return Err(ClientError::not_ready(file_id, status.as_str())),
            None => return Err(ClientError::not_ready(file_id, "unknown")),
        }

        self.transport
            .send(ApiRequest::get(format!("/files/{}/parsed_content", file_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use serde_json::json;
    use tokio_test::assert_err;

    fn service(fake: Arc<FakeTransport>) -> ParseService {
        ParseService::new(fake, Arc::new(StatusBoard::new()))
    }

    #[tokio::test]
    async fn test_request_parse() {
        let fake =
            FakeTransport::new(|_| Ok(json!({"msg": "parsing started", "file_id": 4}))).into_arc();
        let ack = service(fake.clone()).request_parse("4").await.unwrap();

        assert_eq!(ack.file_id.as_deref(), Some("4"));
        assert_eq!(fake.endpoints(), vec!["POST /files/4/parse"]);
    }

    #[tokio::test]
    async fn test_status_keeps_raw_value() {
        let fake = FakeTransport::new(|_| {
            Ok(json!({"file_id": "4", "status": "queued", "message": "排队中"}))
        })
        .into_arc();
        let response = service(fake).status("4").await.unwrap();

        assert_eq!(response.status, "queued");
        assert!(response.file_status().is_err());
        assert_eq!(response.message.as_deref(), Some("排队中"));
    }

    #[tokio::test]
    async fn test_content_not_ready_makes_no_request() {
        let fake = FakeTransport::new(|_| Ok(json!({"content": "x"}))).into_arc();
        let service = service(fake.clone());

        let err = assert_err!(service.fetch_parsed_content("1").await);
        assert!(matches!(err, ClientError::NotReady { ref status, .. } if status == "unknown"));

        for status in [FileStatus::Pending, FileStatus::Parsing] {
            service.board().record("1", status);
            let err = assert_err!(service.fetch_parsed_content("1").await);
            assert!(
                matches!(err, ClientError::NotReady { status: ref s, .. } if s == status.as_str())
            );
        }
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_file_is_not_ready() {
        let fake = FakeTransport::new(|_| Ok(json!({}))).into_arc();
        let service = service(fake.clone());
        service.board().record("2", FileStatus::ParseFailed);

        let err = assert_err!(service.fetch_parsed_content("2").await);
        assert!(matches!(err, ClientError::NotReady { .. }));
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_content_after_parsed() {
        let fake = FakeTransport::new(|_| Ok(json!({"pages": [{"text": "正文"}]}))).into_arc();
        let service = service(fake.clone());
        service.board().record("3", FileStatus::Parsed);

        let content = service.fetch_parsed_content("3").await.unwrap();
        assert_eq!(content["pages"][0]["text"], "正文");
        assert_eq!(fake.endpoints(), vec!["GET /files/3/parsed_content"]);
    }
}
