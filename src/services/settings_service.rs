//! 设置服务 - 业务能力层

use std::sync::Arc;
use tracing::info;

use crate::error::{ClientError, ClientResult};
use crate::infrastructure::{ApiRequest, Transport, USER_ID_HEADER};
use crate::models::Settings;

/// 解析偏好设置服务
///
/// 设置按用户标识存储在服务端；读取时没有记录会得到默认值
pub struct SettingsService {
    transport: Arc<dyn Transport>,
}

impl SettingsService {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// 读取当前用户的设置
    pub async fn get(&self) -> ClientResult<Settings> {
        self.transport.send_as(ApiRequest::get("/settings")).await
    }

    /// 整体替换设置
    ///
    /// 身份头取自 `settings.user_id`，覆盖网关默认注入的身份
    ///
    /// # 返回
    /// 服务端保存后的设置
    pub async fn update(&self, settings: &Settings) -> ClientResult<Settings> {
        if settings.user_id.trim().is_empty() {
            return Err(ClientError::unsupported("用户标识", "空"));
        }
        let body = serde_json::to_value(settings)
            .map_err(|e| ClientError::unsupported("设置", e.to_string()))?;

        let request = ApiRequest::put("/settings")
            .header(USER_ID_HEADER, settings.user_id.clone())
            .json(body);
        let saved: Settings = self.transport.send_as(request).await?;

        info!(
            "⚙️ 设置已保存: backend={}, ocr_lang={}",
            saved.backend.as_str(),
            saved.ocr_lang
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingsBackend;
    use crate::testing::FakeTransport;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_sends_full_settings_with_identity() {
        let fake = FakeTransport::new(|request| match &request.body {
            crate::infrastructure::RequestBody::Json(body) => {
                let mut saved = body.clone();
                saved["version"] = json!("2");
                Ok(saved)
            }
            _ => Ok(json!({})),
        })
        .into_arc();
        let service = SettingsService::new(fake.clone());

        let mut settings = Settings::default_for("device-1");
        settings.backend = SettingsBackend::VlmHttpClient;
        settings.ocr_lang = "en".to_string();

        let saved = service.update(&settings).await.unwrap();
        assert_eq!(saved.backend, SettingsBackend::VlmHttpClient);
        assert_eq!(saved.version.as_deref(), Some("2"));

        let call = &fake.calls()[0];
        assert_eq!(call.endpoint, "PUT /settings");
        assert_eq!(
            call.headers,
            vec![(USER_ID_HEADER.to_string(), "device-1".to_string())]
        );
        let sent = call.json.clone().unwrap();
        assert_eq!(sent["ocr_lang"], "en");
        assert_eq!(sent["table_recognition"], true);
        assert_eq!(sent["backend"], "vlm-http-client");
    }

    #[tokio::test]
    async fn test_empty_user_id_is_rejected() {
        let fake = FakeTransport::new(|_| Ok(json!({}))).into_arc();
        let service = SettingsService::new(fake.clone());

        let err = service.update(&Settings::default_for(" ")).await.unwrap_err();
        assert!(matches!(err, ClientError::Unsupported { .. }));
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn test_get_defaults() {
        let fake = FakeTransport::new(|_| {
            Ok(serde_json::to_value(Settings::default_for("device-2")).unwrap())
        })
        .into_arc();
        let service = SettingsService::new(fake.clone());

        let settings = service.get().await.unwrap();
        assert_eq!(settings, Settings::default_for("device-2"));
        assert_eq!(fake.endpoints(), vec!["GET /settings"]);
    }
}
