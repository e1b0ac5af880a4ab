//! 上传服务 - 业务能力层
//!
//! 整批文件编码为一个 multipart 请求（按批上传，不按文件并发），
//! 进度为整批的聚合百分比，结果是逐文件的上传报告。

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::infrastructure::{ApiRequest, ProgressFn, Transport};
use crate::models::{FileStatus, UploadFile, UploadFileResult, UploadOutcome};
use crate::utils::lock;
use crate::workflow::StatusBoard;

/// 上传服务
pub struct UploadService {
    transport: Arc<dyn Transport>,
    board: Arc<StatusBoard>,
}

impl UploadService {
    pub fn new(transport: Arc<dyn Transport>, board: Arc<StatusBoard>) -> Self {
        Self { transport, board }
    }

    /// 批量上传
    ///
    /// # 参数
    /// - `files`: 待上传文件（至少一个）
    /// - `on_progress`: 进度回调，取值始终在 0..=100 且不会回退
    ///
    /// # 返回
    /// 返回逐文件的上传结果。整批失败时仍返回结果（全部标记为失败），
    /// 只有本地校验失败才返回错误。
    pub async fn upload(
        &self,
        files: Vec<UploadFile>,
        on_progress: Option<ProgressFn>,
    ) -> ClientResult<UploadOutcome> {
        if files.is_empty() {
            return Err(ClientError::unsupported("上传文件列表", "空"));
        }

        let filenames: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
        let total_bytes: u64 = files.iter().map(UploadFile::size).sum();
        info!(
            "📤 正在上传 {} 个文件 (共 {} 字节)...",
            filenames.len(),
            total_bytes
        );

        let mut request = ApiRequest::post("/upload").multipart(files);
        if let Some(callback) = on_progress {
            request = request.on_progress(monotonic_progress(callback));
        }

        let outcome = match self.transport.send(request).await {
            Ok(body) => build_outcome(&filenames, &body, None),
            Err(err @ ClientError::Unsupported { .. }) => return Err(err),
            Err(ClientError::ServerRejected {
                message,
                body: Some(body),
                ..
            }) if breakdown(&body).is_some() => {
                warn!("⚠️ 批量上传失败，服务端返回了部分结果: {}", message);
                build_outcome(&filenames, &body, Some(message))
            }
            Err(err) => {
                warn!("⚠️ 批量上传失败: {}", err);
                let message = err.user_message();
                let results = filenames
                    .iter()
                    .map(|name| UploadFileResult::failed(name.clone(), message.clone()))
                    .collect();
                UploadOutcome::from_results(results, Some(message))
            }
        };

        for id in outcome.uploaded_ids() {
            self.board.record(&id, FileStatus::Pending);
        }

        info!(
            "✓ 上传完成: 成功 {}/{}，失败 {}",
            outcome.success, outcome.total, outcome.failed
        );
        Ok(outcome)
    }
}

/// 包装进度回调：截断到 100，丢弃回退或重复的值
fn monotonic_progress(callback: ProgressFn) -> ProgressFn {
    let last: Mutex<Option<u8>> = Mutex::new(None);
    Arc::new(move |percent: u8| {
        let percent = percent.min(100);
        let mut last = lock(&last);
        if last.map_or(true, |prev| percent > prev) {
            *last = Some(percent);
            callback(percent);
        }
    })
}

/// 响应体中的逐文件列表（可能直接在顶层，也可能在 `detail` 里）
fn breakdown(body: &Value) -> Option<&Vec<Value>> {
    body.get("files")
        .and_then(Value::as_array)
        .or_else(|| body.get("detail")?.get("files")?.as_array())
}

fn entry_filename(entry: &Value) -> Option<&str> {
    entry.get("filename").and_then(Value::as_str)
}

fn entry_id(entry: &Value) -> Option<String> {
    let raw = entry.get("file_id").or_else(|| entry.get("id"))?;
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn entry_result(filename: &str, entry: &Value) -> UploadFileResult {
    let status = entry.get("status").and_then(Value::as_str);
    let id = entry_id(entry);

    match status {
        Some("error") | Some("failed") => {
            let reason = ["error", "message", "detail"]
                .iter()
                .find_map(|k| entry.get(*k).and_then(Value::as_str))
                .unwrap_or("上传失败");
            UploadFileResult::failed(filename, reason)
        }
        _ if id.is_some() => UploadFileResult::success(filename, id),
        Some("success") => UploadFileResult::success(filename, None),
        _ => UploadFileResult::failed(filename, "服务端未返回文件标识"),
    }
}

/// 按提交顺序生成逐文件结果，保证数量与提交数一致
fn build_outcome(filenames: &[String], body: &Value, batch_error: Option<String>) -> UploadOutcome {
    let Some(entries) = breakdown(body) else {
        // 2xx 但没有逐文件列表：整批视为成功，只是拿不到文件标识
        if batch_error.is_none() {
            warn!("⚠️ 上传响应中没有逐文件结果");
            let results = filenames
                .iter()
                .map(|name| UploadFileResult::success(name.clone(), None))
                .collect();
            return UploadOutcome::from_results(results, None);
        }
        let message = batch_error.unwrap_or_default();
        let results = filenames
            .iter()
            .map(|name| UploadFileResult::failed(name.clone(), message.clone()))
            .collect();
        return UploadOutcome::from_results(results, Some(message));
    };

    let mut used = vec![false; entries.len()];
    let results = filenames
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let matched = entries
                .iter()
                .enumerate()
                .position(|(j, e)| !used[j] && entry_filename(e) == Some(name.as_str()))
                .or_else(|| {
                    (i < entries.len() && !used[i] && entry_filename(&entries[i]).is_none())
                        .then_some(i)
                });

            match matched {
                Some(j) => {
                    used[j] = true;
                    entry_result(name, &entries[j])
                }
                None => {
                    debug!("服务端结果中缺少文件: {}", name);
                    UploadFileResult::failed(
                        name.clone(),
                        batch_error
                            .clone()
                            .unwrap_or_else(|| "服务端未返回该文件的结果".to_string()),
                    )
                }
            }
        })
        .collect();

    UploadOutcome::from_results(results, batch_error)
}
