//! 单个文件处理器 - 编排层
//!
//! 一个已上传文件的完整流程：
//! 1. 触发解析
//! 2. 订阅解析状态，等到终态
//! 3. 获取解析内容
//! 4. 导出并下载产物，写入导出目录

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{ExportFormat, FileStatus};
use crate::services::{ExportService, ParseService};
use crate::utils::logging::truncate_text;
use crate::workflow::{ParsePoller, ParseUpdate, SubscribeOptions};

/// 待处理的已上传文件
#[derive(Debug, Clone)]
pub struct FileJob {
    pub file_id: String,
    pub filename: String,
}

/// 单文件流程依赖的能力
pub struct FilePipeline {
    pub parse: Arc<ParseService>,
    pub poller: Arc<ParsePoller>,
    pub export: Arc<ExportService>,
    pub options: SubscribeOptions,
    pub format: ExportFormat,
    pub output_dir: PathBuf,
}

/// 处理单个文件
///
/// 无论成功与否，结束后都会从本地状态表移除该文件
///
/// # 返回
/// 返回导出文件的保存路径
pub async fn process_file(pipeline: &FilePipeline, job: &FileJob) -> Result<PathBuf> {
    let result = run_pipeline(pipeline, job).await;
    pipeline.parse.board().forget(&job.file_id);
    result
}

async fn run_pipeline(pipeline: &FilePipeline, job: &FileJob) -> Result<PathBuf> {
    let id = job.file_id.as_str();
    info!("[文件 {}] 📄 开始处理: {}", id, job.filename);

    pipeline.parse.request_parse(id).await?;

    let update = wait_for_terminal(pipeline, id).await?;
    if update.status != FileStatus::Parsed {
        let reason = update.message.unwrap_or_else(|| "解析失败".to_string());
        if update.unreachable {
            bail!("解析状态无法获取: {}", reason);
        }
        bail!("解析失败: {}", reason);
    }

    let content = pipeline.parse.fetch_parsed_content(id).await?;
    debug!(
        "[文件 {}] 解析内容预览: {}",
        id,
        truncate_text(&content.to_string(), 80)
    );

    let mut artifact = pipeline.export.export(id, pipeline.format).await?;
    artifact.ensure_filename(pipeline.format, &job.filename);
    let bytes = pipeline.export.download_artifact(id, &artifact).await?;

    let path = save_artifact(&pipeline.output_dir, &artifact.filename, &bytes).await?;
    info!(
        "[文件 {}] ✅ 已导出 {} ({} 字节)",
        id,
        path.display(),
        bytes.len()
    );
    Ok(path)
}

/// 订阅并等待终态
async fn wait_for_terminal(pipeline: &FilePipeline, id: &str) -> Result<ParseUpdate> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ParseUpdate>();
    let subscription = pipeline.poller.subscribe(
        id,
        Arc::new(move |update: ParseUpdate| {
            let _ = tx.send(update);
        }),
        pipeline.options.clone(),
    );

    let terminal = loop {
        tokio::select! {
            biased;
            Some(update) = rx.recv() => {
                info!("[文件 {}] 🔄 解析状态: {}", id, update.status);
                if update.status.is_terminal() {
                    break Some(update);
                }
            }
            _ = subscription.finished() => {
                let mut last = None;
                while let Ok(update) = rx.try_recv() {
                    if update.status.is_terminal() {
                        last = Some(update);
                    }
                }
                break last;
            }
        }
    };
    subscription.cancel();

    match terminal {
        Some(update) => Ok(update),
        None => {
            warn!("[文件 {}] ⚠️ 轮询在终态之前结束", id);
            bail!("解析状态轮询已取消")
        }
    }
}

/// 写入导出产物，只取文件名部分
async fn save_artifact(output_dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .with_context(|| format!("无效的导出文件名: {}", filename))?;

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("无法创建导出目录: {}", output_dir.display()))?;
    let path = output_dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("无法写入导出文件: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use crate::workflow::StatusBoard;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pipeline(fake: Arc<FakeTransport>, output_dir: &Path) -> FilePipeline {
        let board = Arc::new(StatusBoard::new());
        let parse = Arc::new(ParseService::new(fake.clone(), board));
        FilePipeline {
            poller: Arc::new(ParsePoller::new(parse.clone())),
            parse,
            export: Arc::new(ExportService::new(fake)),
            options: SubscribeOptions {
                interval: Duration::from_millis(5),
                max_consecutive_failures: 2,
                on_error: None,
            },
            format: ExportFormat::MarkdownPage,
            output_dir: output_dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_parsed_file_is_exported() {
        let polls = AtomicUsize::new(0);
        let fake = FakeTransport::new(move |request| match request.path.as_str() {
            "/files/1/parse" => Ok(json!({"msg": "ok", "file_id": 1})),
            "/files/1/parse/status" => {
                let status = match polls.fetch_add(1, Ordering::SeqCst) {
                    0 => "pending",
                    1 => "parsing",
                    _ => "parsed",
                };
                Ok(json!({"file_id": 1, "status": status}))
            }
            "/files/1/parsed_content" => Ok(json!({"markdown": "# 标题"})),
            "/files/1/export" => Ok(json!({"status": "success", "download_url": "http://d/1"})),
            other => panic!("unexpected path {}", other),
        })
        .with_fetch(|_| Ok("# 标题".as_bytes().to_vec()))
        .into_arc();
        let dir = tempfile::tempdir().unwrap();

        let job = FileJob {
            file_id: "1".to_string(),
            filename: "年报.pdf".to_string(),
        };
        let pipeline = pipeline(fake.clone(), dir.path());
        let path = process_file(&pipeline, &job).await.unwrap();

        assert_eq!(path, dir.path().join("年报_pages.md"));
        assert!(pipeline.parse.board().is_empty());
        assert_eq!(std::fs::read(&path).unwrap(), "# 标题".as_bytes());
        assert_eq!(fake.fetched(), vec!["http://d/1"]);
    }

    #[tokio::test]
    async fn test_failed_parse_stops_before_export() {
        let fake = FakeTransport::new(|request| match request.path.as_str() {
            "/files/2/parse" => Ok(json!({"msg": "ok"})),
            "/files/2/parse/status" => {
                Ok(json!({"file_id": 2, "status": "parse_failed", "message": "页面损坏"}))
            }
            other => panic!("unexpected path {}", other),
        })
        .into_arc();
        let dir = tempfile::tempdir().unwrap();

        let job = FileJob {
            file_id: "2".to_string(),
            filename: "bad.pdf".to_string(),
        };
        let err = process_file(&pipeline(fake.clone(), dir.path()), &job)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("页面损坏"));
        assert!(!fake.endpoints().iter().any(|e| e.contains("export")));
    }

    #[tokio::test]
    async fn test_export_filename_is_confined_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_artifact(dir.path(), "../../escape.md", b"x")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("escape.md"));
    }
}
