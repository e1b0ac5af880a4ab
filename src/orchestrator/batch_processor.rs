//! 批量文件处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责一批文件从上传到导出的调度。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：解析设备身份、创建传输网关和各项服务
//! 2. **批量加载**：扫描上传目录中的所有文件
//! 3. **批量上传**：整批一次上传，汇总逐文件结果
//! 4. **并发控制**：使用 Semaphore 限制同时跟踪的文件数量
//! 5. **全局统计**：汇总所有文件的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个文件的细节，委托 file_processor
//! - **失败隔离**：单个文件失败不影响其它文件

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{DeviceIdentity, HttpGateway, Transport};
use crate::models::{ExportFormat, UploadFile, UploadOutcome};
use crate::orchestrator::file_processor::{self, FileJob, FilePipeline};
use crate::services::{ExportService, FileService, ParseService, SettingsService, UploadService};
use crate::utils::logging;
use crate::workflow::{ParsePoller, StatusBoard, SubscribeOptions};

/// 应用主结构
pub struct App {
    config: Config,
    uploads: UploadService,
    files: FileService,
    settings: SettingsService,
    pipeline: Arc<FilePipeline>,
}

/// 批处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    /// 找到的文件数
    pub total: usize,
    /// 上传成功数
    pub uploaded: usize,
    /// 导出成功数
    pub exported: usize,
    /// 任一环节失败的文件数
    pub failed: usize,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let identity =
            DeviceIdentity::resolve(config.user_id.as_deref(), Path::new(&config.identity_file))?;
        logging::log_startup(&config, identity.user_id());

        let gateway = HttpGateway::new(
            config.api_base_url.clone(),
            config.request_timeout(),
            identity.user_id(),
        )?;

        Self::with_transport(config, Arc::new(gateway))
    }

    /// 使用指定的传输层构建应用
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let format: ExportFormat = config
            .export_format
            .parse()
            .with_context(|| format!("无效的导出格式配置: {}", config.export_format))?;

        let board = Arc::new(StatusBoard::new());
        let parse = Arc::new(ParseService::new(transport.clone(), board.clone()));
        let pipeline = FilePipeline {
            poller: Arc::new(ParsePoller::new(parse.clone())),
            parse,
            export: Arc::new(ExportService::new(transport.clone())),
            options: SubscribeOptions::from_config(&config),
            format,
            output_dir: PathBuf::from(&config.output_dir),
        };

        Ok(Self {
            uploads: UploadService::new(transport.clone(), board.clone()),
            files: FileService::new(transport.clone(), board),
            settings: SettingsService::new(transport),
            pipeline: Arc::new(pipeline),
            config,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<BatchStats> {
        self.log_settings().await;

        let files = load_upload_files(Path::new(&self.config.upload_dir)).await?;
        if files.is_empty() {
            warn!("⚠️ 没有找到待上传的文件，程序结束");
            return Ok(BatchStats::default());
        }
        logging::log_files_loaded(files.len(), files.iter().map(UploadFile::size).sum());

        let outcome = self.upload(files).await?;
        let jobs = upload_jobs(&outcome);
        let untracked = outcome.success - jobs.len();
        if untracked > 0 {
            warn!("⚠️ {} 个文件上传成功但没有返回文件 id，无法继续解析", untracked);
        }
        let mut stats = BatchStats {
            total: outcome.total,
            uploaded: outcome.success,
            failed: outcome.failed + untracked,
            ..Default::default()
        };

        let (exported, failed) = self.process_all_files(jobs).await?;
        stats.exported = exported;
        stats.failed += failed;

        self.pipeline.poller.cancel_all();
        self.log_usage().await;
        logging::print_final_stats(
            stats.exported,
            stats.failed,
            stats.total,
            &self.config.output_dir,
        );
        Ok(stats)
    }

    async fn log_settings(&self) {
        match self.settings.get().await {
            Ok(settings) => info!(
                "⚙️ 当前解析设置: backend={}, ocr_lang={}, force_ocr={}",
                settings.backend.as_str(),
                settings.ocr_lang,
                settings.force_ocr
            ),
            Err(e) => warn!("⚠️ 读取解析设置失败: {}", e.user_message()),
        }
    }

    async fn log_usage(&self) {
        match self.files.stats().await {
            Ok(stats) => info!(
                "📈 服务端统计: 文件 {} 个，今日上传 {} 个，占用 {} 字节",
                stats.total_files, stats.today_uploads, stats.used_space
            ),
            Err(e) => warn!("⚠️ 读取使用统计失败: {}", e.user_message()),
        }
    }

    /// 整批上传
    async fn upload(&self, files: Vec<UploadFile>) -> Result<UploadOutcome> {
        let outcome = self
            .uploads
            .upload(
                files,
                Some(Arc::new(|percent: u8| {
                    if percent % 25 == 0 {
                        info!("📤 上传进度: {}%", percent);
                    }
                })),
            )
            .await?;

        for failed in outcome.files.iter().filter(|f| f.error.is_some()) {
            warn!(
                "⚠️ 上传失败: {} - {}",
                failed.filename,
                failed.error.as_deref().unwrap_or_default()
            );
        }
        logging::log_upload_complete(outcome.success, outcome.total, outcome.batch_error.as_deref());
        Ok(outcome)
    }

    /// 并发处理所有已上传文件
    ///
    /// # 返回
    /// 返回 (导出成功数, 失败数)
    async fn process_all_files(&self, jobs: Vec<FileJob>) -> Result<(usize, usize)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_files.max(1)));
        let mut handles = Vec::new();

        for job in jobs {
            let permit = semaphore.clone().acquire_owned().await?;
            let pipeline = self.pipeline.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match file_processor::process_file(&pipeline, &job).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!("[文件 {}] ❌ 处理失败: {:#}", job.file_id, e);
                        false
                    }
                }
            });
            handles.push(handle);
        }

        let (mut exported, mut failed) = (0, 0);
        for handle in handles {
            match handle.await {
                Ok(true) => exported += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!("任务执行失败: {}", e);
                    failed += 1;
                }
            }
        }
        Ok((exported, failed))
    }
}

/// 上传成功且拿到 id 的文件
fn upload_jobs(outcome: &UploadOutcome) -> Vec<FileJob> {
    outcome
        .files
        .iter()
        .filter_map(|f| {
            let file_id = f.file_id.clone()?;
            Some(FileJob {
                file_id,
                filename: f.filename.clone(),
            })
        })
        .collect()
}

/// 扫描上传目录（不递归，按文件名排序）
async fn load_upload_files(dir: &Path) -> Result<Vec<UploadFile>> {
    info!("\n📁 正在扫描待上传的文件: {}", dir.display());

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("无法读取上传目录: {}", dir.display()))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match UploadFile::from_path(&path).await {
            Ok(file) => files.push(file),
            Err(e) => warn!("⚠️ 跳过文件 {}: {:#}", path.display(), e),
        }
    }
    Ok(files)
}
