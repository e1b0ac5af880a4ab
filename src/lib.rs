//! # Docparse Client
//!
//! 文档解析服务的客户端编排层：上传文件、跟踪解析状态、导出并下载结果
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有 HTTP 客户端，只暴露"发请求"的能力
//! - `HttpGateway` - 唯一的 HTTP client owner，统一身份头与错误归一化
//! - `DeviceIdentity` - 设备级的稳定用户标识
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务对应一组接口
//! - `UploadService` - 整批上传与逐文件结果汇总
//! - `ParseService` - 触发解析、查询状态、获取解析内容
//! - `ExportService` - 导出与下载
//! - `SettingsService` / `FileService` - 设置与文件管理
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的解析状态机
//! - `StatusBoard` - 本地观测到的状态（只前进不后退）
//! - `ParsePoller` - 可取消的轮询订阅
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量文件处理器，管理并发
//! - `orchestrator/file_processor` - 单个文件从解析到导出的流程
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod testing;

// 重新导出常用类型
pub use config::Config;
pub use error::{ClientError, ClientResult};
pub use infrastructure::{ApiRequest, DeviceIdentity, HttpGateway, Transport};
pub use models::{
    ExportArtifact, ExportFormat, FileRecord, FileStatus, Settings, UploadFile, UploadOutcome,
};
pub use orchestrator::{App, BatchStats};
pub use services::{ExportService, FileService, ParseService, SettingsService, UploadService};
pub use workflow::{ParsePoller, ParseUpdate, StatusBoard, SubscribeOptions, Subscription};
