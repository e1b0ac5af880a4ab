//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量文件处理器
//! - 管理应用生命周期（初始化、运行）
//! - 扫描上传目录并整批上传
//! - 控制并发数量（Semaphore）
//! - 输出全局统计信息
//!
//! ### `file_processor` - 单个文件处理器
//! - 触发解析并等待终态
//! - 获取解析内容
//! - 导出、下载并保存产物
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理一批文件)
//!     ↓
//! file_processor (处理单个文件)
//!     ↓
//! workflow::ParsePoller (解析状态机)
//!     ↓
//! services (能力层：upload / parse / export / settings / files)
//!     ↓
//! infrastructure (基础设施：HttpGateway)
//! ```

pub mod batch_processor;
pub mod file_processor;

// 重新导出主要类型
pub use batch_processor::{App, BatchStats};
pub use file_processor::{process_file, FileJob, FilePipeline};
