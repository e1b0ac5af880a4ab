//! 数据模型
//!
//! 所有实体都由服务端持有，客户端只保留当前视图需要的工作副本

pub mod export;
pub mod file;
pub mod settings;
pub mod stats;
pub mod status;
pub mod upload;

mod serde_helpers;

pub use export::{DownloadHandle, ExportArtifact, ExportFormat};
pub use file::{
    BackendType, FileListParams, FileListResponse, FileRecord, FileStatus, ParseAck,
    ParseStatusResponse,
};
pub use settings::{Settings, SettingsBackend};
pub use stats::{RecentFile, StatsResponse};
pub use status::{
    backend_info, file_status_info, upload_status_info, BackendInfo, Severity, StatusInfo,
};
pub use upload::{UploadFile, UploadFileResult, UploadOutcome, UploadStatus};
