pub mod export_service;
pub mod file_service;
pub mod parse_service;
pub mod settings_service;
pub mod upload_service;

pub use export_service::ExportService;
pub use file_service::FileService;
pub use parse_service::ParseService;
pub use settings_service::SettingsService;
pub use upload_service::UploadService;
