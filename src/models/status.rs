//! 状态 → 展示信息映射
//!
//! 纯查表，无业务逻辑；未知取值一律返回兜底项，从不报错

use phf::phf_map;

/// 展示用的严重程度（有序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Success,
    Danger,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Success => "success",
            Severity::Danger => "danger",
        }
    }
}

/// 状态标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInfo {
    pub label: &'static str,
    pub severity: Severity,
}

/// 后端图标与颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    pub icon: &'static str,
    pub color: &'static str,
}

const UNKNOWN_STATUS: StatusInfo = StatusInfo {
    label: "未知状态",
    severity: Severity::Info,
};

const UNKNOWN_BACKEND: BackendInfo = BackendInfo {
    icon: "",
    color: "#909399",
};

static FILE_STATUS: phf::Map<&'static str, StatusInfo> = phf_map! {
    "pending" => StatusInfo { label: "等待解析", severity: Severity::Info },
    "parsing" => StatusInfo { label: "解析中", severity: Severity::Warning },
    "parsed" => StatusInfo { label: "已完成", severity: Severity::Success },
    "parse_failed" => StatusInfo { label: "解析失败", severity: Severity::Danger },
};

static UPLOAD_STATUS: phf::Map<&'static str, StatusInfo> = phf_map! {
    "waiting" => StatusInfo { label: "等待上传", severity: Severity::Info },
    "uploading" => StatusInfo { label: "上传中", severity: Severity::Warning },
    "success" => StatusInfo { label: "上传成功", severity: Severity::Success },
    "error" => StatusInfo { label: "上传失败", severity: Severity::Danger },
};

static BACKENDS: phf::Map<&'static str, BackendInfo> = phf_map! {
    "pipeline" => BackendInfo { icon: "Pipeline", color: "#409EFF" },
    "vlm" => BackendInfo { icon: "VLM", color: "#67C23A" },
};

/// 文件状态信息
pub fn file_status_info(status: &str) -> StatusInfo {
    FILE_STATUS.get(status).copied().unwrap_or(UNKNOWN_STATUS)
}

/// 上传状态信息
pub fn upload_status_info(status: &str) -> StatusInfo {
    UPLOAD_STATUS.get(status).copied().unwrap_or(UNKNOWN_STATUS)
}

/// 后端信息（未设置后端时同样返回兜底项）
pub fn backend_info(backend: Option<&str>) -> BackendInfo {
    backend
        .and_then(|b| BACKENDS.get(b))
        .copied()
        .unwrap_or(UNKNOWN_BACKEND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendType, FileStatus, UploadStatus};

    #[test]
    fn test_known_file_statuses() {
        for status in [
            FileStatus::Pending,
            FileStatus::Parsing,
            FileStatus::Parsed,
            FileStatus::ParseFailed,
        ] {
            assert_ne!(file_status_info(status.as_str()), UNKNOWN_STATUS);
        }
        assert_eq!(file_status_info("parsed").severity, Severity::Success);
        assert_eq!(file_status_info("parse_failed").label, "解析失败");
    }

    #[test]
    fn test_known_upload_statuses() {
        assert_eq!(
            upload_status_info(UploadStatus::Uploading.as_str()).label,
            "上传中"
        );
        assert_eq!(
            upload_status_info(UploadStatus::Error.as_str()).severity,
            Severity::Danger
        );
    }

    #[test]
    fn test_unknown_values_fall_back() {
        for raw in ["", "PARSED", "queued", "parsed ", "错误"] {
            assert_eq!(file_status_info(raw), UNKNOWN_STATUS);
            assert_eq!(upload_status_info(raw), UNKNOWN_STATUS);
            assert_eq!(backend_info(Some(raw)), UNKNOWN_BACKEND);
        }
        assert_eq!(backend_info(None).color, "#909399");
    }

    #[test]
    fn test_backend_table() {
        assert_eq!(backend_info(Some(BackendType::Vlm.as_str())).icon, "VLM");
        assert_eq!(
            backend_info(Some(BackendType::Pipeline.as_str())).color,
            "#409EFF"
        );
    }

    #[test]
    fn test_severity_is_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Success < Severity::Danger);
    }
}
