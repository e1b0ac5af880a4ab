use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 解析服务 API 根路径
    pub api_base_url: String,
    /// 单次请求超时（秒），解析相关接口较慢，默认给得比较宽松
    pub request_timeout_secs: u64,
    /// 显式指定的用户标识（优先于本地身份文件）
    pub user_id: Option<String>,
    /// 本地身份文件路径
    pub identity_file: String,
    /// 解析状态轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 连续轮询失败上限，超过后判定为解析失败
    pub max_consecutive_poll_failures: u32,
    /// 同时跟踪的文件数量
    pub max_concurrent_files: usize,
    /// 待上传文件目录
    pub upload_dir: String,
    /// 导出格式
    pub export_format: String,
    /// 导出文件保存目录
    pub output_dir: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            request_timeout_secs: 30,
            user_id: None,
            identity_file: ".docparse_user_id".to_string(),
            poll_interval_ms: 2000,
            max_consecutive_poll_failures: 5,
            max_concurrent_files: 4,
            upload_dir: "uploads".to_string(),
            export_format: "markdown".to_string(),
            output_dir: "exports".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 默认配置 + 环境变量覆盖
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// 从 TOML 文件加载（缺省字段使用默认值）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        Ok(config)
    }

    /// 完整加载顺序：默认值 → `DOCPARSE_CONFIG` 指向的 TOML 文件 → 环境变量
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("DOCPARSE_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// 用环境变量覆盖当前配置，无法解析的值保持原样
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("DOCPARSE_API_BASE_URL") {
            self.api_base_url = v;
        }
        parse_env("DOCPARSE_TIMEOUT_SECS", &mut self.request_timeout_secs);
        if let Ok(v) = std::env::var("DOCPARSE_USER_ID") {
            self.user_id = Some(v);
        }
        if let Ok(v) = std::env::var("DOCPARSE_IDENTITY_FILE") {
            self.identity_file = v;
        }
        parse_env("DOCPARSE_POLL_INTERVAL_MS", &mut self.poll_interval_ms);
        parse_env(
            "DOCPARSE_MAX_POLL_FAILURES",
            &mut self.max_consecutive_poll_failures,
        );
        parse_env(
            "DOCPARSE_MAX_CONCURRENT_FILES",
            &mut self.max_concurrent_files,
        );
        if let Ok(v) = std::env::var("DOCPARSE_UPLOAD_DIR") {
            self.upload_dir = v;
        }
        if let Ok(v) = std::env::var("DOCPARSE_EXPORT_FORMAT") {
            self.export_format = v;
        }
        if let Ok(v) = std::env::var("DOCPARSE_OUTPUT_DIR") {
            self.output_dir = v;
        }
        parse_env("VERBOSE_LOGGING", &mut self.verbose_logging);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_env<T: FromStr>(var_name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(var_name) {
        match raw.parse() {
            Ok(v) => *target = v,
            Err(_) => warn!("环境变量 {} 解析失败: '{}'，保持原值", var_name, raw),
        }
    }
}
