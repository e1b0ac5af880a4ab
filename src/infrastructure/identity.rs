//! 设备身份 - 基础设施层
//!
//! 每台设备一个稳定的标识，用于请求归属，不是登录凭证

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// 设备身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    user_id: String,
}

impl DeviceIdentity {
    /// 解析身份：显式指定 > 本地身份文件 > 新生成并写入文件
    ///
    /// # 参数
    /// - `explicit`: 配置中显式指定的标识
    /// - `identity_file`: 本地身份文件路径
    pub fn resolve(explicit: Option<&str>, identity_file: &Path) -> Result<Self> {
        if let Some(user_id) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
            debug!("使用配置中指定的用户标识");
            return Ok(Self {
                user_id: user_id.to_string(),
            });
        }
        Self::load_or_create(identity_file)
    }

    /// 读取本地身份文件，不存在或为空时生成新标识
    pub fn load_or_create(identity_file: &Path) -> Result<Self> {
        if identity_file.exists() {
            let content = fs::read_to_string(identity_file)
                .with_context(|| format!("无法读取身份文件: {}", identity_file.display()))?;
            let user_id = content.trim();
            if !user_id.is_empty() {
                return Ok(Self {
                    user_id: user_id.to_string(),
                });
            }
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        if let Some(parent) = identity_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
        fs::write(identity_file, &user_id)
            .with_context(|| format!("无法写入身份文件: {}", identity_file.display()))?;
        info!("✓ 已生成新的设备标识: {}", identity_file.display());

        Ok(Self { user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}
