//! 本地状态表 - 流程层
//!
//! 记录每个文件最近一次观测到的解析状态。状态只前进不后退，
//! 过期或乱序的观测直接丢弃。
//!
//! 状态表只在当前会话内有效：删除文件或批处理完成一个文件后移除对应条目。

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::models::FileStatus;
use crate::utils::lock;

#[derive(Debug, Default)]
pub struct StatusBoard {
    statuses: Mutex<HashMap<String, FileStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次观测
    ///
    /// # 返回
    /// 状态前进（或首次记录）时返回 `true`
    pub fn record(&self, file_id: &str, status: FileStatus) -> bool {
        let mut statuses = lock(&self.statuses);
        match statuses.get(file_id).copied() {
            Some(current) if current.rank() >= status.rank() => {
                if current != status {
                    debug!(
                        "[文件 {}] 丢弃过期状态 {} (当前 {})",
                        file_id, status, current
                    );
                }
                false
            }
            _ => {
                statuses.insert(file_id.to_string(), status);
                true
            }
        }
    }

    pub fn get(&self, file_id: &str) -> Option<FileStatus> {
        lock(&self.statuses).get(file_id).copied()
    }

    pub fn forget(&self, file_id: &str) {
        lock(&self.statuses).remove(file_id);
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.statuses).is_empty()
    }
}
