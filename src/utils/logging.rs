//! 日志工具模块
//!
//! 提供日志初始化和输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// # 参数
/// - `verbose`: 未设置 `RUST_LOG` 时是否输出 debug 级别
///
/// 重复初始化会被忽略
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 运行配置
/// - `user_id`: 当前设备身份
pub fn log_startup(config: &Config, user_id: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 文档解析批处理模式");
    info!("🌐 服务地址: {}", config.api_base_url);
    info!("🪪 设备身份: {}", user_id);
    info!("📊 最大并发数: {}", config.max_concurrent_files);
    info!("{}", "=".repeat(60));
}

/// 记录文件加载信息
///
/// # 参数
/// - `total`: 文件总数
/// - `total_bytes`: 总字节数
pub fn log_files_loaded(total: usize, total_bytes: u64) {
    info!("✓ 找到 {} 个待上传的文件 (共 {} 字节)", total, total_bytes);
}

/// 记录上传结果
///
/// # 参数
/// - `success`: 成功数量
/// - `total`: 总数
/// - `batch_error`: 整批失败提示
pub fn log_upload_complete(success: usize, total: usize, batch_error: Option<&str>) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 上传完成: 成功 {}/{}", success, total);
    if let Some(message) = batch_error {
        info!("⚠️ 批量上传提示: {}", message);
    }
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `exported`: 导出成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `output_dir`: 导出目录
pub fn print_final_stats(exported: usize, failed: usize, total: usize, output_dir: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 导出成功: {}/{}", exported, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n导出文件已保存至: {}", output_dir);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
