//! 日志工具模块
//!
//! 提供启动横幅和最终结果的输出

use std::path::Path;

use tracing::{error, info};

use crate::config::Config;
use crate::models::{RunSummary, TaskKind};

/// 横幅中消息的最大长度
const BANNER_MESSAGE_LEN: usize = 200;

/// 记录程序启动信息
pub fn log_startup(task: TaskKind, config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 AMS Orders 启动 - 任务: {}", task);
    info!("📂 工作目录: {}", config.work_dir.display());
    info!(
        "⏱️ 时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

/// 打印最终结果
pub fn print_final_outcome(summary: &RunSummary, log_file_path: &Path) {
    let message = truncate_text(&summary.message, BANNER_MESSAGE_LEN);
    info!("\n{}", "=".repeat(60));
    info!("📊 任务结束: {} ({:?})", summary.task, summary.state);
    if summary.success() {
        info!("✅ {}", message);
    } else {
        error!("❌ {}", message);
    }
    info!("{}", "=".repeat(60));
    info!("日志已保存至: {}", log_file_path.display());
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
