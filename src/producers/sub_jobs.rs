//! 并发子任务的汇合

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{AppError, AppResult, TimeoutError};
use crate::models::ProgressSink;

/// 一个已启动的子任务
pub struct SubJob {
    pub name: String,
    pub handle: JoinHandle<AppResult<()>>,
}

impl SubJob {
    pub fn spawn<F>(name: impl Into<String>, future: F) -> Self
    where
        F: std::future::Future<Output = AppResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handle: tokio::spawn(future),
        }
    }
}

/// 依次等待所有子任务，每次等待最多 `timeout`
///
/// 某个子任务超时后仍会继续等待其余子任务，最后统一报告：
/// 有超时时返回 `TimeoutError::SubJobs`（列出超时的任务名），
/// 否则有失败时返回失败信息。
pub async fn join_sub_jobs(jobs: Vec<SubJob>, timeout: Duration, sink: &ProgressSink) -> AppResult<()> {
    let mut timed_out = Vec::new();
    let mut failures: Vec<(String, AppError)> = Vec::new();

    for SubJob { name, mut handle } in jobs {
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                info!("✓ 子任务 {} 完成", name);
                sink.line(format!("✓ {} 完成", name));
            }
            Ok(Ok(Err(e))) => {
                error!("❌ 子任务 {} 失败: {}", name, e);
                sink.line(format!("❌ {} 失败: {}", name, e));
                failures.push((name, e));
            }
            Ok(Err(join_err)) => {
                error!("❌ 子任务 {} 异常退出: {}", name, join_err);
                failures.push((name, AppError::Other(join_err.to_string())));
            }
            Err(_) => {
                error!("⏱️ 子任务 {} 超过 {:?} 未完成", name, timeout);
                sink.line(format!("⏱️ {} 超时", name));
                handle.abort();
                timed_out.push(name);
            }
        }
    }

    if !timed_out.is_empty() {
        return Err(TimeoutError::SubJobs {
            jobs: timed_out.join(", "),
            timeout,
        }
        .into());
    }
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0).1),
        _ => Err(AppError::Other(
            failures
                .iter()
                .map(|(name, e)| format!("{}: {}", name, e))
                .collect::<Vec<_>>()
                .join("\n"),
        )),
    }
}
