//! 异步计算等待 - 业务能力层

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::infrastructure::{CalculationHandle, CalculationState};

const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_INTERVAL: Duration = Duration::from_secs(3);
const BACKOFF_FACTOR: f64 = 1.5;

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    /// 超时不算错误，调用方继续执行
    TimedOut,
}

/// 轮询计算状态直到完成或超过 `max_wait`
///
/// 轮询间隔从 0.5 秒开始，每次乘 1.5，上限 3 秒。
/// 完成后再调用一次 `finish_pending_queries`。
pub async fn wait_for_calculations<H>(handle: &mut H, max_wait: Duration) -> AppResult<WaitOutcome>
where
    H: CalculationHandle + ?Sized,
{
    let start = Instant::now();
    let mut interval = INITIAL_INTERVAL;

    while handle.calculation_state().await? != CalculationState::Done {
        if start.elapsed() > max_wait {
            warn!("⚠️ 计算在 {:?} 内未完成，继续执行", max_wait);
            return Ok(WaitOutcome::TimedOut);
        }
        sleep(interval).await;
        interval = interval.mul_f64(BACKOFF_FACTOR).min(MAX_INTERVAL);
    }

    handle.finish_pending_queries().await?;
    debug!("计算完成，耗时 {:?}", start.elapsed());
    Ok(WaitOutcome::Completed)
}
