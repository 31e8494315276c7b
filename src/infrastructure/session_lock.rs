//! 外部会话锁 - 基础设施层
//!
//! 整个进程同一时间只允许驱动一个外部电子表格会话。
//! 锁以显式句柄传递给需要它的组件；守卫在离开作用域时释放（包括出错路径）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error};

use crate::error::{AppResult, TimeoutError};

/// 默认获取超时
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// 外部会话锁句柄
#[derive(Debug, Clone, Default)]
pub struct SessionLock {
    inner: Arc<Mutex<()>>,
}

/// 持有期间独占外部会话
#[derive(Debug)]
pub struct SessionGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SessionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `timeout` 内获取锁，超时返回 `TimeoutError::SessionLock`
    pub async fn acquire(&self, timeout: Duration) -> AppResult<SessionGuard> {
        match tokio::time::timeout(timeout, self.inner.clone().lock_owned()).await {
            Ok(guard) => {
                debug!("已获取外部会话锁");
                Ok(SessionGuard { _guard: guard })
            }
            Err(_) => {
                error!("等待外部会话锁超时 ({:?})", timeout);
                Err(TimeoutError::SessionLock(timeout).into())
            }
        }
    }

    /// 当前是否被占用
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
