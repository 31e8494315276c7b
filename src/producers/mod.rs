//! 下载生产者 - 外部协作者适配层
//!
//! 编排器只把生产者看作"成功或失败"的不透明任务。
//! 失败时不得持有外部会话锁；可以手动重跑。

pub mod sap_download;
pub mod sub_jobs;
pub mod web_download;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Credentials, ProgressSink};

pub use sap_download::SapProducer;
pub use sub_jobs::{join_sub_jobs, SubJob};
pub use web_download::PdbsProducer;

/// 下载生产者
#[async_trait]
pub trait DownloadProducer: Send + Sync {
    /// 日志标签，例如 "PDBS"
    fn name(&self) -> &str;

    /// 执行一次完整下载
    async fn run(&self, credentials: &Credentials, sink: &ProgressSink) -> AppResult<()>;
}
