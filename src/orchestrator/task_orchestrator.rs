//! 任务编排器 - 编排层
//!
//! ## 职责
//!
//! 把用户选择的任务（单个下载、报表、组合任务）调度到后台执行，
//! 汇总为一个终态 [`RunSummary`]，并通过 [`ProgressSink`] 发送最终结果。
//!
//! ## 组合任务
//!
//! - `Both`：PDBS 与 SAP 在两个独立的 tokio 任务中并行，等待两者都结束
//! - `All`：先执行 `Both`，两个下载都成功后才运行 Excel 报表
//!
//! 编排器本身从不返回错误：任何失败都折算为终态加一条可读消息。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::models::{
    Credentials, ProgressSink, RunCredentials, RunState, RunSummary, TaskKind, TaskOutcome,
};
use crate::producers::DownloadProducer;
use crate::workflow::ReportTask;

/// SAP 相对 PDBS 的启动延迟
pub const SAP_STAGGER: Duration = Duration::from_secs(2);

/// 任务编排器
#[derive(Clone)]
pub struct TaskOrchestrator {
    web: Arc<dyn DownloadProducer>,
    sap: Arc<dyn DownloadProducer>,
    report: Arc<dyn ReportTask>,
    sink: ProgressSink,
    running: Arc<AtomicBool>,
    sap_stagger: Duration,
}

/// 运行标志守卫，离开作用域时清除标志
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TaskOrchestrator {
    pub fn new(
        web: Arc<dyn DownloadProducer>,
        sap: Arc<dyn DownloadProducer>,
        report: Arc<dyn ReportTask>,
        sink: ProgressSink,
    ) -> Self {
        Self {
            web,
            sap,
            report,
            sink,
            running: Arc::new(AtomicBool::new(false)),
            sap_stagger: SAP_STAGGER,
        }
    }

    pub fn with_sap_stagger(mut self, stagger: Duration) -> Self {
        self.sap_stagger = stagger;
        self
    }

    /// 是否有任务正在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RunState {
        if self.is_running() {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// 在后台任务中运行；已有任务在运行时拒绝启动
    pub fn spawn(
        &self,
        task: TaskKind,
        credentials: RunCredentials,
    ) -> AppResult<JoinHandle<RunSummary>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::AlreadyRunning);
        }
        let guard = RunningGuard(self.running.clone());
        let this = self.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            this.run(task, &credentials).await
        }))
    }

    /// 运行一个任务直到终态
    pub async fn run(&self, task: TaskKind, credentials: &RunCredentials) -> RunSummary {
        info!("🚀 开始任务: {}", task);
        let (state, message) = match task {
            TaskKind::WebsiteDownload => {
                self.sink.line("启动 PDBS 下载...");
                single(
                    run_producer(&*self.web, &credentials.web, &self.sink).await,
                    "PDBS 文件下载成功!",
                )
            }
            TaskKind::SapExtraction => {
                self.sink.line("启动 SAP 导出...");
                single(
                    run_producer(&*self.sap, &credentials.sap, &self.sink).await,
                    "SAP 文件下载成功!",
                )
            }
            TaskKind::ExcelReport => {
                self.sink.line("启动 Excel 报表引擎...");
                match self.report.run(&self.sink).await {
                    Ok(report) => (RunState::Succeeded, format!("Excel 报表完成! ({})", report)),
                    Err(e) => {
                        self.sink.line(format!("错误: {}", e));
                        (RunState::Failed, format!("错误: {}", e))
                    }
                }
            }
            TaskKind::Both => {
                self.sink.line("并行启动 PDBS 与 SAP...");
                let (web, sap) = self.run_downloads(credentials).await;
                combine_downloads(&web, &sap)
            }
            TaskKind::All => self.run_all(credentials).await,
        };

        let summary = RunSummary {
            task,
            state,
            message,
        };
        if summary.success() {
            info!("✓ {}: {}", task, summary.message);
        } else {
            error!("❌ {}: {}", task, summary.message);
        }
        self.sink.finished(summary.success(), summary.message.clone());
        summary
    }

    async fn run_all(&self, credentials: &RunCredentials) -> (RunState, String) {
        self.sink.line("开始下载 (PDBS + SAP)...");
        let (web, sap) = self.run_downloads(credentials).await;

        if !(web.is_success() && sap.is_success()) {
            let detail = match (web.is_success(), sap.is_success()) {
                (false, false) => "PDBS 与 SAP 均失败",
                (false, true) => "PDBS 失败, SAP 成功",
                _ => "PDBS 成功, SAP 失败",
            };
            return (
                RunState::Failed,
                format!("下载失败: {}。已跳过 Excel 报表。", detail),
            );
        }

        self.sink.line("→ 启动 Excel 报表引擎...");
        match self.report.run(&self.sink).await {
            Ok(report) => (
                RunState::Succeeded,
                format!("所有任务已完成! ({})", report),
            ),
            Err(e) => {
                self.sink.line(format!("✗ Excel 报表失败: {}", e));
                (
                    RunState::PartiallyFailed,
                    format!("下载成功但 Excel 报表失败: {}", e),
                )
            }
        }
    }

    /// 两个下载在独立的任务中并行，等待两者都结束
    async fn run_downloads(&self, credentials: &RunCredentials) -> (TaskOutcome, TaskOutcome) {
        let web = {
            let producer = self.web.clone();
            let creds = credentials.web.clone();
            let sink = self.sink.clone();
            tokio::spawn(async move { run_producer(&*producer, &creds, &sink).await })
        };
        let sap = {
            let producer = self.sap.clone();
            let creds = credentials.sap.clone();
            let sink = self.sink.clone();
            let stagger = self.sap_stagger;
            tokio::spawn(async move {
                sleep(stagger).await;
                run_producer(&*producer, &creds, &sink).await
            })
        };

        let (web, sap) = tokio::join!(web, sap);
        (joined(web), joined(sap))
    }
}

/// 运行单个生产者并向前端报告开始与结束
async fn run_producer(
    producer: &dyn DownloadProducer,
    credentials: &Credentials,
    sink: &ProgressSink,
) -> TaskOutcome {
    let name = producer.name().to_string();
    sink.line(format!("→ {} 下载开始...", name));
    let outcome = TaskOutcome::from(producer.run(credentials, sink).await);
    match outcome.reason() {
        None => sink.line(format!("✓ {} 下载完成!", name)),
        Some(reason) => sink.line(format!("✗ {} 下载失败: {}", name, reason)),
    }
    outcome
}

fn joined(result: Result<TaskOutcome, tokio::task::JoinError>) -> TaskOutcome {
    result.unwrap_or_else(|e| TaskOutcome::Failure(format!("任务异常退出: {}", e)))
}

fn single(outcome: TaskOutcome, success_message: &str) -> (RunState, String) {
    match outcome {
        TaskOutcome::Success => (RunState::Succeeded, success_message.to_string()),
        TaskOutcome::Failure(reason) => (RunState::Failed, format!("错误: {}", reason)),
    }
}

/// 合并两个下载的结果
fn combine_downloads(web: &TaskOutcome, sap: &TaskOutcome) -> (RunState, String) {
    match (web, sap) {
        (TaskOutcome::Success, TaskOutcome::Success) => {
            (RunState::Succeeded, "两个下载均已完成!".to_string())
        }
        (TaskOutcome::Success, TaskOutcome::Failure(reason)) => {
            partial_failure("PDBS", "SAP", reason)
        }
        (TaskOutcome::Failure(reason), TaskOutcome::Success) => {
            partial_failure("SAP", "PDBS", reason)
        }
        (TaskOutcome::Failure(_), TaskOutcome::Failure(_)) => {
            (RunState::Failed, "两个下载均失败!".to_string())
        }
    }
}

fn partial_failure(succeeded: &str, failed: &str, reason: &str) -> (RunState, String) {
    let err = AppError::PartialFailure {
        succeeded: succeeded.to_string(),
        failed: failed.to_string(),
        reason: reason.to_string(),
    };
    (RunState::PartiallyFailed, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UiEvent;
    use crate::workflow::PipelineReport;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct FakeProducer {
        name: &'static str,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
        started_at: Mutex<Option<Instant>>,
    }

    impl FakeProducer {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Self::slow(name, fail, Duration::ZERO)
        }

        fn slow(name: &'static str, fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                delay,
                calls: AtomicUsize::new(0),
                started_at: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl DownloadProducer for FakeProducer {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, _credentials: &Credentials, _sink: &ProgressSink) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.started_at.lock().unwrap() = Some(Instant::now());
            sleep(self.delay).await;
            if self.fail {
                Err(AppError::Other(format!("{} 登录失败", self.name)))
            } else {
                Ok(())
            }
        }
    }

    struct FakeReport {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeReport {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReportTask for FakeReport {
        async fn run(&self, _sink: &ProgressSink) -> AppResult<PipelineReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::Other("工作簿打不开".to_string()))
            } else {
                Ok(PipelineReport {
                    applied: 19,
                    ..Default::default()
                })
            }
        }
    }

    fn orchestrator(
        web: Arc<FakeProducer>,
        sap: Arc<FakeProducer>,
        report: Arc<FakeReport>,
        sink: ProgressSink,
    ) -> TaskOrchestrator {
        TaskOrchestrator::new(web, sap, report, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_with_one_failure_is_partial() {
        let (sink, mut rx) = ProgressSink::channel();
        let orch = orchestrator(
            FakeProducer::new("PDBS", false),
            FakeProducer::new("SAP", true),
            FakeReport::new(false),
            sink,
        );

        let summary = orch.run(TaskKind::Both, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::PartiallyFailed);
        assert!(summary.message.contains("SAP ✗"));
        assert!(!summary.success());

        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            if let UiEvent::Finished { success, message } = event {
                finished = Some((success, message));
            }
        }
        assert_eq!(finished, Some((false, summary.message)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_outcomes() {
        let ok = orchestrator(
            FakeProducer::new("PDBS", false),
            FakeProducer::new("SAP", false),
            FakeReport::new(false),
            ProgressSink::disabled(),
        );
        let summary = ok.run(TaskKind::Both, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::Succeeded);

        let web_failed = orchestrator(
            FakeProducer::new("PDBS", true),
            FakeProducer::new("SAP", false),
            FakeReport::new(false),
            ProgressSink::disabled(),
        );
        let summary = web_failed.run(TaskKind::Both, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::PartiallyFailed);
        assert!(summary.message.contains("PDBS ✗"));

        let none = orchestrator(
            FakeProducer::new("PDBS", true),
            FakeProducer::new("SAP", true),
            FakeReport::new(false),
            ProgressSink::disabled(),
        );
        let summary = none.run(TaskKind::Both, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_skips_report_when_download_fails() {
        let report = FakeReport::new(false);
        let orch = orchestrator(
            FakeProducer::new("PDBS", true),
            FakeProducer::new("SAP", false),
            report.clone(),
            ProgressSink::disabled(),
        );

        let summary = orch.run(TaskKind::All, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::Failed);
        assert!(summary.message.contains("已跳过 Excel 报表"));
        assert_eq!(report.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_distinguishes_report_failure() {
        let report = FakeReport::new(true);
        let orch = orchestrator(
            FakeProducer::new("PDBS", false),
            FakeProducer::new("SAP", false),
            report.clone(),
            ProgressSink::disabled(),
        );

        let summary = orch.run(TaskKind::All, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::PartiallyFailed);
        assert!(summary.message.starts_with("下载成功但 Excel 报表失败"));
        assert_eq!(report.calls.load(Ordering::SeqCst), 1);

        let ok = orchestrator(
            FakeProducer::new("PDBS", false),
            FakeProducer::new("SAP", false),
            FakeReport::new(false),
            ProgressSink::disabled(),
        );
        let summary = ok.run(TaskKind::All, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tasks_pass_outcome_through() {
        let web = FakeProducer::new("PDBS", false);
        let sap = FakeProducer::new("SAP", true);
        let orch = orchestrator(web.clone(), sap.clone(), FakeReport::new(false), ProgressSink::disabled());

        let summary = orch.run(TaskKind::WebsiteDownload, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::Succeeded);
        let summary = orch.run(TaskKind::SapExtraction, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::Failed);
        assert!(summary.message.contains("SAP 登录失败"));
        let summary = orch.run(TaskKind::ExcelReport, &RunCredentials::default()).await;
        assert_eq!(summary.state, RunState::Succeeded);

        assert_eq!(web.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sap.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sap_starts_after_stagger() {
        let web = FakeProducer::new("PDBS", false);
        let sap = FakeProducer::new("SAP", false);
        let orch = orchestrator(web.clone(), sap.clone(), FakeReport::new(false), ProgressSink::disabled());

        orch.run(TaskKind::Both, &RunCredentials::default()).await;
        let web_start = web.started_at.lock().unwrap().unwrap();
        let sap_start = sap.started_at.lock().unwrap().unwrap();
        assert!(sap_start - web_start >= SAP_STAGGER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_refuses_second_run() {
        let orch = orchestrator(
            FakeProducer::slow("PDBS", false, Duration::from_secs(30)),
            FakeProducer::new("SAP", false),
            FakeReport::new(false),
            ProgressSink::disabled(),
        );

        assert_eq!(orch.state(), RunState::Idle);
        let handle = orch
            .spawn(TaskKind::WebsiteDownload, RunCredentials::default())
            .unwrap();
        assert!(orch.is_running());
        assert_eq!(orch.state(), RunState::Running);
        let second = orch.spawn(TaskKind::SapExtraction, RunCredentials::default());
        assert!(matches!(second, Err(AppError::AlreadyRunning)));

        let summary = handle.await.unwrap();
        assert!(summary.success());
        assert_eq!(orch.state(), RunState::Idle);
        orch.spawn(TaskKind::SapExtraction, RunCredentials::default())
            .unwrap()
            .await
            .unwrap();
    }
}
