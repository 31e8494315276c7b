//! 门户下载生产者 (PDBS)
//!
//! 两个流程各用一个浏览器并发执行：
//! 1. 物料短缺报表导出
//! 2. 日报三连：计费（今天）→ 未完成（今天）→ 已完成（上一个工作日）
//!
//! `.xls` 下载在外部会话锁内转换为 `.xlsx`。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::DownloadProducer;
use crate::browser::{self, PortalBrowser};
use crate::config::WebConfig;
use crate::error::{AppError, AppResult, AuthError};
use crate::infrastructure::{JsExecutor, SessionLock, SpreadsheetEngine};
use crate::models::{Credentials, ProgressSink};
use crate::services::business_day::previous_business_day;
use crate::services::file_utils::{remove_old_files, wait_for_download, DOWNLOAD_PREFIXES};

const USERNAME_FIELD: &str = "#txtUserName";
const PASSWORD_FIELD: &str = "#xPWD";
const SUBMIT_BUTTON: &str = "#btnSubmit";
const LOGIN_ERROR: &str = ".text-danger";

const PROCESS_CONTROL_LINK: &str =
    r#"a[href='javascript:onClickTaskMenu("DNProcessRedirect.asp", 351)']"#;
const ORDER_REPORT_LINK: &str = r#"a[href='javascript:onClickTaskMenu("OrdReport.asp", 65)']"#;
const DATE_FIELD: &str = "[name='Date']";

const MAT_SHORTAGE_PREFIX: &str = "MatShortageRpt";
const DAILY_REPORT_DOWNLOAD: &str = "DailyReport.xls";

/// 登录后等待结果页面的时间
const LOGIN_RESPONSE_WAIT: Duration = Duration::from_secs(5);
/// 等待页面元素出现的时间
const ELEMENT_WAIT: Duration = Duration::from_secs(480);
const ELEMENT_POLL: Duration = Duration::from_millis(500);

/// 日报下载
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DailyReport {
    link_text: &'static str,
    target: &'static str,
    previous_day: bool,
}

const DAILY_REPORTS: [DailyReport; 3] = [
    DailyReport {
        link_text: "Report in Excel",
        target: "Billing Only.xlsx",
        previous_day: false,
    },
    DailyReport {
        link_text: "Order Fulfillment Report",
        target: "DailyReport Incompletes.xlsx",
        previous_day: false,
    },
    DailyReport {
        link_text: "Order Fulfillment Report",
        target: "DailyReport Completed.xlsx",
        previous_day: true,
    },
];

/// 门户下载生产者
pub struct PdbsProducer {
    config: WebConfig,
    work_dir: PathBuf,
    engine: Arc<dyn SpreadsheetEngine>,
    lock: SessionLock,
    lock_timeout: Duration,
}

impl PdbsProducer {
    pub fn new(
        config: WebConfig,
        work_dir: impl Into<PathBuf>,
        engine: Arc<dyn SpreadsheetEngine>,
        lock: SessionLock,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
            engine,
            lock,
            lock_timeout,
        }
    }

    /// 打开门户首页（每个流程一个浏览器）
    async fn open_portal(&self) -> AppResult<PortalBrowser> {
        let url = self.config.pdbs_url()?;
        match self.config.browser_debug_port {
            Some(port) => browser::connect_to_browser(port, url, &self.work_dir).await,
            None => {
                browser::launch_portal_browser(
                    url,
                    &self.work_dir,
                    self.config.browser_executable.as_deref(),
                    self.config.headless,
                )
                .await
            }
        }
    }

    /// 在会话锁内把旧格式文件转换为 xlsx，成功后删除原文件
    pub async fn convert_download(&self, source: &Path, target_name: &str) -> AppResult<PathBuf> {
        let target = self.work_dir.join(target_name);
        {
            let _guard = self.lock.acquire(self.lock_timeout).await?;
            self.engine.convert_to_xlsx(source, &target).await?;
        }
        if let Err(e) = tokio::fs::remove_file(source).await {
            warn!("⚠️ [PDBS] 无法删除 {}: {}", source.display(), e);
        }
        info!("✓ [PDBS] {} → {}", source.display(), target_name);
        Ok(target)
    }

    /// 物料短缺导出的最终文件名统一为 MatShortageRpt.xlsx
    pub async fn finalize_mat_shortage(&self, downloaded: &Path) -> AppResult<PathBuf> {
        let target_name = format!("{}.xlsx", MAT_SHORTAGE_PREFIX);
        let target = self.work_dir.join(&target_name);
        if downloaded == target {
            return Ok(target);
        }
        let is_xlsx = downloaded
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
        if !is_xlsx {
            return self.convert_download(downloaded, &target_name).await;
        }
        if target.exists() {
            error!("❌ [PDBS] {} 已存在，保留 {}", target.display(), downloaded.display());
            return Ok(downloaded.to_path_buf());
        }
        tokio::fs::rename(downloaded, &target)
            .await
            .map_err(|e| AppError::io(format!("无法重命名 {}", downloaded.display()), e))?;
        info!("✓ [PDBS] 已重命名为 {}", target.display());
        Ok(target)
    }

    async fn mat_shortage_flow(&self, credentials: &Credentials, sink: &ProgressSink) -> AppResult<()> {
        let portal = self.open_portal().await?;
        let result: AppResult<()> = async {
            let js = JsExecutor::new(portal.page.clone());
            sink.line("[PDBS] 登录以获取 MatShortage 数据...");
            login(&js, credentials).await?;

            wait_for_element(&js, "a", ELEMENT_WAIT).await?;
            info!("[PDBS] 打开 AODN Process Control...");
            js.click(PROCESS_CONTROL_LINK).await?;
            wait_for_element(&js, "#Submit", ELEMENT_WAIT).await?;
            js.click("#Submit").await?;
            wait_for_element(&js, "#pnlMartShortage", ELEMENT_WAIT).await?;
            js.click("#pnlMartShortage").await?;
            wait_for_element(&js, "#MainContent_btnExportExcel", ELEMENT_WAIT).await?;
            js.click("#MainContent_btnExportExcel").await?;
            sleep(Duration::from_secs(2)).await;

            let downloaded = wait_for_download(
                &self.work_dir,
                MAT_SHORTAGE_PREFIX,
                self.config.download_timeout(),
                None,
            )
            .await?;
            self.finalize_mat_shortage(&downloaded).await?;
            sink.line("[PDBS] ✓ MatShortageRpt 已下载");
            Ok(())
        }
        .await;
        portal.shutdown().await;
        result
    }

    async fn daily_report_flow(&self, credentials: &Credentials, sink: &ProgressSink) -> AppResult<()> {
        let today = Local::now().date_naive();
        let prev_day = previous_business_day(today);

        let portal = self.open_portal().await?;
        let result: AppResult<()> = async {
            let js = JsExecutor::new(portal.page.clone());
            sink.line("[PDBS] 登录以获取 DailyReport...");
            login(&js, credentials).await?;
            wait_for_element(&js, ORDER_REPORT_LINK, ELEMENT_WAIT).await?;
            js.click(ORDER_REPORT_LINK).await?;

            for report in DAILY_REPORTS.iter() {
                let date = if report.previous_day { prev_day } else { today };
                self.download_daily_report(&js, report, date).await?;
                sink.line(format!("[PDBS] ✓ {} 已下载", report.target));
            }
            Ok(())
        }
        .await;
        portal.shutdown().await;
        result
    }

    async fn download_daily_report(
        &self,
        js: &JsExecutor,
        report: &DailyReport,
        date: NaiveDate,
    ) -> AppResult<()> {
        wait_for_element(js, DATE_FIELD, ELEMENT_WAIT).await?;
        js.fill(DATE_FIELD, &date.format("%m/%d/%Y").to_string()).await?;
        js.eval("ChgDate()").await?;

        let started = SystemTime::now();
        js.click_link_text(report.link_text).await?;
        let downloaded = wait_for_download(
            &self.work_dir,
            DAILY_REPORT_DOWNLOAD,
            self.config.download_timeout(),
            Some(started),
        )
        .await?;
        self.convert_download(&downloaded, report.target).await?;
        Ok(())
    }
}

/// 提交登录表单并判断结果
///
/// 出现链接即视为登录成功；否则读取错误提示判断是否为凭据错误。
async fn login(js: &JsExecutor, credentials: &Credentials) -> AppResult<()> {
    js.fill(USERNAME_FIELD, &credentials.username).await?;
    js.fill(PASSWORD_FIELD, &credentials.password).await?;
    js.click(SUBMIT_BUTTON).await?;
    info!("[PDBS] 等待登录响应...");

    if wait_for_element(js, "a", LOGIN_RESPONSE_WAIT).await.is_ok() {
        info!("✓ [PDBS] 登录成功");
        return Ok(());
    }
    match js.text_of(LOGIN_ERROR).await {
        Ok(Some(message)) if !message.is_empty() => {
            error!("❌ [PDBS] 登录失败: {}", message);
            Err(AuthError::InvalidCredentials(message).into())
        }
        _ => {
            error!("❌ [PDBS] 登录超时，没有结果页面也没有错误提示");
            Err(AuthError::NoResponse.into())
        }
    }
}

/// 轮询直到元素出现
///
/// 页面跳转期间的脚本错误视为"尚未出现"。
async fn wait_for_element(js: &JsExecutor, selector: &str, timeout: Duration) -> AppResult<()> {
    let start = Instant::now();
    loop {
        match js.exists(selector).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => debug!("等待 {}: {}", selector, e),
        }
        if start.elapsed() >= timeout {
            return Err(AppError::script(format!(
                "{:?} 内没有出现 {}",
                timeout, selector
            )));
        }
        sleep(ELEMENT_POLL).await;
    }
}

#[async_trait]
impl DownloadProducer for PdbsProducer {
    fn name(&self) -> &str {
        "PDBS"
    }

    async fn run(&self, credentials: &Credentials, sink: &ProgressSink) -> AppResult<()> {
        remove_old_files(&self.work_dir, &DOWNLOAD_PREFIXES).await?;
        sink.line("[PDBS] 🚀 开始下载...");

        let (mat, daily) = tokio::join!(
            self.mat_shortage_flow(credentials, sink),
            self.daily_report_flow(credentials, sink),
        );

        let mut errors: Vec<(&str, AppError)> = Vec::new();
        if let Err(e) = mat {
            errors.push(("MatShortage", e));
        }
        if let Err(e) = daily {
            errors.push(("DailyReport", e));
        }

        match errors.len() {
            0 => {
                sink.line("[PDBS] ✓ 所有下载已完成");
                Ok(())
            }
            1 => {
                let (flow, e) = errors.remove(0);
                error!("❌ [PDBS] {} 失败: {}", flow, e);
                sink.line(format!("[PDBS] ❌ {}: {}", flow, e));
                Err(e)
            }
            _ => {
                let combined = errors
                    .iter()
                    .map(|(flow, e)| format!("{}: {}", flow, e))
                    .collect::<Vec<_>>()
                    .join("\n");
                error!("❌ [PDBS] 下载失败:\n{}", combined);
                sink.line(format!("[PDBS] ❌ {}", combined));
                Err(AppError::Other(combined))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::SnapshotEngine;

    fn producer(dir: &Path, lock: SessionLock) -> PdbsProducer {
        PdbsProducer::new(
            WebConfig::default(),
            dir,
            Arc::new(SnapshotEngine::new()),
            lock,
            Duration::from_secs(60),
        )
    }

    fn write_daily_report(path: &Path) {
        let mut wb = rust_xlsxwriter::Workbook::new();
        let sheet = wb.add_worksheet();
        sheet.write_string(0, 0, "Billing Only").unwrap();
        sheet.write_number(1, 0, 3.0).unwrap();
        wb.save(path).unwrap();
    }

    #[tokio::test]
    async fn test_convert_download_replaces_source() {
        use calamine::{open_workbook, Data, Reader, Xlsx};

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("DailyReport.xls");
        write_daily_report(&source);

        let lock = SessionLock::new();
        let target = producer(dir.path(), lock.clone())
            .convert_download(&source, "Billing Only.xlsx")
            .await
            .unwrap();

        assert_eq!(target, dir.path().join("Billing Only.xlsx"));
        let mut converted: Xlsx<_> = open_workbook(&target).unwrap();
        let range = converted.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.get_value((1, 0)), Some(&Data::Float(3.0)));
        assert!(!source.exists());
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_unconvertible_download_fails_and_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("DailyReport.xls");
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0];
        bytes.extend_from_slice(b"legacy-xls");
        std::fs::write(&source, &bytes).unwrap();

        let lock = SessionLock::new();
        let err = producer(dir.path(), lock.clone())
            .convert_download(&source, "Billing Only.xlsx")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Session(_)));
        assert_eq!(std::fs::read(&source).unwrap(), bytes);
        assert!(!dir.path().join("Billing Only.xlsx").exists());
        assert!(!lock.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_convert_download_waits_for_session_lock() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("DailyReport.xls");
        std::fs::write(&source, b"report").unwrap();

        let lock = SessionLock::new();
        let _held = lock.acquire(Duration::from_secs(1)).await.unwrap();
        let err = producer(dir.path(), lock.clone())
            .convert_download(&source, "Billing Only.xlsx")
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_mat_shortage_is_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let downloaded = dir.path().join("MatShortageRpt_20240315.xlsx");
        std::fs::write(&downloaded, b"x").unwrap();

        let final_path = producer(dir.path(), SessionLock::new())
            .finalize_mat_shortage(&downloaded)
            .await
            .unwrap();
        assert_eq!(final_path, dir.path().join("MatShortageRpt.xlsx"));
        assert!(!downloaded.exists());
    }

    #[tokio::test]
    async fn test_missing_url_fails_at_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let err = producer(dir.path(), SessionLock::new())
            .run(&Credentials::new("u", "p"), &ProgressSink::disabled())
            .await
            .unwrap_err();
        // 两个流程都因缺少 web.pdbs_url 失败
        assert!(err.to_string().contains("web.pdbs_url"));
    }
}
