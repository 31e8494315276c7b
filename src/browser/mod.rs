pub mod connection;
pub mod headless;

use std::path::Path;

use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::AppResult;

pub use connection::connect_to_browser;
pub use headless::launch_portal_browser;

/// 门户浏览器会话
///
/// `owned` 为 true 时浏览器由本进程启动，结束时关闭整个浏览器；
/// 否则只关闭本进程打开的页面。
pub struct PortalBrowser {
    pub browser: Browser,
    pub page: Page,
    handler: JoinHandle<()>,
    owned: bool,
}

impl PortalBrowser {
    pub(crate) fn new(browser: Browser, page: Page, handler: JoinHandle<()>, owned: bool) -> Self {
        Self {
            browser,
            page,
            handler,
            owned,
        }
    }

    /// 关闭浏览器（或页面）并结束事件循环
    pub async fn shutdown(mut self) {
        if self.owned {
            if let Err(e) = self.browser.close().await {
                debug!("关闭浏览器: {}", e);
            }
            let _ = self.browser.wait().await;
        } else if let Err(e) = self.page.close().await {
            debug!("关闭页面: {}", e);
        }
        self.handler.abort();
    }
}

/// 允许下载并把下载目录设为 `dir`
pub(crate) async fn allow_downloads(page: &Page, dir: &Path) -> AppResult<()> {
    let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::Allow);
    params.download_path = Some(dir.to_string_lossy().to_string());
    page.execute(params).await?;
    Ok(())
}
