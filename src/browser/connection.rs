use std::path::Path;

use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::{allow_downloads, PortalBrowser};
use crate::error::AppResult;

/// 连接到已开启远程调试端口的浏览器，打开新页面导航到 `url`
///
/// 用于在可见的浏览器窗口中排查门户问题。
pub async fn connect_to_browser(port: u16, url: &str, download_dir: &Path) -> AppResult<PortalBrowser> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器连接成功");

    let handler = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await?;
    allow_downloads(&page, download_dir).await?;
    page.goto(url).await.map_err(|e| {
        error!("导航到 {} 失败: {}", url, e);
        e
    })?;
    info!("已导航到: {}", url);

    Ok(PortalBrowser::new(browser, page, handler, false))
}
