use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::{allow_downloads, PortalBrowser};
use crate::error::{AppResult, BrowserError};

/// 启动浏览器，下载目录设为 `download_dir`，并导航到 `url`
pub async fn launch_portal_browser(
    url: &str,
    download_dir: &Path,
    executable: Option<&Path>,
    headless: bool,
) -> AppResult<PortalBrowser> {
    info!("🚀 启动浏览器...");
    debug!("目标 URL: {}, 下载目录: {}", url, download_dir.display());

    let mut builder = BrowserConfig::builder().window_size(1920, 1080).args(vec![
        "--disable-gpu",             // Windows 无头模式必须禁用 GPU
        "--no-sandbox",              // 禁用沙盒，防止权限问题导致的崩溃
        "--disable-dev-shm-usage",   // 防止共享内存不足
        "--disable-popup-blocking",
        "--disable-notifications",
        "--disable-extensions",
        "--disable-blink-features=AutomationControlled",
    ]);
    builder = if headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }
    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        BrowserError::ConfigurationFailed(e)
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        e
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handler = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await?;
    allow_downloads(&page, download_dir).await?;

    page.goto(url).await.map_err(|e| {
        error!("导航到 {} 失败: {}", url, e);
        e
    })?;
    info!("✅ 已导航到: {}", url);

    Ok(PortalBrowser::new(browser, page, handler, true))
}
