//! 起始附件发现
//!
//! 没有显式起始 URL 时，打开论坛版块页面，找到第一个附件链接作为
//! 序列起点。只做发现，不做下载。

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use super::connection::connect_to_browser_and_page;

/// 在论坛页面上定位第一个附件链接
///
/// # 返回
/// `(附件 URL, 页面标题)`；页面上没有附件链接时返回错误。
pub async fn discover_start_url(port: u16, forum_url: &str) -> Result<(String, String)> {
    let (_browser, page) = connect_to_browser_and_page(port, forum_url).await?;

    // 等页面渲染出内容
    sleep(Duration::from_millis(1500)).await;

    let script = r#"(() => {
        const link = document.querySelector('a[href*="/attachments/"]');
        if (!link) { return null; }
        return JSON.stringify({ href: link.href, title: document.title });
    })()"#;

    let payload: Option<String> = page
        .evaluate(script)
        .await
        .context("执行附件发现脚本失败")?
        .into_value()
        .context("附件发现脚本返回了意外的结果")?;

    let payload = payload.ok_or_else(|| anyhow!("页面上没有找到附件链接: {}", forum_url))?;
    debug!("发现脚本返回: {}", payload);

    let parsed: Value = serde_json::from_str(&payload).context("解析发现结果失败")?;
    let href = parsed["href"]
        .as_str()
        .ok_or_else(|| anyhow!("发现结果缺少 href"))?
        .to_string();
    let title = parsed["title"].as_str().unwrap_or_default().to_string();

    info!("✓ 发现起始附件: {} （页面: {}）", href, title);
    Ok((href, title))
}
