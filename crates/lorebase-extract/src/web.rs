//! Link extraction: headless-browser render with a plain HTTP fallback.

use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tracing::{debug, info, warn};

use lorebase_core::{Error, ExtractSettings, Result};

use crate::html::extract_readable_text;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

pub(crate) async fn extract_link(
    http: &reqwest::Client,
    url: &str,
    settings: &ExtractSettings,
) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| Error::Parse(format!("url {}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Parse(format!("unsupported scheme: {}", url)));
    }

    match render_with_browser(url, settings.browser_timeout_secs).await {
        Ok(text) if !text.trim().is_empty() => return Ok(text),
        Ok(_) => warn!("Browser render of {} produced no text, trying HTTP", url),
        Err(e) => warn!("Browser render of {} failed ({}), trying HTTP", url, e),
    }

    fetch_with_http(http, url).await
}

/// Render the page in headless Chromium and extract readable text.
async fn render_with_browser(url: &str, timeout_secs: u64) -> Result<String> {
    let config = BrowserConfig::builder()
        .arg("--no-sandbox")
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .build()
        .map_err(Error::Http)?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| Error::Http(format!("browser launch: {}", e)))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    let result = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        render_page(&browser, url),
    )
    .await
    .unwrap_or_else(|_| Err(Error::Http(format!("browser render timed out: {}", url))));

    let _ = browser.close().await;
    handler_task.abort();
    result
}

async fn render_page(browser: &Browser, url: &str) -> Result<String> {
    let page = browser
        .new_page(url)
        .await
        .map_err(|e| Error::Http(format!("navigation to {}: {}", url, e)))?;

    match page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()).await {
        Ok(result) => {
            let state: String = result
                .into_value()
                .unwrap_or_else(|_| "unknown".to_string());
            debug!("Page ready state for {}: {}", url, state);
        }
        Err(e) => debug!("Could not check ready state for {}: {}", url, e),
    }
    // Give dynamic content a beat to settle.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let title = page.get_title().await.ok().flatten();
    let html = page
        .content()
        .await
        .map_err(|e| Error::Http(format!("page content for {}: {}", url, e)))?;
    let _ = page.close().await;

    info!("Rendered {} with browser ({} bytes of HTML)", url, html.len());
    let text = extract_readable_text(&html);
    match title {
        Some(title) if !title.trim().is_empty() && !text.is_empty() => {
            Ok(format!("{}\n\n{}", title.trim(), text))
        }
        _ => Ok(text),
    }
}

/// Plain HTTP fallback for pages that do not need JavaScript.
async fn fetch_with_http(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::Http(format!("fetch {}: {}", url, e)))?
        .error_for_status()
        .map_err(|e| Error::Http(format!("fetch {}: {}", url, e)))?;

    let html = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("read body of {}: {}", url, e)))?;

    info!("Fetched {} over HTTP ({} bytes)", url, html.len());
    Ok(extract_readable_text(&html))
}
