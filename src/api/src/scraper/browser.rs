//! Browser automation using chromiumoxide.
//!
//! Only the subscription site needs a real browser: its login form sets
//! session cookies through JavaScript.

use anyhow::Result;
use chromiumoxide::browser::{Browser as ChromeBrowser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tracing::debug;

/// Browser wrapper for web scraping
pub struct Browser {
    browser: ChromeBrowser,
    handle: tokio::task::JoinHandle<()>,
}

/// Platform default when no executable is configured
fn default_chrome_path() -> &'static str {
    if cfg!(target_os = "macos") {
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"
    } else if cfg!(target_os = "windows") {
        "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"
    } else {
        "google-chrome"
    }
}

/// Configured executable, else the platform default
fn chrome_path(configured: Option<&str>) -> &str {
    match configured {
        Some(path) => path,
        None => default_chrome_path(),
    }
}

impl Browser {
    /// Launch a new headless browser instance
    pub async fn launch(chrome_executable: Option<&str>) -> Result<Self> {
        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path(chrome_executable))
            .no_sandbox()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .window_size(1280, 900)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = ChromeBrowser::launch(config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to launch browser: {}", e))?;

        // Handler must keep running for the browser to work
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self { browser, handle })
    }

    /// Fetch page content with JavaScript rendering
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", url, e))?;

        Self::wait_for_load(&page).await;

        let html = page
            .content()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get page content: {}", e));

        let _ = page.close().await;

        html
    }

    /// Fill form fields on `url`, submit, and return the resulting page HTML
    pub async fn submit_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
        submit_selector: &str,
    ) -> Result<String> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", url, e))?;
        Self::wait_for_load(&page).await;

        // The page is closed whether or not the form went through
        let html = Self::fill_and_submit(&page, fields, submit_selector).await;
        let _ = page.close().await;

        html
    }

    async fn fill_and_submit(
        page: &Page,
        fields: &[(&str, &str)],
        submit_selector: &str,
    ) -> Result<String> {
        for (selector, value) in fields {
            let input = page
                .find_element(*selector)
                .await
                .map_err(|e| anyhow::anyhow!("Form field {} not found: {}", selector, e))?;
            input
                .click()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to focus {}: {}", selector, e))?;
            input
                .type_str(*value)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to type into {}: {}", selector, e))?;
        }

        page.find_element(submit_selector)
            .await
            .map_err(|e| anyhow::anyhow!("Submit button {} not found: {}", submit_selector, e))?
            .click()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to submit form: {}", e))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| anyhow::anyhow!("Navigation after submit failed: {}", e))?;

        page.content()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get page content: {}", e))
    }

    /// Give late scripts a moment after the load event
    async fn wait_for_load(_page: &Page) {
        tokio::time::sleep(tokio::time::Duration::from_millis(1500)).await;
    }

    /// Close the browser
    pub async fn close(mut self) -> Result<()> {
        let _ = self.browser.close().await;
        self.handle.abort();
        Ok(())
    }
}
