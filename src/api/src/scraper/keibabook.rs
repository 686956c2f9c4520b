//! Subscription racing-form site adapter (training comments).
//!
//! Login happens once per run; the browser keeps the session cookies for
//! every following page.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tracing::info;

use super::browser::Browser;
use super::parsers::{TrainingNote, TrainingParser};
use super::{keibabook_login_url, keibabook_training_url};
use crate::types::RaceKey;

const LOGIN_ID_FIELD: &str = "input[name='login_id']";
const PASSWORD_FIELD: &str = "input[name='pswd']";
const SUBMIT_BUTTON: &str = "input[type='submit'], button[type='submit']";

/// Logged-in session on the subscription site
pub struct KeibabookClient {
    browser: Browser,
    base_url: String,
}

impl KeibabookClient {
    /// Launch a browser and log in
    pub async fn login(
        base_url: &str,
        login_id: &str,
        password: &str,
        chrome_executable: Option<&str>,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let browser = Browser::launch(chrome_executable).await?;

        let landing = browser
            .submit_form(
                &keibabook_login_url(&base_url),
                &[(LOGIN_ID_FIELD, login_id), (PASSWORD_FIELD, password)],
                SUBMIT_BUTTON,
            )
            .await;

        let landing = match landing {
            Ok(html) => html,
            Err(e) => {
                let _ = browser.close().await;
                return Err(e);
            }
        };
        if is_login_form(&landing) && !is_logged_in(&landing) {
            let _ = browser.close().await;
            bail!("login to the racing-form site was rejected");
        }

        info!("Logged in to {}", base_url);
        Ok(Self { browser, base_url })
    }

    /// Training notes for one race keyed by umaban
    pub async fn fetch_training(&self, key: &RaceKey) -> Result<BTreeMap<u8, TrainingNote>> {
        let url = keibabook_training_url(&self.base_url, key);
        info!("Fetching {}", url);
        let html = self.browser.fetch_page(&url).await?;
        if is_login_form(&html) {
            bail!("racing-form session expired");
        }
        TrainingParser::parse(&html)
    }

    pub async fn close(self) -> Result<()> {
        self.browser.close().await
    }
}

/// Member pages show a logout link; the login form does not
fn is_logged_in(html: &str) -> bool {
    html.contains("ログアウト") || html.contains("logout")
}

/// Protected pages redirect to the login form once the session is gone
fn is_login_form(html: &str) -> bool {
    html.contains("name=\"login_id\"") || html.contains("name='login_id'")
}
