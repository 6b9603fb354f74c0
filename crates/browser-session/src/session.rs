//! Browser lifecycle and page scripting.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::BrowserError;

/// Chromium singleton lock artifacts. Any of these left behind by a crash
/// blocks the next launch with "profile appears to be in use".
const LOCK_FILES: [&str; 3] = ["SingletonLock", "SingletonSocket", "SingletonCookie"];

/// Configuration for one browser session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Profile/user-data directory. Holds login state between runs.
    pub profile_dir: PathBuf,
    /// When set, attach to this remote-debugging HTTP endpoint instead of
    /// launching a browser.
    pub remote_debug_url: Option<String>,
    pub headless: bool,
    /// Conversation page loaded into the active tab.
    pub start_url: String,
    /// Bounded relaunch attempts before giving up.
    pub launch_retries: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("./golem_profile"),
            remote_debug_url: None,
            headless: false,
            start_url: "https://gemini.google.com/app".to_string(),
            launch_retries: 3,
        }
    }
}

/// Owns the browser process handle and the single active tab.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Attach or launch, then open the conversation page.
    pub async fn open(config: &SessionConfig) -> Result<Self, BrowserError> {
        let (browser, handler_task) = match &config.remote_debug_url {
            Some(url) => Self::attach(url).await?,
            None => Self::launch(config).await?,
        };

        let pages = browser.pages().await?;
        let page = match pages.into_iter().next() {
            Some(page) => {
                page.goto(config.start_url.as_str()).await?;
                page
            }
            None => browser.new_page(config.start_url.as_str()).await?,
        };
        let _ = page.wait_for_navigation().await;
        info!(url = %config.start_url, "browser session ready");

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    async fn attach(url: &str) -> Result<(Browser, JoinHandle<()>), BrowserError> {
        info!(%url, "attaching to remote browser");
        let version: Value = reqwest::get(format!("{}/json/version", url.trim_end_matches('/')))
            .await?
            .json()
            .await?;
        let ws_url = extract_ws_url(&version).ok_or_else(|| {
            BrowserError::Unavailable("remote endpoint did not report a websocket url".into())
        })?;
        let (browser, handler) = Browser::connect(ws_url).await?;
        Ok((browser, spawn_handler(handler)))
    }

    async fn launch(config: &SessionConfig) -> Result<(Browser, JoinHandle<()>), BrowserError> {
        let mut last_error = String::new();

        for attempt in 0..config.launch_retries.max(1) {
            clean_stale_locks(&config.profile_dir);

            let mut builder = BrowserConfig::builder()
                .user_data_dir(&config.profile_dir)
                .no_sandbox()
                .window_size(1280, 900)
                .arg("--disable-dev-shm-usage")
                .arg("--disable-gpu");
            if !config.headless {
                builder = builder.with_head();
            }
            let browser_config = builder
                .build()
                .map_err(BrowserError::Unavailable)?;

            match Browser::launch(browser_config).await {
                Ok((browser, handler)) => {
                    info!(attempt, "browser launched");
                    return Ok((browser, spawn_handler(handler)));
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(attempt, %last_error, "browser launch failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        Err(BrowserError::Unavailable(format!(
            "launch failed after {} attempts: {}",
            config.launch_retries, last_error
        )))
    }

    /// Whether `selector` currently matches at least one element.
    pub async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        let js = format!("!!document.querySelector({})", js_str(selector));
        let result = self.page.evaluate(js).await?;
        Ok(result.value().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Insert `text` into the element matched by `selector` in one
    /// programmatic operation. Returns false when the element is missing.
    ///
    /// Per-character typing is deliberately avoided: on long payloads it
    /// drops characters and trips input handlers on the remote page.
    pub async fn insert_text(&self, selector: &str, text: &str) -> Result<bool, BrowserError> {
        let js = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); document.execCommand('insertText', false, {text}); return true; }})()",
            sel = js_str(selector),
            text = js_str(text),
        );
        let result = self.page.evaluate(js).await?;
        Ok(result.value().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Submit via the keyboard. The send button is the least stable target
    /// on a drifting UI, so Enter on the input element is the primary path.
    pub async fn press_enter(&self, input_selector: &str) -> Result<(), BrowserError> {
        let element = self.page.find_element(input_selector).await?;
        element.press_key("Enter").await?;
        debug!("submitted via Enter");
        Ok(())
    }

    /// Raw text of the last element matched by `selector`, or `None` when
    /// nothing matches yet.
    pub async fn last_block_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let js = format!(
            "(() => {{ const blocks = document.querySelectorAll({sel}); \
             if (!blocks.length) return null; \
             return blocks[blocks.length - 1].innerText; }})()",
            sel = js_str(selector),
        );
        let result = self.page.evaluate(js).await?;
        Ok(result
            .value()
            .and_then(Value::as_str)
            .map(|s| s.to_string()))
    }

    /// Full markup of the current page, for the locator doctor.
    pub async fn markup(&self) -> Result<String, BrowserError> {
        Ok(self.page.content().await?)
    }

    /// Tear down the tab and the browser process.
    pub async fn close(mut self) {
        let _ = self.page.close().await;
        if let Err(err) = self.browser.close().await {
            warn!(%err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

fn spawn_handler(
    mut handler: chromiumoxide::handler::Handler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                warn!(%err, "browser handler error");
                break;
            }
        }
        debug!("browser handler ended");
    })
}

/// Remove stale Chromium singleton locks from a profile directory.
///
/// Uses symlink metadata rather than `exists()`: `SingletonLock` is a
/// symlink and a broken one reports as absent while still blocking launch.
pub fn clean_stale_locks(profile_dir: &Path) -> usize {
    let mut cleaned = 0;
    for name in LOCK_FILES {
        let path = profile_dir.join(name);
        match fs::symlink_metadata(&path) {
            Ok(meta) => {
                let removed = if meta.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                match removed {
                    Ok(()) => {
                        info!(lock = name, "removed stale browser lock");
                        cleaned += 1;
                    }
                    Err(err) => warn!(lock = name, %err, "failed to remove stale lock"),
                }
            }
            Err(_) => {}
        }
    }
    cleaned
}

/// Pull the websocket debugger url out of a `/json/version` response.
pub fn extract_ws_url(version: &Value) -> Option<&str> {
    version.get("webSocketDebuggerUrl").and_then(Value::as_str)
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cleans_regular_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in LOCK_FILES {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(clean_stale_locks(dir.path()), 3);
        for name in LOCK_FILES {
            assert!(!dir.path().join(name).exists());
        }
    }

    #[cfg(unix)]
    #[test]
    fn cleans_broken_symlink_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("SingletonLock");
        std::os::unix::fs::symlink(dir.path().join("no-such-target"), &lock).unwrap();
        // A broken symlink reports absent through exists() but still blocks
        // the browser; symlink-aware cleanup must catch it.
        assert!(!lock.exists());
        assert_eq!(clean_stale_locks(dir.path()), 1);
        assert!(fs::symlink_metadata(&lock).is_err());
    }

    #[test]
    fn empty_profile_cleans_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(clean_stale_locks(dir.path()), 0);
    }

    #[test]
    fn extracts_ws_url_from_version_payload() {
        let payload = json!({
            "Browser": "Chrome/120.0.0.0",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
        });
        assert_eq!(
            extract_ws_url(&payload),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert_eq!(extract_ws_url(&json!({})), None);
    }

    #[test]
    fn js_str_escapes_quotes() {
        assert_eq!(js_str("a\"b"), "\"a\\\"b\"");
    }
}
