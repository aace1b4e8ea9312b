use std::ffi::OsStr;
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

/// Evasion profile for one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchProfile {
    pub user_agent: String,
    pub proxy_address: Option<String>,
}

/// Candidate pools a [`FetchProfile`] is drawn from.
#[derive(Debug, Clone)]
pub struct ProfilePool {
    user_agents: Vec<String>,
    proxies: Vec<String>,
}

impl ProfilePool {
    /// Entries are trimmed; blank ones are dropped.
    pub fn new(user_agents: Vec<String>, proxies: Vec<String>) -> Self {
        Self {
            user_agents: non_blank(user_agents),
            proxies: non_blank(proxies),
        }
    }

    /// Pick a user agent and proxy uniformly at random. An empty proxy pool means no proxy.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<FetchProfile> {
        let user_agent = self
            .user_agents
            .choose(rng)
            .cloned()
            .context("user agent pool is empty")?;
        let proxy_address = self.proxies.choose(rng).cloned();
        Ok(FetchProfile {
            user_agent,
            proxy_address,
        })
    }
}

/// An open browser session. Dropping it must release the underlying resources.
pub trait FetchSession {
    /// Navigate to `url` and return the rendered page content.
    fn navigate(&mut self, url: &str) -> Result<String>;

    fn close(self) -> Result<()>;
}

/// Opens sessions; construction failure is fatal to the caller.
pub trait SessionFactory {
    type Session: FetchSession;

    fn open(&self, profile: &FetchProfile) -> Result<Self::Session>;
}

fn non_blank(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── headless Chrome ──

pub struct ChromeFactory {
    /// Element the page is considered loaded at.
    pub ready_selector: String,
    pub load_timeout: Duration,
}

impl SessionFactory for ChromeFactory {
    type Session = ChromeSession;

    fn open(&self, profile: &FetchProfile) -> Result<ChromeSession> {
        let ua_arg = format!("--user-agent={}", profile.user_agent);
        let proxy_arg = profile
            .proxy_address
            .as_ref()
            .map(|p| format!("--proxy-server={}", p));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&ua_arg),
        ];
        if let Some(ref p) = proxy_arg {
            args.push(OsStr::new(p));
        }

        let browser = Browser::new(LaunchOptions {
            headless: true,
            window_size: Some((1920, 1080)),
            args,
            ..Default::default()
        })
        .context("Failed to launch headless Chrome")?;

        info!(
            proxy = profile.proxy_address.as_deref().unwrap_or("none"),
            "Web driver setup completed with user agent and proxy."
        );
        debug!("User agent: {}", profile.user_agent);

        Ok(ChromeSession {
            browser,
            ready_selector: self.ready_selector.clone(),
            load_timeout: self.load_timeout,
        })
    }
}

pub struct ChromeSession {
    browser: Browser,
    ready_selector: String,
    load_timeout: Duration,
}

impl FetchSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<String> {
        let tab = self.browser.new_tab()?;
        let content = self.render(&tab, url);
        close_after(content, || tab.close(false))
    }

    fn close(self) -> Result<()> {
        // Browser's Drop kills the Chrome process.
        drop(self.browser);
        debug!("Web driver quit.");
        Ok(())
    }
}

impl ChromeSession {
    fn render(&self, tab: &Tab, url: &str) -> Result<String> {
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        // Cards render client-side. A timeout is not an error: a block page
        // never shows them and still needs to reach block detection.
        if let Err(e) =
            tab.wait_for_element_with_custom_timeout(&self.ready_selector, self.load_timeout)
        {
            debug!("No {:?} after {:?}: {}", self.ready_selector, self.load_timeout, e);
        }

        tab.get_content()
    }
}

/// Run `close` whatever `result` is. A close failure is logged, never returned.
fn close_after<T, C>(result: Result<T>, close: impl FnOnce() -> Result<C>) -> Result<T> {
    if let Err(e) = close() {
        debug!("Failed to close tab: {:#}", e);
    }
    result
}
