use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{Strategy, StrategyOutcome, TranscriptArtifact, VideoId};
use crate::config::BrowserSettings;
use crate::context::RunContext;
use crate::ExtractionError;

/// Starts browser sessions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn BrowserSession>, ExtractionError>;
}

/// A live browser owned by one strategy attempt
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), ExtractionError>;

    /// Whether an element matching the selector is currently on the page
    async fn has_element(&mut self, selector: &str) -> Result<bool, ExtractionError>;

    async fn click(&mut self, selector: &str) -> Result<(), ExtractionError>;

    /// Fully rendered page HTML
    async fn content(&mut self) -> Result<String, ExtractionError>;

    /// Terminate the browser and release everything it holds
    async fn close(&mut self) -> Result<(), ExtractionError>;
}

/// Renders the watch page in a headless browser, turns captions on and captures the page
pub struct BrowserAutomationStrategy {
    driver: Box<dyn BrowserDriver>,
}

impl BrowserAutomationStrategy {
    pub fn new(driver: Box<dyn BrowserDriver>) -> Self {
        Self { driver }
    }

    /// Steps between launch and teardown. Any error here still ends in `close`.
    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        video_id: &VideoId,
        ctx: &RunContext,
    ) -> Result<String, ExtractionError> {
        let settings = &ctx.config().browser;

        session.navigate(&video_id.watch_url(&ctx.config().source.watch_url)).await?;

        wait_for_element(session, &settings.caption_selector, settings, ctx).await?;
        session.click(&settings.caption_selector).await?;

        let delay = ctx.settle_delay();
        tracing::debug!("Captions enabled, settling for {}ms", delay.as_millis());
        ctx.clock().sleep(delay).await;

        session.content().await
    }
}

impl Default for BrowserAutomationStrategy {
    fn default() -> Self {
        Self::new(Box::new(ChromeDriver))
    }
}

/// Poll until the selector matches or the configured timeout passes
async fn wait_for_element(
    session: &mut dyn BrowserSession,
    selector: &str,
    settings: &BrowserSettings,
    ctx: &RunContext,
) -> Result<(), ExtractionError> {
    let clock = ctx.clock();
    let timeout = settings.element_timeout();
    let started = clock.now();

    loop {
        if session.has_element(selector).await? {
            return Ok(());
        }

        let waited = clock.now().saturating_duration_since(started);
        if waited >= timeout {
            return Err(ExtractionError::ElementNotFound {
                selector: selector.to_string(),
                timeout_secs: settings.element_timeout_secs,
            });
        }

        clock.sleep(settings.poll_interval().min(timeout - waited)).await;
    }
}

#[async_trait]
impl Strategy for BrowserAutomationStrategy {
    fn name(&self) -> &'static str {
        "headless-browser"
    }

    async fn attempt(&self, video_id: &VideoId, ctx: &RunContext) -> StrategyOutcome {
        let mut session = match self.driver.launch(&ctx.config().browser).await {
            Ok(session) => session,
            Err(e) => return StrategyOutcome::failure(e),
        };

        let captured = self.drive(session.as_mut(), video_id, ctx).await;

        if let Err(e) = session.close().await {
            tracing::warn!("Browser teardown reported an error: {}", e);
        }

        captured
            .map(|markup| TranscriptArtifact::markup(self.name(), markup))
            .into()
    }
}

/// Chrome/Chromium over the DevTools protocol
pub struct ChromeDriver;

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn BrowserSession>, ExtractionError> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .arg("--disable-gpu")
            .arg("--mute-audio");

        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder
            .build()
            .map_err(|e| ExtractionError::BrowserAutomation(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ExtractionError::BrowserAutomation(format!("failed to launch browser: {}", e)))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(ChromeSession {
            browser,
            events,
            page: None,
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    events: JoinHandle<()>,
    page: Option<Page>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, ExtractionError> {
        self.page
            .as_ref()
            .ok_or_else(|| ExtractionError::BrowserAutomation("no page loaded".to_string()))
    }
}

fn cdp_error(action: &str) -> impl Fn(CdpError) -> ExtractionError + '_ {
    move |e| ExtractionError::BrowserAutomation(format!("{} failed: {}", action, e))
}

/// No match is an empty list; a protocol or connection error is not "absent"
fn presence<T>(found: Result<Vec<T>, CdpError>) -> Result<bool, ExtractionError> {
    found
        .map(|elements| !elements.is_empty())
        .map_err(cdp_error("checking for element"))
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), ExtractionError> {
        let page = self.browser.new_page(url).await.map_err(cdp_error("navigation"))?;
        page.wait_for_navigation().await.map_err(cdp_error("page load"))?;
        self.page = Some(page);
        Ok(())
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool, ExtractionError> {
        presence(self.page()?.find_elements(selector).await)
    }

    async fn click(&mut self, selector: &str) -> Result<(), ExtractionError> {
        let element = self
            .page()?
            .find_element(selector)
            .await
            .map_err(cdp_error("locating captions control"))?;
        element.click().await.map_err(cdp_error("click"))?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, ExtractionError> {
        self.page()?.content().await.map_err(cdp_error("capturing page content"))
    }

    async fn close(&mut self) -> Result<(), ExtractionError> {
        self.page = None;
        let closed = self.browser.close().await.map_err(cdp_error("closing browser"));

        // Reap the process even when the close command failed.
        if tokio::time::timeout(Duration::from_secs(5), self.browser.wait()).await.is_err() {
            tracing::warn!("Browser did not exit in time; it will be killed on drop");
        }
        self.events.abort();

        closed.map(|_| ())
    }
}
