//! Headless Chrome render backend
//!
//! One Chrome process is launched per run. Every allocation opens a fresh tab
//! sized to the configured viewport; releasing closes it.

use crate::{create_browser_config, Config, CrawlError, RenderBackend, RenderResource, Viewport};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct ChromeBackend {
    browser: Mutex<Browser>,
    handler: JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
}

impl ChromeBackend {
    pub async fn launch(config: &Config) -> Result<Self, CrawlError> {
        let browser_config = create_browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CrawlError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is a Stream of CDP events and must be polled for the
        // browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Handler error: {}", e);
                    return Err(e);
                }
            }
            info!("Handler stream ended");
            Ok(())
        });

        info!("Chrome launched");
        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl RenderBackend for ChromeBackend {
    type Resource = ChromeTab;

    async fn allocate(&self, viewport: &Viewport) -> Result<ChromeTab, CrawlError> {
        if self.handler.is_finished() {
            return Err(CrawlError::AllocationFailed(
                "browser connection is closed".to_string(),
            ));
        }

        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| CrawlError::AllocationFailed(e.to_string()))?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width)
            .height(viewport.height)
            .device_scale_factor(viewport.device_scale_factor)
            .mobile(viewport.mobile)
            .build()
            .map_err(CrawlError::AllocationFailed)?;

        if let Err(e) = page.execute(metrics).await {
            let _ = page.close().await;
            return Err(CrawlError::AllocationFailed(e.to_string()));
        }

        Ok(ChromeTab {
            page,
            viewport: viewport.clone(),
        })
    }

    async fn release(&self, tab: ChromeTab) {
        if let Err(e) = tab.page.close().await {
            warn!("Failed to close tab: {}", e);
        }
    }

    async fn shutdown(&self) {
        if let Err(e) = self.browser.lock().await.close().await {
            debug!("Browser close returned: {}", e);
        }
        self.handler.abort();
    }
}

/// A browser tab owned by one worker at a time
pub struct ChromeTab {
    page: Page,
    viewport: Viewport,
}

impl ChromeTab {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }
}

#[async_trait]
impl RenderResource for ChromeTab {
    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| CrawlError::NavigationFailed(e.to_string()))?;
        Ok(())
    }
}
