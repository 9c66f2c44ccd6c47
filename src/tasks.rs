//! Default page-processing tasks run against a Chrome tab
//!
//! | Tier | Task | Output |
//! |------|------|--------|
//! | 1 | [`ScreenshotTask`] | `screenshot.<ext>` |
//! | 2 | [`DomTask`] | `dom.html` |
//! | 3 | [`MetadataTask`] | `metadata.json` |

use crate::{ChromeTab, CrawlError, OutputFormat, Priority, Task, TaskRegistry, Viewport};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// The task set used by the `spydom` binary.
pub fn default_tasks(screenshot_format: OutputFormat) -> TaskRegistry<ChromeTab> {
    TaskRegistry::new(vec![
        Arc::new(ScreenshotTask::new(screenshot_format)),
        Arc::new(DomTask),
        Arc::new(MetadataTask),
    ])
}

/// Captures a full-page screenshot
pub struct ScreenshotTask {
    format: OutputFormat,
}

impl ScreenshotTask {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Task<ChromeTab> for ScreenshotTask {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn priority(&self) -> Priority {
        Priority::First
    }

    async fn execute(&self, _url: &str, output_dir: &Path, tab: &ChromeTab) -> Result<(), CrawlError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();

        let png_data = tab
            .page()
            .screenshot(params)
            .await
            .map_err(|e| CrawlError::task(self.name(), e))?;

        let data = convert_image_format(png_data, self.format)
            .map_err(|e| CrawlError::task(self.name(), e))?;

        let path = output_dir.join(format!("screenshot.{}", self.format.extension()));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| CrawlError::task(self.name(), format!("{}: {}", path.display(), e)))
    }
}

/// Re-encode a PNG capture into the requested format.
pub fn convert_image_format(png_data: Vec<u8>, format: OutputFormat) -> Result<Vec<u8>, String> {
    let target = match format {
        OutputFormat::Png => return Ok(png_data),
        OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        OutputFormat::Webp => image::ImageFormat::WebP,
    };

    let img = image::load_from_memory(&png_data).map_err(|e| e.to_string())?;
    let mut data = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut data), target)
        .map_err(|e| e.to_string())?;

    Ok(data)
}

/// Saves the rendered DOM
pub struct DomTask;

#[async_trait]
impl Task<ChromeTab> for DomTask {
    fn name(&self) -> &str {
        "dom"
    }

    fn priority(&self) -> Priority {
        Priority::Second
    }

    async fn execute(&self, _url: &str, output_dir: &Path, tab: &ChromeTab) -> Result<(), CrawlError> {
        let html = tab
            .page()
            .content()
            .await
            .map_err(|e| CrawlError::task(self.name(), e))?;

        let path = output_dir.join("dom.html");
        tokio::fs::write(&path, html)
            .await
            .map_err(|e| CrawlError::task(self.name(), format!("{}: {}", path.display(), e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub final_url: Option<String>,
    pub title: Option<String>,
    pub viewport: Viewport,
    pub captured_at: DateTime<Utc>,
}

/// Writes page title, final URL and capture details as JSON
pub struct MetadataTask;

#[async_trait]
impl Task<ChromeTab> for MetadataTask {
    fn name(&self) -> &str {
        "metadata"
    }

    fn priority(&self) -> Priority {
        Priority::Third
    }

    async fn execute(&self, url: &str, output_dir: &Path, tab: &ChromeTab) -> Result<(), CrawlError> {
        let page = tab.page();
        let metadata = PageMetadata {
            url: url.to_string(),
            final_url: page.url().await.unwrap_or(None),
            title: page.get_title().await.unwrap_or(None),
            viewport: tab.viewport().clone(),
            captured_at: Utc::now(),
        };

        let json = serde_json::to_vec_pretty(&metadata)?;
        let path = output_dir.join("metadata.json");
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| CrawlError::task(self.name(), format!("{}: {}", path.display(), e)))
    }
}
