//! Feeds normalized target URLs into the shared work queue

use crate::{normalize_url, CrawlError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Result of one pass over the targets input.
#[derive(Debug)]
pub struct DispatchReport {
    pub dispatched: usize,
    /// Set when reading stopped on an I/O error rather than end of input
    pub read_error: Option<CrawlError>,
}

pub struct Dispatcher<R> {
    targets: R,
    queue: mpsc::Sender<String>,
}

impl<R: AsyncBufRead + Unpin> Dispatcher<R> {
    pub fn new(targets: R, queue: mpsc::Sender<String>) -> Self {
        Self { targets, queue }
    }

    /// Send every target line to the queue, in order, then close it.
    ///
    /// Each send waits for a worker to take the previous URL. Blank lines and
    /// `#` comments are skipped. The queue closes when `self` is consumed, on
    /// both the normal and the error path.
    pub async fn run(self) -> DispatchReport {
        let Dispatcher { mut targets, queue } = self;
        let mut buf = Vec::new();
        let mut dispatched = 0;

        loop {
            buf.clear();
            match targets.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    return DispatchReport {
                        dispatched,
                        read_error: Some(CrawlError::TargetsRead(e.to_string())),
                    };
                }
            }

            // Invalid UTF-8 is replaced, not treated as a read error
            let line = String::from_utf8_lossy(&buf);
            let target = line.trim();
            if target.is_empty() || target.starts_with('#') {
                continue;
            }

            let url = normalize_url(target);
            info!("{}", url);

            if queue.send(url).await.is_err() {
                warn!("Work queue closed before all targets were dispatched");
                break;
            }
            dispatched += 1;
        }

        DispatchReport {
            dispatched,
            read_error: None,
        }
    }
}
