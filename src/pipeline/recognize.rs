//! Recognition stage: one prepared page image in, normalised text out.
//!
//! ## Retry Strategy
//!
//! Provider errors (HTTP 429 / 503 under load, dropped connections) are
//! usually transient. Each attempt is bounded by `api_timeout_secs`, and
//! failed attempts back off exponentially (`retry_backoff_ms * 2^attempt`,
//! capped at [`MAX_BACKOFF_MS`]): with the 500 ms default and 2 retries the
//! waits are 500 ms then 1 s.
//!
//! A page whose attempts are all exhausted yields a [`PageError`]; the caller
//! records it on that page and moves on.
//!
//! The `cancelled` check is consulted before every attempt, including after
//! each backoff sleep. Once it reports true no further model call is made.

use crate::config::OcrConfig;
use crate::error::PageError;
use crate::model::RecognitionModel;
use crate::pipeline::normalize;
use crate::prompts::RecognitionPrompt;
use image::DynamicImage;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Longest single wait between two attempts.
pub const MAX_BACKOFF_MS: u64 = 60_000;

enum Failure {
    Model(String),
    TimedOut,
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Recognise the text on one preprocessed page image.
///
/// Returns `None` when `cancelled` turned true before an attempt could start.
pub async fn recognize_page(
    model: &dyn RecognitionModel,
    page: usize,
    image: &DynamicImage,
    prompt: RecognitionPrompt,
    config: &OcrConfig,
    cancelled: &(dyn Fn() -> bool + Sync),
) -> Option<Result<String, PageError>> {
    let start = Instant::now();
    let per_call = Duration::from_secs(config.api_timeout_secs);
    let mut last: Option<Failure> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }
        if cancelled() {
            debug!("Page {}: cancelled before attempt {}", page, attempt + 1);
            return None;
        }

        let call = model.invoke(prompt.template(), Some(image), &config.sampling);
        match timeout(per_call, call).await {
            Ok(Ok(raw)) => {
                let text = normalize::extract_text(&raw);
                debug!(
                    "Page {}: {} chars raw → {} chars normalised in {:?}",
                    page,
                    raw.len(),
                    text.len(),
                    start.elapsed()
                );
                return Some(Ok(text));
            }
            Ok(Err(e)) => {
                warn!("Page {}: attempt {} failed: {}", page, attempt + 1, e);
                last = Some(Failure::Model(e.to_string()));
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last = Some(Failure::TimedOut);
            }
        }
    }

    Some(Err(match last {
        Some(Failure::TimedOut) => PageError::Timeout {
            page,
            secs: config.api_timeout_secs,
        },
        Some(Failure::Model(detail)) => PageError::RecognitionFailed {
            page,
            retries: config.max_retries,
            detail,
        },
        None => PageError::RecognitionFailed {
            page,
            retries: config.max_retries,
            detail: "Unknown error".to_string(),
        },
    }))
}
