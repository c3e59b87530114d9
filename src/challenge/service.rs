//! Round-trips against the challenge service.
//!
//! One validation costs two network calls (fetch images, check offset) plus
//! a CPU-bound solve, so accepted tokens are cached for a short window; the
//! service provably rejects them after a few minutes, and the cache TTL must
//! stay under that.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::vision::{self, VisionError};
use crate::protocol;
use crate::vendor::{VendorApi, VendorError};

#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The service judged the submitted offset incorrect.
    #[error("challenge service rejected the computed offset")]
    Rejected,

    /// The service accepted the offset but returned no validation token.
    #[error("challenge accepted but no validation token returned")]
    MissingValidate,

    #[error("challenge image is not valid base64: {0}")]
    ImagePayload(#[from] base64::DecodeError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Vendor(#[from] VendorError),
}

struct CachedToken {
    token: String,
    acquired_at: Instant,
}

/// Fetch-solve-check pipeline with a bounded token cache.
///
/// Machines sharing a session share one broker; the lock also serializes
/// concurrent solves so siblings reuse the first accepted token instead of
/// each paying for their own round-trip.
pub struct ChallengeBroker {
    cache: Mutex<Option<CachedToken>>,
    ttl: Duration,
}

impl ChallengeBroker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(None),
            ttl,
        }
    }

    /// Return a server-accepted validation token, solving a fresh challenge
    /// if the cached one has aged out.
    pub async fn validation_token<T: VendorApi>(&self, api: &T) -> Result<String, ChallengeError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.acquired_at.elapsed() < self.ttl
        {
            return Ok(cached.token.clone());
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let keys = protocol::challenge_keys(timestamp);
        let reply = api.fetch_challenge(&keys.captcha_key, &keys.token).await?;

        let shade = decode_image(&reply.images.shade_image)?;
        let cutout = decode_image(&reply.images.cutout_image)?;
        let report = vision::solve(&shade, &cutout)?;

        let check = api.check_challenge(&reply.token, report.offset).await?;
        if !check.result {
            return Err(ChallengeError::Rejected);
        }
        let token = check.validate_token().ok_or(ChallengeError::MissingValidate)?;

        // A marginal correlation peak that happened to pass is not worth
        // pinning for the whole cache window.
        if !report.is_degraded() {
            *cache = Some(CachedToken {
                token: token.clone(),
                acquired_at: Instant::now(),
            });
        }
        Ok(token)
    }

    /// Drop the cached token. Called when a submission bounced and its
    /// material is presumed stale.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }
}

/// Decode a base64 image payload, tolerating a `data:image/...;base64,`
/// prefix — the vendor has served both forms.
fn decode_image(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let raw = payload.rsplit("base64,").next().unwrap_or(payload);
    BASE64.decode(raw.trim())
}
