//! Sliding-window buckets.

use std::sync::Arc;

use async_trait::async_trait;
use pixels_core::PixelsResult;
use pixels_storage::{FastStore, WindowRequest};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BucketConfig;
use crate::result::{Admission, AdmissionResult};
use crate::scope::{BucketKey, KeyScope, RequestContext};

/// A rate-limit bucket as seen by the request gate.
///
/// Object safe, so the gate can hold `Arc<dyn RateLimitBucket>` and attach
/// one instance to several routes.
#[async_trait]
pub trait RateLimitBucket: Send + Sync {
    fn config(&self) -> &BucketConfig;

    /// Derive the key a request counts against.
    fn bucket_key(&self, ctx: &RequestContext<'_>) -> PixelsResult<BucketKey>;

    /// Run one admission and record it if admitted.
    ///
    /// Prune, count, breach detection, cooldown and insert happen in one
    /// atomic store operation, so two concurrent requests can never share
    /// the last slot.
    async fn check_and_record(&self, ctx: &RequestContext<'_>) -> PixelsResult<Admission>;

    /// Finish an admission once the guarded operation is done.
    ///
    /// With `count_failed_requests` off, a `failed` outcome removes the
    /// entry recorded for it and the returned result reflects that.
    async fn settle(&self, admission: &Admission, failed: bool) -> PixelsResult<AdmissionResult>;

    /// Start the cooldown for a key now.
    ///
    /// Manual entry point for operators and administrative tooling. A breach
    /// detected by [`RateLimitBucket::check_and_record`] raises its cooldown
    /// inside the same atomic store operation and never calls this.
    async fn apply_cooldown(&self, key: &BucketKey) -> PixelsResult<()>;

    /// Current quota numbers without recording anything.
    async fn inspect(&self, ctx: &RequestContext<'_>) -> PixelsResult<AdmissionResult>;
}

/// The shared admission algorithm parameterized by a key scope.
pub struct Bucket<S: KeyScope> {
    scope: S,
    config: BucketConfig,
    store: Arc<dyn FastStore>,
}

impl<S: KeyScope> Bucket<S> {
    pub fn new(scope: S, config: BucketConfig, store: Arc<dyn FastStore>) -> Self {
        Self {
            scope,
            config,
            store,
        }
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    fn window_request(&self, key: &BucketKey, token: String) -> WindowRequest {
        let keys = key.keys();
        WindowRequest {
            entries_key: keys.entries,
            cooldown_key: keys.cooldown,
            limit: self.config.requests(),
            window: self.config.window(),
            cooldown: self.config.cooldown(),
            token,
        }
    }
}

#[async_trait]
impl<S: KeyScope> RateLimitBucket for Bucket<S> {
    fn config(&self) -> &BucketConfig {
        &self.config
    }

    fn bucket_key(&self, ctx: &RequestContext<'_>) -> PixelsResult<BucketKey> {
        self.scope.derive(ctx)
    }

    async fn check_and_record(&self, ctx: &RequestContext<'_>) -> PixelsResult<Admission> {
        let key = self.scope.derive(ctx)?;
        let token = Uuid::now_v7().to_string();
        let outcome = self
            .store
            .admit(&self.window_request(&key, token.clone()))
            .await?;
        let result = AdmissionResult::from_outcome(&self.config, &outcome);

        if result.admitted {
            debug!(bucket = %key, remaining = result.remaining, "request admitted");
        } else {
            info!(
                bucket = %key,
                retry_after_secs = result.retry_after_seconds.unwrap_or_default(),
                "request rejected by rate limit"
            );
        }

        Ok(Admission {
            provisional: result.admitted && !self.config.count_failed_requests(),
            token: result.admitted.then_some(token),
            result,
            key,
        })
    }

    async fn settle(&self, admission: &Admission, failed: bool) -> PixelsResult<AdmissionResult> {
        let Some(token) = admission.token.as_deref() else {
            return Ok(admission.result);
        };
        if !(admission.provisional && failed) {
            return Ok(admission.result);
        }

        let removed = self
            .store
            .remove_entry(&admission.key.keys().entries, token)
            .await?;
        if removed {
            debug!(bucket = %admission.key, "failed request handed back its admission");
            Ok(admission.result.released())
        } else {
            Ok(admission.result)
        }
    }

    async fn apply_cooldown(&self, key: &BucketKey) -> PixelsResult<()> {
        let cooldown = self.config.cooldown();
        if cooldown.is_zero() {
            return Ok(());
        }
        self.store.set_flag(&key.keys().cooldown, cooldown).await?;
        info!(bucket = %key, cooldown_secs = cooldown.as_secs(), "cooldown applied");
        Ok(())
    }

    async fn inspect(&self, ctx: &RequestContext<'_>) -> PixelsResult<AdmissionResult> {
        let key = self.scope.derive(ctx)?;
        let outcome = self
            .store
            .inspect(&self.window_request(&key, String::new()))
            .await?;
        Ok(AdmissionResult::from_outcome(&self.config, &outcome))
    }
}
