use std::ops::RangeInclusive;
use std::sync::Arc;

use super::source::{PromoSource, SourceError};
use crate::cache::PromoCodeCache;
use crate::metrics::Metrics;
use crate::models::PromoCode;
use crate::utils::Deadline;

/// Accepted code length, in characters.
pub const CODE_LENGTH: RangeInclusive<usize> = 8..=10;

#[derive(Debug, thiserror::Error)]
pub enum PromoError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("quorum of {quorum} is not satisfiable with {sources} promo sources")]
    InvalidQuorum { quorum: usize, sources: usize },
}

// ============================================================================
// Promo Validator
// ============================================================================
//
//   length check -> cached verdict -> quorum vote over the sources
//
// The vote scans sources in order and stops as soon as `quorum` of them
// contain the code. Valid and invalid verdicts are both cached; a vote that
// failed on an unreadable source caches nothing.
//
// ============================================================================

pub struct PromoValidator {
    sources: Vec<Arc<dyn PromoSource>>,
    quorum: usize,
    cache: PromoCodeCache,
    deadline: Deadline,
    metrics: Arc<Metrics>,
}

impl PromoValidator {
    pub fn new(
        sources: Vec<Arc<dyn PromoSource>>,
        quorum: usize,
        cache: PromoCodeCache,
        deadline: Deadline,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PromoError> {
        if quorum == 0 || quorum > sources.len() {
            return Err(PromoError::InvalidQuorum {
                quorum,
                sources: sources.len(),
            });
        }

        Ok(Self {
            sources,
            quorum,
            cache,
            deadline,
            metrics,
        })
    }

    pub async fn validate(&self, code: &str) -> Result<bool, PromoError> {
        let length = code.chars().count();
        if !CODE_LENGTH.contains(&length) {
            self.metrics.record_promo_verdict("rejected_length");
            tracing::debug!(length = length, "Promo code rejected by length");
            return Ok(false);
        }

        match self.cache.get(code).await {
            Ok(Some(verdict)) => {
                self.metrics.record_promo_verdict("cached");
                return Ok(verdict.is_valid);
            }
            Ok(None) => {}
            Err(e) => self.cache.absorb("get", &PromoCodeCache::key(code), &e),
        }

        let is_valid = match self.vote(code).await {
            Ok(is_valid) => is_valid,
            Err(e) => {
                self.metrics.record_promo_verdict("source_error");
                tracing::error!(error = %e, "Promo validation aborted, verdict not cached");
                return Err(e.into());
            }
        };

        self.cache.populate(code, &PromoCode::new(code, is_valid)).await;
        self.metrics
            .record_promo_verdict(if is_valid { "valid" } else { "invalid" });
        tracing::info!(code = %code, valid = is_valid, "Promo code validated");

        Ok(is_valid)
    }

    async fn vote(&self, code: &str) -> Result<bool, SourceError> {
        let mut matches = 0;

        for source in &self.sources {
            self.metrics.record_promo_source_read(source.name());

            let found = self
                .deadline
                .run(source.contains(code))
                .await
                .map_err(|elapsed| SourceError::Timeout {
                    source_name: source.name().to_string(),
                    limit: elapsed.0,
                })??;

            if found {
                matches += 1;
                if matches >= self.quorum {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}
