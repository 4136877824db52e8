use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::quote::{Quote, QuoteCacheEntry};
use crate::models::tab::normalize_symbol;
use crate::providers::registry::QuoteProviderRegistry;
use crate::storage::quote_cache::QuoteCache;
use crate::storage::traits::KeyValueStore;

/// Fetches quotes from providers, memoized through the [`QuoteCache`].
///
/// 1. Fresh cache entry → returned without touching the network.
/// 2. Otherwise providers are tried in registry order until one returns a
///    valid quote, which is written to the cache.
pub struct QuoteService {
    registry: QuoteProviderRegistry,
    cache: QuoteCache,
}

impl QuoteService {
    pub fn new(registry: QuoteProviderRegistry, cache: QuoteCache) -> Self {
        Self { registry, cache }
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Quote for `symbol`, from cache when fresh, else from the providers.
    pub async fn get_quote(
        &self,
        storage: &mut dyn KeyValueStore,
        symbol: &str,
    ) -> Result<QuoteCacheEntry, CoreError> {
        self.get_quote_at(storage, symbol, Utc::now()).await
    }

    /// Same as [`get_quote`](Self::get_quote) with an explicit clock reading.
    pub async fn get_quote_at(
        &self,
        storage: &mut dyn KeyValueStore,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<QuoteCacheEntry, CoreError> {
        let symbol = normalize_symbol(symbol)
            .ok_or_else(|| CoreError::ValidationError("Symbol is empty".into()))?;

        if let Some(entry) = self.cache.get_fresh_at(storage, &symbol, now) {
            debug!(symbol = %symbol, "quote served from cache");
            return Ok(entry);
        }

        let quote = self.fetch_quote(&symbol).await?;
        self.cache.store(storage, &symbol, quote, now)
    }

    /// Fetch from providers with automatic fallback, bypassing the cache.
    ///
    /// Tries providers in registration order. If the primary fails (API down,
    /// rate limited, unknown symbol), falls back to the next one. Returned
    /// prices must be finite and positive.
    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        if self.registry.is_empty() {
            return Err(CoreError::NoProvider);
        }

        let mut last_error = None;
        for provider in self.registry.providers() {
            match provider.fetch_quote(symbol).await {
                Ok(quote) => {
                    if !quote.price.is_finite() || quote.price <= 0.0 {
                        warn!(provider = provider.name(), symbol, price = quote.price, "provider returned invalid price");
                        last_error = Some(CoreError::InvalidQuote {
                            symbol: symbol.to_string(),
                            reason: format!(
                                "{} returned {} (must be finite and positive)",
                                provider.name(),
                                quote.price
                            ),
                        });
                        continue;
                    }
                    debug!(provider = provider.name(), symbol, price = quote.price, "fetched quote");
                    return Ok(quote);
                }
                Err(e) => {
                    warn!(provider = provider.name(), symbol, error = %e, "quote provider failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CoreError::NoProvider))
    }
}
