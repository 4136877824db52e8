use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::quote::Quote;

/// Source of live quotes.
///
/// Each market data API implements this trait, so a provider that stops
/// working can be replaced without touching the planner. Failures are
/// returned as `Err` values and never panic across this boundary.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Fetch the latest quote for `symbol` (already uppercased and trimmed).
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError>;
}
