use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot of market data for one symbol, as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub price: f64,
    #[serde(default)]
    pub previous_close: Option<f64>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub day_high: Option<f64>,
    #[serde(default)]
    pub day_low: Option<f64>,
    #[serde(default)]
    pub volume: Option<u64>,
    #[serde(default)]
    pub fifty_two_week_high: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_low: Option<f64>,
}

impl Quote {
    /// A quote carrying only the last price.
    pub fn from_price(price: f64) -> Self {
        Self {
            price,
            previous_close: None,
            open: None,
            day_high: None,
            day_low: None,
            volume: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
        }
    }

    /// Change versus the previous close, in percent.
    pub fn change_percent(&self) -> Option<f64> {
        let prev = self.previous_close?;
        if prev == 0.0 {
            return None;
        }
        Some((self.price - prev) / prev * 100.0)
    }
}

/// A quote stored under `stockPrice_<SYMBOL>` together with its fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCacheEntry {
    #[serde(flatten)]
    pub quote: Quote,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
}

impl QuoteCacheEntry {
    pub fn new(quote: Quote, fetched_at: DateTime<Utc>) -> Self {
        Self { quote, fetched_at }
    }

    /// Fresh while strictly younger than `ttl`. A zero `ttl` is never fresh.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}
