use async_trait::async_trait;
use time::OffsetDateTime;

use super::traits::QuoteProvider;
use crate::errors::CoreError;
use crate::models::quote::Quote;

const PROVIDER: &str = "Yahoo Finance";

/// Yahoo Finance API provider.
///
/// - **Free**: No API key required.
/// - **No strict rate limits** (unofficial public API).
/// - **Coverage**: Global equities, ETFs, indices, mutual funds.
///
/// One request fetches a year of daily bars: the last bar gives the price
/// and the day's open/high/low/volume, the bar before it the previous close,
/// and the whole window the 52-week range.
pub struct YahooFinanceProvider {
    connector: yahoo_finance_api::YahooConnector,
}

/// One daily OHLCV bar, detached from the connector's own type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl YahooFinanceProvider {
    pub fn new() -> Result<Self, CoreError> {
        let connector = yahoo_finance_api::YahooConnector::new().map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to create connector: {e}"),
        })?;
        Ok(Self { connector })
    }

    /// Build a quote from daily bars sorted oldest first.
    pub fn quote_from_bars(symbol: &str, bars: &[DailyBar]) -> Result<Quote, CoreError> {
        let last = bars.last().ok_or_else(|| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("No quote data for {symbol}"),
        })?;

        let previous_close = bars.len().checked_sub(2).map(|i| bars[i].close);
        let fifty_two_week_high = bars.iter().map(|b| b.high).reduce(f64::max);
        let fifty_two_week_low = bars.iter().map(|b| b.low).reduce(f64::min);

        Ok(Quote {
            price: last.close,
            previous_close,
            open: Some(last.open),
            day_high: Some(last.high),
            day_low: Some(last.low),
            volume: Some(last.volume),
            fifty_two_week_high,
            fifty_two_week_low,
        })
    }
}

#[async_trait]
impl QuoteProvider for YahooFinanceProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let end = OffsetDateTime::now_utc();
        let start = end - time::Duration::days(365);

        let resp = self
            .connector
            .get_quote_history(symbol, start, end)
            .await
            .map_err(|e| CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("Failed to fetch quote for {symbol}: {e}"),
            })?;

        let quotes = resp.quotes().map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to parse quotes for {symbol}: {e}"),
        })?;

        let mut bars: Vec<(i64, DailyBar)> = quotes
            .iter()
            .map(|q| {
                (
                    q.timestamp as i64,
                    DailyBar {
                        open: q.open,
                        high: q.high,
                        low: q.low,
                        close: q.close,
                        volume: q.volume,
                    },
                )
            })
            .collect();
        bars.sort_by_key(|(ts, _)| *ts);
        let bars: Vec<DailyBar> = bars.into_iter().map(|(_, b)| b).collect();

        Self::quote_from_bars(symbol, &bars)
    }
}
