use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::traits::QuoteProvider;
use crate::errors::CoreError;
use crate::models::quote::Quote;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "Alpha Vantage";

/// Alpha Vantage API provider.
///
/// - **Free tier**: 25 requests/day (across ALL endpoints).
/// - **Requires**: API key (set via settings as "alphavantage").
/// - **Endpoint**: `GLOBAL_QUOTE`, which carries the last price, open,
///   day range, volume and previous close. No 52-week range.
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        let builder = Client::builder().timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_key,
        }
    }

    /// Turn a `GLOBAL_QUOTE` response body into a [`Quote`].
    pub fn parse_global_quote(symbol: &str, body: &str) -> Result<Quote, CoreError> {
        let resp: GlobalQuoteResponse = serde_json::from_str(body).map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to parse quote for {symbol}: {e}"),
        })?;

        let quote = resp.global_quote.ok_or_else(|| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("No quote data for {symbol}. API limit may be exceeded."),
        })?;

        let price = quote
            .price
            .as_deref()
            .and_then(parse_number)
            .ok_or_else(|| CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("Symbol {symbol} not found"),
            })?;

        Ok(Quote {
            price,
            previous_close: quote.previous_close.as_deref().and_then(parse_number),
            open: quote.open.as_deref().and_then(parse_number),
            day_high: quote.high.as_deref().and_then(parse_number),
            day_low: quote.low.as_deref().and_then(parse_number),
            volume: quote.volume.as_deref().and_then(|v| v.trim().parse().ok()),
            fifty_two_week_high: None,
            fifty_two_week_low: None,
        })
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let body = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", &symbol.to_uppercase()),
                ("apikey", &self.api_key),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Self::parse_global_quote(symbol, &body)
    }
}
