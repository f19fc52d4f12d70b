//! Yahoo Finance chart API price source.
//!
//! Polls the one-minute chart for the current trading day and reports the
//! close of the most recent bar.

use crate::{FeedError, PriceSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use stockwatch_core::{PriceQuote, Ticker};
use tracing::debug;

/// Decimal places kept from the provider's floating point closes.
pub const PRICE_DECIMALS: u32 = 4;

/// Configuration for [`YahooChartSource`].
#[derive(Debug, Clone)]
pub struct YahooConfig {
    /// API root, without trailing path.
    pub base_url: String,
    /// Chart range requested.
    pub range: String,
    /// Bar interval requested; the smallest one available.
    pub interval: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent sent with every request. The API rejects empty agents.
    pub user_agent: String,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            range: "1d".to_string(),
            interval: "1m".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("stockwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Price source backed by the Yahoo Finance v8 chart endpoint.
pub struct YahooChartSource {
    config: YahooConfig,
    client: reqwest::Client,
}

impl YahooChartSource {
    /// Create a source with its own HTTP client.
    pub fn new(config: YahooConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { config, client })
    }

    fn chart_url(&self, ticker: &Ticker) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.config.base_url.trim_end_matches('/'),
            encode_symbol(ticker.as_str())
        )
    }
}

#[async_trait]
impl PriceSource for YahooChartSource {
    async fn fetch(&self, ticker: &Ticker) -> Result<Option<PriceQuote>, FeedError> {
        let url = self.chart_url(ticker);
        debug!(ticker = %ticker, url = %url, "Fetching chart");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("range", self.config.range.as_str()),
                ("interval", self.config.interval.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FeedError::from_reqwest(ticker.as_str(), e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited {
                ticker: ticker.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::from_reqwest(ticker.as_str(), e))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            // Unknown or delisted symbols come back as 404 with an error body.
            return match parse_chart_response(ticker, &body) {
                Ok(quote) => Ok(quote),
                Err(FeedError::Parse { .. }) => Err(FeedError::Http {
                    ticker: ticker.to_string(),
                    status: status.as_u16(),
                }),
                Err(e) => Err(e),
            };
        }

        if !status.is_success() {
            return Err(FeedError::Http {
                ticker: ticker.to_string(),
                status: status.as_u16(),
            });
        }

        parse_chart_response(ticker, &body)
    }

    fn name(&self) -> &'static str {
        "yahoo"
    }
}

/// Percent-encode the characters of a symbol that are not path-safe.
fn encode_symbol(symbol: &str) -> String {
    symbol.replace('^', "%5E")
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Option<Vec<Option<f64>>>,
}

/// Parse a chart response body into the latest quote.
///
/// Returns `Ok(None)` when the provider has no bars for the ticker.
pub fn parse_chart_response(ticker: &Ticker, body: &str) -> Result<Option<PriceQuote>, FeedError> {
    let envelope: ChartEnvelope = serde_json::from_str(body).map_err(|e| FeedError::Parse {
        ticker: ticker.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(error) = envelope.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            debug!(ticker = %ticker, "Provider has no data for symbol");
            return Ok(None);
        }
        return Err(FeedError::Provider {
            ticker: ticker.to_string(),
            reason: error.description.unwrap_or(error.code),
        });
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(None);
    };

    let closes = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .and_then(|q| q.close)
        .unwrap_or_default();

    // Bars still forming, or halted minutes, carry null closes.
    let Some((index, close)) = closes
        .iter()
        .copied()
        .enumerate()
        .rev()
        .find_map(|(i, c)| c.filter(|v| v.is_finite()).map(|v| (i, v)))
    else {
        return Ok(None);
    };

    let price = Decimal::from_f64(close)
        .ok_or_else(|| FeedError::Parse {
            ticker: ticker.to_string(),
            reason: format!("close {} is not representable", close),
        })?
        .round_dp(PRICE_DECIMALS)
        .normalize();

    let timestamp = result
        .timestamp
        .as_ref()
        .and_then(|ts| ts.get(index))
        .and_then(|secs| DateTime::<Utc>::from_timestamp(*secs, 0))
        .unwrap_or_else(Utc::now);

    Ok(Some(PriceQuote::new(ticker.clone(), price, timestamp)))
}
