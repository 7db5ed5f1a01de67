//! Stock quote source.
//!
//! Quotes come from a stooq-compatible CSV endpoint:
//! `GET {base_url}/q/l/?s=<code>&f=sd2t2ohlcv&h&e=csv`.
//!
//! ```text
//! Symbol,Date,Time,Open,High,Low,Close,Volume
//! AAPL.US,2024-01-02,22:00:07,187.15,188.44,183.885,185.64,81964874
//! ```

use async_trait::async_trait;
use tracing::instrument;

use crate::config::QuoteSettings;

/// Close value the source returns for an unknown code.
const NO_DATA: &str = "N/D";

const SYMBOL_COLUMN: usize = 0;
const CLOSE_COLUMN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("quote source answered with status {0}")]
    Status(u16),

    #[error("invalid CSV data format")]
    MalformedCsv,

    #[error("invalid stock code: {0}")]
    InvalidCode(String),
}

impl QuoteError {
    /// Whether asking again later can change the answer.
    pub fn is_transient(&self) -> bool {
        !matches!(self, QuoteError::InvalidCode(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub symbol: String,
    pub close: String,
}

impl Quote {
    /// Chat line the bot posts for this quote.
    pub fn message(&self) -> String {
        format!("{} quote is ${} per share", self.symbol, self.close)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, code: &str) -> Result<Quote, QuoteError>;
}

/// Parse the header line plus one data row.
pub fn parse_quote_csv(body: &str) -> Result<Quote, QuoteError> {
    let mut lines = body.lines().filter(|line| !line.trim().is_empty());
    lines.next().ok_or(QuoteError::MalformedCsv)?;
    let record: Vec<&str> = lines
        .next()
        .ok_or(QuoteError::MalformedCsv)?
        .split(',')
        .map(str::trim)
        .collect();

    if record.len() <= CLOSE_COLUMN {
        return Err(QuoteError::MalformedCsv);
    }

    let symbol = record[SYMBOL_COLUMN];
    let close = record[CLOSE_COLUMN];
    if close == NO_DATA {
        return Err(QuoteError::InvalidCode(symbol.to_string()));
    }

    Ok(Quote {
        symbol: symbol.to_string(),
        close: close.to_string(),
    })
}

/// [`QuoteSource`] backed by the HTTP CSV endpoint.
#[derive(Clone)]
pub struct HttpQuoteSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQuoteSource {
    pub fn new(settings: &QuoteSettings) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    #[instrument(skip(self))]
    async fn quote(&self, code: &str) -> Result<Quote, QuoteError> {
        let response = self
            .client
            .get(format!("{}/q/l/", self.base_url))
            .query(&[("s", code), ("f", "sd2t2ohlcv"), ("e", "csv")])
            .query(&[("h", "")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        parse_quote_csv(&body)
    }
}
