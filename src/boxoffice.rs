use std::{num::NonZeroU32, sync::Arc};

use async_trait::async_trait;
use futures::StreamExt;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use jiff::Timestamp;
use serde::Deserialize;
use wreq::StatusCode;

use crate::models::{BoxOffice, BoxOfficeRevenue};

const MAX_ERROR_BODY: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum BoxOfficeError {
    #[error("box office record not found")]
    NotFound,
    #[error("movie title is required")]
    InvalidTitle,
    #[error("box office request timed out")]
    Timeout,
    #[error("call box office service failed: {0}")]
    Http(#[from] wreq::Error),
    #[error("box office service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode box office response failed: {0}")]
    Decode(String),
}

/// What the provider knows about a title.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxOfficeRecord {
    pub distributor: Option<String>,
    pub budget: Option<i64>,
    pub mpa_rating: Option<String>,
    pub revenue: BoxOfficeRevenue,
    pub currency: String,
    pub source: String,
    pub last_updated: Option<Timestamp>,
}

impl BoxOfficeRecord {
    pub fn box_office(&self) -> BoxOffice {
        BoxOffice {
            revenue: self.revenue.clone(),
            currency: self.currency.clone(),
            source: self.source.clone(),
            last_updated: self.last_updated,
        }
    }
}

#[async_trait]
pub trait BoxOfficeProvider: Send + Sync {
    async fn fetch(&self, title: &str) -> Result<BoxOfficeRecord, BoxOfficeError>;
}

/// Provider used when no box-office endpoint is configured.
pub struct DisabledBoxOffice;

#[async_trait]
impl BoxOfficeProvider for DisabledBoxOffice {
    async fn fetch(&self, _title: &str) -> Result<BoxOfficeRecord, BoxOfficeError> {
        Err(BoxOfficeError::NotFound)
    }
}

pub struct HttpBoxOfficeClient {
    client: wreq::Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl HttpBoxOfficeClient {
    pub fn new(client: wreq::Client, base_url: String, api_key: String, rps: u32) -> Self {
        if api_key.trim().is_empty() {
            tracing::warn!("BOXOFFICE_API_KEY is empty; provider requests may be rejected");
        }

        let rps = NonZeroU32::new(rps.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self { client, api_key, base_url, limiter }
    }
}

#[async_trait]
impl BoxOfficeProvider for HttpBoxOfficeClient {
    async fn fetch(&self, title: &str) -> Result<BoxOfficeRecord, BoxOfficeError> {
        if title.trim().is_empty() {
            return Err(BoxOfficeError::InvalidTitle);
        }

        self.limiter.until_ready().await;

        let url = format!("{}/boxoffice", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(url)
            .header("X-API-Key", self.api_key.as_str())
            .query(&[("title", title)])
            .send()
            .await?;

        let status = resp.status();
        match status.as_u16() {
            200 => {
                let bytes = resp.bytes().await?;
                let payload: ApiResponse = serde_json::from_slice(&bytes)
                    .map_err(|err| BoxOfficeError::Decode(err.to_string()))?;
                payload.into_record()
            },
            404 => Err(BoxOfficeError::NotFound),
            code => {
                let mut body = read_error_body(resp).await;
                if body.is_empty() {
                    body = status_line(status);
                }
                Err(BoxOfficeError::Status { status: code, body })
            },
        }
    }
}

/// At most `MAX_ERROR_BODY` bytes of the body, trimmed. Read failures yield
/// whatever arrived before them.
async fn read_error_body(resp: wreq::Response) -> String {
    let mut stream = std::pin::pin!(resp.bytes_stream());
    let mut buf = Vec::with_capacity(MAX_ERROR_BODY);
    while buf.len() < MAX_ERROR_BODY {
        let Some(Ok(chunk)) = stream.next().await else { break };
        let take = chunk.len().min(MAX_ERROR_BODY - buf.len());
        buf.extend_from_slice(&chunk[..take]);
    }

    let text = match std::str::from_utf8(&buf) {
        Ok(text) => text,
        Err(err) => std::str::from_utf8(&buf[..err.valid_up_to()]).unwrap_or_default(),
    };
    text.trim().to_string()
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    distributor: Option<String>,
    budget: Option<i64>,
    mpa_rating: Option<String>,
    revenue: RevenuePayload,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    last_updated: String,
}

#[derive(Debug, Deserialize)]
struct RevenuePayload {
    worldwide: i64,
    #[serde(rename = "openingWeekendUSA")]
    opening_weekend_usa: Option<i64>,
}

impl ApiResponse {
    fn into_record(self) -> Result<BoxOfficeRecord, BoxOfficeError> {
        let last_updated = match self.last_updated.trim() {
            "" => None,
            raw => Some(raw.parse::<Timestamp>().map_err(|err| {
                BoxOfficeError::Decode(format!("invalid lastUpdated format: {err}"))
            })?),
        };

        Ok(BoxOfficeRecord {
            distributor: self.distributor,
            budget: self.budget,
            mpa_rating: self.mpa_rating,
            revenue: BoxOfficeRevenue {
                worldwide: self.revenue.worldwide,
                opening_weekend_us: self.revenue.opening_weekend_usa,
            },
            currency: self.currency,
            source: self.source,
            last_updated,
        })
    }
}
