use std::collections::BTreeMap;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::ApiContext;
use crate::retry::{retry_async, RetryPolicy};

const ERROR_BODY_SNIPPET_LEN: usize = 220;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ApiDefaults;

impl ApiDefaults {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
}

#[derive(Clone, Debug)]
pub struct ApiClientOptions {
    pub connect_timeout: Duration,
    pub attempt_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// Recorded as `created_by` on rule changes.
    pub operator: Option<String>,
}

impl Default for ApiClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: ApiDefaults::CONNECT_TIMEOUT,
            attempt_timeout: ApiDefaults::ATTEMPT_TIMEOUT,
            retry_policy: RetryPolicy::single_attempt(),
            operator: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DashboardApiClient {
    http: Client,
    context: ApiContext,
    attempt_timeout: Duration,
    retry_policy: RetryPolicy,
    operator: Option<String>,
}

impl DashboardApiClient {
    pub fn new(context: ApiContext) -> Result<Self, ApiError> {
        Self::with_options(context, ApiClientOptions::default())
    }

    pub fn with_options(context: ApiContext, options: ApiClientOptions) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self {
            http,
            context,
            attempt_timeout: options.attempt_timeout,
            retry_policy: options.retry_policy,
            operator: options.operator,
        })
    }

    pub fn context(&self) -> &ApiContext {
        &self.context
    }

    /// Current KPI snapshot.
    pub async fn fetch_metrics(&self) -> Result<Metrics, ApiError> {
        let body = self.request(Method::GET, "/metrics", None).await?;
        parse_json(&body)
    }

    /// Ranked recommendations for `user_id`.
    ///
    /// Accepts a bare array or a `{"recommendations": [...]}` envelope; any
    /// other shape is logged and treated as an empty ranking. An element
    /// that does not decode fails the whole call with [`ApiError::Parse`].
    pub async fn fetch_ranked_items(&self, user_id: &str) -> Result<Vec<RankingItem>, ApiError> {
        let request = RankRequest {
            user_id: user_id.to_string(),
            items: Vec::new(),
        };
        let body = self
            .request(Method::POST, "/rank", Some(serde_json::to_value(&request)?))
            .await?;
        parse_ranked_items(&body)
    }

    pub async fn fetch_item(&self, item_id: &str) -> Result<ItemDetail, ApiError> {
        let body = self
            .request(Method::GET, &format!("/item/{}", path_segment(item_id)), None)
            .await?;
        parse_json(&body)
    }

    /// Feature attributions behind an item's score.
    pub async fn explain_item(&self, item_id: &str) -> Result<Explanation, ApiError> {
        let body = self
            .request(
                Method::GET,
                &format!("/explain/{}", path_segment(item_id)),
                None,
            )
            .await?;
        parse_json(&body)
    }

    /// Simulated rank movement if `item_id` were repriced to `new_price`.
    pub async fn simulate_price_change(
        &self,
        item_id: &str,
        new_price: f64,
    ) -> Result<WhatIfPriceResponse, ApiError> {
        let request = WhatIfPriceRequest {
            item_id: item_id.to_string(),
            new_price,
        };
        let body = self
            .request(
                Method::POST,
                "/whatif/price",
                Some(serde_json::to_value(&request)?),
            )
            .await?;
        parse_json(&body)
    }

    /// Pins an item to the top of the ranking.
    pub async fn pin_item(&self, item_id: &str) -> Result<RuleResponse, ApiError> {
        let request = PinRuleRequest {
            item_id: item_id.to_string(),
            created_by: self.operator.clone(),
        };
        let body = self
            .request(Method::POST, "/rules/pin", Some(serde_json::to_value(&request)?))
            .await?;
        parse_json(&body)
    }

    /// Boosts clearance items, optionally within one category.
    pub async fn boost_clearance(&self, category: Option<&str>) -> Result<RuleResponse, ApiError> {
        let request = BoostClearanceRequest {
            category: category.map(str::to_string),
            created_by: self.operator.clone(),
        };
        let body = self
            .request(
                Method::POST,
                "/rules/boost-clearance",
                Some(serde_json::to_value(&request)?),
            )
            .await?;
        parse_json(&body)
    }

    /// Asks the assistant a free-text question and returns its answer.
    pub async fn ask_ai(&self, request: &AskAiRequest) -> Result<String, ApiError> {
        let body = self
            .request(Method::POST, "/ask-ai", Some(serde_json::to_value(request)?))
            .await?;
        Ok(parse_json::<AskAiResponse>(&body)?.answer)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<String, ApiError> {
        let endpoint = self.context.endpoint(path);
        let policy = self.retry_policy.clone();

        retry_async(
            &policy,
            |_| {
                let method = method.clone();
                let endpoint = endpoint.clone();
                let body = body.clone();
                async move { self.send_attempt(method, &endpoint, body.as_ref()).await }
            },
            ApiError::is_retryable,
        )
        .await
    }

    async fn send_attempt(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<String, ApiError> {
        let mut builder = self
            .http
            .request(method, endpoint)
            .timeout(self.attempt_timeout);

        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(token) = self.context.auth_token() {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await.map_err(ApiError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;

        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status,
                body: summarize_error_body(&body),
            });
        }

        Ok(body)
    }
}

/// Global dashboard KPIs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub revenue: f64,
    pub revenue_change: f64,
    pub views: u64,
    pub views_change: f64,
    pub clicks: u64,
    pub clicks_change: f64,
    pub active_products: u64,
    pub avg_order_value: f64,
}

impl Metrics {
    /// Click-through rate in percent, `0.0` when there are no views.
    pub fn click_through_rate(&self) -> f64 {
        if self.views == 0 {
            return 0.0;
        }
        self.clicks as f64 / self.views as f64 * 100.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RankingItem {
    pub item_id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "title", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "imageUrl",
        alias = "image_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemDetail {
    pub item_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default, rename = "rankChange")]
    pub rank_change: i64,
    #[serde(default)]
    pub metrics: Option<Value>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

/// Feature name to normalized attribution.
pub type Explanation = BTreeMap<String, f64>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfPriceResponse {
    pub rank_change: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_rank: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RuleResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_ids: Vec<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AskAiContext {
    pub page: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AskAiRequest {
    pub question: String,
    pub context: AskAiContext,
}

impl AskAiRequest {
    pub fn on_page(question: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: AskAiContext {
                page: page.into(),
                ..AskAiContext::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskAiResponse {
    answer: String,
}

#[derive(Debug, Serialize)]
struct RankRequest {
    user_id: String,
    items: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WhatIfPriceRequest {
    item_id: String,
    new_price: f64,
}

#[derive(Debug, Serialize)]
struct PinRuleRequest {
    #[serde(rename = "itemId")]
    item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct BoostClearanceRequest {
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    #[error("http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_timeout() || err.is_connect(),
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Encode(_) | Self::Parse(_) => false,
        }
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|err| ApiError::Parse(err.to_string()))
}

fn parse_ranked_items(body: &str) -> Result<Vec<RankingItem>, ApiError> {
    let items = match parse_json::<Value>(body)? {
        items @ Value::Array(_) => items,
        Value::Object(mut fields) => match fields.remove("recommendations") {
            Some(items @ Value::Array(_)) => items,
            _ => return Ok(unexpected_rank_shape(body)),
        },
        _ => return Ok(unexpected_rank_shape(body)),
    };
    serde_json::from_value(items).map_err(|err| ApiError::Parse(err.to_string()))
}

fn unexpected_rank_shape(body: &str) -> Vec<RankingItem> {
    warn!(
        event = "unexpected_rank_response",
        body = %summarize_error_body(body)
    );
    Vec::new()
}

// Unreserved characters (RFC 3986) pass through; everything else is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

fn summarize_error_body(body: &str) -> String {
    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        detail: Option<Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let detail = parsed.detail.map(|detail| match detail {
            Value::String(text) => text,
            other => other.to_string(),
        });
        if let Some(message) = detail.or(parsed.error).or(parsed.message) {
            return message;
        }
    }

    body.chars().take(ERROR_BODY_SNIPPET_LEN).collect()
}
