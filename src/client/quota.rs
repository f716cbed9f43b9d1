// src/client/quota.rs
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{api_error_message, ClientError};
use crate::config::RelayConfig;
use crate::relay::{classify, RelayBody};
use crate::store::{ApiAccount, TokenAccount};

/// Gateway quota units per displayed currency unit.
pub const QUOTA_PER_UNIT: f64 = 500_000.0;

/// How far back the billing usage query reaches.
pub const USAGE_WINDOW_DAYS: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct AccountQuota {
    pub plan_name: String,
    pub remaining: f64,
    pub used: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub balance: f64,
    pub usage: f64,
}

#[derive(Debug, Deserialize)]
struct UserSelfResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<UserSelfData>,
}

#[derive(Debug, Deserialize)]
struct UserSelfData {
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    quota: f64,
    #[serde(default)]
    used_quota: f64,
}

#[derive(Debug, Deserialize)]
struct TokenLogResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    hard_limit_usd: f64,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_usage: f64,
}

/// Talks to gateway accounts the way the dashboard does: through the relay,
/// with the account's origin in the target header.
#[derive(Debug, Clone)]
pub struct QuotaClient {
    http: reqwest::Client,
    relay_url: String,
    prefix: String,
    target_header: HeaderName,
    user_id_header: HeaderName,
}

impl QuotaClient {
    /// `relay_url` is where the relay listens, e.g. `http://127.0.0.1:8080`.
    pub fn new(relay_url: impl Into<String>, config: &RelayConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
            prefix: config.route_prefix.clone(),
            target_header: header_name(&config.target_header)?,
            user_id_header: header_name(&config.user_id_header)?,
        })
    }

    pub async fn fetch_account_quota(&self, account: &ApiAccount) -> Result<AccountQuota, ClientError> {
        if account.access_token.is_empty() || account.user_id.is_empty() {
            return Err(ClientError::MissingCredentials("access token and user id"));
        }

        let mut headers = self.base_headers(&account.base_url, &account.access_token)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(self.user_id_header.clone(), header_value(&account.user_id)?);

        let value = self.get_json("/api/user/self", headers).await?;
        let response: UserSelfResponse = serde_json::from_value(value)?;

        match response.data {
            Some(data) if response.success => {
                let quota = AccountQuota {
                    plan_name: data
                        .group
                        .filter(|group| !group.is_empty())
                        .unwrap_or_else(|| "default".to_string()),
                    remaining: data.quota / QUOTA_PER_UNIT,
                    used: data.used_quota / QUOTA_PER_UNIT,
                    total: (data.quota + data.used_quota) / QUOTA_PER_UNIT,
                };
                debug!(account = %account.name, ?quota, "quota fetched");
                Ok(quota)
            }
            _ => Err(ClientError::Rejected(
                response.message.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }

    pub async fn fetch_token_balance(&self, token: &TokenAccount) -> Result<TokenBalance, ClientError> {
        self.fetch_token_balance_on(token, Utc::now().date_naive()).await
    }

    /// Balance with the usage window ending on `today`.
    pub async fn fetch_token_balance_on(
        &self,
        token: &TokenAccount,
        today: NaiveDate,
    ) -> Result<TokenBalance, ClientError> {
        if token.api_key.is_empty() {
            return Err(ClientError::MissingCredentials("api key"));
        }

        let headers = self.base_headers(&token.base_url, &token.api_key)?;

        let subscription: Subscription = serde_json::from_value(
            self.get_json("/v1/dashboard/billing/subscription", headers.clone())
                .await?,
        )?;

        let (start_date, end_date) = usage_window(today);
        let usage: Usage = serde_json::from_value(
            self.get_json(
                &format!(
                    "/v1/dashboard/billing/usage?start_date={}&end_date={}",
                    start_date, end_date
                ),
                headers,
            )
            .await?,
        )?;

        Ok(TokenBalance {
            balance: subscription.hard_limit_usd,
            usage: usage.total_usage / 100.0,
        })
    }

    /// Usage log entries for `token`, newest first. Gateways without a log
    /// endpoint answer `success: false`, which yields an empty list.
    pub async fn fetch_token_logs(&self, token: &TokenAccount) -> Result<Vec<Value>, ClientError> {
        if token.api_key.is_empty() {
            return Err(ClientError::MissingCredentials("api key"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(self.target_header.clone(), header_value(&token.base_url)?);

        let key: String = url::form_urlencoded::byte_serialize(token.api_key.as_bytes()).collect();
        let value = self
            .get_json(&format!("/api/log/token?key={}", key), headers)
            .await?;
        let response: TokenLogResponse = serde_json::from_value(value)?;

        match response.data {
            Some(Value::Array(mut entries)) if response.success => {
                entries.reverse();
                debug!(token = %token.name, entries = entries.len(), "token logs fetched");
                Ok(entries)
            }
            _ => {
                debug!(token = %token.name, "gateway has no token log");
                Ok(Vec::new())
            }
        }
    }

    /// Query every account that has credentials, concurrently. Accounts
    /// without credentials are skipped.
    pub async fn fetch_all_quotas(
        &self,
        accounts: &[ApiAccount],
    ) -> Vec<(String, Result<AccountQuota, ClientError>)> {
        let queries = accounts
            .iter()
            .filter(|account| !account.access_token.is_empty() && !account.user_id.is_empty())
            .map(|account| async move {
                (account.id.clone(), self.fetch_account_quota(account).await)
            });

        let results = futures::future::join_all(queries).await;

        let failed = results.iter().filter(|(_, result)| result.is_err()).count();
        if failed > 0 {
            warn!("quota refresh: {} succeeded, {} failed", results.len() - failed, failed);
        } else {
            info!("quota refresh: {} succeeded", results.len());
        }

        results
    }

    fn base_headers(&self, base_url: &str, secret: &str) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", secret))?);
        headers.insert(self.target_header.clone(), header_value(base_url)?);
        Ok(headers)
    }

    async fn get_json(&self, path_and_query: &str, headers: HeaderMap) -> Result<Value, ClientError> {
        let url = format!("{}{}{}", self.relay_url, self.prefix, path_and_query);
        let response = self.http.get(&url).headers(headers).send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await?;

        let body = classify(status, content_type.as_deref(), &bytes)
            .map_err(|e| ClientError::UnexpectedBody(e.to_string()))?;

        match body {
            RelayBody::Json(value) if status.is_success() => Ok(value),
            RelayBody::Json(value) => Err(ClientError::Relay {
                status: status.as_u16(),
                message: api_error_message(&value).unwrap_or_else(|| status.to_string()),
            }),
            RelayBody::Text { body, .. } if !status.is_success() => Err(ClientError::Relay {
                status: status.as_u16(),
                message: match body.trim() {
                    "" => status.to_string(),
                    message => message.to_string(),
                },
            }),
            RelayBody::Binary { .. } if !status.is_success() => Err(ClientError::Relay {
                status: status.as_u16(),
                message: status.to_string(),
            }),
            RelayBody::Text { content_type, .. } | RelayBody::Binary { content_type, .. } => {
                Err(ClientError::UnexpectedBody(format!(
                    "expected JSON, got {}",
                    content_type
                )))
            }
            RelayBody::Empty => Err(ClientError::UnexpectedBody(format!(
                "empty body with status {}",
                status
            ))),
        }
    }
}

/// `(start, end)` as unpadded `Y-M-D`, ending on `today`.
pub fn usage_window(today: NaiveDate) -> (String, String) {
    let start = today - ChronoDuration::days(USAGE_WINDOW_DAYS);
    (format_day(start), format_day(today))
}

fn format_day(day: NaiveDate) -> String {
    format!("{}-{}-{}", day.year(), day.month(), day.day())
}

fn header_name(name: &str) -> Result<HeaderName, ClientError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader(e.to_string()))
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_window_is_unpadded() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            usage_window(today),
            ("2023-11-26".to_string(), "2024-3-5".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let client = QuotaClient::new("http://127.0.0.1:9", &RelayConfig::default()).unwrap();

        let account = ApiAccount::new("gw", "https://gw.example");
        assert!(matches!(
            client.fetch_account_quota(&account).await,
            Err(ClientError::MissingCredentials(_))
        ));

        let token = TokenAccount::new("key", "https://gw.example", "");
        assert!(matches!(
            client.fetch_token_balance(&token).await,
            Err(ClientError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_all_skips_accounts_without_credentials() {
        let client = QuotaClient::new("http://127.0.0.1:9", &RelayConfig::default()).unwrap();
        let results = client
            .fetch_all_quotas(&[ApiAccount::new("gw", "https://gw.example")])
            .await;
        assert!(results.is_empty());
    }
}
