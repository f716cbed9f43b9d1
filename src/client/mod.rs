// src/client/mod.rs
mod error;
mod quota;

pub use error::{api_error_message, is_quota_depleted_message, ClientError};
pub use quota::{usage_window, AccountQuota, QuotaClient, TokenBalance, QUOTA_PER_UNIT};
