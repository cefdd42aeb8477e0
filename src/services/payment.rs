// Payment Service
// M-Pesa STK push requests, callback parsing and pending-payment bookkeeping

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::access_ledger::{AccessLedger, LedgerError};
use super::config_store::PaymentConfig;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Auth failed: {status} - {message}")]
    AuthError { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("Payment credentials not configured")]
    MissingCredentials,
}

/// Provider acknowledgement that the STK prompt was sent to the phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkPushAck {
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// Outbound payment seam; the bot only needs "ask this phone to pay".
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn request_payment(&self, phone: &str, amount: u32) -> Result<StkPushAck, PaymentError>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: u32,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// `base64(shortcode + passkey + timestamp)` as Daraja expects.
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

pub fn build_stk_request(config: &PaymentConfig, phone: &str, amount: u32, timestamp: &str) -> StkPushRequest {
    StkPushRequest {
        business_short_code: config.shortcode.clone(),
        password: stk_password(&config.shortcode, &config.passkey, timestamp),
        timestamp: timestamp.to_string(),
        transaction_type: "CustomerPayBillOnline".to_string(),
        amount,
        party_a: phone.to_string(),
        party_b: config.shortcode.clone(),
        phone_number: phone.to_string(),
        callback_url: config.callback_url.clone(),
        account_reference: config.account_reference.clone(),
        transaction_desc: config.transaction_desc.clone(),
    }
}

/// Interpret an STK push response body.
fn ack_from_response(data: &Value) -> Result<StkPushAck, PaymentError> {
    if let Some(message) = data["errorMessage"].as_str() {
        return Err(PaymentError::Rejected(message.to_string()));
    }

    let code = data["ResponseCode"].as_str().unwrap_or_default();
    let checkout_id = data["CheckoutRequestID"].as_str();
    match checkout_id {
        Some(id) if code == "0" => Ok(StkPushAck {
            checkout_request_id: id.to_string(),
            customer_message: data["CustomerMessage"].as_str().unwrap_or_default().to_string(),
        }),
        _ => Err(PaymentError::Rejected(
            data["ResponseDescription"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
        )),
    }
}

pub struct MpesaClient {
    client: Client,
    config: PaymentConfig,
}

impl MpesaClient {
    pub fn new(config: PaymentConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn access_token(&self) -> Result<String, PaymentError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::AuthError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: Value = response.json().await?;
        data["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PaymentError::AuthError {
                status: status.as_u16(),
                message: "missing access_token".to_string(),
            })
    }
}

impl PaymentGateway for MpesaClient {
    async fn request_payment(&self, phone: &str, amount: u32) -> Result<StkPushAck, PaymentError> {
        if self.config.consumer_key.is_empty() || self.config.passkey.is_empty() {
            return Err(PaymentError::MissingCredentials);
        }

        let start = Instant::now();
        let token = self.access_token().await?;
        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        let request = build_stk_request(&self.config, phone, amount, &timestamp);

        let url = format!(
            "{}/mpesa/stkpush/v1/processrequest",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let data: Value = serde_json::from_str(&body).map_err(|_| {
            PaymentError::Rejected(format!("{} - {}", status.as_u16(), body))
        })?;

        let ack = ack_from_response(&data)?;
        info!(
            checkout_request_id = %ack.checkout_request_id,
            latency_ms = start.elapsed().as_millis() as i64,
            "payment.stk_push_sent"
        );
        Ok(ack)
    }
}

// ============ Callback ============

/// The parts of an STK callback the bot cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct StkCallback {
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub phone_number: Option<String>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

/// Parse `Body.stkCallback`; metadata items are looked up by name.
pub fn parse_stk_callback(payload: &Value) -> Option<StkCallback> {
    let cb = &payload["Body"]["stkCallback"];
    let result_code = cb["ResultCode"]
        .as_i64()
        .or_else(|| cb["ResultCode"].as_str().and_then(|s| s.parse().ok()))?;

    let phone_number = cb["CallbackMetadata"]["Item"]
        .as_array()
        .and_then(|items| items.iter().find(|item| item["Name"] == "PhoneNumber"))
        .and_then(|item| match &item["Value"] {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        });

    Some(StkCallback {
        checkout_request_id: cb["CheckoutRequestID"].as_str().unwrap_or_default().to_string(),
        result_code,
        result_desc: cb["ResultDesc"].as_str().unwrap_or_default().to_string(),
        phone_number,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    pub user_id: i64,
    pub phone: String,
    pub requested_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Granted { user_id: i64, expiry: f64 },
    Failed { user_id: i64, reason: String },
    /// No STK push from this process matches the checkout id.
    Unmatched { checkout_request_id: String },
}

/// Checkout request id -> requesting user, filled when an STK push is accepted.
#[derive(Debug, Default)]
pub struct PendingPayments {
    by_checkout: HashMap<String, PendingPayment>,
}

impl PendingPayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ack: &StkPushAck, user_id: i64, phone: &str) {
        self.record_at(ack, user_id, phone, chrono::Utc::now().timestamp());
    }

    pub fn record_at(&mut self, ack: &StkPushAck, user_id: i64, phone: &str, requested_at: i64) {
        self.by_checkout.insert(
            ack.checkout_request_id.clone(),
            PendingPayment {
                user_id,
                phone: phone.to_string(),
                requested_at,
            },
        );
    }

    /// Drop requests older than `ttl_secs` at `now`; their callbacks will
    /// come back unmatched. Returns how many were dropped.
    pub fn prune_expired(&mut self, now: i64, ttl_secs: i64) -> usize {
        let before = self.by_checkout.len();
        self.by_checkout.retain(|checkout_request_id, pending| {
            let keep = now - pending.requested_at < ttl_secs;
            if !keep {
                debug!(%checkout_request_id, user_id = pending.user_id, "payment.pending_expired");
            }
            keep
        });
        before - self.by_checkout.len()
    }

    pub fn get(&self, checkout_request_id: &str) -> Option<&PendingPayment> {
        self.by_checkout.get(checkout_request_id)
    }

    pub fn len(&self) -> usize {
        self.by_checkout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_checkout.is_empty()
    }

    /// Resolve a callback: grant `days` on success, drop the pending entry either way.
    pub fn confirm(
        &mut self,
        callback: &StkCallback,
        ledger: &mut AccessLedger,
        days: u32,
    ) -> Result<CallbackOutcome, LedgerError> {
        let Some(pending) = self.by_checkout.remove(&callback.checkout_request_id) else {
            warn!(checkout_request_id = %callback.checkout_request_id, "payment.callback_unmatched");
            return Ok(CallbackOutcome::Unmatched {
                checkout_request_id: callback.checkout_request_id.clone(),
            });
        };

        if !callback.is_success() {
            warn!(
                user_id = pending.user_id,
                result_code = callback.result_code,
                reason = %callback.result_desc,
                "payment.failed"
            );
            return Ok(CallbackOutcome::Failed {
                user_id: pending.user_id,
                reason: callback.result_desc.clone(),
            });
        }

        let expiry = ledger.grant(pending.user_id, days)?;
        info!(user_id = pending.user_id, phone = %pending.phone, "payment.confirmed");
        Ok(CallbackOutcome::Granted {
            user_id: pending.user_id,
            expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> PaymentConfig {
        PaymentConfig {
            shortcode: "174379".to_string(),
            passkey: "passkey".to_string(),
            callback_url: "https://example.com/mpesa/callback".to_string(),
            ..PaymentConfig::default()
        }
    }

    fn success_callback(checkout: &str) -> Value {
        json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {"Item": [
                    {"Name": "Amount", "Value": 200.0},
                    {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                    {"Name": "TransactionDate", "Value": 20191219102115u64},
                    {"Name": "PhoneNumber", "Value": 254708374149u64}
                ]}
            }}
        })
    }

    #[test]
    fn test_stk_password() {
        assert_eq!(stk_password("1", "2", "3"), BASE64.encode("123"));
    }

    #[test]
    fn test_build_stk_request_serializes_daraja_fields() {
        let request = build_stk_request(&config(), "254712345678", 200, "20240101120000");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["BusinessShortCode"], "174379");
        assert_eq!(value["PartyA"], "254712345678");
        assert_eq!(value["PartyB"], "174379");
        assert_eq!(value["Amount"], 200);
        assert_eq!(value["CallBackURL"], "https://example.com/mpesa/callback");
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
        assert_eq!(value["Password"], stk_password("174379", "passkey", "20240101120000"));
    }

    #[test]
    fn test_ack_from_success_response() {
        let data = json!({
            "MerchantRequestID": "1",
            "CheckoutRequestID": "ws_CO_1",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        });
        let ack = ack_from_response(&data).unwrap();
        assert_eq!(ack.checkout_request_id, "ws_CO_1");
    }

    #[test]
    fn test_ack_from_error_response() {
        let data = json!({"requestId": "x", "errorCode": "400.002.02", "errorMessage": "Bad Request - Invalid PhoneNumber"});
        let err = ack_from_response(&data).unwrap_err();
        assert_eq!(err.to_string(), "Bad Request - Invalid PhoneNumber");
    }

    #[test]
    fn test_parse_callback_finds_phone_by_name() {
        let callback = parse_stk_callback(&success_callback("ws_CO_9")).unwrap();
        assert!(callback.is_success());
        assert_eq!(callback.checkout_request_id, "ws_CO_9");
        assert_eq!(callback.phone_number.as_deref(), Some("254708374149"));
    }

    #[test]
    fn test_parse_cancelled_callback_without_metadata() {
        let payload = json!({"Body": {"stkCallback": {
            "CheckoutRequestID": "ws_CO_2", "ResultCode": 1032, "ResultDesc": "Request cancelled by user"
        }}});
        let callback = parse_stk_callback(&payload).unwrap();
        assert!(!callback.is_success());
        assert_eq!(callback.phone_number, None);
        assert!(parse_stk_callback(&json!({"Body": {}})).is_none());
    }

    #[test]
    fn test_confirm_grants_recorded_user() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = AccessLedger::with_system_clock(dir.path().join("paid_users.json"), 1);
        let mut pending = PendingPayments::new();
        let ack = StkPushAck {
            checkout_request_id: "ws_CO_9".to_string(),
            customer_message: String::new(),
        };
        pending.record(&ack, 555, "254708374149");

        let callback = parse_stk_callback(&success_callback("ws_CO_9")).unwrap();
        let outcome = pending.confirm(&callback, &mut ledger, 30).unwrap();

        assert!(matches!(outcome, CallbackOutcome::Granted { user_id: 555, .. }));
        assert!(ledger.has_access(555));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_confirm_failed_and_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = AccessLedger::with_system_clock(dir.path().join("paid_users.json"), 1);
        let mut pending = PendingPayments::new();
        let ack = StkPushAck {
            checkout_request_id: "ws_CO_2".to_string(),
            customer_message: String::new(),
        };
        pending.record(&ack, 8, "254700000000");

        let failed = StkCallback {
            checkout_request_id: "ws_CO_2".to_string(),
            result_code: 1032,
            result_desc: "Request cancelled by user".to_string(),
            phone_number: None,
        };
        let outcome = pending.confirm(&failed, &mut ledger, 30).unwrap();
        assert!(matches!(outcome, CallbackOutcome::Failed { user_id: 8, .. }));
        assert!(!ledger.has_access(8));

        let outcome = pending.confirm(&failed, &mut ledger, 30).unwrap();
        assert!(matches!(outcome, CallbackOutcome::Unmatched { .. }));
    }

    #[test]
    fn test_stale_requests_expire() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = AccessLedger::with_system_clock(dir.path().join("paid_users.json"), 1);
        let mut pending = PendingPayments::new();
        let ack = |id: &str| StkPushAck {
            checkout_request_id: id.to_string(),
            customer_message: String::new(),
        };
        pending.record_at(&ack("ws_CO_old"), 11, "254700000001", 1_000);
        pending.record_at(&ack("ws_CO_new"), 12, "254700000002", 2_500);

        assert_eq!(pending.prune_expired(2_800, 1_800), 1);
        assert!(pending.get("ws_CO_old").is_none());
        assert_eq!(pending.get("ws_CO_new").map(|p| p.user_id), Some(12));

        let late = parse_stk_callback(&success_callback("ws_CO_old")).unwrap();
        let outcome = pending.confirm(&late, &mut ledger, 30).unwrap();
        assert!(matches!(outcome, CallbackOutcome::Unmatched { .. }));
        assert!(!ledger.has_access(11));

        assert_eq!(pending.prune_expired(4_300, 1_800), 1);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_short_circuits() {
        let client = MpesaClient::new(PaymentConfig::default());
        let err = client.request_payment("254712345678", 200).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingCredentials));
    }
}
