use anyhow::Context;
use sagebot_lib::services::access_ledger::AccessLedger;
use sagebot_lib::services::payment::{parse_stk_callback, CallbackOutcome, PendingPayments, StkPushAck};
use std::path::PathBuf;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1].starts_with("--") {
        eprintln!(
            "Usage:\n  cargo run --bin simulate_callback -- <callback.json> --user <user_id> [--days <n>] [--ledger <paid_users.json>]\n\nApplies a Daraja STK callback body to the access ledger as if the push had been sent for <user_id>."
        );
        return Ok(());
    }

    let (config, _) = sagebot_lib::load_config()?;

    let callback_path = PathBuf::from(&args[1]);
    let user_id: i64 = parse_arg_value(&args, "--user")
        .context("--user <user_id> is required")?
        .parse()
        .context("--user must be an integer")?;
    let days: u32 = match parse_arg_value(&args, "--days") {
        Some(d) => d.parse().context("--days must be a non-negative integer")?,
        None => config.payment.access_days,
    };
    let ledger_path = parse_arg_value(&args, "--ledger")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.paths.ledger_file.clone());

    let raw = std::fs::read_to_string(&callback_path)
        .with_context(|| format!("reading {}", callback_path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&raw).context("callback is not valid JSON")?;
    let callback = parse_stk_callback(&payload).context("missing Body.stkCallback.ResultCode")?;

    println!("CheckoutRequestID: {}", callback.checkout_request_id);
    println!("ResultCode: {} ({})", callback.result_code, callback.result_desc);
    if let Some(phone) = &callback.phone_number {
        println!("PhoneNumber: {}", phone);
    }

    let mut ledger = AccessLedger::with_system_clock(&ledger_path, config.admin_user_id);
    let mut pending = PendingPayments::new();
    let ack = StkPushAck {
        checkout_request_id: callback.checkout_request_id.clone(),
        customer_message: String::new(),
    };
    pending.record(&ack, user_id, callback.phone_number.as_deref().unwrap_or_default());

    match pending.confirm(&callback, &mut ledger, days)? {
        CallbackOutcome::Granted { user_id, expiry } => {
            let until = chrono::DateTime::from_timestamp(expiry as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| expiry.to_string());
            println!("Granted {} days to {} (until {})", days, user_id, until);
        }
        CallbackOutcome::Failed { user_id, reason } => {
            println!("Payment for {} failed: {}", user_id, reason);
        }
        CallbackOutcome::Unmatched { checkout_request_id } => {
            println!("No pending payment for {}", checkout_request_id);
        }
    }
    println!("Ledger: {}", ledger.path().display());
    Ok(())
}
