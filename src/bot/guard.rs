// Access Guards
// Pass/deny decision composed in front of every command handler

use crate::services::access_ledger::AccessLedger;

pub const NO_ACCESS_MESSAGE: &str = "🚫 You do not have active access. Use /pay to purchase.";
pub const ADMIN_ONLY_MESSAGE: &str = "⛔ Only admin can use this command.";

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    Subscriber,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Pass,
    Deny(&'static str),
}

impl GuardDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, GuardDecision::Pass)
    }
}

pub fn guard(gate: Gate, user_id: i64, ledger: &AccessLedger) -> GuardDecision {
    match gate {
        Gate::Open => GuardDecision::Pass,
        Gate::Subscriber if ledger.has_access(user_id) => GuardDecision::Pass,
        Gate::Subscriber => GuardDecision::Deny(NO_ACCESS_MESSAGE),
        Gate::Admin if ledger.is_admin(user_id) => GuardDecision::Pass,
        Gate::Admin => GuardDecision::Deny(ADMIN_ONLY_MESSAGE),
    }
}
