// Session State
// Per-user analysis results and the payment form state machine

use std::collections::HashMap;

use crate::models::AnalysisSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentStep {
    #[default]
    Idle,
    AwaitingPhone,
    Done,
}

#[derive(Debug, Default)]
pub struct UserSession {
    pub analysis: Option<AnalysisSession>,
    pub payment: PaymentStep,
}

/// In-memory only; lost on restart.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<i64, UserSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: i64) -> Option<&UserSession> {
        self.sessions.get(&user_id)
    }

    fn entry(&mut self, user_id: i64) -> &mut UserSession {
        self.sessions.entry(user_id).or_default()
    }

    pub fn analysis(&self, user_id: i64) -> Option<&AnalysisSession> {
        self.get(user_id).and_then(|s| s.analysis.as_ref())
    }

    /// Replaces any earlier analysis for the user.
    pub fn store_analysis(&mut self, user_id: i64, analysis: AnalysisSession) {
        self.entry(user_id).analysis = Some(analysis);
    }

    pub fn payment_step(&self, user_id: i64) -> PaymentStep {
        self.get(user_id).map(|s| s.payment).unwrap_or_default()
    }

    pub fn set_payment_step(&mut self, user_id: i64, step: PaymentStep) {
        self.entry(user_id).payment = step;
    }
}

/// `254` followed by nine digits.
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 12 && phone.starts_with("254") && phone.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::report::tests::sample_session;

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("254712345678"));
        assert!(!is_valid_phone("0712345678"));
        assert!(!is_valid_phone("25471234567"));
        assert!(!is_valid_phone("2547123456789"));
        assert!(!is_valid_phone("25471234567a"));
        assert!(!is_valid_phone("+25471234567"));
    }

    #[test]
    fn test_payment_step_defaults_to_idle() {
        let mut store = SessionStore::new();
        assert_eq!(store.payment_step(1), PaymentStep::Idle);

        store.set_payment_step(1, PaymentStep::AwaitingPhone);
        assert_eq!(store.payment_step(1), PaymentStep::AwaitingPhone);
        assert_eq!(store.payment_step(2), PaymentStep::Idle);
    }

    #[test]
    fn test_analysis_is_overwritten_per_user() {
        let mut store = SessionStore::new();
        assert!(store.analysis(1).is_none());

        let first = sample_session();
        let mut second = sample_session();
        second.file_name = "second.txt".to_string();

        store.store_analysis(1, first);
        store.store_analysis(1, second);
        assert_eq!(store.analysis(1).unwrap().file_name, "second.txt");
        assert!(store.analysis(2).is_none());
    }

    #[test]
    fn test_payment_step_survives_new_analysis() {
        let mut store = SessionStore::new();
        store.set_payment_step(1, PaymentStep::AwaitingPhone);
        store.store_analysis(1, sample_session());
        assert_eq!(store.payment_step(1), PaymentStep::AwaitingPhone);
    }
}
