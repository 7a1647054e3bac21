use tracing::{info, warn};

/// Session lifecycle events, emitted on the `audit` target.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn login_succeeded(&self, email: &str) {
        info!(target: "audit", event = "login_succeeded", email);
    }

    pub fn login_failed(&self, status: u16, reason: &str) {
        warn!(target: "audit", event = "login_failed", status, reason);
    }

    pub fn auth_expired(&self, path: &str, request_id: &str) {
        info!(target: "audit", event = "auth_expired", path, request_id);
    }

    pub fn session_renewed(&self, email: &str, generation: u64) {
        info!(target: "audit", event = "session_renewed", email, generation);
    }

    pub fn renewal_coalesced(&self, path: &str, generation: u64) {
        info!(target: "audit", event = "renewal_coalesced", path, generation);
    }

    pub fn renewal_failed(&self, path: &str, status: u16, reason: &str, session_age_secs: u64) {
        warn!(target: "audit", event = "renewal_failed", path, status, reason, session_age_secs);
    }

    pub fn logged_out(&self, email: Option<&str>) {
        info!(target: "audit", event = "logged_out", email = email.unwrap_or(""));
    }

    pub fn logout_call_failed(&self, reason: &str) {
        warn!(target: "audit", event = "logout_call_failed", reason);
    }
}
