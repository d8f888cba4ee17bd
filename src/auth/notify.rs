//! Observability hooks fired after sign-in and sign-out.

use tracing::info;

use super::store::Principal;

/// Receives auth events. Calls happen after the state change is persisted;
/// implementations must not fail the request.
pub trait AuthNotifier: Send + Sync {
    fn authenticated(&self, principal: &Principal);

    fn signed_out(&self, _principal: &Principal) {}
}

/// Emits the events as structured log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl AuthNotifier for TracingNotifier {
    fn authenticated(&self, principal: &Principal) {
        info!(principal_id = %principal.id, "Authenticated");
    }

    fn signed_out(&self, principal: &Principal) {
        info!(principal_id = %principal.id, "Signed out");
    }
}
