//! Self-healing trigger policy.
//!
//! Deciding whether a failed permission check is worth a resync is pure policy:
//! no IO, no knowledge of the transport. Error types opt in through
//! [`StaleMetadataSignal`].

/// Classifies an authorization-service error as a symptom of stale metadata.
pub trait StaleMetadataSignal {
    /// `true` when the service reported an unknown scope or missing resource,
    /// i.e. the remote copy has drifted from what the domain expects.
    fn signals_stale_metadata(&self) -> bool;
}

impl<T: StaleMetadataSignal + ?Sized> StaleMetadataSignal for &T {
    fn signals_stale_metadata(&self) -> bool {
        (**self).signals_stale_metadata()
    }
}

/// Decide whether a permission-check result should trigger a resource resync.
///
/// - A granted check never triggers, whatever the error.
/// - A clean denial (no error) triggers.
/// - A denial with an error triggers only when the error signals stale metadata;
///   transport failures do not.
pub fn should_trigger_self_healing<E>(has_permission: bool, err: Option<&E>) -> bool
where
    E: StaleMetadataSignal + ?Sized,
{
    if has_permission {
        return false;
    }

    match err {
        None => true,
        Some(e) => e.signals_stale_metadata(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Error modeled on the OAuth error strings the service returns.
    struct RemoteError(&'static str);

    impl StaleMetadataSignal for RemoteError {
        fn signals_stale_metadata(&self) -> bool {
            self.0.starts_with("invalid_scope") || self.0.starts_with("invalid_resource")
        }
    }

    #[test]
    fn granted_never_heals() {
        assert!(!should_trigger_self_healing::<RemoteError>(true, None));
        assert!(!should_trigger_self_healing(true, Some(&RemoteError("invalid_scope: x"))));
        assert!(!should_trigger_self_healing(true, Some(&RemoteError("connection refused"))));
    }

    #[test]
    fn clean_denial_heals() {
        assert!(should_trigger_self_healing::<RemoteError>(false, None));
    }

    #[test]
    fn stale_metadata_errors_heal_transport_errors_do_not() {
        assert!(should_trigger_self_healing(
            false,
            Some(&RemoteError("invalid_scope: run-backtest"))
        ));
        assert!(should_trigger_self_healing(false, Some(&RemoteError("invalid_resource"))));
        assert!(!should_trigger_self_healing(false, Some(&RemoteError("connection refused"))));
    }
}
