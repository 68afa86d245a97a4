//! Process-wide switch for real model requests.
//!
//! Test suites turn requests off so nothing reaches a paid API by accident.
//! Every network-backed model checks the gate before sending; the in-process
//! [`TestModel`](crate::llm::TestModel) ignores it.

use crate::llm::error::ModelError;
use std::sync::atomic::{AtomicBool, Ordering};

static ALLOW_MODEL_REQUESTS: AtomicBool = AtomicBool::new(true);

/// Returns whether real model requests are currently allowed.
#[must_use]
pub fn model_requests_allowed() -> bool {
    ALLOW_MODEL_REQUESTS.load(Ordering::SeqCst)
}

/// Sets whether real model requests are allowed, returning the previous value.
pub fn set_allow_model_requests(allow: bool) -> bool {
    ALLOW_MODEL_REQUESTS.swap(allow, Ordering::SeqCst)
}

/// Fails if real model requests are disabled.
///
/// # Errors
///
/// Returns `RequestsDisabled` when the gate is off.
pub fn check_allow_model_requests() -> Result<(), ModelError> {
    if model_requests_allowed() {
        Ok(())
    } else {
        Err(ModelError::requests_disabled())
    }
}

/// Restores the previous gate value when dropped.
#[derive(Debug)]
#[must_use = "the override ends when the guard is dropped"]
pub struct AllowRequestsGuard {
    previous: bool,
}

impl Drop for AllowRequestsGuard {
    fn drop(&mut self) {
        ALLOW_MODEL_REQUESTS.store(self.previous, Ordering::SeqCst);
        tracing::trace!(allow = self.previous, "model request gate restored");
    }
}

/// Overrides the gate until the returned guard is dropped.
///
/// Guards nest: each restores the value that was current when it was created,
/// including when the scope unwinds.
pub fn override_allow_model_requests(allow: bool) -> AllowRequestsGuard {
    let previous = set_allow_model_requests(allow);
    tracing::trace!(allow, previous, "model request gate overridden");
    AllowRequestsGuard { previous }
}

#[cfg(test)]
pub(crate) static GATE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) fn lock_gate() -> std::sync::MutexGuard<'static, ()> {
    GATE_TEST_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_by_default() {
        let _lock = lock_gate();
        assert!(model_requests_allowed());
        assert!(check_allow_model_requests().is_ok());
    }

    #[test]
    fn override_disables_and_restores() {
        let _lock = lock_gate();
        {
            let _guard = override_allow_model_requests(false);
            let error = check_allow_model_requests().unwrap_err();
            assert!(error.is_requests_disabled());
        }
        assert!(check_allow_model_requests().is_ok());
    }

    #[test]
    fn nested_overrides_restore_in_order() {
        let _lock = lock_gate();
        let outer = override_allow_model_requests(false);
        {
            let _inner = override_allow_model_requests(true);
            assert!(model_requests_allowed());
        }
        assert!(!model_requests_allowed());
        drop(outer);
        assert!(model_requests_allowed());
    }

    #[test]
    fn override_restores_on_panic() {
        let _lock = lock_gate();
        let result = std::panic::catch_unwind(|| {
            let _guard = override_allow_model_requests(false);
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(model_requests_allowed());
    }
}
