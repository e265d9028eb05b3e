//! Host camera permission service.

use std::sync::{Mutex, PoisonError};

/// Authorization state for camera access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// Access allowed.
    Granted,
    /// The user has not been asked yet.
    NotDetermined,
    /// Access refused; asking again will not change it.
    Denied,
}

/// Callback invoked once when a permission request resolves.
pub type PermissionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Host permission service.
pub trait PermissionService: Send + Sync {
    /// Current authorization, without prompting.
    fn check(&self) -> PermissionStatus;

    /// Asks the user for access. `callback` may run on any thread, at any
    /// later time, or never.
    fn request(&self, callback: PermissionCallback);
}

/// Permission service with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissions {
    status: PermissionStatus,
}

impl StaticPermissions {
    /// Always grants access.
    pub fn granted() -> Self {
        Self {
            status: PermissionStatus::Granted,
        }
    }

    /// Always denies access.
    pub fn denied() -> Self {
        Self {
            status: PermissionStatus::Denied,
        }
    }
}

impl PermissionService for StaticPermissions {
    fn check(&self) -> PermissionStatus {
        self.status
    }

    fn request(&self, callback: PermissionCallback) {
        callback(self.status == PermissionStatus::Granted);
    }
}

/// Permission service whose requests stay pending until resolved by hand.
///
/// Stands in for a host prompt: `resolve` plays the part of the user
/// answering the dialog.
pub struct DeferredPermissions {
    state: Mutex<DeferredState>,
}

struct DeferredState {
    status: PermissionStatus,
    pending: Vec<PermissionCallback>,
}

impl DeferredPermissions {
    /// Starts undetermined with no pending requests.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeferredState {
                status: PermissionStatus::NotDetermined,
                pending: Vec::new(),
            }),
        }
    }

    /// Number of requests waiting for an answer.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }

    /// Records the user's answer and runs every pending callback.
    pub fn resolve(&self, granted: bool) {
        let callbacks = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.status = if granted {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };
            std::mem::take(&mut state.pending)
        };

        tracing::info!(granted, callbacks = callbacks.len(), "Camera permission resolved");
        for callback in callbacks {
            callback(granted);
        }
    }
}

impl Default for DeferredPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionService for DeferredPermissions {
    fn check(&self) -> PermissionStatus {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    fn request(&self, callback: PermissionCallback) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.status {
            PermissionStatus::NotDetermined => state.pending.push(callback),
            status => {
                drop(state);
                callback(status == PermissionStatus::Granted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_deferred_request_waits_for_resolve() {
        let permissions = DeferredPermissions::new();
        let answered = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&answered);
        permissions.request(Box::new(move |granted| flag.store(granted, Ordering::SeqCst)));

        assert_eq!(permissions.check(), PermissionStatus::NotDetermined);
        assert_eq!(permissions.pending(), 1);
        assert!(!answered.load(Ordering::SeqCst));

        permissions.resolve(true);
        assert_eq!(permissions.check(), PermissionStatus::Granted);
        assert_eq!(permissions.pending(), 0);
        assert!(answered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_static_denied() {
        let permissions = StaticPermissions::denied();
        assert_eq!(permissions.check(), PermissionStatus::Denied);
        permissions.request(Box::new(|granted| assert!(!granted)));
    }
}
