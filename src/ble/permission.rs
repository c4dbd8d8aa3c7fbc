//! Bluetooth permission gate.
//!
//! Mobile platforms require a runtime grant before any GATT operation.
//! Desktop stacks grant access at the OS level, so [`AlwaysGranted`] is the
//! default there.

use async_trait::async_trait;

/// Source of the platform's Bluetooth connect permission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Check if the permission is currently held.
    fn has_permission(&self) -> bool;

    /// Ask the user for the permission. Resolves to whether it was granted.
    async fn request_permission(&self) -> bool;
}

/// Gate for platforms without runtime Bluetooth permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    fn has_permission(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> bool {
        true
    }
}
