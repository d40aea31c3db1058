//! Explicit guard for destructive operations.
//!
//! Destructive entry points take a [`SafetyGate`] value rather than consulting
//! ambient state, so a caller can never reach a destructive code path without
//! having decided the question at the call site.

/// Whether destructive operations are permitted for this invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SafetyGate {
    /// Destructive operations may proceed.
    Open,
    /// Destructive operations must be refused.
    SafeMode,
}

impl SafetyGate {
    /// Returns `true` when destructive operations may proceed.
    #[must_use]
    pub const fn allows_destructive(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Maps an explicit opt-in flag (for example a `--unsafe-mode` CLI
    /// switch) onto a gate value. The default is [`SafetyGate::SafeMode`].
    #[must_use]
    pub const fn from_unsafe_flag(unsafe_mode: bool) -> Self {
        if unsafe_mode { Self::Open } else { Self::SafeMode }
    }
}
