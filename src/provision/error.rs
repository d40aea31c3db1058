//! Structured provisioning failures with remediation hints.

use thiserror::Error;

use crate::record::RecordStoreError;

use super::placement;

/// Errors raised by the provisioning pipeline.
///
/// Each variant corresponds to one pipeline stage; [`ProvisionError::hint`]
/// returns operator guidance where a concrete next action exists.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Raised when the requested vendor is not in the catalogue.
    #[error("unsupported vendor: {vendor}")]
    UnsupportedVendor {
        /// Vendor name as requested.
        vendor: String,
    },
    /// Raised when the server name fails syntax validation.
    #[error("invalid server name {name:?}: {reason}")]
    InvalidName {
        /// Name as requested.
        name: String,
        /// Which syntax rule was broken.
        reason: &'static str,
    },
    /// Raised when neither explicit values nor a template produce a
    /// region and size.
    #[error("no region and size resolved for vendor {vendor}")]
    UnresolvedPlacement {
        /// Vendor the placement was attempted at.
        vendor: String,
    },
    /// Raised when the vendor token variable is unset or blank.
    #[error("no API token found for {vendor}")]
    MissingToken {
        /// Vendor needing the token.
        vendor: String,
        /// Environment variable that was consulted.
        env_var: &'static str,
    },
    /// Raised when the vendor refuses the configured token.
    #[error("vendor rejected the API token: {message}")]
    TokenRejected {
        /// Environment variable the token came from.
        env_var: &'static str,
        /// Vendor-reported reason.
        message: String,
    },
    /// Raised when a vendor API call fails mid-pipeline.
    #[error("vendor call {operation} failed: {message}")]
    Vendor {
        /// Provider operation that failed.
        operation: &'static str,
        /// Vendor-reported reason.
        message: String,
    },
    /// Raised when the new server never reports a running status.
    #[error("server did not boot in time after {attempts} status checks")]
    BootTimeout {
        /// Status poll attempts that were made.
        attempts: u32,
    },
    /// Raised when persisting the new record fails.
    #[error(transparent)]
    Store(#[from] RecordStoreError),
}

impl ProvisionError {
    /// Remediation hint for the operator, when one exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnsupportedVendor { .. } => Some(format!(
                "supported vendors: {}",
                placement::vendor_names().join(", ")
            )),
            Self::InvalidName { .. } => Some(String::from(
                "use 3 to 63 characters: a lowercase letter, then lowercase letters, digits, or hyphens",
            )),
            Self::UnresolvedPlacement { .. } => Some(String::from(
                "pass an explicit region and size, or name a known template",
            )),
            Self::MissingToken { env_var, .. } => Some(format!("set {env_var}")),
            Self::TokenRejected { env_var, .. } => {
                Some(format!("check the token in {env_var}"))
            }
            Self::BootTimeout { .. } => Some(String::from(
                "check the vendor console; the server may still be booting",
            )),
            Self::Vendor { .. } | Self::Store(_) => None,
        }
    }
}
