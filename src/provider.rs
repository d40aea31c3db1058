//! Cloud vendor capability abstraction.
//!
//! Engines talk to vendors exclusively through [`CloudProvider`]; concrete
//! REST clients live outside this crate and are injected by callers. A
//! [`NullProvider`] ships for fleets registered by hand, where no vendor
//! API is wired at all.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Vendor-reported lifecycle state of a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerStatus {
    /// Still being created or booted.
    Provisioning,
    /// Up and reachable as far as the vendor knows.
    Running,
    /// Deliberately powered off.
    Stopped,
    /// Any state this crate has no mapping for.
    Unknown,
}

/// Parameters required to create a new server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateServerRequest {
    /// Server name registered with the vendor.
    pub name: String,
    /// Vendor region identifier.
    pub region: String,
    /// Vendor size or plan identifier.
    pub size: String,
    /// Optional first-boot script handed to the vendor.
    pub user_data: Option<String>,
    /// Optional vendor-side SSH key identifier to install.
    pub ssh_key_id: Option<String>,
}

impl CreateServerRequest {
    /// Starts a builder for a [`CreateServerRequest`].
    #[must_use]
    pub fn builder() -> CreateServerRequestBuilder {
        CreateServerRequestBuilder::default()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.name.is_empty() {
            return Err(ProviderError::Validation(String::from("name")));
        }
        if self.region.is_empty() {
            return Err(ProviderError::Validation(String::from("region")));
        }
        if self.size.is_empty() {
            return Err(ProviderError::Validation(String::from("size")));
        }
        Ok(())
    }
}

/// Builder for [`CreateServerRequest`] that defers trimming and validation
/// to construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreateServerRequestBuilder {
    name: String,
    region: String,
    size: String,
    user_data: Option<String>,
    ssh_key_id: Option<String>,
}

impl CreateServerRequestBuilder {
    /// Sets the server name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Sets the size.
    #[must_use]
    pub fn size(mut self, value: impl Into<String>) -> Self {
        self.size = value.into();
        self
    }

    /// Sets the optional first-boot script.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Sets the optional SSH key identifier.
    #[must_use]
    pub fn ssh_key_id(mut self, value: Option<String>) -> Self {
        self.ssh_key_id = value;
        self
    }

    /// Builds and validates the request, trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when a required field is empty.
    pub fn build(self) -> Result<CreateServerRequest, ProviderError> {
        let request = CreateServerRequest {
            name: self.name.trim().to_owned(),
            region: self.region.trim().to_owned(),
            size: self.size.trim().to_owned(),
            user_data: self.user_data,
            ssh_key_id: self.ssh_key_id.map(|value| value.trim().to_owned()),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Identity and address of a freshly created server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedServer {
    /// Vendor-assigned server identifier.
    pub id: String,
    /// Public IPv4 address, or [`crate::record::PENDING_IP`] when the
    /// vendor has not assigned one yet.
    pub ip: String,
}

/// Point-in-time details for an existing server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerDetails {
    /// Vendor-assigned server identifier.
    pub id: String,
    /// Current lifecycle state.
    pub status: ServerStatus,
    /// Public IPv4 address, when assigned.
    pub ip: Option<String>,
}

/// One vendor-side snapshot of a server's disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotInfo {
    /// Vendor-assigned snapshot identifier.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Creation time, when the vendor reports one.
    pub created_at: Option<DateTime<Utc>>,
}

/// Errors raised while building provider requests, and by the
/// [`NullProvider`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised for every API operation on a manually registered fleet.
    #[error("operation {operation} requires a vendor API, none is configured")]
    Unsupported {
        /// Operation that was attempted.
        operation: &'static str,
    },
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud vendor clients.
pub trait CloudProvider {
    /// Vendor-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Confirms the configured API token is accepted by the vendor.
    fn validate_token<'a>(&'a self) -> ProviderFuture<'a, (), Self::Error>;

    /// Creates a new server and returns its identity and address.
    fn create_server<'a>(
        &'a self,
        request: &'a CreateServerRequest,
    ) -> ProviderFuture<'a, CreatedServer, Self::Error>;

    /// Returns the vendor-reported lifecycle state of a server.
    fn server_status<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ServerStatus, Self::Error>;

    /// Returns point-in-time details for a server.
    fn server_details<'a>(&'a self, id: &'a str)
    -> ProviderFuture<'a, ServerDetails, Self::Error>;

    /// Requests a reboot of a server.
    fn reboot_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Destroys a server and releases its resources.
    fn destroy_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Registers a public key with the vendor; returns the vendor key ID.
    fn upload_ssh_key<'a>(
        &'a self,
        label: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String, Self::Error>;

    /// Creates a disk snapshot of a server.
    fn create_snapshot<'a>(
        &'a self,
        id: &'a str,
        label: &'a str,
    ) -> ProviderFuture<'a, SnapshotInfo, Self::Error>;

    /// Lists the snapshots existing for a server.
    fn list_snapshots<'a>(
        &'a self,
        id: &'a str,
    ) -> ProviderFuture<'a, Vec<SnapshotInfo>, Self::Error>;

    /// Deletes a snapshot. Destructive; callers own confirmation.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ProviderFuture<'a, (), Self::Error>;
}

/// Provider for fleets with no vendor API configured.
///
/// Every operation fails with [`ProviderError::Unsupported`]. Engines skip
/// vendor phases for manually registered servers, so in practice these
/// errors only surface when a caller wires the wrong provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProvider;

impl NullProvider {
    fn unsupported<'a, T>(operation: &'static str) -> ProviderFuture<'a, T, ProviderError>
    where
        T: Send + 'a,
    {
        Box::pin(async move { Err(ProviderError::Unsupported { operation }) })
    }
}

impl CloudProvider for NullProvider {
    type Error = ProviderError;

    fn validate_token<'a>(&'a self) -> ProviderFuture<'a, (), Self::Error> {
        Self::unsupported("validate_token")
    }

    fn create_server<'a>(
        &'a self,
        _request: &'a CreateServerRequest,
    ) -> ProviderFuture<'a, CreatedServer, Self::Error> {
        Self::unsupported("create_server")
    }

    fn server_status<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, ServerStatus, Self::Error> {
        Self::unsupported("server_status")
    }

    fn server_details<'a>(
        &'a self,
        _id: &'a str,
    ) -> ProviderFuture<'a, ServerDetails, Self::Error> {
        Self::unsupported("server_details")
    }

    fn reboot_server<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Self::unsupported("reboot_server")
    }

    fn destroy_server<'a>(&'a self, _id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Self::unsupported("destroy_server")
    }

    fn upload_ssh_key<'a>(
        &'a self,
        _label: &'a str,
        _public_key: &'a str,
    ) -> ProviderFuture<'a, String, Self::Error> {
        Self::unsupported("upload_ssh_key")
    }

    fn create_snapshot<'a>(
        &'a self,
        _id: &'a str,
        _label: &'a str,
    ) -> ProviderFuture<'a, SnapshotInfo, Self::Error> {
        Self::unsupported("create_snapshot")
    }

    fn list_snapshots<'a>(
        &'a self,
        _id: &'a str,
    ) -> ProviderFuture<'a, Vec<SnapshotInfo>, Self::Error> {
        Self::unsupported("list_snapshots")
    }

    fn delete_snapshot<'a>(&'a self, _snapshot_id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Self::unsupported("delete_snapshot")
    }
}
