//! Provisioning workflow.
//!
//! [`Provisioner`] drives a strictly ordered pipeline: validate the vendor
//! and server name, resolve placement, read and validate the API token,
//! best-effort SSH key upload, create the server, wait for it to boot, and
//! persist the resulting record. Failures before server creation leave the
//! vendor account untouched. A vendor that has not assigned an address when
//! the poll budget runs out still counts as success; the record keeps the
//! pending sentinel and the outcome carries a hint.

pub mod config;
pub mod error;
pub mod placement;

use std::process::Command;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::validate_ipv4;
use crate::probe;
use crate::provider::{CloudProvider, CreateServerRequest, CreatedServer};
use crate::record::{PENDING_IP, RecordStore, ServerIdentity, ServerMode, ServerRecord};
use crate::util::expand_tilde;

pub use config::{ProvisionConfig, ProvisionConfigLoadError};
pub use error::ProvisionError;
pub use placement::VendorProfile;

/// Caller-facing parameters for one provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Vendor to place the server at.
    pub vendor: String,
    /// Server name; also names the backup namespace.
    pub name: String,
    /// Operating mode the server will run in.
    pub mode: ServerMode,
    /// Optional template naming per-vendor placement defaults.
    pub template: Option<String>,
    /// Explicit region, winning over the template.
    pub region: Option<String>,
    /// Explicit size, winning over the template.
    pub size: Option<String>,
}

/// Successful provisioning outcome.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Provisioned {
    /// Persisted record for the new server.
    pub record: ServerRecord,
    /// Operator guidance when follow-up is needed, such as a pending IP.
    pub hint: Option<String>,
}

/// First-boot scripts handed to the vendor, selected by mode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapScripts {
    /// Script installing the container platform stack.
    pub managed: String,
    /// Script preparing a bare host.
    pub bare: String,
}

impl BootstrapScripts {
    /// Creates a script pair.
    #[must_use]
    pub const fn new(managed: String, bare: String) -> Self {
        Self { managed, bare }
    }

    /// Returns the script for a mode.
    #[must_use]
    pub fn select(&self, mode: ServerMode) -> &str {
        match mode {
            ServerMode::Managed => &self.managed,
            ServerMode::Bare => &self.bare,
        }
    }
}

/// Builds a vendor client once the vendor and token have validated.
///
/// Concrete REST clients live outside this crate; the provisioner takes a
/// factory rather than a single provider because the vendor is not known
/// until the request has passed validation.
pub trait ProviderFactory {
    /// Provider type produced for a vendor.
    type Provider: CloudProvider;

    /// Returns a client for `vendor` bound to the API token.
    fn provider(&self, vendor: &VendorProfile, token: &str) -> Self::Provider;
}

/// A local SSH public key ready for vendor upload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshPublicKey {
    /// Key material in OpenSSH one-line format.
    pub material: String,
}

/// Supplies the public key provisioning registers with the vendor.
///
/// Key setup is best-effort throughout: a source that returns `None` leaves
/// provisioning to continue key-less, and implementations may generate a
/// key when none exists.
pub trait SshKeySource {
    /// Returns a local public key, when one can be found or made.
    fn public_key(&self) -> Option<SshPublicKey>;
}

/// Reads the user's OpenSSH public keys, generating a fresh ed25519 pair
/// when the directory holds none and a keygen binary is configured.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalKeySource {
    ssh_dir: Utf8PathBuf,
    keygen_bin: Option<String>,
}

impl LocalKeySource {
    const KEY_CANDIDATES: [&'static str; 3] = ["id_ed25519.pub", "id_ecdsa.pub", "id_rsa.pub"];

    /// Creates a source over an explicit key directory.
    #[must_use]
    pub const fn new(ssh_dir: Utf8PathBuf, keygen_bin: Option<String>) -> Self {
        Self {
            ssh_dir,
            keygen_bin,
        }
    }

    /// Creates a source over `~/.ssh` with the system `ssh-keygen`.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(
            Utf8PathBuf::from(expand_tilde("~/.ssh")),
            Some(String::from("ssh-keygen")),
        )
    }

    fn read_existing(&self) -> Option<SshPublicKey> {
        Self::KEY_CANDIDATES.iter().find_map(|candidate| {
            let path = self.ssh_dir.join(candidate);
            std::fs::read_to_string(path.as_std_path())
                .ok()
                .map(|material| SshPublicKey {
                    material: material.trim().to_owned(),
                })
                .filter(|key| !key.material.is_empty())
        })
    }

    fn generate(&self) -> Option<SshPublicKey> {
        let keygen = self.keygen_bin.as_deref()?;
        let private_key = self.ssh_dir.join("id_ed25519");
        debug!(path = %private_key, "no local public key found; generating one");
        let status = Command::new(keygen)
            .args(["-q", "-t", "ed25519", "-N", ""])
            .arg("-f")
            .arg(private_key.as_std_path())
            .status()
            .ok()?;
        if !status.success() {
            return None;
        }
        self.read_existing()
    }
}

impl SshKeySource for LocalKeySource {
    fn public_key(&self) -> Option<SshPublicKey> {
        self.read_existing().or_else(|| self.generate())
    }
}

/// Drives the staged provisioning pipeline.
#[derive(Clone, Debug)]
pub struct Provisioner<F, K, S>
where
    F: ProviderFactory,
    K: SshKeySource,
    S: RecordStore,
{
    factory: F,
    keys: K,
    store: S,
    scripts: BootstrapScripts,
    config: ProvisionConfig,
    ip_poll_interval: Option<Duration>,
}

impl<F, K, S> Provisioner<F, K, S>
where
    F: ProviderFactory,
    K: SshKeySource,
    S: RecordStore,
{
    /// Creates a provisioner from its collaborators.
    #[must_use]
    pub const fn new(
        factory: F,
        keys: K,
        store: S,
        scripts: BootstrapScripts,
        config: ProvisionConfig,
    ) -> Self {
        Self {
            factory,
            keys,
            store,
            scripts,
            config,
            ip_poll_interval: None,
        }
    }

    /// Overrides the vendor's pending-IP poll interval.
    ///
    /// This is primarily used by tests to keep poll scenarios fast.
    #[must_use]
    pub const fn with_ip_poll_interval(mut self, interval: Duration) -> Self {
        self.ip_poll_interval = Some(interval);
        self
    }

    /// Provisions one server and persists its record.
    ///
    /// A vendor that never assigns an address within the poll budget is not
    /// a failure: the record is stored with the pending sentinel and the
    /// outcome carries a hint instead.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when validation fails, the vendor refuses
    /// a call, the server does not boot in time, or the record cannot be
    /// persisted.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Provisioned, ProvisionError> {
        let profile = placement::vendor_profile(&request.vendor).ok_or_else(|| {
            ProvisionError::UnsupportedVendor {
                vendor: request.vendor.clone(),
            }
        })?;
        validate_server_name(&request.name)?;
        let (region, size) = resolve_placement(profile, request)?;
        let token = read_token(profile)?;
        info!(
            server = %request.name,
            vendor = profile.name,
            %region,
            %size,
            "provisioning server"
        );

        let provider = self.factory.provider(profile, &token);
        provider
            .validate_token()
            .await
            .map_err(|err| ProvisionError::TokenRejected {
                env_var: profile.token_env,
                message: err.to_string(),
            })?;

        let ssh_key_id = self.upload_key(&provider).await;
        let user_data = self.scripts.select(request.mode).to_owned();
        let create = CreateServerRequest::builder()
            .name(&request.name)
            .region(region)
            .size(size)
            .user_data(Some(user_data))
            .ssh_key_id(ssh_key_id)
            .build()
            .map_err(|err| ProvisionError::Vendor {
                operation: "create_server",
                message: err.to_string(),
            })?;
        let created =
            provider
                .create_server(&create)
                .await
                .map_err(|err| ProvisionError::Vendor {
                    operation: "create_server",
                    message: err.to_string(),
                })?;

        self.wait_for_boot(&provider, &created.id).await?;
        let (ip, hint) = self.resolve_ip(&provider, profile, &created).await;

        let record = ServerRecord {
            identity: ServerIdentity::Vendor(created.id),
            name: create.name.clone(),
            provider: profile.name.to_owned(),
            ip,
            region: create.region.clone(),
            size: create.size.clone(),
            created_at: Utc::now(),
            mode: request.mode,
        };
        self.store.save(&record)?;
        info!(server = %record.name, ip = %record.ip, "server provisioned");
        Ok(Provisioned { record, hint })
    }

    /// Best-effort key registration; any failure continues key-less.
    async fn upload_key<P: CloudProvider>(&self, provider: &P) -> Option<String> {
        let key = self.keys.public_key()?;
        let label = format!("varta-{}", Uuid::new_v4());
        match provider.upload_ssh_key(&label, &key.material).await {
            Ok(id) => {
                debug!(%label, "registered ssh key with the vendor");
                Some(id)
            }
            Err(err) => {
                warn!(error = %err, "ssh key upload failed; continuing without a key");
                None
            }
        }
    }

    async fn wait_for_boot<P: CloudProvider>(
        &self,
        provider: &P,
        id: &str,
    ) -> Result<(), ProvisionError> {
        let running = probe::poll_server_running(
            provider,
            id,
            self.config.boot_attempts,
            Duration::from_secs(self.config.boot_interval_secs),
        )
        .await
        .map_err(|err| ProvisionError::Vendor {
            operation: "server_status",
            message: err.to_string(),
        })?;
        if running {
            Ok(())
        } else {
            Err(ProvisionError::BootTimeout {
                attempts: self.config.boot_attempts,
            })
        }
    }

    /// Waits for a routable address with the vendor's own poll budget.
    ///
    /// Exhaustion is success with a hint; the sentinel stays on the record.
    async fn resolve_ip<P: CloudProvider>(
        &self,
        provider: &P,
        profile: &VendorProfile,
        created: &CreatedServer,
    ) -> (String, Option<String>) {
        if created.ip != PENDING_IP && validate_ipv4(&created.ip).is_ok() {
            return (created.ip.clone(), None);
        }
        let interval = self
            .ip_poll_interval
            .unwrap_or_else(|| Duration::from_secs(profile.ip_poll_interval_secs));
        for attempt in 1..=profile.ip_poll_attempts {
            match provider.server_details(&created.id).await {
                Ok(details) => {
                    let assigned = details
                        .ip
                        .filter(|ip| ip.as_str() != PENDING_IP && validate_ipv4(ip).is_ok());
                    if let Some(ip) = assigned {
                        return (ip, None);
                    }
                }
                Err(err) => debug!(error = %err, "server details poll failed"),
            }
            if attempt < profile.ip_poll_attempts {
                sleep(interval).await;
            }
        }
        warn!(server = %created.id, "vendor did not assign an address within the poll budget");
        (
            String::from(PENDING_IP),
            Some(String::from(
                "IP address not assigned yet; check the vendor console and update the record later",
            )),
        )
    }
}

fn validate_server_name(name: &str) -> Result<(), ProvisionError> {
    let invalid = |reason: &'static str| ProvisionError::InvalidName {
        name: name.to_owned(),
        reason,
    };
    if !(3..=63).contains(&name.chars().count()) {
        return Err(invalid("must be 3 to 63 characters"));
    }
    let mut chars = name.chars();
    if !chars.next().is_some_and(|first| first.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-') {
        return Err(invalid(
            "may contain only lowercase letters, digits, and hyphens",
        ));
    }
    Ok(())
}

fn resolve_placement(
    profile: &VendorProfile,
    request: &ProvisionRequest,
) -> Result<(String, String), ProvisionError> {
    let defaults = request
        .template
        .as_deref()
        .and_then(|template| placement::template_placement(profile.name, template));
    let region = explicit(&request.region).or_else(|| defaults.map(|p| p.region.to_owned()));
    let size = explicit(&request.size).or_else(|| defaults.map(|p| p.size.to_owned()));
    region
        .zip(size)
        .ok_or_else(|| ProvisionError::UnresolvedPlacement {
            vendor: profile.name.to_owned(),
        })
}

fn explicit(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Reads the vendor token from the environment; the value is used for the
/// one vendor client and never logged.
fn read_token(profile: &VendorProfile) -> Result<String, ProvisionError> {
    std::env::var(profile.token_env)
        .ok()
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ProvisionError::MissingToken {
            vendor: profile.name.to_owned(),
            env_var: profile.token_env,
        })
}

#[cfg(test)]
mod tests;
