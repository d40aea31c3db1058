//! Vendor catalogue and template placement defaults.
//!
//! The orchestrator only provisions at vendors listed here. Each profile
//! carries the token environment variable and the pending-IP poll tuning;
//! address assignment latency differs enough between vendors that a single
//! budget either wastes minutes or gives up too early.

/// Capabilities and tuning for one supported vendor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VendorProfile {
    /// Canonical lowercase vendor name, as stored in server records.
    pub name: &'static str,
    /// Environment variable the API token is read from.
    pub token_env: &'static str,
    /// Attempts for the pending-IP poll.
    pub ip_poll_attempts: u32,
    /// Seconds between pending-IP poll attempts.
    pub ip_poll_interval_secs: u64,
}

const HETZNER: VendorProfile = VendorProfile {
    name: "hetzner",
    token_env: "HETZNER_TOKEN",
    ip_poll_attempts: 10,
    ip_poll_interval_secs: 3,
};

const DIGITALOCEAN: VendorProfile = VendorProfile {
    name: "digitalocean",
    token_env: "DIGITALOCEAN_TOKEN",
    ip_poll_attempts: 20,
    ip_poll_interval_secs: 6,
};

const VULTR: VendorProfile = VendorProfile {
    name: "vultr",
    token_env: "VULTR_TOKEN",
    ip_poll_attempts: 15,
    ip_poll_interval_secs: 4,
};

/// Every vendor the provisioning workflow can talk to.
pub const SUPPORTED_VENDORS: [VendorProfile; 3] = [HETZNER, DIGITALOCEAN, VULTR];

/// Looks up a vendor profile by canonical name.
#[must_use]
pub fn vendor_profile(name: &str) -> Option<&'static VendorProfile> {
    SUPPORTED_VENDORS.iter().find(|profile| profile.name == name)
}

/// Returns the canonical vendor names, for error hints and listings.
#[must_use]
pub fn vendor_names() -> Vec<&'static str> {
    SUPPORTED_VENDORS.iter().map(|profile| profile.name).collect()
}

/// Region and size defaults for a template at one vendor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Placement {
    /// Vendor region identifier.
    pub region: &'static str,
    /// Vendor size or plan identifier.
    pub size: &'static str,
}

const fn placement(region: &'static str, size: &'static str) -> Placement {
    Placement { region, size }
}

/// Resolves a named template to its defaults at one vendor.
///
/// Returns `None` for unknown vendor/template combinations; callers fall
/// back to explicit region and size values.
#[must_use]
pub fn template_placement(vendor: &str, template: &str) -> Option<Placement> {
    match (vendor, template) {
        ("hetzner", "small") => Some(placement("fsn1", "cx22")),
        ("hetzner", "medium") => Some(placement("fsn1", "cx32")),
        ("hetzner", "large") => Some(placement("fsn1", "cx42")),
        ("digitalocean", "small") => Some(placement("fra1", "s-1vcpu-2gb")),
        ("digitalocean", "medium") => Some(placement("fra1", "s-2vcpu-4gb")),
        ("digitalocean", "large") => Some(placement("fra1", "s-4vcpu-8gb")),
        ("vultr", "small") => Some(placement("fra", "vc2-1c-2gb")),
        ("vultr", "medium") => Some(placement("fra", "vc2-2c-4gb")),
        ("vultr", "large") => Some(placement("fra", "vc2-4c-8gb")),
        _ => None,
    }
}
