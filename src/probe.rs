//! Reachability helpers shared by the maintenance and provisioning engines.
//!
//! Two kinds of probe live here: an HTTP reachability check against a
//! server's service endpoint, and a provider status poll that reports when
//! a server is running. Both are bounded; callers pick the attempt budget
//! and interval.

use std::sync::LazyLock;
use std::time::Duration;

use tracing::debug;

use crate::provider::{CloudProvider, ServerStatus};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Builds the URL probed for service reachability.
#[must_use]
pub fn service_url(ip: &str, port: u16, path: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    format!("http://{ip}:{port}/{trimmed}")
}

/// Issues one HTTP GET against the service endpoint.
///
/// Any 2xx response counts as reachable; connection errors and non-2xx
/// statuses are logged at debug level and reported as unreachable.
pub async fn service_reachable(ip: &str, port: u16, path: &str) -> bool {
    let url = service_url(ip, port, path);
    match HTTP_CLIENT.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(err) => {
            debug!(%url, error = %err, "service endpoint unreachable");
            false
        }
    }
}

/// Polls the service endpoint up to `attempts` times.
///
/// Returns `true` as soon as one probe succeeds. Sleeps `interval` between
/// attempts but not after the final one.
pub async fn poll_service(
    ip: &str,
    port: u16,
    path: &str,
    attempts: u32,
    interval: Duration,
) -> bool {
    for attempt in 1..=attempts {
        if service_reachable(ip, port, path).await {
            return true;
        }
        debug!(ip, attempt, "service not yet reachable");
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    false
}

/// Polls a provider until the server reports a running status.
///
/// Returns `Ok(true)` once the status is running and `Ok(false)` when the
/// attempt budget runs out first.
///
/// # Errors
///
/// Propagates the provider's own error when a status query fails.
pub async fn poll_server_running<P: CloudProvider>(
    provider: &P,
    server_id: &str,
    attempts: u32,
    interval: Duration,
) -> Result<bool, P::Error> {
    for attempt in 1..=attempts {
        let status = provider.server_status(server_id).await?;
        if matches!(status, ServerStatus::Running) {
            return Ok(true);
        }
        debug!(server_id, attempt, ?status, "server not yet running");
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::service_url;

    #[test]
    fn url_joins_port_and_path() {
        assert_eq!(
            service_url("203.0.113.7", 80, "/"),
            "http://203.0.113.7:80/"
        );
        assert_eq!(
            service_url("203.0.113.7", 8080, "health"),
            "http://203.0.113.7:8080/health"
        );
        assert_eq!(
            service_url("203.0.113.7", 80, "/status"),
            "http://203.0.113.7:80/status"
        );
    }
}
