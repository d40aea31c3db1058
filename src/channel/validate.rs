//! Input validation applied before any subprocess is spawned.

use super::ChannelError;

/// Characters rejected in remote paths before they are rendered into an
/// `scp` target spec.
pub const REMOTE_PATH_REJECTED: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\t', ' ',
];

/// Validates a dotted-quad IPv4 address.
///
/// Accepts exactly four all-digit segments in the range 0-255. Anything
/// else (host names, IPv6, signs, embedded whitespace) is rejected so the
/// address can be embedded in subprocess arguments without quoting.
///
/// # Errors
///
/// Returns [`ChannelError::InvalidAddress`] when the address does not
/// match the dotted-quad form.
pub fn validate_ipv4(address: &str) -> Result<(), ChannelError> {
    let segments: Vec<&str> = address.split('.').collect();
    if segments.len() != 4 || !segments.iter().all(|segment| segment_ok(segment)) {
        return Err(ChannelError::InvalidAddress {
            address: address.to_owned(),
        });
    }
    Ok(())
}

fn segment_ok(segment: &str) -> bool {
    (1..=3).contains(&segment.len())
        && segment.bytes().all(|byte| byte.is_ascii_digit())
        && segment.parse::<u8>().is_ok()
}

/// Rejects remote paths containing shell metacharacters.
///
/// Remote paths end up inside an `scp` target spec where the remote shell
/// expands them; the reject list keeps chaining, redirection, and
/// substitution characters out of that position.
///
/// # Errors
///
/// Returns [`ChannelError::InvalidRemotePath`] when the path is empty or
/// contains a rejected character.
pub fn validate_remote_path(path: &str) -> Result<(), ChannelError> {
    if path.is_empty() || path.chars().any(|ch| REMOTE_PATH_REJECTED.contains(&ch)) {
        return Err(ChannelError::InvalidRemotePath {
            path: path.to_owned(),
        });
    }
    Ok(())
}
