//! Small path helpers shared by configuration loaders.

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is unset the input comes back unchanged; callers that need a
/// stricter fallback handle it themselves.
///
/// # Examples
///
/// ```
/// # use varta::util::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.varta/backups"), format!("{home}/.varta/backups"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    let Some(rest) = path.strip_prefix("~/") else {
        return path.to_owned();
    };
    std::env::var_os("HOME").map_or_else(
        || path.to_owned(),
        |home| format!("{}/{rest}", home.to_string_lossy()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_tilde_is_left_alone() {
        assert_eq!(expand_tilde("~"), "~");
        assert_eq!(expand_tilde("~user/dir"), "~user/dir");
    }

    #[test]
    fn relative_and_absolute_paths_pass_through() {
        assert_eq!(expand_tilde("backups/web-01"), "backups/web-01");
        assert_eq!(expand_tilde("/var/backups"), "/var/backups");
    }
}
