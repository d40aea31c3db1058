//! Unit tests for the SSH channel.
//!
//! Argument construction, validation, and the host-key retry loop are
//! covered here with a scripted runner; real subprocess supervision is
//! exercised by the integration suite.
