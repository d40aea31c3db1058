//! Unit tests for the backup and restore engine.
//!
//! Remote sequencing, fallback and rollback behaviour, and manifest
//! persistence are covered here with a scripted runner; nothing spawns a
//! real process.

mod restore_flow;
