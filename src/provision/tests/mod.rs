//! Unit tests for the provisioning pipeline.
