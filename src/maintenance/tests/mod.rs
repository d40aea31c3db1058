//! Unit tests for the maintenance engine.
