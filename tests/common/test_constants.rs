//! Shared constants for integration tests.
//!
//! Each top-level file in `tests/` is its own crate; include this file with
//! `#[path = "common/test_constants.rs"] mod test_constants;` to share it.

/// OpenSSH public key installed on simulated rigs.
pub const SSH_PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIRigStackTestKey rig@test";

/// Region used when a test does not care which one is chosen.
pub const DEFAULT_REGION: &str = "eu-west-3";
