//! Process-level helpers shared by the provisioning binary and hosts.

pub mod bootstrap;
pub mod retry;
