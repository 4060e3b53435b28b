//! VM Deployer Library
//!
//! Runs an Ansible deployment against a single VM: credentials come from the
//! secret store, the playbook bundle is staged into a private workspace, and
//! the outcome is reported as a JSON response.

pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod secrets;
pub mod server;
pub mod storage;
pub mod utils;
