//! Secret store access
//!
//! [`backend::SecretBackend`] is the seam between the pipeline and the store.
//! Two production backends talk to the Parameters and Secrets extension; the
//! in-memory backend serves tests and local runs.

pub mod backend;
pub mod extension;
pub mod memory;
pub mod parameter_store;
pub mod resolver;
pub mod secrets_manager;
