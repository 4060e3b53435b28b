//! Deployment module

pub mod credentials;
pub mod executor;
pub mod inventory;
pub mod pipeline;
pub mod reporter;
pub mod stager;
pub mod workspace;
