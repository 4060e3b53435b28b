//! Deployer API models

pub mod models;
