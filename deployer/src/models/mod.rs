//! Data models

pub mod deployment;
pub mod extra_vars;
