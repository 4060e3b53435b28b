//! Secret store client models

pub mod models;
