//! Command handlers

pub mod batch;
pub mod config;
pub mod kv;
pub mod status;
