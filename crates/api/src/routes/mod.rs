//! API Route Handlers

pub mod info;
pub mod metrics;
pub mod predict;
