//! HTTP Route Handlers

pub mod model;
pub mod scoring;
