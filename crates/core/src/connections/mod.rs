//! Connection lifecycle: linking, unlinking, per-calendar participation

pub mod ports;
pub mod service;
