//! Guardrail agent: HTTP surface and configuration around the guardrail monitor

pub mod api;
pub mod config;
