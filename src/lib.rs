//! Cadence - named recurring jobs with a runtime-controllable schedule
//!
//! Jobs are declared with a compiled-in cron expression. A control API (and
//! the `jobs` CLI talking to it) can reschedule, pause, disable and trigger
//! them at runtime; overrides are persisted and survive restarts.

#![allow(missing_docs)]

pub mod api;
pub mod app;
pub mod app_info;
pub mod boot;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod database;
pub mod environment;
pub mod jobs;
pub mod router;
pub mod setup_tracing;
pub mod websocket;
