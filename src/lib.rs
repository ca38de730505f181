//! Spam Sieve — concurrent staged pipeline for bulk spam detection.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
