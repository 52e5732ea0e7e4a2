//! Laminate library exports for testing.
//!
//! This module exposes internal components for integration testing.

pub mod commands;
pub mod config;
pub mod error;
pub mod oci;
pub mod preflight;
pub mod process;
pub mod recipe;
pub mod runner;
pub mod scheduler;
pub mod storage;
pub mod unpack;
