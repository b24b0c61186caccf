//! Core domain types
//!
//! This module contains the domain structures used across Keel crates.
//! They describe what the backend knows about a service and its pipeline,
//! and the credential material needed to drive an execution.

pub mod credentials;
pub mod pipeline;
pub mod scan;
pub mod service;
