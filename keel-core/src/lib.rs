//! Keel Core
//!
//! Core types shared by the Keel pipeline controller, its HTTP client and the CLI.
//!
//! This crate contains:
//! - Domain types: services, lifecycle stages, pipeline steps, credentials, scan results
//! - DTOs: request/response bodies exchanged with the pipeline backend

pub mod domain;
pub mod dto;
