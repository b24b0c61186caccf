//! Data Transfer Objects for the pipeline backend API
//!
//! Wire representations of requests and responses. Domain types are derived
//! from these, never deserialized from the wire directly when the backend's
//! vocabulary differs from ours.

pub mod execution;
pub mod pipeline;
