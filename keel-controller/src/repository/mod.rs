//! Repository layer
//!
//! Repositories abstract the controller's collaborators: the pipeline backend
//! and the three credential stores. They carry no business logic.
//!
//! All repositories are trait-based so tests can substitute fixtures.

mod credentials;
mod pipeline;

// Re-export traits
pub use credentials::{GitCredentialStore, RegistryCredentialStore, ServerCredentialStore};
pub use pipeline::PipelineRepository;

// Re-export implementations
pub use credentials::{
    CredentialFile, CredentialStores, InMemoryGitCredentials, InMemoryRegistryCredentials,
    InMemoryServerCredentials,
};
pub use pipeline::HttpPipelineRepository;
