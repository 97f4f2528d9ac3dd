//! `botforge-auth`: pure authorization vocabulary (resource types, scopes,
//! mirrored resources, self-healing policy).
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod healing;
pub mod protected;
pub mod registry;
pub mod resource;
pub mod resource_type;
pub mod scope;

pub use healing::{StaleMetadataSignal, should_trigger_self_healing};
pub use protected::ProtectedEntity;
pub use registry::ScopeRegistry;
pub use resource::{Resource, ResourceAttributes};
pub use resource_type::{ResourceType, UnknownResourceType};
pub use scope::Scope;
