//! Meridian Core
//!
//! Core library for a cloud-networking infrastructure provider: the resource
//! model, the provider trait, attribute schemas, and the retry and step
//! sequencing primitives that resource handlers build on.

pub mod differ;
pub mod identity;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod steps;
