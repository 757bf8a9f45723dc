//! Meridian Aviatrix Provider
//!
//! Provider for the Aviatrix controller API.
//!
//! ## Module Structure
//!
//! - `client` - Control plane trait and the controller's data types
//! - `http` - HTTPS implementation of the control plane
//! - `config` - Controller address and credentials
//! - `resources` - Resource type definitions and their handlers
//! - `provider` - AviatrixProvider implementation

pub mod client;
pub mod config;
pub mod http;
pub mod provider;
pub mod resources;

#[cfg(test)]
mod mock;

// Re-export main types
pub use client::{ApiError, ApiResult, ControlPlane};
pub use config::{ConfigError, ProviderConfig};
pub use http::HttpControlPlane;
pub use provider::AviatrixProvider;

use meridian_core::provider::{BoxFuture, Provider, ProviderResult};
use meridian_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AviatrixProvider {
    fn name(&self) -> &'static str {
        "aviatrix"
    }

    fn resource_types(&self) -> Vec<Box<dyn meridian_core::provider::ResourceType>> {
        resource_types()
    }

    fn identifier_for(&self, resource: &Resource) -> ProviderResult<String> {
        self.identifier(resource)
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(&id, &identifier).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.import_resource(&id, &identifier).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meridian_core::resource::Value;
    use mock::MockControlPlane;

    #[tokio::test]
    async fn provider_trait_dispatches_through_box() {
        let mock = Arc::new(MockControlPlane::new());
        let provider: Box<dyn Provider> = Box::new(AviatrixProvider::new(mock.clone()));
        assert_eq!(provider.name(), "aviatrix");
        assert_eq!(provider.resource_types().len(), 3);

        let resource = Resource::new("segmentation_network_domain_connection_policy", "p")
            .with_attribute("domain_name_1", Value::String("prod".to_string()))
            .with_attribute("domain_name_2", Value::String("shared".to_string()));
        assert_eq!(provider.identifier_for(&resource).unwrap(), "prod~shared");

        let state = provider.create(&resource).await.unwrap();
        assert!(state.exists);

        let imported = provider.import(&resource.id, "prod~shared").await.unwrap();
        assert_eq!(imported.attributes, state.attributes);

        provider.delete(&resource.id, "prod~shared").await.unwrap();
        assert!(!provider.read(&resource.id, "prod~shared").await.unwrap().exists);
    }
}
