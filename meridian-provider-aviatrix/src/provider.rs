//! Aviatrix Provider implementation
//!
//! This module contains the provider struct, validation of desired resources
//! and dispatch of each operation to the handler of the resource's type.

use std::sync::Arc;

use meridian_core::identity::{CompositeId, IdentityError};
use meridian_core::provider::{ProviderError, ProviderResult, ResourceType};
use meridian_core::resource::{Resource, ResourceId, State};
use meridian_core::retry::{RetryPolicy, Sleeper, TokioSleeper};

use crate::client::ControlPlane;
use crate::config::ProviderConfig;
use crate::http::HttpControlPlane;
use crate::resources::{self, ResourceKind, domain_connection_policy, vgw_conn};

/// Aviatrix controller Provider
pub struct AviatrixProvider {
    client: Arc<dyn ControlPlane>,
    sleeper: Arc<dyn Sleeper>,
    create_retry: RetryPolicy,
}

impl AviatrixProvider {
    /// Create a provider over any control plane client
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self {
            client,
            sleeper: Arc::new(TokioSleeper),
            create_retry: vgw_conn::CREATE_RETRY,
        }
    }

    /// Connect to a controller over HTTPS and log in
    pub async fn connect(config: &ProviderConfig) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::new(e.to_string()).with_cause(e))?;
        let client = HttpControlPlane::new(config).map_err(|e| {
            ProviderError::new(format!("could not build controller client: {}", e)).with_cause(e)
        })?;
        client.login().await.map_err(|e| {
            ProviderError::new(format!(
                "could not log in to controller {}: {}",
                config.controller_ip, e
            ))
            .with_cause(e)
        })?;
        log::info!("connected to controller {}", config.controller_ip);
        Ok(Self::new(Arc::new(client)))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_create_retry(mut self, policy: RetryPolicy) -> Self {
        self.create_retry = policy;
        self
    }

    pub(crate) fn client(&self) -> &dyn ControlPlane {
        self.client.as_ref()
    }

    pub(crate) fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    pub(crate) fn create_retry(&self) -> &RetryPolicy {
        &self.create_retry
    }

    /// Check a desired resource against its schema and identity rules.
    /// Nothing is sent to the controller.
    pub fn validate(&self, resource: &Resource) -> ProviderResult<()> {
        validate(resource)
    }

    /// Identifier the resource is tracked under once created
    pub fn identifier(&self, resource: &Resource) -> ProviderResult<String> {
        identifier(resource)
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let (kind, _) = resolve(id)?;
        let identity: CompositeId = identifier.parse().map_err(|e| identity_error(id, e))?;
        match kind {
            ResourceKind::VgwConn => self.read_vgw_conn(id, &identity).await,
            ResourceKind::DomainConnectionPolicy => self.read_domain_policy(id, &identity).await,
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        self.validate(resource)?;
        let (kind, _) = lookup(&resource.id)?;
        match kind {
            ResourceKind::VgwConn => self.create_vgw_conn(resource).await,
            ResourceKind::DomainConnectionPolicy => self.create_domain_policy(resource).await,
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        self.validate(to)?;
        let (kind, resource_type) = lookup(id)?;
        let identity: CompositeId = identifier.parse().map_err(|e| identity_error(id, e))?;
        match kind {
            ResourceKind::VgwConn => {
                self.update_vgw_conn(id, &identity, from, to, &resource_type.schema())
                    .await
            }
            ResourceKind::DomainConnectionPolicy => Err(ProviderError::new(format!(
                "Update not supported for {}, delete and recreate",
                id.resource_type
            ))
            .for_resource(id.clone())),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (kind, _) = resolve(id)?;
        let identity: CompositeId = identifier.parse().map_err(|e| identity_error(id, e))?;
        match kind {
            ResourceKind::VgwConn => self.delete_vgw_conn(id, &identity).await,
            ResourceKind::DomainConnectionPolicy => self.delete_domain_policy(id, &identity).await,
        }
    }

    pub async fn import_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        log::debug!("importing {} with identifier {}", id, identifier);
        let state = self.read_resource(id, identifier).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "cannot import non-existent remote object '{}'",
                identifier
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }
}

// =============================================================================
// Validation
// =============================================================================

fn lookup(id: &ResourceId) -> ProviderResult<(ResourceKind, Box<dyn ResourceType>)> {
    resources::lookup(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

/// Like `lookup`, warning when the resource type is deprecated
fn resolve(id: &ResourceId) -> ProviderResult<(ResourceKind, Box<dyn ResourceType>)> {
    let (kind, resource_type) = lookup(id)?;
    if let Some(message) = resource_type.deprecation_message() {
        log::warn!("{}: {}", id, message);
    }
    Ok((kind, resource_type))
}

/// Check a desired resource against its schema and identity rules
pub fn validate(resource: &Resource) -> ProviderResult<()> {
    let (_, resource_type) = resolve(&resource.id)?;
    if let Err(errors) = resource_type.schema().validate(&resource.attributes) {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(
            ProviderError::new(format!("invalid configuration: {}", messages.join("; ")))
                .for_resource(resource.id.clone()),
        );
    }
    identifier(resource).map(drop)
}

/// Identifier a desired resource is tracked under once created
pub fn identifier(resource: &Resource) -> ProviderResult<String> {
    let (kind, _) = lookup(&resource.id)?;
    let identity = match kind {
        ResourceKind::VgwConn => vgw_conn::identity(resource),
        ResourceKind::DomainConnectionPolicy => domain_connection_policy::identity(resource),
    };
    identity
        .map(|id| id.to_string())
        .map_err(|e| identity_error(&resource.id, e))
}

fn identity_error(id: &ResourceId, e: IdentityError) -> ProviderError {
    ProviderError::new(e.to_string())
        .with_cause(e)
        .for_resource(id.clone())
}
