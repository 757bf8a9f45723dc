//! Segmentation domain connection policies
//!
//! A policy connects two segmentation domains. It has no mutable settings, so
//! it is only ever created, read and deleted. The same handler serves the
//! current network-domain resource type and the deprecated security-domain one.

use std::collections::HashMap;

use meridian_core::identity::{CompositeId, IdentityError, check_component};
use meridian_core::provider::{ProviderError, ProviderResult};
use meridian_core::resource::{Resource, ResourceId, State, Value};
use meridian_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use crate::client::{ApiError, DomainConnectionPolicy};
use crate::provider::AviatrixProvider;

pub const NETWORK_DOMAIN_TYPE: &str = "segmentation_network_domain_connection_policy";
pub const SECURITY_DOMAIN_TYPE: &str = "segmentation_security_domain_connection_policy";

pub const SECURITY_DOMAIN_DEPRECATION: &str = "Resource 'segmentation_security_domain_connection_policy' \
     will be deprecated in future releases. Please use resource \
     'segmentation_network_domain_connection_policy' instead.";

const ABSENT_MARKER: &str = "does not exist";

pub fn schema(resource_type: &str) -> ResourceSchema {
    let kind = if resource_type == SECURITY_DOMAIN_TYPE {
        "security"
    } else {
        "network"
    };
    ResourceSchema::new(resource_type)
        .with_description(format!("Connection policy between two {} domains", kind))
        .attribute(
            AttributeSchema::new("domain_name_1", AttributeType::String)
                .required()
                .force_new()
                .with_description(format!(
                    "Name of {} domain that will be connected to domain 2.",
                    kind
                )),
        )
        .attribute(
            AttributeSchema::new("domain_name_2", AttributeType::String)
                .required()
                .force_new()
                .with_description(format!(
                    "Name of {} domain that will be connected to domain 1.",
                    kind
                )),
        )
}

/// Identity of a desired policy: `domain_name_1~domain_name_2`
pub fn identity(resource: &Resource) -> Result<CompositeId, IdentityError> {
    check_component("domain_name_1", resource.get_str("domain_name_1"))?;
    check_component("domain_name_2", resource.get_str("domain_name_2"))?;
    CompositeId::new(
        resource.get_str("domain_name_1"),
        resource.get_str("domain_name_2"),
    )
}

fn policy_for(identity: &CompositeId) -> DomainConnectionPolicy {
    DomainConnectionPolicy {
        domain_name_1: identity.first().to_string(),
        domain_name_2: identity.second().to_string(),
    }
}

impl AviatrixProvider {
    pub(crate) async fn create_domain_policy(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let identity = identity(resource).map_err(|e| {
            ProviderError::new(e.to_string())
                .with_cause(e)
                .for_resource(id.clone())
        })?;

        log::info!("Creating {} {}", id.resource_type, identity);
        self.client()
            .create_domain_connection_policy(&policy_for(&identity))
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "could not create {}: {}",
                    id.resource_type, e
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;

        let created = State::existing(id.clone(), resource.attributes.clone())
            .with_identifier(identity.to_string());
        let state = self
            .read_domain_policy(id, &identity)
            .await
            .map_err(|e| e.with_partial_state(created.clone()))?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "{} {} not found after create",
                id.resource_type, identity
            ))
            .for_resource(id.clone())
            .with_partial_state(created));
        }
        Ok(state)
    }

    pub(crate) async fn read_domain_policy(
        &self,
        id: &ResourceId,
        identity: &CompositeId,
    ) -> ProviderResult<State> {
        match self
            .client()
            .get_domain_connection_policy(&policy_for(identity))
            .await
        {
            Ok(_) => {
                let attributes = HashMap::from([
                    (
                        "domain_name_1".to_string(),
                        Value::String(identity.first().to_string()),
                    ),
                    (
                        "domain_name_2".to_string(),
                        Value::String(identity.second().to_string()),
                    ),
                ]);
                Ok(State::existing(id.clone(), attributes).with_identifier(identity.to_string()))
            }
            Err(ApiError::NotFound) => {
                log::debug!("{} {} not found", id.resource_type, identity);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(ProviderError::new(format!(
                "could not find {} {}: {}",
                id.resource_type, identity, e
            ))
            .with_cause(e)
            .for_resource(id.clone())),
        }
    }

    pub(crate) async fn delete_domain_policy(
        &self,
        id: &ResourceId,
        identity: &CompositeId,
    ) -> ProviderResult<()> {
        log::info!("Deleting {} {}", id.resource_type, identity);
        match self
            .client()
            .delete_domain_connection_policy(&policy_for(identity))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if matches!(e, ApiError::NotFound) || e.mentions(ABSENT_MARKER) => {
                log::info!("{} {} already absent", id.resource_type, identity);
                Ok(())
            }
            Err(e) => Err(ProviderError::new(format!(
                "could not delete {}: {}",
                id.resource_type, e
            ))
            .with_cause(e)
            .for_resource(id.clone())),
        }
    }
}
