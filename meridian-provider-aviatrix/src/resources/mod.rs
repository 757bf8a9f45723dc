//! Resource type definitions
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - Lookup from a resource type name to its handler kind and schema

pub mod domain_connection_policy;
pub mod vgw_conn;

use meridian_core::provider::ResourceType;
use meridian_core::schema::ResourceSchema;

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:expr) => {
        define_resource_type!($name, $type_name, $schema, None);
    };
    ($name:ident, $type_name:expr, $schema:expr, $deprecation:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema
            }
            fn deprecation_message(&self) -> Option<&'static str> {
                $deprecation
            }
        }
    };
}

define_resource_type!(VgwConnType, vgw_conn::RESOURCE_TYPE, vgw_conn::schema());
define_resource_type!(
    NetworkDomainConnectionPolicyType,
    domain_connection_policy::NETWORK_DOMAIN_TYPE,
    domain_connection_policy::schema(domain_connection_policy::NETWORK_DOMAIN_TYPE)
);
define_resource_type!(
    SecurityDomainConnectionPolicyType,
    domain_connection_policy::SECURITY_DOMAIN_TYPE,
    domain_connection_policy::schema(domain_connection_policy::SECURITY_DOMAIN_TYPE),
    Some(domain_connection_policy::SECURITY_DOMAIN_DEPRECATION)
);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(VgwConnType),
        Box::new(NetworkDomainConnectionPolicyType),
        Box::new(SecurityDomainConnectionPolicyType),
    ]
}

/// Which handler serves a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    VgwConn,
    DomainConnectionPolicy,
}

/// Resolve a resource type name to its handler, schema and deprecation notice
pub fn lookup(resource_type: &str) -> Option<(ResourceKind, Box<dyn ResourceType>)> {
    let kind = match resource_type {
        vgw_conn::RESOURCE_TYPE => ResourceKind::VgwConn,
        domain_connection_policy::NETWORK_DOMAIN_TYPE
        | domain_connection_policy::SECURITY_DOMAIN_TYPE => ResourceKind::DomainConnectionPolicy,
        _ => return None,
    };
    let resource_type = resource_types()
        .into_iter()
        .find(|t| t.name() == resource_type)?;
    Some((kind, resource_type))
}
