//! vgw_conn - Transit gateway to AWS VGW connection
//!
//! Creating the connection fails while the transit gateway is still coming up,
//! so the create call is retried with exponential backoff for as long as the
//! controller reports "is not up". Once the connection exists, the optional
//! settings are applied by separate calls in a fixed order. Those calls are not
//! retried and a failure leaves the earlier ones in place.

use std::collections::HashMap;
use std::time::Duration;

use meridian_core::differ::changed_attributes;
use meridian_core::identity::{CompositeId, IdentityError, check_component};
use meridian_core::provider::{ProviderError, ProviderResult};
use meridian_core::resource::{Resource, ResourceId, State, Value};
use meridian_core::retry::{RetryError, RetryPolicy};
use meridian_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use meridian_core::steps::{StepFailure, StepSequence};

use crate::client::{ApiError, VgwConn};
use crate::provider::AviatrixProvider;

pub const RESOURCE_TYPE: &str = "vgw_conn";

pub const MAX_PREPEND_AS_PATH: usize = 25;

/// 8 attempts, sleeping 1s, 2s, 4s ... 64s in between
pub const CREATE_RETRY: RetryPolicy = RetryPolicy::new(8, Duration::from_millis(1000));

const NOT_UP_MARKER: &str = "is not up";
const ABSENT_MARKER: &str = "does not exist";

const STEP_ENABLE_APPROVAL: &str = "enable_learned_cidrs_approval";
const STEP_DISABLE_APPROVAL: &str = "disable_learned_cidrs_approval";
const STEP_MANUAL_CIDRS: &str = "manual_bgp_advertised_cidrs";
const STEP_ENABLE_EVENT_HA: &str = "enable_event_triggered_ha";
const STEP_DISABLE_EVENT_HA: &str = "disable_event_triggered_ha";
const STEP_PREPEND: &str = "prepend_as_path";

pub fn schema() -> ResourceSchema {
    let force_new_string = |name: &str, description: &str| {
        AttributeSchema::new(name, AttributeType::String)
            .required()
            .force_new()
            .with_description(description)
    };

    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Connection between a transit gateway and an AWS VGW")
        .attribute(force_new_string(
            "conn_name",
            "The name of the VGW connection which is going to be created.",
        ))
        .attribute(force_new_string("gw_name", "Name of the Transit Gateway."))
        .attribute(force_new_string(
            "vpc_id",
            "VPC-ID where the Transit Gateway is located.",
        ))
        .attribute(force_new_string(
            "bgp_vgw_id",
            "Id of AWS's VGW that is used for this connection.",
        ))
        .attribute(force_new_string(
            "bgp_vgw_account",
            "Account of AWS's VGW that is used for this connection.",
        ))
        .attribute(force_new_string(
            "bgp_vgw_region",
            "Region of AWS's VGW that is used for this connection.",
        ))
        .attribute(
            AttributeSchema::new("bgp_local_as_num", types::asn())
                .required()
                .force_new()
                .with_description("BGP local ASN. Integer between 1-4294967294."),
        )
        .attribute(
            AttributeSchema::new("enable_learned_cidrs_approval", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description(
                    "Enable learned CIDR approval for the connection. Requires the transit \
                     gateway's learned CIDR approval mode to be 'connection'.",
                ),
        )
        .attribute(
            AttributeSchema::new("enable_event_triggered_ha", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Enable Event Triggered HA."),
        )
        .attribute(
            AttributeSchema::new(
                "manual_bgp_advertised_cidrs",
                AttributeType::Set(Box::new(types::cidr())),
            )
            .with_default(Value::List(vec![]))
            .with_description("Manual BGP advertised CIDRs for this connection."),
        )
        .attribute(
            AttributeSchema::new(
                "prepend_as_path",
                AttributeType::List(Box::new(types::asn())),
            )
            .with_max_items(MAX_PREPEND_AS_PATH)
            .with_default(Value::List(vec![]))
            .with_description("AS path to prepend on routes advertised over this connection."),
        )
}

/// Identity of a desired connection: `conn_name~vpc_id`
pub fn identity(resource: &Resource) -> Result<CompositeId, IdentityError> {
    check_component("conn_name", resource.get_str("conn_name"))?;
    check_component("vpc_id", resource.get_str("vpc_id"))?;
    CompositeId::new(resource.get_str("conn_name"), resource.get_str("vpc_id"))
}

/// Typed view of a desired connection
struct VgwConnSettings {
    conn: VgwConn,
    learned_cidrs_approval: bool,
    manual_bgp_advertised_cidrs: Vec<String>,
    event_triggered_ha: bool,
    prepend_as_path: Vec<String>,
}

impl VgwConnSettings {
    fn from_resource(resource: &Resource) -> Self {
        let mut cidrs = resource.get_string_list("manual_bgp_advertised_cidrs");
        cidrs.sort();
        cidrs.dedup();
        Self {
            conn: VgwConn {
                conn_name: resource.get_str("conn_name").to_string(),
                gw_name: resource.get_str("gw_name").to_string(),
                vpc_id: resource.get_str("vpc_id").to_string(),
                bgp_vgw_id: resource.get_str("bgp_vgw_id").to_string(),
                bgp_vgw_account: resource.get_str("bgp_vgw_account").to_string(),
                bgp_vgw_region: resource.get_str("bgp_vgw_region").to_string(),
                bgp_local_as_num: resource.get_str("bgp_local_as_num").to_string(),
            },
            learned_cidrs_approval: resource.get_bool("enable_learned_cidrs_approval"),
            manual_bgp_advertised_cidrs: cidrs,
            event_triggered_ha: resource.get_bool("enable_event_triggered_ha"),
            prepend_as_path: resource.get_string_list("prepend_as_path"),
        }
    }
}

/// Error message prefix for a failed settings step
fn step_context(step: &str) -> &'static str {
    match step {
        STEP_ENABLE_APPROVAL => "could not enable learned cidr approval",
        STEP_DISABLE_APPROVAL => "could not disable learned cidr approval",
        STEP_MANUAL_CIDRS => "could not edit manual bgp advertised cidrs",
        STEP_ENABLE_EVENT_HA => "could not enable event triggered HA",
        STEP_DISABLE_EVENT_HA => "could not disable event triggered HA",
        STEP_PREPEND => "could not set prepend_as_path",
        _ => "could not apply connection setting",
    }
}

fn step_error(
    id: &ResourceId,
    phase: Option<&str>,
    failure: StepFailure<ApiError>,
) -> ProviderError {
    let context = step_context(failure.step);
    let message = match phase {
        Some(phase) => format!("{} {}: {}", context, phase, failure.error),
        None => format!("{}: {}", context, failure.error),
    };
    ProviderError::new(message)
        .with_cause(failure.error)
        .for_resource(id.clone())
}

impl AviatrixProvider {
    pub(crate) async fn create_vgw_conn(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let settings = VgwConnSettings::from_resource(resource);
        let identity = identity(resource).map_err(|e| {
            ProviderError::new(e.to_string())
                .with_cause(e)
                .for_resource(id.clone())
        })?;
        let client = self.client();
        let conn = &settings.conn;

        log::info!(
            "Creating VGW connection {} on gateway {} ({})",
            conn.conn_name,
            conn.gw_name,
            conn.vpc_id
        );

        self.create_retry()
            .run(
                self.sleeper(),
                |e: &ApiError| e.mentions(NOT_UP_MARKER),
                || client.create_vgw_conn(conn),
            )
            .await
            .map_err(|e| {
                let message = match &e {
                    RetryError::Exhausted { attempts, last } => format!(
                        "couldn't create VGW connection after {} attempts: {}",
                        attempts, last
                    ),
                    RetryError::Permanent(err) => {
                        format!("failed to create VGW connection: {}", err)
                    }
                };
                ProviderError::new(message)
                    .with_cause(e.into_inner())
                    .for_resource(id.clone())
            })?;

        let created = State::existing(id.clone(), resource.attributes.clone())
            .with_identifier(identity.to_string());

        let cidrs = &settings.manual_bgp_advertised_cidrs;
        let prepend = &settings.prepend_as_path;
        let report = StepSequence::new()
            .step_if(settings.learned_cidrs_approval, STEP_ENABLE_APPROVAL, || {
                client.enable_learned_cidrs_approval(&conn.gw_name, &conn.conn_name)
            })
            .step_if(!cidrs.is_empty(), STEP_MANUAL_CIDRS, || {
                client.edit_manual_advertised_cidrs(&conn.gw_name, &conn.conn_name, cidrs)
            })
            .step_if(settings.event_triggered_ha, STEP_ENABLE_EVENT_HA, || {
                client.enable_event_triggered_ha(&conn.vpc_id, &conn.conn_name)
            })
            .step_if(!prepend.is_empty(), STEP_PREPEND, || {
                client.edit_as_path_prepend(&conn.gw_name, &conn.conn_name, prepend)
            })
            .run()
            .await;

        if let Err(failure) = report.into_result() {
            log::warn!(
                "VGW connection {} was created but step '{}' failed",
                identity,
                failure.step
            );
            return Err(step_error(id, None, failure).with_partial_state(created));
        }

        let state = self
            .read_vgw_conn(id, &identity)
            .await
            .map_err(|e| e.with_partial_state(created.clone()))?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "VGW connection {} not found after create",
                identity
            ))
            .for_resource(id.clone())
            .with_partial_state(created));
        }
        Ok(state)
    }

    pub(crate) async fn read_vgw_conn(
        &self,
        id: &ResourceId,
        identity: &CompositeId,
    ) -> ProviderResult<State> {
        let client = self.client();
        let detail = match client
            .get_vgw_conn_detail(identity.first(), identity.second())
            .await
        {
            Ok(detail) => detail,
            Err(ApiError::NotFound) => {
                log::debug!("VGW connection {} not found", identity);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "couldn't find VGW connection {}: {}",
                    identity, e
                ))
                .with_cause(e)
                .for_resource(id.clone()));
            }
        };
        log::debug!("Found VGW connection {:?}", detail);

        let advanced = client
            .get_transit_gateway_advanced_config(&detail.conn.gw_name)
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "could not get advanced config for transit gateway {} when reading learned CIDR approval status: {}",
                    detail.conn.gw_name, e
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;

        let conn = &detail.conn;
        let mut attributes = HashMap::new();
        for (name, value) in [
            ("conn_name", &conn.conn_name),
            ("gw_name", &conn.gw_name),
            ("vpc_id", &conn.vpc_id),
            ("bgp_vgw_id", &conn.bgp_vgw_id),
            ("bgp_vgw_account", &conn.bgp_vgw_account),
            ("bgp_vgw_region", &conn.bgp_vgw_region),
            ("bgp_local_as_num", &conn.bgp_local_as_num),
        ] {
            attributes.insert(name.to_string(), Value::String(value.clone()));
        }
        attributes.insert(
            "enable_event_triggered_ha".to_string(),
            Value::Bool(detail.event_triggered_ha),
        );
        attributes.insert(
            "enable_learned_cidrs_approval".to_string(),
            Value::Bool(advanced.approval_for(&conn.conn_name).unwrap_or(false)),
        );
        attributes.insert(
            "manual_bgp_advertised_cidrs".to_string(),
            Value::string_list(detail.manual_bgp_cidrs.iter().cloned()),
        );
        if !detail.prepend_as_path.trim().is_empty() {
            attributes.insert(
                "prepend_as_path".to_string(),
                Value::string_list(detail.prepend_as_path.split_whitespace()),
            );
        }

        let identifier = CompositeId::new(conn.conn_name.clone(), conn.vpc_id.clone())
            .map(|i| i.to_string())
            .unwrap_or_else(|_| identity.to_string());
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Apply changed mutable settings in the fixed order, stopping at the first failure
    pub(crate) async fn update_vgw_conn(
        &self,
        id: &ResourceId,
        identity: &CompositeId,
        from: &State,
        to: &Resource,
        schema: &ResourceSchema,
    ) -> ProviderResult<State> {
        let mut desired = to.attributes.clone();
        schema.apply_defaults(&mut desired);
        let changed = changed_attributes(&desired, &from.attributes, schema);

        let immutable: Vec<&str> = changed
            .iter()
            .map(String::as_str)
            .filter(|name| schema.force_new_attributes().contains(name))
            .collect();
        if !immutable.is_empty() {
            return Err(ProviderError::new(format!(
                "changing {} requires replacement, the connection cannot be updated in place",
                immutable.join(", ")
            ))
            .for_resource(id.clone()));
        }

        let has_change = |name: &str| changed.iter().any(|c| c == name);
        let settings = VgwConnSettings::from_resource(to);
        let conn = &settings.conn;
        let client = self.client();
        let approval_step = if settings.learned_cidrs_approval {
            STEP_ENABLE_APPROVAL
        } else {
            STEP_DISABLE_APPROVAL
        };
        let event_ha_step = if settings.event_triggered_ha {
            STEP_ENABLE_EVENT_HA
        } else {
            STEP_DISABLE_EVENT_HA
        };

        log::info!(
            "Updating VGW connection {}: {}",
            identity,
            if changed.is_empty() {
                "no changes".to_string()
            } else {
                changed.join(", ")
            }
        );

        let report = StepSequence::new()
            .step_if(has_change("enable_learned_cidrs_approval"), approval_step, || {
                if settings.learned_cidrs_approval {
                    client.enable_learned_cidrs_approval(&conn.gw_name, &conn.conn_name)
                } else {
                    client.disable_learned_cidrs_approval(&conn.gw_name, &conn.conn_name)
                }
            })
            .step_if(has_change("manual_bgp_advertised_cidrs"), STEP_MANUAL_CIDRS, || {
                client.edit_manual_advertised_cidrs(
                    &conn.gw_name,
                    &conn.conn_name,
                    &settings.manual_bgp_advertised_cidrs,
                )
            })
            .step_if(has_change("enable_event_triggered_ha"), event_ha_step, || {
                if settings.event_triggered_ha {
                    client.enable_event_triggered_ha(&conn.vpc_id, &conn.conn_name)
                } else {
                    client.disable_event_triggered_ha(&conn.vpc_id, &conn.conn_name)
                }
            })
            .step_if(has_change("prepend_as_path"), STEP_PREPEND, || {
                client.edit_as_path_prepend(&conn.gw_name, &conn.conn_name, &settings.prepend_as_path)
            })
            .run()
            .await;

        if let Err(failure) = report.into_result() {
            return Err(step_error(id, Some("during update"), failure));
        }

        self.read_vgw_conn(id, identity).await
    }

    pub(crate) async fn delete_vgw_conn(
        &self,
        id: &ResourceId,
        identity: &CompositeId,
    ) -> ProviderResult<()> {
        log::info!("Deleting VGW connection {}", identity);
        match self
            .client()
            .delete_vgw_conn(identity.first(), identity.second())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if matches!(e, ApiError::NotFound) || e.mentions(ABSENT_MARKER) => {
                log::info!("VGW connection {} already absent", identity);
                Ok(())
            }
            Err(e) => Err(ProviderError::new(format!(
                "failed to delete VGW connection {}: {}",
                identity, e
            ))
            .with_cause(e)
            .for_resource(id.clone())),
        }
    }
}
