//! Control plane client abstraction
//!
//! `ControlPlane` is the set of remote calls the resource handlers need. The
//! HTTP implementation lives in `http`; tests drive handlers with an in-memory
//! implementation.

use async_trait::async_trait;
use serde::Deserialize;

/// Error returned by a control plane call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The requested object does not exist
    #[error("object not found")]
    NotFound,

    /// The controller processed the request and refused it
    #[error("rest API {action} failed: {reason}")]
    Rejected { action: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response of {action}: {message}")]
    Decode { action: String, message: String },
}

impl ApiError {
    pub fn rejected(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error text carries `marker`
    pub fn mentions(&self, marker: &str) -> bool {
        self.to_string().contains(marker)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Immutable fields of a transit gateway to VGW connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VgwConn {
    pub conn_name: String,
    pub gw_name: String,
    pub vpc_id: String,
    pub bgp_vgw_id: String,
    pub bgp_vgw_account: String,
    pub bgp_vgw_region: String,
    pub bgp_local_as_num: String,
}

/// A VGW connection as reported by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VgwConnDetail {
    #[serde(flatten)]
    pub conn: VgwConn,
    #[serde(default)]
    pub event_triggered_ha: bool,
    #[serde(default)]
    pub manual_bgp_cidrs: Vec<String>,
    /// Space separated ASNs, empty when no prepend is configured
    #[serde(default)]
    pub prepend_as_path: String,
}

/// Per connection learned CIDR approval setting of a transit gateway
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LearnedCidrApproval {
    pub conn_name: String,
    /// "yes" or "no"
    #[serde(rename = "conn_learned_cidrs_approval")]
    pub enabled_approval: String,
}

/// Advanced configuration of a transit gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransitAdvancedConfig {
    #[serde(default, rename = "connection_learned_cidrs_approval_info")]
    pub learned_cidr_approvals: Vec<LearnedCidrApproval>,
}

impl TransitAdvancedConfig {
    /// Approval state for a connection, `None` when the gateway does not list it
    pub fn approval_for(&self, conn_name: &str) -> Option<bool> {
        self.learned_cidr_approvals
            .iter()
            .find(|a| a.conn_name == conn_name)
            .map(|a| a.enabled_approval == "yes")
    }
}

/// Connection policy between two segmentation domains
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DomainConnectionPolicy {
    pub domain_name_1: String,
    pub domain_name_2: String,
}

impl DomainConnectionPolicy {
    /// Policies are symmetric: (a, b) connects the same domains as (b, a)
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.domain_name_1 == a && self.domain_name_2 == b)
            || (self.domain_name_1 == b && self.domain_name_2 == a)
    }
}

/// Remote calls against the controller
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_vgw_conn(&self, conn: &VgwConn) -> ApiResult<()>;

    /// Returns `ApiError::NotFound` when the connection does not exist
    async fn get_vgw_conn_detail(&self, conn_name: &str, vpc_id: &str)
    -> ApiResult<VgwConnDetail>;

    async fn delete_vgw_conn(&self, conn_name: &str, vpc_id: &str) -> ApiResult<()>;

    async fn enable_learned_cidrs_approval(&self, gw_name: &str, conn_name: &str)
    -> ApiResult<()>;

    async fn disable_learned_cidrs_approval(
        &self,
        gw_name: &str,
        conn_name: &str,
    ) -> ApiResult<()>;

    /// Replaces the whole list; an empty list clears it
    async fn edit_manual_advertised_cidrs(
        &self,
        gw_name: &str,
        conn_name: &str,
        cidrs: &[String],
    ) -> ApiResult<()>;

    async fn enable_event_triggered_ha(&self, vpc_id: &str, conn_name: &str) -> ApiResult<()>;

    async fn disable_event_triggered_ha(&self, vpc_id: &str, conn_name: &str) -> ApiResult<()>;

    /// Replaces the whole ordered list; an empty list clears it
    async fn edit_as_path_prepend(
        &self,
        gw_name: &str,
        conn_name: &str,
        prepend_as_path: &[String],
    ) -> ApiResult<()>;

    async fn get_transit_gateway_advanced_config(
        &self,
        gw_name: &str,
    ) -> ApiResult<TransitAdvancedConfig>;

    async fn create_domain_connection_policy(&self, policy: &DomainConnectionPolicy)
    -> ApiResult<()>;

    /// Returns `ApiError::NotFound` when the domains are not connected
    async fn get_domain_connection_policy(
        &self,
        policy: &DomainConnectionPolicy,
    ) -> ApiResult<DomainConnectionPolicy>;

    async fn delete_domain_connection_policy(&self, policy: &DomainConnectionPolicy)
    -> ApiResult<()>;
}
