//! In-memory control plane used by the handler tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use meridian_core::provider::BoxFuture;
use meridian_core::retry::Sleeper;

use crate::client::{
    ApiError, ApiResult, ControlPlane, DomainConnectionPolicy, LearnedCidrApproval,
    TransitAdvancedConfig, VgwConn, VgwConnDetail,
};

/// Keeps objects in memory and records every call as "<method> <args>"
#[derive(Default)]
pub struct MockControlPlane {
    calls: Mutex<Vec<String>>,
    /// Errors returned by successive create_vgw_conn calls before one succeeds
    create_errors: Mutex<VecDeque<ApiError>>,
    /// Methods that always fail with the given error
    failing: Mutex<HashMap<&'static str, ApiError>>,
    conns: Mutex<HashMap<(String, String), VgwConnDetail>>,
    approvals: Mutex<HashMap<(String, String), bool>>,
    policies: Mutex<Vec<DomainConnectionPolicy>>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_errors(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.create_errors.lock().unwrap().extend(errors);
        self
    }

    pub fn failing(self, method: &'static str, error: ApiError) -> Self {
        self.failing.lock().unwrap().insert(method, error);
        self
    }

    pub fn with_conn(self, detail: VgwConnDetail) -> Self {
        let key = (detail.conn.conn_name.clone(), detail.conn.vpc_id.clone());
        self.conns.lock().unwrap().insert(key, detail);
        self
    }

    pub fn with_policy(self, policy: DomainConnectionPolicy) -> Self {
        self.policies.lock().unwrap().push(policy);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls whose method name is `method`
    pub fn calls_to(&self, method: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .collect()
    }

    pub fn conn(&self, conn_name: &str, vpc_id: &str) -> Option<VgwConnDetail> {
        self.conns
            .lock()
            .unwrap()
            .get(&(conn_name.to_string(), vpc_id.to_string()))
            .cloned()
    }

    pub fn approval(&self, gw_name: &str, conn_name: &str) -> Option<bool> {
        self.approvals
            .lock()
            .unwrap()
            .get(&(gw_name.to_string(), conn_name.to_string()))
            .copied()
    }

    pub fn policies(&self) -> Vec<DomainConnectionPolicy> {
        self.policies.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, args: &[&str]) -> ApiResult<()> {
        let mut line = method.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.lock().unwrap().push(line);
        match self.failing.lock().unwrap().get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn update_conn_by_gw(
        &self,
        gw_name: &str,
        conn_name: &str,
        f: impl FnOnce(&mut VgwConnDetail),
    ) -> ApiResult<()> {
        let mut conns = self.conns.lock().unwrap();
        let detail = conns
            .values_mut()
            .find(|d| d.conn.gw_name == gw_name && d.conn.conn_name == conn_name)
            .ok_or_else(|| {
                ApiError::rejected("edit", format!("connection {} does not exist", conn_name))
            })?;
        f(detail);
        Ok(())
    }

    fn update_conn_by_vpc(
        &self,
        vpc_id: &str,
        conn_name: &str,
        f: impl FnOnce(&mut VgwConnDetail),
    ) -> ApiResult<()> {
        let mut conns = self.conns.lock().unwrap();
        let detail = conns
            .get_mut(&(conn_name.to_string(), vpc_id.to_string()))
            .ok_or_else(|| {
                ApiError::rejected("edit", format!("connection {} does not exist", conn_name))
            })?;
        f(detail);
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn create_vgw_conn(&self, conn: &VgwConn) -> ApiResult<()> {
        self.record("create_vgw_conn", &[conn.conn_name.as_str(), conn.vpc_id.as_str()])?;
        if let Some(err) = self.create_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let detail = VgwConnDetail {
            conn: conn.clone(),
            ..Default::default()
        };
        self.conns
            .lock()
            .unwrap()
            .insert((conn.conn_name.clone(), conn.vpc_id.clone()), detail);
        Ok(())
    }

    async fn get_vgw_conn_detail(
        &self,
        conn_name: &str,
        vpc_id: &str,
    ) -> ApiResult<VgwConnDetail> {
        self.record("get_vgw_conn_detail", &[conn_name, vpc_id])?;
        self.conn(conn_name, vpc_id).ok_or(ApiError::NotFound)
    }

    async fn delete_vgw_conn(&self, conn_name: &str, vpc_id: &str) -> ApiResult<()> {
        self.record("delete_vgw_conn", &[conn_name, vpc_id])?;
        match self
            .conns
            .lock()
            .unwrap()
            .remove(&(conn_name.to_string(), vpc_id.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(ApiError::rejected(
                "disconnect_transit_gw",
                format!("Connection {} does not exist", conn_name),
            )),
        }
    }

    async fn enable_learned_cidrs_approval(
        &self,
        gw_name: &str,
        conn_name: &str,
    ) -> ApiResult<()> {
        self.record("enable_learned_cidrs_approval", &[gw_name, conn_name])?;
        self.approvals
            .lock()
            .unwrap()
            .insert((gw_name.to_string(), conn_name.to_string()), true);
        Ok(())
    }

    async fn disable_learned_cidrs_approval(
        &self,
        gw_name: &str,
        conn_name: &str,
    ) -> ApiResult<()> {
        self.record("disable_learned_cidrs_approval", &[gw_name, conn_name])?;
        self.approvals
            .lock()
            .unwrap()
            .insert((gw_name.to_string(), conn_name.to_string()), false);
        Ok(())
    }

    async fn edit_manual_advertised_cidrs(
        &self,
        gw_name: &str,
        conn_name: &str,
        cidrs: &[String],
    ) -> ApiResult<()> {
        let joined = cidrs.join(",");
        self.record("edit_manual_advertised_cidrs", &[gw_name, conn_name, joined.as_str()])?;
        self.update_conn_by_gw(gw_name, conn_name, |d| d.manual_bgp_cidrs = cidrs.to_vec())
    }

    async fn enable_event_triggered_ha(&self, vpc_id: &str, conn_name: &str) -> ApiResult<()> {
        self.record("enable_event_triggered_ha", &[vpc_id, conn_name])?;
        self.update_conn_by_vpc(vpc_id, conn_name, |d| d.event_triggered_ha = true)
    }

    async fn disable_event_triggered_ha(&self, vpc_id: &str, conn_name: &str) -> ApiResult<()> {
        self.record("disable_event_triggered_ha", &[vpc_id, conn_name])?;
        self.update_conn_by_vpc(vpc_id, conn_name, |d| d.event_triggered_ha = false)
    }

    async fn edit_as_path_prepend(
        &self,
        gw_name: &str,
        conn_name: &str,
        prepend_as_path: &[String],
    ) -> ApiResult<()> {
        let joined = prepend_as_path.join(" ");
        self.record("edit_as_path_prepend", &[gw_name, conn_name, joined.as_str()])?;
        self.update_conn_by_gw(gw_name, conn_name, |d| d.prepend_as_path = joined.clone())
    }

    async fn get_transit_gateway_advanced_config(
        &self,
        gw_name: &str,
    ) -> ApiResult<TransitAdvancedConfig> {
        self.record("get_transit_gateway_advanced_config", &[gw_name])?;
        let learned_cidr_approvals = self
            .approvals
            .lock()
            .unwrap()
            .iter()
            .filter(|((gw, _), _)| gw.as_str() == gw_name)
            .map(|((_, conn_name), enabled)| LearnedCidrApproval {
                conn_name: conn_name.clone(),
                enabled_approval: if *enabled { "yes" } else { "no" }.to_string(),
            })
            .collect();
        Ok(TransitAdvancedConfig {
            learned_cidr_approvals,
        })
    }

    async fn create_domain_connection_policy(
        &self,
        policy: &DomainConnectionPolicy,
    ) -> ApiResult<()> {
        self.record(
            "create_domain_connection_policy",
            &[policy.domain_name_1.as_str(), policy.domain_name_2.as_str()],
        )?;
        self.policies.lock().unwrap().push(policy.clone());
        Ok(())
    }

    async fn get_domain_connection_policy(
        &self,
        policy: &DomainConnectionPolicy,
    ) -> ApiResult<DomainConnectionPolicy> {
        self.record(
            "get_domain_connection_policy",
            &[policy.domain_name_1.as_str(), policy.domain_name_2.as_str()],
        )?;
        self.policies
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.connects(&policy.domain_name_1, &policy.domain_name_2))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn delete_domain_connection_policy(
        &self,
        policy: &DomainConnectionPolicy,
    ) -> ApiResult<()> {
        self.record(
            "delete_domain_connection_policy",
            &[policy.domain_name_1.as_str(), policy.domain_name_2.as_str()],
        )?;
        let mut policies = self.policies.lock().unwrap();
        let before = policies.len();
        policies.retain(|p| !p.connects(&policy.domain_name_1, &policy.domain_name_2));
        if policies.len() == before {
            return Err(ApiError::rejected(
                "disconnect_multicloud_security_domains",
                "Connection policy does not exist",
            ));
        }
        Ok(())
    }
}

/// Records requested sleeps without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.slept.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}
