//! HTTP client for the controller API
//!
//! Every action is a form-encoded POST to `/v1/api`. The controller answers with
//! an envelope `{"return": bool, "results": ..., "reason": "..."}`. Calls other
//! than `login` carry the session id (`CID`) obtained from `login`; a session
//! the controller no longer accepts is renewed once per call.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::client::{
    ApiError, ApiResult, ControlPlane, DomainConnectionPolicy, TransitAdvancedConfig, VgwConn,
    VgwConnDetail,
};
use crate::config::ProviderConfig;

const INVALID_SESSION_MARKER: &str = "CID is invalid";
const ABSENT_MARKER: &str = "does not exist";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "return")]
    ok: bool,
    #[serde(default)]
    results: serde_json::Value,
    #[serde(default)]
    reason: String,
    #[serde(rename = "CID", default)]
    cid: Option<String>,
}

/// Controller client over HTTPS
pub struct HttpControlPlane {
    client: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
    cid: Mutex<Option<String>>,
}

impl HttpControlPlane {
    pub fn new(config: &ProviderConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self::with_client(
            client,
            config.api_url(),
            &config.username,
            &config.password,
        ))
    }

    /// Build a client against an explicit API URL (e.g., a local test server)
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        username: &str,
        password: &str,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            username: username.to_string(),
            password: password.to_string(),
            cid: Mutex::new(None),
        }
    }

    /// Log in and cache the session id
    pub async fn login(&self) -> ApiResult<String> {
        let params = [
            ("action", "login"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        let envelope = self.post("login", &params).await?;
        if !envelope.ok {
            return Err(ApiError::rejected("login", envelope.reason));
        }
        let cid = envelope.cid.ok_or_else(|| ApiError::Decode {
            action: "login".to_string(),
            message: "response carries no CID".to_string(),
        })?;
        log::debug!("logged in to controller as {}", self.username);
        *self.cid.lock().await = Some(cid.clone());
        Ok(cid)
    }

    async fn session(&self) -> ApiResult<String> {
        if let Some(cid) = self.cid.lock().await.clone() {
            return Ok(cid);
        }
        self.login().await
    }

    async fn post(&self, action: &str, params: &[(&str, &str)]) -> ApiResult<Envelope> {
        let response = self
            .client
            .post(&self.api_url)
            .form(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Transport(format!(
                "{} returned HTTP {}",
                action,
                status.as_u16()
            )));
        }
        response.json::<Envelope>().await.map_err(|e| ApiError::Decode {
            action: action.to_string(),
            message: e.to_string(),
        })
    }

    /// Post an action and return its `results`
    async fn call(&self, action: &str, params: &[(&str, &str)]) -> ApiResult<serde_json::Value> {
        let mut renewed = false;
        loop {
            let cid = self.session().await?;
            let mut form = vec![("action", action), ("CID", cid.as_str())];
            form.extend_from_slice(params);

            log::debug!("calling controller action {}", action);
            let envelope = self.post(action, &form).await?;
            if envelope.ok {
                return Ok(envelope.results);
            }
            if envelope.reason.contains(INVALID_SESSION_MARKER) && !renewed {
                log::debug!("controller session expired, logging in again");
                renewed = true;
                self.login().await?;
                continue;
            }
            return Err(ApiError::rejected(action, envelope.reason));
        }
    }

    /// Like `call`, mapping an "absent object" rejection to `ApiError::NotFound`
    async fn lookup<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> ApiResult<T> {
        let results = match self.call(action, params).await {
            Ok(results) => results,
            Err(e @ ApiError::Rejected { .. }) if e.mentions(ABSENT_MARKER) => {
                return Err(ApiError::NotFound);
            }
            Err(e) => return Err(e),
        };
        decode(action, results)
    }
}

fn decode<T: DeserializeOwned>(action: &str, results: serde_json::Value) -> ApiResult<T> {
    serde_json::from_value(results).map_err(|e| ApiError::Decode {
        action: action.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct DomainPolicyEntry {
    domain_name: String,
    #[serde(default)]
    connected_domains: Vec<String>,
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_vgw_conn(&self, conn: &VgwConn) -> ApiResult<()> {
        self.call(
            "connect_transit_gw_to_vgw",
            &[
                ("vpc_id", conn.vpc_id.as_str()),
                ("connection_name", conn.conn_name.as_str()),
                ("transit_gw", conn.gw_name.as_str()),
                ("bgp_vgw_id", conn.bgp_vgw_id.as_str()),
                ("bgp_vgw_account_name", conn.bgp_vgw_account.as_str()),
                ("bgp_vgw_region", conn.bgp_vgw_region.as_str()),
                ("bgp_local_as_number", conn.bgp_local_as_num.as_str()),
            ],
        )
        .await
        .map(drop)
    }

    async fn get_vgw_conn_detail(
        &self,
        conn_name: &str,
        vpc_id: &str,
    ) -> ApiResult<VgwConnDetail> {
        self.lookup(
            "get_site2cloud_conn_detail",
            &[("vpc_id", vpc_id), ("conn_name", conn_name)],
        )
        .await
    }

    async fn delete_vgw_conn(&self, conn_name: &str, vpc_id: &str) -> ApiResult<()> {
        self.call(
            "disconnect_transit_gw",
            &[("vpc_id", vpc_id), ("connection_name", conn_name)],
        )
        .await
        .map(drop)
    }

    async fn enable_learned_cidrs_approval(
        &self,
        gw_name: &str,
        conn_name: &str,
    ) -> ApiResult<()> {
        self.call(
            "enable_transit_connection_learned_cidrs_approval",
            &[("gateway_name", gw_name), ("connection_name", conn_name)],
        )
        .await
        .map(drop)
    }

    async fn disable_learned_cidrs_approval(
        &self,
        gw_name: &str,
        conn_name: &str,
    ) -> ApiResult<()> {
        self.call(
            "disable_transit_connection_learned_cidrs_approval",
            &[("gateway_name", gw_name), ("connection_name", conn_name)],
        )
        .await
        .map(drop)
    }

    async fn edit_manual_advertised_cidrs(
        &self,
        gw_name: &str,
        conn_name: &str,
        cidrs: &[String],
    ) -> ApiResult<()> {
        let cidrs = cidrs.join(",");
        self.call(
            "edit_transit_connection_bgp_manual_advertise_cidrs",
            &[
                ("gateway_name", gw_name),
                ("connection_name", conn_name),
                ("conn_bgp_manual_advertise_cidrs", cidrs.as_str()),
            ],
        )
        .await
        .map(drop)
    }

    async fn enable_event_triggered_ha(&self, vpc_id: &str, conn_name: &str) -> ApiResult<()> {
        self.call(
            "enable_site2cloud_event_triggered_ha",
            &[("vpc_id", vpc_id), ("connection_name", conn_name)],
        )
        .await
        .map(drop)
    }

    async fn disable_event_triggered_ha(&self, vpc_id: &str, conn_name: &str) -> ApiResult<()> {
        self.call(
            "disable_site2cloud_event_triggered_ha",
            &[("vpc_id", vpc_id), ("connection_name", conn_name)],
        )
        .await
        .map(drop)
    }

    async fn edit_as_path_prepend(
        &self,
        gw_name: &str,
        conn_name: &str,
        prepend_as_path: &[String],
    ) -> ApiResult<()> {
        let prepend = prepend_as_path.join(" ");
        self.call(
            "edit_transit_connection_as_path_prepend",
            &[
                ("gateway_name", gw_name),
                ("connection_name", conn_name),
                ("connection_as_path_prepend", prepend.as_str()),
            ],
        )
        .await
        .map(drop)
    }

    async fn get_transit_gateway_advanced_config(
        &self,
        gw_name: &str,
    ) -> ApiResult<TransitAdvancedConfig> {
        let action = "get_transit_or_spoke_gateway_details";
        let results = self
            .call(action, &[("gateway_name", gw_name), ("option", "advanced")])
            .await?;
        decode(action, results)
    }

    async fn create_domain_connection_policy(
        &self,
        policy: &DomainConnectionPolicy,
    ) -> ApiResult<()> {
        self.call(
            "connect_multicloud_security_domains",
            &[
                ("domain_name", policy.domain_name_1.as_str()),
                ("connected_domain", policy.domain_name_2.as_str()),
            ],
        )
        .await
        .map(drop)
    }

    async fn get_domain_connection_policy(
        &self,
        policy: &DomainConnectionPolicy,
    ) -> ApiResult<DomainConnectionPolicy> {
        let action = "list_multicloud_security_domain_connection_policies";
        let results = self.call(action, &[]).await?;
        let entries: Vec<DomainPolicyEntry> = decode(action, results)?;
        let connected = entries.iter().any(|entry| {
            entry.connected_domains.iter().any(|other| {
                policy.connects(&entry.domain_name, other)
            })
        });
        if connected {
            Ok(policy.clone())
        } else {
            Err(ApiError::NotFound)
        }
    }

    async fn delete_domain_connection_policy(
        &self,
        policy: &DomainConnectionPolicy,
    ) -> ApiResult<()> {
        self.call(
            "disconnect_multicloud_security_domains",
            &[
                ("domain_name", policy.domain_name_1.as_str()),
                ("connected_domain", policy.domain_name_2.as_str()),
            ],
        )
        .await
        .map(drop)
    }
}
