//! Ad server transport: request contract, network probe and the default
//! HTTP implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use error_stack::Report;
use ureq::Agent;

use crate::error::{AdReelError, TransportErrorKind};
use crate::models::ScreenDensity;
use crate::settings::{Device, Server, SurfaceConfig};

/// Server operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetAdSet = 301,
    TrackAd = 401,
}

impl Operation {
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Identity of the device and application making requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub app_id: String,
    pub device_id: String,
    pub screen_density: ScreenDensity,
}

impl DeviceContext {
    /// Uses the configured device id, or a random one for this process.
    #[must_use]
    pub fn from_settings(device: &Device) -> Self {
        let device_id = device
            .device_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            app_id: device.app_id.clone(),
            device_id,
            screen_density: ScreenDensity::from_dpi(device.screen_dpi),
        }
    }
}

/// Request fields that depend on the surface asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceProfile {
    pub account_id: String,
    pub campaign_id: String,
    pub custom_spec: Option<String>,
    pub default_tracking: bool,
    pub view_width: u32,
    pub view_height: u32,
}

impl SurfaceProfile {
    #[must_use]
    pub fn from_config(config: &SurfaceConfig) -> Self {
        Self {
            account_id: config.normalized_account_id(),
            campaign_id: config.normalized_campaign_id(),
            custom_spec: config.custom_spec.clone(),
            default_tracking: config.default_tracking,
            view_width: config.width,
            view_height: config.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRequest {
    pub operation: Operation,
    pub tracking: bool,
    pub account_id: String,
    pub app_id: String,
    pub campaign_account: Option<String>,
    pub campaign_id: String,
    pub custom_spec: Option<String>,
    pub device_id: String,
    pub screen_density: ScreenDensity,
    pub view_width: u32,
    pub view_height: u32,
}

impl CampaignRequest {
    #[must_use]
    pub fn new(
        device: &DeviceContext,
        profile: &SurfaceProfile,
        campaign_account: Option<String>,
    ) -> Self {
        Self {
            operation: Operation::GetAdSet,
            tracking: profile.default_tracking,
            account_id: profile.account_id.clone(),
            app_id: device.app_id.clone(),
            campaign_account,
            campaign_id: profile.campaign_id.clone(),
            custom_spec: profile.custom_spec.clone(),
            device_id: device.device_id.clone(),
            screen_density: device.screen_density,
            view_width: profile.view_width,
            view_height: profile.view_height,
        }
    }

    /// Query parameters sent with the request. Absent optional fields are
    /// sent empty.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("op", self.operation.code().to_string()),
            ("tracking", self.tracking.to_string()),
            ("account", self.account_id.clone()),
            ("app", self.app_id.clone()),
            (
                "campaign_account",
                self.campaign_account.clone().unwrap_or_default(),
            ),
            ("campaign", self.campaign_id.clone()),
            ("spec", self.custom_spec.clone().unwrap_or_default()),
            ("device", self.device_id.clone()),
            ("density", self.screen_density.to_string()),
            ("width", self.view_width.to_string()),
            ("height", self.view_height.to_string()),
        ]
    }
}

/// Tap-through tracking for one ad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRequest {
    pub request: CampaignRequest,
    pub ad_id: String,
    pub ad_link: Option<String>,
}

impl TrackingRequest {
    #[must_use]
    pub fn new(mut request: CampaignRequest, ad_id: String, ad_link: Option<String>) -> Self {
        request.operation = Operation::TrackAd;
        Self {
            request,
            ad_id,
            ad_link,
        }
    }

    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = self.request.query_pairs();
        pairs.push(("ad", self.ad_id.clone()));
        pairs.push(("link", self.ad_link.clone().unwrap_or_default()));
        pairs
    }
}

/// Fetches campaigns and posts tracking events.
#[async_trait]
pub trait AdTransport: Send + Sync {
    /// Returns the raw campaign payload.
    async fn fetch_campaign(
        &self,
        request: &CampaignRequest,
    ) -> Result<Bytes, Report<AdReelError>>;

    async fn fetch_tracking(&self, request: &TrackingRequest) -> Result<(), Report<AdReelError>>;
}

/// Reports whether the device currently has network access.
pub trait NetworkProbe: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Probe controlled by the host; starts online.
#[derive(Debug)]
pub struct NetworkSwitch {
    online: AtomicBool,
}

impl NetworkSwitch {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for NetworkSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkProbe for NetworkSwitch {
    fn is_available(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

/// Blocking HTTP transport run on tokio's blocking pool.
#[derive(Clone)]
pub struct HttpTransport {
    agent: Agent,
    campaign_url: Arc<str>,
    tracking_url: Arc<str>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(server: &Server) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(server.timeout_ms)))
            .build()
            .into();
        Self {
            agent,
            campaign_url: Arc::from(server.campaign_url.as_str()),
            tracking_url: Arc::from(server.tracking_url()),
        }
    }

    fn get(agent: &Agent, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, Report<AdReelError>> {
        let mut request = agent.get(url).header("Accept", "application/octet-stream");
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = request.call().map_err(map_ureq_error)?;
        response.into_body().read_to_vec().map_err(map_ureq_error)
    }
}

#[async_trait]
impl AdTransport for HttpTransport {
    async fn fetch_campaign(
        &self,
        request: &CampaignRequest,
    ) -> Result<Bytes, Report<AdReelError>> {
        let agent = self.agent.clone();
        let url = Arc::clone(&self.campaign_url);
        let query = request.query_pairs();
        log::debug!("Requesting campaign {} from {}", request.campaign_id, url);

        let body = tokio::task::spawn_blocking(move || Self::get(&agent, &url, &query))
            .await
            .map_err(|err| {
                Report::new(AdReelError::Runtime {
                    message: format!("Campaign request task failed: {err}"),
                })
            })??;
        Ok(Bytes::from(body))
    }

    async fn fetch_tracking(&self, request: &TrackingRequest) -> Result<(), Report<AdReelError>> {
        let agent = self.agent.clone();
        let url = Arc::clone(&self.tracking_url);
        let query = request.query_pairs();

        tokio::task::spawn_blocking(move || Self::get(&agent, &url, &query))
            .await
            .map_err(|err| {
                Report::new(AdReelError::Runtime {
                    message: format!("Tracking request task failed: {err}"),
                })
            })??;
        Ok(())
    }
}

fn map_ureq_error(err: ureq::Error) -> Report<AdReelError> {
    let kind = match &err {
        ureq::Error::StatusCode(code) => TransportErrorKind::Status(*code),
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::ConnectionFailed => TransportErrorKind::Connect,
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        _ => TransportErrorKind::Io,
    };
    Report::new(AdReelError::Transport {
        kind,
        detail: err.to_string(),
    })
}
