use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::{
    DEFAULT_ACCOUNT_ID, DEFAULT_BACKOFF_TICK_MS, DEFAULT_CAMPAIGN_ID, DEFAULT_EVENT_QUEUE_DEPTH,
    DEFAULT_MAX_DELAY_TICKS, DEFAULT_MAX_ERRORS, DEFAULT_SCREEN_DPI, DEFAULT_SLOT_DURATION_MS,
    DEFAULT_TIMEOUT_MS, DEFAULT_TRANSITION_DURATION_MS, ENV_PREFIX, ENV_SEPARATOR,
    MAX_REFRESH_INTERVAL_MS, MIN_REFRESH_INTERVAL_MS,
};
use crate::error::AdReelError;
use crate::models::{
    normalize_campaign_id, AdSlot, IndexSpec, MediaRef, SlotDefaults, Transition,
};
use crate::rotation::RotationPolicy;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Server {
    #[validate(url)]
    pub campaign_url: String,
    #[serde(default)]
    #[validate(url)]
    pub tracking_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 100, max = 300_000))]
    pub timeout_ms: u64,
}

impl Server {
    /// Tracking requests go to the campaign endpoint unless overridden.
    #[must_use]
    pub fn tracking_url(&self) -> &str {
        self.tracking_url.as_deref().unwrap_or(&self.campaign_url)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Policy {
    #[serde(default = "default_max_errors")]
    #[validate(range(min = 1))]
    pub max_errors: u32,
    #[serde(default = "default_max_delay_ticks")]
    pub max_delay_ticks: u32,
    #[serde(default = "default_backoff_tick_ms")]
    #[validate(range(min = 1))]
    pub backoff_tick_ms: u64,
    #[serde(default = "default_slot_ms")]
    #[validate(range(min = 1))]
    pub default_slot_ms: u64,
    #[serde(default = "default_min_refresh_ms")]
    pub min_refresh_ms: u64,
    #[serde(default = "default_max_refresh_ms")]
    pub max_refresh_ms: u64,
    #[serde(default = "default_event_queue_depth")]
    #[validate(range(min = 1, max = 4096))]
    pub event_queue_depth: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
            max_delay_ticks: default_max_delay_ticks(),
            backoff_tick_ms: default_backoff_tick_ms(),
            default_slot_ms: default_slot_ms(),
            min_refresh_ms: default_min_refresh_ms(),
            max_refresh_ms: default_max_refresh_ms(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Staging {
    #[serde(default = "default_staging_root")]
    pub root: PathBuf,
}

impl Default for Staging {
    fn default() -> Self {
        Self {
            root: default_staging_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Device {
    #[validate(length(min = 1))]
    pub app_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_screen_dpi")]
    pub screen_dpi: u32,
}

/// A slot declared by the host; it stays in front of every campaign.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StaticSlotConfig {
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(default)]
    pub media: Option<PathBuf>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub tracking: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub in_animation: Option<String>,
    #[serde(default)]
    pub out_animation: Option<String>,
    #[serde(default)]
    pub animation_duration_ms: Option<u64>,
}

/// Host-side options for one rotation surface.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SurfaceConfig {
    #[serde(default = "default_account_id")]
    #[validate(length(min = 1))]
    pub account_id: String,
    #[serde(default = "default_campaign_id")]
    pub campaign_id: String,
    #[serde(default)]
    pub custom_spec: Option<String>,
    #[serde(default)]
    pub default_link: Option<String>,
    #[serde(default = "default_in_animation")]
    pub default_in_animation: String,
    #[serde(default = "default_out_animation")]
    pub default_out_animation: String,
    #[serde(default)]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_display_interval_ms")]
    #[validate(range(min = 1))]
    pub default_display_interval_ms: u64,
    #[serde(default = "default_animation_duration_ms")]
    pub default_animation_duration_ms: u64,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_index")]
    pub base_view_index: Option<IndexSpec>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_index")]
    pub final_view_index: Option<IndexSpec>,
    #[serde(default)]
    pub repeat_cycle: Option<i32>,
    #[serde(default)]
    pub default_tracking: bool,
    #[serde(default = "default_true")]
    pub ad_processing: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    #[validate(nested)]
    pub static_slots: Vec<StaticSlotConfig>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            campaign_id: default_campaign_id(),
            custom_spec: None,
            default_link: None,
            default_in_animation: default_in_animation(),
            default_out_animation: default_out_animation(),
            refresh_interval_ms: 0,
            default_display_interval_ms: default_display_interval_ms(),
            default_animation_duration_ms: default_animation_duration_ms(),
            base_view_index: None,
            final_view_index: None,
            repeat_cycle: None,
            default_tracking: false,
            ad_processing: true,
            debug: false,
            width: 0,
            height: 0,
            static_slots: Vec::new(),
        }
    }
}

impl SurfaceConfig {
    /// Defaults applied to slots of fetched campaigns.
    #[must_use]
    pub fn campaign_slot_defaults(&self) -> SlotDefaults {
        SlotDefaults {
            link: self.default_link.clone(),
            tracked: self.default_tracking,
            transition_in: Transition::parse_in(&self.default_in_animation),
            transition_out: Transition::parse_out(&self.default_out_animation),
            transition_duration_ms: positive_or(
                self.default_animation_duration_ms,
                DEFAULT_TRANSITION_DURATION_MS,
            ),
            ..SlotDefaults::default()
        }
    }

    /// Builds the static prefix declared for this surface.
    #[must_use]
    pub fn build_static_slots(&self) -> Vec<AdSlot> {
        let defaults = SlotDefaults {
            display_duration_ms: self.default_display_interval_ms,
            ..self.campaign_slot_defaults()
        };
        self.static_slots
            .iter()
            .map(|entry| {
                let mut slot = AdSlot::new(entry.id.clone(), &defaults);
                slot.title = entry.title.clone();
                if entry.link.is_some() {
                    slot.link = entry.link.clone();
                }
                slot.tracked = entry.tracking.unwrap_or(defaults.tracked);
                slot.display_duration_ms =
                    positive_or(entry.duration_ms.unwrap_or(0), defaults.display_duration_ms);
                if let Some(name) = &entry.in_animation {
                    slot.transition_in = Transition::parse_in(name);
                }
                if let Some(name) = &entry.out_animation {
                    slot.transition_out = Transition::parse_out(name);
                }
                slot.transition_duration_ms = positive_or(
                    entry.animation_duration_ms.unwrap_or(0),
                    defaults.transition_duration_ms,
                );
                slot.media = entry.media.clone().map(MediaRef::new);
                slot
            })
            .collect()
    }

    #[must_use]
    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy {
            base_index: self.base_view_index,
            final_index: self.final_view_index,
            repeat_count: self.repeat_cycle,
        }
    }

    #[must_use]
    pub fn normalized_campaign_id(&self) -> String {
        normalize_campaign_id(&self.campaign_id)
    }

    #[must_use]
    pub fn normalized_account_id(&self) -> String {
        let account = self.account_id.trim();
        if account.is_empty() {
            DEFAULT_ACCOUNT_ID.to_string()
        } else {
            account.to_string()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub server: Server,
    #[serde(default)]
    #[validate(nested)]
    pub policy: Policy,
    #[serde(default)]
    pub staging: Staging,
    #[validate(nested)]
    pub device: Device,
    #[serde(default)]
    #[validate(nested)]
    pub surfaces: Vec<SurfaceConfig>,
}

impl Settings {
    /// Loads settings from TOML, applying `ADREEL__` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the TOML is malformed or a
    /// required field is missing.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<AdReelError>> {
        let environment = Environment::default()
            .prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(AdReelError::Configuration {
                message: "Failed to build configuration".to_string(),
            })?;

        config
            .try_deserialize()
            .change_context(AdReelError::Configuration {
                message: "Failed to deserialize configuration".to_string(),
            })
    }

    /// Loads and validates settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when loading fails or a value is out
    /// of range.
    pub fn from_toml_validated(toml_str: &str) -> Result<Self, Report<AdReelError>> {
        let settings = Self::from_toml(toml_str)?;
        settings
            .validate()
            .change_context(AdReelError::Configuration {
                message: "Settings validation failed".to_string(),
            })?;
        if settings.policy.min_refresh_ms > settings.policy.max_refresh_ms {
            return Err(Report::new(AdReelError::Configuration {
                message: format!(
                    "policy.min_refresh_ms ({}) exceeds policy.max_refresh_ms ({})",
                    settings.policy.min_refresh_ms, settings.policy.max_refresh_ms
                ),
            }));
        }
        Ok(settings)
    }

    /// Serializes the effective settings, environment overrides included.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization fails.
    pub fn to_canonical_toml(&self) -> Result<String, Report<AdReelError>> {
        toml::to_string(self).change_context(AdReelError::Configuration {
            message: "Failed to serialize settings".to_string(),
        })
    }

    /// Whether any surface asked for debug output.
    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.surfaces.iter().any(|surface| surface.debug)
    }
}

fn serialize_index<S: serde::Serializer>(
    value: &Option<IndexSpec>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(spec) => serializer.serialize_str(&spec.to_string()),
        None => serializer.serialize_none(),
    }
}

fn positive_or(value: u64, fallback: u64) -> u64 {
    if value > 0 {
        value
    } else {
        fallback
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_errors() -> u32 {
    DEFAULT_MAX_ERRORS
}

fn default_max_delay_ticks() -> u32 {
    DEFAULT_MAX_DELAY_TICKS
}

fn default_backoff_tick_ms() -> u64 {
    DEFAULT_BACKOFF_TICK_MS
}

fn default_slot_ms() -> u64 {
    DEFAULT_SLOT_DURATION_MS
}

fn default_min_refresh_ms() -> u64 {
    MIN_REFRESH_INTERVAL_MS
}

fn default_max_refresh_ms() -> u64 {
    MAX_REFRESH_INTERVAL_MS
}

fn default_event_queue_depth() -> usize {
    DEFAULT_EVENT_QUEUE_DEPTH
}

fn default_staging_root() -> PathBuf {
    std::env::temp_dir().join("adreel")
}

fn default_screen_dpi() -> u32 {
    DEFAULT_SCREEN_DPI
}

fn default_account_id() -> String {
    DEFAULT_ACCOUNT_ID.to_string()
}

fn default_campaign_id() -> String {
    DEFAULT_CAMPAIGN_ID.to_string()
}

fn default_in_animation() -> String {
    Transition::FadeIn.name().to_string()
}

fn default_out_animation() -> String {
    Transition::FadeOut.name().to_string()
}

fn default_display_interval_ms() -> u64 {
    DEFAULT_SLOT_DURATION_MS
}

fn default_animation_duration_ms() -> u64 {
    DEFAULT_TRANSITION_DURATION_MS
}

fn default_true() -> bool {
    true
}
