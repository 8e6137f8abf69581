//! Campaign descriptor parsing.
//!
//! The descriptor is the `campaign.json` document written next to the
//! staged media. Attribute values may be strings, numbers or booleans;
//! anything missing or malformed falls back to the surface defaults.

use std::path::{Component, Path};

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_AD_DURATION_MS;
use crate::error::AdReelError;
use crate::models::{
    parse_tracking, sanitize_duration, AdSlot, CampaignDescriptor, IndexSpec, MediaRef,
    ParsedCampaign, SlotDefaults, Transition,
};

const IMAGE_KIND: &str = "image";

/// A loosely typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl AttrValue {
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Flag(flag) => flag.to_string(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Campaign-level attributes as written by the ad server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_view_index: Option<AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_view_index: Option<AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_cycle: Option<AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<AttrValue>,
}

/// One slot entry of the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_animation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_animation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_duration: Option<AttrValue>,
}

/// The descriptor document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignDocument {
    #[serde(default)]
    pub campaign: CampaignAttributes,
    #[serde(default)]
    pub slots: Vec<SlotEntry>,
}

/// Parses a staged descriptor into a campaign.
///
/// Slots that are not images, or whose media is missing under
/// `media_root`, are skipped.
///
/// # Errors
///
/// Returns a parse error when the descriptor is not a valid document.
pub fn parse_campaign(
    descriptor: &[u8],
    media_root: &Path,
    defaults: &SlotDefaults,
) -> Result<ParsedCampaign, Report<AdReelError>> {
    let document: CampaignDocument =
        serde_json::from_slice(descriptor).change_context(AdReelError::Parse {
            message: "Malformed campaign descriptor".to_string(),
        })?;

    let descriptor = parse_descriptor(&document.campaign);
    let slots = document
        .slots
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            parse_slot(entry, position, &descriptor.campaign_id, media_root, defaults)
        })
        .collect::<Vec<_>>();

    log::debug!(
        "Parsed campaign {}: {} of {} slots usable",
        descriptor.campaign_id,
        slots.len(),
        document.slots.len()
    );

    Ok(ParsedCampaign { descriptor, slots })
}

fn parse_descriptor(attributes: &CampaignAttributes) -> CampaignDescriptor {
    let mut descriptor = CampaignDescriptor::new(attributes.id.as_deref().unwrap_or_default());
    descriptor.campaign_account = attributes
        .account
        .as_deref()
        .map(str::trim)
        .filter(|account| !account.is_empty())
        .map(str::to_string);
    descriptor.base_index = parse_index(attributes.base_view_index.as_ref(), "base_view_index");
    descriptor.final_index = parse_index(attributes.final_view_index.as_ref(), "final_view_index");
    descriptor.repeat_count = attributes
        .repeat_cycle
        .as_ref()
        .and_then(|value| value.as_text().trim().parse::<i32>().ok());
    descriptor.refresh_interval_ms = attributes
        .refresh_interval
        .as_ref()
        .and_then(|value| value.as_text().trim().parse::<u64>().ok());
    descriptor
}

fn parse_index(value: Option<&AttrValue>, name: &str) -> Option<IndexSpec> {
    let text = value?.as_text();
    match text.parse::<IndexSpec>() {
        Ok(spec) => Some(spec),
        Err(err) => {
            log::warn!("Ignoring campaign {name}: {err}");
            None
        }
    }
}

fn parse_slot(
    entry: &SlotEntry,
    position: usize,
    campaign_id: &str,
    media_root: &Path,
    defaults: &SlotDefaults,
) -> Option<AdSlot> {
    let kind = entry.kind.as_deref().unwrap_or(IMAGE_KIND);
    if !kind.eq_ignore_ascii_case(IMAGE_KIND) {
        log::debug!("Skipping slot {position} of unsupported type '{kind}'");
        return None;
    }

    let media_name = entry.media.as_deref()?;
    if !is_contained(Path::new(media_name)) {
        log::warn!("Skipping slot {position}: media path '{media_name}' escapes the campaign");
        return None;
    }
    let media_path = media_root.join(media_name);
    if !media_path.is_file() {
        log::warn!("Skipping slot {position}: media file '{media_name}' not found");
        return None;
    }

    let id = entry
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("{campaign_id}-{position}"));
    let mut slot = AdSlot::new(id, defaults);
    slot.title = entry.title.clone();
    slot.description = entry.description.clone();
    if let Some(link) = entry.link.as_deref().map(str::trim) {
        if !link.is_empty() {
            slot.link = Some(link.to_string());
        }
    }
    let tracking = entry.tracking.as_ref().map(AttrValue::as_text);
    slot.tracked = parse_tracking(tracking.as_deref(), defaults.tracked);
    let duration = entry.duration.as_ref().map(AttrValue::as_text);
    slot.display_duration_ms = sanitize_duration(duration.as_deref(), DEFAULT_AD_DURATION_MS);
    if let Some(name) = &entry.in_animation {
        slot.transition_in = Transition::parse_in(name);
    }
    if let Some(name) = &entry.out_animation {
        slot.transition_out = Transition::parse_out(name);
    }
    let animation = entry.animation_duration.as_ref().map(AttrValue::as_text);
    slot.transition_duration_ms =
        sanitize_duration(animation.as_deref(), defaults.transition_duration_ms);
    slot.media = Some(MediaRef::new(media_path));
    Some(slot)
}

/// True when `path` is relative and never climbs out of its root.
#[must_use]
pub fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
