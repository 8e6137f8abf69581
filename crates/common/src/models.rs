//! Data model shared by the rotation engine, the campaign parser and the
//! presentation side.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AD_DURATION_MS, DEFAULT_CAMPAIGN_ID, DEFAULT_TRANSITION_DURATION_MS, LINK_APP_PREFIX,
    LINK_NONE,
};

/// Enter/exit effect played when a slot is shown or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    SlideInFromLeft,
    SlideInFromTop,
    SlideInFromRight,
    SlideInFromBottom,
    FadeIn,
    ZoomInFromLeft,
    ZoomInFromRight,
    ZoomInFromCenter,
    SlideOutToRight,
    SlideOutToBottom,
    SlideOutToLeft,
    SlideOutToTop,
    FadeOut,
    ZoomOutToLeft,
    ZoomOutToRight,
    ZoomOutToCenter,
    None,
}

impl Transition {
    const NAMES: [(&'static str, Transition); 17] = [
        ("slide_in_from_left", Transition::SlideInFromLeft),
        ("slide_in_from_top", Transition::SlideInFromTop),
        ("slide_in_from_right", Transition::SlideInFromRight),
        ("slide_in_from_bottom", Transition::SlideInFromBottom),
        ("fade_in", Transition::FadeIn),
        ("zoom_in_from_left", Transition::ZoomInFromLeft),
        ("zoom_in_from_right", Transition::ZoomInFromRight),
        ("zoom_in_from_center", Transition::ZoomInFromCenter),
        ("slide_out_to_right", Transition::SlideOutToRight),
        ("slide_out_to_bottom", Transition::SlideOutToBottom),
        ("slide_out_to_left", Transition::SlideOutToLeft),
        ("slide_out_to_top", Transition::SlideOutToTop),
        ("fade_out", Transition::FadeOut),
        ("zoom_out_to_left", Transition::ZoomOutToLeft),
        ("zoom_out_to_right", Transition::ZoomOutToRight),
        ("zoom_out_to_center", Transition::ZoomOutToCenter),
        ("none", Transition::None),
    ];

    /// Looks up a transition by name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::NAMES
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, transition)| *transition)
    }

    /// Parses an enter effect; unknown names fall back to `fade_in`.
    #[must_use]
    pub fn parse_in(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Self::FadeIn)
    }

    /// Parses an exit effect; unknown names fall back to `fade_out`.
    #[must_use]
    pub fn parse_out(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Self::FadeOut)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, transition)| *transition == self)
            .map_or("none", |(name, _)| name)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to a renderable resource on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef(PathBuf);

impl MediaRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.0
    }
}

/// One advertisement's display configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdSlot {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub tracked: bool,
    pub display_duration_ms: u64,
    pub transition_in: Transition,
    pub transition_out: Transition,
    pub transition_duration_ms: u64,
    pub media: Option<MediaRef>,
}

impl AdSlot {
    /// Creates a slot carrying only the given defaults.
    pub fn new(id: impl Into<String>, defaults: &SlotDefaults) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            link: defaults.link.clone(),
            tracked: defaults.tracked,
            display_duration_ms: defaults.display_duration_ms,
            transition_in: defaults.transition_in,
            transition_out: defaults.transition_out,
            transition_duration_ms: defaults.transition_duration_ms,
            media: None,
        }
    }

    /// Where a tap on this slot leads.
    #[must_use]
    pub fn link_target(&self) -> LinkTarget<'_> {
        let link = self.link.as_deref().map(str::trim).unwrap_or_default();
        if link.is_empty() {
            LinkTarget::Missing
        } else if link.eq_ignore_ascii_case(LINK_NONE) {
            LinkTarget::Suppressed
        } else if let Some(param) = link.strip_prefix(LINK_APP_PREFIX) {
            LinkTarget::InApp(param)
        } else {
            LinkTarget::External(link)
        }
    }
}

/// A slot's link, sorted by how the host should follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget<'a> {
    Missing,
    /// The link is `none`: taps are tracked but go nowhere.
    Suppressed,
    /// `app/<param>`, handled inside the host application.
    InApp(&'a str),
    External(&'a str),
}

/// Fallback values applied to slots that leave attributes unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDefaults {
    pub link: Option<String>,
    pub tracked: bool,
    pub transition_in: Transition,
    pub transition_out: Transition,
    pub display_duration_ms: u64,
    pub transition_duration_ms: u64,
}

impl Default for SlotDefaults {
    fn default() -> Self {
        Self {
            link: None,
            tracked: false,
            transition_in: Transition::FadeIn,
            transition_out: Transition::FadeOut,
            display_duration_ms: DEFAULT_AD_DURATION_MS,
            transition_duration_ms: DEFAULT_TRANSITION_DURATION_MS,
        }
    }
}

/// Parses a positive millisecond value, falling back when it is missing,
/// malformed or not positive.
#[must_use]
pub fn sanitize_duration(raw: Option<&str>, fallback: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value > 0)
        .and_then(|value| u64::try_from(value).ok())
        .unwrap_or(fallback)
}

/// Tracking flag: only the literal `true` enables it.
#[must_use]
pub fn parse_tracking(raw: Option<&str>, fallback: bool) -> bool {
    raw.map_or(fallback, |value| value.trim().eq_ignore_ascii_case("true"))
}

/// A slot index as written by a host or campaign: absolute, or `+N` past
/// the static prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum IndexSpec {
    Absolute(usize),
    PastStatic(usize),
}

impl IndexSpec {
    /// Normalizes to an absolute index clamped into `[0, last_index]`.
    #[must_use]
    pub fn resolve(self, static_len: usize, last_index: usize) -> usize {
        let index = match self {
            Self::Absolute(index) => index,
            Self::PastStatic(offset) => static_len.saturating_add(offset),
        };
        index.min(last_index)
    }
}

impl FromStr for IndexSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (relative, digits) = match trimmed.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let value = digits
            .parse::<usize>()
            .map_err(|_| format!("invalid slot index '{s}'"))?;
        Ok(if relative {
            Self::PastStatic(value)
        } else {
            Self::Absolute(value)
        })
    }
}

impl TryFrom<String> for IndexSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(index) => write!(f, "{index}"),
            Self::PastStatic(offset) => write!(f, "+{offset}"),
        }
    }
}

/// Campaign-level attributes of a fetched campaign.
///
/// Optional fields that are absent keep the host-configured values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignDescriptor {
    pub campaign_id: String,
    pub campaign_account: Option<String>,
    pub base_index: Option<IndexSpec>,
    pub final_index: Option<IndexSpec>,
    pub repeat_count: Option<i32>,
    pub refresh_interval_ms: Option<u64>,
}

impl CampaignDescriptor {
    pub fn new(campaign_id: impl Into<String>) -> Self {
        let campaign_id = campaign_id.into();
        Self {
            campaign_id: normalize_campaign_id(&campaign_id),
            campaign_account: None,
            base_index: None,
            final_index: None,
            repeat_count: None,
            refresh_interval_ms: None,
        }
    }
}

/// Empty campaign ids are replaced by `default`.
#[must_use]
pub fn normalize_campaign_id(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() {
        DEFAULT_CAMPAIGN_ID.to_string()
    } else {
        id.to_string()
    }
}

/// Result of parsing a staged campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCampaign {
    pub descriptor: CampaignDescriptor,
    pub slots: Vec<AdSlot>,
}

/// Screen density bucket reported to the ad server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenDensity {
    Ldpi,
    Mdpi,
    Hdpi,
    Xhdpi,
    Xxhdpi,
    Xxxhdpi,
}

impl ScreenDensity {
    #[must_use]
    pub fn from_dpi(dpi: u32) -> Self {
        match dpi {
            120 => Self::Ldpi,
            160 => Self::Mdpi,
            240 => Self::Hdpi,
            480 => Self::Xxhdpi,
            640 => Self::Xxxhdpi,
            _ => Self::Xhdpi,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ldpi => "ldpi",
            Self::Mdpi => "mdpi",
            Self::Hdpi => "hdpi",
            Self::Xhdpi => "xhdpi",
            Self::Xxhdpi => "xxhdpi",
            Self::Xxxhdpi => "xxxhdpi",
        }
    }
}

impl fmt::Display for ScreenDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_lookup_is_case_insensitive() {
        assert_eq!(
            Transition::from_name("Zoom_In_From_Center"),
            Some(Transition::ZoomInFromCenter)
        );
        assert_eq!(Transition::from_name("NONE"), Some(Transition::None));
        assert_eq!(Transition::from_name("spin"), None);
    }

    #[test]
    fn test_unknown_transition_falls_back_per_direction() {
        assert_eq!(Transition::parse_in("wobble"), Transition::FadeIn);
        assert_eq!(Transition::parse_out("wobble"), Transition::FadeOut);
        assert_eq!(
            Transition::parse_out("slide_out_to_top"),
            Transition::SlideOutToTop
        );
    }

    #[test]
    fn test_transition_name_round_trips() {
        for (name, transition) in Transition::NAMES {
            assert_eq!(transition.name(), name);
        }
    }

    #[test]
    fn test_sanitize_duration() {
        assert_eq!(sanitize_duration(Some("2500"), 60_000), 2_500);
        assert_eq!(sanitize_duration(Some("0"), 60_000), 60_000);
        assert_eq!(sanitize_duration(Some("-5"), 60_000), 60_000);
        assert_eq!(sanitize_duration(Some("soon"), 500), 500);
        assert_eq!(sanitize_duration(None, 500), 500);
    }

    #[test]
    fn test_parse_tracking() {
        assert!(parse_tracking(Some("TRUE"), false));
        assert!(!parse_tracking(Some("yes"), true));
        assert!(parse_tracking(None, true));
    }

    #[test]
    fn test_index_spec_parsing() {
        assert_eq!("3".parse::<IndexSpec>(), Ok(IndexSpec::Absolute(3)));
        assert_eq!("+2".parse::<IndexSpec>(), Ok(IndexSpec::PastStatic(2)));
        assert!("+x".parse::<IndexSpec>().is_err());
        assert!("-1".parse::<IndexSpec>().is_err());
        assert_eq!(IndexSpec::PastStatic(2).to_string(), "+2");
    }

    #[test]
    fn test_index_spec_resolve_clamps() {
        assert_eq!(IndexSpec::PastStatic(1).resolve(2, 5), 3);
        assert_eq!(IndexSpec::PastStatic(9).resolve(2, 5), 5);
        assert_eq!(IndexSpec::Absolute(7).resolve(0, 4), 4);
    }

    #[test]
    fn test_screen_density_buckets() {
        assert_eq!(ScreenDensity::from_dpi(120).as_str(), "ldpi");
        assert_eq!(ScreenDensity::from_dpi(640).as_str(), "xxxhdpi");
        assert_eq!(ScreenDensity::from_dpi(213), ScreenDensity::Xhdpi);
    }

    #[test]
    fn test_empty_campaign_id_becomes_default() {
        assert_eq!(CampaignDescriptor::new("  ").campaign_id, "default");
        assert_eq!(CampaignDescriptor::new("spring").campaign_id, "spring");
    }

    #[test]
    fn test_link_target() {
        let mut slot = AdSlot::new("a", &SlotDefaults::default());
        assert_eq!(slot.link_target(), LinkTarget::Missing);
        slot.link = Some("  ".to_string());
        assert_eq!(slot.link_target(), LinkTarget::Missing);
        slot.link = Some("None".to_string());
        assert_eq!(slot.link_target(), LinkTarget::Suppressed);
        slot.link = Some("app/settings".to_string());
        assert_eq!(slot.link_target(), LinkTarget::InApp("settings"));
        slot.link = Some(" https://example.com ".to_string());
        assert_eq!(slot.link_target(), LinkTarget::External("https://example.com"));
    }
}
