use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two broadcast channels served by the guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Primary,
    Secondary,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Primary, Channel::Secondary];

    /// Path segment used by the schedule API.
    pub fn slug(&self) -> &'static str {
        match self {
            Channel::Primary => "main",
            Channel::Secondary => "plus",
        }
    }

    /// Human-readable channel name for headers and previews.
    pub fn display_name(&self) -> &'static str {
        match self {
            Channel::Primary => "Main",
            Channel::Secondary => "Plus",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Presentation flag recomputed on every reconciliation pass.  Derived from
/// the catalog's relationship to "now" — never settable by a caller and
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AiringFlag {
    #[default]
    None,
    OnNow,
    UpNext,
}

/// One scheduled broadcast instance.  Times are absolute UTC; a missing or
/// empty `playback_url` means the airing is not playable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airing {
    pub content_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub image_url_template: String,
    #[serde(default)]
    pub playback_url: Option<String>,
    #[serde(default)]
    pub flag: AiringFlag,
}

impl Airing {
    pub fn is_playable(&self) -> bool {
        self.playback_url
            .as_deref()
            .map(|u| !u.is_empty())
            .unwrap_or(false)
    }

    /// Expand the `{width}`/`{height}` placeholders in the image template.
    pub fn image_url(&self, width: u32, height: u32) -> Option<String> {
        if self.image_url_template.is_empty() {
            return None;
        }
        Some(
            self.image_url_template
                .replace("{width}", &width.to_string())
                .replace("{height}", &height.to_string()),
        )
    }
}

/// One channel's fetched schedule.  Produced wholesale by a fetch and kept
/// sorted by start time; never incrementally patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub channel: Channel,
    pub airings: Vec<Airing>,
}

impl Catalog {
    pub fn new(channel: Channel, mut airings: Vec<Airing>) -> Self {
        airings.sort_by_key(|a| a.start_time);
        Self { channel, airings }
    }

    pub fn is_empty(&self) -> bool {
        self.airings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn airing(id: &str, start_h: u32, end_h: u32) -> Airing {
        Airing {
            content_id: id.to_string(),
            title: id.to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 1, start_h, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 1, end_h, 0, 0).unwrap(),
            image_url_template: String::new(),
            playback_url: None,
            flag: AiringFlag::None,
        }
    }

    #[test]
    fn test_catalog_sorts_on_construction() {
        let catalog = Catalog::new(
            Channel::Primary,
            vec![airing("b", 12, 13), airing("a", 10, 11), airing("c", 14, 15)],
        );
        let ids: Vec<&str> = catalog.airings.iter().map(|a| a.content_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_image_url_substitution() {
        let mut a = airing("a", 10, 11);
        a.image_url_template = "https://img.example.com/a?w={width}&h={height}".to_string();
        assert_eq!(
            a.image_url(480, 270).as_deref(),
            Some("https://img.example.com/a?w=480&h=270")
        );

        a.image_url_template.clear();
        assert!(a.image_url(480, 270).is_none());
    }

    #[test]
    fn test_empty_playback_url_is_not_playable() {
        let mut a = airing("a", 10, 11);
        assert!(!a.is_playable());
        a.playback_url = Some(String::new());
        assert!(!a.is_playable());
        a.playback_url = Some("https://live.example.com/main".to_string());
        assert!(a.is_playable());
    }
}
