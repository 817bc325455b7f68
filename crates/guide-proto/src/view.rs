use crate::catalog::{Airing, Channel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The selected channel's current (on-now or up-next) program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CurrentProgram {
    pub content_id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub playback_url: Option<String>,
}

impl CurrentProgram {
    pub fn has_playback_url(&self) -> bool {
        self.playback_url
            .as_deref()
            .map(|u| !u.is_empty())
            .unwrap_or(false)
    }
}

/// Derived presentation state.  `rev` is a monotonically increasing counter
/// incremented every time the view changes; clients can use it to detect
/// missed updates and request a resync.
///
/// Owned by the engine — presentation clients only ever read snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ViewModel {
    #[serde(default)]
    pub rev: u64,
    pub selected_channel: Channel,
    pub header_title: String,
    pub current_program: Option<CurrentProgram>,
    /// True only while the current program is actually on-now and playable.
    pub playback_enabled: bool,
    pub schedule: Vec<Airing>,
    pub schedule_unavailable: bool,
    pub primary_preview: String,
    pub secondary_preview: String,
    /// Whether the secondary channel has a live (on-now) airing.
    pub secondary_on_now: bool,
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub auth_provider_id: String,
    pub provider_display_name: String,
    pub provider_logo_url: String,
    /// Account-management page opened from the provider logo, when known.
    pub provider_portal_url: String,
}

/// Single-writer store for the [`ViewModel`].  All mutation goes through the
/// engine loop; the TCP server and tests read snapshots via the shared arc.
pub struct ViewStore {
    view: Arc<RwLock<ViewModel>>,
}

impl ViewStore {
    pub fn new() -> Self {
        let view = ViewModel {
            rev: 1,
            ..ViewModel::default()
        };
        Self {
            view: Arc::new(RwLock::new(view)),
        }
    }

    pub fn arc(&self) -> Arc<RwLock<ViewModel>> {
        Arc::clone(&self.view)
    }

    pub async fn snapshot(&self) -> ViewModel {
        self.view.read().await.clone()
    }

    pub async fn set_selected_channel(&self, channel: Channel, header_title: String) {
        let mut view = self.view.write().await;
        view.selected_channel = channel;
        view.header_title = header_title;
        view.rev += 1;
    }

    pub async fn set_current_program(&self, program: Option<CurrentProgram>) {
        let mut view = self.view.write().await;
        view.current_program = program;
        view.rev += 1;
    }

    pub async fn set_playback_enabled(&self, enabled: bool) {
        let mut view = self.view.write().await;
        view.playback_enabled = enabled;
        view.rev += 1;
    }

    /// Replace the schedule list.  An empty list marks the schedule
    /// unavailable instead of clearing the previous one.
    pub async fn set_schedule(&self, airings: Vec<Airing>) {
        let mut view = self.view.write().await;
        if airings.is_empty() {
            view.schedule_unavailable = true;
        } else {
            view.schedule = airings;
            view.schedule_unavailable = false;
        }
        view.rev += 1;
    }

    pub async fn set_schedule_unavailable(&self, unavailable: bool) {
        let mut view = self.view.write().await;
        view.schedule_unavailable = unavailable;
        view.rev += 1;
    }

    pub async fn set_preview(&self, channel: Channel, text: String) {
        let mut view = self.view.write().await;
        match channel {
            Channel::Primary => view.primary_preview = text,
            Channel::Secondary => view.secondary_preview = text,
        }
        view.rev += 1;
    }

    pub async fn set_secondary_on_now(&self, on_now: bool) {
        let mut view = self.view.write().await;
        view.secondary_on_now = on_now;
        view.rev += 1;
    }

    pub async fn set_loading(&self, loading: bool) {
        let mut view = self.view.write().await;
        view.is_loading = loading;
        view.rev += 1;
    }

    pub async fn set_auth_display(
        &self,
        is_authenticated: bool,
        provider_id: String,
        display_name: String,
        logo_url: String,
        portal_url: String,
    ) {
        let mut view = self.view.write().await;
        view.is_authenticated = is_authenticated;
        view.auth_provider_id = provider_id;
        view.provider_display_name = display_name;
        view.provider_logo_url = logo_url;
        view.provider_portal_url = portal_url;
        view.rev += 1;
    }

    pub async fn clear_auth_display(&self) {
        let mut view = self.view.write().await;
        view.is_authenticated = false;
        view.auth_provider_id.clear();
        view.provider_display_name.clear();
        view.provider_logo_url.clear();
        view.provider_portal_url.clear();
        view.rev += 1;
    }

    /// Empty the current-program fields, schedule list, and the secondary
    /// live flag — the "nothing to show" state for the selected channel.
    pub async fn reset_current(&self) {
        let mut view = self.view.write().await;
        view.current_program = None;
        view.playback_enabled = false;
        view.schedule.clear();
        view.secondary_on_now = false;
        view.rev += 1;
    }
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rev_increments_on_every_change() {
        let store = ViewStore::new();
        let before = store.snapshot().await.rev;
        store.set_playback_enabled(true).await;
        store.set_loading(true).await;
        let after = store.snapshot().await.rev;
        assert_eq!(after, before + 2);
    }

    #[tokio::test]
    async fn test_empty_schedule_marks_unavailable_but_keeps_previous() {
        let store = ViewStore::new();
        let airing = Airing {
            content_id: "a".into(),
            title: "A".into(),
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            image_url_template: String::new(),
            playback_url: None,
            flag: Default::default(),
        };
        store.set_schedule(vec![airing]).await;
        assert!(!store.snapshot().await.schedule_unavailable);

        store.set_schedule(Vec::new()).await;
        let view = store.snapshot().await;
        assert!(view.schedule_unavailable);
        assert_eq!(view.schedule.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_current_clears_program_state() {
        let store = ViewStore::new();
        store
            .set_current_program(Some(CurrentProgram {
                content_id: "a".into(),
                title: "A".into(),
                image_url: None,
                playback_url: Some("u".into()),
            }))
            .await;
        store.set_playback_enabled(true).await;
        store.set_secondary_on_now(true).await;

        store.reset_current().await;
        let view = store.snapshot().await;
        assert!(view.current_program.is_none());
        assert!(!view.playback_enabled);
        assert!(!view.secondary_on_now);
        assert!(view.schedule.is_empty());
    }
}
