//! EngineCore: single-owner event loop for all mutable guide state.
//!
//! The catalog caches, view store, and session file are mutated only from
//! this loop.  Catalog fetches, provider activation calls, and timers run as
//! spawned tasks and hand their results back as `EngineEvent`s; after each
//! mutation the core broadcasts `BroadcastMessage::ViewUpdated` so connected
//! presentation clients can re-read the view.
//!
//! Timers are supersede-on-rearm: arming a boundary timer for a channel
//! aborts the previous one, and a firing whose deadline no longer matches
//! the armed deadline is discarded as stale.  At most one boundary timer per
//! channel and one midnight timer exist at any instant.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use guide_proto::catalog::{Airing, Catalog, Channel};
use guide_proto::config::Config;
use guide_proto::error::GuideError;
use guide_proto::protocol::{Command, PlaybackData};
use guide_proto::schedule;
use guide_proto::session::SessionStore;
use guide_proto::view::{CurrentProgram, ViewModel, ViewStore};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::auth::{Activation, AuthClient, ProviderDirectory, Registration};
use crate::fetch::CatalogClient;
use crate::BroadcastMessage;

// ── EngineEvent ───────────────────────────────────────────────────────────────

/// All inputs into the EngineCore loop.
#[derive(Debug)]
pub enum EngineEvent {
    /// A command from a presentation client.
    ClientCommand(Command),
    /// A presentation client connected (attach).
    ClientConnected,
    /// A channel's catalog fetch completed.
    CatalogFetched {
        channel: Channel,
        result: Result<Catalog, GuideError>,
    },
    /// A program-boundary timer fired.  `fire_at` identifies the arming.
    BoundaryFired {
        channel: Channel,
        fire_at: DateTime<Utc>,
    },
    /// The daily timer fired: full refetch, then re-arm for the next midnight.
    MidnightTick,
    RegistrationFinished {
        result: Result<Registration, GuideError>,
    },
    ActivationFinished {
        result: Result<Activation, GuideError>,
    },
    #[allow(dead_code)]
    Shutdown,
}

// ── EngineCore ────────────────────────────────────────────────────────────────

struct BoundaryTimer {
    fire_at: DateTime<Utc>,
    handle: AbortHandle,
}

/// What a reconciliation pass found for a channel.
enum Selection {
    OnNow(Airing),
    UpNext(Airing),
    /// Catalog present but every airing already ended.
    AllPast,
    /// No catalog cached, or an empty one.
    Empty,
}

pub struct EngineCore {
    config: Config,
    catalog_client: Arc<dyn CatalogClient>,
    auth_client: Arc<dyn AuthClient>,
    providers: ProviderDirectory,
    view: ViewStore,
    session: SessionStore,
    /// Most recent wholesale catalog per channel; absent until first fetch.
    catalogs: HashMap<Channel, Catalog>,
    boundary_timers: HashMap<Channel, BoundaryTimer>,
    midnight_timer: Option<AbortHandle>,
    /// Registration context held between begin-activation and activate.
    registration: Option<Registration>,
    /// Playback request parked while the user authenticates.
    pending_playback: Option<PlaybackData>,
    event_tx: mpsc::Sender<EngineEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl EngineCore {
    pub fn new(
        config: Config,
        catalog_client: Arc<dyn CatalogClient>,
        auth_client: Arc<dyn AuthClient>,
        providers: ProviderDirectory,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let session = SessionStore::open(config.engine.session_file.clone());
        Self {
            config,
            catalog_client,
            auth_client,
            providers,
            view: ViewStore::new(),
            session,
            catalogs: HashMap::new(),
            boundary_timers: HashMap::new(),
            midnight_timer: None,
            registration: None,
            pending_playback: None,
            event_tx,
            broadcast_tx,
        }
    }

    /// Shared handle to the view model (for the TCP server and tests).
    pub fn view_arc(&self) -> Arc<RwLock<ViewModel>> {
        self.view.arc()
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or the event channel is closed (all clients and servers gone).
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<EngineEvent>) -> anyhow::Result<()> {
        info!("EngineCore: starting event loop");
        self.arm_midnight_timer();

        loop {
            let Some(evt) = event_rx.recv().await else {
                info!("EngineCore: event channel closed, shutting down");
                break;
            };
            match evt {
                EngineEvent::Shutdown => {
                    info!("EngineCore: shutdown requested");
                    break;
                }
                EngineEvent::ClientCommand(cmd) => {
                    debug!("EngineCore: command {:?}", cmd);
                    if let Err(e) = self.handle_command(cmd).await {
                        error!("EngineCore: command error: {}", e);
                    }
                }
                EngineEvent::ClientConnected => self.on_attach().await,
                EngineEvent::CatalogFetched { channel, result } => {
                    self.on_catalog_fetched(channel, result).await
                }
                EngineEvent::BoundaryFired { channel, fire_at } => {
                    self.on_boundary_fired(channel, fire_at).await
                }
                EngineEvent::MidnightTick => self.on_midnight().await,
                EngineEvent::RegistrationFinished { result } => self.on_registration(result),
                EngineEvent::ActivationFinished { result } => self.on_activation(result).await,
            }
        }
        Ok(())
    }

    // ── command handlers ──────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::SelectChannel { channel } => self.select_channel(channel).await,
            Command::StartPlayback => self.start_playback().await,
            Command::RefreshSchedule => {
                self.view.set_loading(true).await;
                self.publish_view();
                self.refresh_all().await;
            }
            Command::BeginActivation => self.begin_activation(),
            Command::Activate { provider_id } => self.activate(provider_id),
            Command::SignOut => self.sign_out().await,
            Command::Suspend => self.on_pause()?,
            Command::Resume => self.on_attach().await,
            Command::GetView => self.publish_view(),
        }
        Ok(())
    }

    /// Attach / foreground: decide between an eager refetch and a cache
    /// replay, then re-arm both timer kinds.
    async fn on_attach(&mut self) {
        // An expired persisted activation is treated as signed out.
        if self.session.state().is_authenticated && !self.session.auth_valid(Utc::now()) {
            info!("persisted activation expired, clearing");
            if let Err(e) = self.session.clear_authentication() {
                warn!("failed to clear expired session: {}", e);
            }
        }
        self.refresh_auth_display().await;

        let selected = self.view.snapshot().await.selected_channel;
        self.view
            .set_selected_channel(selected, self.header_for(selected))
            .await;

        if !self.catalogs.contains_key(&Channel::Primary)
            || !self.session.last_viewed_today()
            || self.session.state().error_on_last_refresh
        {
            info!("attach: eager catalog refetch");
            self.view.set_loading(true).await;
            self.publish_view();
            self.refresh_all().await;
        } else {
            debug!("attach: reconciling cached catalogs");
            // covers boundaries crossed while backgrounded
            self.reconcile(Channel::Primary).await;
            self.reconcile(Channel::Secondary).await;
        }
        self.arm_midnight_timer();
        self.publish_view();
    }

    fn on_pause(&mut self) -> anyhow::Result<()> {
        self.session.set_last_viewed(Utc::now())?;
        Ok(())
    }

    async fn select_channel(&mut self, channel: Channel) {
        info!("selecting channel {}", channel);
        self.view
            .set_selected_channel(channel, self.header_for(channel))
            .await;
        // cache only — switching channels never triggers a fetch
        self.reconcile(channel).await;
    }

    fn header_for(&self, channel: Channel) -> String {
        match channel {
            Channel::Primary => schedule::header_date(Local::now()),
            Channel::Secondary => format!("{} Schedule", channel.display_name()),
        }
    }

    // ── catalog refresh ───────────────────────────────────────────────────────

    /// Kick off both channel fetches concurrently.  Completions are not
    /// synchronized with each other: each triggers its own reconcile pass.
    async fn refresh_all(&mut self) {
        if !self.catalog_client.network_available() {
            warn!("refresh skipped: no network");
            // no fetch will complete, so the loader must come down here
            self.view.set_loading(false).await;
            self.send_error(GuideError::NoNetwork.to_string());
            self.publish_view();
            return;
        }
        let start = Utc::now() - Duration::days(1);
        for channel in Channel::ALL {
            self.spawn_fetch(channel, start);
        }
    }

    fn spawn_fetch(&self, channel: Channel, start: DateTime<Utc>) {
        let days = match channel {
            Channel::Primary => self.config.catalog.primary_lookahead_days,
            Channel::Secondary => self.config.catalog.secondary_lookahead_days,
        };
        let end = start + Duration::days(days);
        let client = Arc::clone(&self.catalog_client);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = client.fetch_catalog(channel, start, end).await;
            let _ = tx.send(EngineEvent::CatalogFetched { channel, result }).await;
        });
    }

    async fn on_catalog_fetched(&mut self, channel: Channel, result: Result<Catalog, GuideError>) {
        match result {
            Ok(catalog) => {
                info!(
                    "catalog for {} fetched: {} airings",
                    channel,
                    catalog.airings.len()
                );
                self.catalogs.insert(channel, catalog);
                if let Err(e) = self.session.set_error_on_last_refresh(false) {
                    warn!("failed to clear refresh-error flag: {}", e);
                }
                self.reconcile(channel).await;
            }
            Err(err) => {
                warn!("catalog fetch for {} failed: {}", channel, err);
                if let Err(e) = self.session.set_error_on_last_refresh(true) {
                    warn!("failed to persist refresh-error flag: {}", e);
                }
                if self.view.snapshot().await.selected_channel == channel {
                    self.view.set_schedule_unavailable(true).await;
                }
                self.send_error(err.to_string());
            }
        }
        self.view.set_loading(false).await;
        self.publish_view();
    }

    // ── reconciliation ────────────────────────────────────────────────────────

    /// Recompute the derived view for `channel` from its cached catalog.
    async fn reconcile(&mut self, channel: Channel) {
        let now = Utc::now();
        let selected = self.view.snapshot().await.selected_channel == channel;

        let (selection, airings) = match self.catalogs.get_mut(&channel) {
            None => (Selection::Empty, Vec::new()),
            Some(catalog) if catalog.is_empty() => (Selection::Empty, Vec::new()),
            Some(catalog) => {
                if let Some(idx) = schedule::find_on_now(&catalog.airings, now) {
                    schedule::mark_on_now(&mut catalog.airings, idx);
                    (
                        Selection::OnNow(catalog.airings[idx].clone()),
                        catalog.airings.clone(),
                    )
                } else if let Some(idx) = schedule::find_next(&catalog.airings, now) {
                    schedule::mark_up_next(&mut catalog.airings, idx);
                    (
                        Selection::UpNext(catalog.airings[idx].clone()),
                        catalog.airings.clone(),
                    )
                } else {
                    schedule::clear_flags(&mut catalog.airings);
                    (Selection::AllPast, catalog.airings.clone())
                }
            }
        };

        let mut on_now_found = false;
        match &selection {
            Selection::OnNow(airing) => {
                on_now_found = true;
                if selected {
                    self.view
                        .set_current_program(Some(self.current_program(airing, true)))
                        .await;
                }
                self.view
                    .set_preview(
                        channel,
                        format!("{}{}", schedule::ON_NOW_PREFIX, airing.title),
                    )
                    .await;
                if channel == Channel::Secondary {
                    self.view.set_secondary_on_now(true).await;
                }
                self.arm_boundary(channel, airing.end_time);
            }
            Selection::UpNext(airing) => {
                if selected {
                    // up-next never shows a tile image
                    self.view
                        .set_current_program(Some(self.current_program(airing, false)))
                        .await;
                }
                self.view
                    .set_preview(
                        channel,
                        format!("{} - {}", schedule::preview_time(airing.start_time), airing.title),
                    )
                    .await;
                if channel == Channel::Secondary {
                    self.view.set_secondary_on_now(false).await;
                }
                self.arm_boundary(channel, airing.start_time);
            }
            Selection::AllPast => {
                // view state resets like the empty case, but the schedule
                // list below stays populated; midnight refetch recovers
                if selected {
                    self.view.set_current_program(None).await;
                }
                if channel == Channel::Secondary {
                    self.view.set_secondary_on_now(false).await;
                }
                self.clear_boundary(channel);
            }
            Selection::Empty => {
                if selected {
                    self.view.reset_current().await;
                    self.view.set_schedule_unavailable(true).await;
                }
                if channel == Channel::Secondary {
                    self.view.set_secondary_on_now(false).await;
                }
                self.clear_boundary(channel);
                self.publish_view();
                return;
            }
        }

        if selected {
            self.view.set_schedule(airings).await;
            let playable = self
                .view
                .snapshot()
                .await
                .current_program
                .as_ref()
                .map(CurrentProgram::has_playback_url)
                .unwrap_or(false);
            self.view.set_playback_enabled(on_now_found && playable).await;
        }
        self.publish_view();
    }

    fn current_program(&self, airing: &Airing, with_image: bool) -> CurrentProgram {
        CurrentProgram {
            content_id: airing.content_id.clone(),
            title: airing.title.clone(),
            image_url: if with_image {
                airing.image_url(self.config.catalog.tile_width, self.config.catalog.tile_height)
            } else {
                None
            },
            playback_url: airing.playback_url.clone(),
        }
    }

    // ── timers ────────────────────────────────────────────────────────────────

    /// Arm (or re-arm) the one-shot boundary timer for `channel`.  A past or
    /// invalid `fire_at` fires immediately rather than being dropped.
    fn arm_boundary(&mut self, channel: Channel, fire_at: DateTime<Utc>) {
        if let Some(prev) = self.boundary_timers.remove(&channel) {
            prev.handle.abort();
        }
        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = tx.send(EngineEvent::BoundaryFired { channel, fire_at }).await;
        })
        .abort_handle();
        debug!("boundary timer for {} armed at {}", channel, fire_at);
        self.boundary_timers
            .insert(channel, BoundaryTimer { fire_at, handle });
    }

    fn clear_boundary(&mut self, channel: Channel) {
        if let Some(prev) = self.boundary_timers.remove(&channel) {
            prev.handle.abort();
        }
    }

    async fn on_boundary_fired(&mut self, channel: Channel, fire_at: DateTime<Utc>) {
        match self.boundary_timers.get(&channel) {
            Some(timer) if timer.fire_at == fire_at => {}
            _ => {
                debug!("stale boundary firing for {} ignored", channel);
                return;
            }
        }
        self.boundary_timers.remove(&channel);
        debug!("boundary timer fired for {}", channel);
        // reconcile re-arms from the new boundary
        self.reconcile(channel).await;
    }

    fn arm_midnight_timer(&mut self) {
        if let Some(prev) = self.midnight_timer.take() {
            prev.abort();
        }
        let now = Local::now();
        let fire_at = schedule::next_local_midnight(now);
        let delay = (fire_at - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineEvent::MidnightTick).await;
        })
        .abort_handle();
        debug!("midnight refetch timer armed for {}", fire_at);
        self.midnight_timer = Some(handle);
    }

    async fn on_midnight(&mut self) {
        info!("midnight: full catalog refetch");
        self.refresh_all().await;
        self.arm_midnight_timer();
    }

    // ── playback ──────────────────────────────────────────────────────────────

    async fn start_playback(&mut self) {
        let view = self.view.snapshot().await;
        let Some(program) = view.current_program else {
            return;
        };
        let Some(url) = program.playback_url.filter(|u| !u.is_empty()) else {
            return;
        };

        // Re-read the persisted grant: a quick sign-out/sign-in elsewhere
        // must win over the cached view state.
        let authenticated = self.session.auth_valid(Utc::now());
        let data = PlaybackData {
            content_id: program.content_id,
            title: program.title,
            playback_url: url,
            channel: view.selected_channel,
        };

        if authenticated {
            info!("playback handoff: {}", data.title);
            let _ = self.broadcast_tx.send(BroadcastMessage::Playback {
                data,
                authenticated: true,
            });
        } else {
            info!("playback requested while unauthenticated, parking until activation");
            self.pending_playback = Some(data);
            self.begin_activation();
        }
    }

    // ── authentication ────────────────────────────────────────────────────────

    fn begin_activation(&mut self) {
        let client = Arc::clone(&self.auth_client);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = client.begin_registration().await;
            let _ = tx.send(EngineEvent::RegistrationFinished { result }).await;
        });
    }

    fn on_registration(&mut self, result: Result<Registration, GuideError>) {
        match result {
            Ok(registration) => {
                info!("registration code issued");
                let _ = self
                    .broadcast_tx
                    .send(BroadcastMessage::ActivationCode(registration.code.clone()));
                self.registration = Some(registration);
            }
            Err(err) => {
                warn!("registration failed: {}", err);
                self.send_error(err.to_string());
            }
        }
    }

    fn activate(&mut self, provider_id: String) {
        let Some(registration) = self.registration.clone() else {
            self.send_error("activation attempted without a registration".to_string());
            return;
        };
        let client = Arc::clone(&self.auth_client);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = client.activate(&provider_id, &registration).await;
            let _ = tx.send(EngineEvent::ActivationFinished { result }).await;
        });
    }

    async fn on_activation(&mut self, result: Result<Activation, GuideError>) {
        match result {
            Ok(activation) => {
                info!("activation succeeded with provider {}", activation.provider_id);
                if let Err(e) = self
                    .session
                    .set_authenticated(&activation.provider_id, activation.expires_at)
                {
                    warn!("failed to persist session: {}", e);
                }
                self.registration = None;
                self.refresh_auth_display().await;
                self.publish_view();

                if let Some(data) = self.pending_playback.take() {
                    info!("resuming parked playback: {}", data.title);
                    let _ = self.broadcast_tx.send(BroadcastMessage::Playback {
                        data,
                        authenticated: true,
                    });
                }
            }
            Err(err) => {
                // session untouched; failure goes straight to the client
                warn!("activation failed: {}", err);
                self.send_error(err.to_string());
            }
        }
    }

    async fn refresh_auth_display(&mut self) {
        let state = self.session.state();
        let provider_id = if state.is_authenticated {
            state.auth_provider_id.clone()
        } else {
            String::new()
        };
        let (display_name, logo_url) = self.providers.lookup(&provider_id);
        let portal_url = self
            .providers
            .portal_url(&provider_id)
            .unwrap_or_default()
            .to_string();
        self.view
            .set_auth_display(
                state.is_authenticated,
                provider_id,
                display_name,
                logo_url,
                portal_url,
            )
            .await;
    }

    async fn sign_out(&mut self) {
        info!("signing out");
        let client = Arc::clone(&self.auth_client);
        tokio::spawn(async move {
            client.deauthorize().await;
        });
        if let Err(e) = self.session.clear_authentication() {
            warn!("failed to clear session: {}", e);
        }
        self.registration = None;
        self.pending_playback = None;
        self.view.clear_auth_display().await;
        self.publish_view();
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    fn publish_view(&self) {
        let _ = self.broadcast_tx.send(BroadcastMessage::ViewUpdated);
    }

    fn send_error(&self, message: String) {
        let _ = self.broadcast_tx.send(BroadcastMessage::Error(message));
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────
