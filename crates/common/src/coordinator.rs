//! The campaign service and its single background worker.
//!
//! [`AdService`] is the composition root a host builds once. Surfaces attach
//! to it and receive a [`RotationController`]; the first attach starts the
//! worker. The worker serves whichever surface is on top of the
//! [`PresentationBridge`] stack: it fetches campaigns when the refresh
//! schedule says so, keeps the error breaker, sleeps for the current slot's
//! duration and tells the surface which slide to show next.
//!
//! Refresh and breaker bookkeeping live only on the worker side, one set
//! per surface. Surfaces never see them except through [`AdService::surface_status`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use error_stack::{Report, ResultExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::backoff::ErrorBackoffPolicy;
use crate::bridge::{
    lock_engine, Delivery, PresentationBridge, SharedEngine, SurfaceEvent, SurfaceId,
    SurfaceRegistration,
};
use crate::controller::{LinkHandler, RotationController, SlideRenderer};
use crate::error::AdReelError;
use crate::models::{ParsedCampaign, SlotDefaults};
use crate::package::{classify, decode_package, Payload};
use crate::parser::parse_campaign;
use crate::refresh::RefreshScheduler;
use crate::rotation::RotationEngine;
use crate::settings::{Policy, Settings, SurfaceConfig};
use crate::staging::StagingArea;
use crate::tracking::Tracker;
use crate::transport::{
    AdTransport, CampaignRequest, DeviceContext, HttpTransport, NetworkProbe, NetworkSwitch,
    SurfaceProfile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Fetching,
    Sleeping,
    Backoff,
    Stopped,
}

/// Snapshot of the worker's bookkeeping for one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceStatus {
    pub error_count: u32,
    pub delay_count: u32,
    pub ads_enabled: bool,
    pub refresh_interval_ms: u64,
    pub never_refreshed: bool,
}

struct SurfaceBooks {
    refresh: RefreshScheduler,
    backoff: ErrorBackoffPolicy,
    campaign_account: Option<String>,
}

impl SurfaceBooks {
    fn new(surface: &SurfaceRegistration, static_duration_ms: u64, policy: &Policy) -> Self {
        let mut refresh = RefreshScheduler::new(surface.refresh_interval_ms);
        refresh.clamp_interval(
            static_duration_ms,
            policy.min_refresh_ms,
            policy.max_refresh_ms,
        );
        Self {
            refresh,
            backoff: ErrorBackoffPolicy::new(policy.max_errors, policy.max_delay_ticks),
            campaign_account: None,
        }
    }

    fn status(&self) -> SurfaceStatus {
        SurfaceStatus {
            error_count: self.backoff.error_count(),
            delay_count: self.backoff.delay_count(),
            ads_enabled: self.backoff.ads_enabled(),
            refresh_interval_ms: self.refresh.interval_ms(),
            never_refreshed: self.refresh.never_refreshed(),
        }
    }
}

enum Fetched {
    NoCampaign,
    Campaign(ParsedCampaign),
}

struct Shared {
    policy: Policy,
    device: DeviceContext,
    bridge: PresentationBridge,
    transport: Arc<dyn AdTransport>,
    probe: Arc<dyn NetworkProbe>,
    staging: StagingArea,
    running: AtomicBool,
    epoch: AtomicU64,
    next_surface: AtomicU64,
    state: Mutex<WorkerState>,
    books: Mutex<HashMap<SurfaceId, SurfaceBooks>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    teardown: Notify,
}

impl Shared {
    fn is_active(&self, epoch: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.epoch.load(Ordering::Acquire) == epoch
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn books(&self) -> MutexGuard<'_, HashMap<SurfaceId, SurfaceBooks>> {
        self.books.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the books of `surface`, creating them on first use.
    fn with_books<T>(
        &self,
        surface: &SurfaceRegistration,
        f: impl FnOnce(&mut SurfaceBooks) -> T,
    ) -> T {
        let static_duration_ms = lock_engine(&surface.engine).static_duration_ms();
        let mut books = self.books();
        let entry = books
            .entry(surface.id)
            .or_insert_with(|| SurfaceBooks::new(surface, static_duration_ms, &self.policy));
        f(entry)
    }

    fn prune_books(&self) {
        let live = self.bridge.ids();
        self.books().retain(|id, _| live.contains(id));
    }

    /// Sleeps for `ms`, waking early only on service teardown.
    async fn pause(&self, ms: u64) {
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(ms)) => {}
            () = self.teardown.notified() => {}
        }
    }

    async fn fetch(
        &self,
        surface: &SurfaceRegistration,
        campaign_account: Option<String>,
    ) -> Result<Fetched, Report<AdReelError>> {
        if !self.probe.is_available() {
            return Err(Report::new(AdReelError::NetworkUnavailable));
        }

        let request = CampaignRequest::new(&self.device, &surface.profile, campaign_account);
        let bytes = self.transport.fetch_campaign(&request).await?;
        if matches!(classify(&bytes)?, Payload::Empty) {
            return Ok(Fetched::NoCampaign);
        }

        let staging = self.staging.clone();
        let profile = Arc::clone(&surface.profile);
        let defaults = Arc::clone(&surface.slot_defaults);
        let parsed = tokio::task::spawn_blocking(move || {
            stage_and_parse(&staging, &profile, &defaults, &bytes)
        })
        .await
        .change_context(AdReelError::Runtime {
            message: "Campaign staging task failed".to_string(),
        })??;
        Ok(Fetched::Campaign(parsed))
    }

    /// Hands a fetched campaign to the surface. The refresh and breaker
    /// books are only updated once the surface has it queued.
    async fn accept_campaign(&self, surface: &SurfaceRegistration, campaign: ParsedCampaign) {
        let static_duration_ms = lock_engine(&surface.engine).static_duration_ms();
        let campaign_ms = campaign
            .slots
            .iter()
            .fold(static_duration_ms, |total, slot| {
                total.saturating_add(slot.display_duration_ms)
            });
        let campaign_id = campaign.descriptor.campaign_id.clone();
        let campaign_account = campaign.descriptor.campaign_account.clone();
        let interval_ms = campaign
            .descriptor
            .refresh_interval_ms
            .unwrap_or(surface.refresh_interval_ms);
        let slot_count = campaign.slots.len();

        let event = SurfaceEvent::CampaignReady(Box::new(campaign));
        let delivery = tokio::select! {
            delivery = self.bridge.deliver_from(surface.id, event) => delivery,
            () = self.teardown.notified() => return,
        };

        match delivery {
            Delivery::Delivered => {
                self.with_books(surface, |books| {
                    books.refresh.mark_refreshed();
                    books.backoff.reset();
                    books.campaign_account = campaign_account;
                    books.refresh.set_interval(interval_ms);
                    books.refresh.clamp_interval(
                        campaign_ms,
                        self.policy.min_refresh_ms,
                        self.policy.max_refresh_ms,
                    );
                });
                log::info!(
                    "Campaign {} ready for {} with {} slots",
                    campaign_id,
                    surface.id,
                    slot_count
                );
            }
            Delivery::Closed => {
                let errors = self.with_books(surface, |books| {
                    books.backoff.record_error(1);
                    books.backoff.error_count()
                });
                log::warn!(
                    "Campaign {} could not be handed to {} ({} errors)",
                    campaign_id,
                    surface.id,
                    errors
                );
            }
            Delivery::NotInFront => {
                log::debug!("Campaign {campaign_id} fetched for {} left undelivered", surface.id);
            }
        }
    }
}

fn stage_and_parse(
    staging: &StagingArea,
    profile: &SurfaceProfile,
    defaults: &SlotDefaults,
    bytes: &Bytes,
) -> Result<ParsedCampaign, Report<AdReelError>> {
    let package = decode_package(bytes)?;
    let dir = staging.stage(&profile.campaign_id, &package)?;
    let descriptor = staging.read_descriptor(&dir)?;
    let parsed = parse_campaign(&descriptor, &dir, defaults)?;
    if parsed.slots.is_empty() {
        return Err(Report::new(AdReelError::EmptyCampaign {
            account: profile.account_id.clone(),
            campaign: parsed.descriptor.campaign_id,
        }));
    }
    Ok(parsed)
}

async fn run_worker(shared: Arc<Shared>, epoch: u64) {
    log::info!("Campaign worker started");
    shared.set_state(WorkerState::Running);

    while shared.is_active(epoch) {
        let Some(surface) = shared.bridge.top_of_stack() else {
            shared.set_state(WorkerState::Sleeping);
            shared.pause(shared.policy.backoff_tick_ms).await;
            continue;
        };
        shared.prune_books();

        if !surface.processing_enabled() {
            shared.set_state(WorkerState::Sleeping);
            shared.pause(shared.policy.backoff_tick_ms).await;
            continue;
        }

        let enabled = shared.with_books(&surface, |books| {
            if books.backoff.ads_enabled() {
                true
            } else {
                books.backoff.tick_delay();
                false
            }
        });
        if !enabled {
            shared.set_state(WorkerState::Backoff);
            shared.pause(shared.policy.backoff_tick_ms).await;
            continue;
        }

        let (due, campaign_account) = shared.with_books(&surface, |books| {
            (books.refresh.is_due(), books.campaign_account.clone())
        });
        if due {
            shared.set_state(WorkerState::Fetching);
            let result = shared.fetch(&surface, campaign_account).await;
            if !shared.is_active(epoch) {
                log::debug!("Worker stopped during fetch for {}, discarding result", surface.id);
                break;
            }
            match result {
                Ok(Fetched::Campaign(campaign)) => shared.accept_campaign(&surface, campaign).await,
                Ok(Fetched::NoCampaign) => {
                    log::info!(
                        "No campaign {} for account {}",
                        surface.profile.campaign_id,
                        surface.profile.account_id
                    );
                    shared.with_books(&surface, |books| books.refresh.mark_refreshed());
                }
                Err(report) => {
                    let severity = report.current_context().severity(shared.policy.max_errors);
                    let errors = shared.with_books(&surface, |books| {
                        books.backoff.record_error(severity);
                        books.backoff.error_count()
                    });
                    log::warn!(
                        "Campaign fetch for {} failed ({} errors): {:?}",
                        surface.id,
                        errors,
                        report
                    );
                    shared.set_state(WorkerState::Backoff);
                    shared.pause(shared.policy.backoff_tick_ms).await;
                    continue;
                }
            }
        }

        shared.set_state(WorkerState::Sleeping);
        let duration = lock_engine(&surface.engine).current_slot_duration();
        shared.pause(duration).await;

        if !shared.is_active(epoch) {
            break;
        }
        let in_front = shared
            .bridge
            .top_of_stack()
            .is_some_and(|top| top.id == surface.id);
        if !in_front || !surface.processing_enabled() {
            continue;
        }

        shared.with_books(&surface, |books| books.refresh.on_tick(duration));
        let (step, generation) = {
            let mut engine = lock_engine(&surface.engine);
            (engine.advance(), engine.generation())
        };
        if step.should_show {
            shared.bridge.emit_from(
                surface.id,
                SurfaceEvent::ShowSlide {
                    index: step.slot_index,
                    generation,
                },
            );
        }
    }

    if shared.epoch.load(Ordering::Acquire) == epoch {
        shared.set_state(WorkerState::Stopped);
        if shared.bridge.is_empty() {
            if let Err(report) = shared.staging.purge() {
                log::warn!("Failed to purge campaign staging: {:?}", report);
            }
        }
    }
    log::info!("Campaign worker stopped");
}

/// Process-wide campaign service. Cheap to clone.
#[derive(Clone)]
pub struct AdService {
    shared: Arc<Shared>,
}

impl AdService {
    #[must_use]
    pub fn new(
        settings: &Settings,
        transport: Arc<dyn AdTransport>,
        probe: Arc<dyn NetworkProbe>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                policy: settings.policy.clone(),
                device: DeviceContext::from_settings(&settings.device),
                bridge: PresentationBridge::new(),
                transport,
                probe,
                staging: StagingArea::new(settings.staging.root.clone()),
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                next_surface: AtomicU64::new(0),
                state: Mutex::new(WorkerState::Idle),
                books: Mutex::new(HashMap::new()),
                worker: Mutex::new(None),
                teardown: Notify::new(),
            }),
        }
    }

    /// Service backed by the HTTP transport, with a network switch the host
    /// can flip.
    #[must_use]
    pub fn with_http(settings: &Settings, network: Arc<NetworkSwitch>) -> Self {
        Self::new(
            settings,
            Arc::new(HttpTransport::new(&settings.server)),
            network,
        )
    }

    /// Attaches a rotation surface built from `config` and starts the worker
    /// if it is not running yet.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when called outside of a tokio runtime; the
    /// surface is not registered in that case.
    pub fn attach(
        &self,
        config: &SurfaceConfig,
        renderer: Box<dyn SlideRenderer>,
        links: Arc<dyn LinkHandler>,
    ) -> Result<RotationController, Report<AdReelError>> {
        let id = SurfaceId(self.shared.next_surface.fetch_add(1, Ordering::Relaxed) + 1);
        let engine: SharedEngine = Arc::new(Mutex::new(RotationEngine::new(
            config.build_static_slots(),
            config.rotation_policy(),
            self.shared.policy.default_slot_ms,
        )));
        let (events_tx, events_rx) = mpsc::channel(self.shared.policy.event_queue_depth.max(1));
        let profile = SurfaceProfile::from_config(config);
        let tracker = Tracker::new(
            Arc::clone(&self.shared.transport),
            CampaignRequest::new(&self.shared.device, &profile, None),
        );
        let ad_processing = Arc::new(AtomicBool::new(config.ad_processing));

        self.register(SurfaceRegistration::new(
            id,
            profile,
            Arc::clone(&engine),
            Arc::clone(&ad_processing),
            config.refresh_interval_ms,
            config.campaign_slot_defaults(),
            events_tx,
        ))?;

        Ok(RotationController::new(
            id,
            engine,
            events_rx,
            renderer,
            links,
            tracker,
            ad_processing,
        ))
    }

    /// Pushes a surface onto the stack and makes sure the worker runs.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when the worker cannot be started; the
    /// surface is removed again.
    pub fn register(&self, surface: SurfaceRegistration) -> Result<(), Report<AdReelError>> {
        let id = surface.id;
        self.shared.bridge.register(surface);
        if let Err(report) = self.start() {
            self.shared.bridge.unregister(id);
            return Err(report.attach(format!("while registering {id}")));
        }
        Ok(())
    }

    /// Removes a surface. With `stop_if_empty`, the worker is stopped once
    /// no surface remains. Returns whether the worker was told to stop.
    pub fn detach(&self, id: SurfaceId, stop_if_empty: bool) -> bool {
        let empty = self.shared.bridge.unregister(id);
        self.shared.books().remove(&id);
        if empty && stop_if_empty {
            self.stop();
            return true;
        }
        false
    }

    /// Starts the worker. Returns `false` if it was already running.
    ///
    /// # Errors
    ///
    /// Returns a runtime error when called outside of a tokio runtime.
    pub fn start(&self) -> Result<bool, Report<AdReelError>> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(Report::new(AdReelError::Runtime {
                    message: format!("Cannot start campaign worker: {err}"),
                }));
            }
        };

        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let task = handle.spawn(run_worker(Arc::clone(&self.shared), epoch));
        *self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(true)
    }

    /// Asks the worker to stop after its current step.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            log::info!("Stopping campaign worker");
        }
    }

    /// Stops the worker, interrupts its sleep and waits for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        self.shared.teardown.notify_waiters();
        let task = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                log::error!("Campaign worker terminated abnormally: {err}");
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn worker_state(&self) -> WorkerState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.shared.bridge.len()
    }

    #[must_use]
    pub fn staging(&self) -> &StagingArea {
        &self.shared.staging
    }

    /// Breaker and refresh state of a surface, once the worker has served it.
    #[must_use]
    pub fn surface_status(&self, id: SurfaceId) -> Option<SurfaceStatus> {
        self.shared.books().get(&id).map(SurfaceBooks::status)
    }
}
