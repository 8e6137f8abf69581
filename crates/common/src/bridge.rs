//! Hand-off between the background worker and the presentation surfaces.
//!
//! Registered surfaces form a stack; only the most recently registered one
//! receives events. Each surface owns the receiving end of a bounded FIFO
//! queue, so events reach it in order and one at a time.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::{ParsedCampaign, SlotDefaults};
use crate::rotation::RotationEngine;
use crate::transport::SurfaceProfile;

/// Rotation state shared between a surface and the worker.
pub type SharedEngine = Arc<Mutex<RotationEngine>>;

/// Locks an engine, recovering the state if a holder panicked.
pub fn lock_engine(engine: &Mutex<RotationEngine>) -> MutexGuard<'_, RotationEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Result of a delivery that waits for queue room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Another surface was in front, or none was registered.
    NotInFront,
    /// The surface dropped its event receiver.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A freshly parsed campaign the surface should merge.
    CampaignReady(Box<ParsedCampaign>),
    /// Show the slot at `index`, as computed for campaign `generation`.
    ShowSlide { index: usize, generation: u64 },
}

/// Everything the worker needs to serve one surface.
#[derive(Clone)]
pub struct SurfaceRegistration {
    pub id: SurfaceId,
    pub profile: Arc<SurfaceProfile>,
    pub engine: SharedEngine,
    /// Host-level switch; off means no fetches and no events.
    pub ad_processing: Arc<AtomicBool>,
    pub refresh_interval_ms: u64,
    pub slot_defaults: Arc<SlotDefaults>,
    events: mpsc::Sender<SurfaceEvent>,
}

impl SurfaceRegistration {
    #[must_use]
    pub fn new(
        id: SurfaceId,
        profile: SurfaceProfile,
        engine: SharedEngine,
        ad_processing: Arc<AtomicBool>,
        refresh_interval_ms: u64,
        slot_defaults: SlotDefaults,
        events: mpsc::Sender<SurfaceEvent>,
    ) -> Self {
        Self {
            id,
            profile: Arc::new(profile),
            engine,
            ad_processing,
            refresh_interval_ms,
            slot_defaults: Arc::new(slot_defaults),
            events,
        }
    }

    #[must_use]
    pub fn processing_enabled(&self) -> bool {
        self.ad_processing.load(Ordering::Acquire)
    }

    fn deliver(&self, event: SurfaceEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("Event queue for {} is full, dropping event", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("{} stopped listening, dropping event", self.id);
                false
            }
        }
    }

    async fn deliver_waiting(&self, event: SurfaceEvent) -> Delivery {
        match self.events.send(event).await {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                log::debug!("{} stopped listening, dropping event", self.id);
                Delivery::Closed
            }
        }
    }
}

impl fmt::Debug for SurfaceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRegistration")
            .field("id", &self.id)
            .field("campaign_id", &self.profile.campaign_id)
            .field("ad_processing", &self.processing_enabled())
            .finish_non_exhaustive()
    }
}

/// Stack of registered surfaces.
#[derive(Debug, Default)]
pub struct PresentationBridge {
    surfaces: Mutex<Vec<SurfaceRegistration>>,
}

impl PresentationBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stack(&self) -> MutexGuard<'_, Vec<SurfaceRegistration>> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes a surface; it becomes the event target. Re-registering an id
    /// moves it to the top.
    pub fn register(&self, surface: SurfaceRegistration) {
        let mut stack = self.stack();
        stack.retain(|existing| existing.id != surface.id);
        log::info!("Registered {} ({} active)", surface.id, stack.len() + 1);
        stack.push(surface);
    }

    /// Removes a surface. Returns whether the stack is now empty.
    pub fn unregister(&self, id: SurfaceId) -> bool {
        let mut stack = self.stack();
        stack.retain(|existing| existing.id != id);
        log::info!("Unregistered {} ({} active)", id, stack.len());
        stack.is_empty()
    }

    #[must_use]
    pub fn top_of_stack(&self) -> Option<SurfaceRegistration> {
        self.stack().last().cloned()
    }

    #[must_use]
    pub fn contains(&self, id: SurfaceId) -> bool {
        self.stack().iter().any(|surface| surface.id == id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<SurfaceId> {
        self.stack().iter().map(|surface| surface.id).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack().is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack().len()
    }

    /// Delivers to the top surface; dropped when the stack is empty.
    pub fn emit(&self, event: SurfaceEvent) -> bool {
        match self.top_of_stack() {
            Some(surface) => surface.deliver(event),
            None => {
                log::debug!("No registered surface, dropping event");
                false
            }
        }
    }

    /// Delivers to the top surface only if it is still `source`, the
    /// surface the event was computed for.
    pub fn emit_from(&self, source: SurfaceId, event: SurfaceEvent) -> bool {
        match self.top_of_stack() {
            Some(surface) if surface.id == source => surface.deliver(event),
            _ => {
                log::debug!("{source} is no longer in front, dropping event");
                false
            }
        }
    }

    /// Like [`emit_from`](Self::emit_from), but waits for room in the
    /// surface's queue instead of dropping the event.
    pub async fn deliver_from(&self, source: SurfaceId, event: SurfaceEvent) -> Delivery {
        match self.top_of_stack() {
            Some(surface) if surface.id == source => surface.deliver_waiting(event).await,
            _ => {
                log::debug!("{source} is no longer in front, dropping event");
                Delivery::NotInFront
            }
        }
    }
}
