//! Surface-side rotation controller.
//!
//! A host view wraps one controller. The controller drains the surface's
//! event queue, merges campaigns on its own side of the queue and drives a
//! [`SlideRenderer`]. It has no platform dependencies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bridge::{lock_engine, SharedEngine, SurfaceEvent, SurfaceId};
use crate::models::{AdSlot, LinkTarget, ParsedCampaign, Transition};
use crate::tracking::Tracker;

/// Sink for slide changes, implemented by the host view.
pub trait SlideRenderer: Send {
    fn render_slide(&mut self, slot: &AdSlot, transition_in: Transition, transition_out: Transition);

    /// Tears down views of slots at or past `static_len` after a new
    /// campaign was merged.
    fn clear_dynamic(&mut self, static_len: usize) {
        let _ = static_len;
    }
}

/// Destination for tapped links.
pub trait LinkHandler: Send + Sync {
    /// Receives the parameter of an `app/<param>` link.
    fn open_in_app(&self, param: &str);

    fn open_external(&self, url: &str);
}

/// What a tap did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapOutcome {
    NothingShown,
    NoLink,
    Suppressed,
    InApp(String),
    External(String),
}

pub struct RotationController {
    id: SurfaceId,
    engine: SharedEngine,
    events: mpsc::Receiver<SurfaceEvent>,
    renderer: Box<dyn SlideRenderer>,
    links: Arc<dyn LinkHandler>,
    tracker: Tracker,
    ad_processing: Arc<AtomicBool>,
    displayed: Option<usize>,
    generation: u64,
    campaign_account: Option<String>,
}

impl RotationController {
    #[must_use]
    pub fn new(
        id: SurfaceId,
        engine: SharedEngine,
        events: mpsc::Receiver<SurfaceEvent>,
        renderer: Box<dyn SlideRenderer>,
        links: Arc<dyn LinkHandler>,
        tracker: Tracker,
        ad_processing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            engine,
            events,
            renderer,
            links,
            tracker,
            ad_processing,
            displayed: None,
            generation: 0,
            campaign_account: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    #[must_use]
    pub fn displayed_index(&self) -> Option<usize> {
        self.displayed
    }

    #[must_use]
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Shows the current slot, typically the first static one, right after
    /// attaching.
    pub fn show_initial(&mut self) -> bool {
        let index = lock_engine(&self.engine).current_index();
        self.present(index)
    }

    pub fn set_ad_processing(&self, enabled: bool) {
        self.ad_processing.store(enabled, Ordering::Release);
        log::info!(
            "Ad processing for {} switched {}",
            self.id,
            if enabled { "on" } else { "off" }
        );
    }

    #[must_use]
    pub fn ad_processing(&self) -> bool {
        self.ad_processing.load(Ordering::Acquire)
    }

    /// Waits for the next event. `None` once the surface is detached and
    /// the queue is drained.
    pub async fn next_event(&mut self) -> Option<SurfaceEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SurfaceEvent> {
        self.events.try_recv().ok()
    }

    /// Handles events until the queue closes.
    pub async fn run(&mut self) {
        while let Some(event) = self.next_event().await {
            self.handle_event(event);
        }
        log::debug!("Event queue for {} closed", self.id);
    }

    /// Applies one event. Returns whether a slide was rendered.
    pub fn handle_event(&mut self, event: SurfaceEvent) -> bool {
        match event {
            SurfaceEvent::CampaignReady(campaign) => self.merge(*campaign),
            SurfaceEvent::ShowSlide { index, generation } => {
                if generation != self.generation {
                    log::debug!(
                        "{} ignoring slide {} from campaign generation {} (now {})",
                        self.id,
                        index,
                        generation,
                        self.generation
                    );
                    return false;
                }
                if !self.ad_processing() {
                    return false;
                }
                self.present(index)
            }
        }
    }

    fn merge(&mut self, campaign: ParsedCampaign) -> bool {
        let ParsedCampaign { descriptor, slots } = campaign;
        let index = {
            let mut engine = lock_engine(&self.engine);
            engine.merge_campaign(&descriptor, slots);
            self.generation = engine.generation();
            engine.current_index()
        };
        log::info!(
            "{} merged campaign {} (generation {})",
            self.id,
            descriptor.campaign_id,
            self.generation
        );
        self.campaign_account = descriptor.campaign_account;
        self.present(index)
    }

    fn present(&mut self, index: usize) -> bool {
        let (incoming, outgoing) = {
            let mut engine = lock_engine(&self.engine);
            if engine.take_reinit() {
                let static_len = engine.static_len();
                self.renderer.clear_dynamic(static_len);
                if self.displayed.is_some_and(|shown| shown >= static_len) {
                    self.displayed = None;
                }
            }
            if self.displayed == Some(index) {
                return false;
            }
            let Some(incoming) = engine.slot(index).cloned() else {
                log::warn!("{} has no slot {}, keeping current slide", self.id, index);
                return false;
            };
            let outgoing = self
                .displayed
                .and_then(|shown| engine.slot(shown))
                .map_or(Transition::None, |slot| slot.transition_out);
            (incoming, outgoing)
        };

        log::debug!("{} showing slot {} ({})", self.id, index, incoming.id);
        self.renderer
            .render_slide(&incoming, incoming.transition_in, outgoing);
        self.displayed = Some(index);
        true
    }

    /// Handles a tap on the displayed slide: tracks it when the slot asks
    /// for tracking, then follows its link.
    pub fn tap(&self) -> TapOutcome {
        let Some(index) = self.displayed else {
            return TapOutcome::NothingShown;
        };
        let Some(slot) = lock_engine(&self.engine).slot(index).cloned() else {
            return TapOutcome::NothingShown;
        };

        if slot.tracked {
            let _ = self.tracker.track(&slot, self.campaign_account.clone());
        }

        match slot.link_target() {
            LinkTarget::Missing => TapOutcome::NoLink,
            LinkTarget::Suppressed => TapOutcome::Suppressed,
            LinkTarget::InApp(param) => {
                self.links.open_in_app(param);
                TapOutcome::InApp(param.to_string())
            }
            LinkTarget::External(url) => {
                self.links.open_external(url);
                TapOutcome::External(url.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::models::{CampaignDescriptor, SlotDefaults};
    use crate::rotation::{RotationEngine, RotationPolicy};
    use crate::test_support::tests::{
        test_campaign_request, LinkCall, RecordingLinks, RecordingRenderer, RenderCall,
        ScriptedTransport,
    };

    struct Harness {
        controller: RotationController,
        renderer: RecordingRenderer,
        links: Arc<RecordingLinks>,
        transport: Arc<ScriptedTransport>,
        events: mpsc::Sender<SurfaceEvent>,
    }

    fn slot(id: &str) -> AdSlot {
        let mut slot = AdSlot::new(id, &SlotDefaults::default());
        slot.display_duration_ms = 1_000;
        slot
    }

    fn harness(static_slots: Vec<AdSlot>) -> Harness {
        let engine = Arc::new(Mutex::new(RotationEngine::new(
            static_slots,
            RotationPolicy::default(),
            5_000,
        )));
        let (tx, rx) = mpsc::channel(8);
        let renderer = RecordingRenderer::default();
        let links = Arc::new(RecordingLinks::default());
        let transport = Arc::new(ScriptedTransport::new());
        let controller = RotationController::new(
            SurfaceId(1),
            engine,
            rx,
            Box::new(renderer.clone()),
            links.clone(),
            Tracker::new(transport.clone(), test_campaign_request()),
            Arc::new(AtomicBool::new(true)),
        );
        Harness {
            controller,
            renderer,
            links,
            transport,
            events: tx,
        }
    }

    fn campaign(slots: Vec<AdSlot>) -> SurfaceEvent {
        SurfaceEvent::CampaignReady(Box::new(ParsedCampaign {
            descriptor: CampaignDescriptor::new("spring"),
            slots,
        }))
    }

    #[test]
    fn test_show_initial_renders_first_static_slot() {
        let mut h = harness(vec![slot("house")]);
        assert!(h.controller.show_initial());
        assert_eq!(h.renderer.rendered_ids(), vec!["house"]);
        assert_eq!(h.controller.displayed_index(), Some(0));
        assert!(!h.controller.show_initial());
    }

    #[test]
    fn test_show_initial_without_slots_renders_nothing() {
        let mut h = harness(Vec::new());
        assert!(!h.controller.show_initial());
        assert!(h.renderer.calls().is_empty());
    }

    #[test]
    fn test_merge_clears_dynamic_views_and_shows_current() {
        let mut h = harness(vec![slot("house")]);
        h.controller.show_initial();
        h.controller.handle_event(campaign(vec![slot("a"), slot("b")]));

        assert_eq!(
            h.renderer.calls(),
            vec![
                RenderCall::Slide {
                    id: "house".to_string(),
                    transition_in: Transition::FadeIn,
                    transition_out: Transition::None,
                },
                RenderCall::ClearDynamic { static_len: 1 },
            ]
        );
        assert_eq!(h.controller.displayed_index(), Some(0));
    }

    #[test]
    fn test_show_slide_uses_in_and_out_transitions() {
        let mut h = harness(Vec::new());
        let mut first = slot("a");
        first.transition_out = Transition::SlideOutToLeft;
        let mut second = slot("b");
        second.transition_in = Transition::ZoomInFromCenter;
        h.controller.handle_event(campaign(vec![first, second]));

        let rendered = h.controller.handle_event(SurfaceEvent::ShowSlide {
            index: 1,
            generation: 1,
        });
        assert!(rendered);
        assert_eq!(
            h.renderer.calls().last(),
            Some(&RenderCall::Slide {
                id: "b".to_string(),
                transition_in: Transition::ZoomInFromCenter,
                transition_out: Transition::SlideOutToLeft,
            })
        );
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut h = harness(Vec::new());
        h.controller.handle_event(campaign(vec![slot("a"), slot("b")]));
        h.controller.handle_event(campaign(vec![slot("c"), slot("d")]));

        assert!(!h.controller.handle_event(SurfaceEvent::ShowSlide {
            index: 1,
            generation: 1,
        }));
        assert!(h.controller.handle_event(SurfaceEvent::ShowSlide {
            index: 1,
            generation: 2,
        }));
        assert_eq!(h.renderer.rendered_ids().last().map(String::as_str), Some("d"));
    }

    #[test]
    fn test_processing_switch_blocks_slides() {
        let mut h = harness(Vec::new());
        h.controller.handle_event(campaign(vec![slot("a"), slot("b")]));
        h.controller.set_ad_processing(false);
        assert!(!h.controller.handle_event(SurfaceEvent::ShowSlide {
            index: 1,
            generation: 1,
        }));
        h.controller.set_ad_processing(true);
        assert!(h.controller.handle_event(SurfaceEvent::ShowSlide {
            index: 1,
            generation: 1,
        }));
    }

    #[test]
    fn test_out_of_range_slide_keeps_current() {
        let mut h = harness(Vec::new());
        h.controller.handle_event(campaign(vec![slot("a")]));
        assert!(!h.controller.handle_event(SurfaceEvent::ShowSlide {
            index: 5,
            generation: 1,
        }));
        assert_eq!(h.controller.displayed_index(), Some(0));
    }

    #[test]
    fn test_tap_routes_links() {
        let mut h = harness(Vec::new());
        let mut app = slot("app");
        app.link = Some("app/settings".to_string());
        let mut none = slot("none");
        none.link = Some("NONE".to_string());
        let mut web = slot("web");
        web.link = Some("https://example.com".to_string());
        let bare = slot("bare");
        h.controller.handle_event(campaign(vec![app, none, web, bare]));

        assert_eq!(h.controller.tap(), TapOutcome::InApp("settings".to_string()));
        h.controller.handle_event(SurfaceEvent::ShowSlide { index: 1, generation: 1 });
        assert_eq!(h.controller.tap(), TapOutcome::Suppressed);
        h.controller.handle_event(SurfaceEvent::ShowSlide { index: 2, generation: 1 });
        assert_eq!(
            h.controller.tap(),
            TapOutcome::External("https://example.com".to_string())
        );
        h.controller.handle_event(SurfaceEvent::ShowSlide { index: 3, generation: 1 });
        assert_eq!(h.controller.tap(), TapOutcome::NoLink);

        assert_eq!(
            h.links.calls(),
            vec![
                LinkCall::InApp("settings".to_string()),
                LinkCall::External("https://example.com".to_string()),
            ]
        );
    }

    #[test]
    fn test_tap_without_slide() {
        let h = harness(Vec::new());
        assert_eq!(h.controller.tap(), TapOutcome::NothingShown);
    }

    #[tokio::test]
    async fn test_tracked_tap_sends_tracking() {
        let mut h = harness(Vec::new());
        let mut tracked = slot("a");
        tracked.tracked = true;
        tracked.link = Some("none".to_string());
        let mut descriptor = CampaignDescriptor::new("spring");
        descriptor.campaign_account = Some("acme-main".to_string());
        h.controller
            .handle_event(SurfaceEvent::CampaignReady(Box::new(ParsedCampaign {
                descriptor,
                slots: vec![tracked, slot("b")],
            })));

        assert_eq!(h.controller.tap(), TapOutcome::Suppressed);
        for _ in 0..10 {
            if !h.transport.tracking_requests().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let sent = h.transport.tracking_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ad_id, "a");
        assert_eq!(sent[0].request.campaign_account.as_deref(), Some("acme-main"));
    }

    #[test]
    fn test_run_drains_until_closed() {
        let mut h = harness(Vec::new());
        h.events
            .try_send(campaign(vec![slot("a"), slot("b")]))
            .expect("queue open");
        h.events
            .try_send(SurfaceEvent::ShowSlide {
                index: 1,
                generation: 1,
            })
            .expect("queue open");
        drop(h.events);

        tokio_test::block_on(h.controller.run());
        assert_eq!(h.renderer.rendered_ids(), vec!["a", "b"]);
    }
}
