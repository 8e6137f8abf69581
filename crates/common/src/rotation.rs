//! Rotation state machine for one presentation surface.
//!
//! The slot list is a static prefix declared by the host followed by a
//! dynamic suffix that each merged campaign replaces wholesale. The
//! coordinator is the only caller of [`RotationEngine::advance`]; merges are
//! performed by the surface once it has been told a campaign is ready.

use crate::models::{AdSlot, CampaignDescriptor, IndexSpec};

/// Host-configured rotation options, restored on every merge that does not
/// override them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationPolicy {
    pub base_index: Option<IndexSpec>,
    pub final_index: Option<IndexSpec>,
    pub repeat_count: Option<i32>,
}

/// Outcome of one [`RotationEngine::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceResult {
    pub should_show: bool,
    pub slot_index: usize,
}

impl AdvanceResult {
    fn hold(slot_index: usize) -> Self {
        Self {
            should_show: false,
            slot_index,
        }
    }

    fn show(slot_index: usize) -> Self {
        Self {
            should_show: true,
            slot_index,
        }
    }
}

#[derive(Debug)]
pub struct RotationEngine {
    slots: Vec<AdSlot>,
    static_len: usize,
    current_index: usize,
    next_index: usize,
    repeat_count: Option<i32>,
    base_index: usize,
    final_index: Option<usize>,
    needs_reinit: bool,
    generation: u64,
    policy: RotationPolicy,
    default_slot_ms: u64,
}

impl RotationEngine {
    /// Creates an engine holding only the host's static slots.
    #[must_use]
    pub fn new(static_slots: Vec<AdSlot>, policy: RotationPolicy, default_slot_ms: u64) -> Self {
        let static_len = static_slots.len();
        let mut engine = Self {
            slots: static_slots,
            static_len,
            current_index: 0,
            next_index: 0,
            repeat_count: policy.repeat_count,
            base_index: 0,
            final_index: None,
            needs_reinit: false,
            generation: 0,
            policy,
            default_slot_ms,
        };
        engine.resolve_indices(None, None);
        engine
    }

    /// Computes the next slot to show and moves to it.
    ///
    /// When the result says not to show, no index changes.
    pub fn advance(&mut self) -> AdvanceResult {
        if self.slots.len() <= self.static_len {
            return AdvanceResult::hold(self.current_index);
        }
        if self.repeat_count.is_some_and(|count| count < 0) {
            return AdvanceResult::hold(self.current_index);
        }

        let last_index = self.slots.len() - 1;
        if self.current_index < last_index {
            self.next_index = self.current_index + 1;
        } else if self.current_index != self.base_index {
            self.next_index = self.base_index;
            if let Some(count) = self.repeat_count.as_mut() {
                *count -= 1;
                if *count < 0 {
                    if let Some(final_index) = self.final_index {
                        let landing = final_index.min(last_index);
                        self.final_index = Some(landing);
                        self.next_index = landing;
                    }
                }
            }
        } else {
            return AdvanceResult::hold(self.current_index);
        }

        self.current_index = self.next_index;
        AdvanceResult::show(self.current_index)
    }

    /// Replaces the dynamic suffix with `slots` and restarts the rotation.
    pub fn merge_campaign(&mut self, descriptor: &CampaignDescriptor, slots: Vec<AdSlot>) {
        self.slots.truncate(self.static_len);
        self.slots.extend(slots);
        self.current_index = 0;
        self.next_index = 0;
        self.repeat_count = descriptor.repeat_count.or(self.policy.repeat_count);
        self.resolve_indices(descriptor.base_index, descriptor.final_index);
        self.needs_reinit = true;
        self.generation += 1;

        log::debug!(
            "Merged campaign {}: {} static + {} dynamic slots, base {}, final {:?}, repeat {:?}",
            descriptor.campaign_id,
            self.static_len,
            self.slots.len() - self.static_len,
            self.base_index,
            self.final_index,
            self.repeat_count
        );
    }

    fn resolve_indices(&mut self, base: Option<IndexSpec>, final_index: Option<IndexSpec>) {
        let last_index = self.last_index().unwrap_or(0);
        self.base_index = base
            .or(self.policy.base_index)
            .map_or(0, |spec| spec.resolve(self.static_len, last_index));
        self.final_index = final_index
            .or(self.policy.final_index)
            .map(|spec| spec.resolve(self.static_len, last_index));
    }

    /// Display duration of the current slot, or the default when there is none.
    #[must_use]
    pub fn current_slot_duration(&self) -> u64 {
        self.slots
            .get(self.current_index)
            .map_or(self.default_slot_ms, |slot| slot.display_duration_ms)
    }

    /// Returns and clears the pending teardown flag set by the last merge.
    pub fn take_reinit(&mut self) -> bool {
        std::mem::take(&mut self.needs_reinit)
    }

    #[must_use]
    pub fn needs_reinit(&self) -> bool {
        self.needs_reinit
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&AdSlot> {
        self.slots.get(index)
    }

    #[must_use]
    pub fn slots(&self) -> &[AdSlot] {
        &self.slots
    }

    #[must_use]
    pub fn dynamic_slots(&self) -> &[AdSlot] {
        &self.slots[self.static_len..]
    }

    #[must_use]
    pub fn static_len(&self) -> usize {
        self.static_len
    }

    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.slots.len().checked_sub(1)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn base_index(&self) -> usize {
        self.base_index
    }

    #[must_use]
    pub fn final_index(&self) -> Option<usize> {
        self.final_index
    }

    #[must_use]
    pub fn repeat_count(&self) -> Option<i32> {
        self.repeat_count
    }

    /// Incremented on every merge.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sum of the display durations of the static prefix.
    #[must_use]
    pub fn static_duration_ms(&self) -> u64 {
        self.slots[..self.static_len]
            .iter()
            .map(|slot| slot.display_duration_ms)
            .sum()
    }

    /// Sum of the display durations of every slot.
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.slots.iter().map(|slot| slot.display_duration_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotDefaults;

    fn slot(id: &str, duration: u64) -> AdSlot {
        let mut slot = AdSlot::new(id, &SlotDefaults::default());
        slot.display_duration_ms = duration;
        slot
    }

    fn descriptor() -> CampaignDescriptor {
        CampaignDescriptor::new("spring")
    }

    fn engine_with(dynamic: Vec<AdSlot>, descriptor: &CampaignDescriptor) -> RotationEngine {
        let mut engine = RotationEngine::new(Vec::new(), RotationPolicy::default(), 5_000);
        engine.merge_campaign(descriptor, dynamic);
        engine
    }

    fn steps(engine: &mut RotationEngine, count: usize) -> Vec<(bool, usize)> {
        (0..count)
            .map(|_| {
                let result = engine.advance();
                (result.should_show, result.slot_index)
            })
            .collect()
    }

    #[test]
    fn test_repeat_then_land_on_final() {
        let mut descriptor = descriptor();
        descriptor.base_index = Some(IndexSpec::Absolute(0));
        descriptor.repeat_count = Some(1);
        descriptor.final_index = Some(IndexSpec::Absolute(1));
        let mut engine = engine_with(
            vec![slot("a", 1_000), slot("b", 2_000), slot("c", 1_500)],
            &descriptor,
        );
        assert_eq!(engine.current_index(), 0);

        assert_eq!(
            steps(&mut engine, 6),
            vec![(true, 1), (true, 2), (true, 0), (true, 1), (true, 2), (true, 1)]
        );
        assert_eq!(engine.repeat_count(), Some(-1));
        for _ in 0..5 {
            let result = engine.advance();
            assert!(!result.should_show);
            assert_eq!(engine.current_index(), 1);
        }
    }

    #[test]
    fn test_repeat_exhausted_without_final_parks_at_base() {
        let mut descriptor = descriptor();
        descriptor.repeat_count = Some(0);
        let mut engine = engine_with(vec![slot("a", 1), slot("b", 1)], &descriptor);

        assert_eq!(steps(&mut engine, 2), vec![(true, 1), (true, 0)]);
        assert_eq!(steps(&mut engine, 3), vec![(false, 0); 3]);
    }

    #[test]
    fn test_infinite_repeat_cycles_through_base() {
        let mut descriptor = descriptor();
        descriptor.base_index = Some(IndexSpec::Absolute(1));
        let mut engine = engine_with(vec![slot("a", 1), slot("b", 1), slot("c", 1)], &descriptor);

        assert_eq!(
            steps(&mut engine, 5),
            vec![(true, 1), (true, 2), (true, 1), (true, 2), (true, 1)]
        );
    }

    #[test]
    fn test_static_only_never_shows() {
        let mut engine = RotationEngine::new(
            vec![slot("s1", 1_000), slot("s2", 1_000)],
            RotationPolicy::default(),
            5_000,
        );
        assert_eq!(steps(&mut engine, 4), vec![(false, 0); 4]);

        engine.merge_campaign(&descriptor(), Vec::new());
        assert_eq!(steps(&mut engine, 2), vec![(false, 0); 2]);
    }

    #[test]
    fn test_single_slot_at_base_holds() {
        let mut engine = engine_with(vec![slot("a", 1)], &descriptor());
        assert_eq!(steps(&mut engine, 3), vec![(false, 0); 3]);
    }

    #[test]
    fn test_merge_resets_and_keeps_static_prefix() {
        let mut engine = RotationEngine::new(
            vec![slot("s1", 1_000), slot("s2", 2_000)],
            RotationPolicy::default(),
            5_000,
        );
        engine.merge_campaign(&descriptor(), vec![slot("a", 3_000), slot("b", 4_000)]);
        engine.advance();
        engine.advance();
        assert_eq!(engine.current_index(), 2);
        assert!(engine.take_reinit());
        assert!(!engine.take_reinit());

        engine.merge_campaign(&descriptor(), vec![slot("c", 500)]);
        assert_eq!(engine.current_index(), 0);
        assert_eq!(engine.last_index(), Some(2));
        assert_eq!(engine.slots()[0].id, "s1");
        assert_eq!(engine.dynamic_slots()[0].id, "c");
        assert!(engine.needs_reinit());
        assert_eq!(engine.generation(), 2);
        assert_eq!(engine.static_duration_ms(), 3_000);
        assert_eq!(engine.total_duration_ms(), 3_500);
    }

    #[test]
    fn test_relative_indices_resolve_past_static_prefix() {
        let policy = RotationPolicy {
            base_index: Some(IndexSpec::PastStatic(0)),
            final_index: Some(IndexSpec::PastStatic(5)),
            repeat_count: Some(2),
        };
        let mut engine = RotationEngine::new(vec![slot("s1", 1)], policy, 5_000);
        engine.merge_campaign(&descriptor(), vec![slot("a", 1), slot("b", 1)]);

        assert_eq!(engine.base_index(), 1);
        assert_eq!(engine.final_index(), Some(2));
        assert_eq!(engine.repeat_count(), Some(2));
    }

    #[test]
    fn test_merge_restores_host_policy_when_campaign_omits_it() {
        let policy = RotationPolicy {
            repeat_count: Some(0),
            ..RotationPolicy::default()
        };
        let mut engine = RotationEngine::new(Vec::new(), policy, 5_000);
        engine.merge_campaign(&descriptor(), vec![slot("a", 1), slot("b", 1)]);
        steps(&mut engine, 2);
        assert_eq!(engine.repeat_count(), Some(-1));

        engine.merge_campaign(&descriptor(), vec![slot("c", 1), slot("d", 1)]);
        assert_eq!(engine.repeat_count(), Some(0));
        assert!(engine.advance().should_show);
    }

    #[test]
    fn test_campaign_overrides_host_policy() {
        let policy = RotationPolicy {
            base_index: Some(IndexSpec::Absolute(1)),
            ..RotationPolicy::default()
        };
        let mut engine = RotationEngine::new(Vec::new(), policy, 5_000);
        let mut descriptor = descriptor();
        descriptor.base_index = Some(IndexSpec::Absolute(9));
        engine.merge_campaign(&descriptor, vec![slot("a", 1), slot("b", 1), slot("c", 1)]);
        assert_eq!(engine.base_index(), 2);
    }

    #[test]
    fn test_current_slot_duration_defaults_when_empty() {
        let mut engine = RotationEngine::new(Vec::new(), RotationPolicy::default(), 4_321);
        assert_eq!(engine.current_slot_duration(), 4_321);

        engine.merge_campaign(&descriptor(), vec![slot("a", 1_000), slot("b", 2_000)]);
        assert_eq!(engine.current_slot_duration(), 1_000);
        engine.advance();
        assert_eq!(engine.current_slot_duration(), 2_000);
    }
}
