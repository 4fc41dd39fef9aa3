// In-process constraint tracker driven by device state updates

use super::device::DeviceState;
use super::tracker::{ConstraintTracker, WorkConstraintsCallback};
use crate::models::{WorkId, WorkItem};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// A batch produced by the tracker, delivered to the callback by the notifier task
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConstraintEvent {
    Met(Vec<WorkId>),
    NotMet(Vec<WorkId>),
}

impl ConstraintEvent {
    /// Drop ids whose satisfaction changed again since the batch was queued
    fn still_current(self, satisfied: &HashSet<WorkId>) -> Option<Self> {
        let event = match self {
            ConstraintEvent::Met(mut ids) => {
                ids.retain(|id| satisfied.contains(id));
                ConstraintEvent::Met(ids)
            }
            ConstraintEvent::NotMet(mut ids) => {
                ids.retain(|id| !satisfied.contains(id));
                ConstraintEvent::NotMet(ids)
            }
        };
        let empty = match &event {
            ConstraintEvent::Met(ids) | ConstraintEvent::NotMet(ids) => ids.is_empty(),
        };
        (!empty).then_some(event)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    device: DeviceState,
    tracked: Vec<WorkItem>,
    /// Ids last reported as having all constraints met
    satisfied: HashSet<WorkId>,
}

impl TrackerState {
    /// Re-check every tracked item against the current device reading.
    /// Returns `(newly_met, newly_unmet)`.
    fn reevaluate(&mut self) -> (Vec<WorkId>, Vec<WorkId>) {
        let mut newly_met = Vec::new();
        let mut newly_unmet = Vec::new();

        for item in &self.tracked {
            let now = DeviceState::can_evaluate(&item.constraints)
                && self.device.satisfies(&item.constraints);
            let was = self.satisfied.contains(&item.id);
            if now && !was {
                self.satisfied.insert(item.id.clone());
                newly_met.push(item.id.clone());
            } else if !now && was {
                self.satisfied.remove(&item.id);
                newly_unmet.push(item.id.clone());
            }
        }
        (newly_met, newly_unmet)
    }
}

/// WorkConstraintsTracker evaluates tracked items against the latest [`DeviceState`]
/// and reports satisfaction transitions.
///
/// Batches are computed under the tracker's own lock and handed to a notifier task,
/// so callbacks never run on the thread that called `replace` or `update_state`.
/// On delivery a batch is narrowed to the ids whose state still matches it, so a
/// met batch never reaches the callback after the id was removed or became unmet.
/// Items whose only requirements are content-URI triggers have no in-process
/// signal and are never reported as met.
pub struct WorkConstraintsTracker {
    state: Arc<Mutex<TrackerState>>,
    events_tx: mpsc::UnboundedSender<ConstraintEvent>,
}

impl WorkConstraintsTracker {
    /// Create a tracker and spawn its notifier task on the current runtime.
    ///
    /// The notifier exits once the tracker is dropped. Batches arriving while the
    /// callback cannot be upgraded are discarded.
    pub fn spawn(
        initial: DeviceState,
        callback: Weak<dyn WorkConstraintsCallback>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(TrackerState {
            device: initial,
            ..Default::default()
        }));
        let handle = tokio::spawn(run_notifier(events_rx, Arc::downgrade(&state), callback));
        let tracker = Arc::new(Self { state, events_tx });
        (tracker, handle)
    }

    /// Latest device state
    pub fn device_state(&self) -> DeviceState {
        self.lock().device
    }

    /// Apply a new device reading and report every tracked item whose
    /// satisfaction changed
    #[instrument(skip(self, device))]
    pub fn update_state(&self, device: DeviceState) {
        let (newly_met, newly_unmet) = {
            let mut state = self.lock();
            state.device = device;
            state.reevaluate()
        };

        debug!(
            met = newly_met.len(),
            not_met = newly_unmet.len(),
            "Device state updated"
        );
        self.emit_transitions(newly_met, newly_unmet);
    }

    /// Whether `id` is tracked and currently has all constraints met
    pub fn are_all_constraints_met(&self, id: &WorkId) -> bool {
        self.lock().satisfied.contains(id)
    }

    pub fn tracked_len(&self) -> usize {
        self.lock().tracked.len()
    }

    fn emit_transitions(&self, newly_met: Vec<WorkId>, newly_unmet: Vec<WorkId>) {
        if !newly_unmet.is_empty() {
            self.emit(ConstraintEvent::NotMet(newly_unmet));
        }
        if !newly_met.is_empty() {
            self.emit(ConstraintEvent::Met(newly_met));
        }
    }

    fn emit(&self, event: ConstraintEvent) {
        if self.events_tx.send(event).is_err() {
            warn!("Constraint notifier is gone, dropping batch");
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConstraintTracker for WorkConstraintsTracker {
    /// Reset the tracked set. Kept ids are re-checked with their new descriptor;
    /// removed ids are forgotten without a batch.
    fn replace(&self, items: &[WorkItem]) {
        let (newly_met, newly_unmet) = {
            let mut state = self.lock();
            let live: HashSet<&WorkId> = items.iter().map(|item| &item.id).collect();
            state.satisfied.retain(|id| live.contains(id));
            state.tracked = items.to_vec();
            state.reevaluate()
        };

        debug!(
            tracked = items.len(),
            met = newly_met.len(),
            not_met = newly_unmet.len(),
            "Replaced tracked work"
        );
        self.emit_transitions(newly_met, newly_unmet);
    }
}

async fn run_notifier(
    mut events_rx: mpsc::UnboundedReceiver<ConstraintEvent>,
    state: Weak<Mutex<TrackerState>>,
    callback: Weak<dyn WorkConstraintsCallback>,
) {
    while let Some(event) = events_rx.recv().await {
        let Some(state) = state.upgrade() else {
            break;
        };
        let current = {
            let state = state.lock().unwrap_or_else(PoisonError::into_inner);
            event.still_current(&state.satisfied)
        };
        let Some(event) = current else {
            debug!("Constraint batch is stale, discarding");
            continue;
        };
        let Some(callback) = callback.upgrade() else {
            debug!("Constraint callback is not available, discarding batch");
            continue;
        };
        match event {
            ConstraintEvent::Met(ids) => callback.on_all_constraints_met(&ids),
            ConstraintEvent::NotMet(ids) => callback.on_all_constraints_not_met(&ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::device::NetworkState;
    use crate::models::{Constraints, NetworkType};
    use std::time::Duration;

    /// Records batches in arrival order
    #[derive(Default)]
    struct RecordingCallback {
        batches: Mutex<Vec<ConstraintEvent>>,
    }

    impl RecordingCallback {
        fn batches(&self) -> Vec<ConstraintEvent> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl WorkConstraintsCallback for RecordingCallback {
        fn on_all_constraints_met(&self, ids: &[WorkId]) {
            self.batches
                .lock()
                .unwrap()
                .push(ConstraintEvent::Met(ids.to_vec()));
        }

        fn on_all_constraints_not_met(&self, ids: &[WorkId]) {
            self.batches
                .lock()
                .unwrap()
                .push(ConstraintEvent::NotMet(ids.to_vec()));
        }
    }

    fn online() -> DeviceState {
        DeviceState {
            network: NetworkState {
                connected: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn networked(id: &str) -> WorkItem {
        WorkItem::new(id).with_constraints(Constraints::none().with_network(NetworkType::Connected))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn setup(initial: DeviceState) -> (Arc<RecordingCallback>, Arc<WorkConstraintsTracker>) {
        let callback = Arc::new(RecordingCallback::default());
        let weak: Weak<dyn WorkConstraintsCallback> =
            Arc::downgrade(&callback) as Weak<dyn WorkConstraintsCallback>;
        let (tracker, _handle) = WorkConstraintsTracker::spawn(initial, weak);
        (callback, tracker)
    }

    #[tokio::test]
    async fn test_replace_reports_already_satisfied_items() {
        let (callback, tracker) = setup(online());

        tracker.replace(&[networked("a")]);
        settle().await;

        assert_eq!(
            callback.batches(),
            vec![ConstraintEvent::Met(vec![WorkId::from("a")])]
        );
        assert!(tracker.are_all_constraints_met(&WorkId::from("a")));
    }

    #[tokio::test]
    async fn test_replace_with_unchanged_set_does_not_repeat_batches() {
        let (callback, tracker) = setup(online());

        tracker.replace(&[networked("a")]);
        tracker.replace(&[networked("a")]);
        tracker.replace(&[networked("a")]);
        settle().await;

        assert_eq!(callback.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_state_transitions_report_met_then_not_met() {
        let (callback, tracker) = setup(DeviceState::default());

        tracker.replace(&[networked("a")]);
        tracker.update_state(online());
        settle().await;
        tracker.update_state(DeviceState::default());
        settle().await;

        assert_eq!(
            callback.batches(),
            vec![
                ConstraintEvent::Met(vec![WorkId::from("a")]),
                ConstraintEvent::NotMet(vec![WorkId::from("a")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_removed_items_are_forgotten() {
        let (callback, tracker) = setup(online());

        tracker.replace(&[networked("a")]);
        settle().await;
        tracker.replace(&[]);
        tracker.update_state(DeviceState::default());
        settle().await;

        assert_eq!(callback.batches().len(), 1);
        assert_eq!(tracker.tracked_len(), 0);
        assert!(!tracker.are_all_constraints_met(&WorkId::from("a")));
    }

    #[tokio::test]
    async fn test_updated_descriptor_is_rechecked() {
        let (callback, tracker) = setup(online());

        tracker.replace(&[networked("a")]);
        settle().await;
        let charging =
            WorkItem::new("a").with_constraints(Constraints::none().with_charging());
        tracker.replace(&[charging]);
        settle().await;

        assert_eq!(
            callback.batches(),
            vec![
                ConstraintEvent::Met(vec![WorkId::from("a")]),
                ConstraintEvent::NotMet(vec![WorkId::from("a")]),
            ]
        );
        assert!(!tracker.are_all_constraints_met(&WorkId::from("a")));
    }

    #[tokio::test]
    async fn test_met_batch_for_removed_item_is_discarded() {
        let (callback, tracker) = setup(online());

        // Both calls land before the notifier runs
        tracker.replace(&[networked("a")]);
        tracker.replace(&[]);
        settle().await;

        assert!(callback.batches().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_batches_are_narrowed() {
        let (callback, tracker) = setup(DeviceState::default());

        tracker.replace(&[networked("a"), networked("b")]);
        tracker.update_state(online());
        tracker.replace(&[networked("a")]);
        tracker.update_state(DeviceState::default());
        tracker.update_state(online());
        settle().await;

        // Only "a" is met now; "b" is gone and the intermediate not-met is stale
        assert_eq!(
            callback.batches(),
            vec![
                ConstraintEvent::Met(vec![WorkId::from("a")]),
                ConstraintEvent::Met(vec![WorkId::from("a")]),
            ]
        );
    }

    #[test]
    fn test_still_current_filters_by_satisfied_set() {
        let satisfied: HashSet<WorkId> = [WorkId::from("a")].into_iter().collect();

        assert_eq!(
            ConstraintEvent::Met(vec![WorkId::from("a"), WorkId::from("b")])
                .still_current(&satisfied),
            Some(ConstraintEvent::Met(vec![WorkId::from("a")]))
        );
        assert_eq!(
            ConstraintEvent::NotMet(vec![WorkId::from("a")]).still_current(&satisfied),
            None
        );
    }

    #[tokio::test]
    async fn test_content_uri_only_items_never_reported() {
        let (callback, tracker) = setup(online());

        let item = WorkItem::new("observer").with_constraints(
            Constraints::none().with_content_uri_trigger("content://media/images", true),
        );
        tracker.replace(&[item]);
        tracker.update_state(DeviceState::default());
        tracker.update_state(online());
        settle().await;

        assert!(callback.batches().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_exits_when_tracker_dropped() {
        let callback = Arc::new(RecordingCallback::default());
        let weak: Weak<dyn WorkConstraintsCallback> =
            Arc::downgrade(&callback) as Weak<dyn WorkConstraintsCallback>;
        let (tracker, handle) = WorkConstraintsTracker::spawn(online(), weak);
        drop(callback);

        // Callback gone: the batch is discarded and the notifier keeps running
        tracker.replace(&[networked("a")]);
        settle().await;
        assert!(!handle.is_finished());

        drop(tracker);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("notifier should exit")
            .unwrap();
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        struct NoopCallback;

        impl WorkConstraintsCallback for NoopCallback {
            fn on_all_constraints_met(&self, _ids: &[WorkId]) {}
            fn on_all_constraints_not_met(&self, _ids: &[WorkId]) {}
        }

        fn device_strategy() -> impl Strategy<Value = DeviceState> {
            (any::<[bool; 3]>(), any::<[bool; 4]>()).prop_map(|(net, power)| DeviceState {
                network: NetworkState {
                    connected: net[0],
                    metered: net[1],
                    roaming: net[2],
                },
                charging: power[0],
                battery_low: power[1],
                storage_low: power[2],
                device_idle: power[3],
            })
        }

        fn items() -> Vec<WorkItem> {
            vec![
                networked("connected"),
                WorkItem::new("unmetered")
                    .with_constraints(Constraints::none().with_network(NetworkType::Unmetered)),
                WorkItem::new("charging").with_constraints(Constraints::none().with_charging()),
                WorkItem::new("idle-battery").with_constraints(
                    Constraints::none().with_device_idle().with_battery_not_low(),
                ),
                WorkItem::new("storage")
                    .with_constraints(Constraints::none().with_storage_not_low()),
            ]
        }

        proptest! {
            #[test]
            fn satisfied_set_matches_latest_state(
                states in prop::collection::vec(device_strategy(), 1..20)
            ) {
                let runtime = tokio::runtime::Runtime::new().unwrap();
                let _enter = runtime.enter();

                let callback = Arc::new(NoopCallback);
                let weak: Weak<dyn WorkConstraintsCallback> =
                    Arc::downgrade(&callback) as Weak<dyn WorkConstraintsCallback>;
                let (tracker, _handle) = WorkConstraintsTracker::spawn(DeviceState::default(), weak);

                let items = items();
                tracker.replace(&items);
                for state in &states {
                    tracker.update_state(*state);
                }

                let last = states.last().unwrap();
                for item in &items {
                    prop_assert_eq!(
                        tracker.are_all_constraints_met(&item.id),
                        last.satisfies(&item.constraints)
                    );
                }
            }
        }
    }
}
