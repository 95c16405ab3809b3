//! Observable pipeline state.
//!
//! [`PipelineStore`] holds the current [`PipelineState`] and broadcasts a
//! [`StateEvent`] on every change. Subscribers that fall behind lose the
//! oldest events but can always read the latest snapshot.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::stats::BinStats;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loading,
    Binning,
    Aggregating,
    Enriching,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    StageChanged(Stage),
    PointsLoaded { points: usize, dropped_rows: usize },
    RegionsLoaded { regions: usize },
    Binned(BinStats),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub stage: Stage,
    pub points: Option<usize>,
    pub regions: Option<usize>,
    pub bin_stats: Option<BinStats>,
    pub error: Option<String>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            points: None,
            regions: None,
            bin_stats: None,
            error: None,
        }
    }
}

impl PipelineState {
    pub fn is_loading(&self) -> bool {
        matches!(
            self.stage,
            Stage::Loading | Stage::Binning | Stage::Aggregating | Stage::Enriching
        )
    }
}

/// Cloneable handle to the shared state.
#[derive(Debug, Clone)]
pub struct PipelineStore {
    state: Arc<Mutex<PipelineState>>,
    events: broadcast::Sender<StateEvent>,
}

impl Default for PipelineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(PipelineState::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> PipelineState {
        self.lock().clone()
    }

    // A poisoned lock only means a panicking writer; the plain data is still usable.
    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, event: StateEvent, apply: impl FnOnce(&mut PipelineState)) {
        apply(&mut self.lock());
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn set_stage(&self, stage: Stage) {
        self.update(StateEvent::StageChanged(stage), |s| s.stage = stage);
    }

    pub fn points_loaded(&self, points: usize, dropped_rows: usize) {
        self.update(StateEvent::PointsLoaded { points, dropped_rows }, |s| {
            s.points = Some(points)
        });
    }

    pub fn regions_loaded(&self, regions: usize) {
        self.update(StateEvent::RegionsLoaded { regions }, |s| s.regions = Some(regions));
    }

    pub fn binned(&self, stats: BinStats) {
        self.update(StateEvent::Binned(stats), |s| s.bin_stats = Some(stats));
    }

    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(StateEvent::Failed(message.clone()), |s| {
            s.stage = Stage::Failed;
            s.error = Some(message);
        });
    }
}
