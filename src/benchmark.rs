//! Frame-time measurement in consecutive timed states.
//!
//! Every state counts ticks and, each time `time_per_step` seconds have
//! elapsed, folds them into `TimeStats`. The service runs its states one
//! after another and stops after the last one. Callers react to the returned
//! events, e.g. switching the ambient occlusion mode when a state is entered.

use log::{debug, info};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeStats {
    pub frame_number: u64,
    pub fps: f32,
    pub mspf: f32,
    pub min_fps: f32,
    pub min_mspf: f32,
    pub max_fps: f32,
    pub max_mspf: f32,
}

impl Default for TimeStats {
    fn default() -> Self {
        Self {
            frame_number: 0,
            fps: 0.,
            mspf: 0.,
            min_fps: f32::MAX,
            min_mspf: f32::MAX,
            max_fps: 0.,
            max_mspf: 0.,
        }
    }
}

impl TimeStats {
    /// Folds `ticks` frames rendered over `elapsed` seconds into the stats
    pub fn record(&mut self, ticks: u64, elapsed: f32) {
        let fps = ticks as f32 / elapsed;
        let mspf = if ticks > 0 {
            1000. * elapsed / ticks as f32
        } else {
            f32::INFINITY
        };

        self.frame_number += ticks;
        self.fps = fps;
        self.mspf = mspf;
        self.min_fps = self.min_fps.min(fps);
        self.min_mspf = self.min_mspf.min(mspf);
        self.max_fps = self.max_fps.max(fps);
        self.max_mspf = self.max_mspf.max(mspf);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BenchmarkEvent {
    Enter {
        state: usize,
        name: String,
    },
    Stats {
        state: usize,
        stats: TimeStats,
        /// Share of the state's work done, in [0, 1]
        progress: f32,
    },
    Exit {
        state: usize,
        stats: TimeStats,
    },
}

/// Tick and time accumulation shared by all states
#[derive(Clone, Debug)]
pub struct StatsCounter {
    stats: TimeStats,
    tick_count: u64,
    time_elapsed: f32,
    time_per_step: f32,
}

impl StatsCounter {
    pub fn new(time_per_step: f32) -> Self {
        Self {
            stats: TimeStats::default(),
            tick_count: 0,
            time_elapsed: 0.,
            time_per_step,
        }
    }

    pub fn reset(&mut self) {
        self.tick_count = 0;
        self.time_elapsed = 0.;
    }

    /// Counts a frame. Returns the updated stats whenever a step completes.
    pub fn tick(&mut self, delta_time: f32) -> Option<TimeStats> {
        self.tick_count += 1;
        self.time_elapsed += delta_time;
        if self.time_elapsed < self.time_per_step {
            return None;
        }
        self.stats.record(self.tick_count, self.time_elapsed);
        self.reset();
        Some(self.stats)
    }

    pub fn stats(&self) -> TimeStats {
        self.stats
    }
}

pub trait BenchmarkState {
    fn name(&self) -> &str;

    fn enter(&mut self);

    /// Advances by one frame that took `delta_time` seconds. `state` is the
    /// index the service runs this state under.
    fn tick(&mut self, state: usize, delta_time: f32, events: &mut Vec<BenchmarkEvent>);

    fn exit(&mut self) -> TimeStats;

    fn is_completed(&self) -> bool;
}

/// Runs for a fixed number of stat steps
pub struct WaitState {
    name: String,
    steps: u32,
    completed_steps: u32,
    counter: StatsCounter,
}

impl WaitState {
    pub fn new(name: &str, steps: u32, time_per_step: f32) -> Self {
        Self {
            name: name.to_owned(),
            steps,
            completed_steps: 0,
            counter: StatsCounter::new(time_per_step),
        }
    }

    pub fn progress(&self) -> f32 {
        if self.steps == 0 {
            1.
        } else {
            self.completed_steps as f32 / self.steps as f32
        }
    }
}

impl BenchmarkState for WaitState {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self) {
        self.counter.reset();
        self.completed_steps = 0;
    }

    fn tick(&mut self, state: usize, delta_time: f32, events: &mut Vec<BenchmarkEvent>) {
        if let Some(stats) = self.counter.tick(delta_time) {
            self.completed_steps += 1;
            events.push(BenchmarkEvent::Stats {
                state,
                stats,
                progress: self.progress(),
            });
        }
    }

    fn exit(&mut self) -> TimeStats {
        self.counter.reset();
        self.counter.stats()
    }

    fn is_completed(&self) -> bool {
        self.completed_steps >= self.steps
    }
}

#[derive(Default)]
pub struct BenchmarkService {
    states: Vec<Box<dyn BenchmarkState>>,
    current: Option<usize>,
}

impl BenchmarkService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a state and returns the index its events carry
    pub fn add_state<S: BenchmarkState + 'static>(&mut self, state: S) -> usize {
        self.states.push(Box::new(state));
        self.states.len() - 1
    }

    pub fn start(&mut self) -> Vec<BenchmarkEvent> {
        let mut events = Vec::new();
        self.current = None;
        self.enter_state(0, &mut events);
        events
    }

    fn enter_state(&mut self, index: usize, events: &mut Vec<BenchmarkEvent>) {
        if let Some(state) = self.states.get_mut(index) {
            state.enter();
            info!("Benchmark state '{}' started", state.name());
            events.push(BenchmarkEvent::Enter {
                state: index,
                name: state.name().to_owned(),
            });
            self.current = Some(index);
        } else {
            debug!("Benchmark finished after {} states", self.states.len());
            self.current = None;
        }
    }

    pub fn tick(&mut self, delta_time: f32) -> Vec<BenchmarkEvent> {
        let mut events = Vec::new();
        let index = match self.current {
            Some(index) => index,
            None => return events,
        };
        let state = &mut self.states[index];
        state.tick(index, delta_time, &mut events);
        for event in events.iter() {
            if let BenchmarkEvent::Stats { stats, progress, .. } = event {
                info!(
                    "{}: {:.1} fps, {:.3} ms per frame (min {:.1} fps, max {:.1} fps), {:.0}% done",
                    state.name(),
                    stats.fps,
                    stats.mspf,
                    stats.min_fps,
                    stats.max_fps,
                    progress * 100.
                );
            }
        }
        if state.is_completed() {
            let stats = state.exit();
            events.push(BenchmarkEvent::Exit {
                state: index,
                stats,
            });
            self.enter_state(index + 1, &mut events);
        }
        events
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_finished(&self) -> bool {
        !self.states.is_empty() && self.current.is_none()
    }

    pub fn current_state_name(&self) -> Option<&str> {
        self.current.map(|index| self.states[index].name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_extremes() {
        let mut stats = TimeStats::default();
        stats.record(60, 1.);
        stats.record(30, 1.);
        stats.record(120, 2.);
        assert_eq!(stats.frame_number, 210);
        assert_eq!(stats.fps, 60.);
        assert_eq!(stats.min_fps, 30.);
        assert_eq!(stats.max_fps, 60.);
        assert!((stats.max_mspf - 1000. / 30.).abs() < 1e-3);
    }

    #[test]
    fn counter_reports_once_per_step() {
        let mut counter = StatsCounter::new(1.);
        let reports: Vec<_> = (0..40).filter_map(|_| counter.tick(0.1)).collect();
        // 40 ticks of 0.1s make four one-second steps, give or take rounding
        assert!(reports.len() >= 3 && reports.len() <= 4, "{}", reports.len());
        assert!(reports.iter().all(|stats| stats.fps > 9. && stats.fps < 11.));
    }

    #[test]
    fn wait_state_completes_after_its_steps() {
        let mut state = WaitState::new("Wait", 2, 0.5);
        let mut events = Vec::new();
        state.enter();
        state.tick(0, 0.5, &mut events);
        assert!(!state.is_completed());
        assert_eq!(state.progress(), 0.5);
        state.tick(0, 0.5, &mut events);
        assert!(state.is_completed());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn service_runs_states_in_order_and_stops() {
        let mut service = BenchmarkService::new();
        let native = service.add_state(WaitState::new("Native", 1, 1.));
        let shared = service.add_state(WaitState::new("Shared", 1, 1.));

        let events = service.start();
        assert_eq!(
            events,
            vec![BenchmarkEvent::Enter {
                state: native,
                name: String::from("Native")
            }]
        );
        assert_eq!(service.current_state_name(), Some("Native"));

        let events = service.tick(1.);
        assert!(matches!(events[0], BenchmarkEvent::Stats { state, .. } if state == native));
        assert!(matches!(events[1], BenchmarkEvent::Exit { state, .. } if state == native));
        assert!(matches!(&events[2], BenchmarkEvent::Enter { state, .. } if *state == shared));

        let events = service.tick(1.);
        assert!(matches!(events.last(), Some(BenchmarkEvent::Exit { state, .. }) if *state == shared));
        assert!(service.is_finished());
        assert!(service.tick(1.).is_empty());
    }
}
