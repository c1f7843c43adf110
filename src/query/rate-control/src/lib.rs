// Copyright 2024 PPDS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-connection AIMD parallelism controller (spec §4.8). The remote
//! service enforces an execution-time quota (roughly 4s of service time per
//! wall-second over a 5-minute window); this controller climbs towards
//! `hard_ceiling` for fast batches and backs off under an execution-time
//! ceiling for slow ones, so total in-flight service time stays under
//! budget instead of cascading into throttle failures.

use parking_lot::Mutex;
use ppds_common_base::RateControlOptions;
use std::time::Duration;
use std::time::Instant;

/// Mutable per-connection state (spec §3 "Rate-controller state"), behind a
/// single mutex — `get_parallelism`/`record_batch_duration`/
/// `record_throttle`/`record_success` must be serialized per connection
/// (spec §5).
struct State {
    current_parallelism: u32,
    throttle_ceiling: Option<u32>,
    exec_time_ceiling: Option<u32>,
    batch_duration_ema_ms: f64,
    sample_count: u32,
    throttled_until: Option<Instant>,
}

pub struct RateController {
    floor: u32,
    hard_ceiling: u32,
    options: RateControlOptions,
    state: Mutex<State>,
}

impl RateController {
    /// `floor` is `recommended_dop × connections` (spec §4.8); the
    /// controller starts there rather than at `hard_ceiling` so additive
    /// increase has somewhere to climb from.
    pub fn new(floor: u32, hard_ceiling: u32, options: RateControlOptions) -> Self {
        RateController {
            floor,
            hard_ceiling: hard_ceiling.max(floor),
            options,
            state: Mutex::new(State {
                current_parallelism: floor,
                throttle_ceiling: None,
                exec_time_ceiling: None,
                batch_duration_ema_ms: 0.0,
                sample_count: 0,
                throttled_until: None,
            }),
        }
    }

    /// `ceiling = min(hard_ceiling, throttle_ceiling_if_active,
    /// exec_time_ceiling_if_slow_batch)`; `current_parallelism` is reclamped
    /// into `[floor, ceiling]` before being returned, since either ceiling
    /// component may have tightened since the last call (spec §4.8).
    pub fn get_parallelism(&self) -> u32 {
        let mut state = self.state.lock();
        let ceiling = self.ceiling(&state);
        state.current_parallelism = state.current_parallelism.min(ceiling).max(self.floor);
        state.current_parallelism
    }

    /// `now < throttled_until` (spec §4.8 "Pre-flight"). Callers must return
    /// a connection to its pool without dispatching work while this holds.
    pub fn is_throttled(&self) -> bool {
        match self.state.lock().throttled_until {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    /// Additive increase by `floor` on a successful batch (spec §4.8).
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        let ceiling = self.ceiling(&state);
        state.current_parallelism = (state.current_parallelism + self.floor).min(ceiling);
    }

    /// Multiplicative decrease on a throttle response; `retry_after`, when
    /// present, also opens a cooldown window and pins `throttle_ceiling` to
    /// the parallelism level that triggered the throttle (spec §4.8).
    pub fn record_throttle(&self, retry_after: Option<Duration>) {
        let mut state = self.state.lock();
        state.current_parallelism = (state.current_parallelism / 2).max(self.floor);
        if let Some(retry_after) = retry_after {
            state.throttled_until = Some(Instant::now() + retry_after);
            state.throttle_ceiling = Some(state.current_parallelism);
            log::warn!(
                target: "ppds_query_rate_control",
                "throttled, retry_after={:?}, parallelism={}",
                retry_after,
                state.current_parallelism
            );
        }
    }

    /// EMA over batch duration (α=0.3); recomputes the execution-time
    /// ceiling each call so it applies only while batches are currently
    /// slow (spec §4.8 "Otherwise the execution-time ceiling is not
    /// applied").
    pub fn record_batch_duration(&self, duration: Duration) {
        let mut state = self.state.lock();
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let alpha = self.options.ema_alpha;
        state.batch_duration_ema_ms = if state.sample_count == 0 {
            duration_ms
        } else {
            alpha * duration_ms + (1.0 - alpha) * state.batch_duration_ema_ms
        };
        state.sample_count += 1;

        let slow = state.sample_count >= self.options.min_samples_for_ceiling
            && state.batch_duration_ema_ms >= self.options.slow_batch_threshold_ms;
        state.exec_time_ceiling = if slow {
            let ema_seconds = state.batch_duration_ema_ms / 1000.0;
            let ceiling = (self.options.exec_time_ceiling_factor / ema_seconds).floor().max(1.0) as u32;
            Some(ceiling)
        } else {
            None
        };
    }

    fn ceiling(&self, state: &State) -> u32 {
        let mut ceiling = self.hard_ceiling;
        if let Some(throttle_ceiling) = state.throttle_ceiling {
            ceiling = ceiling.min(throttle_ceiling);
        }
        if let Some(exec_time_ceiling) = state.exec_time_ceiling {
            ceiling = ceiling.min(exec_time_ceiling);
        }
        ceiling.max(self.floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RateControlOptions {
        RateControlOptions {
            ema_alpha: 0.3,
            exec_time_ceiling_factor: 250.0,
            slow_batch_threshold_ms: 10_000.0,
            min_samples_for_ceiling: 3,
        }
    }

    #[test]
    fn starts_at_floor() {
        let rc = RateController::new(4, 64, options());
        assert_eq!(rc.get_parallelism(), 4);
    }

    #[test]
    fn success_increases_additively_up_to_ceiling() {
        let rc = RateController::new(4, 10, options());
        rc.record_success();
        assert_eq!(rc.get_parallelism(), 8);
        rc.record_success();
        assert_eq!(rc.get_parallelism(), 10); // clamped at hard_ceiling
    }

    #[test]
    fn throttle_halves_and_floors() {
        let rc = RateController::new(4, 64, options());
        rc.record_success(); // 8
        rc.record_success(); // 12
        rc.record_throttle(None);
        assert_eq!(rc.get_parallelism(), 6);
    }

    #[test]
    fn throttle_with_retry_after_sets_throttled_until_and_ceiling() {
        let rc = RateController::new(4, 64, options());
        rc.record_throttle(Some(Duration::from_millis(50)));
        assert!(rc.is_throttled());
        assert_eq!(rc.get_parallelism(), 4);
        std::thread::sleep(Duration::from_millis(80));
        assert!(!rc.is_throttled());
    }

    #[test]
    fn slow_batches_apply_execution_time_ceiling() {
        let rc = RateController::new(4, 64, options());
        for _ in 0..3 {
            rc.record_batch_duration(Duration::from_millis(12_000));
        }
        // ema ~12000ms -> ceiling = floor(250 / 12) = 20
        for _ in 0..5 {
            rc.record_success();
        }
        assert_eq!(rc.get_parallelism(), 20);
    }

    #[test]
    fn fast_batches_never_apply_execution_time_ceiling() {
        let rc = RateController::new(4, 64, options());
        for _ in 0..5 {
            rc.record_batch_duration(Duration::from_millis(500));
        }
        for _ in 0..20 {
            rc.record_success();
        }
        assert_eq!(rc.get_parallelism(), 64);
    }
}
