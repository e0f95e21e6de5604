//! Idle-energy estimator (§4.E): an online two-point linear regression that
//! separates idle from dynamic energy as node utilization varies.

use std::collections::VecDeque;

use crate::config::EstimatorConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone)]
pub struct IdleEnergyState {
    min: Option<Point>,
    max: Option<Point>,
    history: VecDeque<f64>,
    history_size: usize,
    calculated_idle_energy: f64,
    slope: f64,
    spread: f64,
    converged: bool,
}

/// Tolerance for treating history entries as "equal" for convergence.
const CONVERGENCE_TOLERANCE: f64 = 1e-9;

impl IdleEnergyState {
    pub fn new(history_size: usize) -> Self {
        Self {
            min: None,
            max: None,
            history: VecDeque::with_capacity(history_size),
            history_size,
            calculated_idle_energy: 0.0,
            slope: 0.0,
            spread: 0.0,
            converged: false,
        }
    }

    pub fn calculated_idle_energy(&self) -> f64 {
        self.calculated_idle_energy
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn spread(&self) -> f64 {
        self.spread
    }

    /// Sticky convergence diagnostic: true once history is full of
    /// mutually-equal entries. Downstream consumers read
    /// `calculated_idle_energy` regardless of this flag.
    pub fn is_idle_power_reliable(&self) -> bool {
        self.converged
    }

    fn push_history(&mut self, value: f64) {
        if self.history.len() == self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(value);
        self.recompute_convergence();
    }

    fn recompute_convergence(&mut self) {
        if self.history.len() < self.history_size {
            return;
        }
        let first = self.history[0];
        let all_equal = self
            .history
            .iter()
            .all(|v| (v - first).abs() <= CONVERGENCE_TOLERANCE);
        if all_equal {
            self.converged = true;
        }
    }

    /// Feed a new `(resource_utilization_x, absolute_energy_delta_y)`
    /// observation. `max_theoretical_cpu_time` is `CPUs * sample_period_ms`
    /// for this tick, used to normalize `spread`.
    pub fn update(&mut self, x: f64, y: f64, cfg: &EstimatorConfig, max_theoretical_cpu_time: f64) {
        let (min, max) = match (self.min, self.max) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                let p = Point { x, y };
                self.min = Some(p);
                self.max = Some(p);
                self.calculated_idle_energy = y;
                self.push_history(self.calculated_idle_energy);
                return;
            }
        };

        if min.x < x && x < max.x {
            // Excess point: interior to the known range, no update.
            self.push_history(self.calculated_idle_energy);
            return;
        }

        let mut new_min = min;
        let mut new_max = max;

        if x <= min.x {
            new_min = if x == min.x {
                Point { x: min.x, y: min.y.min(y) }
            } else {
                Point { x, y }
            };
        } else if x >= max.x {
            new_max = if x == max.x {
                Point { x: max.x, y: max.y.min(y) }
            } else {
                Point { x, y }
            };
        }

        let candidate_idle;
        let candidate_slope;
        let candidate_spread;
        if new_min.x == new_max.x {
            candidate_idle = 0.0;
            candidate_slope = 0.0;
            candidate_spread = 0.0;
        } else {
            candidate_slope = (new_max.y - new_min.y) / (new_max.x - new_min.x);
            candidate_idle = new_min.y - candidate_slope * new_min.x;
            candidate_spread = if max_theoretical_cpu_time > 0.0 {
                (new_max.x - new_min.x) / max_theoretical_cpu_time
            } else {
                0.0
            };
        }

        let accepted = candidate_spread >= cfg.min_spread
            && candidate_idle >= cfg.min_intercept
            && candidate_slope >= cfg.min_slope;

        if accepted {
            self.min = Some(new_min);
            self.max = Some(new_max);
            self.calculated_idle_energy = candidate_idle;
            self.slope = candidate_slope;
            self.spread = candidate_spread;
        }
        // else: discard the candidate, retain previously accepted state.

        self.push_history(self.calculated_idle_energy);
    }

    #[cfg(test)]
    fn min_point(&self) -> Option<(f64, f64)> {
        self.min.map(|p| (p.x, p.y))
    }

    #[cfg(test)]
    fn max_point(&self) -> Option<(f64, f64)> {
        self.max.map(|p| (p.x, p.y))
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissive_cfg() -> EstimatorConfig {
        EstimatorConfig {
            min_spread: 0.0,
            min_intercept: f64::NEG_INFINITY,
            min_slope: f64::NEG_INFINITY,
            history_size: 5,
        }
    }

    #[test]
    fn min_x_never_exceeds_max_x() {
        let mut e = IdleEnergyState::new(5);
        let cfg = permissive_cfg();
        for (x, y) in [(10.0, 15.0), (20.0, 25.0), (5.0, 8.0), (30.0, 40.0)] {
            e.update(x, y, &cfg, 1000.0);
            if let (Some(min), Some(max)) = (e.min_point(), e.max_point()) {
                assert!(min.0 <= max.0);
            }
        }
    }

    #[test]
    fn history_bounded_by_history_size() {
        let mut e = IdleEnergyState::new(3);
        let cfg = permissive_cfg();
        for i in 0..10 {
            e.update(i as f64, i as f64 * 2.0, &cfg, 1000.0);
        }
        assert!(e.history_len() <= 3);
    }

    #[test]
    fn excess_point_scenario_no_change_history_appends_prior() {
        // min=(10,15), max=(20,25); feed (15,10): excess point.
        let mut e = IdleEnergyState::new(5);
        let cfg = permissive_cfg();
        e.update(10.0, 15.0, &cfg, 1000.0);
        e.update(20.0, 25.0, &cfg, 1000.0);
        // Prior to the excess point: slope=(25-15)/(20-10)=1.0, intercept=15-1*10=5.0
        assert_eq!(e.calculated_idle_energy(), 5.0);
        e.update(15.0, 10.0, &cfg, 1000.0);
        assert_eq!(e.min_point(), Some((10.0, 15.0)));
        assert_eq!(e.max_point(), Some((20.0, 25.0)));
        assert_eq!(e.calculated_idle_energy(), 5.0);
    }

    #[test]
    fn new_minimum_scenario() {
        // min=(10,15), max=(20,25); feed (5,8): new minimum.
        let mut e = IdleEnergyState::new(5);
        let cfg = permissive_cfg();
        e.update(10.0, 15.0, &cfg, 150.0);
        e.update(20.0, 25.0, &cfg, 150.0);
        e.update(5.0, 8.0, &cfg, 150.0);
        assert_eq!(e.min_point(), Some((5.0, 8.0)));
        assert_eq!(e.max_point(), Some((20.0, 25.0)));
        let slope = (25.0 - 8.0) / (20.0 - 5.0);
        assert!((e.slope() - slope).abs() < 1e-9);
        let intercept = 8.0 - slope * 5.0;
        assert!((e.calculated_idle_energy() - intercept).abs() < 1e-9);
        assert!((e.spread() - 0.15).abs() < 1e-9);
    }

    /// §8 end-to-end scenario 1: CPUCount=2, SamplePeriodSec=3s,
    /// Idle=200 mJ/s, MaxEnergy=1000 mJ/s, a LinearEnergy model
    /// `y(x) = idle_per_tick + (x / maxTheoreticalCPUTime) * (max_per_tick - idle_per_tick)`.
    /// Feeding CPU times [700,500,1500,200,5000,6000,10] ms should settle
    /// `calculated_idle_energy == 600 mJ` from sample 2 onward, converging
    /// (HistorySize=4) exactly on sample 5.
    #[test]
    fn single_socket_linear_source_scenario() {
        let cfg = EstimatorConfig {
            min_spread: 0.0,
            min_intercept: f64::NEG_INFINITY,
            min_slope: f64::NEG_INFINITY,
            history_size: 4,
        };
        let max_theoretical_cpu_time = 2.0 * 3.0 * 1000.0; // CPUs * period_ms = 6000
        let idle_per_tick = 200.0 * 3.0; // 600 mJ
        let max_per_tick = 1000.0 * 3.0; // 3000 mJ
        let energy = |x: f64| -> f64 {
            idle_per_tick + (x / max_theoretical_cpu_time) * (max_per_tick - idle_per_tick)
        };

        let mut e = IdleEnergyState::new(cfg.history_size);
        let xs = [700.0, 500.0, 1500.0, 200.0, 5000.0, 6000.0, 10.0];
        let mut reliable_at = None;
        for (i, x) in xs.iter().enumerate() {
            e.update(*x, energy(*x), &cfg, max_theoretical_cpu_time);
            if i + 1 >= 2 {
                assert!(
                    (e.calculated_idle_energy() - 600.0).abs() < 1e-6,
                    "sample {} expected 600, got {}",
                    i + 1,
                    e.calculated_idle_energy()
                );
            }
            if reliable_at.is_none() && e.is_idle_power_reliable() {
                reliable_at = Some(i + 1);
            }
        }
        assert_eq!(reliable_at, Some(5));
        assert!(e.is_idle_power_reliable());
    }

    #[test]
    fn gate_rejects_insufficient_spread_and_retains_prior() {
        let cfg = EstimatorConfig {
            min_spread: 0.5,
            min_intercept: f64::NEG_INFINITY,
            min_slope: f64::NEG_INFINITY,
            history_size: 5,
        };
        let mut e = IdleEnergyState::new(5);
        e.update(10.0, 100.0, &cfg, 1000.0);
        // spread 0 (min==max) on init is fine since init bypasses the gate.
        let prior_idle = e.calculated_idle_energy();
        // Tiny new max -> spread well under 0.5 -> candidate rejected.
        e.update(20.0, 50.0, &cfg, 1000.0);
        assert_eq!(e.calculated_idle_energy(), prior_idle);
        assert_eq!(e.max_point(), Some((10.0, 100.0)));
    }
}
