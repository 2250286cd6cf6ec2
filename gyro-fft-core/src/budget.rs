//! Accounting of engine steps that ran over their time budget.

use std::time::Duration;

/// Snapshot of the overrun counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverrunStats {
    /// Number of steps that exceeded the budget.
    pub cycles: u32,
    /// Sum of the time spent past the budget, in microseconds.
    pub total_micros: u64,
    /// Largest single overrun, in microseconds.
    pub max_micros: u32,
}

impl OverrunStats {
    /// Mean overrun in microseconds, 0 when nothing overran.
    pub fn average_micros(&self) -> u32 {
        if self.cycles == 0 {
            return 0;
        }
        (self.total_micros / self.cycles as u64) as u32
    }
}

#[derive(Debug, Clone)]
pub struct BudgetMonitor {
    budget_micros: u32,
    stats: OverrunStats,
}

impl BudgetMonitor {
    pub fn new(budget_micros: u32) -> Self {
        Self {
            budget_micros,
            stats: OverrunStats::default(),
        }
    }

    pub fn budget_micros(&self) -> u32 {
        self.budget_micros
    }

    /// Records how long one step took. Returns the overrun in microseconds
    /// if the step exceeded the budget.
    pub fn record(&mut self, elapsed: Duration) -> Option<u32> {
        let elapsed_micros = u32::try_from(elapsed.as_micros()).unwrap_or(u32::MAX);
        if elapsed_micros <= self.budget_micros {
            return None;
        }
        let overrun = elapsed_micros - self.budget_micros;
        self.stats.cycles = self.stats.cycles.saturating_add(1);
        self.stats.total_micros = self.stats.total_micros.saturating_add(overrun as u64);
        self.stats.max_micros = self.stats.max_micros.max(overrun);
        Some(overrun)
    }

    pub fn stats(&self) -> OverrunStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_steps_over_budget() {
        let mut monitor = BudgetMonitor::new(175);
        let durations = [100, 175, 200, 50, 400, 176];
        for micros in durations {
            monitor.record(Duration::from_micros(micros));
        }
        let stats = monitor.stats();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.total_micros, 25 + 225 + 1);
        assert_eq!(stats.max_micros, 225);
        assert_eq!(stats.average_micros(), 251 / 3);
    }

    #[test]
    fn average_is_zero_without_overruns() {
        let mut monitor = BudgetMonitor::new(175);
        monitor.record(Duration::from_micros(10));
        assert_eq!(monitor.stats(), OverrunStats::default());
        assert_eq!(monitor.stats().average_micros(), 0);
    }

    #[test]
    fn reports_individual_overrun() {
        let mut monitor = BudgetMonitor::new(100);
        assert_eq!(monitor.record(Duration::from_micros(99)), None);
        assert_eq!(monitor.record(Duration::from_micros(130)), Some(30));
    }
}
