/*
[INPUT]:  Manager status snapshot ages and market-data arrival times
[OUTPUT]: HealthReport with per-signal ages and warnings
[POS]:    Observability layer - staleness thresholds, no control actions
[UPDATE]: When thresholds or monitored signals change
*/

use std::time::Duration;

use tokio::time::Instant;

use crate::manager::StatusSnapshot;

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub market: Duration,
    pub position: Duration,
    pub maintenance: Duration,
    pub reconcile: Duration,
    /// No warnings at all during the initial startup window.
    pub startup_grace: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            market: Duration::from_secs(15),
            position: Duration::from_secs(60),
            maintenance: Duration::from_secs(5),
            reconcile: Duration::from_secs(15),
            startup_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub ok: bool,
    pub warnings: Vec<String>,
    pub market_age: Option<Duration>,
    pub position_age: Option<Duration>,
    pub maintenance_age: Option<Duration>,
    pub reconcile_age: Option<Duration>,
    pub order_update_age: Option<Duration>,
}

/// Compares signal ages against thresholds. Signals that have never fired
/// produce no warning except the market quote, which must arrive once the
/// startup grace window has passed.
pub struct HealthChecker {
    thresholds: HealthThresholds,
    started_at: Instant,
}

impl HealthChecker {
    pub fn new(thresholds: HealthThresholds, started_at: Instant) -> Self {
        Self {
            thresholds,
            started_at,
        }
    }

    pub fn check(
        &self,
        now: Instant,
        status: &StatusSnapshot,
        last_quote_at: Option<Instant>,
    ) -> HealthReport {
        let age = |at: Option<Instant>| at.map(|at| now.saturating_duration_since(at));

        let market_age = age(last_quote_at);
        let position_age = age(status.last_position_update_at);
        let maintenance_age = age(status.last_maintenance_at);
        let reconcile_age = age(status.last_reconcile_at);
        let order_update_age = age(status.last_order_update_at);

        let mut warnings = Vec::new();
        let in_grace = now.saturating_duration_since(self.started_at) < self.thresholds.startup_grace;

        if !in_grace {
            match market_age {
                None => warnings.push("no market quote received".to_string()),
                Some(age) if age > self.thresholds.market => {
                    warnings.push(format!("market quote stale for {age:?}"));
                }
                _ => {}
            }
            if let Some(age) = position_age
                && age > self.thresholds.position
            {
                warnings.push(format!("position stale for {age:?}"));
            }
            if let Some(age) = maintenance_age
                && age > self.thresholds.maintenance
            {
                warnings.push(format!("maintenance stale for {age:?}"));
            }
            if let Some(age) = reconcile_age
                && age > self.thresholds.reconcile
            {
                warnings.push(format!("reconcile stale for {age:?}"));
            }
        }

        HealthReport {
            ok: warnings.is_empty(),
            warnings,
            market_age,
            position_age,
            maintenance_age,
            reconcile_age,
            order_update_age,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(
        position: Option<Instant>,
        maintenance: Option<Instant>,
        reconcile: Option<Instant>,
    ) -> StatusSnapshot {
        StatusSnapshot {
            center_price: None,
            last_order_update_at: None,
            last_position_update_at: position,
            last_maintenance_at: maintenance,
            last_reconcile_at: reconcile,
        }
    }

    #[tokio::test]
    async fn health_all_fresh_is_ok() {
        let t0 = Instant::now();
        let checker = HealthChecker::new(HealthThresholds::default(), t0);
        let now = t0 + Duration::from_secs(60);

        let status = snapshot_with(Some(now), Some(now), Some(now));
        let report = checker.check(now, &status, Some(now));
        assert!(report.ok);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn health_missing_market_quote_warns_after_grace() {
        let t0 = Instant::now();
        let checker = HealthChecker::new(HealthThresholds::default(), t0);
        let status = snapshot_with(None, None, None);

        // Inside the grace window nothing warns, even a missing quote.
        let report = checker.check(t0 + Duration::from_secs(5), &status, None);
        assert!(report.ok);

        let report = checker.check(t0 + Duration::from_secs(60), &status, None);
        assert!(!report.ok);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("market quote"));
    }

    #[tokio::test]
    async fn health_absent_timestamps_do_not_warn_except_market() {
        let t0 = Instant::now();
        let checker = HealthChecker::new(HealthThresholds::default(), t0);
        let now = t0 + Duration::from_secs(120);

        let status = snapshot_with(None, None, None);
        let report = checker.check(now, &status, Some(now));
        assert!(report.ok);
        assert_eq!(report.position_age, None);
    }

    #[tokio::test]
    async fn health_stale_signals_each_warn() {
        let t0 = Instant::now();
        let checker = HealthChecker::new(HealthThresholds::default(), t0);
        let now = t0 + Duration::from_secs(300);
        let old = t0 + Duration::from_secs(30);

        let status = snapshot_with(Some(old), Some(old), Some(old));
        let report = checker.check(now, &status, Some(old));
        assert!(!report.ok);
        // market, position, maintenance, reconcile all stale
        assert_eq!(report.warnings.len(), 4);
    }
}
