//! Catch-up decisions and wall-clock scheduling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use tokio::task::JoinHandle;

use super::BackupService;

/// What the startup check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUp {
    /// No successful backup on record.
    Initial,
    /// At least one scheduled run was missed.
    Missed { intervals: u64 },
    /// Older than the grace window but within one interval.
    GraceElapsed,
    /// A recent backup exists.
    Recent,
}

impl CatchUp {
    pub fn should_run(self) -> bool {
        !matches!(self, CatchUp::Recent)
    }
}

pub fn catchup_decision(
    last_success: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace: Duration,
    interval: Duration,
) -> CatchUp {
    let Some(last) = last_success else {
        return CatchUp::Initial;
    };
    // A timestamp in the future counts as just now.
    let since = (now - last).to_std().unwrap_or_default();

    if since < grace {
        return CatchUp::Recent;
    }
    if since >= interval && !interval.is_zero() {
        let intervals = (since - grace).as_secs() / interval.as_secs().max(1);
        return CatchUp::Missed {
            intervals: intervals.max(1),
        };
    }
    CatchUp::GraceElapsed
}

/// The first wall-clock multiple of `interval` (counted from local midnight)
/// strictly after `now`.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, interval: Duration) -> DateTime<Tz> {
    let step = (interval.as_secs() / 3600).max(1) as i64;
    let tz = now.timezone();
    let midnight = now.date_naive().and_time(NaiveTime::default());

    (step..=24)
        .step_by(step as usize)
        .filter_map(|hour| {
            tz.from_local_datetime(&(midnight + chrono::Duration::hours(hour)))
                .earliest()
        })
        .find(|candidate| candidate > now)
        .unwrap_or_else(|| now.clone() + chrono::Duration::hours(step))
}

/// Run the startup check, then trigger a backup at every interval boundary.
///
/// Each run is spawned on its own; overlaps are resolved by the lock.
pub fn start_schedule(service: Arc<BackupService>) -> JoinHandle<()> {
    tracing::info!(
        interval_hours = service.interval().as_secs() / 3600,
        "Starting backup schedule"
    );

    let startup = service.clone();
    tokio::spawn(async move {
        startup.catch_up_at_startup().await;
    });

    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let next = next_run_after(&now, service.interval());
            tracing::info!(next_run = %next, "Next scheduled backup");
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            tracing::info!("Scheduled backup triggered");
            let run = service.clone();
            tokio::spawn(async move {
                run.perform_backup().await;
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(15 * 60);
    const INTERVAL: Duration = Duration::from_secs(6 * 3600);

    #[test]
    fn test_catchup_after_missed_interval() {
        let now = Utc::now();
        let decision = catchup_decision(
            Some(now - chrono::Duration::hours(8)),
            now,
            GRACE,
            INTERVAL,
        );
        assert_eq!(decision, CatchUp::Missed { intervals: 1 });
        assert!(decision.should_run());
    }

    #[test]
    fn test_recent_backup_skips() {
        let now = Utc::now();
        let decision = catchup_decision(
            Some(now - chrono::Duration::minutes(5)),
            now,
            GRACE,
            INTERVAL,
        );
        assert_eq!(decision, CatchUp::Recent);
        assert!(!decision.should_run());
    }

    #[test]
    fn test_no_history_runs() {
        assert!(catchup_decision(None, Utc::now(), GRACE, INTERVAL).should_run());
    }

    #[test]
    fn test_past_grace_within_interval_runs() {
        let now = Utc::now();
        let decision = catchup_decision(
            Some(now - chrono::Duration::hours(1)),
            now,
            GRACE,
            INTERVAL,
        );
        assert_eq!(decision, CatchUp::GraceElapsed);
    }

    #[test]
    fn test_future_timestamp_is_recent() {
        let now = Utc::now();
        let decision = catchup_decision(
            Some(now + chrono::Duration::hours(1)),
            now,
            GRACE,
            INTERVAL,
        );
        assert_eq!(decision, CatchUp::Recent);
    }

    #[test]
    fn test_next_run_aligns_to_interval() {
        let at = |h, m, s| Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap();

        assert_eq!(next_run_after(&at(5, 59, 0), INTERVAL), at(6, 0, 0));
        assert_eq!(next_run_after(&at(6, 0, 0), INTERVAL), at(12, 0, 0));
        assert_eq!(next_run_after(&at(0, 0, 0), INTERVAL), at(6, 0, 0));
        assert_eq!(
            next_run_after(&at(19, 30, 0), INTERVAL),
            Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(
            next_run_after(&at(10, 15, 0), Duration::from_secs(3600)),
            at(11, 0, 0)
        );
    }
}
