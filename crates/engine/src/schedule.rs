use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Pure next-run computation for the daily driver.
///
/// The engine never self-schedules; the daemon loop asks the scheduler for
/// the next wall-clock instant, sleeps, and triggers one cycle. Keeping the
/// arithmetic here means cycle logic is testable without real time passing.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    run_at: NaiveTime,
}

impl Scheduler {
    pub fn new(run_at: NaiveTime) -> Self {
        Scheduler { run_at }
    }

    pub fn run_at(&self) -> NaiveTime {
        self.run_at
    }

    /// The next instant strictly after `now` at which a cycle should start.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.run_at).and_utc();
        if today > now {
            today
        } else {
            (now.date_naive() + Duration::days(1))
                .and_time(self.run_at)
                .and_utc()
        }
    }
}
