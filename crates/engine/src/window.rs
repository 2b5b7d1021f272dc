use chrono::{DateTime, Duration, NaiveDate, Utc};

/// The rolling set of calendar days in scope for one scan cycle:
/// `[today - window_days, today]` inclusive, derived from the wall clock
/// handed to `run_cycle`. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl RollingWindow {
    pub fn compute(now: DateTime<Utc>, window_days: u32) -> Self {
        let end = now.date_naive();
        let start = end - Duration::days(i64::from(window_days));
        RollingWindow { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Days oldest to newest. The order is an invariant, not an accident:
    /// older scenes must register first so the catalog fills chronologically
    /// even when a cycle dies partway through.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}
