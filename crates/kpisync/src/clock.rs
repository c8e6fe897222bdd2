use chrono::{DateTime, Datelike, Utc};

/// Source of "now" for week resolution and last-update stamps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[cfg(feature = "system-clock")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(feature = "system-clock")]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// ISO year-week label (`YYYY-WW`, Monday-start weeks) used as the week topic.
pub fn year_week(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{}-{:02}", week.year(), week.week())
}

/// Date written into the last-update column.
pub fn update_date(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}
