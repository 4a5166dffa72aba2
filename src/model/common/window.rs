use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::day::VotingDay;

/// Local hour at which voting opens (inclusive).
pub const OPENING_HOUR: u32 = 8;
/// Local hour at which voting closes (exclusive).
pub const CLOSING_HOUR: u32 = 20;

/// Offset used when none is configured: Indian Standard Time, UTC+05:30.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 5 * 60 + 30;

/// The daily voting window, evaluated in a single fixed regional offset.
///
/// Both the open/closed decision and the voting day key come from the same
/// offset, so a vote can never be filed under a different day than the window
/// that admitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingWindow {
    offset: FixedOffset,
}

impl Default for VotingWindow {
    fn default() -> Self {
        Self::from_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES)
            .expect("default offset is within range")
    }
}

impl VotingWindow {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Construct a window for an offset east of UTC, in minutes.
    /// Returns `None` if the offset is out of range (more than a day).
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The given instant in the window's local time.
    pub fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    /// Is voting open at the given instant?
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let hour = self.local(now).hour();
        (OPENING_HOUR..CLOSING_HOUR).contains(&hour)
    }

    /// The voting day that the given instant falls into.
    pub fn voting_day(&self, now: DateTime<Utc>) -> VotingDay {
        VotingDay::new(self.local(now).date_naive())
    }

    /// Are today's results final at the given instant?
    pub fn is_finalized(&self, now: DateTime<Utc>) -> bool {
        !self.is_open(now)
    }

    /// Are the results for `day` final at the given instant? Past days are
    /// always final, future days never are.
    pub fn is_finalized_for(&self, day: VotingDay, now: DateTime<Utc>) -> bool {
        let today = self.voting_day(now);
        if day < today {
            true
        } else if day > today {
            false
        } else {
            self.is_finalized(now)
        }
    }

    /// A snapshot of the window state for display.
    pub fn status(&self, now: DateTime<Utc>) -> VotingStatus {
        let local = self.local(now);
        let hour = local.hour();
        let is_open = self.is_open(now);

        let (hours_until_open, hours_until_close, message) = if is_open {
            let remaining = CLOSING_HOUR - hour;
            (
                None,
                Some(remaining),
                format!(
                    "Voting is open until {}. Time remaining: {}. Results reset daily.",
                    clock_label(CLOSING_HOUR),
                    hours_label(remaining)
                ),
            )
        } else if hour < OPENING_HOUR {
            let until = OPENING_HOUR - hour;
            (
                Some(until),
                None,
                format!(
                    "Voting opens at {}. Opens in: {}. New voting period for today!",
                    clock_label(OPENING_HOUR),
                    hours_label(until)
                ),
            )
        } else {
            (
                None,
                None,
                "Voting has closed for today. Results are final. Come back tomorrow to vote again!"
                    .to_string(),
            )
        };

        VotingStatus {
            is_open,
            day: self.voting_day(now),
            current_time: local.format("%I:%M %p").to_string(),
            utc_offset: self.offset.to_string(),
            opens_at: format!("{OPENING_HOUR:02}:00"),
            closes_at: format!("{CLOSING_HOUR:02}:00"),
            hours_until_open,
            hours_until_close,
            message,
        }
    }
}

/// The voting window as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingStatus {
    pub is_open: bool,
    pub day: VotingDay,
    /// Local wall-clock time, e.g. `07:30 AM`.
    pub current_time: String,
    /// The fixed offset all times are expressed in, e.g. `+05:30`.
    pub utc_offset: String,
    pub opens_at: String,
    pub closes_at: String,
    pub hours_until_open: Option<u32>,
    pub hours_until_close: Option<u32>,
    pub message: String,
}

fn clock_label(hour: u32) -> String {
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let twelve = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{twelve}:00 {suffix}")
}

fn hours_label(hours: u32) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}

#[cfg(test)]
impl VotingWindow {
    /// The UTC instant corresponding to the given local wall-clock time.
    pub fn at(&self, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .and_then(|naive| naive.and_local_timezone(self.offset).single())
            .expect("valid local time")
            .with_timezone(&Utc)
    }
}
