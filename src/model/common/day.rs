use std::fmt::Display;
use std::str::FromStr;

use chrono::{NaiveDate, ParseError};
use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// The calendar date under which votes are partitioned and results grouped.
/// Serialised as `YYYY-MM-DD`, both in the database and in the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VotingDay(NaiveDate);

impl VotingDay {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Display for VotingDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for VotingDay {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

impl From<VotingDay> for Bson {
    fn from(day: VotingDay) -> Self {
        Bson::String(day.to_string())
    }
}
