use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatUtilization {
    Nominal,
    NearLimit,
    AtLimit,
}

impl SeatUtilization {
    pub const NEAR_LIMIT_PERCENT: i64 = 80;

    /// Band for `used` out of `limit` seats. A zero limit counts as at-limit.
    pub fn from_counts(used: i32, limit: i32) -> Self {
        if limit <= 0 || used >= limit {
            return SeatUtilization::AtLimit;
        }
        let percent = i64::from(used) * 100 / i64::from(limit);
        if percent >= Self::NEAR_LIMIT_PERCENT {
            SeatUtilization::NearLimit
        } else {
            SeatUtilization::Nominal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeatUtilization::Nominal => "nominal",
            SeatUtilization::NearLimit => "near_limit",
            SeatUtilization::AtLimit => "at_limit",
        }
    }
}

impl Display for SeatUtilization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_percent_thresholds() {
        assert_eq!(SeatUtilization::from_counts(7, 10), SeatUtilization::Nominal);
        assert_eq!(SeatUtilization::from_counts(8, 10), SeatUtilization::NearLimit);
        assert_eq!(SeatUtilization::from_counts(99, 100), SeatUtilization::NearLimit);
        assert_eq!(SeatUtilization::from_counts(10, 10), SeatUtilization::AtLimit);
        assert_eq!(SeatUtilization::from_counts(12, 10), SeatUtilization::AtLimit);
    }

    #[test]
    fn zero_limit_is_at_limit() {
        assert_eq!(SeatUtilization::from_counts(0, 0), SeatUtilization::AtLimit);
    }
}
