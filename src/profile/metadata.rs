use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PlanningError, Result};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Horizon description shared by every profile: `[start, start + step * n_steps)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMetadata", into = "RawMetadata")]
pub struct ProfileMetadata {
    start: DateTime<Utc>,
    step: TimeDelta,
    n_steps: usize,
}

/// Wire form, checked through [`ProfileMetadata::new`] on the way in
#[derive(Serialize, Deserialize)]
struct RawMetadata {
    start: DateTime<Utc>,
    step_seconds: i64,
    n_steps: usize,
}

impl TryFrom<RawMetadata> for ProfileMetadata {
    type Error = PlanningError;

    fn try_from(raw: RawMetadata) -> Result<Self> {
        let step = TimeDelta::try_seconds(raw.step_seconds).ok_or_else(|| {
            PlanningError::InvalidMetadata(format!("step out of range: {}s", raw.step_seconds))
        })?;
        Self::new(raw.start, step, raw.n_steps)
    }
}

impl From<ProfileMetadata> for RawMetadata {
    fn from(metadata: ProfileMetadata) -> Self {
        Self {
            start: metadata.start,
            step_seconds: metadata.step.num_seconds(),
            n_steps: metadata.n_steps,
        }
    }
}

impl ProfileMetadata {
    /// Create metadata, checking that the step tiles a day and that `start` sits on a step boundary
    pub fn new(start: DateTime<Utc>, step: TimeDelta, n_steps: usize) -> Result<Self> {
        let step_ms = step.num_milliseconds();
        if step_ms <= 0 {
            return Err(PlanningError::InvalidMetadata(format!(
                "timestep duration must be positive, got {}ms",
                step_ms
            )));
        }
        if DAY_MILLIS % step_ms != 0 {
            return Err(PlanningError::InvalidMetadata(format!(
                "a day should be divisible by the timestep duration ({}ms)",
                step_ms
            )));
        }
        if start.timestamp_millis().rem_euclid(step_ms) != 0 {
            return Err(PlanningError::InvalidMetadata(format!(
                "profile start {} is not aligned with the timestep duration ({}ms)",
                start, step_ms
            )));
        }
        let end = i32::try_from(n_steps)
            .ok()
            .and_then(|n| step.checked_mul(n))
            .and_then(|span| start.checked_add_signed(span));
        if end.is_none() {
            return Err(PlanningError::InvalidMetadata(format!(
                "a horizon of {} steps of {}ms is out of range",
                n_steps, step_ms
            )));
        }
        Ok(Self { start, step, n_steps })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.step * self.n_steps as i32
    }

    pub fn step(&self) -> TimeDelta {
        self.step
    }

    pub fn step_seconds(&self) -> f64 {
        self.step.num_milliseconds() as f64 / 1000.0
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Start of the timestep with the given index
    pub fn start_of_step(&self, index: usize) -> DateTime<Utc> {
        self.start + self.step * index as i32
    }

    /// Index of the step containing `instant`.
    ///
    /// Returns -1 before the start and `n_steps` at or after the end; both are
    /// out-of-range markers rather than errors.
    pub fn index_at(&self, instant: DateTime<Utc>) -> i64 {
        if instant < self.start {
            return -1;
        }
        if instant >= self.end() {
            return self.n_steps as i64;
        }
        (instant - self.start).num_milliseconds() / self.step.num_milliseconds()
    }

    pub fn with_n_steps(&self, n_steps: usize) -> Self {
        Self { n_steps, ..*self }
    }

    /// Metadata of the window starting at the first aligned instant `>= from`.
    ///
    /// Returns the new metadata together with the number of skipped steps.
    pub fn subprofile(&self, from: DateTime<Utc>) -> Result<(Self, usize)> {
        if from < self.start || from > self.end() {
            return Err(PlanningError::OutOfRange {
                instant: from,
                start: self.start,
                end: self.end(),
            });
        }
        let new_start = next_aligned(from, self.step);
        let skipped = ((new_start - self.start).num_milliseconds() / self.step.num_milliseconds())
            as usize;
        let skipped = skipped.min(self.n_steps);
        Ok((
            Self {
                start: new_start,
                step: self.step,
                n_steps: self.n_steps - skipped,
            },
            skipped,
        ))
    }
}

impl fmt::Display for ProfileMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[start={}, step={}s, n_steps={}, end={}]",
            self.start,
            self.step.num_seconds(),
            self.n_steps,
            self.end()
        )
    }
}

/// First instant `>= instant` that lies on a multiple of `step` since the Unix epoch
pub fn next_aligned(instant: DateTime<Utc>, step: TimeDelta) -> DateTime<Utc> {
    let step_ms = step.num_milliseconds();
    let since_aligned = instant.timestamp_millis().rem_euclid(step_ms);
    if since_aligned == 0 {
        instant
    } else {
        instant + TimeDelta::milliseconds(step_ms - since_aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn epoch() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    #[rstest]
    #[case(300, true)]
    #[case(900, true)]
    #[case(3600, true)]
    #[case(7, false)]
    #[case(0, false)]
    fn test_step_must_tile_a_day(#[case] step_s: i64, #[case] valid: bool) {
        let result = ProfileMetadata::new(epoch(), TimeDelta::seconds(step_s), 4);
        assert_eq!(result.is_ok(), valid);
    }

    #[test]
    fn test_horizon_length_must_fit() {
        let too_long = ProfileMetadata::new(epoch(), TimeDelta::seconds(300), 3_000_000_000);
        assert!(matches!(too_long, Err(PlanningError::InvalidMetadata(_))));
        let past_calendar = ProfileMetadata::new(epoch(), TimeDelta::days(1), i32::MAX as usize);
        assert!(matches!(past_calendar, Err(PlanningError::InvalidMetadata(_))));

        let year = ProfileMetadata::new(epoch(), TimeDelta::seconds(300), 105_120).unwrap();
        assert!(year.end() > year.start());
        assert_eq!(year.index_at(year.start()), 0);
    }

    #[test]
    fn test_start_must_be_aligned() {
        let start = epoch() + TimeDelta::seconds(10);
        let result = ProfileMetadata::new(start, TimeDelta::seconds(300), 4);
        assert!(matches!(result, Err(PlanningError::InvalidMetadata(_))));
    }

    #[test]
    fn test_index_at_sentinels() {
        let meta = ProfileMetadata::new(epoch(), TimeDelta::seconds(300), 4).unwrap();
        assert_eq!(meta.index_at(epoch() - TimeDelta::seconds(1)), -1);
        assert_eq!(meta.index_at(epoch()), 0);
        assert_eq!(meta.index_at(epoch() + TimeDelta::seconds(299)), 0);
        assert_eq!(meta.index_at(epoch() + TimeDelta::seconds(300)), 1);
        assert_eq!(meta.index_at(meta.end()), 4);
        assert_eq!(meta.index_at(meta.end() + TimeDelta::hours(1)), 4);
    }

    #[test]
    fn test_subprofile_rounds_up_to_next_step() {
        let meta = ProfileMetadata::new(epoch(), TimeDelta::seconds(300), 4).unwrap();
        let (sub, skipped) = meta.subprofile(epoch() + TimeDelta::seconds(10)).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(sub.n_steps(), 3);
        assert_eq!(sub.start(), epoch() + TimeDelta::seconds(300));
        assert_eq!(sub.end(), meta.end());
    }

    #[test]
    fn test_subprofile_out_of_range() {
        let meta = ProfileMetadata::new(epoch(), TimeDelta::seconds(300), 4).unwrap();
        assert!(matches!(
            meta.subprofile(epoch() - TimeDelta::seconds(1)),
            Err(PlanningError::OutOfRange { .. })
        ));
        assert!(matches!(
            meta.subprofile(meta.end() + TimeDelta::seconds(1)),
            Err(PlanningError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let meta: ProfileMetadata =
            serde_json::from_str(r#"{"start": "1970-01-01T00:00:00Z", "step_seconds": 900, "n_steps": 2}"#)
                .unwrap();
        assert_eq!(meta.step(), TimeDelta::seconds(900));
        assert_eq!(serde_json::to_value(meta).unwrap()["step_seconds"], 900);

        let zero = serde_json::from_str::<ProfileMetadata>(
            r#"{"start": "1970-01-01T00:00:00Z", "step_seconds": 0, "n_steps": 2}"#,
        );
        assert!(zero.is_err());
    }

    #[test]
    fn test_alignment_helpers() {
        let step = TimeDelta::seconds(300);
        let t = epoch() + TimeDelta::seconds(301);
        assert_eq!(next_aligned(t, step), epoch() + TimeDelta::seconds(600));
        assert_eq!(next_aligned(epoch(), step), epoch());
    }
}
