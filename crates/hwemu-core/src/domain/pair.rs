//! Request-response pairs.
//!
//! A [`PairSpec`] is the parsed, index-free form of a pair as produced by the
//! codec.  A [`Pair`] is a spec stored on a device: it has an index and, for
//! periodic pairs, the scheduling state used by the async scheduler.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::codec::{self, CodecError};
use crate::domain::interface::{MAX_REQUEST, MAX_RESPONSE};

/// What a pair reacts to and what it answers with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PairSpec {
    /// Answers `response` when exactly `request` is received.
    Sync { request: Vec<u8>, response: Vec<u8> },
    /// Emits `response` once every `period`, unprompted.
    ///
    /// The textual form has millisecond resolution.
    Periodic { period: Duration, response: Vec<u8> },
}

impl PairSpec {
    /// The request bytes, or `None` for a periodic pair.
    pub fn request(&self) -> Option<&[u8]> {
        match self {
            PairSpec::Sync { request, .. } => Some(request.as_slice()),
            PairSpec::Periodic { .. } => None,
        }
    }

    /// The response bytes.
    pub fn response(&self) -> &[u8] {
        match self {
            PairSpec::Sync { response, .. } | PairSpec::Periodic { response, .. } => {
                response.as_slice()
            }
        }
    }

    /// The firing period, or `None` for a synchronous pair.
    pub fn period(&self) -> Option<Duration> {
        match self {
            PairSpec::Sync { .. } => None,
            PairSpec::Periodic { period, .. } => Some(*period),
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, PairSpec::Periodic { .. })
    }

    /// Checks the size and period constraints that the codec enforces on
    /// parsed input, for specs built directly in code.
    ///
    /// # Errors
    ///
    /// Returns the same [`CodecError`] the parser would report for the
    /// equivalent text.
    pub fn validate(&self) -> Result<(), CodecError> {
        match self {
            PairSpec::Sync { request, .. } => {
                if request.is_empty() {
                    return Err(CodecError::EmptyRequest);
                }
                if request.len() > MAX_REQUEST {
                    return Err(CodecError::RequestTooLong);
                }
            }
            PairSpec::Periodic { period, .. } => {
                if period.as_millis() == 0 {
                    return Err(CodecError::InvalidPeriod(codec::DurationError::Zero));
                }
                if period.as_millis() > u128::from(u32::MAX) {
                    return Err(CodecError::InvalidPeriod(codec::DurationError::Overflow));
                }
            }
        }
        let response = self.response();
        if response.is_empty() {
            return Err(CodecError::EmptyResponse);
        }
        if response.len() > MAX_RESPONSE {
            return Err(CodecError::ResponseTooLong);
        }
        Ok(())
    }
}

impl FromStr for PairSpec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        codec::parse_pair(s)
    }
}

impl fmt::Display for PairSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::format_pair(self))
    }
}

/// A pair stored on a device.
#[derive(Debug, Clone)]
pub struct Pair {
    index: usize,
    spec: PairSpec,
    /// Last due point at which this periodic pair fired, or the baseline
    /// recorded by the first scheduler tick that saw it.
    last_fire: Option<Instant>,
    /// Tick time of the last actual delivery.
    last_delivered: Option<Instant>,
}

impl Pair {
    pub(crate) fn new(index: usize, spec: PairSpec) -> Self {
        Self {
            index,
            spec,
            last_fire: None,
            last_delivered: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn spec(&self) -> &PairSpec {
        &self.spec
    }

    /// Returns `true` if this is a synchronous pair whose request is exactly `request`.
    pub fn matches(&self, request: &[u8]) -> bool {
        self.spec.request() == Some(request)
    }

    /// Advances the periodic schedule to `now`.
    ///
    /// Returns `true` if the pair is due and should fire.  Synchronous pairs
    /// never fire.  The first call only records `now` as the baseline.
    ///
    /// A pair fires when `now` has reached the next due point on its grid
    /// (`last_fire + period`) and at least one period has passed since the
    /// previous delivery, so two deliveries are never closer than `period`
    /// even when an earlier tick ran late.  When several periods have elapsed
    /// the pair fires once and `last_fire` moves to the latest due point not
    /// after `now`, so the schedule stays on its original grid without bursts.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        let Some(period) = self.spec.period() else {
            return false;
        };
        let Some(last) = self.last_fire else {
            self.last_fire = Some(now);
            return false;
        };
        let due = last + period;
        if now < due {
            return false;
        }
        if self.last_delivered.is_some_and(|at| now < at + period) {
            return false;
        }

        let behind = now.duration_since(due);
        let skipped = behind.as_nanos() / period.as_nanos().max(1);
        let catch_up = u64::try_from(skipped * period.as_nanos())
            .map(Duration::from_nanos)
            .unwrap_or(behind);
        self.last_fire = Some(due + catch_up);
        self.last_delivered = Some(now);
        true
    }

    pub fn last_fire(&self) -> Option<Instant> {
        self.last_fire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic(ms: u64) -> Pair {
        Pair::new(
            0,
            PairSpec::Periodic {
                period: Duration::from_millis(ms),
                response: vec![0x01],
            },
        )
    }

    #[test]
    fn test_sync_pair_matches_only_exact_request() {
        let pair = Pair::new(
            3,
            PairSpec::Sync {
                request: vec![0xDE, 0xAD],
                response: vec![0x01],
            },
        );
        assert!(pair.matches(&[0xDE, 0xAD]));
        assert!(!pair.matches(&[0xDE]));
        assert!(!pair.matches(&[0xDE, 0xAD, 0x00]));
        assert_eq!(pair.index(), 3);
    }

    #[test]
    fn test_periodic_pair_never_matches_by_content() {
        let pair = periodic(100);
        assert!(!pair.matches(&[0x01]));
        assert!(!pair.matches(&[]));
    }

    #[test]
    fn test_first_poll_records_baseline_without_firing() {
        let mut pair = periodic(100);
        let t0 = Instant::now();

        assert!(!pair.poll_due(t0));
        assert_eq!(pair.last_fire(), Some(t0));
    }

    #[test]
    fn test_poll_fires_at_due_point_and_advances_by_one_period() {
        // Arrange
        let mut pair = periodic(100);
        let t0 = Instant::now();
        pair.poll_due(t0);

        // Act / Assert
        assert!(!pair.poll_due(t0 + Duration::from_millis(99)));
        assert!(pair.poll_due(t0 + Duration::from_millis(100)));
        assert_eq!(pair.last_fire(), Some(t0 + Duration::from_millis(100)));
        assert!(!pair.poll_due(t0 + Duration::from_millis(199)));
        assert!(pair.poll_due(t0 + Duration::from_millis(200)));
        assert_eq!(pair.last_fire(), Some(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn test_late_tick_keeps_grid_but_holds_next_firing_one_period() {
        // Arrange
        let mut pair = periodic(2000);
        let t0 = Instant::now();
        pair.poll_due(t0);

        // Act: the first firing tick runs 60ms late
        let late = pair.poll_due(t0 + Duration::from_millis(2060));
        let early_next = pair.poll_due(t0 + Duration::from_millis(4000));
        let held_next = pair.poll_due(t0 + Duration::from_millis(4059));
        let next = pair.poll_due(t0 + Duration::from_millis(4060));

        // Assert: last_fire is the due point, not the late tick time
        assert!(late);
        assert!(!early_next);
        assert!(!held_next);
        assert!(next);
        assert_eq!(pair.last_fire(), Some(t0 + Duration::from_millis(4000)));
    }

    #[test]
    fn test_poll_coalesces_missed_periods_into_one_firing() {
        // Arrange
        let mut pair = periodic(100);
        let t0 = Instant::now();
        pair.poll_due(t0);

        // Act: the scheduler stalls for 5.5 periods
        let fired = pair.poll_due(t0 + Duration::from_millis(550));

        // Assert: one firing, schedule realigned to the 500ms grid point
        assert!(fired);
        assert_eq!(pair.last_fire(), Some(t0 + Duration::from_millis(500)));
        assert!(!pair.poll_due(t0 + Duration::from_millis(600)));
        assert!(pair.poll_due(t0 + Duration::from_millis(650)));
        assert_eq!(pair.last_fire(), Some(t0 + Duration::from_millis(600)));
    }

    #[test]
    fn test_sync_pair_never_fires() {
        let mut pair = Pair::new(
            0,
            PairSpec::Sync {
                request: vec![1],
                response: vec![2],
            },
        );
        let t0 = Instant::now();
        assert!(!pair.poll_due(t0));
        assert!(!pair.poll_due(t0 + Duration::from_secs(3600)));
        assert_eq!(pair.last_fire(), None);
    }

    #[test]
    fn test_validate_rejects_sizes_out_of_range() {
        let empty_req = PairSpec::Sync {
            request: vec![],
            response: vec![1],
        };
        let long_resp = PairSpec::Sync {
            request: vec![1],
            response: vec![0; MAX_RESPONSE + 1],
        };
        let zero_period = PairSpec::Periodic {
            period: Duration::ZERO,
            response: vec![1],
        };
        assert_eq!(empty_req.validate(), Err(CodecError::EmptyRequest));
        assert_eq!(long_resp.validate(), Err(CodecError::ResponseTooLong));
        assert!(zero_period.validate().is_err());
    }

    #[test]
    fn test_accessors_expose_spec_parts() {
        let spec = PairSpec::Periodic {
            period: Duration::from_secs(2),
            response: vec![0xAA],
        };
        assert!(spec.is_periodic());
        assert_eq!(spec.request(), None);
        assert_eq!(spec.response(), &[0xAA]);
        assert_eq!(spec.period(), Some(Duration::from_secs(2)));
    }
}
