//! How long to wait before a failed exchange is tried again.
//!
//! The delay is either computed from a base delay (optionally growing
//! exponentially and randomized to avoid collisions) or read off a
//! [`DelayPattern`], which replaces the computation entirely.

use std::{fmt, str::FromStr, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a [`RedeliveryPolicy`] or [`DelayPattern`] was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Invalid delay pattern group '{0}': expected '<count>:<delay ms>'")]
    MalformedGroup(String),

    #[error("Delay pattern is empty")]
    EmptyPattern,

    #[error("Delay pattern counts must be increasing, but {next} follows {previous}")]
    UnorderedPattern { previous: u32, next: u32 },

    #[error("{name} must be a finite, non-negative number, got {value}")]
    InvalidFactor { name: &'static str, value: String },
}

/// Delays keyed by redelivery count, written `count:delay;count:delay`.
///
/// `5:1000;10:5000;20:20000` waits nothing for attempts 0 to 4, one second
/// for 5 to 9, five seconds for 10 to 19 and twenty seconds from then on. Use
/// a leading `0:` group to delay from the first attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DelayPattern {
    groups: Vec<(u32, u64)>,
}

impl DelayPattern {
    /// Delay in milliseconds for the given redelivery count
    #[must_use]
    pub fn delay_for(&self, redelivery_counter: u32) -> u64 {
        self.groups
            .iter()
            .take_while(|(count, _)| *count <= redelivery_counter)
            .last()
            .map_or(0, |(_, delay)| *delay)
    }

    #[must_use]
    pub fn groups(&self) -> &[(u32, u64)] {
        &self.groups
    }
}

impl FromStr for DelayPattern {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups = s
            .split(';')
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .map(|group| {
                group
                    .split_once(':')
                    .and_then(|(count, delay)| {
                        Some((count.trim().parse().ok()?, delay.trim().parse().ok()?))
                    })
                    .ok_or_else(|| PolicyError::MalformedGroup(group.to_string()))
            })
            .collect::<Result<Vec<(u32, u64)>, _>>()?;

        if groups.is_empty() {
            return Err(PolicyError::EmptyPattern);
        }

        if let Some(pair) = groups.windows(2).find(|pair| pair[1].0 <= pair[0].0) {
            return Err(PolicyError::UnorderedPattern {
                previous: pair[0].0,
                next: pair[1].0,
            });
        }

        Ok(Self { groups })
    }
}

impl TryFrom<String> for DelayPattern {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DelayPattern> for String {
    fn from(pattern: DelayPattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for DelayPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (count, delay)) in self.groups.iter().enumerate() {
            if index > 0 {
                f.write_str(";")?;
            }
            write!(f, "{count}:{delay}")?;
        }
        Ok(())
    }
}

/// Redelivery configuration.
///
/// All delays are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedeliveryPolicy {
    /// Delay before the first redelivery.
    ///
    /// Default: 1000
    #[serde(default = "defaults::redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,

    /// How many times to redeliver. `0` disables redelivery, a negative
    /// value redelivers forever.
    ///
    /// Default: 0
    #[serde(default)]
    pub maximum_redeliveries: i32,

    /// Upper bound for any computed delay, `0` for none.
    ///
    /// Default: 60000
    #[serde(default = "defaults::maximum_redelivery_delay_ms")]
    pub maximum_redelivery_delay_ms: u64,

    #[serde(default)]
    pub use_exponential_backoff: bool,

    /// Growth factor per redelivery when exponential backoff is on. Values
    /// of `1.0` or less keep the delay constant.
    ///
    /// Default: 2.0
    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default)]
    pub use_collision_avoidance: bool,

    /// Maximum relative deviation applied when collision avoidance is on.
    ///
    /// Default: 0.15 (±15%)
    #[serde(default = "defaults::collision_avoidance_factor")]
    pub collision_avoidance_factor: f64,

    /// Overrides every other delay setting when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_pattern: Option<DelayPattern>,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            redelivery_delay_ms: defaults::redelivery_delay_ms(),
            maximum_redeliveries: 0,
            maximum_redelivery_delay_ms: defaults::maximum_redelivery_delay_ms(),
            use_exponential_backoff: false,
            backoff_multiplier: defaults::backoff_multiplier(),
            use_collision_avoidance: false,
            collision_avoidance_factor: defaults::collision_avoidance_factor(),
            delay_pattern: None,
        }
    }
}

impl RedeliveryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_redelivery_delay(mut self, delay_ms: u64) -> Self {
        self.redelivery_delay_ms = delay_ms;
        self
    }

    #[must_use]
    pub const fn with_maximum_redeliveries(mut self, maximum: i32) -> Self {
        self.maximum_redeliveries = maximum;
        self
    }

    #[must_use]
    pub const fn with_maximum_redelivery_delay(mut self, delay_ms: u64) -> Self {
        self.maximum_redelivery_delay_ms = delay_ms;
        self
    }

    /// Turn on exponential backoff with the given multiplier
    #[must_use]
    pub const fn with_exponential_backoff(mut self, multiplier: f64) -> Self {
        self.use_exponential_backoff = true;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Turn on collision avoidance with the given factor
    #[must_use]
    pub const fn with_collision_avoidance(mut self, factor: f64) -> Self {
        self.use_collision_avoidance = true;
        self.collision_avoidance_factor = factor;
        self
    }

    #[must_use]
    pub fn with_delay_pattern(mut self, pattern: DelayPattern) -> Self {
        self.delay_pattern = Some(pattern);
        self
    }

    /// Whether redelivery number `redelivery_counter` (1 for the first
    /// redelivery) is still allowed
    #[must_use]
    pub fn should_redeliver(&self, redelivery_counter: u32) -> bool {
        u32::try_from(self.maximum_redeliveries)
            .map_or(true, |maximum| redelivery_counter <= maximum)
    }

    /// The delay to use after `previous_delay_ms`.
    ///
    /// A delay pattern answers directly from `redelivery_counter`. Otherwise
    /// a previous delay of `0` starts at the base delay, exponential backoff
    /// multiplies the previous delay, and collision avoidance then shifts the
    /// result by up to the configured factor in either direction. The result
    /// never exceeds the maximum delay.
    #[must_use]
    pub fn calculate_redelivery_delay(&self, previous_delay_ms: u64, redelivery_counter: u32) -> u64 {
        if let Some(pattern) = &self.delay_pattern {
            return pattern.delay_for(redelivery_counter);
        }

        self.cap(self.avoid_collision(self.backoff(previous_delay_ms)))
    }

    /// The delay for the given redelivery count, as if every earlier
    /// redelivery had been computed with
    /// [`RedeliveryPolicy::calculate_redelivery_delay`].
    ///
    /// With default settings this is always `redelivery_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, redelivery_counter: u32) -> u64 {
        if let Some(pattern) = &self.delay_pattern {
            return pattern.delay_for(redelivery_counter);
        }

        let mut delay = 0;
        for _ in 0..redelivery_counter.max(1) {
            let next = self.cap(self.backoff(delay));
            if next == delay {
                break;
            }
            delay = next;
        }

        self.cap(self.avoid_collision(delay))
    }

    /// [`RedeliveryPolicy::delay_for`] as a `Duration`
    #[must_use]
    pub fn delay_duration(&self, redelivery_counter: u32) -> Duration {
        Duration::from_millis(self.delay_for(redelivery_counter))
    }

    /// Reject settings that cannot produce a sensible delay.
    ///
    /// # Errors
    /// [`PolicyError::InvalidFactor`] for a negative or non-finite multiplier
    /// or collision avoidance factor
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (name, value) in [
            ("backoff_multiplier", self.backoff_multiplier),
            ("collision_avoidance_factor", self.collision_avoidance_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::InvalidFactor {
                    name,
                    value: value.to_string(),
                });
            }
        }

        Ok(())
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn backoff(&self, previous_delay_ms: u64) -> u64 {
        if previous_delay_ms == 0 {
            self.redelivery_delay_ms
        } else if self.use_exponential_backoff && self.backoff_multiplier > 1.0 {
            (self.backoff_multiplier * previous_delay_ms as f64).round() as u64
        } else {
            previous_delay_ms
        }
    }

    // Intentional precision loss and casting for randomization
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn avoid_collision(&self, delay_ms: u64) -> u64 {
        if !self.use_collision_avoidance || delay_ms == 0 {
            return delay_ms;
        }

        let mut rng = rand::rng();
        let direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        let variance = direction * self.collision_avoidance_factor * rng.random::<f64>();
        let delay = delay_ms as f64;
        (delay + delay * variance).max(0.0).round() as u64
    }

    const fn cap(&self, delay_ms: u64) -> u64 {
        if self.maximum_redelivery_delay_ms > 0 && delay_ms > self.maximum_redelivery_delay_ms {
            self.maximum_redelivery_delay_ms
        } else {
            delay_ms
        }
    }
}

mod defaults {
    pub const fn redelivery_delay_ms() -> u64 {
        1000
    }

    pub const fn maximum_redelivery_delay_ms() -> u64 {
        60_000
    }

    pub const fn backoff_multiplier() -> f64 {
        2.0
    }

    pub const fn collision_avoidance_factor() -> f64 {
        0.15
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RedeliveryPolicy::default();
        assert_eq!(policy.redelivery_delay_ms, 1000);
        assert_eq!(policy.maximum_redeliveries, 0);
        assert_eq!(policy.maximum_redelivery_delay_ms, 60_000);
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!((policy.collision_avoidance_factor - 0.15).abs() < f64::EPSILON);
        assert!(policy.validate().is_ok());

        assert_eq!(policy.delay_for(0), 1000);
        assert_eq!(policy.delay_for(7), 1000);
    }

    #[test]
    fn test_should_redeliver() {
        let never = RedeliveryPolicy::default();
        assert!(!never.should_redeliver(1));

        let three = RedeliveryPolicy::default().with_maximum_redeliveries(3);
        assert!(three.should_redeliver(1));
        assert!(three.should_redeliver(3));
        assert!(!three.should_redeliver(4));

        let forever = RedeliveryPolicy::default().with_maximum_redeliveries(-1);
        assert!(forever.should_redeliver(u32::MAX));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RedeliveryPolicy::default()
            .with_redelivery_delay(100)
            .with_exponential_backoff(2.0)
            .with_maximum_redelivery_delay(1000);

        assert_eq!(policy.calculate_redelivery_delay(0, 1), 100);
        assert_eq!(policy.calculate_redelivery_delay(100, 2), 200);
        assert_eq!(policy.calculate_redelivery_delay(800, 5), 1000);

        let delays: Vec<u64> = (1..=6).map(|counter| policy.delay_for(counter)).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);

        // Settles at the cap without walking every count
        assert_eq!(policy.delay_for(u32::MAX), 1000);
    }

    #[test]
    fn test_multiplier_of_one_keeps_delay() {
        let policy = RedeliveryPolicy::default()
            .with_redelivery_delay(250)
            .with_exponential_backoff(1.0);

        assert_eq!(policy.calculate_redelivery_delay(250, 3), 250);
        assert_eq!(policy.delay_for(3), 250);
    }

    #[test]
    fn test_collision_avoidance_stays_within_factor() {
        let policy = RedeliveryPolicy::default()
            .with_redelivery_delay(1000)
            .with_collision_avoidance(0.15);

        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!((850..=1150).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_delay_pattern() {
        let pattern: DelayPattern = "5:1000;10:5000;20:20000".parse().unwrap();
        let policy = RedeliveryPolicy::default()
            .with_exponential_backoff(3.0)
            .with_delay_pattern(pattern);

        assert_eq!(policy.delay_for(0), 0);
        assert_eq!(policy.delay_for(4), 0);
        assert_eq!(policy.delay_for(5), 1000);
        assert_eq!(policy.delay_for(19), 5000);
        assert_eq!(policy.calculate_redelivery_delay(123, 25), 20000);
    }

    #[test]
    fn test_delay_pattern_parsing() {
        let pattern: DelayPattern = " 0:100 ; 3:300 ;".parse().unwrap();
        assert_eq!(pattern.groups(), &[(0, 100), (3, 300)]);
        assert_eq!(pattern.to_string(), "0:100;3:300");

        assert_eq!(
            "5:abc".parse::<DelayPattern>(),
            Err(PolicyError::MalformedGroup("5:abc".to_string()))
        );
        assert_eq!("".parse::<DelayPattern>(), Err(PolicyError::EmptyPattern));
        assert_eq!(
            "5:1;5:2".parse::<DelayPattern>(),
            Err(PolicyError::UnorderedPattern {
                previous: 5,
                next: 5
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_factors() {
        let policy = RedeliveryPolicy::default().with_collision_avoidance(-0.5);
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::InvalidFactor {
                name: "collision_avoidance_factor",
                ..
            })
        ));

        let policy = RedeliveryPolicy::default().with_exponential_backoff(f64::NAN);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let policy: RedeliveryPolicy = ron::from_str(
            r#"(
                redelivery_delay_ms: 250,
                use_exponential_backoff: true,
                delay_pattern: Some("0:10;2:20"),
            )"#,
        )
        .unwrap();

        assert_eq!(policy.redelivery_delay_ms, 250);
        assert!(policy.use_exponential_backoff);
        assert_eq!(policy.maximum_redelivery_delay_ms, 60_000);
        assert_eq!(policy.delay_for(2), 20);

        let malformed = ron::from_str::<RedeliveryPolicy>(r#"(delay_pattern: Some("oops"))"#);
        assert!(malformed.is_err());
    }
}
