//! Daily time triggers and the `JBoltRescheduling` parser.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::config::ConfigError;
use crate::logging::{JBoltEvent, JBoltLogger};

/// Longest accepted `JBoltRescheduling` value, in bytes
pub const MAX_RESCHEDULING_LEN: usize = 1024;

/// Most triggers retained from one `JBoltRescheduling` value
pub const MAX_TRIGGERS: usize = 10;

/// A daily wall-clock time, minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeTrigger {
    hour: u8,
    minute: u8,
}

impl TimeTrigger {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour <= 23 && minute <= 59).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or(NaiveTime::MIN)
    }

    /// Trigger matching the hour and minute of `at`
    pub fn of(at: NaiveDateTime) -> Self {
        Self {
            hour: at.hour() as u8,
            minute: at.minute() as u8,
        }
    }
}

impl FromStr for TimeTrigger {
    type Err = ConfigError;

    /// Accepts exactly `HH:MM`, two ASCII digits each
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTime(token.to_string());

        let bytes = token.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        let hour = (digits[0] - b'0') * 10 + (digits[1] - b'0');
        let minute = (digits[2] - b'0') * 10 + (digits[3] - b'0');
        TimeTrigger::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for TimeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Ascending, duplicate-free set of at most `MAX_TRIGGERS` triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSet {
    triggers: Vec<TimeTrigger>,
}

impl TriggerSet {
    /// Parse a `JBoltRescheduling` value
    ///
    /// Tokens are validated left to right and the first malformed one is
    /// reported verbatim. A single trailing comma is tolerated. Duplicates
    /// are dropped, the rest sorted, and only the earliest `MAX_TRIGGERS`
    /// kept. Each retained trigger is logged once, in ascending order.
    pub fn parse(text: &str, logger: &JBoltLogger) -> Result<Self, ConfigError> {
        Self::check_length(text)?;

        let mut tokens: Vec<&str> = text.split(',').collect();
        if tokens.len() > 1 && tokens.last() == Some(&"") {
            tokens.pop();
        }

        let mut triggers: Vec<TimeTrigger> = Vec::with_capacity(tokens.len());
        for token in tokens {
            let trigger: TimeTrigger = token.parse()?;
            if triggers.contains(&trigger) {
                logger.log(JBoltEvent::DuplicatedTime { time: trigger });
            } else {
                triggers.push(trigger);
            }
        }

        triggers.sort();
        if triggers.len() > MAX_TRIGGERS {
            logger.log(JBoltEvent::TooManyTriggers);
            triggers.truncate(MAX_TRIGGERS);
        }

        for trigger in &triggers {
            logger.log(JBoltEvent::TriggerSet { time: *trigger });
        }

        Ok(Self { triggers })
    }

    /// Reject empty and over-long values without parsing them
    pub fn check_length(text: &str) -> Result<(), ConfigError> {
        if text.is_empty() {
            return Err(ConfigError::ReschedulingEmpty);
        }
        if text.len() > MAX_RESCHEDULING_LEN {
            return Err(ConfigError::ReschedulingTooLong);
        }
        Ok(())
    }

    /// Build from already validated triggers
    pub fn from_triggers(mut triggers: Vec<TimeTrigger>) -> Self {
        triggers.sort();
        triggers.dedup();
        triggers.truncate(MAX_TRIGGERS);
        Self { triggers }
    }

    pub fn triggers(&self) -> &[TimeTrigger] {
        &self.triggers
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// First trigger instant strictly after `now`
    ///
    /// Wraps to the earliest trigger of the following day. Returns `None`
    /// only for an empty set.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = now.date();
        let later_today = self
            .triggers
            .iter()
            .map(|trigger| today.and_time(trigger.as_naive_time()))
            .find(|candidate| *candidate > now);

        later_today.or_else(|| {
            let first = self.triggers.first()?;
            Some((today + Duration::days(1)).and_time(first.as_naive_time()))
        })
    }
}
