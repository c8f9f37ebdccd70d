use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::time::Duration;

/// Daily action quota for one kind of action (posts or comments).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Target floor; below it the gate speeds up to catch up before midnight.
    pub min_daily: u32,
    pub max_daily: u32,
    /// Configured spacing between actions.
    pub min_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateGateState {
    pub daily_count: u32,
    pub reset_date: NaiveDate,
    pub last_action: Option<DateTime<Tz>>,
    seen: HashSet<String>,
}

impl RateGateState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            daily_count: 0,
            reset_date: today,
            last_action: None,
            seen: HashSet::new(),
        }
    }

    /// Zero the counter once the local date moves past `reset_date`.
    /// Returns true when a reset happened.
    pub fn reset_if_new_day(&mut self, now: &DateTime<Tz>) -> bool {
        let today = now.date_naive();
        if today == self.reset_date {
            return false;
        }
        self.daily_count = 0;
        self.reset_date = today;
        true
    }

    pub fn can_act(&self, quota: &Quota) -> bool {
        self.daily_count < quota.max_daily
    }

    pub fn record_action(&mut self, now: DateTime<Tz>) {
        self.daily_count = self.daily_count.saturating_add(1);
        self.last_action = Some(now);
    }

    pub fn acted_today(&self) -> bool {
        self.daily_count > 0
    }

    /// True when no action has happened yet or at least `spacing` has passed since the last.
    pub fn is_spaced(&self, now: &DateTime<Tz>, spacing: Duration) -> bool {
        match self.last_action {
            None => true,
            Some(last) => {
                let elapsed = (*now - last).to_std().unwrap_or(Duration::ZERO);
                elapsed >= spacing
            }
        }
    }

    /// Wait before the next action.
    ///
    /// Below `min_daily` with time left today, the adaptive interval is
    /// `seconds_remaining_today / actions_still_needed`, and the result is the *smaller* of
    /// that and `quota.min_interval`. It can only shorten the wait, never lengthen it.
    pub fn next_action_delay(&self, quota: &Quota, seconds_remaining_today: u64) -> Duration {
        if self.daily_count >= quota.min_daily || seconds_remaining_today == 0 {
            return quota.min_interval;
        }
        let still_needed = u64::from(quota.min_daily - self.daily_count);
        let adaptive = Duration::from_secs(seconds_remaining_today / still_needed);
        quota.min_interval.min(adaptive)
    }

    /// Whether the configured delay has elapsed since the last action.
    pub fn delay_elapsed(
        &self,
        quota: &Quota,
        now: &DateTime<Tz>,
        seconds_remaining_today: u64,
    ) -> bool {
        self.is_spaced(now, self.next_action_delay(quota, seconds_remaining_today))
    }

    pub fn has_seen(&self, item_id: &str) -> bool {
        self.seen.contains(item_id)
    }

    /// Returns true if the id was not seen before.
    pub fn mark_seen(&mut self, item_id: &str) -> bool {
        self.seen.insert(item_id.to_string())
    }

    pub fn summary(&self, quota: &Quota) -> String {
        format!(
            "{}/{} today (floor {}), {} seen",
            self.daily_count,
            quota.max_daily,
            quota.min_daily,
            self.seen.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Tz> {
        New_York
            .with_ymd_and_hms(2026, 5, d, h, m, 0)
            .single()
            .expect("valid")
    }

    fn quota() -> Quota {
        Quota {
            min_daily: 20,
            max_daily: 30,
            min_interval: Duration::from_secs(600),
        }
    }

    #[test]
    fn resets_only_on_new_date() {
        let mut state = RateGateState::new(at(4, 9, 0).date_naive());
        state.daily_count = 5;

        assert!(!state.reset_if_new_day(&at(4, 23, 59)));
        assert_eq!(state.daily_count, 5);

        assert!(state.reset_if_new_day(&at(5, 0, 1)));
        assert_eq!(state.daily_count, 0);
        assert_eq!(state.reset_date, at(5, 0, 1).date_naive());
    }

    #[test]
    fn max_daily_blocks() {
        let mut state = RateGateState::new(at(4, 9, 0).date_naive());
        let quota = Quota {
            max_daily: 2,
            ..quota()
        };
        state.record_action(at(4, 9, 0));
        assert!(state.can_act(&quota));
        state.record_action(at(4, 10, 0));
        assert!(!state.can_act(&quota));
        assert_eq!(state.last_action, Some(at(4, 10, 0)));
    }

    #[test]
    fn mark_seen_is_idempotent() {
        let mut once = RateGateState::new(at(4, 9, 0).date_naive());
        assert!(once.mark_seen("x"));

        let mut twice = once.clone();
        assert!(!twice.mark_seen("x"));
        assert_eq!(once, twice);
        assert!(twice.has_seen("x"));
        assert!(!twice.has_seen("y"));
    }

    #[test]
    fn adaptive_interval_never_exceeds_configured() {
        let mut state = RateGateState::new(at(4, 9, 0).date_naive());
        state.daily_count = 10;
        assert_eq!(
            state.next_action_delay(&quota(), 36_000),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn adaptive_interval_speeds_up_late_in_day() {
        let mut state = RateGateState::new(at(4, 9, 0).date_naive());
        state.daily_count = 10;
        // 3000s left, 10 still needed -> 300s
        assert_eq!(
            state.next_action_delay(&quota(), 3_000),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn floor_met_uses_configured_interval() {
        let mut state = RateGateState::new(at(4, 9, 0).date_naive());
        state.daily_count = 20;
        assert_eq!(state.next_action_delay(&quota(), 60), Duration::from_secs(600));
    }

    #[test]
    fn spacing_since_last_action() {
        let mut state = RateGateState::new(at(4, 9, 0).date_naive());
        assert!(state.is_spaced(&at(4, 9, 0), Duration::from_secs(3600)));
        state.record_action(at(4, 9, 0));
        assert!(!state.is_spaced(&at(4, 9, 59), Duration::from_secs(3600)));
        assert!(state.is_spaced(&at(4, 10, 0), Duration::from_secs(3600)));
    }
}
