//! Environment-gated solve tracing.
//!
//! The solver narrates to stderr at two depths: one summary line per outer
//! iteration, and additionally the damping events (sweep restarts,
//! line-search fallbacks) that explain why an iteration made no progress.
//! The depth comes from the `ILQR_TRACE` environment variable, so a
//! misbehaving solve can be inspected without touching the caller's
//! settings.

use std::env;

/// How much of the solve to narrate on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    /// Silent (the `verbose` setting can still enable iteration lines)
    Off,
    /// One summary line per outer iteration
    Iterations,
    /// Iteration lines plus damping escalation events
    Events,
}

impl TraceLevel {
    /// Read `ILQR_TRACE` once per solve. Unset, `0`, or `off` is silent;
    /// `1` or `iter` prints iteration lines; `2` or `events` also prints
    /// damping escalation events.
    pub fn from_env() -> Self {
        Self::parse(env::var("ILQR_TRACE").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return TraceLevel::Off;
        };
        match value.to_lowercase().as_str() {
            "" | "0" | "off" | "false" => TraceLevel::Off,
            "2" | "events" => TraceLevel::Events,
            _ => TraceLevel::Iterations,
        }
    }

    /// True when per-iteration summary lines should print.
    #[inline]
    pub fn iterations(self) -> bool {
        self >= TraceLevel::Iterations
    }

    /// True when damping escalation events should print.
    #[inline]
    pub fn events(self) -> bool {
        self >= TraceLevel::Events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!(TraceLevel::parse(None), TraceLevel::Off);
        assert_eq!(TraceLevel::parse(Some("0")), TraceLevel::Off);
        assert_eq!(TraceLevel::parse(Some("off")), TraceLevel::Off);
        assert_eq!(TraceLevel::parse(Some("1")), TraceLevel::Iterations);
        assert_eq!(TraceLevel::parse(Some("iter")), TraceLevel::Iterations);
        assert_eq!(TraceLevel::parse(Some("2")), TraceLevel::Events);
        assert_eq!(TraceLevel::parse(Some("EVENTS")), TraceLevel::Events);
    }

    #[test]
    fn test_level_thresholds() {
        assert!(!TraceLevel::Off.iterations());
        assert!(TraceLevel::Iterations.iterations());
        assert!(!TraceLevel::Iterations.events());
        assert!(TraceLevel::Events.iterations());
        assert!(TraceLevel::Events.events());
    }
}
