//! Rate computation for battery statistics.
//!
//! Pure math turning energy deltas over time into Watts and percentage
//! figures, plus the formatting policy that picks %/hr or %/day.

/// Battery capacity bounds in watt-hours.
///
/// Both bounds come from the same property payload; until both have been
/// observed no percentage figures are produced at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityBounds {
    pub empty_wh: f64,
    pub full_wh: f64,
}

impl CapacityBounds {
    /// Usable capacity span in Wh.
    pub fn span_wh(&self) -> f64 {
        self.full_wh - self.empty_wh
    }

    /// Absolute charge level as a percentage of the usable span.
    pub fn percent_of(&self, energy_wh: f64) -> f64 {
        100.0 * (energy_wh - self.empty_wh) / self.span_wh()
    }

    /// Energy delta as a percentage of the usable span.
    pub fn percent_delta(&self, delta_wh: f64) -> f64 {
        100.0 * delta_wh / self.span_wh()
    }
}

/// Power in Watts for an energy delta over a number of hours.
pub fn watts(delta_wh: f64, hours: f64) -> f64 {
    delta_wh / hours
}

/// Percentage points of capacity consumed or gained per hour.
pub fn percent_per_hour(delta_wh: f64, hours: f64, bounds: CapacityBounds) -> f64 {
    bounds.percent_delta(delta_wh) / hours
}

/// Format a rate as `X.XX W`, with a percentage rate appended when capacity
/// bounds are known.
///
/// Rates of at least 1%/hr in magnitude are shown per hour; slower trickle
/// rates are shown per day, which keeps them readable.
pub fn format_rate(delta_wh: f64, hours: f64, bounds: Option<CapacityBounds>) -> String {
    let mut out = format!("{:.2} W", watts(delta_wh, hours));

    if let Some(bounds) = bounds {
        let per_hour = percent_per_hour(delta_wh, hours, bounds);
        if per_hour.abs() >= 1.0 {
            out.push_str(&format!(" ({:.1}%/hr)", per_hour));
        } else {
            out.push_str(&format!(" ({:.1}%/day)", per_hour * 24.0));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDS: CapacityBounds = CapacityBounds {
        empty_wh: 0.0,
        full_wh: 100.0,
    };

    #[test]
    fn test_watts_basic() {
        assert_eq!(watts(-2.0, 1.0), -2.0);
        assert_eq!(watts(5.0, 0.5), 10.0);
    }

    #[test]
    fn test_percent_of_span() {
        let bounds = CapacityBounds {
            empty_wh: 10.0,
            full_wh: 60.0,
        };
        assert_eq!(bounds.span_wh(), 50.0);
        assert_eq!(bounds.percent_of(35.0), 50.0);
        assert_eq!(bounds.percent_delta(-5.0), -10.0);
    }

    #[test]
    fn test_rate_without_bounds_has_no_percent() {
        let s = format_rate(-2.0, 1.0, None);
        assert_eq!(s, "-2.00 W");
    }

    #[test]
    fn test_rate_at_threshold_shows_per_hour() {
        // Exactly 1.0 %/hr stays on the per-hour scale.
        let s = format_rate(-1.0, 1.0, Some(BOUNDS));
        assert_eq!(s, "-1.00 W (-1.0%/hr)");
    }

    #[test]
    fn test_rate_below_threshold_shows_per_day() {
        // 0.999999 %/hr drops to the per-day scale, scaled by 24.
        let s = format_rate(-0.999999, 1.0, Some(BOUNDS));
        assert_eq!(s, "-1.00 W (-24.0%/day)");
    }

    #[test]
    fn test_discharge_scenario_rate() {
        // 80 Wh -> 78 Wh over one hour with [0, 100] bounds.
        let s = format_rate(-2.0, 1.0, Some(BOUNDS));
        assert_eq!(s, "-2.00 W (-2.0%/hr)");
    }

    proptest! {
        // Watts depend only on the energy delta and elapsed hours, never on
        // the capacity bounds.
        #[test]
        fn prop_watts_ignore_bounds(
            delta in -50.0f64..50.0,
            hours in 0.01f64..1000.0,
            empty in 0.0f64..10.0,
            span in 1.0f64..100.0,
        ) {
            let bounds = CapacityBounds { empty_wh: empty, full_wh: empty + span };
            let with = format_rate(delta, hours, Some(bounds));
            let without = format_rate(delta, hours, None);
            prop_assert!(with.starts_with(&without));
        }

        // The display threshold picks exactly one of the two scales.
        #[test]
        fn prop_threshold_scale_selection(
            delta in -50.0f64..50.0,
            hours in 0.01f64..1000.0,
        ) {
            let s = format_rate(delta, hours, Some(BOUNDS));
            let per_hour = percent_per_hour(delta, hours, BOUNDS);
            if per_hour.abs() >= 1.0 {
                prop_assert!(s.ends_with("%/hr)"));
            } else {
                prop_assert!(s.ends_with("%/day)"));
            }
        }
    }
}
