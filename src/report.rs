//! Report line assembly.
//!
//! One newline-terminated, human-readable line per processed event: local
//! timestamp, optional elapsed-run-time suffix, optional message, then the
//! numeric sections selected by [`StatFlags`]. Every numeric section is
//! independently gated on the data it needs being available.

use crate::rate::{format_rate, CapacityBounds};
use crate::stats::Sample;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Selects which statistics sections a report line carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFlags {
    /// Absolute energy level of the most recent sample.
    pub energy: bool,
    /// Energy delta between the two windowed samples.
    pub rel_energy: bool,
    /// Instantaneous rate over the two windowed samples.
    pub rate: bool,
    /// Average rate since the first sample of the cycle.
    pub average_rate: bool,
}

impl StatFlags {
    /// No numeric sections, message only.
    pub const NONE: Self = Self {
        energy: false,
        rel_energy: false,
        rate: false,
        average_rate: false,
    };

    /// Sections for a regular awake-time sample.
    pub const SAMPLE: Self = Self {
        energy: true,
        rel_energy: false,
        rate: true,
        average_rate: true,
    };

    /// Sections for the first sample after a resume.
    pub const SUSPEND: Self = Self {
        energy: false,
        rel_energy: true,
        rate: true,
        average_rate: false,
    };
}

/// Everything a single report line is assembled from.
pub struct ReportContext<'a> {
    pub now_wall: OffsetDateTime,
    pub now_mono: Instant,
    pub message: &'a str,
    pub flags: StatFlags,
    pub first: Option<&'a Sample>,
    pub current: Option<&'a Sample>,
    pub previous: Option<&'a Sample>,
    pub bounds: Option<CapacityBounds>,
    pub suspend_energy_wh: f64,
}

/// Format a duration as a compact `HhMmSs` string.
///
/// Zero-valued components are omitted; a duration that rounds to zero
/// seconds yields an empty string.
pub fn format_rel_time(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return String::new();
    }

    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if mins > 0 {
        out.push_str(&format!("{}m", mins));
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}

fn wall_hours_between(later: &Sample, earlier: &Sample) -> f64 {
    (later.wall - earlier.wall).as_seconds_f64() / 3600.0
}

fn mono_hours_between(later: &Sample, earlier: &Sample) -> f64 {
    later
        .mono
        .saturating_duration_since(earlier.mono)
        .as_secs_f64()
        / 3600.0
}

/// Write one report line to `out`.
pub fn write_report<W: Write>(out: &mut W, ctx: &ReportContext<'_>) -> io::Result<()> {
    let timestamp = ctx
        .now_wall
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| ctx.now_wall.to_string());
    write!(out, "{}", timestamp)?;

    if let Some(first) = ctx.first {
        let run_time = format_rel_time(ctx.now_mono.saturating_duration_since(first.mono));
        if !run_time.is_empty() {
            write!(out, " (+{})", run_time)?;
        }
    }

    if !ctx.message.is_empty() {
        write!(out, " - {}", ctx.message)?;
    }

    let current = match ctx.current {
        Some(current) => current,
        None => {
            writeln!(out)?;
            return Ok(());
        }
    };

    if ctx.flags.energy {
        write!(out, " - {:.2} Wh", current.energy_wh)?;
        if let Some(bounds) = ctx.bounds {
            write!(out, " ({:.2}%)", bounds.percent_of(current.energy_wh))?;
        }
    }

    if ctx.flags.rel_energy {
        if let Some(previous) = ctx.previous {
            let delta = current.energy_wh - previous.energy_wh;
            write!(out, " - {:+.2} Wh", delta)?;
            if let Some(bounds) = ctx.bounds {
                write!(out, " ({:.2}%)", bounds.percent_delta(delta))?;
            }
        }
    }

    if ctx.flags.rate {
        if let Some(previous) = ctx.previous {
            // Wall-clock basis, matching the displayed timestamps.
            let rate = format_rate(
                current.energy_wh - previous.energy_wh,
                wall_hours_between(current, previous),
                ctx.bounds,
            );
            write!(out, " / Rate {}", rate)?;
        }
    }

    if ctx.flags.average_rate {
        if let (Some(first), Some(_)) = (ctx.first, ctx.previous) {
            // Monotonic basis so a clock step mid-cycle cannot distort the
            // cumulative figure; suspend-interval energy is excluded.
            let awake_wh = current.energy_wh - first.energy_wh - ctx.suspend_energy_wh;
            let rate = format_rate(awake_wh, mono_hours_between(current, first), ctx.bounds);
            write!(out, " / Avg {}", rate)?;
        }
    }

    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample(wall: OffsetDateTime, mono: Instant, energy_wh: f64) -> Sample {
        Sample {
            wall,
            mono,
            energy_wh,
        }
    }

    fn render(ctx: &ReportContext<'_>) -> String {
        let mut buf = Vec::new();
        write_report(&mut buf, ctx).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_format_rel_time_components() {
        assert_eq!(format_rel_time(Duration::ZERO), "");
        assert_eq!(format_rel_time(Duration::from_millis(400)), "");
        assert_eq!(format_rel_time(Duration::from_secs(5)), "5s");
        assert_eq!(format_rel_time(Duration::from_secs(61)), "1m1s");
        assert_eq!(format_rel_time(Duration::from_secs(3600)), "1h");
        assert_eq!(format_rel_time(Duration::from_secs(3661)), "1h1m1s");
        assert_eq!(format_rel_time(Duration::from_secs(7260)), "2h1m");
    }

    #[test]
    fn test_no_samples_prints_timestamp_and_message_only() {
        let ctx = ReportContext {
            now_wall: datetime!(2024-01-15 10:30:00 UTC),
            now_mono: Instant::now(),
            message: "Battery idle",
            flags: StatFlags::SAMPLE,
            first: None,
            current: None,
            previous: None,
            bounds: None,
            suspend_energy_wh: 0.0,
        };
        assert_eq!(render(&ctx), "2024-01-15 10:30:00 - Battery idle\n");
    }

    #[test]
    fn test_energy_section_without_bounds_omits_percent() {
        let mono = Instant::now();
        let current = sample(datetime!(2024-01-15 10:30:00 UTC), mono, 42.5);
        let ctx = ReportContext {
            now_wall: current.wall,
            now_mono: mono,
            message: "",
            flags: StatFlags {
                energy: true,
                ..StatFlags::NONE
            },
            first: Some(&current),
            current: Some(&current),
            previous: None,
            bounds: None,
            suspend_energy_wh: 0.0,
        };
        assert_eq!(render(&ctx), "2024-01-15 10:30:00 - 42.50 Wh\n");
    }

    #[test]
    fn test_run_time_suffix_present_after_first_sample() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(3661);
        let first = sample(datetime!(2024-01-15 10:30:00 UTC), t0, 80.0);
        let ctx = ReportContext {
            now_wall: datetime!(2024-01-15 11:31:01 UTC),
            now_mono: now,
            message: "",
            flags: StatFlags::NONE,
            first: Some(&first),
            current: Some(&first),
            previous: None,
            bounds: None,
            suspend_energy_wh: 0.0,
        };
        assert_eq!(render(&ctx), "2024-01-15 11:31:01 (+1h1m1s)\n");
    }

    #[test]
    fn test_relative_energy_carries_explicit_sign() {
        let t0 = Instant::now();
        let prev = sample(datetime!(2024-01-15 10:00:00 UTC), t0, 78.0);
        let cur = sample(
            datetime!(2024-01-15 15:00:00 UTC),
            t0 + Duration::from_secs(5 * 3600),
            70.0,
        );
        let bounds = CapacityBounds {
            empty_wh: 0.0,
            full_wh: 100.0,
        };
        let ctx = ReportContext {
            now_wall: cur.wall,
            now_mono: cur.mono,
            message: "Sleep energy use",
            flags: StatFlags::SUSPEND,
            first: None,
            current: Some(&cur),
            previous: Some(&prev),
            bounds: Some(bounds),
            suspend_energy_wh: 0.0,
        };
        let line = render(&ctx);
        assert!(line.contains("- Sleep energy use"), "line: {}", line);
        assert!(line.contains("-8.00 Wh (-8.00%)"), "line: {}", line);
        assert!(line.contains("/ Rate -1.60 W"), "line: {}", line);
        assert!(!line.contains("/ Avg"), "line: {}", line);
    }

    #[test]
    fn test_average_rate_excludes_suspend_energy() {
        let t0 = Instant::now();
        let first = sample(datetime!(2024-01-15 10:00:00 UTC), t0, 80.0);
        let prev = sample(
            datetime!(2024-01-15 11:00:00 UTC),
            t0 + Duration::from_secs(3600),
            78.0,
        );
        let cur = sample(
            datetime!(2024-01-15 12:00:00 UTC),
            t0 + Duration::from_secs(2 * 3600),
            70.0,
        );
        let ctx = ReportContext {
            now_wall: cur.wall,
            now_mono: cur.mono,
            message: "",
            flags: StatFlags {
                average_rate: true,
                ..StatFlags::NONE
            },
            first: Some(&first),
            current: Some(&cur),
            previous: Some(&prev),
            bounds: None,
            suspend_energy_wh: -8.0,
        };
        // (70 - 80 - (-8)) Wh over 2h of monotonic time = -1 W.
        let line = render(&ctx);
        assert!(line.contains("/ Avg -1.00 W"), "line: {}", line);
    }
}
