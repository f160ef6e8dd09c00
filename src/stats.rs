//! Battery statistics accounting engine.
//!
//! A sequential state reducer: every incoming event (sleep transition or
//! battery property update) is handled to completion on one logical thread,
//! so no locking guards the accounting state. Each accepted energy sample
//! carries both a wall-clock and a monotonic timestamp; instantaneous rates
//! use the wall clock (consistent with displayed timestamps) while the
//! cycle average uses the monotonic clock (immune to clock adjustment).

use crate::event::{BatteryUpdate, Event, SleepEvent};
use crate::rate::CapacityBounds;
use crate::report::{format_rel_time, write_report, ReportContext, StatFlags};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::debug;

/// Samples retained for inter-sample rate math.
const WINDOW_LEN: usize = 2;

/// One timestamped energy observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Wall-clock instant, subject to external adjustment (NTP).
    pub wall: OffsetDateTime,
    /// Monotonic instant, immune to adjustment.
    pub mono: Instant,
    pub energy_wh: f64,
}

/// System power state.
///
/// `Hibernating` is reserved; no current input produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Awake,
    Suspended,
    Hibernating,
}

/// Battery charge/discharge state as reported by the power source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    Charging,
    Discharging,
    Idle,
}

/// The accounting engine. Writes one report line per processed event to `out`.
pub struct BatteryStats<W> {
    out: W,
    power_state: PowerState,
    suspend_entered_at: Option<OffsetDateTime>,
    pending_suspend_report: bool,
    bounds: Option<CapacityBounds>,
    first_sample: Option<Sample>,
    window: VecDeque<Sample>,
    suspend_energy_wh: f64,
}

impl<W: Write> BatteryStats<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            power_state: PowerState::Awake,
            suspend_entered_at: None,
            pending_suspend_report: false,
            bounds: None,
            first_sample: None,
            window: VecDeque::with_capacity(WINDOW_LEN + 1),
            suspend_energy_wh: 0.0,
        }
    }

    /// Consume the engine and return the output sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    /// True iff a suspend entry has been recorded and not yet matched by a
    /// resume.
    pub fn is_suspended(&self) -> bool {
        self.suspend_entered_at.is_some()
    }

    pub fn first_sample(&self) -> Option<&Sample> {
        self.first_sample.as_ref()
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    pub fn suspend_energy_wh(&self) -> f64 {
        self.suspend_energy_wh
    }

    pub fn capacity_bounds(&self) -> Option<CapacityBounds> {
        self.bounds
    }

    /// Dispatch one inbox event.
    pub fn handle_event(&mut self, event: &Event) -> io::Result<()> {
        match event {
            Event::Sleep(sleep) => self.handle_sleep_event(sleep),
            Event::Battery(update) => self.apply_update(update),
        }
    }

    /// Handle a sleep-hook signal. Only `operation == "suspend"` is acted on;
    /// every other operation or stage is ignored without error.
    pub fn handle_sleep_event(&mut self, event: &SleepEvent) -> io::Result<()> {
        if event.operation != "suspend" {
            debug!(operation = %event.operation, "ignoring sleep event for other operation");
            return Ok(());
        }
        match event.stage.as_str() {
            "pre" => self.enter_suspend(),
            "post" => self.exit_suspend(),
            stage => {
                debug!(stage, "ignoring sleep event with unknown stage");
                Ok(())
            }
        }
    }

    /// Apply one battery property payload, in fixed order: charge state,
    /// then the capacity-bounds pair, then the energy reading. An `Energy`
    /// value arriving alongside a state change is therefore evaluated
    /// against the already-reset cycle.
    pub fn apply_update(&mut self, update: &BatteryUpdate) -> io::Result<()> {
        if let Some(state) = update.state {
            self.set_charge_state(state)?;
        }
        // Bounds are only taken as a pair from a single payload.
        if let (Some(empty), Some(full)) = (update.energy_empty_wh, update.energy_full_wh) {
            self.set_capacity_bounds(empty, full);
        }
        if let Some(energy_wh) = update.energy_wh {
            self.update_energy(energy_wh)?;
        }
        Ok(())
    }

    pub fn enter_suspend(&mut self) -> io::Result<()> {
        let (wall, mono) = now();
        self.enter_suspend_at(wall, mono)
    }

    /// Suspend entry with explicit timestamps (for testing).
    pub fn enter_suspend_at(&mut self, wall: OffsetDateTime, mono: Instant) -> io::Result<()> {
        if self.is_suspended() {
            debug!("ignoring suspend entry while already suspended");
            return Ok(());
        }
        self.suspend_entered_at = Some(wall);
        self.power_state = PowerState::Suspended;
        self.emit("Going to sleep", StatFlags::NONE, wall, mono)
    }

    pub fn exit_suspend(&mut self) -> io::Result<()> {
        let (wall, mono) = now();
        self.exit_suspend_at(wall, mono)
    }

    /// Resume with explicit timestamps (for testing).
    pub fn exit_suspend_at(&mut self, wall: OffsetDateTime, mono: Instant) -> io::Result<()> {
        let entered_at = match self.suspend_entered_at.take() {
            Some(at) => at,
            None => {
                debug!("ignoring resume without a matching suspend entry");
                return Ok(());
            }
        };

        // Wall-clock basis; a clock stepped backwards across the sleep
        // clamps to zero instead of panicking.
        let slept: Duration = (wall - entered_at).try_into().unwrap_or(Duration::ZERO);
        self.power_state = PowerState::Awake;
        self.pending_suspend_report = true;

        let message = format!("Resumed from {} sleep", format_rel_time(slept));
        self.emit(&message, StatFlags::NONE, wall, mono)
    }

    /// Record a charge-state report.
    ///
    /// Idle is informational only and never clears accumulated statistics.
    /// Charging and Discharging reset the cycle on every report, including
    /// repeats of the current state: no previous-state comparison is made.
    pub fn set_charge_state(&mut self, state: ChargeState) -> io::Result<()> {
        let (wall, mono) = now();
        self.set_charge_state_at(state, wall, mono)
    }

    /// Charge-state report with explicit timestamps (for testing).
    pub fn set_charge_state_at(
        &mut self,
        state: ChargeState,
        wall: OffsetDateTime,
        mono: Instant,
    ) -> io::Result<()> {
        match state {
            ChargeState::Idle => self.emit("Battery idle", StatFlags::NONE, wall, mono),
            ChargeState::Charging | ChargeState::Discharging => {
                self.first_sample = None;
                self.window.clear();
                self.suspend_energy_wh = 0.0;

                let message = if state == ChargeState::Charging {
                    "Battery charging"
                } else {
                    "Battery discharging"
                };
                self.emit(message, StatFlags::NONE, wall, mono)
            }
        }
    }

    /// Set the capacity bounds used for percentage figures.
    pub fn set_capacity_bounds(&mut self, empty_wh: f64, full_wh: f64) {
        self.bounds = Some(CapacityBounds { empty_wh, full_wh });
    }

    pub fn update_energy(&mut self, energy_wh: f64) -> io::Result<()> {
        let (wall, mono) = now();
        self.update_energy_at(energy_wh, wall, mono)
    }

    /// Energy reading with explicit timestamps (for testing).
    pub fn update_energy_at(
        &mut self,
        energy_wh: f64,
        wall: OffsetDateTime,
        mono: Instant,
    ) -> io::Result<()> {
        if self.is_suspended() {
            // A reading arriving between the suspend and resume events
            // cannot be attributed to before or after the actual hardware
            // transition, and mis-attributing it corrupts the rate math
            // more the longer the sleep lasts.
            debug!(energy_wh, "dropping energy update received while suspended");
            return Ok(());
        }

        let sample = Sample {
            wall,
            mono,
            energy_wh,
        };

        if self.first_sample.is_none() {
            self.first_sample = Some(sample);
        }

        self.window.push_back(sample);
        if self.window.len() > WINDOW_LEN {
            self.window.pop_front();
        }

        if self.pending_suspend_report {
            if self.window.len() > 1 {
                if let Some(previous) = self.window.iter().rev().nth(1) {
                    // Delta between the last retained pre-suspend sample and
                    // this first post-resume one approximates the energy
                    // consumed during the sleep.
                    self.suspend_energy_wh += energy_wh - previous.energy_wh;
                }
            }
            self.pending_suspend_report = false;
            self.emit("Sleep energy use", StatFlags::SUSPEND, wall, mono)
        } else {
            self.emit("", StatFlags::SAMPLE, wall, mono)
        }
    }

    fn emit(
        &mut self,
        message: &str,
        flags: StatFlags,
        now_wall: OffsetDateTime,
        now_mono: Instant,
    ) -> io::Result<()> {
        let previous = if self.window.len() > 1 {
            self.window.iter().rev().nth(1)
        } else {
            None
        };
        let ctx = ReportContext {
            now_wall,
            now_mono,
            message,
            flags,
            first: self.first_sample.as_ref(),
            current: self.window.back(),
            previous,
            bounds: self.bounds,
            suspend_energy_wh: self.suspend_energy_wh,
        };
        write_report(&mut self.out, &ctx)
    }
}

fn now() -> (OffsetDateTime, Instant) {
    let wall = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    (wall, Instant::now())
}
