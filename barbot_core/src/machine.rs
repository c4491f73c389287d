//! The supervisory state machine.
//!
//! Owns the operation status and everything that moves: the platform axis,
//! the pump bank and the satellite boards. `update()` is driven from the
//! outer loop at high frequency and performs exactly one state's worth of
//! non-blocking work; long operations are sequences of such ticks.
//!
//! The only piece of state written from outside the tick is the abort flag
//! (`request_abort`), which is honored at the next tick boundary and cleared
//! when the machine is back at idle.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use barbot_traits::{Axis, Bus, Clock, PumpDriver};

use crate::boards::{
    CRUSHER_ERROR_COVER_OPEN, CRUSHER_ERROR_TIMEOUT, CrusherBoard, MixerBoard, ScaleBoard,
    ScaleUpdate, StrawBoard, SUGAR_ERROR_TIMEOUT, SugarBoard,
};
use crate::config::{FeedbackWindow, MachineCfg};
use crate::error::StartError;
use crate::position::StepConverter;
use crate::session::DraftSession;
use crate::status::Status;

/// Millimetre position the fine homing phase creeps toward.
const HOMING_FINE_TARGET_MM: f32 = 100.0;

/// Which actuator a weight-fed dispense drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actuator {
    Pump,
    Crusher,
    Sugar,
}

pub type StatusObserver = Box<dyn FnMut(Status)>;

pub struct StateMachine<A: Axis, P: PumpDriver, B: Bus> {
    axis: A,
    pumps: P,
    bus: Rc<RefCell<B>>,
    scale: ScaleBoard<B>,
    mixer: MixerBoard<B>,
    straw: StrawBoard<B>,
    crusher: CrusherBoard<B>,
    sugar: SugarBoard<B>,

    cfg: MachineCfg,
    steps: StepConverter,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,

    status: Status,
    on_status_changed: Option<StatusObserver>,
    /// True until the startup homing has finished once.
    startup: bool,
    abort: bool,

    /// Micro-step parity counter kept across homing phases so the fine phase
    /// can stop exactly on a full step.
    current_microstep: i64,
    session: Option<DraftSession>,
    /// Requested quantity for the dispense currently being started.
    pending_delta_g: f32,
    pump_port: u8,
    pump_power_percent: u8,

    action_started_ms: u64,
    action_duration_ms: u64,
    child_last_check_ms: u64,
    mixing_seconds: u8,
    mixer_start_sent: bool,
    straw_start_sent: bool,
    scale_led_kind: u8,
    ping_result: u16,
}

impl<A: Axis, P: PumpDriver, B: Bus> StateMachine<A, P, B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        axis: A,
        pumps: P,
        bus: Rc<RefCell<B>>,
        scale: ScaleBoard<B>,
        mixer: MixerBoard<B>,
        straw: StrawBoard<B>,
        crusher: CrusherBoard<B>,
        sugar: SugarBoard<B>,
        cfg: MachineCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let steps = StepConverter::new(
            cfg.motion.microsteps,
            cfg.motion.fullsteps_per_mm,
            cfg.rail.max_position_mm,
        );
        let epoch = clock.now();
        let pump_power_percent = cfg.pump_power_percent;
        Self {
            axis,
            pumps,
            bus,
            scale,
            mixer,
            straw,
            crusher,
            sugar,
            cfg,
            steps,
            clock,
            epoch,
            status: Status::Idle,
            on_status_changed: None,
            startup: true,
            abort: false,
            current_microstep: 0,
            session: None,
            pending_delta_g: 0.0,
            pump_port: 0,
            pump_power_percent,
            action_started_ms: 0,
            action_duration_ms: 0,
            child_last_check_ms: 0,
            mixing_seconds: 0,
            mixer_start_sent: false,
            straw_start_sent: false,
            scale_led_kind: 0,
            ping_result: 0,
        }
    }

    /// Initialize motion limits and unconditionally start the homing run.
    pub fn begin(&mut self) {
        self.axis
            .set_max_speed(self.steps.speed_steps(self.cfg.motion.max_speed_mm_s));
        self.axis
            .set_acceleration(self.steps.speed_steps(self.cfg.motion.max_accel_mm_s2));
        if let Err(e) = self.pumps.stop_all() {
            tracing::warn!(error = %e, "could not disable pumps at startup");
        }
        self.begin_homing();
    }

    // ── tick ─────────────────────────────────────────────────────────────────

    /// One state's worth of bounded, non-blocking work.
    pub fn update(&mut self) {
        match self.status {
            Status::Idle => {
                // keep the weight reading fresh; errors are ignored at idle
                let _ = self.scale.update();
                self.abort = false;
            }

            Status::Error
            | Status::ErrorIngredientEmpty
            | Status::ErrorScaleComm
            | Status::ErrorBus
            | Status::ErrorStrawsEmpty
            | Status::ErrorGlassRemoved
            | Status::ErrorMixingFailed
            | Status::ErrorCrusherCoverOpen
            | Status::ErrorCrusherTimeout
            | Status::ErrorCommandAborted
            | Status::ErrorSugarTimeout => {
                // terminal until reset_error()
            }

            Status::HomingRough => self.tick_homing_rough(),
            Status::HomingFine => self.tick_homing_fine(),

            Status::AbortMovement => {
                if self.arrived() {
                    self.set_status(Status::ErrorCommandAborted);
                } else {
                    self.axis.run();
                }
            }

            Status::MoveToPos => {
                if self.abort {
                    self.axis.stop();
                    self.set_status(Status::AbortMovement);
                } else if self.arrived() {
                    self.set_status(Status::Idle);
                } else {
                    self.axis.run();
                }
            }

            Status::Delay => {
                if self.abort {
                    self.set_status(Status::ErrorCommandAborted);
                } else if self.now_ms() > self.action_started_ms + self.action_duration_ms {
                    self.set_status(Status::Idle);
                }
            }

            Status::MoveToDraft | Status::MoveToCrusher | Status::MoveToSugar => {
                self.tick_move_to_dispense();
            }

            Status::Drafting => self.tick_weight_dispense(Actuator::Pump),
            Status::CrushingIce => self.tick_weight_dispense(Actuator::Crusher),
            Status::DispensingSugar => self.tick_weight_dispense(Actuator::Sugar),

            Status::MoveToClean => {
                if self.abort {
                    self.axis.stop();
                    self.set_status(Status::AbortMovement);
                } else if self.arrived() {
                    self.action_started_ms = self.now_ms();
                    if self.start_pump() {
                        self.set_status(Status::Cleaning);
                    } else {
                        self.set_status(Status::ErrorBus);
                    }
                } else {
                    self.axis.run();
                }
            }

            Status::Cleaning => {
                if self.abort {
                    self.stop_pumps();
                    self.set_status(Status::ErrorCommandAborted);
                } else if self.now_ms() > self.action_started_ms + self.action_duration_ms {
                    if self.stop_pumps() {
                        self.set_status(Status::Idle);
                    } else {
                        self.set_status(Status::ErrorBus);
                    }
                }
            }

            Status::MoveToMixer => {
                if self.abort {
                    self.axis.stop();
                    self.set_status(Status::AbortMovement);
                } else if self.arrived() {
                    self.set_status(Status::Mixing);
                } else {
                    self.axis.run();
                }
            }

            Status::Mixing => self.tick_mixing(),
            Status::SetScaleLed => {
                if self.scale.set_indicator(self.scale_led_kind) {
                    self.set_status(Status::Idle);
                } else {
                    self.set_status(Status::ErrorBus);
                }
            }
            Status::PingAll => {
                self.ping_result = crate::boards::ping_all(&self.bus);
                self.set_status(Status::Idle);
            }
            Status::DispenseStraw => self.tick_straw(),
        }
    }

    fn tick_homing_rough(&mut self) {
        if self.is_homed() {
            // switch hit: this is the provisional zero, creep off it slowly
            self.axis.set_current_position(0);
            self.axis
                .set_speed(self.steps.speed_steps(self.cfg.motion.homing_speed_mm_s));
            self.commit_target_mm(HOMING_FINE_TARGET_MM);
            self.set_status(Status::HomingFine);
        } else {
            self.current_microstep += self.axis.run();
        }
    }

    fn tick_homing_fine(&mut self) {
        // keep creeping until the switch releases AND we sit on a full step,
        // so pos = 0 lands on a full step
        if self.is_homed() || self.current_microstep.rem_euclid(self.steps.microsteps()) != 0 {
            self.current_microstep += self.axis.run_at_speed();
        } else {
            self.axis.set_current_position(0);
            self.axis.set_speed(0.0);
            self.axis.move_to(0);
            self.set_status(Status::Idle);
            if self.startup {
                self.startup = false;
            }
        }
    }

    /// Shared arrival logic for the three weight-fed dispenses.
    fn tick_move_to_dispense(&mut self) {
        if self.abort {
            self.axis.stop();
            self.set_status(Status::AbortMovement);
            return;
        }
        if !self.arrived() {
            self.axis.run();
            return;
        }
        // carriage is at the station: sample the baseline or bail out
        match self.scale.update() {
            ScaleUpdate::DataRead => {
                let weight = self.scale.weight();
                if weight <= self.cfg.glass_min_weight_g {
                    self.set_status(Status::ErrorGlassRemoved);
                    return;
                }
                let now = self.now_ms();
                self.session = Some(DraftSession::begin(
                    self.pump_port,
                    weight,
                    self.pending_delta_g,
                    now,
                ));
                self.child_last_check_ms = now;
                match self.status {
                    Status::MoveToDraft => {
                        if self.start_pump() {
                            self.set_status(Status::Drafting);
                        } else {
                            self.set_status(Status::ErrorBus);
                        }
                    }
                    Status::MoveToCrusher => {
                        if self.crusher.start() {
                            self.set_status(Status::CrushingIce);
                        } else {
                            self.set_status(Status::ErrorBus);
                        }
                    }
                    Status::MoveToSugar => {
                        if self.sugar.start() {
                            self.set_status(Status::DispensingSugar);
                        } else {
                            self.set_status(Status::ErrorBus);
                        }
                    }
                    _ => {}
                }
            }
            ScaleUpdate::CommunicationError => self.set_status(Status::ErrorBus),
            ScaleUpdate::Timeout => self.set_status(Status::ErrorScaleComm),
            ScaleUpdate::NoData => {}
        }
    }

    /// Shared active phase for draft, ice and sugar: weight feedback with a
    /// rolling depletion window, re-armed on every satisfied weight increase.
    fn tick_weight_dispense(&mut self, actuator: Actuator) {
        let res = self.scale.update();
        if self.abort {
            if !self.stop_actuator(actuator) {
                tracing::warn!(?actuator, "actuator stop failed during abort");
            }
            self.set_status(Status::ErrorCommandAborted);
            return;
        }
        match res {
            ScaleUpdate::DataRead => {
                let Some(mut session) = self.session else {
                    return;
                };
                let weight = self.scale.weight();
                let now = self.now_ms();
                if weight >= session.target_g {
                    if self.stop_actuator(actuator) {
                        self.set_status(Status::Idle);
                    } else {
                        self.set_status(Status::ErrorBus);
                    }
                } else {
                    let window = self.window_for(actuator);
                    if weight >= session.checkpoint_g + window.min_delta_g {
                        session.rearm(weight, now);
                        self.session = Some(session);
                    } else if now > session.checkpoint_ms + window.window_ms {
                        if self.stop_actuator(actuator) {
                            self.set_status(Status::ErrorIngredientEmpty);
                        } else {
                            self.set_status(Status::ErrorBus);
                        }
                    }
                }
            }
            ScaleUpdate::CommunicationError => {
                if !self.stop_actuator(actuator) {
                    tracing::warn!(?actuator, "actuator stop failed after bus error");
                }
                self.set_status(Status::ErrorBus);
            }
            ScaleUpdate::Timeout => {
                if !self.stop_actuator(actuator) {
                    tracing::warn!(?actuator, "actuator stop failed after scale timeout");
                }
                self.set_status(Status::ErrorScaleComm);
            }
            ScaleUpdate::NoData => {}
        }

        // health polls on the slow cadence; the boards halt on their own
        // faults, so only the status needs to change here
        let now = self.now_ms();
        if self.status == Status::CrushingIce
            && now > self.child_last_check_ms + self.cfg.child_poll_ms
        {
            match self.crusher.error_code() {
                None => self.set_status(Status::ErrorBus),
                Some(CRUSHER_ERROR_COVER_OPEN) => self.set_status(Status::ErrorCrusherCoverOpen),
                Some(CRUSHER_ERROR_TIMEOUT) => self.set_status(Status::ErrorCrusherTimeout),
                Some(_) => {}
            }
            self.child_last_check_ms = now;
        }
        if self.status == Status::DispensingSugar
            && now > self.child_last_check_ms + self.cfg.child_poll_ms
        {
            match self.sugar.error_code() {
                None => self.set_status(Status::ErrorBus),
                Some(SUGAR_ERROR_TIMEOUT) => self.set_status(Status::ErrorSugarTimeout),
                Some(_) => {}
            }
            self.child_last_check_ms = now;
        }
    }

    fn tick_mixing(&mut self) {
        // abort before the start command went out: nothing happened yet
        if self.abort && !self.mixer_start_sent {
            self.set_status(Status::ErrorCommandAborted);
            return;
        }
        if !self.mixer_start_sent {
            if !self.mixer.start_mixing(self.mixing_seconds) {
                self.set_status(Status::ErrorBus);
                return;
            }
            let now = self.now_ms();
            self.action_started_ms = now;
            self.child_last_check_ms = now;
            self.mixer_start_sent = true;
        } else if self.now_ms() > self.child_last_check_ms + self.cfg.child_poll_ms {
            match self.mixer.is_mixing() {
                None => self.set_status(Status::ErrorBus),
                Some(true) => self.child_last_check_ms = self.now_ms(),
                Some(false) => match self.mixer.was_successful() {
                    None => self.set_status(Status::ErrorBus),
                    Some(true) => self.set_status(Status::Idle),
                    Some(false) => self.set_status(Status::ErrorMixingFailed),
                },
            }
        }
    }

    fn tick_straw(&mut self) {
        if !self.straw_start_sent {
            if !self.straw.start_dispense() {
                self.set_status(Status::ErrorBus);
                return;
            }
            let now = self.now_ms();
            self.action_started_ms = now;
            self.child_last_check_ms = now;
            self.straw_start_sent = true;
        } else if self.now_ms() > self.child_last_check_ms + self.cfg.child_poll_ms {
            match self.straw.is_dispensing() {
                None => self.set_status(Status::ErrorBus),
                Some(true) => self.child_last_check_ms = self.now_ms(),
                Some(false) => match self.straw.is_error() {
                    None => self.set_status(Status::ErrorBus),
                    Some(true) => self.set_status(Status::ErrorStrawsEmpty),
                    Some(false) => self.set_status(Status::Idle),
                },
            }
        }
    }

    // ── actions ──────────────────────────────────────────────────────────────

    pub fn start_homing(&mut self) -> Result<(), StartError> {
        self.ensure_idle()?;
        self.begin_homing();
        Ok(())
    }

    pub fn start_moveto(&mut self, position_mm: f32) -> Result<(), StartError> {
        self.ensure_idle()?;
        if !position_mm.is_finite() {
            return Err(StartError::InvalidParameter("position must be finite"));
        }
        self.commit_target_mm(position_mm);
        self.set_status(Status::MoveToPos);
        Ok(())
    }

    pub fn start_draft(&mut self, port: u8, grams: f32) -> Result<(), StartError> {
        self.ensure_idle()?;
        self.ensure_port(port)?;
        Self::ensure_grams(grams)?;
        self.pump_port = port;
        self.pending_delta_g = grams;
        self.commit_target_mm(self.cfg.rail.port_mm(port));
        // status is set last so a concurrent reader never sees a half-armed op
        self.set_status(Status::MoveToDraft);
        Ok(())
    }

    pub fn start_clean(&mut self, port: u8, duration_ms: u64) -> Result<(), StartError> {
        self.ensure_idle()?;
        self.ensure_port(port)?;
        if duration_ms == 0 {
            return Err(StartError::InvalidParameter("duration must be > 0"));
        }
        self.pump_port = port;
        self.action_duration_ms = duration_ms;
        self.commit_target_mm(self.cfg.rail.port_mm(port));
        self.set_status(Status::MoveToClean);
        Ok(())
    }

    pub fn start_crushing(&mut self, grams: f32) -> Result<(), StartError> {
        self.ensure_idle()?;
        Self::ensure_grams(grams)?;
        self.pending_delta_g = grams;
        self.commit_target_mm(self.cfg.rail.crusher_mm);
        self.set_status(Status::MoveToCrusher);
        Ok(())
    }

    pub fn start_dispensing_sugar(&mut self, grams: f32) -> Result<(), StartError> {
        self.ensure_idle()?;
        Self::ensure_grams(grams)?;
        self.pending_delta_g = grams;
        self.commit_target_mm(self.cfg.rail.sugar_mm);
        self.set_status(Status::MoveToSugar);
        Ok(())
    }

    pub fn start_mixing(&mut self, seconds: u64) -> Result<(), StartError> {
        self.ensure_idle()?;
        if seconds == 0 {
            return Err(StartError::InvalidParameter("seconds must be > 0"));
        }
        self.mixing_seconds = seconds.min(255) as u8;
        self.mixer_start_sent = false;
        self.commit_target_mm(self.cfg.rail.mixer_mm);
        self.set_status(Status::MoveToMixer);
        Ok(())
    }

    pub fn start_delay(&mut self, duration_ms: u64) -> Result<(), StartError> {
        self.ensure_idle()?;
        if duration_ms == 0 {
            return Err(StartError::InvalidParameter("duration must be > 0"));
        }
        self.action_started_ms = self.now_ms();
        self.action_duration_ms = duration_ms;
        self.set_status(Status::Delay);
        Ok(())
    }

    pub fn start_set_scale_led(&mut self, kind: u8) -> Result<(), StartError> {
        self.ensure_idle()?;
        self.scale_led_kind = kind;
        self.set_status(Status::SetScaleLed);
        Ok(())
    }

    pub fn start_dispense_straw(&mut self) -> Result<(), StartError> {
        self.ensure_idle()?;
        self.straw_start_sent = false;
        self.set_status(Status::DispenseStraw);
        Ok(())
    }

    pub fn start_ping_all(&mut self) -> Result<(), StartError> {
        self.ensure_idle()?;
        self.set_status(Status::PingAll);
        Ok(())
    }

    /// Probe all board addresses right now and return the fresh bitmask.
    /// Falls back to the stored result while an operation owns the bus.
    pub fn ping_all_now(&mut self) -> u16 {
        if self.status == Status::Idle {
            self.ping_result = crate::boards::ping_all(&self.bus);
        }
        self.ping_result
    }

    /// Leave an error state. Does nothing while the machine is working.
    pub fn reset_error(&mut self) {
        if self.status.is_error() {
            self.set_status(Status::Idle);
        }
    }

    /// Ask the running motion/dispense to cancel; takes effect within one
    /// tick and always ends in `ErrorCommandAborted` after a controlled stop.
    pub fn request_abort(&mut self) {
        self.abort = true;
    }

    // ── getters ──────────────────────────────────────────────────────────────

    pub fn status(&self) -> Status {
        self.status
    }

    /// False until the startup homing has completed once.
    pub fn is_started(&self) -> bool {
        !self.startup
    }

    pub fn position_mm(&self) -> f32 {
        self.steps.steps_to_mm(self.axis.current_position())
    }

    pub fn target_position_mm(&self) -> f32 {
        self.steps.steps_to_mm(self.axis.target_position())
    }

    /// Last read weight in grams.
    pub fn weight(&self) -> f32 {
        self.scale.weight()
    }

    pub fn has_glass(&self) -> bool {
        self.scale.weight() > self.cfg.glass_min_weight_g
    }

    /// Grams still missing from the most recent weight-fed dispense.
    pub fn last_draft_remaining_weight(&self) -> f32 {
        self.session
            .map(|s| s.remaining_g(self.scale.weight()))
            .unwrap_or(0.0)
    }

    /// Bitmask of board addresses that answered the last liveness scan.
    pub fn ping_result(&self) -> u16 {
        self.ping_result
    }

    // ── setters ──────────────────────────────────────────────────────────────

    pub fn set_status_observer(&mut self, observer: StatusObserver) {
        self.on_status_changed = Some(observer);
    }

    pub fn set_max_speed(&mut self, mm_per_s: f32) {
        self.axis.set_max_speed(self.steps.speed_steps(mm_per_s));
    }

    pub fn set_max_accel(&mut self, mm_per_s2: f32) {
        self.axis.set_acceleration(self.steps.speed_steps(mm_per_s2));
    }

    pub fn set_pump_power(&mut self, percent: u8) {
        self.pump_power_percent = percent.clamp(1, 100);
    }

    pub fn set_scale_calibration(&mut self, calibration: f32) {
        self.scale.set_calibration(calibration);
    }

    pub fn set_scale_offset(&mut self, offset: f32) {
        self.scale.set_offset(offset);
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn begin_homing(&mut self) {
        // keep only the parity so the fine phase still lands on a full step
        self.current_microstep = self.current_microstep.rem_euclid(self.steps.microsteps());
        self.commit_target_mm(-self.cfg.motion.homing_sweep_mm);
        self.set_status(Status::HomingRough);
    }

    /// The single status mutation point; notifies the registered observer.
    fn set_status(&mut self, new_status: Status) {
        if new_status != self.status {
            tracing::debug!(from = ?self.status, to = ?new_status, "status change");
            self.status = new_status;
            if let Some(observer) = self.on_status_changed.as_mut() {
                observer(new_status);
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), StartError> {
        if self.status == Status::Idle {
            Ok(())
        } else {
            Err(StartError::Busy(self.status))
        }
    }

    fn ensure_port(&self, port: u8) -> Result<(), StartError> {
        if port < self.cfg.rail.port_count {
            Ok(())
        } else {
            Err(StartError::PortOutOfRange(port))
        }
    }

    fn ensure_grams(grams: f32) -> Result<(), StartError> {
        if grams.is_finite() && grams > 0.0 {
            Ok(())
        } else {
            Err(StartError::InvalidParameter("grams must be > 0"))
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn arrived(&self) -> bool {
        self.axis.current_position() == self.axis.target_position()
    }

    /// Debounced home switch: two agreeing reads.
    fn is_homed(&mut self) -> bool {
        self.axis.home_switch() && self.axis.home_switch()
    }

    /// Clamp and commit a target; the committed value is always a full step.
    fn commit_target_mm(&mut self, mm: f32) {
        self.axis.move_to(self.steps.target_steps(mm));
    }

    fn pump_pwm(&self) -> u32 {
        (u32::from(self.pump_power_percent) * (1u32 << self.cfg.pwm_bits)) / 100
    }

    fn start_pump(&mut self) -> bool {
        let pwm = self.pump_pwm();
        match self.pumps.start(self.pump_port, pwm) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(port = self.pump_port, error = %e, "pump start failed");
                false
            }
        }
    }

    fn stop_pumps(&mut self) -> bool {
        match self.pumps.stop_all() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "pump stop failed");
                false
            }
        }
    }

    fn stop_actuator(&mut self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Pump => self.stop_pumps(),
            Actuator::Crusher => self.crusher.stop(),
            Actuator::Sugar => self.sugar.stop(),
        }
    }

    fn window_for(&self, actuator: Actuator) -> FeedbackWindow {
        match actuator {
            Actuator::Pump => self.cfg.draft_window,
            Actuator::Crusher => self.cfg.ice_window,
            Actuator::Sugar => self.cfg.sugar_window,
        }
    }
}
