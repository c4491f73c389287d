//! Simulated machine: axis, pump bank and satellite boards over one shared
//! world, good enough to drive the whole control core end to end.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use barbot_traits::{Axis, BoxError, Bus, PumpDriver};

const SCALE_ADDRESS: u8 = 0x01;
const MIXER_ADDRESS: u8 = 0x02;
const STRAW_ADDRESS: u8 = 0x03;
const CRUSHER_ADDRESS: u8 = 0x04;
const SUGAR_ADDRESS: u8 = 0x05;

/// Physical state shared by the simulated bus and pump bank.
pub struct SimWorld {
    /// Raw-count conversion mirrored from the configured scale calibration,
    /// so the core's proxy decodes the weight it expects.
    scale_calibration: f32,
    scale_offset: f32,

    pub weight_g: f32,
    pub glass_present: bool,
    pub pump: Option<(u8, u32)>,
    pub pump_flow_g_s: f32,
    pub crusher_on: bool,
    pub crusher_flow_g_s: f32,
    pub crusher_error: u8,
    pub sugar_on: bool,
    pub sugar_flow_g_s: f32,
    pub sugar_error: u8,
    pub mixer_until: Option<Instant>,
    pub mixer_success: bool,
    pub mixer_pos: u8,
    pub straw_until: Option<Instant>,
    pub straws_left: u32,
    pub straw_delivered: bool,
    pub scale_led: u8,
    /// Boards answering the liveness ping (bit per address).
    pub alive_mask: u16,

    last_tick: Instant,
}

impl SimWorld {
    pub fn new(scale_calibration: f32, scale_offset: f32) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            scale_calibration,
            scale_offset,
            // a 400 g glass is already waiting on the platform
            weight_g: 400.0,
            glass_present: true,
            pump: None,
            pump_flow_g_s: 40.0,
            crusher_on: false,
            crusher_flow_g_s: 15.0,
            crusher_error: 0,
            sugar_on: false,
            sugar_flow_g_s: 8.0,
            sugar_error: 0,
            mixer_until: None,
            mixer_success: true,
            mixer_pos: 0,
            straw_until: None,
            straws_left: 50,
            straw_delivered: true,
            scale_led: 0,
            alive_mask: 0b0011_1110,
            last_tick: Instant::now(),
        }))
    }

    /// Advance the simulated physics by wall-clock time.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last_tick)
            .min(Duration::from_millis(100))
            .as_secs_f32();
        self.last_tick = now;

        if self.glass_present {
            if self.pump.is_some() {
                self.weight_g += self.pump_flow_g_s * dt;
            }
            if self.crusher_on {
                self.weight_g += self.crusher_flow_g_s * dt;
            }
            if self.sugar_on {
                self.weight_g += self.sugar_flow_g_s * dt;
            }
        }
        if let Some(until) = self.mixer_until
            && now >= until
        {
            self.mixer_until = None;
        }
        if let Some(until) = self.straw_until
            && now >= until
        {
            self.straw_until = None;
            if self.straws_left > 0 {
                self.straws_left -= 1;
                self.straw_delivered = true;
            } else {
                self.straw_delivered = false;
            }
        }
    }

    fn raw_weight(&self) -> f32 {
        let grams = if self.glass_present { self.weight_g } else { 0.0 };
        grams * self.scale_calibration + self.scale_offset
    }
}

/// Simulated satellite bus over the shared world.
pub struct SimBus {
    pub world: Rc<RefCell<SimWorld>>,
}

impl SimBus {
    pub fn new(world: Rc<RefCell<SimWorld>>) -> Self {
        Self { world }
    }
}

fn unknown(address: u8, command: u8) -> BoxError {
    format!("simulated board {address} has no command {command}").into()
}

impl Bus for SimBus {
    fn send(&mut self, address: u8, command: u8, data: &[u8]) -> Result<(), BoxError> {
        let mut w = self.world.borrow_mut();
        match (address, command) {
            (SCALE_ADDRESS, 3) => w.scale_led = data.first().copied().unwrap_or(0),
            (MIXER_ADDRESS, 1) => {
                let seconds = data.first().copied().unwrap_or(1);
                w.mixer_until = Some(Instant::now() + Duration::from_secs(u64::from(seconds)));
            }
            (MIXER_ADDRESS, 4) => w.mixer_pos = data.first().copied().unwrap_or(0),
            (STRAW_ADDRESS, 1) => {
                w.straw_until = Some(Instant::now() + Duration::from_millis(300));
            }
            (CRUSHER_ADDRESS, 1) => w.crusher_on = true,
            (CRUSHER_ADDRESS, 2) => w.crusher_on = false,
            (SUGAR_ADDRESS, 1) => w.sugar_on = true,
            (SUGAR_ADDRESS, 2) => w.sugar_on = false,
            _ => return Err(unknown(address, command)),
        }
        Ok(())
    }

    fn get_bool(&mut self, address: u8, command: u8) -> Result<bool, BoxError> {
        let w = self.world.borrow();
        match (address, command) {
            // the simulated load cell always has a fresh sample
            (SCALE_ADDRESS, 1) => Ok(true),
            (MIXER_ADDRESS, 2) => Ok(w.mixer_until.is_some()),
            (MIXER_ADDRESS, 3) => Ok(w.mixer_success),
            (STRAW_ADDRESS, 2) => Ok(w.straw_until.is_some()),
            (STRAW_ADDRESS, 3) => Ok(w.straw_delivered),
            _ => Err(unknown(address, command)),
        }
    }

    fn get_byte(&mut self, address: u8, command: u8) -> Result<u8, BoxError> {
        let w = self.world.borrow();
        match (address, command) {
            (CRUSHER_ADDRESS, 3) => Ok(w.crusher_error),
            (SUGAR_ADDRESS, 3) => Ok(w.sugar_error),
            (MIXER_ADDRESS, 5) => Ok(w.mixer_pos),
            _ => Err(unknown(address, command)),
        }
    }

    fn get_float(&mut self, address: u8, command: u8) -> Result<f32, BoxError> {
        let w = self.world.borrow();
        match (address, command) {
            (SCALE_ADDRESS, 2) => Ok(w.raw_weight()),
            _ => Err(unknown(address, command)),
        }
    }

    fn ping(&mut self, address: u8) -> bool {
        self.world.borrow().alive_mask & (1 << address) != 0
    }
}

/// Simulated pump bank.
pub struct SimPumps {
    pub world: Rc<RefCell<SimWorld>>,
}

impl SimPumps {
    pub fn new(world: Rc<RefCell<SimWorld>>) -> Self {
        Self { world }
    }
}

impl PumpDriver for SimPumps {
    fn start(&mut self, port: u8, power_pwm: u32) -> Result<(), BoxError> {
        self.world.borrow_mut().pump = Some((port, power_pwm));
        Ok(())
    }
    fn stop_all(&mut self) -> Result<(), BoxError> {
        self.world.borrow_mut().pump = None;
        Ok(())
    }
}

/// Simulated stepper axis: steps accrue from wall-clock time at the commanded
/// speed, bounded per call, so `run()` stays non-blocking.
pub struct SimAxis {
    position: i64,
    target: i64,
    speed_sps: f32,
    max_speed_sps: f32,
    accel: f32,
    step_debt: f64,
    last_run: Instant,
    /// Home switch is active at or below this position.
    switch_below: i64,
}

/// Upper bound on steps consumed in one `run()` call.
const MAX_STEPS_PER_CALL: i64 = 4096;

impl SimAxis {
    pub fn new() -> Self {
        Self {
            position: 0,
            target: 0,
            speed_sps: 0.0,
            max_speed_sps: 1000.0,
            accel: 0.0,
            step_debt: 0.0,
            last_run: Instant::now(),
            switch_below: 0,
        }
    }

    fn accrue(&mut self, speed_sps: f32, cap: i64) -> i64 {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last_run)
            .min(Duration::from_millis(100))
            .as_secs_f64();
        self.last_run = now;
        self.step_debt += dt * f64::from(speed_sps.abs());
        let steps = (self.step_debt.floor() as i64).min(cap);
        self.step_debt -= steps as f64;
        steps
    }
}

impl Default for SimAxis {
    fn default() -> Self {
        Self::new()
    }
}

impl Axis for SimAxis {
    fn current_position(&self) -> i64 {
        self.position
    }
    fn target_position(&self) -> i64 {
        self.target
    }
    fn move_to(&mut self, steps: i64) {
        self.target = steps;
    }
    fn run(&mut self) -> i64 {
        if self.position == self.target {
            self.step_debt = 0.0;
            self.last_run = Instant::now();
            return 0;
        }
        let steps = self
            .accrue(self.max_speed_sps, MAX_STEPS_PER_CALL)
            .min((self.target - self.position).abs());
        let signed = steps * (self.target - self.position).signum();
        self.position += signed;
        signed
    }
    fn run_at_speed(&mut self) -> i64 {
        if self.speed_sps == 0.0 {
            return 0;
        }
        // at most one step per call so phase tracking stays exact
        let steps = self.accrue(self.speed_sps, 1);
        let signed = steps * if self.speed_sps > 0.0 { 1 } else { -1 };
        self.position += signed;
        signed
    }
    fn set_current_position(&mut self, steps: i64) {
        self.position = steps;
        self.target = steps;
    }
    fn set_speed(&mut self, steps_per_sec: f32) {
        self.speed_sps = steps_per_sec;
    }
    fn set_max_speed(&mut self, steps_per_sec: f32) {
        self.max_speed_sps = steps_per_sec;
    }
    fn set_acceleration(&mut self, steps_per_sec2: f32) {
        self.accel = steps_per_sec2;
    }
    fn stop(&mut self) {
        let remaining = self.target - self.position;
        if remaining != 0 {
            // braking distance v^2 / 2a at the commanded cruise speed
            let v = f64::from(self.max_speed_sps);
            let a = f64::from(self.accel.max(1.0));
            let decel = (v * v / (2.0 * a)) as i64;
            self.target = self.position + remaining.signum() * decel.clamp(1, remaining.abs());
        }
    }
    fn home_switch(&mut self) -> bool {
        self.position <= self.switch_below
    }
}
