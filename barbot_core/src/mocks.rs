//! Test and helper mocks for barbot_core.
//!
//! `MockBus` interprets the real board addresses/commands against a shared
//! [`World`], so tests script the machine's surroundings (weight, board
//! faults, liveness) without any hardware.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use barbot_traits::{Axis, BoxError, Bus, ManualClock, PumpDriver};

use crate::boards::{
    CRUSHER_ADDRESS, MIXER_ADDRESS, SCALE_ADDRESS, STRAW_ADDRESS, SUGAR_ADDRESS, ScaleBoard,
    ScaleCfg,
};
use crate::config::MachineCfg;
use crate::machine::StateMachine;

/// Scriptable state of the simulated machine surroundings.
#[derive(Debug)]
pub struct World {
    /// Raw scale value; with calibration 1/offset 0 this is grams directly.
    pub weight_g: Cell<f32>,
    pub scale_has_data: Cell<bool>,
    /// Bit per address: queries to these addresses fail outright.
    pub offline_mask: Cell<u16>,
    /// Bit per address: boards answering the liveness ping.
    pub alive_mask: Cell<u16>,

    pub pump_running: Cell<bool>,
    pub mixer_mixing: Cell<bool>,
    pub mixer_success: Cell<bool>,
    pub mixer_pos: Cell<u8>,
    pub straw_dispensing: Cell<bool>,
    pub straw_success: Cell<bool>,
    pub crusher_running: Cell<bool>,
    pub crusher_error: Cell<u8>,
    pub sugar_running: Cell<bool>,
    pub sugar_error: Cell<u8>,
    pub scale_led: Cell<u8>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            weight_g: Cell::new(0.0),
            scale_has_data: Cell::new(true),
            offline_mask: Cell::new(0),
            alive_mask: Cell::new(0b0011_1110),
            pump_running: Cell::new(false),
            mixer_mixing: Cell::new(false),
            mixer_success: Cell::new(true),
            mixer_pos: Cell::new(0),
            straw_dispensing: Cell::new(false),
            straw_success: Cell::new(true),
            crusher_running: Cell::new(false),
            crusher_error: Cell::new(0),
            sugar_running: Cell::new(false),
            sugar_error: Cell::new(0),
            scale_led: Cell::new(0),
        }
    }
}

impl World {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn offline(&self, address: u8) -> bool {
        self.offline_mask.get() & (1 << address) != 0
    }
}

/// Bus double backed by a [`World`].
pub struct MockBus {
    pub world: Rc<World>,
}

impl MockBus {
    pub fn new(world: Rc<World>) -> Self {
        Self { world }
    }
}

fn unexpected(address: u8, command: u8) -> BoxError {
    format!("unexpected bus op: address {address} command {command}").into()
}

impl Bus for MockBus {
    fn send(&mut self, address: u8, command: u8, data: &[u8]) -> Result<(), BoxError> {
        if self.world.offline(address) {
            return Err(format!("board {address} offline").into());
        }
        match (address, command) {
            (SCALE_ADDRESS, 3) => {
                self.world.scale_led.set(data.first().copied().unwrap_or(0));
            }
            (MIXER_ADDRESS, 1) => self.world.mixer_mixing.set(true),
            (MIXER_ADDRESS, 4) => {
                self.world.mixer_pos.set(data.first().copied().unwrap_or(0));
            }
            (STRAW_ADDRESS, 1) => self.world.straw_dispensing.set(true),
            (CRUSHER_ADDRESS, 1) => self.world.crusher_running.set(true),
            (CRUSHER_ADDRESS, 2) => self.world.crusher_running.set(false),
            (SUGAR_ADDRESS, 1) => self.world.sugar_running.set(true),
            (SUGAR_ADDRESS, 2) => self.world.sugar_running.set(false),
            _ => return Err(unexpected(address, command)),
        }
        Ok(())
    }

    fn get_bool(&mut self, address: u8, command: u8) -> Result<bool, BoxError> {
        if self.world.offline(address) {
            return Err(format!("board {address} offline").into());
        }
        match (address, command) {
            (SCALE_ADDRESS, 1) => Ok(self.world.scale_has_data.get()),
            (MIXER_ADDRESS, 2) => Ok(self.world.mixer_mixing.get()),
            (MIXER_ADDRESS, 3) => Ok(self.world.mixer_success.get()),
            (STRAW_ADDRESS, 2) => Ok(self.world.straw_dispensing.get()),
            (STRAW_ADDRESS, 3) => Ok(self.world.straw_success.get()),
            _ => Err(unexpected(address, command)),
        }
    }

    fn get_byte(&mut self, address: u8, command: u8) -> Result<u8, BoxError> {
        if self.world.offline(address) {
            return Err(format!("board {address} offline").into());
        }
        match (address, command) {
            (CRUSHER_ADDRESS, 3) => Ok(self.world.crusher_error.get()),
            (SUGAR_ADDRESS, 3) => Ok(self.world.sugar_error.get()),
            (MIXER_ADDRESS, 5) => Ok(self.world.mixer_pos.get()),
            _ => Err(unexpected(address, command)),
        }
    }

    fn get_float(&mut self, address: u8, command: u8) -> Result<f32, BoxError> {
        if self.world.offline(address) {
            return Err(format!("board {address} offline").into());
        }
        match (address, command) {
            (SCALE_ADDRESS, 2) => Ok(self.world.weight_g.get()),
            _ => Err(unexpected(address, command)),
        }
    }

    fn ping(&mut self, address: u8) -> bool {
        self.world.alive_mask.get() & (1 << address) != 0
    }
}

/// Axis double: one step per `run()`/`run_at_speed()` call, home switch
/// active at or below `switch_below`, `stop()` consumes a short deceleration
/// distance instead of halting instantly.
pub struct MockAxis {
    pub position: i64,
    pub target: i64,
    pub speed: f32,
    pub max_speed: f32,
    pub accel: f32,
    pub switch_below: i64,
    pub decel_steps: i64,
}

impl MockAxis {
    pub fn at(position: i64) -> Self {
        Self {
            position,
            target: position,
            speed: 0.0,
            max_speed: 0.0,
            accel: 0.0,
            switch_below: 0,
            decel_steps: 2,
        }
    }
}

impl Axis for MockAxis {
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
            return 0;
        }
        let step = (self.target - self.position).signum();
        self.position += step;
        step
    }
    fn run_at_speed(&mut self) -> i64 {
        let step = if self.speed > 0.0 {
            1
        } else if self.speed < 0.0 {
            -1
        } else {
            0
        };
        self.position += step;
        step
    }
    fn set_current_position(&mut self, steps: i64) {
        self.position = steps;
        self.target = steps;
    }
    fn set_speed(&mut self, steps_per_sec: f32) {
        self.speed = steps_per_sec;
    }
    fn set_max_speed(&mut self, steps_per_sec: f32) {
        self.max_speed = steps_per_sec;
    }
    fn set_acceleration(&mut self, steps_per_sec2: f32) {
        self.accel = steps_per_sec2;
    }
    fn stop(&mut self) {
        let remaining = self.target - self.position;
        if remaining != 0 {
            let decel = self.decel_steps.min(remaining.abs());
            self.target = self.position + remaining.signum() * decel;
        }
    }
    fn home_switch(&mut self) -> bool {
        self.position <= self.switch_below
    }
}

#[derive(Debug, Default)]
pub struct PumpState {
    pub running: Option<(u8, u32)>,
    pub starts: u32,
    pub stops: u32,
    pub fail: bool,
}

/// Pump-bank double recording starts/stops.
pub struct MockPumps {
    pub state: Rc<RefCell<PumpState>>,
}

impl MockPumps {
    pub fn new() -> (Self, Rc<RefCell<PumpState>>) {
        let state = Rc::new(RefCell::new(PumpState::default()));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl PumpDriver for MockPumps {
    fn start(&mut self, port: u8, power_pwm: u32) -> Result<(), BoxError> {
        let mut s = self.state.borrow_mut();
        if s.fail {
            return Err("pump driver offline".into());
        }
        s.running = Some((port, power_pwm));
        s.starts += 1;
        Ok(())
    }
    fn stop_all(&mut self) -> Result<(), BoxError> {
        let mut s = self.state.borrow_mut();
        if s.fail {
            return Err("pump driver offline".into());
        }
        s.running = None;
        s.stops += 1;
        Ok(())
    }
}

/// Everything a machine test needs in one place.
pub struct TestRig {
    pub machine: StateMachine<MockAxis, MockPumps, MockBus>,
    pub world: Rc<World>,
    pub pumps: Rc<RefCell<PumpState>>,
    pub clock: ManualClock,
}

/// Build a machine over fresh mocks, with identity scale calibration so the
/// world's `weight_g` is the weight the machine sees.
pub fn test_rig(cfg: MachineCfg, axis: MockAxis) -> TestRig {
    let world = World::new();
    let clock = ManualClock::new();
    let shared: Arc<dyn barbot_traits::Clock + Send + Sync> = Arc::new(clock.clone());
    let bus = Rc::new(RefCell::new(MockBus::new(world.clone())));
    let scale_cfg = ScaleCfg {
        calibration: 1.0,
        offset: 0.0,
        data_timeout_ms: 1000,
        poll_interval_ms: 0,
    };
    let scale = ScaleBoard::new(bus.clone(), scale_cfg, shared.clone());
    let mixer = crate::boards::MixerBoard::new(bus.clone());
    let straw = crate::boards::StrawBoard::new(bus.clone());
    let crusher = crate::boards::CrusherBoard::new(bus.clone());
    let sugar = crate::boards::SugarBoard::new(bus.clone());
    let (pumps, pump_state) = MockPumps::new();
    let machine = StateMachine::new(
        axis,
        pumps,
        bus,
        scale,
        mixer,
        straw,
        crusher,
        sugar,
        cfg,
        shared,
    );
    TestRig {
        machine,
        world,
        pumps: pump_state,
        clock,
    }
}
