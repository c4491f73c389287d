pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stepper-driven linear axis carrying the platform along the rail.
///
/// Positions are in motor micro-steps. `run()` and `run_at_speed()` perform a
/// bounded burst of work per call and report the signed number of micro-steps
/// actually taken, so callers can track the electrical micro-step phase.
pub trait Axis {
    fn current_position(&self) -> i64;
    fn target_position(&self) -> i64;
    /// Commit an absolute target in micro-steps.
    fn move_to(&mut self, steps: i64);
    /// Advance toward the target with acceleration control. Returns the
    /// signed number of micro-steps taken this call (0 when at the target).
    fn run(&mut self) -> i64;
    /// Advance at the constant speed set via `set_speed`; at most one
    /// micro-step per call. Returns the signed step taken, or 0.
    fn run_at_speed(&mut self) -> i64;
    /// Overwrite the position counter without moving (used when homed).
    fn set_current_position(&mut self, steps: i64);
    /// Constant speed for `run_at_speed`, in micro-steps per second.
    fn set_speed(&mut self, steps_per_sec: f32);
    fn set_max_speed(&mut self, steps_per_sec: f32);
    fn set_acceleration(&mut self, steps_per_sec2: f32);
    /// Begin a controlled deceleration toward a stop.
    fn stop(&mut self);
    /// Raw state of the home switch input.
    fn home_switch(&mut self) -> bool;
}

/// Pump bank behind the I/O expander: at most one port enabled at a time.
pub trait PumpDriver {
    /// Enable exactly `port` at the given PWM level, disabling all others.
    fn start(&mut self, port: u8, power_pwm: u32) -> Result<(), BoxError>;
    /// Disable every port and the PWM output.
    fn stop_all(&mut self) -> Result<(), BoxError>;
}

/// Request/response transport to the satellite boards.
///
/// Every call is a short, bounded round trip; implementations must not block
/// indefinitely. Retries live in the board proxies, not here.
pub trait Bus {
    fn send(&mut self, address: u8, command: u8, data: &[u8]) -> Result<(), BoxError>;
    fn get_bool(&mut self, address: u8, command: u8) -> Result<bool, BoxError>;
    fn get_byte(&mut self, address: u8, command: u8) -> Result<u8, BoxError>;
    fn get_float(&mut self, address: u8, command: u8) -> Result<f32, BoxError>;
    /// Liveness probe: true if the board at `address` echoed its own address.
    fn ping(&mut self, address: u8) -> bool;
}

/// Non-blocking bidirectional byte stream carrying the command protocol.
pub trait Duplex {
    /// Next buffered input byte, or `None` when nothing is pending. `Err`
    /// means the stream is gone (peer closed, transport fault).
    fn poll_byte(&mut self) -> Result<Option<u8>, BoxError>;
    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
}
