//! The command registration table: every protocol command wired to the state
//! machine, with the parameter validation the remote is allowed to rely on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::str::FromStr;

use barbot_config::Config;
use barbot_core::{StateMachine, Status};
use barbot_protocol::{CommandState, Protocol};
use barbot_traits::{Axis, Bus, Duplex, PumpDriver};

fn param<T: FromStr>(params: &[&str], index: usize) -> Option<T> {
    params.get(index)?.parse().ok()
}

/// Poll for Do commands that carry no payload on failure.
fn poll_plain<A, P, B>(machine: Rc<RefCell<StateMachine<A, P, B>>>) -> impl FnMut() -> CommandState
where
    A: Axis,
    P: PumpDriver,
    B: Bus,
{
    move || {
        let mut m = machine.borrow_mut();
        let status = m.status();
        if status.is_error() {
            m.reset_error();
            CommandState::Failed {
                code: status.code(),
                value: 0,
            }
        } else if status == Status::Idle {
            CommandState::Done
        } else {
            CommandState::Running
        }
    }
}

/// Poll for weight-fed dispenses: failures report the grams still missing.
fn poll_with_remaining<A, P, B>(
    machine: Rc<RefCell<StateMachine<A, P, B>>>,
) -> impl FnMut() -> CommandState
where
    A: Axis,
    P: PumpDriver,
    B: Bus,
{
    move || {
        let mut m = machine.borrow_mut();
        let status = m.status();
        if status.is_error() {
            let value = m.last_draft_remaining_weight().round() as i64;
            m.reset_error();
            CommandState::Failed {
                code: status.code(),
                value,
            }
        } else if status == Status::Idle {
            CommandState::Done
        } else {
            CommandState::Running
        }
    }
}

pub fn register<A, P, B, S>(
    protocol: &mut Protocol<S>,
    machine: &Rc<RefCell<StateMachine<A, P, B>>>,
    cfg: &Config,
) where
    A: Axis + 'static,
    P: PumpDriver + 'static,
    B: Bus + 'static,
    S: Duplex,
{
    let port_count = cfg.rail.port_count;
    // cosmetic rail LED animation is handled outside the core; the command
    // only has to be accepted and remembered
    let led_kind = Rc::new(Cell::new(0u8));

    let m = machine.clone();
    protocol.add_do_command(
        "Home",
        move |params| {
            if !params.is_empty() {
                return None;
            }
            m.borrow_mut().start_homing().ok().map(|_| 0)
        },
        poll_plain(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Draft",
        move |params| {
            if params.len() != 2 {
                return None;
            }
            let port: u8 = param(params, 0)?;
            let grams: f32 = param(params, 1)?;
            if port >= port_count || !(grams > 0.0 && grams < 400.0) {
                return None;
            }
            m.borrow_mut().start_draft(port, grams).ok().map(|_| 0)
        },
        poll_with_remaining(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Crush",
        move |params| {
            if params.len() != 1 {
                return None;
            }
            let grams: f32 = param(params, 0)?;
            if !(grams > 0.0 && grams < 400.0) {
                return None;
            }
            m.borrow_mut().start_crushing(grams).ok().map(|_| 0)
        },
        poll_with_remaining(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Sugar",
        move |params| {
            if params.len() != 1 {
                return None;
            }
            let grams: f32 = param(params, 0)?;
            if !(grams > 0.0 && grams < 400.0) {
                return None;
            }
            m.borrow_mut().start_dispensing_sugar(grams).ok().map(|_| 0)
        },
        poll_with_remaining(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Mix",
        move |params| {
            if params.len() != 1 {
                return None;
            }
            let seconds: u64 = param(params, 0)?;
            if seconds == 0 {
                return None;
            }
            // the machine clamps to the mixer board's one-byte duration
            m.borrow_mut().start_mixing(seconds).ok().map(|_| 0)
        },
        poll_plain(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Clean",
        move |params| {
            if params.len() != 2 {
                return None;
            }
            let port: u8 = param(params, 0)?;
            let millis: u64 = param(params, 1)?;
            if port >= port_count || !(millis > 100 && millis <= 10_000) {
                return None;
            }
            m.borrow_mut().start_clean(port, millis).ok().map(|_| 0)
        },
        poll_plain(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Straw",
        move |params| {
            if !params.is_empty() {
                return None;
            }
            m.borrow_mut().start_dispense_straw().ok().map(|_| 0)
        },
        poll_plain(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Move",
        move |params| {
            if params.len() != 1 {
                return None;
            }
            let mm: i64 = param(params, 0)?;
            if !(0..5000).contains(&mm) {
                return None;
            }
            m.borrow_mut().start_moveto(mm as f32).ok().map(|_| 0)
        },
        poll_plain(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_do_command(
        "Delay",
        move |params| {
            if params.len() != 1 {
                return None;
            }
            let millis: u64 = param(params, 0)?;
            if !(1..5000).contains(&millis) {
                return None;
            }
            m.borrow_mut().start_delay(millis).ok().map(|_| 0)
        },
        poll_plain(machine.clone()),
    );

    // the scale LED goes over the satellite bus, so it must run in the
    // machine's own tick rather than inside the dispatcher
    let m = machine.clone();
    protocol.add_do_command(
        "PlatformLED",
        move |params| {
            if params.len() != 1 {
                return None;
            }
            let kind: u8 = param(params, 0)?;
            if kind >= 10 {
                return None;
            }
            m.borrow_mut().start_set_scale_led(kind).ok().map(|_| 0)
        },
        poll_plain(machine.clone()),
    );

    let m = machine.clone();
    protocol.add_set_command("SetSpeed", move |params| {
        if params.len() != 1 {
            return None;
        }
        let speed: i64 = param(params, 0)?;
        if !(1..5000).contains(&speed) {
            return None;
        }
        m.borrow_mut().set_max_speed(speed as f32);
        Some(0)
    });

    let m = machine.clone();
    protocol.add_set_command("SetAccel", move |params| {
        if params.len() != 1 {
            return None;
        }
        let accel: i64 = param(params, 0)?;
        if !(1..5000).contains(&accel) {
            return None;
        }
        m.borrow_mut().set_max_accel(accel as f32);
        Some(0)
    });

    let m = machine.clone();
    protocol.add_set_command("SetPumpPower", move |params| {
        if params.len() != 1 {
            return None;
        }
        let percent: i64 = param(params, 0)?;
        if !(1..=100).contains(&percent) {
            return None;
        }
        m.borrow_mut().set_pump_power(percent as u8);
        Some(0)
    });

    let m = machine.clone();
    protocol.add_set_command("SetBalanceCalibration", move |params| {
        if params.len() != 1 {
            return None;
        }
        let calibration: f32 = param(params, 0)?;
        if calibration == 0.0 || !calibration.is_finite() {
            return None;
        }
        m.borrow_mut().set_scale_calibration(calibration);
        Some(0)
    });

    let m = machine.clone();
    protocol.add_set_command("SetBalanceOffset", move |params| {
        if params.len() != 1 {
            return None;
        }
        let offset: f32 = param(params, 0)?;
        if !offset.is_finite() {
            return None;
        }
        m.borrow_mut().set_scale_offset(offset);
        Some(0)
    });

    let led = led_kind.clone();
    protocol.add_set_command("SetLED", move |params| {
        if params.len() != 1 {
            return None;
        }
        let kind: u8 = param(params, 0)?;
        if kind >= 10 {
            return None;
        }
        led.set(kind);
        tracing::info!(kind, "rail LED animation selected");
        Some(0)
    });

    let m = machine.clone();
    protocol.add_get_command("GetWeight", move |_params| {
        Some(m.borrow().weight().round() as i64)
    });

    let m = machine.clone();
    protocol.add_get_command("HasGlas", move |_params| {
        Some(i64::from(m.borrow().has_glass()))
    });

    let m = machine.clone();
    protocol.add_get_command("GetConnectedBoards", move |_params| {
        Some(i64::from(m.borrow_mut().ping_all_now()))
    });
}
