//! Serve the drink-machine command protocol over stdin/stdout against the
//! simulated hardware: one cooperative loop ticking the state machine and the
//! dispatcher, never blocking in either.

mod cli;
mod commands;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use barbot_config::Config;
use barbot_core::boards::{CrusherBoard, MixerBoard, ScaleBoard, ScaleCfg, StrawBoard, SugarBoard};
use barbot_core::{MachineCfg, StateMachine};
use barbot_hardware::{ChannelDuplex, SimAxis, SimBus, SimPumps, SimWorld};
use barbot_protocol::Protocol;
use barbot_traits::{Clock, MonotonicClock};

use cli::{Cli, FILE_GUARD};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let cfg = if args.config.exists() {
        barbot_config::load_file(&args.config)?
    } else {
        Config::default()
    };
    init_tracing(&args, &cfg.logging)?;
    if !args.config.exists() {
        tracing::info!(config = %args.config.display(), "config file absent, using defaults");
    }

    run(&cfg)
}

fn init_tracing(args: &Cli, logging: &barbot_config::Logging) -> eyre::Result<()> {
    let level = logging
        .level
        .clone()
        .unwrap_or_else(|| args.log_level.clone());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(file) = &logging.file {
        let path = std::path::Path::new(file);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let name = path.file_name().unwrap_or_else(|| "barbot.log".as_ref());
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .json()
            .init();
    } else {
        // stdout belongs to the protocol; logs go to stderr
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn run(cfg: &Config) -> eyre::Result<()> {
    let world = SimWorld::new(cfg.scale.calibration, cfg.scale.offset);
    let bus = Rc::new(RefCell::new(SimBus::new(world.clone())));
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());

    let scale = ScaleBoard::new(
        bus.clone(),
        ScaleCfg {
            calibration: cfg.scale.calibration,
            offset: cfg.scale.offset,
            data_timeout_ms: cfg.scale.data_timeout_ms,
            poll_interval_ms: cfg.scale.poll_interval_ms,
        },
        clock.clone(),
    );
    let machine = StateMachine::new(
        SimAxis::new(),
        SimPumps::new(world.clone()),
        bus.clone(),
        scale,
        MixerBoard::new(bus.clone()),
        StrawBoard::new(bus.clone()),
        CrusherBoard::new(bus.clone()),
        SugarBoard::new(bus),
        MachineCfg::from(cfg),
        clock.clone(),
    );
    let machine = Rc::new(RefCell::new(machine));
    machine
        .borrow_mut()
        .set_status_observer(Box::new(|status| {
            tracing::info!(?status, "machine status");
        }));

    let mut protocol = Protocol::new(
        ChannelDuplex::stdio(),
        cfg.protocol.heartbeat_ms,
        clock.clone(),
    );
    commands::register(&mut protocol, &machine, cfg);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .wrap_err("installing signal handler")?;
    }

    machine.borrow_mut().begin();
    // drive the startup homing to completion before serving any commands;
    // bytes arriving meanwhile queue up in the stream
    while !machine.borrow().is_started() {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        world.borrow_mut().tick();
        machine.borrow_mut().update();
        std::thread::sleep(Duration::from_millis(1));
    }
    protocol.set_accepts_commands(true);
    tracing::info!("startup homing complete, accepting commands");

    let mut stream_closed = false;
    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::info!("interrupted, shutting down");
            break;
        }
        world.borrow_mut().tick();
        if protocol.abort_requested() {
            machine.borrow_mut().request_abort();
        }
        machine.borrow_mut().update();
        if let Err(e) = protocol.update() {
            if !stream_closed {
                tracing::info!(error = %e, "command stream closed");
            }
            stream_closed = true;
        }
        // after EOF, let an in-flight command finish so its DONE/ERROR line
        // still goes out
        if stream_closed && protocol.running_command().is_none() {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}
