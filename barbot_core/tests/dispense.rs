//! Weight-fed dispensing: draft, ice, sugar, plus the time-based clean.

use barbot_core::mocks::{MockAxis, TestRig, test_rig};
use barbot_core::{MachineCfg, Status};

const SCALE_BIT: u16 = 1 << 0x01;

fn run_until(rig: &mut TestRig, wanted: Status, max_ticks: u32) {
    for _ in 0..max_ticks {
        if rig.machine.status() == wanted {
            return;
        }
        rig.machine.update();
    }
    panic!(
        "never reached {wanted:?}, stuck in {:?}",
        rig.machine.status()
    );
}

/// Rig with a 400 g glass already on the platform, machine idle at zero.
fn glass_rig() -> TestRig {
    let rig = test_rig(MachineCfg::default(), MockAxis::at(0));
    rig.world.weight_g.set(400.0);
    rig
}

#[test]
fn draft_completes_when_target_weight_reached() {
    let mut rig = glass_rig();
    rig.machine.start_draft(3, 50.0).unwrap();
    assert_eq!(rig.machine.status(), Status::MoveToDraft);

    run_until(&mut rig, Status::Drafting, 20_000);
    // baseline was sampled on arrival: target = 400 + 50
    let pump = rig.pumps.borrow().running;
    assert!(pump.is_some(), "pump should run while drafting");
    assert_eq!(pump.unwrap().0, 3);

    rig.world.weight_g.set(430.0);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::Drafting);
    assert_eq!(rig.machine.last_draft_remaining_weight(), 20.0);

    rig.world.weight_g.set(450.0);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::Idle);
    assert!(rig.pumps.borrow().running.is_none(), "pump must stop");
}

#[test]
fn draft_fails_as_empty_when_weight_stalls() {
    let mut rig = glass_rig();
    rig.machine.start_draft(0, 50.0).unwrap();
    run_until(&mut rig, Status::Drafting, 20_000);

    // weight creeps below the minimum delta, then the window expires
    rig.world.weight_g.set(405.0);
    rig.clock.advance_ms(3001);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorIngredientEmpty);
    assert!(rig.pumps.borrow().running.is_none(), "pump must stop");
    assert_eq!(rig.machine.last_draft_remaining_weight(), 45.0);
}

#[test]
fn draft_window_rearms_on_observed_increase() {
    let mut rig = glass_rig();
    rig.machine.start_draft(0, 100.0).unwrap();
    run_until(&mut rig, Status::Drafting, 20_000);

    // a satisfied delta inside the window re-arms the checkpoint
    rig.clock.advance_ms(2000);
    rig.world.weight_g.set(425.0);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::Drafting);

    // 2 s later the original window would have expired; the re-armed one
    // has not
    rig.clock.advance_ms(2000);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::Drafting);

    // but the re-armed window still fires eventually
    rig.clock.advance_ms(1100);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorIngredientEmpty);
}

#[test]
fn draft_fails_when_glass_is_missing() {
    let mut rig = glass_rig();
    rig.world.weight_g.set(120.0);
    rig.machine.start_draft(0, 50.0).unwrap();
    run_until(&mut rig, Status::ErrorGlassRemoved, 20_000);
    assert!(rig.pumps.borrow().running.is_none());
}

#[test]
fn draft_aborts_with_pump_stopped() {
    let mut rig = glass_rig();
    rig.machine.start_draft(0, 50.0).unwrap();
    run_until(&mut rig, Status::Drafting, 20_000);

    rig.machine.request_abort();
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorCommandAborted);
    assert!(rig.pumps.borrow().running.is_none());
}

#[test]
fn scale_offline_surfaces_bus_error() {
    let mut rig = glass_rig();
    rig.machine.start_draft(0, 50.0).unwrap();
    run_until(&mut rig, Status::Drafting, 20_000);

    rig.world.offline_mask.set(SCALE_BIT);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorBus);
    assert!(rig.pumps.borrow().running.is_none());
}

#[test]
fn scale_data_starvation_surfaces_comm_error() {
    let mut rig = glass_rig();
    rig.machine.start_draft(0, 50.0).unwrap();
    run_until(&mut rig, Status::Drafting, 20_000);

    rig.world.scale_has_data.set(false);
    rig.clock.advance_ms(1001);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorScaleComm);
    assert!(rig.pumps.borrow().running.is_none());
}

#[test]
fn crushing_runs_the_crusher_by_weight() {
    let mut rig = glass_rig();
    rig.machine.start_crushing(30.0).unwrap();
    run_until(&mut rig, Status::CrushingIce, 20_000);
    assert!(rig.world.crusher_running.get());

    rig.world.weight_g.set(431.0);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::Idle);
    assert!(!rig.world.crusher_running.get());
}

#[test]
fn crusher_cover_open_is_terminal() {
    let mut rig = glass_rig();
    rig.machine.start_crushing(30.0).unwrap();
    run_until(&mut rig, Status::CrushingIce, 20_000);

    rig.world.crusher_error.set(1);
    // health polls run on the slow child cadence
    rig.clock.advance_ms(101);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorCrusherCoverOpen);
}

#[test]
fn crusher_stall_times_out_on_the_ice_window() {
    let mut rig = glass_rig();
    rig.machine.start_crushing(30.0).unwrap();
    run_until(&mut rig, Status::CrushingIce, 20_000);

    // the ice window is wider than the draft window
    rig.clock.advance_ms(3500);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::CrushingIce);

    rig.clock.advance_ms(2000);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorIngredientEmpty);
    assert!(!rig.world.crusher_running.get());
}

#[test]
fn sugar_dispense_reports_board_timeout() {
    let mut rig = glass_rig();
    rig.machine.start_dispensing_sugar(15.0).unwrap();
    run_until(&mut rig, Status::DispensingSugar, 20_000);
    assert!(rig.world.sugar_running.get());

    rig.world.sugar_error.set(1);
    rig.clock.advance_ms(101);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorSugarTimeout);
}

#[test]
fn clean_is_time_based_and_needs_no_glass() {
    let mut rig = test_rig(MachineCfg::default(), MockAxis::at(0));
    // nothing on the scale: cleaning must not care
    rig.world.weight_g.set(0.0);
    rig.machine.start_clean(2, 500).unwrap();
    run_until(&mut rig, Status::Cleaning, 20_000);
    assert_eq!(rig.pumps.borrow().running.unwrap().0, 2);

    rig.clock.advance_ms(501);
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::Idle);
    assert!(rig.pumps.borrow().running.is_none());
}

#[test]
fn clean_abort_stops_the_pump() {
    let mut rig = glass_rig();
    rig.machine.start_clean(0, 5000).unwrap();
    run_until(&mut rig, Status::Cleaning, 20_000);

    rig.machine.request_abort();
    rig.machine.update();
    assert_eq!(rig.machine.status(), Status::ErrorCommandAborted);
    assert!(rig.pumps.borrow().running.is_none());
}

#[test]
fn pump_driver_failure_surfaces_bus_error() {
    let mut rig = glass_rig();
    rig.pumps.borrow_mut().fail = true;
    rig.machine.start_draft(0, 50.0).unwrap();
    run_until(&mut rig, Status::ErrorBus, 20_000);
}
