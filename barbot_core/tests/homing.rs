use barbot_core::mocks::{MockAxis, TestRig, test_rig};
use barbot_core::{MachineCfg, Status};
use rstest::rstest;

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

#[rstest]
#[case(0)]
#[case(3)]
#[case(57)]
#[case(500)]
#[case(12_000)]
#[case(-40)]
fn homing_ends_at_zero_from_any_position(#[case] start: i64) {
    let mut rig = test_rig(MachineCfg::default(), MockAxis::at(start));
    rig.world.weight_g.set(400.0);
    rig.machine.begin();
    assert_eq!(rig.machine.status(), Status::HomingRough);

    run_until(&mut rig, Status::Idle, 200_000);
    assert_eq!(rig.machine.position_mm(), 0.0);
    assert_eq!(rig.machine.target_position_mm(), 0.0);
    assert!(rig.machine.is_started());
}

#[test]
fn homing_can_be_requested_again_later() {
    let mut rig = test_rig(MachineCfg::default(), MockAxis::at(100));
    rig.machine.begin();
    run_until(&mut rig, Status::Idle, 200_000);

    // drive somewhere, then home again
    rig.machine.start_moveto(50.0).unwrap();
    run_until(&mut rig, Status::Idle, 10_000);
    assert!(rig.machine.position_mm() > 0.0);

    rig.machine.start_homing().unwrap();
    run_until(&mut rig, Status::Idle, 200_000);
    assert_eq!(rig.machine.position_mm(), 0.0);
}

#[test]
fn homing_is_refused_while_busy() {
    let mut rig = test_rig(MachineCfg::default(), MockAxis::at(0));
    rig.machine.begin();
    run_until(&mut rig, Status::Idle, 200_000);

    rig.machine.start_moveto(100.0).unwrap();
    let err = rig.machine.start_homing().expect_err("machine is moving");
    assert!(matches!(err, barbot_core::StartError::Busy(_)));
}

#[test]
fn startup_flag_clears_only_after_first_homing() {
    let mut rig = test_rig(MachineCfg::default(), MockAxis::at(10));
    assert!(!rig.machine.is_started());
    rig.machine.begin();
    assert!(!rig.machine.is_started());
    run_until(&mut rig, Status::Idle, 200_000);
    assert!(rig.machine.is_started());
}
