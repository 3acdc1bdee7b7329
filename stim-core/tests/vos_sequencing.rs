use stim_core::config::{ScheduleConfig, StimConfig, UNSCHEDULED, VOS_FLOOR, VosConfig};
use stim_core::scheduler::{TickAction, TickScheduler};
use stim_core::shared::SharedState;
use stim_core::sim::{BoardEvent, SimulatedBoard};
use stim_core::vos::VOS_DAC_COMMAND;
use stim_core::waveform::{MemoryPatternStore, PulseSetpoint};
use stim_core::{ChannelId, OperatingMode, StimController, StimShared};

fn anode_rig() -> (StimShared<SimulatedBoard>, StimController<MemoryPatternStore>) {
    let config = StimConfig {
        vos: VosConfig::new(1200, 2400, 10, 4, true).expect("valid supply"),
        schedule: ScheduleConfig::from_raw([4, UNSCHEDULED, UNSCHEDULED, UNSCHEDULED], [1; 4]),
        ..StimConfig::default()
    };
    let shared = StimShared::new(SharedState::new(config), SimulatedBoard::new());
    let mut controller = StimController::new(MemoryPatternStore::new());
    controller.set_direct_setpoint(ChannelId::Ch1, PulseSetpoint::new(40, 60));
    (shared, controller)
}

fn vos_levels(board: &SimulatedBoard) -> heapless::Vec<u16, 32> {
    board
        .events()
        .iter()
        .filter_map(|event| match event {
            BoardEvent::VosDac([command, high, low]) => {
                assert_eq!(*command, VOS_DAC_COMMAND);
                Some(u16::from_be_bytes([*high, *low]) >> 4)
            }
            _ => None,
        })
        .collect()
}

#[test]
fn mode_entry_ramps_supply_from_floor() {
    let (shared, mut controller) = anode_rig();
    controller
        .enter_mode(&shared, OperatingMode::YManual, 0)
        .expect("entry from waiting");

    shared.with(|cell| {
        let levels = vos_levels(&cell.hardware);
        assert_eq!(levels.first(), Some(&VOS_FLOOR));
        assert_eq!(levels.last(), Some(&1200));
        assert_eq!(levels.len(), 11);
        assert!(levels.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(cell.hardware.vos_enabled());
        assert!(cell.state.vos.ramp_complete());
    });
}

#[test]
fn supply_follows_the_stimulation_window() {
    let (shared, mut controller) = anode_rig();
    let mut scheduler = TickScheduler::new();
    controller
        .enter_mode(&shared, OperatingMode::YManual, 0)
        .expect("entry from waiting");
    controller.handle_sync(&shared, &[]);
    shared.with(|cell| cell.hardware.clear_events());

    assert_eq!(scheduler.run_tick(&shared), TickAction::Idle);
    controller.update(&shared);
    assert_eq!(scheduler.run_tick(&shared), TickAction::VosRampUp);
    shared.with(|cell| {
        assert_eq!(cell.hardware.events()[0], BoardEvent::AnodeConnected(true));
        assert_eq!(vos_levels(&cell.hardware).as_slice(), &[1500, 1800, 2100, 2400]);
        cell.hardware.clear_events();
    });

    assert_eq!(scheduler.run_tick(&shared), TickAction::Idle);
    assert!(matches!(
        scheduler.run_tick(&shared),
        TickAction::PulseFired {
            vos_ramped_down: true,
            ..
        }
    ));
    shared.with(|cell| {
        assert!(!cell.hardware.anode_connected());
        assert_eq!(cell.hardware.vos_level(), Some(1200));
        assert_eq!(vos_levels(&cell.hardware).as_slice(), &[1200]);
    });
}

#[test]
fn idle_supply_is_switched_off_after_discharge() {
    let (shared, mut controller) = anode_rig();
    let mut scheduler = TickScheduler::new();
    controller
        .enter_mode(&shared, OperatingMode::YManual, 0)
        .expect("entry from waiting");
    controller.handle_sync(&shared, &[]);
    for _ in 0..4 {
        scheduler.run_tick(&shared);
        controller.update(&shared);
    }
    assert_eq!(scheduler.discharge_counter(), 0);

    controller
        .enter_mode(&shared, OperatingMode::Waiting, 0)
        .expect("waiting is always allowed");
    for _ in 0..10 {
        assert_eq!(scheduler.run_tick(&shared), TickAction::Idle);
    }
    assert_eq!(scheduler.run_tick(&shared), TickAction::DeEnergized);
    assert_eq!(scheduler.run_tick(&shared), TickAction::AwaitingVos);
    shared.with(|cell| {
        assert!(!cell.hardware.vos_enabled());
        assert!(cell.hardware.stim_enabled());
        assert_eq!(cell.state.vos.level(), None);
    });

    controller
        .enter_mode(&shared, OperatingMode::YManual, 0)
        .expect("re-entry from waiting");
    assert!(shared.with(|cell| cell.hardware.vos_enabled()));
}

#[test]
fn hibernate_switches_the_supply_off_like_waiting() {
    let (shared, mut controller) = anode_rig();
    let mut scheduler = TickScheduler::new();
    controller
        .enter_mode(&shared, OperatingMode::YManual, 0)
        .expect("entry from waiting");
    controller
        .enter_mode(&shared, OperatingMode::Hibernate, 0)
        .expect("hibernate is always allowed");

    let mut de_energized = 0;
    for _ in 0..1000 {
        if scheduler.run_tick(&shared) == TickAction::DeEnergized {
            de_energized += 1;
        }
        controller.update(&shared);
    }

    assert_eq!(de_energized, 1);
    shared.with(|cell| {
        assert!(!cell.hardware.vos_enabled());
        assert!(!cell.state.vos.ramp_complete());
    });
}

#[test]
fn empty_schedule_never_raises_the_supply() {
    let config = StimConfig {
        vos: VosConfig::new(1200, 2400, 10, 4, true).expect("valid supply"),
        schedule: ScheduleConfig::from_raw([UNSCHEDULED; 4], [1; 4]),
        ..StimConfig::default()
    };
    let shared = StimShared::new(SharedState::new(config), SimulatedBoard::new());
    let mut controller = StimController::new(MemoryPatternStore::new());
    let mut scheduler = TickScheduler::new();
    controller
        .enter_mode(&shared, OperatingMode::YManual, 0)
        .expect("entry from waiting");

    for _ in 0..3 {
        controller.handle_sync(&shared, &[]);
        for _ in 0..20 {
            assert_ne!(scheduler.run_tick(&shared), TickAction::VosRampUp);
            controller.update(&shared);
        }
    }

    shared.with(|cell| {
        assert_eq!(cell.hardware.vos_level(), Some(1200));
        assert!(!cell.hardware.anode_connected());
    });
}
