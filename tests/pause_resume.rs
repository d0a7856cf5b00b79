// Integration tests for pausing and resuming a print against the simulated machine

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use krusty_pause::sim::{SimEvent, SimMachine};
    use krusty_pause::{
        HostAction, PauseConfig, PauseError, PauseRequest, Position, ResumeParams, XyzPos,
    };
    use tokio_test::{assert_err, assert_ok};

    fn hot_machine(config: &PauseConfig) -> SimMachine {
        let sim = SimMachine::new(config, 1);
        sim.set_position(Position::new(100.0, 100.0, 5.0, 20.0));
        sim.set_all_temperatures(210.0, 210.0);
        sim
    }

    fn scenario_request() -> PauseRequest {
        PauseRequest::new(-2.0, XyzPos::new(150.0, 150.0, 10.0), -50.0)
    }

    fn index_of(events: &[SimEvent], wanted: impl Fn(&SimEvent) -> bool) -> Option<usize> {
        events.iter().position(wanted)
    }

    #[tokio::test]
    async fn test_pause_parks_before_unload_and_disables_extruder() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(scenario_request()).await);
        assert_eq!(controller.session().depth(), 1);
        assert_eq!(
            controller.session().resume_position(),
            Some(Position::new(100.0, 100.0, 5.0, 20.0))
        );

        let events = sim.events();
        let park = index_of(&events, |e| matches!(e, SimEvent::Park { x, y, z } if *x == 150.0 && *y == 150.0 && *z == 10.0));
        let unload_accel = index_of(&events, |e| matches!(e, SimEvent::RetractAccel { value } if *value == 25.0));
        assert!(park.is_some());
        assert!(unload_accel.is_some());
        assert!(park < unload_accel);
        assert_eq!(events.last(), Some(&SimEvent::ExtruderDisabled { extruder: 0 }));
        assert!(sim.extruder_disabled(0));

        // retract, two park legs, purge retract, purge, unload
        let moves = sim.moves();
        assert_eq!(moves.len(), 6);
        assert_eq!(moves[0].target.e, 18.0);
        assert_eq!(moves[2].target, Position::new(150.0, 150.0, 10.0, 18.0));
        assert_eq!(moves[5].target.e, -24.0);
        assert_eq!(moves[5].feedrate, 10.0);
    }

    #[tokio::test]
    async fn test_second_pause_is_rejected_without_side_effects() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(scenario_request()).await);
        let events_before = sim.events().len();
        let targets_before = sim.target(0);

        let err = assert_err!(controller.pause_print(scenario_request()).await);
        assert_eq!(err, PauseError::AlreadyPaused { depth: 1 });
        assert_eq!(controller.session().depth(), 1);
        assert_eq!(sim.events().len(), events_before);
        assert_eq!(sim.target(0), targets_before);
    }

    #[tokio::test]
    async fn test_resume_restores_position_and_extrusion() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(scenario_request()).await);
        sim.confirm_after(Duration::from_secs(1));
        controller.wait_for_confirmation(false, 0).await;
        assert_ok!(controller.resume_print(ResumeParams::default()).await);

        assert!(!controller.session().is_paused());
        assert_eq!(controller.session().resume_position(), None);
        assert_eq!(sim.position(), Position::new(100.0, 100.0, 5.0, 20.0));
        assert!(sim.events().contains(&SimEvent::SetExtruderPosition { e: 20.0 }));

        // XY travel happens at park height, Z comes down afterwards
        let moves = sim.moves();
        let xy = moves
            .iter()
            .rposition(|m| m.target.x == 100.0 && m.target.y == 100.0 && m.target.z == 10.0)
            .expect("xy move");
        assert_eq!(moves[xy].feedrate, 100.0);
        assert_eq!(moves[xy + 1].target.z, 5.0);
        assert_eq!(moves[xy + 1].feedrate, 5.0);
    }

    #[tokio::test]
    async fn test_pause_and_resume_toggle_timer_fans_and_host() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(scenario_request()).await);
        assert!(sim.timer_paused());
        assert!(sim.fans_paused());

        assert_ok!(controller.resume_print(ResumeParams::default()).await);
        assert!(!sim.timer_paused());
        assert!(!sim.fans_paused());
        assert_eq!(sim.host_actions(), vec![HostAction::Paused, HostAction::Resumed]);
        let prompts = sim.prompts();
        assert_eq!(prompts.first().map(String::as_str), Some("Pause"));
        assert_eq!(prompts.last().map(String::as_str), Some("Resuming"));
    }

    #[tokio::test]
    async fn test_resume_without_pause_does_nothing() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.resume_print(ResumeParams::default()).await);
        assert!(sim.events().is_empty());
        assert_eq!(controller.session().depth(), 0);
    }

    #[tokio::test]
    async fn test_media_pause_adds_depth_and_checkpoints() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config).with_media().with_recovery();
        sim.set_media_active(true);
        let mut controller = sim.controller(config);

        let request = PauseRequest::new(-2.0, XyzPos::new(10.0, 190.0, 20.0), 0.0);
        assert_ok!(controller.pause_print(request).await);
        assert_eq!(controller.session().depth(), 2);
        assert!(!sim.media_active());

        let events = sim.events();
        let checkpoint = index_of(&events, |e| {
            matches!(e, SimEvent::Checkpoint { paused: true, park_raise, will_park: true } if *park_raise == 15.0)
        });
        let park = index_of(&events, |e| matches!(e, SimEvent::Park { .. }));
        assert!(checkpoint.is_some());
        assert!(checkpoint < park);

        assert_ok!(controller.resume_print(ResumeParams::default()).await);
        assert_eq!(controller.session().depth(), 0);
        assert!(sim.media_active());
        let events = sim.events();
        assert!(events.contains(&SimEvent::MediaResumed));
        assert!(events.contains(&SimEvent::Checkpoint {
            paused: false,
            park_raise: 0.0,
            will_park: false
        }));
    }

    #[tokio::test]
    async fn test_unhomed_pause_skips_park_and_uses_zraise() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config).with_media().with_recovery();
        sim.set_media_active(true);
        sim.set_homed(false);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(PauseRequest::new(-2.0, XyzPos::new(10.0, 190.0, 20.0), 0.0)).await);
        let events = sim.events();
        assert!(!events.iter().any(|e| matches!(e, SimEvent::Park { .. })));
        assert!(events.contains(&SimEvent::Checkpoint {
            paused: true,
            park_raise: 2.0,
            will_park: false
        }));

        // no travel back either, only the extruder moves
        assert_ok!(controller.resume_print(ResumeParams::default()).await);
        assert!(sim.moves().iter().all(|m| m.target.x == 100.0 && m.target.z == 5.0));
    }

    #[tokio::test]
    async fn test_failed_checkpoint_does_not_stop_pause() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config).with_media().with_recovery();
        sim.set_media_active(true);
        sim.set_recovery(true, true);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(scenario_request()).await);
        assert!(!sim.events().iter().any(|e| matches!(e, SimEvent::Checkpoint { .. })));
        assert_eq!(controller.session().depth(), 2);
    }

    #[tokio::test]
    async fn test_cold_pause_skips_retract_and_unload() {
        let config = PauseConfig::default();
        let sim = SimMachine::new(&config, 1);
        sim.set_position(Position::new(100.0, 100.0, 5.0, 20.0));
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(scenario_request()).await);
        assert!(sim.moves().iter().all(|m| m.target.e == 20.0));
        assert_eq!(sim.moves().len(), 2);
        assert!(sim.extruder_disabled(0));
        assert_eq!(controller.session().depth(), 1);
    }

    #[tokio::test]
    async fn test_duplication_restored_after_unload() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config).with_dual_carriage();
        sim.set_duplication(true);
        let mut controller = sim.controller(config);

        let mut request = scenario_request();
        request.dxc_extruder = Some(1);
        assert_ok!(controller.pause_print(request).await);

        let events = sim.events();
        let off = index_of(&events, |e| *e == SimEvent::Duplication { enabled: false, extruder: 1 });
        let on = index_of(&events, |e| *e == SimEvent::Duplication { enabled: true, extruder: 0 });
        assert!(off.is_some() && on.is_some());
        assert!(off < on);
        assert!(sim.duplication());
    }

    #[tokio::test]
    async fn test_motion_failure_propagates_but_keeps_depth() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        sim.fail_moves_after(1);
        let mut controller = sim.controller(config);

        let err = assert_err!(controller.pause_print(scenario_request()).await);
        assert!(matches!(err, PauseError::Motion(_)));
        assert!(controller.session().is_paused());
    }

    #[tokio::test]
    async fn test_failed_return_keeps_position_for_retry() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(PauseRequest::new(-2.0, XyzPos::new(150.0, 150.0, 10.0), 0.0)).await);
        // retract and two park legs went through; the XY travel back is refused
        sim.fail_moves_after(4);
        let err = assert_err!(controller.resume_print(ResumeParams::default()).await);
        assert!(matches!(err, PauseError::Motion(_)));
        assert_eq!(controller.session().depth(), 1);
        assert_eq!(
            controller.session().resume_position(),
            Some(Position::new(100.0, 100.0, 5.0, 20.0))
        );

        sim.with_state(|state| state.fail_moves_after = None);
        assert_ok!(controller.resume_print(ResumeParams::default()).await);
        assert!(!controller.session().is_paused());
        assert_eq!(controller.session().resume_position(), None);
        assert_eq!(sim.position(), Position::new(100.0, 100.0, 5.0, 20.0));
    }

    #[tokio::test]
    async fn test_park_uses_configured_feedrates() {
        let mut config = PauseConfig::default();
        config.pause.park_xy_feedrate = 80.0;
        config.pause.park_z_feedrate = 8.0;
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(PauseRequest::new(-2.0, XyzPos::new(150.0, 150.0, 10.0), 0.0)).await);
        let feedrates: Vec<f64> = sim.moves().iter().map(|m| m.feedrate).collect();
        assert_eq!(feedrates, vec![60.0, 8.0, 80.0]);
    }

    #[tokio::test]
    async fn test_resume_compensates_negative_e_and_fwretract() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config).with_fwretract();
        sim.set_position(Position::new(100.0, 100.0, 5.0, -1.5));
        sim.set_fw_retracted(true);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(PauseRequest::new(-2.0, XyzPos::new(150.0, 150.0, 10.0), 0.0)).await);
        sim.clear_events();
        assert_ok!(controller.resume_print(ResumeParams::default()).await);

        let moves = sim.moves();
        // retract, xy, z, unretract, firmware retract, residual
        assert_eq!(moves.len(), 6);
        assert_eq!(moves[4].feedrate, 45.0);
        assert_eq!(moves[5].target.e - moves[4].target.e, -1.5);
        assert!(sim.events().contains(&SimEvent::SetExtruderPosition { e: -1.5 }));
        assert_eq!(sim.position().e, -1.5);
    }

    #[tokio::test]
    async fn test_resume_after_nozzle_timeout_waits_for_load_confirmation() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(PauseRequest::new(-2.0, XyzPos::new(150.0, 150.0, 10.0), 0.0)).await);
        sim.with_state(|state| {
            state.heaters[0].idle.start(Duration::ZERO, Duration::ZERO);
            state.heaters[0].idle.update(Duration::ZERO);
        });
        sim.confirm_after(Duration::from_secs(1));

        assert_ok!(controller.resume_print(ResumeParams::default()).await);
        assert!(sim.prompts().iter().any(|p| p == "Load Filament T0"));
        assert!(sim.events().iter().any(|e| matches!(e, SimEvent::Confirmed { .. })));
        assert!(!controller.wait_handle().is_waiting());
    }

    #[tokio::test]
    async fn test_resume_heats_to_requested_temperature() {
        let config = PauseConfig::default();
        let sim = hot_machine(&config);
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(scenario_request()).await);
        let params = ResumeParams {
            target_temp: 230.0,
            ..ResumeParams::default()
        };
        assert_ok!(controller.resume_print(params).await);
        assert_eq!(sim.target(0), 230.0);
        assert!(sim.temperature(0) >= 229.0);
    }
}
