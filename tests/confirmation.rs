// Integration tests for the confirmation wait, nozzle idle timeout and reheat

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use krusty_pause::sim::{SimEvent, SimMachine};
    use krusty_pause::{PauseConfig, PauseRequest, Position, XyzPos};
    use tokio_test::assert_ok;

    const RESUME_PROMPT: &str = "Nozzle Parked - Ready to Resume Print?";
    const REHEAT_PROMPT: &str = "Heater Timed Out - Reheat?";

    fn parked(config: &PauseConfig, hotends: usize) -> SimMachine {
        let sim = SimMachine::new(config, hotends);
        sim.set_position(Position::new(100.0, 100.0, 5.0, 20.0));
        sim.set_all_temperatures(210.0, 210.0);
        sim
    }

    fn pause_request() -> PauseRequest {
        PauseRequest::new(-2.0, XyzPos::new(150.0, 150.0, 10.0), 0.0)
    }

    fn buzzes(events: &[SimEvent]) -> usize {
        events.iter().filter(|e| matches!(e, SimEvent::Buzz { .. })).count()
    }

    #[tokio::test]
    async fn test_confirmation_ends_wait() {
        let config = PauseConfig::default();
        let sim = parked(&config, 1);
        sim.confirm_after(Duration::from_secs(3));
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(pause_request()).await);
        controller.wait_for_confirmation(false, 2).await;

        assert!(!controller.wait_handle().is_waiting());
        assert!(sim.prompts().iter().any(|p| p == RESUME_PROMPT));
        assert!(!sim.events().iter().any(|e| matches!(e, SimEvent::IdleTimeout { .. })));
        // two slow beeps, then quick ones every half second until the confirmation
        assert_eq!(buzzes(&sim.events()), 5);
    }

    #[tokio::test]
    async fn test_stale_release_does_not_skip_wait() {
        let config = PauseConfig::default();
        let sim = parked(&config, 1);
        sim.confirm_after(Duration::from_secs(3));
        let mut controller = sim.controller(config);
        let handle = controller.wait_handle();

        assert!(!handle.release());
        let started = sim.now();
        controller.wait_for_confirmation(false, 0).await;
        assert!(sim.now() - started >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_external_release_from_another_handle() {
        let config = PauseConfig::default();
        let sim = parked(&config, 1);
        let mut controller = sim.controller(config);
        let handle = controller.wait_handle();

        let release = async {
            loop {
                tokio::task::yield_now().await;
                if handle.is_waiting() {
                    assert!(handle.release());
                    break;
                }
            }
        };
        tokio::join!(controller.wait_for_confirmation(true, 0), release);

        assert!(!sim.wait_handle().is_waiting());
        assert!(sim.events().iter().any(|e| matches!(
            e,
            SimEvent::Status {
                message: krusty_pause::PauseMessage::Insert,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_idle_timeout_reheats_and_restarts_beeps() {
        let mut config = PauseConfig::default();
        config.pause.nozzle_timeout_secs = 2;
        let sim = parked(&config, 1);
        // first confirmation answers the reheat prompt, second the resume prompt
        sim.confirm_after(Duration::from_secs(10));
        sim.confirm_after(Duration::from_millis(500));
        let mut controller = sim.controller(config);

        assert_ok!(controller.pause_print(pause_request()).await);
        sim.clear_events();
        controller.wait_for_confirmation(false, 2).await;

        let events = sim.events();
        let timeout = events
            .iter()
            .position(|e| *e == SimEvent::IdleTimeout { heater: 0 })
            .expect("idle timeout");
        let reheat_prompt = events
            .iter()
            .position(|e| matches!(e, SimEvent::PromptOpen { text, .. } if text == REHEAT_PROMPT))
            .expect("reheat prompt");
        let restored = events
            .iter()
            .position(|e| *e == SimEvent::TargetTemp { heater: 0, value: 210.0 })
            .expect("target restored");
        let reopened = events
            .iter()
            .rposition(|e| matches!(e, SimEvent::PromptOpen { text, .. } if text == RESUME_PROMPT))
            .expect("resume prompt reopened");
        assert!(timeout < reheat_prompt);
        assert!(reheat_prompt < restored);
        assert!(restored < reopened);

        // the cadence starts over with its first tone
        let next_buzz = events[reopened..]
            .iter()
            .find(|e| matches!(e, SimEvent::Buzz { .. }))
            .expect("buzz after reheat");
        assert_eq!(*next_buzz, SimEvent::Buzz { frequency: 880 });

        assert_eq!(sim.target(0), 210.0);
        assert!(sim.temperature(0) >= 209.0);
        assert!(!controller.wait_handle().is_waiting());
    }

    #[tokio::test]
    async fn test_any_timed_out_hotend_reheats_all() {
        let mut config = PauseConfig::default();
        config.pause.nozzle_timeout_secs = 2;
        let sim = parked(&config, 2);
        sim.set_temperature(1, 190.0, 190.0);
        sim.confirm_after(Duration::from_secs(5));
        sim.confirm_after(Duration::from_millis(200));
        let mut controller = sim.controller(config);

        controller.wait_for_confirmation(false, 0).await;

        let events = sim.events();
        assert!(events.contains(&SimEvent::TargetTemp { heater: 0, value: 210.0 }));
        assert!(events.contains(&SimEvent::TargetTemp { heater: 1, value: 190.0 }));
        let reheat_prompts = sim.prompts().iter().filter(|p| p.as_str() == REHEAT_PROMPT).count();
        assert_eq!(reheat_prompts, 1);
    }

    #[tokio::test]
    async fn test_reheat_wait_has_no_timeout() {
        let mut config = PauseConfig::default();
        config.pause.nozzle_timeout_secs = 1;
        let sim = parked(&config, 1);
        sim.confirm_after(Duration::from_secs(120));
        sim.confirm_after(Duration::from_millis(100));
        let mut controller = sim.controller(config);

        controller.wait_for_confirmation(false, 0).await;

        let timeouts = sim
            .events()
            .iter()
            .filter(|e| matches!(e, SimEvent::IdleTimeout { .. }))
            .count();
        assert_eq!(timeouts, 1);
        assert!(sim.now() >= Duration::from_secs(120));
        assert!(!sim.events().contains(&SimEvent::IdleBudgetExhausted));
    }
}
