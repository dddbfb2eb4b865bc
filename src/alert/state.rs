// src/alert/state.rs
//
// Session-scoped alert deduplication. One instance is owned by the
// polling loop and consulted once per frame; it decides which alert
// channels fire and the loop executes them. Decisions are pure so the
// whole frame-sequence behavior is unit-testable without notifiers.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPhase {
    /// No fire seen this session.
    Idle,
    /// Fire seen at least once. There is no way back to Idle: once a
    /// session has seen fire it stays armed until the process exits.
    Armed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertAction {
    SendSms { first_fire_time: DateTime<Local> },
    PlaySound,
    ShowPopup { first_fire_time: DateTime<Local> },
}

pub struct SessionAlertState {
    phase: AlertPhase,
    first_fire_time: Option<DateTime<Local>>,
    sms_sent: bool,
    popup_shown: bool,
    last_alert_time: Option<Instant>,
    cooldown: Duration,
}

impl SessionAlertState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            phase: AlertPhase::Idle,
            first_fire_time: None,
            sms_sent: false,
            popup_shown: false,
            last_alert_time: None,
            cooldown,
        }
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn first_fire_time(&self) -> Option<DateTime<Local>> {
        self.first_fire_time
    }

    /// Evaluate one frame. `now` is the monotonic clock reading for this
    /// frame; the wall-clock first-fire timestamp is captured internally.
    pub fn observe(&mut self, fire_detected: bool, now: Instant) -> Vec<AlertAction> {
        if !fire_detected {
            // Sticky: no transition back, no latch reset.
            return Vec::new();
        }

        let mut actions = Vec::new();

        if self.phase == AlertPhase::Idle {
            self.phase = AlertPhase::Armed;
            let first = Local::now();
            self.first_fire_time = Some(first);
            info!(
                "🕒 First fire detected at {}",
                first.format("%Y-%m-%d %H:%M:%S")
            );
        }

        // first_fire_time is always Some here; set on the arming frame.
        let first_fire_time = self.first_fire_time.unwrap_or_else(Local::now);

        // SMS: one-shot latch, consumed by the dispatch attempt itself.
        if !self.sms_sent {
            actions.push(AlertAction::SendSms { first_fire_time });
            self.sms_sent = true;
        }

        // Sound: rate-limited by the cooldown window.
        let cooldown_elapsed = self
            .last_alert_time
            .map_or(true, |last| now.duration_since(last) > self.cooldown);
        if cooldown_elapsed {
            actions.push(AlertAction::PlaySound);
            self.last_alert_time = Some(now);
        }

        // Popup: one-shot latch.
        if !self.popup_shown {
            actions.push(AlertAction::ShowPopup { first_fire_time });
            self.popup_shown = true;
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(10);

    fn state() -> SessionAlertState {
        SessionAlertState::new(COOLDOWN)
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    fn has_sms(actions: &[AlertAction]) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, AlertAction::SendSms { .. }))
    }

    fn has_sound(actions: &[AlertAction]) -> bool {
        actions.iter().any(|a| matches!(a, AlertAction::PlaySound))
    }

    fn has_popup(actions: &[AlertAction]) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, AlertAction::ShowPopup { .. }))
    }

    #[test]
    fn test_no_fire_keeps_idle_and_emits_nothing() {
        let mut s = state();
        let base = Instant::now();

        for i in 0..100 {
            assert!(s.observe(false, at(base, i)).is_empty());
        }
        assert_eq!(s.phase(), AlertPhase::Idle);
        assert!(s.first_fire_time().is_none());
    }

    #[test]
    fn test_first_fire_frame_triggers_all_three_channels() {
        let mut s = state();
        let base = Instant::now();

        let actions = s.observe(true, base);
        assert!(has_sms(&actions));
        assert!(has_sound(&actions));
        assert!(has_popup(&actions));
        assert_eq!(s.phase(), AlertPhase::Armed);
    }

    #[test]
    fn test_first_fire_time_set_once_and_never_changes() {
        let mut s = state();
        let base = Instant::now();

        // Fire pattern with gaps; first true is at t=3
        let pattern = [false, false, false, true, true, false, true, true];
        for (i, &fire) in pattern.iter().enumerate() {
            s.observe(fire, at(base, i as u64));
            if i < 3 {
                assert!(s.first_fire_time().is_none());
            }
        }

        let captured = s.first_fire_time().expect("set on first fire frame");

        // Many more fire frames: timestamp is immutable
        for i in 8..60 {
            s.observe(true, at(base, i));
        }
        assert_eq!(s.first_fire_time().unwrap(), captured);
    }

    #[test]
    fn test_sms_and_popup_are_once_per_session() {
        let mut s = state();
        let base = Instant::now();

        let mut sms_count = 0;
        let mut popup_count = 0;
        for i in 0..120 {
            for action in s.observe(true, at(base, i)) {
                match action {
                    AlertAction::SendSms { .. } => sms_count += 1,
                    AlertAction::ShowPopup { .. } => popup_count += 1,
                    AlertAction::PlaySound => {}
                }
            }
        }
        assert_eq!(sms_count, 1);
        assert_eq!(popup_count, 1);
    }

    #[test]
    fn test_sound_respects_cooldown_at_one_fps() {
        let mut s = state();
        let base = Instant::now();

        // Constant fire at 1 frame per second for 60s, cooldown 10s.
        let mut trigger_secs = Vec::new();
        for i in 0..60u64 {
            if has_sound(&s.observe(true, at(base, i))) {
                trigger_secs.push(i);
            }
        }

        // Strict ">" comparison: t=0, then 11, 22, 33, 44, 55
        assert_eq!(trigger_secs, vec![0, 11, 22, 33, 44, 55]);

        // Monotonic with minimum gap above the cooldown
        for pair in trigger_secs.windows(2) {
            assert!(pair[1] - pair[0] > 10);
        }
    }

    #[test]
    fn test_cooldown_only_resets_on_sound_not_on_fire() {
        let mut s = state();
        let base = Instant::now();

        assert!(has_sound(&s.observe(true, base)));
        // Fire frames inside the window never play and never extend it
        for i in 1..=10 {
            assert!(!has_sound(&s.observe(true, at(base, i))));
        }
        assert!(has_sound(&s.observe(true, at(base, 11))));
    }

    #[test]
    fn test_armed_state_is_sticky_across_no_fire_frames() {
        let mut s = state();
        let base = Instant::now();

        s.observe(true, base);
        assert_eq!(s.phase(), AlertPhase::Armed);

        // Long stretch without fire: no actions, no resets
        for i in 1..300 {
            assert!(s.observe(false, at(base, i)).is_empty());
        }
        assert_eq!(s.phase(), AlertPhase::Armed);

        // Fire returns after the cooldown: sound only, latches stay consumed
        let actions = s.observe(true, at(base, 300));
        assert!(!has_sms(&actions));
        assert!(!has_popup(&actions));
        assert!(has_sound(&actions));
    }

    #[test]
    fn test_two_quiet_frames_then_three_fire_frames() {
        // Frames [no-fire, no-fire, fire, fire, fire] at t=0..4, cooldown 10:
        // SMS, sound, popup each exactly once, all at t=2.
        let mut s = state();
        let base = Instant::now();

        assert!(s.observe(false, at(base, 0)).is_empty());
        assert!(s.observe(false, at(base, 1)).is_empty());

        let at_two = s.observe(true, at(base, 2));
        assert!(has_sms(&at_two));
        assert!(has_sound(&at_two));
        assert!(has_popup(&at_two));
        assert_eq!(at_two.len(), 3);

        assert!(s.observe(true, at(base, 3)).is_empty());
        assert!(s.observe(true, at(base, 4)).is_empty());
    }

    #[test]
    fn test_sms_latch_consumed_by_dispatch_attempt() {
        // The latch flips when the action is emitted, not when the
        // notifier succeeds: a failed send never re-emits.
        let mut s = state();
        let base = Instant::now();

        let first = s.observe(true, base);
        assert!(has_sms(&first));
        // Caller's send fails here; the state machine is not told and
        // must not offer the action again.
        for i in 1..50 {
            assert!(!has_sms(&s.observe(true, at(base, i))));
        }
    }

    #[test]
    fn test_popup_and_sms_carry_the_first_fire_time() {
        let mut s = state();
        let base = Instant::now();

        let actions = s.observe(true, base);
        let expected = s.first_fire_time().unwrap();
        for action in actions {
            match action {
                AlertAction::SendSms { first_fire_time }
                | AlertAction::ShowPopup { first_fire_time } => {
                    assert_eq!(first_fire_time, expected)
                }
                AlertAction::PlaySound => {}
            }
        }
    }
}
