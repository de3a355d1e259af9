//! Decode-and-synthesize engine tests
//!
//! Timing checks use lower bounds only where the engine guarantees them;
//! upper bounds are loose enough for a busy test machine.

use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use rust_wk_bridge::config::EngineConfig;
use rust_wk_bridge::engine::{engine_inbox, Engine, EngineInput, EngineState, ExitReason, OverflowPolicy};
use rust_wk_bridge::keys::{KeyingMode, RecordingSink, Transition, VirtualKey};
use rust_wk_bridge::morse::{characters, glyph_for, pattern};
use rust_wk_bridge::timing::profile_for;

struct Harness {
    tx: Sender<EngineInput>,
    sink: RecordingSink,
    engine: thread::JoinHandle<(ExitReason, rust_wk_bridge::engine::EngineStats)>,
}

fn start(config: EngineConfig) -> Harness {
    let (tx, rx) = engine_inbox();
    let sink = RecordingSink::new();
    let mut engine = Engine::new(&config, sink.clone(), rx);
    let status = engine.status();
    let engine = thread::spawn(move || {
        let reason = engine.run();
        (reason, status.snapshot())
    });
    Harness { tx, sink, engine }
}

impl Harness {
    fn send(&self, input: EngineInput) {
        self.tx.send(input).unwrap();
    }

    fn echo(&self, text: &str) {
        for c in text.chars() {
            self.send(EngineInput::Echo(c));
        }
    }

    /// Close the inbox and wait for the queue to drain.
    fn finish(self) -> (ExitReason, rust_wk_bridge::engine::EngineStats, Vec<Transition>) {
        drop(self.tx);
        let (reason, stats) = self.engine.join().unwrap();
        (reason, stats, self.sink.transitions())
    }
}

fn downs(log: &[Transition]) -> Vec<VirtualKey> {
    log.iter().filter(|t| t.down).map(|t| t.key).collect()
}

/// Hold time of each press, in order.
fn holds(log: &[Transition]) -> Vec<Duration> {
    log.chunks(2)
        .map(|pair| {
            assert!(pair[0].down && !pair[1].down, "press/release pairs expected");
            assert_eq!(pair[0].key, pair[1].key);
            pair[1].at - pair[0].at
        })
        .collect()
}

fn assert_never_overlapping(log: &[Transition]) {
    let mut held = [false; 2];
    for t in log {
        let idx = (t.key == VirtualKey::Dah) as usize;
        held[idx] = t.down;
        assert!(!(held[0] && held[1]), "both keys held at once");
    }
}

#[test]
fn test_a_then_b_order_and_ratios() {
    let h = start(EngineConfig::with_wpm(60));
    h.echo("AB");
    let (reason, stats, log) = h.finish();

    assert_eq!(reason, ExitReason::InputClosed);
    assert_eq!(stats.emitted, 2);
    use VirtualKey::{Dah, Dit};
    assert_eq!(downs(&log), vec![Dit, Dah, Dah, Dit, Dit, Dit]);
    assert_never_overlapping(&log);

    let p = profile_for(60);
    let held = holds(&log);
    assert!(held[0] >= p.dit);
    assert!(held[1] >= p.dah);

    // A's last release to B's first press: the character gap.
    let gap = log[4].at - log[3].at;
    assert!(gap >= p.char_gap, "gap {gap:?} shorter than {:?}", p.char_gap);
    // Between the two elements of A: one element gap.
    let inner = log[2].at - log[1].at;
    assert!(inner >= p.element_gap);
    assert!(inner < p.char_gap + Duration::from_millis(40));
}

#[test]
fn test_every_glyph_keys_its_elements_in_order() {
    // One engine per character, run side by side to keep the wall time short.
    let runs: Vec<_> = characters()
        .map(|c| {
            let h = start(EngineConfig::with_wpm(60));
            h.echo(&c.to_string());
            (c, h)
        })
        .collect();

    for (c, h) in runs {
        let (reason, stats, log) = h.finish();
        let glyph = glyph_for(c).unwrap();
        let expected: Vec<_> = pattern(glyph)
            .chars()
            .map(|e| if e == '.' { VirtualKey::Dit } else { VirtualKey::Dah })
            .collect();

        assert_eq!(reason, ExitReason::InputClosed, "{c:?}");
        assert_eq!(stats.emitted, 1, "{c:?}");
        assert_eq!(downs(&log), expected, "{c:?} is {}", pattern(glyph));
        assert_eq!(holds(&log).len(), glyph.len(), "{c:?}");
        assert_never_overlapping(&log);
    }
}

#[test]
fn test_keys_up_after_every_run() {
    let h = start(EngineConfig::with_wpm(60));
    h.echo("SOS");
    let (_, _, log) = h.finish();

    assert_eq!(log.len(), 18);
    assert!(!log.last().unwrap().down);
    assert_never_overlapping(&log);
}

#[test]
fn test_disconnect_mid_element_releases_promptly() {
    let h = start(EngineConfig::with_wpm(5)); // dit = 240 ms
    h.echo("ETT");
    thread::sleep(Duration::from_millis(50));
    h.send(EngineInput::Disconnected);
    let (reason, stats, log) = h.finish();

    assert_eq!(reason, ExitReason::Disconnected);
    assert_eq!(log.len(), 2, "queued characters must be discarded");
    assert!(log[0].down && !log[1].down);
    assert!(log[1].at - log[0].at < Duration::from_millis(200));
    assert_eq!(stats.state, EngineState::Idle);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.emitted, 0);
}

#[test]
fn test_stop_while_idle() {
    let h = start(EngineConfig::default());
    h.send(EngineInput::Stop);
    let (reason, _, log) = h.finish();
    assert_eq!(reason, ExitReason::Stopped);
    assert!(log.is_empty());
}

#[test]
fn test_swap_applies_from_next_character() {
    let h = start(EngineConfig::with_wpm(60));
    h.send(EngineInput::Echo('E'));
    h.send(EngineInput::PaddleSwap(true));
    h.send(EngineInput::Echo('E'));
    let (_, _, log) = h.finish();

    assert_eq!(downs(&log), vec![VirtualKey::Dit, VirtualKey::Dah]);
}

#[test]
fn test_speed_change_applies_from_next_character() {
    let h = start(EngineConfig::with_wpm(20));
    h.send(EngineInput::Echo('T'));
    h.send(EngineInput::Speed(60));
    h.send(EngineInput::Echo('T'));
    let (_, stats, log) = h.finish();

    let held = holds(&log);
    assert!(held[0] >= profile_for(20).dah);
    assert!(held[1] >= profile_for(60).dah);
    assert!(held[1] < profile_for(20).dah, "second T should use the new speed");
    assert_eq!(stats.wpm, 60);
}

#[test]
fn test_doubling_speed_halves_elements() {
    let h = start(EngineConfig::with_wpm(20));
    h.echo("E");
    h.send(EngineInput::Speed(40));
    h.echo("E");
    let (_, _, log) = h.finish();

    let held = holds(&log);
    assert!(held[0] >= Duration::from_millis(60));
    assert!(held[1] >= Duration::from_millis(30));
    assert!(held[1] < Duration::from_millis(60));
}

#[test]
fn test_implausible_speed_ignored() {
    let h = start(EngineConfig::with_wpm(40));
    h.send(EngineInput::Speed(0));
    h.send(EngineInput::Speed(3));
    h.send(EngineInput::Speed(90));
    h.send(EngineInput::Echo('E'));
    let (_, stats, log) = h.finish();

    assert_eq!(stats.speed_noise, 3);
    assert_eq!(stats.wpm, 40);
    assert!(holds(&log)[0] >= profile_for(40).dit);
}

#[test]
fn test_unknown_and_whitespace_dropped() {
    let h = start(EngineConfig::with_wpm(60));
    h.echo(" #e~ ");
    let (_, stats, log) = h.finish();

    assert_eq!(downs(&log), vec![VirtualKey::Dit]);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.emitted, 1);
}

fn overflow_run(policy: OverflowPolicy) -> (rust_wk_bridge::engine::EngineStats, Vec<VirtualKey>) {
    let config = EngineConfig {
        queue_capacity: 2,
        overflow: policy,
        ..EngineConfig::with_wpm(60)
    };
    let h = start(config);
    // E is taken straight into emission; T and I fill the queue; M and S
    // overflow while E is still keying.
    h.echo("ETIMS");
    let (_, stats, log) = h.finish();
    (stats, downs(&log))
}

#[test]
fn test_overflow_drop_newest() {
    use VirtualKey::{Dah, Dit};
    let (stats, keys) = overflow_run(OverflowPolicy::DropNewest);
    assert_eq!(stats.overflows, 2);
    assert_eq!(stats.emitted, 3);
    // E, T, I
    assert_eq!(keys, vec![Dit, Dah, Dit, Dit]);
}

#[test]
fn test_overflow_drop_oldest() {
    use VirtualKey::{Dah, Dit};
    let (stats, keys) = overflow_run(OverflowPolicy::DropOldest);
    assert_eq!(stats.overflows, 2);
    assert_eq!(stats.emitted, 3);
    // E, M, S
    assert_eq!(keys, vec![Dit, Dah, Dah, Dit, Dit, Dit]);
}

#[test]
fn test_straight_mode_keys_one_key() {
    let config = EngineConfig {
        keying_mode: KeyingMode::Straight,
        ..EngineConfig::with_wpm(60)
    };
    let h = start(config);
    h.echo("A");
    let (_, _, log) = h.finish();

    assert_eq!(downs(&log), vec![VirtualKey::Dit, VirtualKey::Dit]);
    let held = holds(&log);
    let p = profile_for(60);
    assert!(held[0] >= p.dit);
    assert!(held[1] >= p.dah);
    // The key must come up between the two elements.
    assert!(log[2].at - log[1].at >= p.element_gap);
}

#[test]
fn test_keying_mode_switch_between_characters() {
    let h = start(EngineConfig::with_wpm(60));
    h.send(EngineInput::KeyingMode(KeyingMode::Straight));
    h.echo("T");
    h.send(EngineInput::KeyingMode(KeyingMode::Iambic));
    h.echo("T");
    let (_, _, log) = h.finish();

    assert_eq!(downs(&log), vec![VirtualKey::Dit, VirtualKey::Dah]);
}

#[test]
fn test_speed_override_and_revert() {
    let h = start(EngineConfig::with_wpm(20));
    h.send(EngineInput::SpeedOverride(Some(60)));
    h.send(EngineInput::Speed(30)); // tracked, not applied
    h.echo("T");
    h.send(EngineInput::SpeedOverride(None));
    h.echo("T");
    let (_, stats, log) = h.finish();

    let held = holds(&log);
    assert!(held[0] >= profile_for(60).dah);
    assert!(held[0] < profile_for(30).dah);
    assert!(held[1] >= profile_for(30).dah);
    assert_eq!(stats.wpm, 30);
}
