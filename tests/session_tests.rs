//! Session wiring tests: fake keyer through link, reader, engine and sink

mod common;

use std::thread;
use std::time::Duration;

use common::{fast_link_config, wait_until, FakeKeyer};
use rust_wk_bridge::config::EngineConfig;
use rust_wk_bridge::engine::ExitReason;
use rust_wk_bridge::fault::FaultCode;
use rust_wk_bridge::keys::{KeyingMode, RecordingSink, VirtualKey};
use rust_wk_bridge::link::Link;
use rust_wk_bridge::logging::log_stream;
use rust_wk_bridge::session::{ControlSurface, Notification, Session, SessionError};

const WAIT: Duration = Duration::from_secs(2);

/// Release must follow a loss well inside one 5 WPM dah (720 ms).
const PROMPT_RELEASE: Duration = Duration::from_millis(300);

fn start(keyer: &FakeKeyer) -> (Session, RecordingSink) {
    start_at(keyer, 60)
}

fn start_at(keyer: &FakeKeyer, wpm: u32) -> (Session, RecordingSink) {
    let link = Link::handshake("fake", keyer.boxed(), &fast_link_config()).unwrap();
    let sink = RecordingSink::new();
    let (log, _drain) = log_stream(64);
    let session = Session::start(link, &EngineConfig::with_wpm(wpm), sink.clone(), log).unwrap();
    (session, sink)
}

/// Start a 5 WPM session and return once the first dah of "TT" is down.
fn start_holding_dah(keyer: &FakeKeyer) -> (Session, RecordingSink) {
    let (session, sink) = start_at(keyer, 5);
    keyer.feed(b"TT");
    assert!(wait_until(WAIT, || sink.len() == 1));
    thread::sleep(Duration::from_millis(50));
    (session, sink)
}

/// The dah was released early and nothing else was keyed.
fn assert_cut_short(sink: &RecordingSink) {
    let log = sink.transitions();
    assert_eq!(log.len(), 2, "transitions: {:?}", log);
    assert_eq!((log[0].key, log[0].down), (VirtualKey::Dah, true));
    assert_eq!((log[1].key, log[1].down), (VirtualKey::Dah, false));
    let held = log[1].at - log[0].at;
    assert!(held < PROMPT_RELEASE, "dah held for {:?}", held);
}

fn drain_notifications(session: &Session) -> Vec<Notification> {
    session.notifications().try_iter().collect()
}

#[test]
fn test_echo_becomes_key_presses() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, sink) = start(&keyer);

    keyer.feed(b"n");
    assert!(wait_until(WAIT, || sink.len() == 4));

    let downs: Vec<_> = sink.transitions().iter().filter(|t| t.down).map(|t| t.key).collect();
    assert_eq!(downs, vec![VirtualKey::Dah, VirtualKey::Dit]);

    let status = session.controller().status();
    assert!(status.connected);
    assert_eq!(status.firmware, 0x23);
    assert_eq!(status.chars_received, 1);

    let notes = drain_notifications(&session);
    assert_eq!(
        notes[0],
        Notification::Connected {
            port: "fake".into(),
            firmware: 0x23
        }
    );
    assert!(notes.contains(&Notification::Decoded('N')));
}

#[test]
fn test_pot_reading_reaches_engine() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, _sink) = start(&keyer);
    let controller = session.controller();

    keyer.feed(&[0x80 | 0x1F]);
    assert!(wait_until(WAIT, || controller.status().pot_wpm == 30));
    assert!(wait_until(WAIT, || controller.status().engine.wpm == 30));
}

#[test]
fn test_status_byte_kept_for_diagnostics() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, _sink) = start(&keyer);
    let controller = session.controller();

    keyer.feed(&[0xC4]);
    assert!(wait_until(WAIT, || controller.status().last_status.is_some()));
    assert!(controller.status().last_status.unwrap().busy());
}

#[test]
fn test_device_loss_raises_fault() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, sink) = start(&keyer);
    let controller = session.controller();

    keyer.unplug();
    assert!(wait_until(WAIT, || !controller.status().connected));

    let notes: Vec<_> = session.notifications().iter().collect();
    assert!(notes.contains(&Notification::Fault(FaultCode::Disconnected)));
    assert_eq!(session.wait(), ExitReason::Disconnected);

    let status = controller.status();
    assert!(status.fault.active);
    assert_eq!(status.fault.code, FaultCode::Disconnected);
    assert!(sink.is_empty());

    // Nothing to control any more.
    assert!(matches!(controller.set_paddle_swap(true), Err(SessionError::Ended)));
    assert!(controller.disconnect().is_ok());
}

#[test]
fn test_unplug_during_held_dah_releases_promptly() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, sink) = start_holding_dah(&keyer);
    let controller = session.controller();

    keyer.unplug();
    assert_eq!(session.wait(), ExitReason::Disconnected);

    assert_cut_short(&sink);
    let status = controller.status();
    assert!(!status.connected);
    assert_eq!(status.fault.code, FaultCode::Disconnected);
}

#[test]
fn test_user_disconnect_during_held_dah_releases_promptly() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, sink) = start_holding_dah(&keyer);
    let controller = session.controller();

    controller.disconnect().unwrap();
    let reason = session.wait();

    assert!(matches!(reason, ExitReason::Stopped | ExitReason::Disconnected));
    assert_cut_short(&sink);
    assert!(!controller.status().fault.active);
}

#[test]
fn test_user_disconnect_closes_keyer_session() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, _sink) = start(&keyer);
    let controller = session.controller();
    let before = keyer.written().len();

    controller.disconnect().unwrap();
    let reason = session.wait();

    assert!(matches!(reason, ExitReason::Stopped | ExitReason::Disconnected));
    assert_eq!(&keyer.written()[before..], &[0x01, 0x04, 0x00, 0x03]);
    let status = controller.status();
    assert!(!status.connected);
    assert!(!status.fault.active);

    // Second disconnect is a no-op.
    assert!(controller.disconnect().is_ok());
    assert_eq!(keyer.written().len(), before + 4);
}

#[test]
fn test_controller_commands_reach_keyer() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, _sink) = start(&keyer);
    let controller = session.controller();
    let before = keyer.written().len();

    controller.set_speed_override(Some(30)).unwrap();
    controller.set_mute_sidetone(false).unwrap();
    controller.set_speed_override(None).unwrap();

    assert_eq!(&keyer.written()[before..], &[0x02, 30, 0x01, 0x04, 0x02, 0x00]);
    let status = controller.status();
    assert_eq!(status.speed_override, None);
    assert!(!status.sidetone_muted);

    assert!(matches!(
        controller.set_speed_override(Some(99)),
        Err(SessionError::InvalidSpeed(99))
    ));
}

#[test]
fn test_device_paddle_swap_rewrites_mode_register() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, _sink) = start(&keyer);
    let controller = session.controller();
    assert!(controller.status().device_paddle_swap);
    let before = keyer.written().len();

    controller.set_device_paddle_swap(false).unwrap();
    assert!(!controller.status().device_paddle_swap);
    controller.set_device_paddle_swap(true).unwrap();

    assert_eq!(&keyer.written()[before..], &[0x0E, 0xC6, 0x0E, 0xCE]);
    assert!(controller.status().device_paddle_swap);
}

#[test]
fn test_swap_and_mode_reflected_in_status() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, sink) = start(&keyer);
    let controller = session.controller();

    controller.set_paddle_swap(true).unwrap();
    controller.set_keying_mode(KeyingMode::Straight).unwrap();
    let status = controller.status();
    assert!(status.paddle_swap);
    assert_eq!(status.keying_mode, KeyingMode::Straight);

    // Straight and swapped: every element on DAH-key.
    keyer.feed(b"A");
    assert!(wait_until(WAIT, || sink.len() == 4));
    assert!(sink.transitions().iter().all(|t| t.key == VirtualKey::Dah));
}

#[test]
fn test_drop_releases_and_closes() {
    let keyer = FakeKeyer::answering(0x23);
    let (session, _sink) = start(&keyer);
    drop(session);
    assert!(keyer.written().ends_with(&[0x00, 0x03]));
}
