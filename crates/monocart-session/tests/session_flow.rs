//! End-to-end session flow against a scripted core: bring-up through
//! the readiness barrier, background persistence, relaunch restore,
//! and input routing.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use monocart_core::{
    CoreError, CoreEvent, CoreFactory, CoreFault, CoreView, CoreViewData, KeyAction, MotionSource,
};
use monocart_session::{
    GameStorage, InputConfig, InputRouter, MotionAxes, RestoreOutcome, RetryPolicy, RomIdentity,
    Session, SessionConfig, SessionError, Shell, ShellRequest, Slot, input::keycodes,
    persist_sram, persist_state, restore,
};

/// Observable state shared between a test and the core it scripted.
#[derive(Default)]
struct CoreState {
    /// Blob returned by `serialize_state`.
    state: Mutex<Vec<u8>>,
    sram: Mutex<Vec<u8>>,
    /// Blob most recently accepted by `unserialize_state`.
    applied: Mutex<Option<Vec<u8>>>,
    /// Number of leading `unserialize_state` calls to reject.
    reject_restores: AtomicU32,
    unserialize_calls: AtomicU32,
    key_events: Mutex<Vec<(KeyAction, i32, u8)>>,
    motion_events: Mutex<Vec<(MotionSource, f32, f32, u8)>>,
    audio_enabled: AtomicBool,
    frame_speed: AtomicU32,
}

struct ScriptedCore {
    state: Arc<CoreState>,
    events: Receiver<CoreEvent>,
}

impl CoreView for ScriptedCore {
    fn send_key_event(&self, action: KeyAction, keycode: i32, port: u8) {
        self.state
            .key_events
            .lock()
            .unwrap()
            .push((action, keycode, port));
    }

    fn send_motion_event(&self, source: MotionSource, x: f32, y: f32, port: u8) {
        self.state
            .motion_events
            .lock()
            .unwrap()
            .push((source, x, y, port));
    }

    fn serialize_state(&self) -> Result<Vec<u8>, CoreError> {
        Ok(self.state.state.lock().unwrap().clone())
    }

    fn unserialize_state(&self, bytes: &[u8]) -> bool {
        let call = self.state.unserialize_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.state.reject_restores.load(Ordering::SeqCst) {
            return false;
        }
        *self.state.applied.lock().unwrap() = Some(bytes.to_vec());
        true
    }

    fn serialize_sram(&self) -> Vec<u8> {
        self.state.sram.lock().unwrap().clone()
    }

    fn reset(&self) {}

    fn audio_enabled(&self) -> bool {
        self.state.audio_enabled.load(Ordering::SeqCst)
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.state.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    fn frame_speed(&self) -> u32 {
        self.state.frame_speed.load(Ordering::SeqCst)
    }

    fn set_frame_speed(&self, speed: u32) {
        self.state.frame_speed.store(speed, Ordering::SeqCst);
    }

    fn events(&self) -> Receiver<CoreEvent> {
        self.events.clone()
    }
}

struct ScriptedFactory {
    state: Arc<CoreState>,
    events_rx: Receiver<CoreEvent>,
    fail: Option<CoreFault>,
}

impl CoreFactory for ScriptedFactory {
    fn construct(&self, _data: CoreViewData) -> Result<Box<dyn CoreView>, CoreFault> {
        if let Some(fault) = self.fail {
            return Err(fault);
        }
        Ok(Box::new(ScriptedCore {
            state: Arc::clone(&self.state),
            events: self.events_rx.clone(),
        }))
    }
}

struct Rig {
    state: Arc<CoreState>,
    events_tx: Sender<CoreEvent>,
    session: Arc<Session>,
    faults: Receiver<CoreFault>,
}

impl Rig {
    fn new(config: SessionConfig) -> Self {
        Self::with_state(config, Arc::new(CoreState {
            audio_enabled: AtomicBool::new(true),
            frame_speed: AtomicU32::new(1),
            ..CoreState::default()
        }))
    }

    fn with_state(config: SessionConfig, state: Arc<CoreState>) -> Self {
        let _ = tracing_subscriber::fmt::try_init();

        let (events_tx, events_rx) = unbounded();
        let factory = ScriptedFactory {
            state: Arc::clone(&state),
            events_rx,
            fail: None,
        };
        let (fault_tx, faults) = unbounded();
        let session = Session::create(&factory, dummy_data(), config, move |f| {
            let _ = fault_tx.send(f);
        })
        .expect("session create");
        Self {
            state,
            events_tx,
            session,
            faults,
        }
    }

    /// Renders the first frame and waits until the barrier opens.
    fn make_ready(&self) {
        self.events_tx.send(CoreEvent::FrameRendered).expect("send frame");
        self.session.barrier().wait().expect("barrier open");
    }
}

fn dummy_data() -> CoreViewData {
    CoreViewData::new(
        monocart_core::ByteSource::from_bytes(b"core".to_vec()),
        monocart_core::ByteSource::from_bytes(b"rom".to_vec()),
    )
}

fn instant_config() -> SessionConfig {
    SessionConfig {
        settle_delay: Duration::ZERO,
    }
}

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        backoff: Duration::from_millis(1),
    }
}

fn open_store() -> (tempfile::TempDir, Arc<GameStorage>) {
    let root = tempfile::tempdir().expect("tempdir");
    let store = GameStorage::open(root.path(), &RomIdentity::Fixed("test-game".into()))
        .expect("open storage");
    (root, Arc::new(store))
}

#[test]
fn barrier_opens_once_despite_repeated_frames() {
    let rig = Rig::new(instant_config());
    assert!(!rig.session.is_ready());

    rig.make_ready();
    for _ in 0..3 {
        rig.events_tx.send(CoreEvent::FrameRendered).expect("send frame");
    }

    assert!(rig.session.is_ready());
    rig.session.barrier().wait().expect("stays open");
    assert!(rig.session.fault().is_none());
}

#[test]
fn barrier_release_honors_settle_delay() {
    let delay = Duration::from_millis(50);
    let rig = Rig::new(SessionConfig {
        settle_delay: delay,
    });

    let start = Instant::now();
    rig.make_ready();
    assert!(start.elapsed() >= delay);
}

#[test]
fn fault_before_first_frame_poisons_the_barrier() {
    let rig = Rig::new(instant_config());

    rig.events_tx
        .send(CoreEvent::Fault(CoreFault::LoadGame))
        .expect("send fault");

    assert_eq!(rig.session.barrier().wait(), Err(CoreFault::LoadGame));
    assert!(!rig.session.is_ready());
    assert_eq!(
        rig.faults.recv_timeout(Duration::from_secs(1)),
        Ok(CoreFault::LoadGame)
    );
    assert_eq!(rig.session.fault(), Some(CoreFault::LoadGame));
}

#[test]
fn construction_failure_is_fatal_and_never_retried() {
    let (_, events_rx) = unbounded();
    let factory = ScriptedFactory {
        state: Arc::new(CoreState::default()),
        events_rx,
        fail: Some(CoreFault::LoadCore),
    };

    let result = Session::create(&factory, dummy_data(), instant_config(), |_| {});
    assert!(matches!(result, Err(SessionError::Construct(CoreFault::LoadCore))));
}

#[test]
fn cold_start_has_nothing_to_restore() {
    let rig = Rig::new(instant_config());
    rig.make_ready();
    let (_root, store) = open_store();

    let outcome = restore(&rig.session, &store, Slot::TempState, fast_policy(10))
        .expect("restore");
    assert_eq!(outcome, RestoreOutcome::Absent);
    assert_eq!(rig.state.unserialize_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn persist_before_ready_is_rejected() {
    let rig = Rig::new(instant_config());
    let (_root, store) = open_store();

    assert!(matches!(
        persist_sram(&rig.session, &store),
        Err(SessionError::NotReady)
    ));
    assert!(matches!(
        persist_state(&rig.session, &store, Slot::State),
        Err(SessionError::NotReady)
    ));
    assert!(matches!(
        restore(&rig.session, &store, Slot::TempState, fast_policy(1)),
        Err(SessionError::NotReady)
    ));
}

#[test]
fn restore_retries_until_the_core_accepts() {
    let rig = Rig::new(instant_config());
    rig.make_ready();
    rig.state.reject_restores.store(2, Ordering::SeqCst);

    let (_root, store) = open_store();
    store.write(Slot::State, b"snapshot").expect("write state");

    let outcome = restore(&rig.session, &store, Slot::State, fast_policy(10))
        .expect("restore");
    assert_eq!(outcome, RestoreOutcome::Applied);
    assert_eq!(rig.state.unserialize_calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        rig.state.applied.lock().unwrap().as_deref(),
        Some(b"snapshot".as_slice())
    );
}

#[test]
fn restore_gives_up_after_the_attempt_bound() {
    let rig = Rig::new(instant_config());
    rig.make_ready();
    rig.state.reject_restores.store(u32::MAX, Ordering::SeqCst);

    let (_root, store) = open_store();
    store.write(Slot::TempState, b"snapshot").expect("write state");

    let outcome = restore(&rig.session, &store, Slot::TempState, fast_policy(10))
        .expect("restore");
    assert_eq!(outcome, RestoreOutcome::GaveUp);
    assert_eq!(rig.state.unserialize_calls.load(Ordering::SeqCst), 10);
    // Non-fatal: the session keeps running with fresh state.
    assert!(rig.session.is_ready());
}

#[test]
fn background_then_relaunch_restores_identical_state() {
    let (_root, store) = open_store();

    // First launch: play, then background.
    let rig = Rig::new(instant_config());
    rig.make_ready();
    *rig.state.state.lock().unwrap() = b"mid-level state".to_vec();
    *rig.state.sram.lock().unwrap() = b"battery save".to_vec();

    let shell = Shell::new(Arc::clone(&rig.session), Arc::clone(&store));
    shell.on_background().expect("background persist");

    assert_eq!(
        store.read(Slot::Sram).expect("read sram").as_deref(),
        Some(b"battery save".as_slice())
    );

    // Second launch with a fresh core: the worker applies the
    // temp-state blob and consumes it.
    let rig2 = Rig::new(instant_config());
    let shell2 = Shell::new(Arc::clone(&rig2.session), Arc::clone(&store))
        .with_restore_policy(fast_policy(10));
    let worker = shell2.spawn_ready_worker();
    rig2.make_ready();
    worker.join().expect("worker join");

    assert_eq!(
        rig2.state.applied.lock().unwrap().as_deref(),
        Some(b"mid-level state".as_slice())
    );
    assert_eq!(store.read(Slot::TempState).expect("read tempstate"), None);
    // Explicit saves are not consumed by the worker.
    assert_eq!(
        store.read(Slot::Sram).expect("read sram").as_deref(),
        Some(b"battery save".as_slice())
    );
}

#[test]
fn ready_worker_returns_early_on_fault() {
    let (_root, store) = open_store();
    let rig = Rig::new(instant_config());
    let shell = Shell::new(Arc::clone(&rig.session), Arc::clone(&store));

    let worker = shell.spawn_ready_worker();
    rig.events_tx
        .send(CoreEvent::Fault(CoreFault::IncompatibleGraphics))
        .expect("send fault");
    worker.join().expect("worker join");

    assert_eq!(rig.state.unserialize_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn menu_actions_drive_the_core() {
    let (_root, store) = open_store();
    let rig = Rig::new(instant_config());
    rig.make_ready();
    *rig.state.state.lock().unwrap() = b"explicit save".to_vec();

    let shell = Shell::new(Arc::clone(&rig.session), Arc::clone(&store))
        .with_restore_policy(fast_policy(10));

    shell
        .handle_request(ShellRequest::SaveState)
        .expect("save state");
    assert_eq!(
        store.read(Slot::State).expect("read state").as_deref(),
        Some(b"explicit save".as_slice())
    );

    shell
        .handle_request(ShellRequest::LoadState)
        .expect("load state");
    assert_eq!(
        rig.state.applied.lock().unwrap().as_deref(),
        Some(b"explicit save".as_slice())
    );

    shell
        .handle_request(ShellRequest::ToggleMute)
        .expect("toggle mute");
    assert!(!rig.state.audio_enabled.load(Ordering::SeqCst));

    shell
        .handle_request(ShellRequest::ToggleFastForward)
        .expect("toggle fast-forward");
    assert_eq!(rig.state.frame_speed.load(Ordering::SeqCst), 2);
    shell
        .handle_request(ShellRequest::ToggleFastForward)
        .expect("toggle back");
    assert_eq!(rig.state.frame_speed.load(Ordering::SeqCst), 1);
}

#[test]
fn unrecognized_keys_are_rejected_without_side_effects() {
    let rig = Rig::new(instant_config());
    rig.make_ready();

    let mut router = InputRouter::new(InputConfig::default(), |_| {
        panic!("no shell request expected");
    });

    // KEYCODE_BACK and friends must fall through to the host.
    assert!(!router.route_key(&rig.session, 4, KeyAction::Down, Some(1)));
    assert!(rig.state.key_events.lock().unwrap().is_empty());
}

#[test]
fn keys_before_readiness_are_consumed_but_not_forwarded() {
    let rig = Rig::new(instant_config());

    let mut router = InputRouter::new(InputConfig::default(), |_| {});
    assert!(router.route_key(&rig.session, keycodes::BUTTON_A, KeyAction::Down, Some(1)));
    assert!(rig.state.key_events.lock().unwrap().is_empty());
}

#[test]
fn motion_before_readiness_is_not_consumed() {
    let rig = Rig::new(instant_config());

    let router = InputRouter::new(InputConfig::default(), |_| {});
    assert!(!router.route_motion(&rig.session, MotionAxes::default(), Some(1)));
    assert!(rig.state.motion_events.lock().unwrap().is_empty());
}

#[test]
fn motion_is_decomposed_into_three_sources() {
    let rig = Rig::new(instant_config());
    rig.make_ready();

    let router = InputRouter::new(InputConfig::default(), |_| {});
    let axes = MotionAxes {
        hat_x: 1.0,
        hat_y: -1.0,
        x: 0.25,
        y: 0.5,
        z: -0.5,
        rz: 0.75,
    };
    assert!(router.route_motion(&rig.session, axes, Some(2)));

    let events = rig.state.motion_events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            (MotionSource::DPad, 1.0, -1.0, 1),
            (MotionSource::AnalogLeft, 0.25, 0.5, 1),
            (MotionSource::AnalogRight, -0.5, 0.75, 1),
        ]
    );
}

#[test]
fn start_select_combo_opens_the_menu() {
    let rig = Rig::new(instant_config());
    rig.make_ready();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&requests);
    let mut router = InputRouter::new(InputConfig::default(), move |r| {
        sink.lock().unwrap().push(r);
    });

    assert!(router.route_key(&rig.session, keycodes::BUTTON_START, KeyAction::Down, None));
    assert!(requests.lock().unwrap().is_empty());
    assert!(router.route_key(&rig.session, keycodes::BUTTON_SELECT, KeyAction::Down, None));
    assert_eq!(*requests.lock().unwrap(), vec![ShellRequest::OpenMenu]);

    // Default config still forwards the completing key to the core.
    let keys = rig.state.key_events.lock().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[1], (KeyAction::Down, keycodes::BUTTON_SELECT, 0));
}

#[test]
fn extra_held_key_defeats_the_combo() {
    let rig = Rig::new(instant_config());
    rig.make_ready();

    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    let mut router = InputRouter::new(InputConfig::default(), move |r| {
        if r == ShellRequest::OpenMenu {
            flag.store(true, Ordering::SeqCst);
        }
    });

    // Set equality, not containment: a third held key blocks the menu.
    router.route_key(&rig.session, keycodes::BUTTON_A, KeyAction::Down, None);
    router.route_key(&rig.session, keycodes::BUTTON_START, KeyAction::Down, None);
    router.route_key(&rig.session, keycodes::BUTTON_SELECT, KeyAction::Down, None);
    assert!(!fired.load(Ordering::SeqCst));

    // Releasing the extra key leaves exactly the combo pressed, and
    // every key transition re-evaluates it.
    router.route_key(&rig.session, keycodes::BUTTON_A, KeyAction::Up, None);
    assert!(fired.load(Ordering::SeqCst));
}

#[test]
fn overlay_reserved_codes_raise_shell_requests() {
    let rig = Rig::new(instant_config());
    rig.make_ready();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&requests);
    let mut router = InputRouter::new(InputConfig::default(), move |r| {
        sink.lock().unwrap().push(r);
    });

    use monocart_session::input::reserved;
    assert!(router.route_overlay_key(&rig.session, reserved::SAVE_STATE, KeyAction::Down));
    assert!(router.route_overlay_key(&rig.session, reserved::SAVE_STATE, KeyAction::Up));
    assert!(router.route_overlay_key(&rig.session, reserved::FAST_FORWARD, KeyAction::Down));
    assert_eq!(
        *requests.lock().unwrap(),
        vec![ShellRequest::SaveState, ShellRequest::ToggleFastForward]
    );
    assert!(rig.state.key_events.lock().unwrap().is_empty());
}

#[test]
fn physical_reserved_codes_fire_when_enabled() {
    let rig = Rig::new(instant_config());
    rig.make_ready();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&requests);
    let config = InputConfig {
        reserved_from_physical: true,
        ..InputConfig::default()
    };
    let mut router = InputRouter::new(config, move |r| {
        sink.lock().unwrap().push(r);
    });

    use monocart_session::input::reserved;
    assert!(router.route_key(&rig.session, reserved::LOAD_STATE, KeyAction::Down, Some(1)));
    assert!(router.route_key(&rig.session, reserved::LOAD_STATE, KeyAction::Up, Some(1)));
    assert_eq!(*requests.lock().unwrap(), vec![ShellRequest::LoadState]);
    // Reserved codes are intercepted, never forwarded to the core.
    assert!(rig.state.key_events.lock().unwrap().is_empty());
}

#[test]
fn physical_reserved_codes_are_ignored_by_default() {
    let rig = Rig::new(instant_config());
    rig.make_ready();

    let mut router = InputRouter::new(InputConfig::default(), |_| {
        panic!("no shell request expected");
    });

    use monocart_session::input::reserved;
    assert!(!router.route_key(&rig.session, reserved::MUTE, KeyAction::Down, None));
    assert!(rig.state.key_events.lock().unwrap().is_empty());
}
