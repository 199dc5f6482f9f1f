//! End-to-end tests driving a real core thread through the bridge

use cb_core::pattern::{PatternCore, PatternCoreFactory, SRAM_SIZE};
use cb_core::rom::test_images;
use cb_core::{
    Config, Core, CoreFactory, CoreInfo, CoreOption, FrameRef, Keys, LoadError, LockstepLink,
    OptionSet, RomImage, StateIoError,
};
use cb_integration::{BridgeState, CoreBridge, AUTOSAVE_SLOT};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn fast_config(root: &Path) -> Config {
    let mut config = Config::with_save_root(root);
    config.options.fps_target = 240.0;
    config
}

fn rom() -> RomImage {
    RomImage::from_bytes("e2e.gba", test_images::gba("E2E")).unwrap()
}

/// Pause and make a round trip through the core thread, after which no
/// further frames run until resumed
fn quiesce(bridge: &CoreBridge) {
    bridge.pause();
    bridge.flush_saves().unwrap();
}

fn wait_frames(bridge: &CoreBridge, count: u64) {
    let target = bridge.frame_count() + count;
    wait_for("frames", || bridge.frame_count() >= target);
}

/// Keeps the last delivered frame and counts deliveries
#[derive(Default)]
struct FrameProbe {
    last: Mutex<Vec<u8>>,
    delivered: AtomicUsize,
}

impl FrameProbe {
    fn install(bridge: &CoreBridge) -> Arc<Self> {
        let probe = Arc::new(Self::default());
        let sink = Arc::clone(&probe);
        bridge.set_frame_callback(move |frame: &FrameRef<'_>| {
            frame.copy_packed_into(&mut sink.last.lock());
            sink.delivered.fetch_add(1, Ordering::SeqCst);
        });
        probe
    }

    fn last(&self) -> Vec<u8> {
        self.last.lock().clone()
    }

    fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

/// Records what the bridge feeds a wrapped pattern core
#[derive(Default)]
struct CoreLog {
    keys: Mutex<Vec<Keys>>,
    options: Mutex<Vec<CoreOption>>,
}

struct RecordingCore {
    inner: PatternCore,
    log: Arc<CoreLog>,
}

impl Core for RecordingCore {
    fn info(&self) -> CoreInfo {
        self.inner.info()
    }
    fn reset(&mut self) {
        self.inner.reset()
    }
    fn run_frame(&mut self, keys: Keys, audio: &mut Vec<i16>) -> bool {
        self.log.keys.lock().push(keys);
        self.inner.run_frame(keys, audio)
    }
    fn current_frame(&self) -> FrameRef<'_> {
        self.inner.current_frame()
    }
    fn save_state(&self) -> Result<Vec<u8>, String> {
        self.inner.save_state()
    }
    fn load_state(&mut self, data: &[u8]) -> Result<(), String> {
        self.inner.load_state(data)
    }
    fn apply_option(&mut self, option: &CoreOption) {
        self.log.options.lock().push(option.clone());
        self.inner.apply_option(option)
    }
    fn load_battery(&mut self, data: &[u8]) {
        self.inner.load_battery(data)
    }
    fn take_dirty_battery(&mut self) -> Option<Vec<u8>> {
        self.inner.take_dirty_battery()
    }
    fn attach_link(&mut self, link: Arc<dyn LockstepLink>) {
        self.inner.attach_link(link)
    }
    fn detach_link(&mut self) {
        self.inner.detach_link()
    }
}

struct RecordingFactory {
    log: Arc<CoreLog>,
}

impl CoreFactory for RecordingFactory {
    fn create(&self, rom: RomImage, options: &OptionSet) -> Result<Box<dyn Core>, LoadError> {
        Ok(Box::new(RecordingCore {
            inner: PatternCore::new(&rom, options),
            log: Arc::clone(&self.log),
        }))
    }
}

fn recording_bridge(root: &Path) -> (CoreBridge, Arc<CoreLog>) {
    let log = Arc::new(CoreLog::default());
    let factory = Arc::new(RecordingFactory {
        log: Arc::clone(&log),
    });
    (CoreBridge::new(factory, fast_config(root)), log)
}

#[derive(Debug)]
struct CountingLink {
    player: u8,
    boundaries: AtomicU64,
}

impl CountingLink {
    fn new(player: u8) -> Arc<Self> {
        Arc::new(Self {
            player,
            boundaries: AtomicU64::new(0),
        })
    }

    fn count(&self) -> u64 {
        self.boundaries.load(Ordering::SeqCst)
    }
}

impl LockstepLink for CountingLink {
    fn player_index(&self) -> u8 {
        self.player
    }

    fn frame_boundary(&self, _frame: u64) {
        self.boundaries.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_load_state_redelivers_saved_frame() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    let probe = FrameProbe::install(&bridge);

    bridge.set_keys(Keys::A);
    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 5);

    bridge.pause();
    bridge.save_state(3).unwrap();
    let saved = probe.last();
    assert!(!saved.is_empty());

    bridge.set_keys(Keys::B | Keys::UP);
    bridge.resume();
    wait_frames(&bridge, 5);
    quiesce(&bridge);
    assert_ne!(probe.last(), saved);

    let before = probe.delivered();
    bridge.load_state(3).unwrap();
    assert_eq!(probe.delivered(), before + 1);
    assert_eq!(probe.last(), saved);

    bridge.stop();
}

#[test]
fn test_load_missing_slot() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    bridge.start_image(rom()).unwrap();
    assert!(matches!(bridge.load_state(7), Err(StateIoError::Missing(7))));
    assert!(matches!(bridge.save_state(11), Err(StateIoError::InvalidSlot(11))));
    bridge.stop();
}

#[test]
fn test_stop_persists_battery() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    let path = bridge.store().battery_path("e2e");

    bridge.set_keys(Keys::START);
    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 3);
    assert!(!path.exists());

    bridge.stop();
    let sram = std::fs::read(&path).unwrap();
    assert_eq!(sram.len(), SRAM_SIZE);
    assert!(sram.iter().any(|&b| b == Keys::START.bits() as u8));
}

#[test]
fn test_flush_saves_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));

    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 2);
    // Nothing pressed, nothing dirty
    assert!(!bridge.flush_saves().unwrap());

    bridge.set_keys(Keys::A);
    wait_frames(&bridge, 2);
    assert!(bridge.flush_saves().unwrap());
    assert!(bridge.store().battery_path("e2e").exists());
    bridge.stop();
}

/// Runs a session whose saves directory is blocked by a plain file, with
/// battery data written and then left untouched
fn blocked_battery_session(root: &Path) -> CoreBridge {
    std::fs::write(root.join("saves"), b"not a directory").unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(root));
    bridge.start_image(rom()).unwrap();

    bridge.set_keys(Keys::A);
    wait_frames(&bridge, 3);
    bridge.set_keys(Keys::empty());
    wait_frames(&bridge, 3);

    assert!(matches!(bridge.flush_saves(), Err(StateIoError::Io { .. })));
    std::fs::remove_file(root.join("saves")).unwrap();
    bridge
}

#[test]
fn test_failed_flush_is_written_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = blocked_battery_session(dir.path());
    let path = bridge.store().battery_path("e2e");
    assert!(!path.exists());

    bridge.stop();
    let sram = std::fs::read(&path).unwrap();
    assert!(sram.iter().any(|&b| b == Keys::A.bits() as u8));
}

#[test]
fn test_failed_flush_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = blocked_battery_session(dir.path());

    assert!(bridge.flush_saves().unwrap());
    assert!(bridge.store().battery_path("e2e").exists());
    assert!(!bridge.flush_saves().unwrap());
    bridge.stop();
}

#[test]
fn test_concurrent_starts_create_one_core() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(PatternCoreFactory::new());
    let bridge = Arc::new(CoreBridge::new(factory.clone(), fast_config(dir.path())));
    let barrier = Arc::new(Barrier::new(8));

    let starters: Vec<_> = (0..8)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                bridge.start_image(rom()).is_ok()
            })
        })
        .collect();
    let started = starters
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|&ok| ok)
        .count();

    assert_eq!(started, 1);
    assert_eq!(factory.created(), 1);
    assert_eq!(bridge.state(), BridgeState::Running);
    bridge.stop();
}

#[test]
fn test_keys_never_torn_within_a_step() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, log) = recording_bridge(dir.path());
    let bridge = Arc::new(bridge);
    bridge.set_fast_forward(true);
    bridge.start_image(rom()).unwrap();

    let groups = [Keys::A | Keys::B, Keys::START | Keys::SELECT, Keys::L | Keys::R];
    let writers: Vec<_> = groups
        .iter()
        .map(|&group| {
            let bridge = Arc::clone(&bridge);
            std::thread::spawn(move || {
                for _ in 0..5_000 {
                    bridge.add_keys(group);
                    bridge.clear_keys(group);
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    bridge.stop();

    let seen = log.keys.lock();
    assert!(!seen.is_empty());
    for keys in seen.iter() {
        for group in groups {
            let held = *keys & group;
            assert!(held.is_empty() || held == group, "torn mask {:?}", keys);
        }
    }
}

#[test]
fn test_opposing_directions_filtered() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, log) = recording_bridge(dir.path());
    bridge.set_allow_opposing_directions(false).unwrap();
    bridge.set_keys(Keys::LEFT | Keys::RIGHT | Keys::A);
    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 3);
    bridge.stop();

    assert!(log.keys.lock().iter().all(|&k| k == Keys::A));
}

#[test]
fn test_runtime_option_reaches_core() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, log) = recording_bridge(dir.path());
    bridge.start_image(rom()).unwrap();
    let initial = log.options.lock().len();
    assert!(initial > 0);

    bridge.set_gb_palette_preset("DMG Green").unwrap();
    // Bridge-only options stay on the host side
    bridge.set_volume(10).unwrap();
    wait_for("option delivery", || log.options.lock().len() > initial);
    wait_frames(&bridge, 2);
    bridge.stop();

    let delivered = &log.options.lock()[initial..];
    assert_eq!(
        delivered,
        &[CoreOption::GbPalettePreset("DMG Green".to_string())]
    );
}

#[test]
fn test_audio_reaches_handle() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    bridge.start_image(rom()).unwrap();
    let handle = bridge.handle().unwrap();
    assert_eq!(handle.channels(), 2);
    assert_eq!(handle.sample_rate(), 44100);

    wait_frames(&bridge, 4);
    let mut out = vec![0i16; 512];
    let got = handle.pull_audio(&mut out);
    assert!(got > 0);
    assert!(out[..got].iter().any(|&s| s != 0));
    bridge.stop();
}

#[test]
fn test_pause_halts_frames() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 2);

    quiesce(&bridge);
    assert!(bridge.is_paused());
    let frozen = bridge.frame_count();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(bridge.frame_count(), frozen);

    bridge.resume();
    wait_frames(&bridge, 2);
    bridge.stop();
}

#[test]
fn test_frameskip_delivers_subset() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    let probe = FrameProbe::install(&bridge);
    bridge.set_frameskip(2).unwrap();
    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 30);
    quiesce(&bridge);

    let frames = bridge.frame_count() as usize;
    let delivered = probe.delivered();
    assert!(delivered * 3 + 3 >= frames && delivered * 3 <= frames + 3);
    bridge.stop();
}

#[test]
fn test_rewind_restores_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    let probe = FrameProbe::install(&bridge);
    bridge.set_rewind_enable(true).unwrap();
    bridge.set_rewind_buffer_interval(16).unwrap();

    assert!(!bridge.rewind());
    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 10);
    quiesce(&bridge);

    let before = probe.delivered();
    assert!(bridge.rewind());
    assert_eq!(probe.delivered(), before + 1);
    bridge.stop();
}

#[test]
fn test_autosave_and_autoload() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));
    let slot_path = bridge.store().state_path("e2e", AUTOSAVE_SLOT);
    bridge.set_autosave(true).unwrap();

    bridge.start_image(rom()).unwrap();
    wait_frames(&bridge, 3);
    bridge.stop();
    assert!(slot_path.exists());

    // Autoload is on by default; a corrupt autosave must not block start
    std::fs::write(&slot_path, b"garbage").unwrap();
    bridge.start_image(rom()).unwrap();
    assert_eq!(bridge.state(), BridgeState::Running);
    bridge.stop();
}

#[test]
fn test_lockstep_attach_replace_detach() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), fast_config(dir.path()));

    // Detaching a link that was never attached is a no-op
    bridge.detach_multiplayer_lockstep();
    assert!(!bridge.has_multiplayer_lockstep());

    let first = CountingLink::new(1);
    bridge.attach_multiplayer_lockstep(first.clone());
    bridge.start_image(rom()).unwrap();
    wait_for("first link", || first.count() >= 3);

    let second = CountingLink::new(2);
    bridge.attach_multiplayer_lockstep(second.clone());
    wait_for("second link", || second.count() >= 3);
    let first_final = first.count();
    wait_frames(&bridge, 3);
    assert_eq!(first.count(), first_final);

    bridge.detach_multiplayer_lockstep();
    wait_frames(&bridge, 2);
    let second_final = second.count();
    wait_frames(&bridge, 3);
    assert_eq!(second.count(), second_final);
    bridge.stop();
}
