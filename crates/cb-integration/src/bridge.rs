//! Core lifecycle manager
//!
//! `CoreBridge` is the only owner of a running core. It builds the core,
//! moves it onto a dedicated thread, and funnels every control request
//! through that thread's command channel so requests land between frames.
//! Disk I/O for saves happens on the caller's thread; the core thread only
//! copies memory.

use crate::core_thread::{Command, CoreThread};
use crate::handle::{Controls, CoreHandle, SessionShared};
use crate::storage::{SaveStore, AUTOSAVE_SLOT};
use cb_core::{
    BridgeError, Config, Core, CoreFactory, CoreInfo, CoreOption, FrameCallback, FrameRef,
    IdleOptimization, KeyState, Keys, LockstepLink, OptionError, OptionSet, OptionValue, Result,
    RomImage, StateIoError,
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Lifecycle state of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No core loaded
    Idle,
    /// Core thread running
    Running,
    /// Stop requested, core thread not yet joined
    Stopping,
}

struct Session {
    shared: Arc<SessionShared>,
    commands: Sender<Command>,
    exit: Receiver<()>,
    thread: JoinHandle<Box<dyn Core>>,
}

enum Lifecycle {
    Idle,
    Running(Session),
    Stopping,
}

/// What a control call needs from the running session
struct SessionRef {
    shared: Arc<SessionShared>,
    commands: Sender<Command>,
}

/// Emulation core lifecycle manager
pub struct CoreBridge {
    factory: Arc<dyn CoreFactory>,
    config: Config,
    lifecycle: Mutex<Lifecycle>,
    keys: Arc<KeyState>,
    options: Arc<RwLock<OptionSet>>,
    controls: Arc<Controls>,
    frame_callback: Arc<RwLock<Option<FrameCallback>>>,
    link: Mutex<Option<Arc<dyn LockstepLink>>>,
    store: Arc<SaveStore>,
}

impl CoreBridge {
    /// Create an idle bridge. The configured option set becomes the
    /// initial value of every option.
    pub fn new(factory: Arc<dyn CoreFactory>, config: Config) -> Self {
        let store = Arc::new(SaveStore::new(&config.paths.saves, &config.paths.states));
        Self {
            factory,
            options: Arc::new(RwLock::new(config.options.clone())),
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
            keys: Arc::new(KeyState::new()),
            controls: Arc::new(Controls::default()),
            frame_callback: Arc::new(RwLock::new(None)),
            link: Mutex::new(None),
            store,
        }
    }

    pub fn store(&self) -> &SaveStore {
        &self.store
    }

    pub fn state(&self) -> BridgeState {
        match *self.lifecycle.lock() {
            Lifecycle::Idle => BridgeState::Idle,
            Lifecycle::Running(_) => BridgeState::Running,
            Lifecycle::Stopping => BridgeState::Stopping,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    /// Load a ROM file and start emulating it
    pub fn start(&self, rom_path: impl AsRef<Path>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        Self::check_idle(&lifecycle)?;
        let rom = RomImage::load(rom_path)?;
        self.start_locked(&mut lifecycle, rom)
    }

    /// Start emulating an image already in memory
    pub fn start_image(&self, rom: RomImage) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        Self::check_idle(&lifecycle)?;
        self.start_locked(&mut lifecycle, rom)
    }

    fn check_idle(lifecycle: &Lifecycle) -> Result<()> {
        match lifecycle {
            Lifecycle::Idle => Ok(()),
            Lifecycle::Running(_) => Err(BridgeError::AlreadyRunning),
            Lifecycle::Stopping => Err(BridgeError::Stopping),
        }
    }

    fn start_locked(&self, lifecycle: &mut Lifecycle, rom: RomImage) -> Result<()> {
        tracing::info!("Starting core for {} ({:?})", rom.path.display(), rom.platform);

        let options = self.options.read().clone();
        let stem = rom.stem();
        let mut core = self.factory.create(rom, &options)?;
        let info = core.info();

        match self.store.read_battery(&stem) {
            Ok(Some(data)) => {
                tracing::info!("Loaded {} bytes of battery data", data.len());
                core.load_battery(&data);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not read battery file: {}", e),
        }

        for option in options.to_options() {
            if option.reaches_core() {
                core.apply_option(&option);
            }
        }

        if let Some(link) = self.link.lock().clone() {
            core.attach_link(link);
        }

        if options.autoload {
            match self.store.read_state(&stem, AUTOSAVE_SLOT) {
                Ok(blob) => match core.load_state(&blob) {
                    Ok(()) => tracing::info!("Autoloaded state from slot {}", AUTOSAVE_SLOT),
                    Err(e) => tracing::warn!("Autoload failed: {}", e),
                },
                Err(StateIoError::Missing(_)) => {}
                Err(e) => tracing::warn!("Autoload failed: {}", e),
            }
        }

        self.controls
            .paused
            .store(self.config.general.start_paused, Ordering::Release);

        let shared = Arc::new(SessionShared::new(
            info,
            stem,
            Arc::clone(&self.options),
            Arc::clone(&self.controls),
        ));
        let (commands, command_rx) = channel::unbounded();
        let (exit_tx, exit) = channel::bounded(1);

        let worker = CoreThread::new(
            core,
            Arc::clone(&shared),
            Arc::clone(&self.keys),
            Arc::clone(&self.frame_callback),
            command_rx,
        );
        let thread = std::thread::Builder::new()
            .name("core".to_string())
            .spawn(move || worker.run(exit_tx))?;

        *lifecycle = Lifecycle::Running(Session {
            shared,
            commands,
            exit,
            thread,
        });
        tracing::info!("Core running");
        Ok(())
    }

    /// Stop the core, persisting battery data and the autosave.
    ///
    /// Safe to call in any state. Secondary failures are logged.
    pub fn stop(&self) {
        let session = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(session) => session,
                other => {
                    *lifecycle = other;
                    return;
                }
            }
        };

        tracing::info!("Stopping core");
        let Session {
            shared,
            commands,
            exit,
            thread,
        } = session;
        let _ = commands.send(Command::Stop);

        let timeout = Duration::from_millis(self.config.general.stop_timeout_ms);
        match exit.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match thread.join() {
                Ok(core) => self.finish_session(core, &shared),
                Err(_) => {
                    tracing::error!("Core thread panicked; only previously taken battery data is kept");
                    self.write_pending_battery(&shared);
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                tracing::error!(
                    "Core thread did not exit within {} ms, detaching it",
                    timeout.as_millis()
                );
            }
        }

        *self.lifecycle.lock() = Lifecycle::Idle;
        tracing::info!("Core stopped");
    }

    fn finish_session(&self, mut core: Box<dyn Core>, shared: &SessionShared) {
        let stem = shared.rom_stem.as_str();
        if self.options.read().autosave {
            match core.save_state() {
                Ok(blob) => match self.store.write_state(stem, AUTOSAVE_SLOT, &blob) {
                    Ok(_) => tracing::info!("Autosaved to slot {}", AUTOSAVE_SLOT),
                    Err(e) => tracing::error!("Autosave failed: {}", e),
                },
                Err(e) => tracing::error!("Autosave capture failed: {}", e),
            }
        }

        // Fresh core data supersedes anything an earlier flush failed to write
        if let Some(data) = core.take_dirty_battery() {
            *shared.pending_battery.lock() = Some(data);
        }
        self.write_pending_battery(shared);
    }

    fn write_pending_battery(&self, shared: &SessionShared) {
        if let Some(data) = shared.pending_battery.lock().take() {
            if let Err(e) = self.store.write_battery(&shared.rom_stem, &data) {
                tracing::error!("Battery flush on stop failed: {}", e);
            }
        }
    }

    fn session(&self) -> Option<SessionRef> {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(session) => Some(SessionRef {
                shared: Arc::clone(&session.shared),
                commands: session.commands.clone(),
            }),
            _ => None,
        }
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.config.general.command_timeout_ms)
    }

    /// Send a request and wait for the core thread's reply
    fn request<T>(
        &self,
        session: &SessionRef,
        make: impl FnOnce(Sender<T>) -> Command,
    ) -> std::result::Result<T, StateIoError> {
        let (tx, rx) = channel::bounded(1);
        session
            .commands
            .send(make(tx))
            .map_err(|_| StateIoError::NotRunning)?;
        rx.recv_timeout(self.command_timeout()).map_err(|e| match e {
            RecvTimeoutError::Timeout => StateIoError::Timeout,
            RecvTimeoutError::Disconnected => StateIoError::NotRunning,
        })
    }

    /// Write dirty battery data now. Returns whether anything was written.
    pub fn flush_saves(&self) -> std::result::Result<bool, StateIoError> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        self.request(&session, Command::TakeBattery)?;
        let shared = &session.shared;
        let Some(data) = shared.pending_battery.lock().take() else {
            return Ok(false);
        };
        if let Err(e) = self.store.write_battery(&shared.rom_stem, &data) {
            // Keep it for the next flush or stop, unless newer data arrived
            shared.pending_battery.lock().get_or_insert(data);
            return Err(e);
        }
        Ok(true)
    }

    /// Capture the machine state into `slot`
    pub fn save_state(&self, slot: u32) -> std::result::Result<(), StateIoError> {
        SaveStore::check_slot(slot)?;
        let session = self.session().ok_or(StateIoError::NotRunning)?;
        let blob = self.request(&session, Command::SaveState)??;
        self.store.write_state(&session.shared.rom_stem, slot, &blob)?;
        tracing::info!("Saved state to slot {}", slot);
        Ok(())
    }

    /// Restore the machine state from `slot`
    pub fn load_state(&self, slot: u32) -> std::result::Result<(), StateIoError> {
        SaveStore::check_slot(slot)?;
        let session = self.session().ok_or(StateIoError::NotRunning)?;
        let blob = self.store.read_state(&session.shared.rom_stem, slot)?;
        self.request(&session, |reply| Command::LoadState(blob, reply))??;
        tracing::info!("Loaded state from slot {}", slot);
        Ok(())
    }

    /// Replace the whole keypad mask
    pub fn set_keys(&self, keys: Keys) {
        self.keys.set(keys);
    }

    pub fn add_keys(&self, keys: Keys) {
        self.keys.add(keys);
    }

    pub fn clear_keys(&self, keys: Keys) {
        self.keys.clear(keys);
    }

    pub fn keys(&self) -> Keys {
        self.keys.snapshot()
    }

    /// Set an option by name
    pub fn apply_option(
        &self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> std::result::Result<(), OptionError> {
        self.set_option(CoreOption::parse(name, value)?)
    }

    /// Set an option. Takes effect on the core's next step when running,
    /// or at the next start otherwise.
    pub fn set_option(&self, option: CoreOption) -> std::result::Result<(), OptionError> {
        self.options.write().apply(option.clone())?;
        tracing::debug!("Option {} = {:?}", option.name(), option.value());
        if let Some(session) = self.session() {
            let _ = session.commands.send(Command::ApplyOption(option));
        }
        Ok(())
    }

    /// Snapshot of every option's current value
    pub fn options(&self) -> OptionSet {
        self.options.read().clone()
    }

    /// The live option set, shared with host-side consumers that read
    /// options on every pass
    pub fn option_set(&self) -> Arc<RwLock<OptionSet>> {
        Arc::clone(&self.options)
    }

    pub fn list_gb_palette_presets(&self) -> Vec<String> {
        cb_core::palette::preset_names()
    }

    /// Connect a lockstep link, replacing any existing one
    pub fn attach_multiplayer_lockstep(&self, link: Arc<dyn LockstepLink>) {
        let previous = self.link.lock().replace(Arc::clone(&link));
        if previous.is_some() {
            tracing::info!("Replacing attached lockstep link");
        }
        if let Some(session) = self.session() {
            let _ = session.commands.send(Command::AttachLink(link));
        }
    }

    /// Disconnect the lockstep link, if any
    pub fn detach_multiplayer_lockstep(&self) {
        if self.link.lock().take().is_none() {
            return;
        }
        if let Some(session) = self.session() {
            let _ = session.commands.send(Command::DetachLink);
        }
    }

    pub fn has_multiplayer_lockstep(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Register the per-frame handler. It runs on the core thread and must
    /// not block.
    pub fn set_frame_callback<F>(&self, callback: F)
    where
        F: Fn(&FrameRef<'_>) + Send + Sync + 'static,
    {
        *self.frame_callback.write() = Some(Arc::new(callback));
    }

    pub fn clear_frame_callback(&self) {
        *self.frame_callback.write() = None;
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    fn set_paused(&self, paused: bool) {
        if let Some(session) = self.session() {
            self.controls.paused.store(paused, Ordering::Release);
            let _ = session.commands.send(Command::Wake);
            tracing::debug!("Core {}", if paused { "paused" } else { "resumed" });
        }
    }

    pub fn is_paused(&self) -> bool {
        self.is_running() && self.controls.paused.load(Ordering::Acquire)
    }

    /// Power-cycle the running game
    pub fn reset(&self) {
        if let Some(session) = self.session() {
            let _ = session.commands.send(Command::Reset);
        }
    }

    /// Toggle fast-forward, paced by `fast_forward_ratio`
    pub fn set_fast_forward(&self, enabled: bool) {
        self.controls.fast_forward.store(enabled, Ordering::Release);
        self.wake();
    }

    /// Hold fast-forward, paced by `fast_forward_held_ratio`. Wins over
    /// the toggle while held.
    pub fn set_fast_forward_held(&self, held: bool) {
        self.controls.fast_forward_held.store(held, Ordering::Release);
        self.wake();
    }

    pub fn is_fast_forward(&self) -> bool {
        self.controls.fast_forward_active()
    }

    fn wake(&self) {
        if let Some(session) = self.session() {
            let _ = session.commands.send(Command::Wake);
        }
    }

    /// Step back to the latest rewind snapshot. Returns whether one was
    /// restored.
    pub fn rewind(&self) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        self.request(&session, Command::Rewind).unwrap_or(false)
    }

    pub fn rom_info(&self) -> Option<CoreInfo> {
        self.session().map(|s| s.shared.info.clone())
    }

    /// Occupied save-state slots for the running ROM
    pub fn occupied_slots(&self) -> Vec<u32> {
        self.session()
            .map(|s| self.store.occupied_slots(&s.shared.rom_stem))
            .unwrap_or_default()
    }

    /// Frames emulated in the current session
    pub fn frame_count(&self) -> u64 {
        self.session()
            .map(|s| s.shared.frame_count.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Weak handle for audio consumers, while a core is running
    pub fn handle(&self) -> Option<CoreHandle> {
        self.session().map(|s| CoreHandle::new(&s.shared))
    }
}

macro_rules! typed_setters {
    ($( $(#[$doc:meta])* $setter:ident($ty:ty) => $variant:ident; )*) => {
        impl CoreBridge {
            $(
                $(#[$doc])*
                pub fn $setter(&self, value: $ty) -> std::result::Result<(), OptionError> {
                    self.set_option(CoreOption::$variant(value.into()))
                }
            )*
        }
    };
}

typed_setters! {
    set_video_sync(bool) => VideoSync;
    set_audio_sync(bool) => AudioSync;
    set_fps_target(f64) => FpsTarget;
    /// Output volume, 0 to 100
    set_volume(u32) => Volume;
    set_mute(bool) => Mute;
    set_frameskip(u32) => Frameskip;
    set_allow_opposing_directions(bool) => AllowOpposingDirections;
    set_skip_bios(bool) => SkipBios;
    set_use_bios(bool) => UseBios;
    set_idle_optimization(IdleOptimization) => IdleOptimization;
    set_autoload(bool) => Autoload;
    set_autosave(bool) => Autosave;
    set_show_osd(bool) => ShowOsd;
    set_show_frame_counter(bool) => ShowFrameCounter;
    set_show_reset_info(bool) => ShowResetInfo;
    set_interframe_blending(bool) => InterframeBlending;
    set_resample_video(bool) => ResampleVideo;
    set_lock_aspect_ratio(bool) => LockAspectRatio;
    set_lock_integer_scaling(bool) => LockIntegerScaling;
    set_vba_bug_compat(bool) => VbaBugCompat;
    /// Host buffer size in frames, 512 to 8192
    set_audio_buffers(u32) => AudioBuffers;
    set_sample_rate(u32) => SampleRate;
    set_gba_force_gbp(bool) => GbaForceGbp;
    set_fast_forward_mute(bool) => FastForwardMute;
    set_fast_forward_volume(u32) => FastForwardVolume;
    set_log_to_file(bool) => LogToFile;
    set_log_to_stdout(bool) => LogToStdout;
    set_log_file(&str) => LogFile;
    set_log_level(u32) => LogLevel;
    set_rewind_enable(bool) => RewindEnable;
    /// Seconds of rewind history
    set_rewind_buffer_capacity(u32) => RewindBufferCapacity;
    /// Milliseconds between rewind snapshots
    set_rewind_buffer_interval(u32) => RewindBufferInterval;
    set_fast_forward_ratio(f64) => FastForwardRatio;
    set_fast_forward_held_ratio(f64) => FastForwardHeldRatio;
    set_sgb_borders(bool) => SgbBorders;
    /// Select a palette by name, or `""` for the core default
    set_gb_palette_preset(&str) => GbPalettePreset;
}

impl Drop for CoreBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
