//! The thread that owns a running core.
//!
//! Control requests arrive on a command channel and are handled only
//! between frames, so the core never observes a request mid-frame. Frame
//! delivery and audio hand-off never wait on a consumer.

use crate::handle::SessionShared;
use crate::pacing::{frame_interval, FramePacer};
use crate::rewind::RewindBuffer;
use cb_core::{Core, CoreOption, FrameCallback, KeyState, LockstepLink, StateIoError};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a paused core thread sleeps between command checks
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Ring fill fraction above which `audio_sync` holds the core back
const AUDIO_HIGH_WATER: f64 = 0.75;

pub(crate) type Reply<T> = Sender<T>;

/// Requests from the bridge, handled at frame boundaries
pub(crate) enum Command {
    SaveState(Reply<Result<Vec<u8>, StateIoError>>),
    LoadState(Vec<u8>, Reply<Result<(), StateIoError>>),
    /// Move dirty battery data into the session's pending slot
    TakeBattery(Reply<()>),
    ApplyOption(CoreOption),
    AttachLink(Arc<dyn LockstepLink>),
    DetachLink,
    Rewind(Reply<bool>),
    Reset,
    /// Re-check pause and speed switches
    Wake,
    Stop,
}

/// Signals the bridge when the thread exits, including by panic
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Per-frame settings read from the option set
struct StepSettings {
    allow_opposing: bool,
    frameskip: u32,
    rewind_enable: bool,
    rewind_capacity: u32,
    rewind_interval: u32,
    audio_sync: bool,
    fps_target: f64,
    ratio: f64,
}

enum Flow {
    Continue,
    Exit,
}

pub(crate) struct CoreThread {
    core: Box<dyn Core>,
    shared: Arc<SessionShared>,
    keys: Arc<KeyState>,
    frame_callback: Arc<RwLock<Option<FrameCallback>>>,
    commands: Receiver<Command>,
    pacer: FramePacer,
    rewind: RewindBuffer,
    audio: Vec<i16>,
    skip_counter: u32,
}

impl CoreThread {
    pub fn new(
        core: Box<dyn Core>,
        shared: Arc<SessionShared>,
        keys: Arc<KeyState>,
        frame_callback: Arc<RwLock<Option<FrameCallback>>>,
        commands: Receiver<Command>,
    ) -> Self {
        Self {
            core,
            shared,
            keys,
            frame_callback,
            commands,
            pacer: FramePacer::new(),
            rewind: RewindBuffer::new(),
            audio: Vec::new(),
            skip_counter: 0,
        }
    }

    /// Run until stopped, then hand the core back
    pub fn run(mut self, exit: Sender<()>) -> Box<dyn Core> {
        let _signal = ExitSignal(exit);
        tracing::info!("Core thread started for \"{}\"", self.shared.info.title);

        loop {
            if let Flow::Exit = self.drain_commands() {
                break;
            }

            if self.shared.controls.paused.load(Ordering::Acquire) {
                self.pacer.reset();
                match self.commands.recv_timeout(PAUSE_POLL) {
                    Ok(command) => {
                        if let Flow::Exit = self.handle(command) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                continue;
            }

            let settings = self.settings();
            self.step(&settings);

            if let Flow::Exit = self.pace(&settings) {
                break;
            }
        }

        tracing::info!(
            "Core thread exiting after {} frames",
            self.shared.frame_count.load(Ordering::Acquire)
        );
        self.core
    }

    fn settings(&self) -> StepSettings {
        let options = self.shared.options.read();
        StepSettings {
            allow_opposing: options.allow_opposing_directions,
            frameskip: options.frameskip,
            rewind_enable: options.rewind_enable,
            rewind_capacity: options.rewind_buffer_capacity,
            rewind_interval: options.rewind_buffer_interval,
            audio_sync: options.audio_sync,
            fps_target: options.fps_target,
            ratio: self.shared.controls.speed_ratio(&options),
        }
    }

    fn step(&mut self, settings: &StepSettings) {
        let mut keys = self.keys.snapshot();
        if !settings.allow_opposing {
            keys = keys.without_opposing();
        }

        self.audio.clear();
        let completed = self.core.run_frame(keys, &mut self.audio);
        self.shared.ring.push(&self.audio);
        let frame = self.shared.frame_count.fetch_add(1, Ordering::AcqRel) + 1;

        if completed {
            if self.skip_counter > settings.frameskip {
                self.skip_counter = 0;
            }
            if self.skip_counter == 0 {
                self.publish_frame();
            }
            self.skip_counter = (self.skip_counter + 1) % (settings.frameskip + 1);
        }

        if settings.rewind_enable {
            self.rewind.configure(
                settings.rewind_capacity,
                settings.rewind_interval,
                self.shared.info.fps,
            );
            if self.rewind.tick() {
                match self.core.save_state() {
                    Ok(snapshot) => self.rewind.push(snapshot),
                    Err(e) => tracing::warn!("Rewind snapshot failed at frame {}: {}", frame, e),
                }
            }
        } else if !self.rewind.is_empty() {
            self.rewind.clear();
        }

        tracing::trace!("Frame {} keys {:?} audio {}", frame, keys, self.audio.len());
    }

    /// Hand the core's current frame to the registered callback
    fn publish_frame(&self) {
        let callback = self.frame_callback.read().clone();
        if let Some(callback) = callback {
            callback(&self.core.current_frame());
        }
    }

    /// Wait for the next frame deadline, handling commands meanwhile
    fn pace(&mut self, settings: &StepSettings) -> Flow {
        let Some(interval) = frame_interval(settings.fps_target, settings.ratio) else {
            self.pacer.reset();
            return self.drain_commands();
        };

        let deadline = self.pacer.next_deadline(Instant::now(), interval);
        if let Flow::Exit = self.wait_until(deadline) {
            return Flow::Exit;
        }

        // Hold back while the audio consumer still has plenty queued
        if settings.audio_sync && settings.ratio == 1.0 {
            let high_water = (self.shared.ring.capacity() as f64 * AUDIO_HIGH_WATER) as usize;
            let limit = Instant::now() + interval;
            while self.shared.ring.len() > high_water && Instant::now() < limit {
                if let Flow::Exit = self.wait_until(Instant::now() + Duration::from_millis(1)) {
                    return Flow::Exit;
                }
            }
        }
        Flow::Continue
    }

    fn wait_until(&mut self, deadline: Instant) -> Flow {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Flow::Continue;
            }
            match self.commands.recv_timeout(deadline - now) {
                Ok(command) => {
                    if let Flow::Exit = self.handle(command) {
                        return Flow::Exit;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Flow::Continue,
                Err(RecvTimeoutError::Disconnected) => return Flow::Exit,
            }
        }
    }

    fn drain_commands(&mut self) -> Flow {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if let Flow::Exit = self.handle(command) {
                        return Flow::Exit;
                    }
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
                Err(TryRecvError::Disconnected) => return Flow::Exit,
            }
        }
    }

    fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::SaveState(reply) => {
                let result = self.core.save_state().map_err(StateIoError::Core);
                let _ = reply.send(result);
            }
            Command::LoadState(blob, reply) => {
                let result = self.core.load_state(&blob).map_err(StateIoError::Core);
                if result.is_ok() {
                    self.after_restore();
                }
                let _ = reply.send(result);
            }
            Command::TakeBattery(reply) => {
                if let Some(data) = self.core.take_dirty_battery() {
                    *self.shared.pending_battery.lock() = Some(data);
                }
                let _ = reply.send(());
            }
            Command::ApplyOption(option) => self.apply_option(option),
            Command::AttachLink(link) => {
                tracing::info!("Attaching lockstep link as player {}", link.player_index());
                self.core.attach_link(link);
            }
            Command::DetachLink => {
                tracing::info!("Detaching lockstep link");
                self.core.detach_link();
            }
            Command::Rewind(reply) => {
                let restored = match self.rewind.pop() {
                    Some(snapshot) => match self.core.load_state(&snapshot) {
                        Ok(()) => {
                            self.after_restore();
                            true
                        }
                        Err(e) => {
                            tracing::warn!("Rewind restore failed: {}", e);
                            false
                        }
                    },
                    None => false,
                };
                let _ = reply.send(restored);
            }
            Command::Reset => {
                tracing::info!("Resetting core");
                self.core.reset();
                self.rewind.clear();
                self.after_restore();
            }
            Command::Wake => {}
            Command::Stop => return Flow::Exit,
        }
        Flow::Continue
    }

    fn apply_option(&mut self, option: CoreOption) {
        tracing::debug!("Applying option {} = {:?}", option.name(), option.value());
        if let CoreOption::AudioBuffers(frames) = option {
            self.shared
                .ring
                .set_capacity_frames(frames as usize * cb_core::audio_ring::RING_BUFFER_COUNT);
        }
        if option.reaches_core() {
            self.core.apply_option(&option);
        }
    }

    /// Show the restored picture at once and drop audio from the old timeline
    fn after_restore(&mut self) {
        self.shared.ring.clear();
        self.skip_counter = 0;
        self.pacer.reset();
        self.publish_frame();
    }
}
