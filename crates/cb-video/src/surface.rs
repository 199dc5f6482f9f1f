//! Video presentation surface
//!
//! Receives frames from a bridge through a [`FrameMailbox`] and draws the
//! newest one whenever the host asks, either from its own refresh callback
//! or from a display-link timer thread owned by the surface.

use crate::backend::PresentBackend;
use crate::mailbox::{FrameMailbox, StoredFrame};
use crate::scaling::{place, ScalingMode};
use cb_core::{CoreOption, OptionSet, SurfaceError};
use cb_integration::CoreBridge;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Result of one display pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOutcome {
    /// A frame was drawn; `new_frame` is false when it repeats the last one
    Presented { new_frame: bool },
    /// Nothing has been published yet
    NoFrame,
}

struct Presenter {
    backend: Box<dyn PresentBackend>,
    front: StoredFrame,
    /// Sequence of the frame the backend holds
    uploaded: Option<u64>,
    started: bool,
}

struct DisplayLink {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Display statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub presented: u64,
    pub uploaded: u64,
    /// Frames replaced in the mailbox before they could be shown
    pub dropped: u64,
}

/// Draws a bridge's frames onto a host surface
pub struct VideoSurface {
    mailbox: Arc<FrameMailbox>,
    presenter: Mutex<Presenter>,
    /// Where the scaling locks live: the attached bridge's option set, or
    /// a private one while detached
    options: Mutex<Arc<RwLock<OptionSet>>>,
    link: Mutex<Option<DisplayLink>>,
    presented: AtomicU64,
    uploaded: AtomicU64,
}

impl VideoSurface {
    pub fn new(backend: Box<dyn PresentBackend>) -> Arc<Self> {
        Arc::new(Self {
            mailbox: Arc::new(FrameMailbox::new()),
            presenter: Mutex::new(Presenter {
                backend,
                front: StoredFrame::default(),
                uploaded: None,
                started: false,
            }),
            options: Mutex::new(Arc::new(RwLock::new(OptionSet::default()))),
            link: Mutex::new(None),
            presented: AtomicU64::new(0),
            uploaded: AtomicU64::new(0),
        })
    }

    /// Mailbox frames are published into
    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }

    /// Receive frames from `bridge` and follow its scaling options. The
    /// bridge keeps only a weak reference, so dropping the surface silently
    /// discards frames.
    pub fn attach_bridge(&self, bridge: &CoreBridge) {
        *self.options.lock() = bridge.option_set();
        let mailbox = Arc::downgrade(&self.mailbox);
        bridge.set_frame_callback(move |frame| {
            if let Some(mailbox) = mailbox.upgrade() {
                mailbox.publish(frame);
            }
        });
        tracing::debug!("Video surface attached to bridge");
    }

    pub fn detach_bridge(&self, bridge: &CoreBridge) {
        bridge.clear_frame_callback();
        // Keep the current locks, but stop writing into the bridge's options
        let current = self.options().read().clone();
        *self.options.lock() = Arc::new(RwLock::new(current));
        tracing::debug!("Video surface detached from bridge");
    }

    /// Initialise the backend. Does nothing if already started.
    pub fn start_display(&self) -> Result<(), SurfaceError> {
        let mut presenter = self.presenter.lock();
        if presenter.started {
            return Ok(());
        }
        presenter.backend.init()?;
        presenter.started = true;
        tracing::info!("Display started on {} presenter", presenter.backend.name());
        Ok(())
    }

    /// Start the display and drive it from a timer at `hz`
    pub fn start_display_link(self: &Arc<Self>, hz: f64) -> Result<(), SurfaceError> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(SurfaceError::Present(format!("invalid display rate {}", hz)));
        }
        self.start_display()?;

        let mut link = self.link.lock();
        if link.is_some() {
            return Ok(());
        }

        let (stop, stopped) = channel::bounded::<()>(1);
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = Duration::from_secs_f64(1.0 / hz);
        let thread = std::thread::Builder::new()
            .name("display-link".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                let Some(surface) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = surface.display_frame() {
                    tracing::warn!("Display link present failed: {}", e);
                }
            })
            .map_err(|e| SurfaceError::Present(e.to_string()))?;

        *link = Some(DisplayLink { stop, thread });
        tracing::info!("Display link running at {:.1} Hz", hz);
        Ok(())
    }

    /// Stop the display link, if any, and release the backend
    pub fn stop_display(&self) {
        if let Some(link) = self.link.lock().take() {
            let _ = link.stop.try_send(());
            // The last strong reference may be dropped on the link thread
            if link.thread.thread().id() != std::thread::current().id()
                && link.thread.join().is_err()
            {
                tracing::error!("Display link thread panicked");
            }
        }

        let mut presenter = self.presenter.lock();
        if presenter.started {
            presenter.backend.shutdown();
            presenter.started = false;
            presenter.front = StoredFrame::default();
            presenter.uploaded = None;
            tracing::info!("Display stopped");
        }
    }

    pub fn is_displaying(&self) -> bool {
        self.presenter.lock().started
    }

    /// Draw the newest frame, uploading it first if it changed since the
    /// last pass. Without a new frame the previous one is drawn again.
    pub fn display_frame(&self) -> Result<DisplayOutcome, SurfaceError> {
        let mut presenter = self.presenter.lock();
        if !presenter.started {
            return Err(SurfaceError::NotStarted);
        }

        let Presenter {
            backend,
            front,
            uploaded,
            ..
        } = &mut *presenter;
        self.mailbox.take_into(front);
        if front.is_empty() {
            return Ok(DisplayOutcome::NoFrame);
        }

        // A failed upload is retried on the next pass
        let new_frame = *uploaded != Some(front.sequence);
        if new_frame {
            backend.upload(front)?;
            *uploaded = Some(front.sequence);
            self.uploaded.fetch_add(1, Ordering::Relaxed);
        }

        let target = place(self.scaling_mode(), (front.width, front.height), backend.viewport_size());
        backend.present(target)?;
        self.presented.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Presented frame {} into {:?}", front.sequence, target);
        Ok(DisplayOutcome::Presented { new_frame })
    }

    fn options(&self) -> Arc<RwLock<OptionSet>> {
        Arc::clone(&self.options.lock())
    }

    /// Scaling resolved from the current option values
    pub fn scaling_mode(&self) -> ScalingMode {
        let options = self.options();
        let options = options.read();
        ScalingMode::from_locks(options.lock_integer_scaling, options.lock_aspect_ratio)
    }

    fn set_lock(&self, option: CoreOption) {
        if let Err(e) = self.options().write().apply(option) {
            tracing::warn!("Scaling option rejected: {}", e);
        }
    }

    /// Set `lock_integer_scaling`, on the attached bridge if there is one
    pub fn set_integer_scaling_enabled(&self, enabled: bool) {
        self.set_lock(CoreOption::LockIntegerScaling(enabled));
    }

    pub fn is_integer_scaling_enabled(&self) -> bool {
        self.options().read().lock_integer_scaling
    }

    pub fn set_lock_aspect_ratio(&self, locked: bool) {
        self.set_lock(CoreOption::LockAspectRatio(locked));
    }

    pub fn is_aspect_ratio_locked(&self) -> bool {
        self.options().read().lock_aspect_ratio
    }

    /// Take the scaling locks from an option set
    pub fn apply_options(&self, options: &OptionSet) {
        self.set_integer_scaling_enabled(options.lock_integer_scaling);
        self.set_lock_aspect_ratio(options.lock_aspect_ratio);
    }

    pub fn stats(&self) -> SurfaceStats {
        SurfaceStats {
            presented: self.presented.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            dropped: self.mailbox.dropped(),
        }
    }
}

impl Drop for VideoSurface {
    fn drop(&mut self) {
        self.stop_display();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::{resize, NullPresenter};
    use crate::scaling::Rect;
    use cb_core::FrameRef;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| [i as u8, (i >> 8) as u8, 0x80, 0xFF])
            .collect()
    }

    fn publish(surface: &VideoSurface, pixels: &[u8], width: u32, height: u32) {
        surface
            .mailbox()
            .publish(&FrameRef::packed(pixels, width, height).unwrap());
    }

    #[test]
    fn test_requires_start() {
        let (presenter, _) = NullPresenter::new(64, 64);
        let surface = VideoSurface::new(Box::new(presenter));
        assert!(matches!(surface.display_frame(), Err(SurfaceError::NotStarted)));
    }

    #[test]
    fn test_no_frame_before_publish() {
        let (presenter, probe) = NullPresenter::new(64, 64);
        let surface = VideoSurface::new(Box::new(presenter));
        surface.start_display().unwrap();
        assert_eq!(surface.display_frame().unwrap(), DisplayOutcome::NoFrame);
        assert_eq!(probe.lock().presents, 0);
    }

    #[test]
    fn test_rerender_is_identical() {
        let (presenter, probe) = NullPresenter::new(100, 80);
        let surface = VideoSurface::new(Box::new(presenter));
        surface.start_display().unwrap();

        publish(&surface, &gradient(24, 16), 24, 16);
        assert_eq!(
            surface.display_frame().unwrap(),
            DisplayOutcome::Presented { new_frame: true }
        );
        let first = probe.lock().image.clone();

        assert_eq!(
            surface.display_frame().unwrap(),
            DisplayOutcome::Presented { new_frame: false }
        );
        let probe = probe.lock();
        assert_eq!(probe.image, first);
        assert_eq!(probe.uploads, 1);
        assert_eq!(probe.presents, 2);
    }

    #[test]
    fn test_scaling_changes_apply_next_frame() {
        let (presenter, probe) = NullPresenter::new(800, 600);
        let surface = VideoSurface::new(Box::new(presenter));
        surface.start_display().unwrap();
        publish(&surface, &gradient(240, 160), 240, 160);

        surface.display_frame().unwrap();
        assert_eq!(
            probe.lock().last_target,
            Some(Rect {
                x: 0,
                y: 33,
                width: 800,
                height: 533
            })
        );

        surface.set_integer_scaling_enabled(true);
        surface.display_frame().unwrap();
        assert_eq!(
            probe.lock().last_target,
            Some(Rect {
                x: 40,
                y: 60,
                width: 720,
                height: 480
            })
        );

        surface.apply_options(&OptionSet {
            lock_integer_scaling: false,
            lock_aspect_ratio: false,
            ..OptionSet::default()
        });
        resize(&probe, 640, 480);
        surface.display_frame().unwrap();
        assert_eq!(
            probe.lock().last_target,
            Some(Rect {
                x: 0,
                y: 0,
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn test_failed_upload_is_retried() {
        let (presenter, view) = NullPresenter::new(16, 16);
        let surface = VideoSurface::new(Box::new(presenter));
        surface.start_display().unwrap();
        publish(&surface, &[7; 64], 4, 4);

        view.lock().fail_uploads = 1;
        assert!(matches!(
            surface.display_frame(),
            Err(SurfaceError::Allocation(_))
        ));
        assert_eq!(view.lock().presents, 0);

        // Nothing new was published, the same frame is uploaded again
        assert_eq!(
            surface.display_frame().unwrap(),
            DisplayOutcome::Presented { new_frame: true }
        );
        assert_eq!(
            surface.display_frame().unwrap(),
            DisplayOutcome::Presented { new_frame: false }
        );
        let view = view.lock();
        assert_eq!(view.uploads, 1);
        assert!(view.image.iter().all(|&b| b == 7));
        assert_eq!(surface.stats().uploaded, 1);
    }

    #[test]
    fn test_only_latest_frame_shown() {
        let (presenter, probe) = NullPresenter::new(4, 4);
        let surface = VideoSurface::new(Box::new(presenter));
        surface.set_integer_scaling_enabled(true);
        surface.start_display().unwrap();

        publish(&surface, &[1; 16], 2, 2);
        publish(&surface, &[2; 16], 2, 2);
        surface.display_frame().unwrap();

        assert_eq!(surface.stats().dropped, 1);
        assert!(probe.lock().image.iter().all(|&b| b == 2));
    }

    #[test]
    fn test_failed_init_surfaces_error() {
        let surface = VideoSurface::new(Box::new(NullPresenter::failing()));
        assert!(matches!(
            surface.start_display(),
            Err(SurfaceError::Allocation(_))
        ));
        assert!(!surface.is_displaying());
    }

    #[test]
    fn test_display_link_presents_and_stops() {
        let (presenter, probe) = NullPresenter::new(32, 32);
        let surface = VideoSurface::new(Box::new(presenter));
        publish(&surface, &gradient(8, 8), 8, 8);
        surface.start_display_link(200.0).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while probe.lock().presents < 3 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }

        surface.stop_display();
        assert!(!surface.is_displaying());
        assert!(!probe.lock().initialized);
        let presents = probe.lock().presents;
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(probe.lock().presents, presents);
    }

    #[test]
    fn test_invalid_display_rate() {
        let (presenter, _) = NullPresenter::new(8, 8);
        let surface = VideoSurface::new(Box::new(presenter));
        assert!(surface.start_display_link(0.0).is_err());
        assert!(surface.start_display_link(f64::NAN).is_err());
    }
}
