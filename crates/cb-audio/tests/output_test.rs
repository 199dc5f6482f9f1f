//! Audio output fed by a live core thread

use cb_audio::{AudioOutput, NullAudioBackend};
use cb_core::pattern::PatternCoreFactory;
use cb_core::rom::test_images;
use cb_core::{Config, CoreOption, RomImage};
use cb_integration::CoreBridge;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn running_bridge(root: &std::path::Path) -> CoreBridge {
    let config = Config::with_save_root(root);
    let bridge = CoreBridge::new(Arc::new(PatternCoreFactory::new()), config);
    let rom = RomImage::from_bytes("audio.gba", test_images::gba("AUDIO")).unwrap();
    bridge.start_image(rom).unwrap();
    bridge
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_core_samples_reach_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = running_bridge(dir.path());

    let (backend, capture) = NullAudioBackend::new().with_capture();
    let mut output = AudioOutput::with_backend(bridge.handle().unwrap(), Box::new(backend));
    let spec = output.start().unwrap();
    assert_eq!(spec.sample_rate, bridge.options().sample_rate);

    wait_for("audible samples", || capture.lock().iter().any(|&s| s != 0.0));
    assert!(output.stats().buffers > 0);

    output.stop();
    bridge.stop();
}

#[test]
fn test_mute_silences_output() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = running_bridge(dir.path());
    bridge.set_option(CoreOption::Mute(true)).unwrap();

    let (backend, capture) = NullAudioBackend::new().with_capture();
    let mut output = AudioOutput::with_backend(bridge.handle().unwrap(), Box::new(backend));
    output.start().unwrap();

    wait_for("rendered buffers", || output.stats().buffers >= 4);
    assert!(capture.lock().iter().all(|&s| s == 0.0));

    output.stop();
    bridge.stop();
}

#[test]
fn test_device_rate_mismatch_is_resampled() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = running_bridge(dir.path());

    let (backend, capture) = NullAudioBackend::new()
        .with_device_rate(48000)
        .with_device_channels(1)
        .with_capture();
    let mut output = AudioOutput::with_backend(bridge.handle().unwrap(), Box::new(backend));
    let spec = output.start().unwrap();
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.channels, 1);

    wait_for("audible samples", || capture.lock().iter().any(|&s| s != 0.0));
    output.stop();
    bridge.stop();
}

#[test]
fn test_output_outlives_session() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = running_bridge(dir.path());

    let (backend, capture) = NullAudioBackend::new().with_capture();
    let mut output = AudioOutput::with_backend(bridge.handle().unwrap(), Box::new(backend));
    let spec = output.start().unwrap();
    bridge.stop();

    // The sink keeps pulling silence from the dead handle. Skip the buffer
    // that may have been rendered while the session was ending.
    let buffer = (spec.buffer_frames * spec.channels as u32) as usize;
    let from = capture.lock().len() + buffer;
    wait_for("more buffers", || capture.lock().len() > from);
    let captured = capture.lock();
    assert!(captured[from..].iter().all(|&s| s == 0.0));
    drop(captured);
    output.stop();
}
