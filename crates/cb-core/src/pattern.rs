//! Deterministic reference core.
//!
//! `PatternCore` satisfies the [`Core`] contract without emulating any
//! hardware. Its picture is a diagonal shade pattern driven by the ROM
//! checksum, the frame counter, the held keys and the selected palette.
//! It plays a square wave and records held keys into battery memory. Two
//! instances fed the same inputs produce byte-identical output, which makes
//! it suitable for exercising the bridge end to end.

use crate::engine::{Core, CoreFactory, CoreInfo, LockstepLink};
use crate::error::LoadError;
use crate::frame::{FrameRef, BYTES_PER_PIXEL};
use crate::keys::Keys;
use crate::options::{CoreOption, OptionSet};
use crate::palette::{self, PalettePreset};
use crate::rom::RomImage;
use bytemuck::{Pod, Zeroable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Battery memory size
pub const SRAM_SIZE: usize = 32 * 1024;

const NATIVE_FPS: f64 = 59.7275;
const STATE_MAGIC: u32 = u32::from_le_bytes(*b"PTRN");
const STATE_VERSION: u32 = 1;
const TONE_HZ: u32 = 440;
const TONE_AMPLITUDE: i16 = 0x0800;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct StateHeader {
    magic: u32,
    version: u32,
    frame: u64,
    seed: u32,
    phase: u32,
    last_keys: u32,
    sram_len: u32,
}

const HEADER_LEN: usize = std::mem::size_of::<StateHeader>();

/// Reference core producing a test pattern and tone
pub struct PatternCore {
    info: CoreInfo,
    seed: u32,
    frame: u64,
    /// Tone phase in samples
    phase: u32,
    /// Fractional samples carried between frames
    sample_carry: f64,
    last_keys: Keys,
    pixels: Vec<u8>,
    sram: Vec<u8>,
    battery_dirty: bool,
    sample_rate: u32,
    palette: &'static PalettePreset,
    link: Option<Arc<dyn LockstepLink>>,
}

impl PatternCore {
    pub fn new(rom: &RomImage, options: &OptionSet) -> Self {
        let (width, height) = rom.platform.screen_size();
        let mut core = Self {
            info: CoreInfo {
                title: rom.title.clone(),
                platform: rom.platform,
                width,
                height,
                fps: NATIVE_FPS,
            },
            seed: rom.checksum(),
            frame: 0,
            phase: 0,
            sample_carry: 0.0,
            last_keys: Keys::empty(),
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
            sram: vec![0; SRAM_SIZE],
            battery_dirty: false,
            sample_rate: options.sample_rate,
            palette: palette::find_preset(&options.gb_palette_preset)
                .unwrap_or_else(palette::default_preset),
            link: None,
        };
        core.render();
        core
    }

    /// Frames emulated since power-on
    pub fn frame_counter(&self) -> u64 {
        self.frame
    }

    pub fn palette_name(&self) -> &'static str {
        self.palette.name
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    fn render(&mut self) {
        let width = self.info.width as usize;
        let keys = self.last_keys.bits();
        let offset = (self.frame as u32).wrapping_add(self.seed);
        for (i, px) in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let x = (i % width) as u32;
            let y = (i / width) as u32;
            let band = x.wrapping_add(y).wrapping_add(offset) / 8;
            let shade = (band ^ keys) as usize & 3;
            px.copy_from_slice(&self.palette.rgba(shade));
        }
    }

    fn synthesize(&mut self, audio: &mut Vec<i16>) {
        self.sample_carry += self.sample_rate as f64 / NATIVE_FPS;
        let count = self.sample_carry.floor() as usize;
        self.sample_carry -= count as f64;

        // Pitch rises one step per held button so input is audible
        let hz = TONE_HZ + 55 * self.last_keys.bits().count_ones();
        let half_period = (self.sample_rate / (hz * 2)).max(1);

        audio.reserve(count * 2);
        for _ in 0..count {
            let high = (self.phase / half_period) % 2 == 0;
            let sample = if high { TONE_AMPLITUDE } else { -TONE_AMPLITUDE };
            audio.push(sample);
            audio.push(sample);
            self.phase = self.phase.wrapping_add(1);
        }
    }
}

impl Core for PatternCore {
    fn info(&self) -> CoreInfo {
        self.info.clone()
    }

    fn reset(&mut self) {
        self.frame = 0;
        self.phase = 0;
        self.sample_carry = 0.0;
        self.last_keys = Keys::empty();
        self.render();
    }

    fn run_frame(&mut self, keys: Keys, audio: &mut Vec<i16>) -> bool {
        self.frame += 1;
        self.last_keys = keys;

        if !keys.is_empty() {
            let slot = (self.frame as usize) % SRAM_SIZE;
            self.sram[slot] = keys.bits() as u8;
            self.battery_dirty = true;
        }

        self.synthesize(audio);
        self.render();

        if let Some(link) = &self.link {
            link.frame_boundary(self.frame);
        }
        true
    }

    fn current_frame(&self) -> FrameRef<'_> {
        // The buffer is sized from `info` in `new`
        FrameRef::packed(&self.pixels, self.info.width, self.info.height).unwrap_or_default()
    }

    fn save_state(&self) -> Result<Vec<u8>, String> {
        let header = StateHeader {
            magic: STATE_MAGIC,
            version: STATE_VERSION,
            frame: self.frame,
            seed: self.seed,
            phase: self.phase,
            last_keys: self.last_keys.bits(),
            sram_len: self.sram.len() as u32,
        };
        let mut blob = Vec::with_capacity(HEADER_LEN + self.sram.len());
        blob.extend_from_slice(bytemuck::bytes_of(&header));
        blob.extend_from_slice(&self.sram);
        Ok(blob)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), String> {
        if data.len() < HEADER_LEN {
            return Err(format!("state too short ({} bytes)", data.len()));
        }
        let header: StateHeader = bytemuck::try_pod_read_unaligned(&data[..HEADER_LEN])
            .map_err(|e| format!("bad state header: {:?}", e))?;
        if header.magic != STATE_MAGIC || header.version != STATE_VERSION {
            return Err("not a state for this core".to_string());
        }
        if header.seed != self.seed {
            return Err("state belongs to a different game".to_string());
        }
        let sram = &data[HEADER_LEN..];
        if sram.len() != header.sram_len as usize || sram.len() != SRAM_SIZE {
            return Err(format!("battery section has {} bytes", sram.len()));
        }

        self.frame = header.frame;
        self.phase = header.phase;
        self.sample_carry = 0.0;
        self.last_keys = Keys::from_bits_retain(header.last_keys);
        self.sram.copy_from_slice(sram);
        self.battery_dirty = true;
        self.render();
        Ok(())
    }

    fn apply_option(&mut self, option: &CoreOption) {
        match option {
            CoreOption::SampleRate(rate) => self.sample_rate = *rate,
            CoreOption::GbPalettePreset(name) => {
                self.palette = palette::find_preset(name).unwrap_or_else(palette::default_preset);
                self.render();
            }
            other => tracing::trace!("Pattern core ignores {}", other.name()),
        }
    }

    fn load_battery(&mut self, data: &[u8]) {
        let len = data.len().min(self.sram.len());
        self.sram[..len].copy_from_slice(&data[..len]);
    }

    fn take_dirty_battery(&mut self) -> Option<Vec<u8>> {
        if self.battery_dirty {
            self.battery_dirty = false;
            Some(self.sram.clone())
        } else {
            None
        }
    }

    fn attach_link(&mut self, link: Arc<dyn LockstepLink>) {
        tracing::debug!("Link attached as player {}", link.player_index());
        self.link = Some(link);
    }

    fn detach_link(&mut self) {
        self.link = None;
    }
}

/// Factory for [`PatternCore`], counting how many cores it built
#[derive(Debug, Default)]
pub struct PatternCoreFactory {
    created: AtomicUsize,
    reject: Option<String>,
}

impl PatternCoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that refuses every image with `reason`
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            created: AtomicUsize::new(0),
            reject: Some(reason.into()),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl CoreFactory for PatternCoreFactory {
    fn create(&self, rom: RomImage, options: &OptionSet) -> Result<Box<dyn Core>, LoadError> {
        if let Some(reason) = &self.reject {
            return Err(LoadError::Core(reason.clone()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(PatternCore::new(&rom, options)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::test_images;

    fn core() -> PatternCore {
        let rom = RomImage::from_bytes("test.gba", test_images::gba("PATTERN")).unwrap();
        PatternCore::new(&rom, &OptionSet::default())
    }

    #[test]
    fn test_deterministic_frames() {
        let mut a = core();
        let mut b = core();
        let mut audio = Vec::new();
        for keys in [Keys::empty(), Keys::A, Keys::UP | Keys::B] {
            a.run_frame(keys, &mut audio);
            b.run_frame(keys, &mut audio);
        }
        assert_eq!(a.current_frame().pixels(), b.current_frame().pixels());
    }

    #[test]
    fn test_keys_change_picture() {
        let mut a = core();
        let mut b = core();
        let mut audio = Vec::new();
        a.run_frame(Keys::empty(), &mut audio);
        b.run_frame(Keys::A, &mut audio);
        assert_ne!(a.current_frame().pixels(), b.current_frame().pixels());
    }

    #[test]
    fn test_audio_rate() {
        let mut c = core();
        let mut audio = Vec::new();
        for _ in 0..60 {
            c.run_frame(Keys::empty(), &mut audio);
        }
        // One second of stereo at 44.1 kHz, give or take a frame
        let frames = audio.len() / 2;
        assert!((44_000..=44_400).contains(&frames), "{} frames", frames);
    }

    #[test]
    fn test_state_round_trip_restores_frame() {
        let mut c = core();
        let mut audio = Vec::new();
        c.run_frame(Keys::START, &mut audio);
        let saved_pixels = c.current_frame().pixels().to_vec();
        let blob = c.save_state().unwrap();

        c.run_frame(Keys::B, &mut audio);
        c.run_frame(Keys::empty(), &mut audio);
        c.load_state(&blob).unwrap();

        assert_eq!(c.current_frame().pixels(), &saved_pixels[..]);
        assert_eq!(c.frame_counter(), 1);
    }

    #[test]
    fn test_corrupt_state_rejected() {
        let mut c = core();
        assert!(c.load_state(&[1, 2, 3]).is_err());
        let mut blob = c.save_state().unwrap();
        blob[0] ^= 0xFF;
        assert!(c.load_state(&blob).is_err());
    }

    #[test]
    fn test_battery_dirty_tracking() {
        let mut c = core();
        let mut audio = Vec::new();
        assert!(c.take_dirty_battery().is_none());

        c.run_frame(Keys::A, &mut audio);
        let sram = c.take_dirty_battery().unwrap();
        assert_eq!(sram.len(), SRAM_SIZE);
        assert_eq!(sram[1], Keys::A.bits() as u8);
        assert!(c.take_dirty_battery().is_none());
    }

    #[test]
    fn test_palette_option() {
        let mut c = core();
        c.apply_option(&CoreOption::GbPalettePreset("DMG Green".to_string()));
        assert_eq!(c.palette_name(), "DMG Green");
        c.apply_option(&CoreOption::GbPalettePreset(String::new()));
        assert_eq!(c.palette_name(), "Grayscale");
    }

    #[test]
    fn test_factory_counts_and_rejects() {
        let rom = RomImage::from_bytes("t.gb", test_images::gb("T", false)).unwrap();
        let factory = PatternCoreFactory::new();
        let core = factory.create(rom.clone(), &OptionSet::default()).unwrap();
        assert_eq!(core.info().width, 160);
        assert_eq!(factory.created(), 1);

        let factory = PatternCoreFactory::rejecting("unsupported mapper");
        assert!(matches!(
            factory.create(rom, &OptionSet::default()),
            Err(LoadError::Core(_))
        ));
    }
}
