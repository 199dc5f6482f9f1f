//! Runtime options.
//!
//! The set of options is closed: every name a host can set is a variant of
//! [`CoreOption`], and [`OptionSet`] carries the current value of each.
//! Values arriving by name go through [`CoreOption::parse`], which checks
//! the type and the allowed range before anything is stored.

use crate::error::OptionError;
use crate::palette;
use serde::{Deserialize, Serialize};

/// How the core treats busy-wait idle loops in game code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdleOptimization {
    Ignore,
    #[default]
    Remove,
    Detect,
}

impl IdleOptimization {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdleOptimization::Ignore => "ignore",
            IdleOptimization::Remove => "remove",
            IdleOptimization::Detect => "detect",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "ignore" => Some(IdleOptimization::Ignore),
            "remove" => Some(IdleOptimization::Remove),
            "detect" => Some(IdleOptimization::Detect),
            _ => None,
        }
    }
}

/// Untyped option value as supplied by a host
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v.into())
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Int(v.into())
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

impl From<IdleOptimization> for OptionValue {
    fn from(v: IdleOptimization) -> Self {
        OptionValue::Text(v.as_str().to_string())
    }
}

enum Reject {
    Type,
    Range(String),
}

/// Typed extraction from an [`OptionValue`]
trait FromOptionValue: Sized {
    const EXPECTED: &'static str;
    fn from_option_value(value: OptionValue) -> Result<Self, Reject>;
}

impl FromOptionValue for bool {
    const EXPECTED: &'static str = "boolean";
    fn from_option_value(value: OptionValue) -> Result<Self, Reject> {
        match value {
            OptionValue::Bool(v) => Ok(v),
            _ => Err(Reject::Type),
        }
    }
}

impl FromOptionValue for u32 {
    const EXPECTED: &'static str = "integer";
    fn from_option_value(value: OptionValue) -> Result<Self, Reject> {
        match value {
            OptionValue::Int(v) => u32::try_from(v).map_err(|_| Reject::Range(v.to_string())),
            _ => Err(Reject::Type),
        }
    }
}

impl FromOptionValue for f64 {
    const EXPECTED: &'static str = "number";
    fn from_option_value(value: OptionValue) -> Result<Self, Reject> {
        match value {
            OptionValue::Float(v) => Ok(v),
            OptionValue::Int(v) => Ok(v as f64),
            _ => Err(Reject::Type),
        }
    }
}

impl FromOptionValue for String {
    const EXPECTED: &'static str = "string";
    fn from_option_value(value: OptionValue) -> Result<Self, Reject> {
        match value {
            OptionValue::Text(v) => Ok(v),
            _ => Err(Reject::Type),
        }
    }
}

impl FromOptionValue for IdleOptimization {
    const EXPECTED: &'static str = "string";
    fn from_option_value(value: OptionValue) -> Result<Self, Reject> {
        match value {
            OptionValue::Text(v) => IdleOptimization::from_name(&v).ok_or(Reject::Range(v)),
            _ => Err(Reject::Type),
        }
    }
}

/// Current value of every runtime option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionSet {
    pub video_sync: bool,
    pub audio_sync: bool,
    pub fps_target: f64,
    pub volume: u32,
    pub mute: bool,
    pub frameskip: u32,
    pub allow_opposing_directions: bool,
    pub skip_bios: bool,
    pub use_bios: bool,
    pub idle_optimization: IdleOptimization,
    pub autoload: bool,
    pub autosave: bool,
    pub show_osd: bool,
    pub show_frame_counter: bool,
    pub show_reset_info: bool,
    pub interframe_blending: bool,
    pub resample_video: bool,
    pub lock_aspect_ratio: bool,
    pub lock_integer_scaling: bool,
    pub vba_bug_compat: bool,
    /// Host buffer size in frames
    pub audio_buffers: u32,
    pub sample_rate: u32,
    pub gba_force_gbp: bool,
    pub fast_forward_mute: bool,
    pub fast_forward_volume: u32,
    pub log_to_file: bool,
    pub log_to_stdout: bool,
    pub log_file: String,
    pub log_level: u32,
    pub rewind_enable: bool,
    /// Seconds of history
    pub rewind_buffer_capacity: u32,
    /// Milliseconds between snapshots
    pub rewind_buffer_interval: u32,
    /// Speed multiplier while fast-forward is toggled on; `<= 0` is unbounded
    pub fast_forward_ratio: f64,
    /// Speed multiplier while fast-forward is held; `<= 0` is unbounded
    pub fast_forward_held_ratio: f64,
    pub sgb_borders: bool,
    /// Empty selects the core's own default palette
    pub gb_palette_preset: String,
}

impl Default for OptionSet {
    fn default() -> Self {
        Self {
            video_sync: false,
            audio_sync: false,
            fps_target: 60.0,
            volume: 100,
            mute: false,
            frameskip: 0,
            allow_opposing_directions: true,
            skip_bios: true,
            use_bios: false,
            idle_optimization: IdleOptimization::default(),
            autoload: true,
            autosave: false,
            show_osd: true,
            show_frame_counter: false,
            show_reset_info: false,
            interframe_blending: false,
            resample_video: false,
            lock_aspect_ratio: true,
            lock_integer_scaling: false,
            vba_bug_compat: true,
            audio_buffers: 1024,
            sample_rate: 44100,
            gba_force_gbp: false,
            fast_forward_mute: false,
            fast_forward_volume: 100,
            log_to_file: false,
            log_to_stdout: false,
            log_file: String::new(),
            log_level: 0x7F,
            rewind_enable: false,
            rewind_buffer_capacity: 10,
            rewind_buffer_interval: 250,
            fast_forward_ratio: -1.0,
            fast_forward_held_ratio: -1.0,
            sgb_borders: true,
            gb_palette_preset: String::new(),
        }
    }
}

macro_rules! core_options {
    ($( $variant:ident($ty:ty) => $field:ident; )*) => {
        /// One named option with its typed value
        #[derive(Debug, Clone, PartialEq)]
        pub enum CoreOption {
            $( $variant($ty), )*
        }

        /// Every option name, in declaration order
        pub const OPTION_NAMES: &[&str] = &[$( stringify!($field) ),*];

        impl CoreOption {
            /// The option's name as used by [`CoreOption::parse`]
            pub fn name(&self) -> &'static str {
                match self {
                    $( CoreOption::$variant(_) => stringify!($field), )*
                }
            }

            /// The value in untyped form
            pub fn value(&self) -> OptionValue {
                match self {
                    $( CoreOption::$variant(v) => v.clone().into(), )*
                }
            }

            fn from_name_value(name: &str, value: OptionValue) -> Result<Self, OptionError> {
                let reject = |r: Reject, expected: &'static str| match r {
                    Reject::Type => OptionError::TypeMismatch {
                        name: name.to_string(),
                        expected,
                    },
                    Reject::Range(value) => OptionError::OutOfRange {
                        name: name.to_string(),
                        value,
                    },
                };
                match name {
                    $(
                        stringify!($field) => <$ty as FromOptionValue>::from_option_value(value)
                            .map(CoreOption::$variant)
                            .map_err(|r| reject(r, <$ty as FromOptionValue>::EXPECTED)),
                    )*
                    _ => Err(OptionError::Unknown(name.to_string())),
                }
            }
        }

        impl OptionSet {
            fn store(&mut self, option: CoreOption) {
                match option {
                    $( CoreOption::$variant(v) => self.$field = v, )*
                }
            }

            /// The whole set as individual options, in declaration order
            pub fn to_options(&self) -> Vec<CoreOption> {
                vec![$( CoreOption::$variant(self.$field.clone()), )*]
            }
        }
    };
}

core_options! {
    VideoSync(bool) => video_sync;
    AudioSync(bool) => audio_sync;
    FpsTarget(f64) => fps_target;
    Volume(u32) => volume;
    Mute(bool) => mute;
    Frameskip(u32) => frameskip;
    AllowOpposingDirections(bool) => allow_opposing_directions;
    SkipBios(bool) => skip_bios;
    UseBios(bool) => use_bios;
    IdleOptimization(IdleOptimization) => idle_optimization;
    Autoload(bool) => autoload;
    Autosave(bool) => autosave;
    ShowOsd(bool) => show_osd;
    ShowFrameCounter(bool) => show_frame_counter;
    ShowResetInfo(bool) => show_reset_info;
    InterframeBlending(bool) => interframe_blending;
    ResampleVideo(bool) => resample_video;
    LockAspectRatio(bool) => lock_aspect_ratio;
    LockIntegerScaling(bool) => lock_integer_scaling;
    VbaBugCompat(bool) => vba_bug_compat;
    AudioBuffers(u32) => audio_buffers;
    SampleRate(u32) => sample_rate;
    GbaForceGbp(bool) => gba_force_gbp;
    FastForwardMute(bool) => fast_forward_mute;
    FastForwardVolume(u32) => fast_forward_volume;
    LogToFile(bool) => log_to_file;
    LogToStdout(bool) => log_to_stdout;
    LogFile(String) => log_file;
    LogLevel(u32) => log_level;
    RewindEnable(bool) => rewind_enable;
    RewindBufferCapacity(u32) => rewind_buffer_capacity;
    RewindBufferInterval(u32) => rewind_buffer_interval;
    FastForwardRatio(f64) => fast_forward_ratio;
    FastForwardHeldRatio(f64) => fast_forward_held_ratio;
    SgbBorders(bool) => sgb_borders;
    GbPalettePreset(String) => gb_palette_preset;
}

fn check_int(name: &'static str, v: u32, min: u32, max: u32) -> Result<(), OptionError> {
    if (min..=max).contains(&v) {
        Ok(())
    } else {
        Err(OptionError::OutOfRange {
            name: name.to_string(),
            value: v.to_string(),
        })
    }
}

fn float_out_of_range(name: &'static str, v: f64) -> OptionError {
    OptionError::OutOfRange {
        name: name.to_string(),
        value: v.to_string(),
    }
}

impl CoreOption {
    /// Parse a named value into a validated option
    pub fn parse(name: &str, value: impl Into<OptionValue>) -> Result<Self, OptionError> {
        let option = Self::from_name_value(name, value.into())?;
        option.validate()?;
        Ok(option)
    }

    /// Check the value against the option's allowed range
    pub fn validate(&self) -> Result<(), OptionError> {
        let name = self.name();
        match self {
            CoreOption::FpsTarget(v) => {
                if v.is_finite() && *v > 0.0 && *v <= 240.0 {
                    Ok(())
                } else {
                    Err(float_out_of_range(name, *v))
                }
            }
            CoreOption::FastForwardRatio(v) | CoreOption::FastForwardHeldRatio(v) => {
                if v.is_finite() && *v <= 16.0 {
                    Ok(())
                } else {
                    Err(float_out_of_range(name, *v))
                }
            }
            CoreOption::Volume(v) | CoreOption::FastForwardVolume(v) => check_int(name, *v, 0, 100),
            CoreOption::Frameskip(v) => check_int(name, *v, 0, 9),
            CoreOption::AudioBuffers(v) => check_int(name, *v, 512, 8192),
            CoreOption::SampleRate(v) => check_int(name, *v, 8000, 96000),
            CoreOption::LogLevel(v) => check_int(name, *v, 0, 0x7F),
            CoreOption::RewindBufferCapacity(v) => check_int(name, *v, 1, 600),
            CoreOption::RewindBufferInterval(v) => check_int(name, *v, 16, 10_000),
            CoreOption::GbPalettePreset(v) => {
                if v.is_empty() || palette::find_preset(v).is_some() {
                    Ok(())
                } else {
                    Err(OptionError::UnknownPreset(v.clone()))
                }
            }
            _ => Ok(()),
        }
    }

    /// Whether the core itself needs to see this option.
    ///
    /// Options consumed only by the host side (pacing, audio mix, scaling,
    /// rewind, save policy) are handled without involving the core.
    pub fn reaches_core(&self) -> bool {
        !matches!(
            self,
            CoreOption::FpsTarget(_)
                | CoreOption::Volume(_)
                | CoreOption::Mute(_)
                | CoreOption::Frameskip(_)
                | CoreOption::AllowOpposingDirections(_)
                | CoreOption::Autoload(_)
                | CoreOption::Autosave(_)
                | CoreOption::LockAspectRatio(_)
                | CoreOption::LockIntegerScaling(_)
                | CoreOption::AudioBuffers(_)
                | CoreOption::FastForwardMute(_)
                | CoreOption::FastForwardVolume(_)
                | CoreOption::RewindEnable(_)
                | CoreOption::RewindBufferCapacity(_)
                | CoreOption::RewindBufferInterval(_)
                | CoreOption::FastForwardRatio(_)
                | CoreOption::FastForwardHeldRatio(_)
        )
    }
}

impl OptionSet {
    /// Validate and store one option. Last write wins.
    pub fn apply(&mut self, option: CoreOption) -> Result<(), OptionError> {
        option.validate()?;
        self.store(option);
        Ok(())
    }

    /// Current value of a named option
    pub fn get(&self, name: &str) -> Option<OptionValue> {
        self.to_options()
            .into_iter()
            .find(|o| o.name() == name)
            .map(|o| o.value())
    }

    /// Check every value, e.g. after loading from a config file
    pub fn validate(&self) -> Result<(), OptionError> {
        self.to_options().iter().try_for_each(CoreOption::validate)
    }

    /// Frame duration implied by `fps_target`
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps_target.clamp(1.0, 240.0))
    }
}
