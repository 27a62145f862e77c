//! Audio session configuration model
//!
//! These types mirror the platform audio session: a category, a mode, a set
//! of category options and an output port override. A configuration is only
//! ever applied to hardware after it passes [`AudioSessionConfiguration::is_valid`].

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Audio session category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCategory {
    Ambient,
    SoloAmbient,
    Playback,
    Record,
    PlayAndRecord,
    MultiRoute,
}

impl AudioCategory {
    /// Whether the category captures microphone input
    pub fn allows_recording(&self) -> bool {
        matches!(self, Self::PlayAndRecord | Self::Record)
    }
}

impl fmt::Display for AudioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ambient => "ambient",
            Self::SoloAmbient => "soloAmbient",
            Self::Playback => "playback",
            Self::Record => "record",
            Self::PlayAndRecord => "playAndRecord",
            Self::MultiRoute => "multiRoute",
        };
        f.write_str(name)
    }
}

/// Audio session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    #[default]
    Default,
    VoiceChat,
    VideoChat,
    GameChat,
    VideoRecording,
    Measurement,
    MoviePlayback,
    SpokenAudio,
    VoicePrompt,
}

impl AudioMode {
    /// Modes that run voice processing force mono playout
    pub fn supports_stereo_playout(&self) -> bool {
        !matches!(
            self,
            Self::VoiceChat | Self::VideoChat | Self::GameChat | Self::VoicePrompt
        )
    }
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::VoiceChat => "voiceChat",
            Self::VideoChat => "videoChat",
            Self::GameChat => "gameChat",
            Self::VideoRecording => "videoRecording",
            Self::Measurement => "measurement",
            Self::MoviePlayback => "moviePlayback",
            Self::SpokenAudio => "spokenAudio",
            Self::VoicePrompt => "voicePrompt",
        };
        f.write_str(name)
    }
}

/// Set of audio session category options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryOptions(u32);

impl CategoryOptions {
    pub const NONE: Self = Self(0);
    pub const MIX_WITH_OTHERS: Self = Self(0x1);
    pub const DUCK_OTHERS: Self = Self(0x2);
    pub const ALLOW_BLUETOOTH_HFP: Self = Self(0x4);
    pub const DEFAULT_TO_SPEAKER: Self = Self(0x8);
    pub const INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS: Self = Self(0x11);
    pub const ALLOW_BLUETOOTH_A2DP: Self = Self(0x20);
    pub const ALLOW_AIR_PLAY: Self = Self(0x40);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::MIX_WITH_OTHERS, "mixWithOthers"),
        (Self::DUCK_OTHERS, "duckOthers"),
        (Self::ALLOW_BLUETOOTH_HFP, "allowBluetoothHFP"),
        (Self::DEFAULT_TO_SPEAKER, "defaultToSpeaker"),
        (Self::INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS, "interruptSpokenAudioAndMixWithOthers"),
        (Self::ALLOW_BLUETOOTH_A2DP, "allowBluetoothA2DP"),
        (Self::ALLOW_AIR_PLAY, "allowAirPlay"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Whether every option in `other` is also set here
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for CategoryOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for CategoryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(option, _)| self.contains(*option))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Output port override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortOverride {
    #[default]
    None,
    Speaker,
}

impl fmt::Display for PortOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Speaker => f.write_str("speaker"),
        }
    }
}

/// Category, mode, options and port override of the audio session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSessionConfiguration {
    pub category: AudioCategory,
    pub mode: AudioMode,
    pub options: CategoryOptions,
    pub override_output_port: PortOverride,
}

impl AudioSessionConfiguration {
    pub fn new(category: AudioCategory, mode: AudioMode, options: CategoryOptions) -> Self {
        Self {
            category,
            mode,
            options,
            override_output_port: PortOverride::None,
        }
    }

    /// Same category, mode and options
    pub fn same_session(&self, other: &Self) -> bool {
        self.category == other.category && self.mode == other.mode && self.options == other.options
    }
}

impl Default for AudioSessionConfiguration {
    fn default() -> Self {
        Self::new(AudioCategory::SoloAmbient, AudioMode::Default, CategoryOptions::NONE)
    }
}

impl fmt::Display for AudioSessionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ category:{}, mode:{}, options:{}, overrideOutputAudioPort:{} }}",
            self.category, self.mode, self.options, self.override_output_port
        )
    }
}

/// Settings of the WebRTC audio session wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WebRtcAudioSessionConfiguration {
    pub is_audio_enabled: bool,
    pub use_manual_audio: bool,
    pub prefers_no_interruptions_from_system_alerts: bool,
}

/// Kind of an audio port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    BuiltInMic,
    BuiltInSpeaker,
    BuiltInReceiver,
    Headphones,
    HeadsetMic,
    BluetoothA2dp,
    BluetoothHfp,
    BluetoothLe,
    CarAudio,
    AirPlay,
    Usb,
    Other,
}

impl PortType {
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::BluetoothA2dp | Self::BluetoothLe | Self::BluetoothHfp | Self::CarAudio | Self::Headphones
        )
    }
}

/// One input or output of the current route
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioPort {
    pub port_type: PortType,
    pub name: String,
    pub id: String,
    pub channels: u32,
}

impl AudioPort {
    pub fn new(port_type: PortType, name: impl Into<String>, id: impl Into<String>, channels: u32) -> Self {
        Self {
            port_type,
            name: name.into(),
            id: id.into(),
            channels,
        }
    }
}

/// Inputs and outputs currently in use
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AudioRoute {
    pub inputs: Vec<AudioPort>,
    pub outputs: Vec<AudioPort>,
}

impl AudioRoute {
    pub fn new(inputs: Vec<AudioPort>, outputs: Vec<AudioPort>) -> Self {
        Self { inputs, outputs }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_external(&self) -> bool {
        self.outputs.iter().any(|p| p.port_type.is_external())
    }

    pub fn is_speaker(&self) -> bool {
        self.outputs.iter().any(|p| p.port_type == PortType::BuiltInSpeaker)
    }

    pub fn is_receiver(&self) -> bool {
        self.outputs.iter().any(|p| p.port_type == PortType::BuiltInReceiver)
    }

    /// At least one output renders two or more channels
    pub fn supports_stereo_playout(&self) -> bool {
        self.outputs.iter().any(|p| p.channels >= 2)
    }
}

/// Stereo playout preference and what the hardware currently allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StereoPlayout {
    pub preferred: bool,
    pub enabled: bool,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StereoConfiguration {
    pub playout: StereoPlayout,
}

/// Process-wide configuration the WebRTC audio stack restarts from
///
/// Shared by clone; the audio session reducer writes it after every
/// successful reconfiguration.
#[derive(Debug, Clone, Default)]
pub struct WebRtcAudioDefaults {
    inner: Arc<RwLock<AudioSessionConfiguration>>,
}

impl WebRtcAudioDefaults {
    pub fn new(configuration: AudioSessionConfiguration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(configuration)),
        }
    }

    pub fn get(&self) -> AudioSessionConfiguration {
        *self.inner.read()
    }

    pub fn set(&self, configuration: AudioSessionConfiguration) {
        *self.inner.write() = configuration;
    }
}
