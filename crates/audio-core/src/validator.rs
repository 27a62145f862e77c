//! Allow-list of legal audio session combinations

use crate::session::{AudioCategory, AudioMode, AudioSessionConfiguration, CategoryOptions};

struct Allowed {
    modes: &'static [AudioMode],
    options: CategoryOptions,
}

const AMBIENT_OPTIONS: CategoryOptions = CategoryOptions::MIX_WITH_OTHERS
    .union(CategoryOptions::DUCK_OTHERS)
    .union(CategoryOptions::INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS);

fn allowed(category: AudioCategory) -> Allowed {
    use AudioMode::*;

    match category {
        AudioCategory::Playback => Allowed {
            modes: &[Default, MoviePlayback, SpokenAudio, VoicePrompt],
            options: AMBIENT_OPTIONS
                .union(CategoryOptions::DEFAULT_TO_SPEAKER)
                .union(CategoryOptions::ALLOW_BLUETOOTH_A2DP)
                .union(CategoryOptions::ALLOW_AIR_PLAY),
        },
        AudioCategory::PlayAndRecord => Allowed {
            modes: &[
                Default,
                VoiceChat,
                VideoChat,
                GameChat,
                VideoRecording,
                Measurement,
                SpokenAudio,
                VoicePrompt,
            ],
            options: AMBIENT_OPTIONS
                .union(CategoryOptions::DEFAULT_TO_SPEAKER)
                .union(CategoryOptions::ALLOW_BLUETOOTH_HFP)
                .union(CategoryOptions::ALLOW_BLUETOOTH_A2DP)
                .union(CategoryOptions::ALLOW_AIR_PLAY),
        },
        AudioCategory::Record => Allowed {
            modes: &[Default, Measurement],
            options: CategoryOptions::DUCK_OTHERS,
        },
        AudioCategory::MultiRoute => Allowed {
            modes: &[Default, Measurement],
            options: CategoryOptions::MIX_WITH_OTHERS,
        },
        AudioCategory::Ambient | AudioCategory::SoloAmbient => Allowed {
            modes: &[Default],
            options: AMBIENT_OPTIONS,
        },
    }
}

/// Whether `category`, `mode` and `options` form a legal combination
pub fn validate(category: AudioCategory, mode: AudioMode, options: CategoryOptions) -> bool {
    let allowed = allowed(category);
    allowed.modes.contains(&mode) && allowed.options.contains(options)
}

impl AudioSessionConfiguration {
    pub fn is_valid(&self) -> bool {
        validate(self.category, self.mode, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_configuration_is_valid() {
        assert!(validate(
            AudioCategory::PlayAndRecord,
            AudioMode::VoiceChat,
            CategoryOptions::ALLOW_BLUETOOTH_HFP | CategoryOptions::DEFAULT_TO_SPEAKER
        ));
        assert!(validate(AudioCategory::Playback, AudioMode::Default, CategoryOptions::NONE));
    }

    #[test]
    fn test_recording_options_need_play_and_record() {
        assert!(!validate(
            AudioCategory::Playback,
            AudioMode::Default,
            CategoryOptions::ALLOW_BLUETOOTH_HFP
        ));
        assert!(!validate(
            AudioCategory::Ambient,
            AudioMode::Default,
            CategoryOptions::DEFAULT_TO_SPEAKER
        ));
    }

    #[test]
    fn test_mode_must_match_category() {
        assert!(!validate(AudioCategory::Playback, AudioMode::VoiceChat, CategoryOptions::NONE));
        assert!(!validate(AudioCategory::Record, AudioMode::VideoChat, CategoryOptions::NONE));
        assert!(validate(AudioCategory::Record, AudioMode::Measurement, CategoryOptions::DUCK_OTHERS));
    }
}
