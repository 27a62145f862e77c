//! Audio session configuration derived from call settings

use vidcall_signal_core::CallSettings;

use crate::session::{AudioCategory, AudioMode, AudioSessionConfiguration, CategoryOptions, PortOverride};

/// Maps call settings to the audio session a call needs
#[derive(Debug, Default, Clone, Copy)]
pub struct CallAudioPolicy;

impl CallAudioPolicy {
    pub fn configuration(settings: &CallSettings) -> AudioSessionConfiguration {
        let mode = if settings.video_on {
            AudioMode::VideoChat
        } else {
            AudioMode::VoiceChat
        };

        let mut options = CategoryOptions::ALLOW_BLUETOOTH_HFP | CategoryOptions::ALLOW_BLUETOOTH_A2DP;
        if settings.speaker_on {
            options.insert(CategoryOptions::DEFAULT_TO_SPEAKER);
        }

        AudioSessionConfiguration {
            category: AudioCategory::PlayAndRecord,
            mode,
            options,
            override_output_port: if settings.speaker_on {
                PortOverride::Speaker
            } else {
                PortOverride::None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_output_is_always_valid() {
        for (video_on, speaker_on) in [(true, true), (true, false), (false, true), (false, false)] {
            let settings = CallSettings {
                video_on,
                speaker_on,
                ..CallSettings::default()
            };
            let configuration = CallAudioPolicy::configuration(&settings);
            assert!(configuration.is_valid(), "{}", configuration);
        }
    }

    #[test]
    fn test_audio_only_call_uses_voice_chat_on_receiver() {
        let settings = CallSettings {
            video_on: false,
            speaker_on: false,
            ..CallSettings::default()
        };
        let configuration = CallAudioPolicy::configuration(&settings);
        assert_eq!(configuration.mode, AudioMode::VoiceChat);
        assert_eq!(configuration.override_output_port, PortOverride::None);
        assert!(!configuration.options.contains(CategoryOptions::DEFAULT_TO_SPEAKER));
    }
}
