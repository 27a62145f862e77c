//! Encoder and decoder performance extraction
//!
//! Frame time and frame rate are computed over the interval since the
//! previous sample of the same track type. Without a previous sample the
//! cumulative counters and the native `framesPerSecond` are used instead.

use std::collections::{BTreeMap, HashMap};

use vidcall_peer_core::{RtcStatistic, RtcStatsReport};
use vidcall_signal_core::messages::Codec;
use vidcall_signal_core::models::VideoDimension;
use vidcall_signal_core::{PerformanceStats, TrackType};

use crate::collector::CallStatsReport;

/// Cumulative counters of the last sample of one track type
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameCounters {
    total_time_s: f64,
    frames: f64,
    timestamp_us: f64,
}

#[derive(Debug, Default)]
struct CounterHistory {
    previous: HashMap<TrackType, FrameCounters>,
}

impl CounterHistory {
    /// (average frame time in ms, average fps) since the previous sample
    fn averages(&mut self, track_type: TrackType, current: FrameCounters, native_fps: Option<f64>) -> (f32, f32) {
        let previous = self.previous.insert(track_type, current);

        let (time_s, frames) = match previous {
            Some(previous) if current.frames >= previous.frames => (
                current.total_time_s - previous.total_time_s,
                current.frames - previous.frames,
            ),
            _ => (current.total_time_s, current.frames),
        };

        let frame_time_ms = if frames > 0.0 { time_s / frames * 1000.0 } else { 0.0 };

        let fps = match previous {
            Some(previous) if current.timestamp_us > previous.timestamp_us && current.frames >= previous.frames => {
                let elapsed_s = (current.timestamp_us - previous.timestamp_us) / 1_000_000.0;
                frames / elapsed_s
            }
            _ => native_fps.unwrap_or(0.0),
        };

        (frame_time_ms.max(0.0) as f32, fps.max(0.0) as f32)
    }

    fn reset(&mut self) {
        self.previous.clear();
    }
}

/// Encoder performance of the published video tracks
#[derive(Debug, Default)]
pub struct EncoderStatsTransformer {
    history: CounterHistory,
}

impl EncoderStatsTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per published non-audio track type
    pub fn transform(&mut self, report: &CallStatsReport) -> Vec<PerformanceStats> {
        let Some(raw) = &report.publisher_raw_stats else {
            return Vec::new();
        };

        // first outbound unit per track type, in stat id order
        let mut units: BTreeMap<TrackType, &RtcStatistic> = BTreeMap::new();
        let mut outbound: Vec<&RtcStatistic> = raw
            .statistics
            .values()
            .filter(|s| s.stat_type == "outbound-rtp" && s.str_value("kind") != Some("audio"))
            .collect();
        outbound.sort_by(|a, b| a.id.cmp(&b.id));

        for unit in outbound {
            let track_type = unit
                .str_value("mediaSourceId")
                .and_then(|id| raw.statistics.get(id))
                .and_then(|source| source.str_value("trackIdentifier"))
                .and_then(|track_id| report.track_to_kind_map.get(track_id))
                .copied()
                .unwrap_or(TrackType::Video);
            units.entry(track_type).or_insert(unit);
        }

        units
            .into_iter()
            .map(|(track_type, unit)| {
                let counters = FrameCounters {
                    total_time_s: unit.f64_value("totalEncodeTime").unwrap_or(0.0),
                    frames: unit.f64_value("framesEncoded").unwrap_or(0.0),
                    timestamp_us: unit.timestamp_us,
                };
                let (avg_frame_time_ms, avg_fps) =
                    self.history
                        .averages(track_type, counters, unit.f64_value("framesPerSecond"));

                PerformanceStats {
                    track_type: Some(track_type),
                    codec: codec(raw, unit),
                    avg_frame_time_ms,
                    avg_fps,
                    video_dimension: dimension(unit),
                    target_bitrate: unit.f64_value("targetBitrate").unwrap_or(0.0) as i32,
                }
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.history.reset();
    }
}

/// Decoder performance of the largest received video
#[derive(Debug, Default)]
pub struct DecoderStatsTransformer {
    history: CounterHistory,
}

impl DecoderStatsTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform(&mut self, report: &CallStatsReport) -> Vec<PerformanceStats> {
        let Some(raw) = &report.subscriber_raw_stats else {
            return Vec::new();
        };

        let largest = raw
            .statistics
            .values()
            .filter(|s| s.stat_type == "inbound-rtp" && s.str_value("kind") == Some("video"))
            .max_by(|a, b| area(a).cmp(&area(b)).then_with(|| b.id.cmp(&a.id)));
        let Some(unit) = largest else {
            return Vec::new();
        };

        let track_type = unit
            .str_value("trackIdentifier")
            .and_then(|track_id| report.track_to_kind_map.get(track_id))
            .copied()
            .unwrap_or(TrackType::Video);
        let counters = FrameCounters {
            total_time_s: unit.f64_value("totalDecodeTime").unwrap_or(0.0),
            frames: unit.f64_value("framesDecoded").unwrap_or(0.0),
            timestamp_us: unit.timestamp_us,
        };
        let (avg_frame_time_ms, avg_fps) =
            self.history
                .averages(track_type, counters, unit.f64_value("framesPerSecond"));

        vec![PerformanceStats {
            track_type: Some(track_type),
            codec: codec(raw, unit),
            avg_frame_time_ms,
            avg_fps,
            video_dimension: dimension(unit),
            target_bitrate: 0,
        }]
    }

    pub fn reset(&mut self) {
        self.history.reset();
    }
}

fn area(statistic: &RtcStatistic) -> u64 {
    let dimension = dimension(statistic);
    u64::from(dimension.width) * u64::from(dimension.height)
}

fn dimension(statistic: &RtcStatistic) -> VideoDimension {
    VideoDimension {
        width: statistic.u64_value("frameWidth").unwrap_or(0) as u32,
        height: statistic.u64_value("frameHeight").unwrap_or(0) as u32,
    }
}

fn codec(raw: &RtcStatsReport, unit: &RtcStatistic) -> Codec {
    let Some(codec) = unit.str_value("codecId").and_then(|id| raw.statistics.get(id)) else {
        return Codec::default();
    };
    let mime_type = codec.str_value("mimeType").unwrap_or_default();
    Codec {
        name: mime_type.rsplit('/').next().unwrap_or_default().to_string(),
        clock_rate: codec.u64_value("clockRate").unwrap_or(0) as u32,
        payload_type: codec.u64_value("payloadType").unwrap_or(0) as u32,
        fmtp: codec.str_value("sdpFmtpLine").unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn vp8() -> RtcStatistic {
        RtcStatistic::new("COT01_96", "codec", 0.0)
            .with_value("mimeType", "video/VP8")
            .with_value("clockRate", 90_000)
            .with_value("payloadType", 96)
            .with_value("sdpFmtpLine", "x-google-start-bitrate=800")
    }

    fn outbound(id: &str, source: &str, timestamp_us: f64, frames: u64, encode_time: f64) -> RtcStatistic {
        RtcStatistic::new(id, "outbound-rtp", timestamp_us)
            .with_value("kind", "video")
            .with_value("codecId", "COT01_96")
            .with_value("mediaSourceId", source)
            .with_value("framesEncoded", frames)
            .with_value("totalEncodeTime", encode_time)
            .with_value("framesPerSecond", 24.0)
            .with_value("frameWidth", 1280)
            .with_value("frameHeight", 720)
            .with_value("targetBitrate", 1_200_000.0)
    }

    fn publisher_report(timestamp_us: f64, frames: u64, encode_time: f64) -> CallStatsReport {
        CallStatsReport {
            publisher_raw_stats: Some(RtcStatsReport::new(
                timestamp_us,
                [
                    vp8(),
                    RtcStatistic::new("SV1", "media-source", timestamp_us).with_value("trackIdentifier", "camera"),
                    RtcStatistic::new("SS2", "media-source", timestamp_us).with_value("trackIdentifier", "screen"),
                    outbound("OT01V1", "SV1", timestamp_us, frames, encode_time),
                    outbound("OT01V2", "SS2", timestamp_us, frames / 2, encode_time / 2.0),
                    RtcStatistic::new("OT01A0", "outbound-rtp", timestamp_us).with_value("kind", "audio"),
                ],
            )),
            subscriber_raw_stats: None,
            track_to_kind_map: HashMap::from([
                ("camera".to_string(), TrackType::Video),
                ("screen".to_string(), TrackType::ScreenShare),
            ]),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_encoder_reports_one_entry_per_video_track_type() {
        let mut transformer = EncoderStatsTransformer::new();
        let stats = transformer.transform(&publisher_report(1_000_000.0, 100, 1.0));

        assert_eq!(stats.len(), 2);
        let video = &stats[0];
        assert_eq!(video.track_type, Some(TrackType::Video));
        assert_eq!(video.codec.name, "VP8");
        assert_eq!(video.codec.clock_rate, 90_000);
        assert_eq!(video.codec.payload_type, 96);
        assert_eq!(video.codec.fmtp, "x-google-start-bitrate=800");
        assert_eq!(video.video_dimension, VideoDimension { width: 1280, height: 720 });
        assert_eq!(video.target_bitrate, 1_200_000);
        assert_eq!(stats[1].track_type, Some(TrackType::ScreenShare));
    }

    #[test]
    fn test_first_sample_uses_cumulative_counters() {
        let mut transformer = EncoderStatsTransformer::new();
        let stats = transformer.transform(&publisher_report(1_000_000.0, 100, 1.0));

        assert!((stats[0].avg_frame_time_ms - 10.0).abs() < 0.001);
        assert!((stats[0].avg_fps - 24.0).abs() < 0.001);
    }

    #[test]
    fn test_later_samples_use_the_interval() {
        let mut transformer = EncoderStatsTransformer::new();
        transformer.transform(&publisher_report(1_000_000.0, 100, 1.0));
        let stats = transformer.transform(&publisher_report(3_000_000.0, 160, 1.3));

        // 60 frames in 2 s taking 0.3 s in total
        assert!((stats[0].avg_frame_time_ms - 5.0).abs() < 0.001);
        assert!((stats[0].avg_fps - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_counter_reset_falls_back_to_cumulative() {
        let mut transformer = EncoderStatsTransformer::new();
        transformer.transform(&publisher_report(1_000_000.0, 100, 1.0));
        let stats = transformer.transform(&publisher_report(3_000_000.0, 10, 0.2));

        assert!((stats[0].avg_frame_time_ms - 20.0).abs() < 0.001);
        assert!((stats[0].avg_fps - 24.0).abs() < 0.001);
    }

    #[test]
    fn test_decoder_picks_the_largest_video() {
        let inbound = |id: &str, track: &str, width: u64, height: u64| {
            RtcStatistic::new(id, "inbound-rtp", 1_000_000.0)
                .with_value("kind", "video")
                .with_value("trackIdentifier", track)
                .with_value("codecId", "COT01_96")
                .with_value("frameWidth", width)
                .with_value("frameHeight", height)
                .with_value("framesDecoded", 50)
                .with_value("totalDecodeTime", 0.25)
        };
        let report = CallStatsReport {
            publisher_raw_stats: None,
            subscriber_raw_stats: Some(RtcStatsReport::new(
                1_000_000.0,
                [
                    vp8(),
                    inbound("IT01V1", "remote-camera", 640, 360),
                    inbound("IT01V2", "remote-screen", 1920, 1080),
                    RtcStatistic::new("IT01A1", "inbound-rtp", 1_000_000.0).with_value("kind", "audio"),
                ],
            )),
            track_to_kind_map: HashMap::from([("remote-screen".to_string(), TrackType::ScreenShare)]),
            timestamp: Utc::now(),
        };

        let stats = DecoderStatsTransformer::new().transform(&report);

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].track_type, Some(TrackType::ScreenShare));
        assert_eq!(stats[0].video_dimension, VideoDimension { width: 1920, height: 1080 });
        assert!((stats[0].avg_frame_time_ms - 5.0).abs() < 0.001);
        assert_eq!(stats[0].target_bitrate, 0);
    }

    #[test]
    fn test_missing_side_yields_nothing() {
        let report = CallStatsReport {
            publisher_raw_stats: None,
            subscriber_raw_stats: None,
            track_to_kind_map: HashMap::new(),
            timestamp: Utc::now(),
        };
        assert!(EncoderStatsTransformer::new().transform(&report).is_empty());
        assert!(DecoderStatsTransformer::new().transform(&report).is_empty());
    }
}
