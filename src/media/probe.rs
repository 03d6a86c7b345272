use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{WorkerError, WorkerResult};

/// ffprobeが返す素材メタデータの要約。
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MediaInfo {
    pub(crate) duration: f64,
    pub(crate) fps: f64,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// `ffprobe` を実行して動画の寸法・フレームレート・長さを取得する。
pub(crate) async fn probe(ffprobe: &Path, input: &Path) -> WorkerResult<MediaInfo> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(input)
        .output()
        .await
        .map_err(|error| WorkerError::Media(format!("failed to spawn ffprobe: {error}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WorkerError::Media(format!(
            "ffprobe exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
}

/// ffprobeのJSON出力を [`MediaInfo`] へ変換する。
pub(crate) fn parse_probe_output(raw: &str) -> WorkerResult<MediaInfo> {
    let parsed: ProbeOutput = serde_json::from_str(raw)
        .map_err(|error| WorkerError::Media(format!("unreadable ffprobe output: {error}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| WorkerError::Media("input has no video stream".to_string()))?;

    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .or_else(|| video.duration.clone())
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    Ok(MediaInfo {
        duration,
        fps,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        has_audio,
    })
}

/// "30000/1001" 形式のフレームレート表記をf64へ変換する。
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 { None } else { Some(num / den) }
        }
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001"
            },
            { "codec_type": "audio" }
        ],
        "format": { "duration": "12.48" }
    }"#;

    #[test]
    fn parses_dimensions_duration_and_fps() {
        let info = parse_probe_output(SAMPLE).expect("parses");
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.duration - 12.48).abs() < 1e-9);
        assert!((info.fps - 29.97).abs() < 0.01);
        assert!(info.has_audio);
    }

    #[test]
    fn missing_video_stream_is_a_media_error() {
        let raw = r#"{ "streams": [{ "codec_type": "audio" }] }"#;
        let error = parse_probe_output(raw).expect_err("no video stream");
        assert!(matches!(error, WorkerError::Media(_)));
    }

    #[test]
    fn frame_rate_fraction_handles_whole_numbers() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
    }
}
