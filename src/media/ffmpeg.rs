use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use super::probe::{self, MediaInfo};
use crate::error::{WorkerError, WorkerResult};
use crate::model::project::{PipPosition, RenderContext};

/// FFmpeg / ffprobe サブプロセスのラッパ。
///
/// 全出力はh.264 yuv420p、音声があればAAC、`+faststart` 付きのmp4。
/// 終了コード非ゼロ、または出力ファイルが欠落・空の場合は
/// [`WorkerError::Media`] を返す。
#[derive(Debug, Clone)]
pub(crate) struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

/// PiPオーバーレイの角位置を overlay フィルタの座標式へ変換する。
fn overlay_position_expr(position: PipPosition, inset: u32) -> String {
    match position {
        PipPosition::TopLeft => format!("{inset}:{inset}"),
        PipPosition::TopRight => format!("W-w-{inset}:{inset}"),
        PipPosition::BottomLeft => format!("{inset}:H-h-{inset}"),
        PipPosition::BottomRight => format!("W-w-{inset}:H-h-{inset}"),
    }
}

/// concat demuxer 用のリスト行。シングルクォートはffmpeg流にエスケープする。
pub(crate) fn concat_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{escaped}'\n")
}

impl Ffmpeg {
    pub(crate) fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    pub(crate) async fn probe(&self, input: &Path) -> WorkerResult<MediaInfo> {
        probe::probe(&self.ffprobe, input).await
    }

    async fn run(&self, args: Vec<OsString>, output_file: &Path) -> WorkerResult<()> {
        debug!(args = ?args, "running ffmpeg");
        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .output()
            .await
            .map_err(|error| WorkerError::Media(format!("failed to spawn ffmpeg: {error}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(6)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(WorkerError::Media(format!(
                "ffmpeg exited with {}: {tail}",
                output.status
            )));
        }

        let metadata = tokio::fs::metadata(output_file).await.map_err(|_| {
            WorkerError::Media(format!(
                "ffmpeg produced no output file at {}",
                output_file.display()
            ))
        })?;
        if metadata.len() == 0 {
            return Err(WorkerError::Media(format!(
                "ffmpeg produced an empty output file at {}",
                output_file.display()
            )));
        }
        Ok(())
    }

    /// `[from, to)` で切り出し、レンダリング寸法へ収まるよう
    /// 縮小してレターボックスパディングする。
    pub(crate) async fn trim_and_fit(
        &self,
        input: &Path,
        output: &Path,
        from_seconds: f64,
        to_seconds: f64,
        ctx: RenderContext,
    ) -> WorkerResult<()> {
        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}",
            w = ctx.width,
            h = ctx.height,
            fps = ctx.fps
        );
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-ss".into(),
            format!("{from_seconds}").into(),
            "-to".into(),
            format!("{to_seconds}").into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-vf".into(),
            filter.into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.as_os_str().to_owned(),
        ];
        self.run(args, output).await
    }

    /// PNG連番をmp4へエンコードする。
    ///
    /// 前段フィルタで幅・高さを `trunc(x/2)*2` に強制し、奇数寸法の
    /// フレームでもlibx264が受け付けるようにする。
    pub(crate) async fn encode_frame_sequence(
        &self,
        frame_pattern: &Path,
        fps: u32,
        output: &Path,
    ) -> WorkerResult<()> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-framerate".into(),
            fps.to_string().into(),
            "-i".into(),
            frame_pattern.as_os_str().to_owned(),
            "-vf".into(),
            "scale=trunc(iw/2)*2:trunc(ih/2)*2,format=yuv420p".into(),
            "-c:v".into(),
            "libx264".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.as_os_str().to_owned(),
        ];
        self.run(args, output).await
    }

    /// ベース動画へ同寸のPNGを重ねる。音声はAACで引き継ぐ。
    pub(crate) async fn overlay_image(
        &self,
        base: &Path,
        overlay_png: &Path,
        output: &Path,
    ) -> WorkerResult<()> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            base.as_os_str().to_owned(),
            "-i".into(),
            overlay_png.as_os_str().to_owned(),
            "-filter_complex".into(),
            "[0:v][1:v]overlay=0:0".into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.as_os_str().to_owned(),
        ];
        self.run(args, output).await
    }

    /// セカンダリソースを縮小して角へ重ねるPiP合成。
    pub(crate) async fn picture_in_picture(
        &self,
        base: &Path,
        secondary: &Path,
        output: &Path,
        overlay_size: (u32, u32),
        position: PipPosition,
    ) -> WorkerResult<()> {
        let (w, h) = overlay_size;
        let filter = format!(
            "[1:v]scale={w}:{h}[pip];[0:v][pip]overlay={}",
            overlay_position_expr(position, 10)
        );
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            base.as_os_str().to_owned(),
            "-i".into(),
            secondary.as_os_str().to_owned(),
            "-filter_complex".into(),
            filter.into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.as_os_str().to_owned(),
        ];
        self.run(args, output).await
    }

    /// concat demuxer で順序どおりに連結し、再エンコードする。
    pub(crate) async fn concat(&self, list_file: &Path, output: &Path) -> WorkerResult<()> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_file.as_os_str().to_owned(),
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
            output.as_os_str().to_owned(),
        ];
        self.run(args, output).await
    }

    /// 文字起こし用に音声トラックを16kHzモノラルWAVへ取り出す。
    pub(crate) async fn extract_audio(&self, input: &Path, output: &Path) -> WorkerResult<()> {
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-vn".into(),
            "-ac".into(),
            "1".into(),
            "-ar".into(),
            "16000".into(),
            output.as_os_str().to_owned(),
        ];
        self.run(args, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_positions_map_to_filter_coordinates() {
        assert_eq!(overlay_position_expr(PipPosition::TopLeft, 10), "10:10");
        assert_eq!(overlay_position_expr(PipPosition::TopRight, 10), "W-w-10:10");
        assert_eq!(
            overlay_position_expr(PipPosition::BottomLeft, 10),
            "10:H-h-10"
        );
        assert_eq!(
            overlay_position_expr(PipPosition::BottomRight, 10),
            "W-w-10:H-h-10"
        );
    }

    #[test]
    fn concat_entries_escape_single_quotes() {
        let entry = concat_entry(Path::new("/tmp/it's.mp4"));
        assert_eq!(entry, "file '/tmp/it'\\''s.mp4'\n");
    }
}
