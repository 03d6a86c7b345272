//! Offscreen canvas drawing for banner and overlay scenes.
//!
//! Everything here is pure pixel work on `image` buffers; the FFmpeg encode
//! of the produced frames lives in the pipelines.

use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

/// バナー描画に使う太字フォント。
///
/// 設定パス、なければ代表的なシステムフォントの順で探索する。
pub(crate) struct BannerFont {
    font: FontVec,
}

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

impl BannerFont {
    /// フォントファイルを読み込む。見つからなければ `None`（テキスト無しで描画継続）。
    pub(crate) fn load(configured: Option<&Path>) -> Option<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = configured {
            candidates.push(path.to_path_buf());
        }
        candidates.extend(FONT_CANDIDATES.iter().map(PathBuf::from));

        for candidate in candidates {
            match std::fs::read(&candidate) {
                Ok(bytes) => match FontVec::try_from_vec(bytes) {
                    Ok(font) => return Some(Self { font }),
                    Err(error) => {
                        warn!(path = %candidate.display(), error = %error, "unusable font file");
                    }
                },
                Err(_) => continue,
            }
        }
        None
    }

    fn measure_width(&self, scale: f32, text: &str) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(scale));
        let mut width = 0.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }
}

/// バナー背景のバリエーション。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Background {
    /// #1e3a8a → #3b82f6 の対角グラデーション
    BlueGradient,
    /// 無地の白
    White,
    /// 明るいグレーの対角グラデーション
    GreyGradient,
}

impl Background {
    /// visualStyle ヒントから背景を決める。
    pub(crate) fn from_styles(styles: &[String]) -> Self {
        if styles.iter().any(|s| s.to_lowercase().contains("blue")) {
            Background::BlueGradient
        } else if styles.iter().any(|s| s.to_lowercase().contains("minimal")) {
            Background::White
        } else {
            Background::GreyGradient
        }
    }

    /// テキスト色の選択用。暗い背景には白、明るい背景には黒。
    pub(crate) fn is_dark(self) -> bool {
        matches!(self, Background::BlueGradient)
    }

    fn stops(self) -> ([u8; 3], [u8; 3]) {
        match self {
            Background::BlueGradient => ([0x1e, 0x3a, 0x8a], [0x3b, 0x82, 0xf6]),
            Background::White => ([0xff, 0xff, 0xff], [0xff, 0xff, 0xff]),
            Background::GreyGradient => ([0xf3, 0xf4, 0xf6], [0xd1, 0xd5, 0xdb]),
        }
    }
}

/// テキストのアニメーション種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextAnimation {
    Typewriter,
    FadeIn,
    None,
}

impl TextAnimation {
    pub(crate) fn from_hints(hints: &[String]) -> Self {
        if hints.iter().any(|h| h.eq_ignore_ascii_case("typewriter")) {
            TextAnimation::Typewriter
        } else if hints.iter().any(|h| h.eq_ignore_ascii_case("fade-in")) {
            TextAnimation::FadeIn
        } else {
            TextAnimation::None
        }
    }

    /// このフレームで表示する文字数。
    pub(crate) fn visible_chars(self, total: usize, progress: f64) -> usize {
        match self {
            TextAnimation::Typewriter => ((total as f64) * progress).floor() as usize,
            _ => total,
        }
    }

    /// このフレームのテキスト不透明度。フェードインは前半で0.1→1.0へ線形。
    pub(crate) fn text_opacity(self, progress: f64) -> f32 {
        match self {
            TextAnimation::FadeIn => {
                if progress >= 0.5 {
                    1.0
                } else {
                    (0.1 + 0.9 * (progress / 0.5)) as f32
                }
            }
            _ => 1.0,
        }
    }
}

/// 前景画像の不透明度ランプ。
pub(crate) fn image_opacity(progress: f64) -> f32 {
    (2.0 * progress).min(1.0) as f32
}

/// 枠に収まるよう縮小した寸法（拡大はしない）。
pub(crate) fn fit_within(src: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = (f64::from(src.0), f64::from(src.1));
    let (bw, bh) = (f64::from(bounds.0), f64::from(bounds.1));
    let scale = (bw / sw).min(bh / sh).min(1.0);
    (
        ((sw * scale).round() as u32).max(1),
        ((sh * scale).round() as u32).max(1),
    )
}

/// 最大幅に収まるよう単語単位で折り返す。行数上限を超えた分は捨てる。
pub(crate) fn wrap_text<F>(text: &str, max_width: f32, max_lines: usize, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure(&candidate) <= max_width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            if lines.len() == max_lines {
                return lines;
            }
            current = word.to_string();
        }
    }
    if !current.is_empty() && lines.len() < max_lines {
        lines.push(current);
    }
    lines
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8
}

/// 対角グラデーション背景を描く。
pub(crate) fn draw_background(width: u32, height: u32, background: Background) -> RgbaImage {
    let (from, to) = background.stops();
    let span = f64::from(width + height).max(1.0);
    RgbaImage::from_fn(width, height, |x, y| {
        let t = f64::from(x + y) / span;
        Rgba([
            lerp(from[0], to[0], t),
            lerp(from[1], to[1], t),
            lerp(from[2], to[2], t),
            255,
        ])
    })
}

/// オーバーレイ画像を指定位置へ不透明度つきで合成する。
pub(crate) fn blend_image(canvas: &mut RgbaImage, overlay: &RgbaImage, ox: i64, oy: i64, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    for (x, y, pixel) in overlay.enumerate_pixels() {
        let cx = ox + i64::from(x);
        let cy = oy + i64::from(y);
        if cx < 0 || cy < 0 || cx >= i64::from(canvas.width()) || cy >= i64::from(canvas.height()) {
            continue;
        }
        let alpha = (f32::from(pixel[3]) / 255.0) * opacity;
        if alpha <= 0.0 {
            continue;
        }
        let base = canvas.get_pixel_mut(cx as u32, cy as u32);
        for channel in 0..3 {
            let over = f32::from(pixel[channel]);
            let under = f32::from(base[channel]);
            base[channel] = (over * alpha + under * (1.0 - alpha)).round() as u8;
        }
        base[3] = 255;
    }
}

/// バナーのフォントサイズ。
pub(crate) fn banner_font_size(width: u32) -> f32 {
    (f64::from(width) / 15.0).min(72.0) as f32
}

/// バナー1枚分の静的レイアウト。フレームごとの可変要素は `progress` で渡す。
pub(crate) struct BannerLayout<'a> {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) background: Background,
    pub(crate) text: Option<&'a str>,
    pub(crate) animation: TextAnimation,
    pub(crate) font: Option<&'a BannerFont>,
}

/// 1フレームを描画する。`progress` は 0.0〜1.0。
pub(crate) fn render_banner_frame(
    layout: &BannerLayout<'_>,
    foreground: Option<&RgbaImage>,
    progress: f64,
) -> RgbaImage {
    let mut canvas = draw_background(layout.width, layout.height, layout.background);

    if let Some(fg) = foreground {
        let x = (i64::from(layout.width) - i64::from(fg.width())) / 2;
        let y = (i64::from(layout.height) - i64::from(fg.height())) / 2;
        // drop shadow
        let shadow = RgbaImage::from_pixel(fg.width(), fg.height(), Rgba([0, 0, 0, 90]));
        blend_image(&mut canvas, &shadow, x + 8, y + 8, image_opacity(progress));
        blend_image(&mut canvas, fg, x, y, image_opacity(progress));
    }

    if let (Some(text), Some(font)) = (layout.text, layout.font) {
        draw_banner_text(&mut canvas, layout, font, text, foreground.is_some(), progress);
    }

    canvas
}

fn draw_banner_text(
    canvas: &mut RgbaImage,
    layout: &BannerLayout<'_>,
    font: &BannerFont,
    text: &str,
    has_foreground: bool,
    progress: f64,
) {
    let size = banner_font_size(layout.width);
    let max_width = f64::from(layout.width) as f32 * 0.8;
    let lines = wrap_text(text, max_width, 3, |s| font.measure_width(size, s));
    if lines.is_empty() {
        return;
    }

    let total_chars: usize = lines.iter().map(|l| l.chars().count()).sum();
    let mut remaining = layout.animation.visible_chars(total_chars, progress);
    let opacity = layout.animation.text_opacity(progress);
    if remaining == 0 && layout.animation == TextAnimation::Typewriter {
        return;
    }

    let color = if layout.background.is_dark() {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([0, 0, 0, 255])
    };
    let shadow = Rgba([0, 0, 0, 150]);

    let line_height = size * 1.25;
    let block_height = line_height * lines.len() as f32;
    // Text sits in the lower third when an image occupies the centre.
    let top = if has_foreground {
        f64::from(layout.height) as f32 * 0.82 - block_height / 2.0
    } else {
        (f64::from(layout.height) as f32 - block_height) / 2.0
    };

    let mut overlay = RgbaImage::from_pixel(layout.width, layout.height, Rgba([0, 0, 0, 0]));
    for (idx, line) in lines.iter().enumerate() {
        let visible: String = match layout.animation {
            TextAnimation::Typewriter => {
                let take = remaining.min(line.chars().count());
                remaining -= take;
                line.chars().take(take).collect()
            }
            _ => line.clone(),
        };
        if visible.is_empty() {
            continue;
        }
        let line_width = font.measure_width(size, &visible);
        let x = ((f64::from(layout.width) as f32 - line_width) / 2.0).max(0.0) as i32;
        let y = (top + line_height * idx as f32) as i32;
        let scale = PxScale::from(size);
        draw_text_mut(&mut overlay, shadow, x + 2, y + 2, scale, &font.font, &visible);
        draw_text_mut(&mut overlay, color, x, y, scale, &font.font, &visible);
    }
    blend_image(canvas, &overlay, 0, 0, opacity);
}

/// オーバーレイシーン用のPNGレイヤを描く。
///
/// `side_panel_right` は右側30%の半透明パネルに白文字、その他は
/// 画面全体を暗くして中央にタイトルを置く。
pub(crate) fn render_overlay_layer(
    width: u32,
    height: u32,
    layout_hint: &str,
    text: Option<&str>,
    font: Option<&BannerFont>,
) -> RgbaImage {
    let mut layer = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

    if layout_hint == "side_panel_right" {
        let panel_width = (f64::from(width) * 0.3).round() as u32;
        let panel_x = width - panel_width;
        draw_filled_rect_mut(
            &mut layer,
            Rect::at(panel_x as i32, 0).of_size(panel_width, height),
            Rgba([0, 0, 0, 178]),
        );
        if let (Some(text), Some(font)) = (text, font) {
            let size = (f64::from(panel_width) / 10.0).min(48.0) as f32;
            let padding = (f64::from(panel_width) * 0.1) as i32;
            let max_width = panel_width as f32 * 0.8;
            let lines = wrap_text(text, max_width, 8, |s| font.measure_width(size, s));
            let line_height = size * 1.3;
            for (idx, line) in lines.iter().enumerate() {
                let y = padding + (line_height * idx as f32) as i32;
                draw_text_mut(
                    &mut layer,
                    Rgba([255, 255, 255, 255]),
                    panel_x as i32 + padding,
                    y,
                    PxScale::from(size),
                    &font.font,
                    line,
                );
            }
        }
    } else {
        draw_filled_rect_mut(
            &mut layer,
            Rect::at(0, 0).of_size(width, height),
            Rgba([0, 0, 0, 115]),
        );
        if let (Some(text), Some(font)) = (text, font) {
            let size = banner_font_size(width);
            let line_width = font.measure_width(size, text);
            let x = ((width as f32 - line_width) / 2.0).max(0.0) as i32;
            let y = ((height as f32 - size) / 2.0) as i32;
            draw_text_mut(
                &mut layer,
                Rgba([255, 255, 255, 255]),
                x,
                y,
                PxScale::from(size),
                &font.font,
                text,
            );
        }
    }

    layer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_selection_follows_visual_style() {
        assert_eq!(
            Background::from_styles(&["deep blue".to_string()]),
            Background::BlueGradient
        );
        assert_eq!(
            Background::from_styles(&["minimal".to_string()]),
            Background::White
        );
        assert_eq!(Background::from_styles(&[]), Background::GreyGradient);
        // blue wins over minimal when both appear
        assert_eq!(
            Background::from_styles(&["minimal".to_string(), "blue".to_string()]),
            Background::BlueGradient
        );
    }

    #[test]
    fn animation_hints_select_variants() {
        assert_eq!(
            TextAnimation::from_hints(&["typewriter".to_string()]),
            TextAnimation::Typewriter
        );
        assert_eq!(
            TextAnimation::from_hints(&["fade-in".to_string()]),
            TextAnimation::FadeIn
        );
        assert_eq!(TextAnimation::from_hints(&[]), TextAnimation::None);
    }

    #[test]
    fn typewriter_reveals_characters_progressively() {
        let anim = TextAnimation::Typewriter;
        assert_eq!(anim.visible_chars(10, 0.0), 0);
        assert_eq!(anim.visible_chars(10, 0.55), 5);
        assert_eq!(anim.visible_chars(10, 1.0), 10);
    }

    #[test]
    fn fade_in_ramps_over_first_half() {
        let anim = TextAnimation::FadeIn;
        assert!((anim.text_opacity(0.0) - 0.1).abs() < 1e-6);
        assert!((anim.text_opacity(0.25) - 0.55).abs() < 1e-6);
        assert!((anim.text_opacity(0.5) - 1.0).abs() < 1e-6);
        assert!((anim.text_opacity(0.9) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn image_opacity_saturates_at_half_duration() {
        assert!((image_opacity(0.0) - 0.0).abs() < 1e-6);
        assert!((image_opacity(0.25) - 0.5).abs() < 1e-6);
        assert!((image_opacity(0.5) - 1.0).abs() < 1e-6);
        assert!((image_opacity(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fit_within_preserves_aspect_and_never_upscales() {
        assert_eq!(fit_within((2000, 1000), (1000, 1000)), (1000, 500));
        assert_eq!(fit_within((100, 100), (1000, 1000)), (100, 100));
        assert_eq!(fit_within((1000, 2000), (500, 500)), (250, 500));
    }

    #[test]
    fn wrap_text_respects_width_and_line_cap() {
        // ten units per character makes widths easy to reason about
        let measure = |s: &str| s.len() as f32 * 10.0;
        let lines = wrap_text("one two three four five six", 90.0, 3, measure);
        assert!(lines.len() <= 3);
        for line in &lines {
            assert!(measure(line) <= 90.0 || !line.contains(' '));
        }
    }

    #[test]
    fn wrap_text_truncates_overflow() {
        let measure = |s: &str| s.len() as f32 * 10.0;
        let lines = wrap_text("aaaa bbbb cccc dddd eeee ffff gggg", 40.0, 3, measure);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines, vec!["aaaa", "bbbb", "cccc"]);
    }

    #[test]
    fn gradient_corners_match_stops() {
        let img = draw_background(100, 50, Background::BlueGradient);
        assert_eq!(img.get_pixel(0, 0), &Rgba([0x1e, 0x3a, 0x8a, 255]));
        // far corner approaches the second stop
        let far = img.get_pixel(99, 49);
        assert!(far[2] > 0xf0, "expected bright blue, got {far:?}");

        let white = draw_background(10, 10, Background::White);
        assert_eq!(white.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn blend_image_composites_with_opacity() {
        let mut canvas = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let overlay = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        blend_image(&mut canvas, &overlay, 1, 1, 0.5);
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(1, 1), &Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn overlay_layer_draws_right_panel() {
        let layer = render_overlay_layer(100, 60, "side_panel_right", None, None);
        // left side stays transparent, right 30% carries the panel
        assert_eq!(layer.get_pixel(10, 30)[3], 0);
        assert_eq!(layer.get_pixel(85, 30)[3], 178);
    }

    #[test]
    fn overlay_layer_defaults_to_dim_layer() {
        let layer = render_overlay_layer(100, 60, "center_title", None, None);
        assert_eq!(layer.get_pixel(10, 30)[3], 115);
    }

    #[test]
    fn banner_frame_has_canvas_dimensions() {
        let layout = BannerLayout {
            width: 64,
            height: 36,
            background: Background::GreyGradient,
            text: None,
            animation: TextAnimation::None,
            font: None,
        };
        let frame = render_banner_frame(&layout, None, 0.5);
        assert_eq!(frame.dimensions(), (64, 36));
    }
}
