//! FFmpeg filter builders for vertical segment rendering.

use std::path::Path;

use nclip_models::OutputFormat;

/// Scale-then-crop geometry that fills the target frame without letterboxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverGeometry {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute cover geometry for a `src_w`x`src_h` source.
///
/// Scales by `max(target_w / src_w, target_h / src_h)`, rounds the scaled
/// size up to even dimensions, then center-crops to the exact target.
pub fn cover_geometry(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> CoverGeometry {
    let (src_w, src_h) = (src_w.max(1), src_h.max(1));
    let scale = f64::max(
        target_w as f64 / src_w as f64,
        target_h as f64 / src_h as f64,
    );

    let even_ceil = |v: f64, min: u32| -> u32 {
        let v = (v - 1e-6).ceil().max(min as f64) as u32;
        v + (v % 2)
    };
    let scaled_width = even_ceil(src_w as f64 * scale, target_w);
    let scaled_height = even_ceil(src_h as f64 * scale, target_h);

    CoverGeometry {
        scaled_width,
        scaled_height,
        crop_x: (scaled_width - target_w) / 2,
        crop_y: (scaled_height - target_h) / 2,
        width: target_w,
        height: target_h,
    }
}

impl CoverGeometry {
    /// `scale=...,crop=...` filter chain.
    pub fn filter(&self) -> String {
        format!(
            "scale={}:{}:flags=lanczos,crop={}:{}:{}:{},setsar=1",
            self.scaled_width, self.scaled_height, self.width, self.height, self.crop_x, self.crop_y
        )
    }
}

/// Stretch playback so that `speed < 1.0` slows the clip down.
pub fn slow_motion_filter(speed: f64) -> String {
    format!("setpts=PTS/{:.6}", speed)
}

/// Camera motion applied to a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KenBurns {
    ZoomIn,
    ZoomOut,
    PanLeftToRight,
    PanRightToLeft,
}

/// Peak zoom used by the motions.
const KEN_BURNS_ZOOM: f64 = 1.2;

impl KenBurns {
    /// Motions rotate with segment order so consecutive stills differ.
    pub fn for_segment(order: usize) -> Self {
        match order % 4 {
            0 => KenBurns::ZoomIn,
            1 => KenBurns::ZoomOut,
            2 => KenBurns::PanLeftToRight,
            _ => KenBurns::PanRightToLeft,
        }
    }

    /// `zoompan` chain animating one input image for `duration` seconds.
    ///
    /// The image is first covered at twice the output size so panning has
    /// room and zooming does not pixelate.
    pub fn filter(&self, duration: f64, format: &OutputFormat) -> String {
        let frames = ((duration * format.fps as f64).ceil() as u64).max(1);
        let last = (frames - 1).max(1);
        let z = KEN_BURNS_ZOOM;
        let extra = z - 1.0;

        let center_x = "iw/2-(iw/zoom/2)";
        let center_y = "ih/2-(ih/zoom/2)";
        let (zoom, x, y) = match self {
            KenBurns::ZoomIn => (format!("1+{extra}*on/{last}"), center_x.to_string(), center_y),
            KenBurns::ZoomOut => (format!("{z}-{extra}*on/{last}"), center_x.to_string(), center_y),
            KenBurns::PanLeftToRight => (
                format!("{z}"),
                format!("(iw-iw/zoom)*on/{last}"),
                center_y,
            ),
            KenBurns::PanRightToLeft => (
                format!("{z}"),
                format!("(iw-iw/zoom)*(1-on/{last})"),
                center_y,
            ),
        };

        let (w, h) = (format.width, format.height);
        format!(
            "scale={sw}:{sh}:force_original_aspect_ratio=increase,crop={sw}:{sh},\
             zoompan=z='{zoom}':x='{x}':y='{y}':d={frames}:s={w}x{h}:fps={fps},setsar=1",
            sw = w * 2,
            sh = h * 2,
            fps = format.fps,
        )
    }
}

/// Solid black video source at the output geometry.
pub fn black_source(format: &OutputFormat, duration: f64) -> String {
    format!(
        "color=c=black:s={}:r={}:d={:.3}",
        format.size_arg(),
        format.fps,
        duration
    )
}

/// Silent stereo audio source.
pub fn silence_source(sample_rate: u32) -> String {
    format!("anullsrc=r={}:cl=stereo", sample_rate)
}

/// Burn an ASS subtitle file into the video.
pub fn subtitles_filter(ass_path: &Path) -> String {
    format!("ass=filename='{}'", escape_filter_path(ass_path))
}

/// Escape a path for use inside a quoted filtergraph option.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}
