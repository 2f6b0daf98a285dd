use crate::types::AnimationState;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tiny_skia::{FillRule, Paint, Path as SkPath, PathBuilder, Pixmap, Rect, Transform};
use tracing::{debug, info, warn};

pub const BUILTIN_SKINS: &[&str] = &["classic", "midnight", "ginger"];

const CANVAS_W: u32 = 160;
const CANVAS_H: u32 = 120;

#[derive(Debug, thiserror::Error)]
pub enum SkinError {
    #[error("unknown skin '{0}'")]
    Unknown(String),
    #[error("skin '{skin}' is missing {frame}.png")]
    MissingFrame { skin: String, frame: &'static str },
    #[error("failed to decode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frames of skin '{0}' differ in size")]
    SizeMismatch(String),
}

/// One frame per animation state, all the same size.
#[derive(Debug, Clone)]
pub struct Skin {
    name: String,
    frames: [RgbaImage; 4],
}

fn frame_index(state: AnimationState) -> usize {
    match state {
        AnimationState::Idle => 0,
        AnimationState::LeftDown => 1,
        AnimationState::RightDown => 2,
        AnimationState::BothDown => 3,
    }
}

impl Skin {
    pub fn from_frames(name: &str, frames: [RgbaImage; 4]) -> Result<Self, SkinError> {
        let dims = frames[0].dimensions();
        if frames.iter().any(|f| f.dimensions() != dims) {
            return Err(SkinError::SizeMismatch(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            frames,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self, state: AnimationState) -> &RgbaImage {
        &self.frames[frame_index(state)]
    }

    pub fn size(&self) -> (u32, u32) {
        self.frames[0].dimensions()
    }

    pub fn scaled(&self, scale: f64) -> Skin {
        if (scale - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        let (w, h) = self.size();
        let sw = ((w as f64 * scale).round() as u32).max(1);
        let sh = ((h as f64 * scale).round() as u32).max(1);
        Skin {
            name: self.name.clone(),
            frames: self
                .frames
                .clone()
                .map(|f| imageops::resize(&f, sw, sh, FilterType::Triangle)),
        }
    }
}

/// Finds skins: the built-in palettes plus `<dir>/<name>/{idle,left,right,both}.png`.
#[derive(Debug, Clone, Default)]
pub struct SkinLibrary {
    dir: Option<PathBuf>,
}

impl SkinLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn builtin_only() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Built-in names first, then user skins sorted by name.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_SKINS.iter().map(|s| s.to_string()).collect();
        let mut user = Vec::new();
        if let Some(entries) = self.dir.as_ref().and_then(|d| std::fs::read_dir(d).ok()) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_complete_skin_dir(&path) {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if !names.iter().any(|n| n == name) {
                        user.push(name.to_string());
                    }
                }
            }
        }
        user.sort();
        names.extend(user);
        names
    }

    /// A user skin directory shadows a built-in of the same name.
    pub fn load(&self, name: &str) -> Result<Skin, SkinError> {
        if let Some(dir) = &self.dir {
            let skin_dir = dir.join(name);
            if skin_dir.is_dir() {
                debug!("Loading skin '{}' from {}", name, skin_dir.display());
                return load_dir(name, &skin_dir);
            }
        }
        let palette = Palette::builtin(name).ok_or_else(|| SkinError::Unknown(name.to_string()))?;
        Ok(draw_skin(name, &palette))
    }

    /// Load `name`, falling back to the first built-in skin.
    pub fn load_or_default(&self, name: &str) -> Skin {
        match self.load(name) {
            Ok(skin) => skin,
            Err(e) => {
                warn!("{}; using '{}'", e, BUILTIN_SKINS[0]);
                draw_skin(BUILTIN_SKINS[0], &Palette::CLASSIC)
            }
        }
    }
}

fn is_complete_skin_dir(path: &Path) -> bool {
    path.is_dir()
        && AnimationState::ALL
            .iter()
            .all(|s| path.join(format!("{}.png", s.frame_name())).is_file())
}

fn load_dir(name: &str, dir: &Path) -> Result<Skin, SkinError> {
    let load = |state: AnimationState| -> Result<RgbaImage, SkinError> {
        let frame = state.frame_name();
        let path = dir.join(format!("{}.png", frame));
        if !path.is_file() {
            return Err(SkinError::MissingFrame {
                skin: name.to_string(),
                frame,
            });
        }
        image::open(&path)
            .map(|img| img.to_rgba8())
            .map_err(|source| SkinError::Image { path, source })
    };
    let [idle, left, right, both] = AnimationState::ALL;
    Skin::from_frames(name, [load(idle)?, load(left)?, load(right)?, load(both)?])
}

/// Convert to premultiplied BGRA (the layout `UpdateLayeredWindow` expects),
/// applying a global opacity.
pub fn premultiplied_bgra(img: &RgbaImage, opacity: f64) -> Vec<u8> {
    let opacity = opacity.clamp(0.0, 1.0);
    let mut out = Vec::with_capacity((img.width() * img.height() * 4) as usize);
    for px in img.pixels() {
        let [r, g, b, a] = px.0;
        let a = (a as f64 * opacity).round() as u32;
        let pm = |c: u8| ((c as u32 * a + 127) / 255) as u8;
        out.extend_from_slice(&[pm(b), pm(g), pm(r), a as u8]);
    }
    out
}

/// Straight-alpha RGBA.
type Color8 = [u8; 4];

#[derive(Debug, Clone, Copy)]
struct Palette {
    fur: Color8,
    outline: Color8,
    inner_ear: Color8,
    desk: Color8,
}

impl Palette {
    const CLASSIC: Palette = Palette {
        fur: [255, 255, 255, 255],
        outline: [20, 20, 20, 255],
        inner_ear: [255, 182, 193, 255],
        desk: [139, 94, 60, 255],
    };
    const MIDNIGHT: Palette = Palette {
        fur: [48, 48, 64, 255],
        outline: [220, 220, 235, 255],
        inner_ear: [120, 90, 160, 255],
        desk: [30, 30, 40, 255],
    };
    const GINGER: Palette = Palette {
        fur: [240, 150, 60, 255],
        outline: [80, 40, 10, 255],
        inner_ear: [255, 200, 170, 255],
        desk: [110, 70, 40, 255],
    };

    fn builtin(name: &str) -> Option<Palette> {
        match name {
            "classic" => Some(Self::CLASSIC),
            "midnight" => Some(Self::MIDNIGHT),
            "ginger" => Some(Self::GINGER),
            _ => None,
        }
    }
}

/// Fills shapes given in design coordinates onto an anti-aliased pixmap.
struct Pen {
    pixmap: Pixmap,
    transform: Transform,
}

impl Pen {
    fn fill(&mut self, path: Option<SkPath>, color: Color8) {
        let Some(path) = path else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
        paint.anti_alias = true;
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, self.transform, None);
    }

    fn rect(&mut self, left: f32, top: f32, right: f32, bottom: f32, color: Color8) {
        let path = Rect::from_ltrb(left, top, right, bottom).map(PathBuilder::from_rect);
        self.fill(path, color);
    }

    fn ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, color: Color8) {
        let path = Rect::from_xywh(cx - rx, cy - ry, rx * 2.0, ry * 2.0)
            .and_then(PathBuilder::from_oval);
        self.fill(path, color);
    }

    fn polygon(&mut self, points: &[(f32, f32)], color: Color8) {
        let mut pb = PathBuilder::new();
        for (i, &(x, y)) in points.iter().enumerate() {
            if i == 0 {
                pb.move_to(x, y);
            } else {
                pb.line_to(x, y);
            }
        }
        pb.close();
        self.fill(pb.finish(), color);
    }

    /// Ellipse with a 2px outline.
    fn outlined_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, pal: &Palette) {
        self.ellipse(cx, cy, rx + 2.0, ry + 2.0, pal.outline);
        self.ellipse(cx, cy, rx, ry, pal.fur);
    }
}

/// Draw a `width` x `height` image; `scale` maps design units to pixels.
fn render(width: u32, height: u32, scale: f32, draw: impl FnOnce(&mut Pen)) -> RgbaImage {
    let Some(pixmap) = Pixmap::new(width, height) else {
        return RgbaImage::new(width, height);
    };
    let mut pen = Pen {
        pixmap,
        transform: Transform::from_scale(scale, scale),
    };
    draw(&mut pen);

    let data = pen
        .pixmap
        .pixels()
        .iter()
        .flat_map(|px| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(width, height, data).unwrap_or_else(|| RgbaImage::new(width, height))
}

fn draw_paw(pen: &mut Pen, cx: f32, down: bool, pal: &Palette) {
    // Raised paws sit above the desk line; pressed paws rest on it.
    let cy = if down { 92.0 } else { 66.0 };
    pen.outlined_ellipse(cx, cy, 11.0, 8.0, pal);
}

fn draw_frame(state: AnimationState, pal: &Palette) -> RgbaImage {
    render(CANVAS_W, CANVAS_H, 1.0, |pen| {
        // Ears
        for ear in [
            [(42.0, 44.0), (50.0, 12.0), (72.0, 34.0)],
            [(88.0, 34.0), (110.0, 12.0), (118.0, 44.0)],
        ] {
            pen.polygon(&ear, pal.outline);
            let inner = ear.map(|p| (p.0 + (80.0 - p.0) * 0.15, p.1 + (40.0 - p.1) * 0.15));
            pen.polygon(&inner, pal.inner_ear);
        }

        pen.outlined_ellipse(80.0, 70.0, 50.0, 36.0, pal);

        // Face
        pen.ellipse(64.0, 56.0, 3.5, 4.5, pal.outline);
        pen.ellipse(96.0, 56.0, 3.5, 4.5, pal.outline);
        pen.polygon(&[(76.0, 64.0), (84.0, 64.0), (80.0, 69.0)], pal.inner_ear);

        let width = CANVAS_W as f32;
        pen.rect(0.0, 96.0, width, 100.0, pal.outline);
        pen.rect(0.0, 100.0, width, CANVAS_H as f32, pal.desk);

        draw_paw(pen, 46.0, state.left_down(), pal);
        draw_paw(pen, 114.0, state.right_down(), pal);
    })
}

fn draw_skin(name: &str, pal: &Palette) -> Skin {
    Skin {
        name: name.to_string(),
        frames: AnimationState::ALL.map(|s| draw_frame(s, pal)),
    }
}

/// Cat face for the notification area, drawn on a 32 unit grid.
pub fn tray_icon_image(size: u32) -> RgbaImage {
    let pal = Palette::CLASSIC;
    render(size, size, size as f32 / 32.0, |pen| {
        pen.polygon(&[(3.0, 14.0), (6.0, 1.0), (15.0, 9.0)], pal.outline);
        pen.polygon(&[(17.0, 9.0), (26.0, 1.0), (29.0, 14.0)], pal.outline);
        pen.outlined_ellipse(16.0, 19.0, 13.0, 10.0, &pal);
        pen.ellipse(11.0, 17.0, 1.8, 2.4, pal.outline);
        pen.ellipse(21.0, 17.0, 1.8, 2.4, pal.outline);
        pen.polygon(&[(14.0, 21.0), (18.0, 21.0), (16.0, 23.5)], pal.inner_ear);
    })
}

/// File names tried, in order, in each assets directory.
pub const TRAY_ICON_FILES: &[&str] = &[
    "tray_icon.ico",
    "tray_icon.png",
    "tray_icon.jpg",
    "tray_icon.jpeg",
];

/// The first custom icon found in `dirs`, resized to `size`, or the drawn
/// cat face if there is none or none of them decode.
pub fn load_tray_icon(dirs: &[PathBuf], size: u32) -> RgbaImage {
    let candidates = dirs
        .iter()
        .flat_map(|dir| TRAY_ICON_FILES.iter().map(move |file| dir.join(file)));
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match image::open(&path) {
            Ok(img) => {
                info!("Using custom tray icon {}", path.display());
                return imageops::resize(&img.to_rgba8(), size, size, FilterType::Lanczos3);
            }
            Err(e) => warn!("Ignoring tray icon {}: {}", path.display(), e),
        }
    }
    debug!("Using the drawn tray icon");
    tray_icon_image(size)
}
