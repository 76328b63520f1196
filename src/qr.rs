use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgba, RgbaImage};
use log::debug;
use qrcode::{Color, QrCode};

use crate::error::{DecodeError, Error};

/// Pixel size of the live preview in the generator panel.
pub const PREVIEW_SIZE: u32 = 191;
/// Pixel size used when downloading a saved favorite.
pub const DOWNLOAD_SIZE: u32 = 300;

const QUIET_ZONE: usize = 4;

fn build(text: &str) -> Result<QrCode, Error> {
    QrCode::new(text.as_bytes()).map_err(|e| Error::Encode(e.to_string()))
}

/// Vector rendering of the symbol, at least `size` pixels square.
pub fn render_svg(text: &str, size: u32) -> Result<String, Error> {
    let code = build(text)?;
    Ok(code
        .render::<qrcode::render::svg::Color>()
        .min_dimensions(size, size)
        .build())
}

/// Bitmap rendering with a four-module quiet zone. Modules are whole pixels,
/// so the result may be slightly smaller than `size`.
pub fn render_rgba(text: &str, size: u32) -> Result<RgbaImage, Error> {
    let code = build(text)?;
    let modules = code.width();
    let colors = code.to_colors();

    let total = modules + QUIET_ZONE * 2;
    let scale = (size as usize / total).max(1);
    let side = (total * scale) as u32;

    Ok(RgbaImage::from_fn(side, side, |x, y| {
        let mx = (x as usize / scale).checked_sub(QUIET_ZONE);
        let my = (y as usize / scale).checked_sub(QUIET_ZONE);
        let dark = match (mx, my) {
            (Some(mx), Some(my)) if mx < modules && my < modules => {
                colors[my * modules + mx] == Color::Dark
            }
            _ => false,
        };
        if dark {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    }))
}

/// `<name>.png`, falling back to `qrcode.png`.
pub fn download_file_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return "qrcode.png".to_string();
    }
    let safe: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
        .collect();
    format!("{}.png", safe)
}

/// Rasterises `url` and writes it as PNG into `dir`.
pub fn save_png(url: &str, name: &str, size: u32, dir: &Path) -> Result<PathBuf, Error> {
    let image = render_rgba(url, size)?;
    let path = dir.join(download_file_name(name));
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| Error::Encode(e.to_string()))?;
    debug!("qr: saved {:?}", path);
    Ok(path)
}

fn luma(px: &[u8]) -> u8 {
    let [r, g, b, a] = [px[0] as u32, px[1] as u32, px[2] as u32, px[3] as u32];
    let grey = (r * 299 + g * 587 + b * 114) / 1000;
    // Composite over white so transparent backgrounds read as light.
    ((grey * a + 255 * (255 - a)) / 255) as u8
}

/// Finds and decodes the first QR symbol in a raw RGBA buffer.
pub fn decode_rgba(pixels: &[u8], width: u32, height: u32) -> Result<String, DecodeError> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || pixels.len() < w * h * 4 {
        return Err(DecodeError::EmptyImage);
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
        let i = (y * w + x) * 4;
        luma(&pixels[i..i + 4])
    });

    prepared
        .detect_grids()
        .into_iter()
        .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
        .ok_or(DecodeError::NotFound)
}

/// Loads an encoded image file (PNG, JPEG) and decodes it.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<String, DecodeError> {
    let image = image::load_from_memory(bytes).map_err(|e| DecodeError::ImageLoad(e.to_string()))?;
    let rgba = image.to_rgba8();
    debug!("qr: decoding {}x{} image", rgba.width(), rgba.height());
    decode_rgba(rgba.as_raw(), rgba.width(), rgba.height())
}
