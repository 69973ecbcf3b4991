use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbaImage;
use std::io::Cursor;

/// Raw raster for one attached display.
pub struct DisplayFrame {
    pub index: usize,
    pub label: String,
    pub image: RgbaImage,
}

/// Display enumeration + raster capture capability. Blocking; callers run it
/// on the blocking pool.
pub trait ScreenSource: Send + Sync {
    fn capture_all(&self) -> Result<Vec<DisplayFrame>>;
}

/// Real capture through xcap. The raster is rebuilt from raw bytes so the
/// crate's own `image` version never has to match xcap's.
pub struct XcapScreenSource;

impl ScreenSource for XcapScreenSource {
    fn capture_all(&self) -> Result<Vec<DisplayFrame>> {
        let monitors = xcap::Monitor::all().map_err(|err| anyhow!("monitor enumeration failed: {err}"))?;

        let mut frames = Vec::with_capacity(monitors.len());
        for (index, monitor) in monitors.into_iter().enumerate() {
            let label = monitor.name().to_string();
            let raw = match monitor.capture_image() {
                Ok(raster) => raster,
                Err(err) => {
                    // One unreadable display should not sink the others.
                    log::warn!("capture failed for display {} ({}): {}", index, label, err);
                    continue;
                }
            };

            let (width, height) = (raw.width(), raw.height());
            let image = RgbaImage::from_raw(width, height, raw.into_raw())
                .ok_or_else(|| anyhow!("raster size mismatch for display {index}"))?;

            frames.push(DisplayFrame { index, label, image });
        }

        Ok(frames)
    }
}

/// Null-object fallback for hosts with no capture capability; every cycle
/// sees zero displays.
pub struct NullScreenSource;

impl ScreenSource for NullScreenSource {
    fn capture_all(&self) -> Result<Vec<DisplayFrame>> {
        Ok(Vec::new())
    }
}

const DOWNSCALE_DIVISOR: u32 = 2;
const JPEG_QUALITY: u8 = 60;

/// Downsample to half linear scale and encode as lossy JPEG.
pub fn encode_frame(frame: &DisplayFrame) -> Result<Vec<u8>> {
    let width = (frame.image.width() / DOWNSCALE_DIVISOR).max(1);
    let height = (frame.image.height() / DOWNSCALE_DIVISOR).max(1);

    let resized = image::imageops::resize(&frame.image, width, height, FilterType::Triangle);
    let rgb = image::DynamicImage::ImageRgba8(resized).to_rgb8();

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&rgb)
        .with_context(|| format!("jpeg encode failed for display {}", frame.index))?;

    Ok(buffer.into_inner())
}
