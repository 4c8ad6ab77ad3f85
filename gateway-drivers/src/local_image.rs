//! Local image driver: downscaling is plain resize/re-encode work with no
//! external provider, so it runs in-process rather than through an HTTP
//! client. `submit` never returns `RemoteTask` — there is nothing to poll.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageOutputFormat};

use gateway_core::job::Operation;

use crate::driver::{Driver, DriverCapabilities, DriverInputs, DriverOutcome, PollResult};
use crate::error::{DriverError, DriverResult};

use async_trait::async_trait;

const MIN_SCALE: f64 = 0.1;
const MAX_SCALE_ITERATIONS: u32 = 12;
const MIN_JPEG_QUALITY: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetFormat {
    Jpeg,
    Png,
}

impl TargetFormat {
    fn content_type(self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "image/jpeg",
            TargetFormat::Png => "image/png",
        }
    }

    fn from_request(output_format: &str, original: ImageFormat) -> DriverResult<Self> {
        match output_format {
            "jpeg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "original" => match original {
                ImageFormat::Jpeg => Ok(TargetFormat::Jpeg),
                _ => Ok(TargetFormat::Png),
            },
            other => Err(DriverError::InvalidInput(format!("unsupported output_format: {other}"))),
        }
    }
}

/// Local image-processing driver for operations that have no AI provider
/// backing them. Only `Operation::Downscale` is supported today.
#[derive(Default)]
pub struct LocalImageDriver;

impl LocalImageDriver {
    pub fn new() -> Self {
        Self
    }

    fn encode(image: &DynamicImage, format: TargetFormat, quality: u8) -> DriverResult<Vec<u8>> {
        let mut buf = Vec::new();
        let output_format = match format {
            TargetFormat::Jpeg => ImageOutputFormat::Jpeg(quality),
            TargetFormat::Png => ImageOutputFormat::Png,
        };
        image
            .write_to(&mut std::io::Cursor::new(&mut buf), output_format)
            .map_err(|e| DriverError::InvalidInput(format!("failed to encode image: {e}")))?;
        Ok(buf)
    }

    fn flatten_on_white(image: &DynamicImage) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        let mut canvas = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
        image::imageops::overlay(&mut canvas, image, 0, 0);
        DynamicImage::ImageRgba8(canvas)
    }

    fn apply_square_padding(image: &DynamicImage) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        let side = width.max(height);
        if side == width && side == height {
            return image.clone();
        }
        let x_offset = ((side - width) / 2) as i64;
        let y_offset = ((side - height) / 2) as i64;
        let mut canvas = image::RgbaImage::from_pixel(side, side, image::Rgba([255, 255, 255, 255]));
        image::imageops::overlay(&mut canvas, image, x_offset, y_offset);
        DynamicImage::ImageRgba8(canvas)
    }

    /// Resizes and re-encodes `bytes` until it fits within `max_size_mb`,
    /// optionally padding to a square canvas and converting format. Unlike
    /// a size-estimation heuristic, this measures the actual encoded size at
    /// each step: the scale factor shrinks geometrically until the real
    /// output clears the budget, with a final quality-reduction pass for
    /// JPEG output if geometric shrinking alone isn't enough.
    fn downscale(
        bytes: &[u8],
        max_size_mb: f64,
        aspect_ratio_mode: &str,
        output_format: &str,
    ) -> DriverResult<(Vec<u8>, String)> {
        if max_size_mb <= 0.0 {
            return Err(DriverError::InvalidInput("max_size_mb must be greater than 0".into()));
        }

        let original_format = image::guess_format(bytes)
            .map_err(|e| DriverError::InvalidInput(format!("unrecognized image format: {e}")))?;
        let mut image = image::load_from_memory(bytes)
            .map_err(|e| DriverError::InvalidInput(format!("failed to decode image: {e}")))?;

        let target_format = TargetFormat::from_request(output_format, original_format)?;
        if target_format == TargetFormat::Jpeg {
            image = Self::flatten_on_white(&image);
        }

        let target_bytes = (max_size_mb * 1024.0 * 1024.0) as usize;
        let quality = 85u8;

        let encoded = Self::encode(&image, target_format, quality)?;
        if encoded.len() <= target_bytes {
            let padded = if aspect_ratio_mode == "square" {
                Self::apply_square_padding(&image)
            } else {
                image
            };
            let final_bytes = Self::encode(&padded, target_format, quality)?;
            return Ok((final_bytes, target_format.content_type().to_string()));
        }

        let (original_width, original_height) = (image.width(), image.height());
        let mut scale = 1.0;
        let mut best: Option<Vec<u8>> = None;
        for _ in 0..MAX_SCALE_ITERATIONS {
            scale = (scale * 0.85).max(MIN_SCALE);
            let new_width = ((original_width as f64 * scale) as u32).max(1);
            let new_height = ((original_height as f64 * scale) as u32).max(1);
            let resized = image.resize_exact(new_width, new_height, FilterType::Lanczos3);
            let candidate = Self::encode(&resized, target_format, quality)?;
            let fits = candidate.len() <= target_bytes;
            if fits {
                best = Some(candidate);
                image = resized;
                break;
            }
            image = resized;
            if scale <= MIN_SCALE {
                best = Some(candidate);
                break;
            }
        }

        let mut final_bytes = best.unwrap_or_else(|| Vec::new());
        if final_bytes.is_empty() {
            final_bytes = Self::encode(&image, target_format, quality)?;
        }

        if final_bytes.len() > target_bytes && target_format == TargetFormat::Jpeg {
            let mut q = quality.saturating_sub(10);
            while q >= MIN_JPEG_QUALITY {
                let attempt = Self::encode(&image, target_format, q)?;
                if attempt.len() <= target_bytes {
                    final_bytes = attempt;
                    break;
                }
                final_bytes = attempt;
                q = q.saturating_sub(5);
            }
        }

        if aspect_ratio_mode == "square" {
            let padded = Self::apply_square_padding(&image);
            final_bytes = Self::encode(&padded, target_format, quality)?;
        }

        Ok((final_bytes, target_format.content_type().to_string()))
    }
}

#[async_trait]
impl Driver for LocalImageDriver {
    async fn submit(&self, operation: Operation, inputs: DriverInputs) -> DriverResult<DriverOutcome> {
        if operation != Operation::Downscale {
            return Err(DriverError::InvalidInput(format!(
                "local image driver does not support {operation:?}"
            )));
        }

        let bytes = inputs
            .bytes
            .as_ref()
            .ok_or_else(|| DriverError::InvalidInput("downscale requires input image bytes".into()))?;
        let max_size_mb = inputs
            .params
            .get("max_size_mb")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| DriverError::InvalidInput("downscale requires max_size_mb".into()))?;
        let aspect_ratio_mode = inputs.param_str("aspect_ratio_mode").unwrap_or("original");
        let output_format = inputs.param_str("output_format").unwrap_or("original");

        match Self::downscale(bytes, max_size_mb, aspect_ratio_mode, output_format) {
            Ok((bytes, content_type)) => Ok(DriverOutcome::Synchronous { bytes, content_type, extra: Vec::new() }),
            Err(DriverError::InvalidInput(reason)) => Ok(DriverOutcome::Failed { reason }),
            Err(other) => Err(other),
        }
    }

    async fn poll(
        &self,
        _operation: Operation,
        _provider_task_id: &str,
        _poll_url: Option<&str>,
    ) -> DriverResult<PollResult> {
        Err(DriverError::InvalidInput(
            "local image driver has no remote tasks to poll".into(),
        ))
    }

    fn capabilities(&self, _operation: Operation) -> DriverCapabilities {
        DriverCapabilities {
            needs_input_bytes: true,
            is_synchronous: true,
            artifact_content_type_hint: Some("image/png"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255])));
        let mut buf = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn already_under_target_size_is_returned_unchanged_in_dimensions() {
        let png = make_png(32, 32);
        let driver = LocalImageDriver::new();
        let mut params = serde_json::Map::new();
        params.insert("max_size_mb".to_string(), serde_json::json!(5.0));
        let inputs = DriverInputs { bytes: Some(png), params, ..Default::default() };

        let outcome = driver.submit(Operation::Downscale, inputs).await.unwrap();
        match outcome {
            DriverOutcome::Synchronous { bytes, content_type, .. } => {
                assert_eq!(content_type, "image/png");
                let decoded = image::load_from_memory(&bytes).unwrap();
                assert_eq!((decoded.width(), decoded.height()), (32, 32));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn square_mode_pads_non_square_input() {
        let png = make_png(64, 32);
        let driver = LocalImageDriver::new();
        let mut params = serde_json::Map::new();
        params.insert("max_size_mb".to_string(), serde_json::json!(5.0));
        params.insert("aspect_ratio_mode".to_string(), serde_json::json!("square"));
        let inputs = DriverInputs { bytes: Some(png), params, ..Default::default() };

        let outcome = driver.submit(Operation::Downscale, inputs).await.unwrap();
        match outcome {
            DriverOutcome::Synchronous { bytes, .. } => {
                let decoded = image::load_from_memory(&bytes).unwrap();
                assert_eq!(decoded.width(), decoded.height());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_max_size_mb_is_rejected() {
        let driver = LocalImageDriver::new();
        let inputs = DriverInputs { bytes: Some(make_png(8, 8)), ..Default::default() };
        let result = driver.submit(Operation::Downscale, inputs).await;
        assert!(matches!(result, Err(DriverError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn non_downscale_operation_is_rejected() {
        let driver = LocalImageDriver::new();
        let result = driver.submit(Operation::Upscale, DriverInputs::default()).await;
        assert!(matches!(result, Err(DriverError::InvalidInput(_))));
    }
}
