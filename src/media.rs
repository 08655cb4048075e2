use base64::{engine::general_purpose::STANDARD, Engine};
use std::io::Cursor;
use std::path::Path;

use crate::ai::PromptPart;

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn is_supported_extension(ext: &str) -> bool {
    matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png")
}

impl UploadedImage {
    /// Loads a `.jpg`, `.jpeg` or `.png` upload from disk.
    pub fn open(path: &Path, max_width: u32) -> Result<Self, String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !is_supported_extension(ext) {
            return Err(format!(
                "Unsupported image type '{}' (expected jpg, jpeg or png)",
                path.display()
            ));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

        Self::from_bytes(bytes, max_width)
    }

    /// The MIME type comes from the bytes, not from whatever the file was named.
    pub fn from_bytes(bytes: Vec<u8>, max_width: u32) -> Result<Self, String> {
        let format = image::guess_format(&bytes)
            .map_err(|e| format!("Failed to decode image: {}", e))?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| format!("Failed to decode image: {}", e))?;
        let mime_type = format.to_mime_type();

        let width = image.width();
        let height = image.height();

        if max_width == 0 || width <= max_width {
            return Ok(Self {
                mime_type: mime_type.to_string(),
                bytes,
                width,
                height,
            });
        }

        // Downscale wide uploads, keeping the aspect ratio
        let scale = max_width as f64 / width as f64;
        let new_height = ((height as f64 * scale) as u32).max(1);
        let resized = image.resize_exact(
            max_width,
            new_height,
            image::imageops::FilterType::Triangle,
        );

        let mut buffer = Cursor::new(Vec::new());
        resized
            .write_to(&mut buffer, image::ImageFormat::Png)
            .map_err(|e| format!("Failed to encode image: {}", e))?;

        Ok(Self {
            mime_type: "image/png".to_string(),
            bytes: buffer.into_inner(),
            width: max_width,
            height: new_height,
        })
    }

    pub fn to_prompt_part(&self) -> PromptPart {
        PromptPart::InlineImage {
            mime_type: self.mime_type.clone(),
            base64_data: STANDARD.encode(&self.bytes),
        }
    }
}
