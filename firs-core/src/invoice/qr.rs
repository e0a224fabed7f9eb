//! QR codes for invoice view links, rendered as base64 PNG images.
use base64ct::{Base64, Encoding};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrCodeError {
    #[error("QR payload is empty")]
    EmptyPayload,
    #[error("QR encoding failed: {0}")]
    Encode(String),
    #[error("QR image encoding failed: {0}")]
    Image(String),
}

pub type QrResult<T> = std::result::Result<T, QrCodeError>;

/// Turns a string (the invoice view URL) into a base64 image.
pub trait QrEncoder: Send + Sync {
    fn encode_base64(&self, data: &str) -> QrResult<String>;
}

/// QR code rendered to a grayscale PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngQrEncoder {
    min_size: u32,
}

impl PngQrEncoder {
    /// `min_size` is the smallest width/height of the PNG in pixels.
    pub fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self::new(200)
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode_base64(&self, data: &str) -> QrResult<String> {
        if data.is_empty() {
            return Err(QrCodeError::EmptyPayload);
        }
        let code = QrCode::new(data.as_bytes()).map_err(|e| QrCodeError::Encode(e.to_string()))?;
        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| QrCodeError::Image(e.to_string()))?;
        Ok(Base64::encode_string(&png))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_url_as_png() {
        let encoder = PngQrEncoder::default();
        let b64 = encoder
            .encode_base64("http://localhost:3000/invoice/view/INV001")
            .expect("qr");
        let png = Base64::decode_vec(&b64).expect("base64");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).expect("png");
        assert!(decoded.width() >= 200);
        assert_eq!(decoded.width(), decoded.height());
    }

    #[test]
    fn same_input_gives_same_image() {
        let encoder = PngQrEncoder::new(64);
        assert_eq!(
            encoder.encode_base64("INV001").expect("qr"),
            encoder.encode_base64("INV001").expect("qr")
        );
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            PngQrEncoder::default().encode_base64(""),
            Err(QrCodeError::EmptyPayload)
        ));
    }
}
