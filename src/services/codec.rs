// src/services/codec.rs
use crate::errors::PixelforgeError;

/// Hex is the only form image bytes take across the service boundary.
pub fn encode(data: &[u8]) -> String {
    hex::encode(data)
}

pub fn decode(text: &str) -> Result<Vec<u8>, PixelforgeError> {
    hex::decode(text.trim()).map_err(|e| PixelforgeError::Decode(e.to_string()))
}
