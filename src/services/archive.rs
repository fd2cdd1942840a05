// src/services/archive.rs
use std::io::{Cursor, Write};

use log::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::PixelforgeError;
use crate::services::codec;

// Bounds the memory a single bundling request can pin.
pub const MAX_ARCHIVE_ITEMS: usize = 100;

pub struct ArchiveOutcome {
    pub data: Vec<u8>,
    pub count: usize,
}

pub struct ArchiveService;

impl ArchiveService {
    pub fn new() -> Self {
        Self
    }

    /// Pack a batch of hex-encoded images into one deflate zip. An entry
    /// that fails to decode is skipped, never aborting the batch; a batch
    /// where nothing decodes is an error rather than a silent empty file.
    pub fn bundle(&self, images: &[String]) -> Result<ArchiveOutcome, PixelforgeError> {
        if images.is_empty() {
            return Err(PixelforgeError::Validation(
                "images must not be empty".to_string(),
            ));
        }
        if images.len() > MAX_ARCHIVE_ITEMS {
            return Err(PixelforgeError::Validation(format!(
                "batch of {} exceeds the {} item limit",
                images.len(),
                MAX_ARCHIVE_ITEMS
            )));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut count = 0usize;

        for (idx, encoded) in images.iter().enumerate() {
            let bytes = match codec::decode(encoded) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping archive entry {}: {}", idx, e);
                    continue;
                }
            };

            writer
                .start_file(format!("image_{idx:03}.png"), options)
                .map_err(|e| PixelforgeError::Archive(e.to_string()))?;
            writer
                .write_all(&bytes)
                .map_err(|e| PixelforgeError::Archive(e.to_string()))?;
            count += 1;
        }

        if count == 0 {
            return Err(PixelforgeError::EmptyArchive);
        }

        let cursor = writer
            .finish()
            .map_err(|e| PixelforgeError::Archive(e.to_string()))?;

        Ok(ArchiveOutcome {
            data: cursor.into_inner(),
            count,
        })
    }
}
