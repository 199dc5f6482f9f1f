//! ROM image loading and header identification

use crate::error::LoadError;
use std::path::{Path, PathBuf};

/// Hardware family a ROM targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Gba,
    Gb,
    Gbc,
}

impl Platform {
    /// Native screen size in pixels
    pub fn screen_size(&self) -> (u32, u32) {
        match self {
            Platform::Gba => (240, 160),
            Platform::Gb | Platform::Gbc => (160, 144),
        }
    }
}

const GBA_HEADER_LEN: usize = 0xC0;
const GBA_FIXED_VALUE_OFFSET: usize = 0xB2;
const GBA_FIXED_VALUE: u8 = 0x96;
const GBA_TITLE: std::ops::Range<usize> = 0xA0..0xAC;

const GB_HEADER_LEN: usize = 0x150;
const GB_LOGO_OFFSET: usize = 0x104;
const GB_LOGO_PREFIX: [u8; 4] = [0xCE, 0xED, 0x66, 0x66];
const GB_CGB_FLAG_OFFSET: usize = 0x143;
const GB_TITLE: std::ops::Range<usize> = 0x134..0x143;

/// A validated ROM image held in memory
#[derive(Debug, Clone)]
pub struct RomImage {
    pub path: PathBuf,
    pub data: Vec<u8>,
    pub platform: Platform,
    /// Title from the cartridge header, trimmed
    pub title: String,
}

impl RomImage {
    /// Read and identify a ROM file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path, data)
    }

    /// Identify an in-memory image; `path` names it for save files
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Result<Self, LoadError> {
        let (platform, title) = identify(&data)?;
        Ok(Self {
            path: path.into(),
            data,
            platform,
            title,
        })
    }

    /// File stem used to name battery and state files
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rom".to_string())
    }

    /// Rolling hash of the whole image
    pub fn checksum(&self) -> u32 {
        self.data
            .iter()
            .fold(0u32, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as u32))
    }
}

fn header_title(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect::<String>()
        .trim()
        .to_string()
}

fn identify(data: &[u8]) -> Result<(Platform, String), LoadError> {
    if data.is_empty() {
        return Err(LoadError::InvalidImage("empty file".to_string()));
    }

    if data.len() >= GBA_HEADER_LEN && data[GBA_FIXED_VALUE_OFFSET] == GBA_FIXED_VALUE {
        return Ok((Platform::Gba, header_title(&data[GBA_TITLE])));
    }

    if data.len() >= GB_HEADER_LEN
        && data[GB_LOGO_OFFSET..GB_LOGO_OFFSET + GB_LOGO_PREFIX.len()] == GB_LOGO_PREFIX
    {
        let platform = if data[GB_CGB_FLAG_OFFSET] & 0x80 != 0 {
            Platform::Gbc
        } else {
            Platform::Gb
        };
        return Ok((platform, header_title(&data[GB_TITLE])));
    }

    Err(LoadError::InvalidImage(format!(
        "unrecognised header ({} bytes)",
        data.len()
    )))
}

/// Minimal valid image builders, shared by tests across the workspace
pub mod test_images {
    use super::*;

    /// A GBA image with the given title
    pub fn gba(title: &str) -> Vec<u8> {
        let mut data = vec![0u8; 0x200];
        data[GBA_FIXED_VALUE_OFFSET] = GBA_FIXED_VALUE;
        let len = title.len().min(GBA_TITLE.len());
        data[GBA_TITLE.start..GBA_TITLE.start + len].copy_from_slice(&title.as_bytes()[..len]);
        data
    }

    /// A GB image; `color` sets the CGB flag
    pub fn gb(title: &str, color: bool) -> Vec<u8> {
        let mut data = vec![0u8; 0x8000];
        data[GB_LOGO_OFFSET..GB_LOGO_OFFSET + 4].copy_from_slice(&GB_LOGO_PREFIX);
        let len = title.len().min(GB_TITLE.len());
        data[GB_TITLE.start..GB_TITLE.start + len].copy_from_slice(&title.as_bytes()[..len]);
        if color {
            data[GB_CGB_FLAG_OFFSET] = 0x80;
        }
        data
    }
}
