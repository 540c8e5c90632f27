// On-disk player settings: a serde_json blob, lightly XOR-obfuscated so
// the file is not trivially hand-edited. This is obfuscation, not
// security; the key lives in the binary.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

const XOR_KEY: &[u8] = b"decodernax";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub jump_volume: f32,
    pub fullscreen: bool,
    pub resolution_index: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jump_volume: 0.7,
            fullscreen: false,
            resolution_index: 2,
        }
    }
}

impl Settings {
    /// Force every field into its valid range. A tampered or corrupt file
    /// decodes into something playable instead of something broken.
    pub fn clamped(mut self) -> Self {
        self.jump_volume = self.jump_volume.clamp(0.0, 1.0);
        if self.resolution_index >= 5 {
            self.resolution_index = Self::default().resolution_index;
        }
        self
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec(self).map_err(io::Error::other)?;
        fs::write(path, xor_crypt(&json))
    }

    /// Load and clamp. Missing file is an error the caller turns into
    /// defaults; a file that decodes to garbage is too.
    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = fs::read(path)?;
        let json = xor_crypt(&raw);
        let settings: Settings = serde_json::from_slice(&json).map_err(io::Error::other)?;
        Ok(settings.clamped())
    }
}

/// Symmetric: applying twice yields the input.
fn xor_crypt(data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(XOR_KEY.iter().cycle())
        .map(|(byte, key)| byte ^ key)
        .collect()
}
