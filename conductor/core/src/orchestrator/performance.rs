//! Performance presets
//!
//! A preset bundles the quality knobs of a remote session. Lower color depth
//! and fewer effects trade fidelity for bandwidth.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named trade-off between quality and responsiveness
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformancePreset {
    /// Maximum responsiveness
    Performance,
    /// Middle ground
    #[default]
    Balanced,
    /// Maximum fidelity
    Quality,
}

impl PerformancePreset {
    /// Parse a preset name (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "performance" => Some(Self::Performance),
            "balanced" => Some(Self::Balanced),
            "quality" => Some(Self::Quality),
            _ => None,
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Performance => "Performance",
            Self::Balanced => "Balanced",
            Self::Quality => "Quality",
        }
    }

    /// Knob values for this preset
    #[must_use]
    pub fn options(&self) -> PerformanceOptions {
        match self {
            Self::Performance => PerformanceOptions {
                color_depth: 16,
                update_frequency_fps: 10,
                audio_quality: AudioQuality::Off,
                desktop_background: false,
                visual_effects: false,
                themes: false,
                compression: true,
                bitmap_caching: true,
            },
            Self::Balanced => PerformanceOptions {
                color_depth: 16,
                update_frequency_fps: 15,
                audio_quality: AudioQuality::Low,
                desktop_background: false,
                visual_effects: false,
                themes: false,
                compression: true,
                bitmap_caching: true,
            },
            Self::Quality => PerformanceOptions {
                color_depth: 32,
                update_frequency_fps: 30,
                audio_quality: AudioQuality::High,
                desktop_background: true,
                visual_effects: true,
                themes: true,
                compression: false,
                bitmap_caching: true,
            },
        }
    }
}

impl fmt::Display for PerformancePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio redirection quality
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioQuality {
    /// No audio
    Off,
    /// Low bitrate
    Low,
    /// Medium bitrate
    Medium,
    /// High bitrate
    High,
}

/// Concrete quality knobs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct PerformanceOptions {
    /// Bits per pixel
    pub color_depth: u8,
    /// Screen updates per second
    pub update_frequency_fps: u8,
    /// Audio quality
    pub audio_quality: AudioQuality,
    /// Show the remote wallpaper
    pub desktop_background: bool,
    /// Menu animations and shadows
    pub visual_effects: bool,
    /// Remote desktop themes
    pub themes: bool,
    /// Bulk compression
    pub compression: bool,
    /// Bitmap caching
    pub bitmap_caching: bool,
}
