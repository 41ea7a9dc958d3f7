//! Desktop device-emulation presets.

use serde::Serialize;

use crate::types::BrowserEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Viewport, user agent and input capabilities for an emulated device.
#[derive(Debug, Clone, Serialize)]
pub struct DevicePreset {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
    pub default_engine: BrowserEngine,
}

const DESKTOP_VIEWPORT: Viewport = Viewport {
    width: 1280,
    height: 720,
};

pub const PRESETS: &[DevicePreset] = &[
    DevicePreset {
        name: "Desktop Chrome",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.28 Safari/537.36",
        viewport: DESKTOP_VIEWPORT,
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        default_engine: BrowserEngine::Chromium,
    },
    DevicePreset {
        name: "Desktop Edge",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.28 Safari/537.36 Edg/120.0.6099.28",
        viewport: DESKTOP_VIEWPORT,
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        default_engine: BrowserEngine::Chromium,
    },
    DevicePreset {
        name: "Desktop Firefox",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        viewport: DESKTOP_VIEWPORT,
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        default_engine: BrowserEngine::Firefox,
    },
    DevicePreset {
        name: "Desktop Safari",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        viewport: DESKTOP_VIEWPORT,
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        default_engine: BrowserEngine::Webkit,
    },
];

impl DevicePreset {
    /// Find a preset by its exact name (e.g. "Desktop Chrome").
    pub fn lookup(name: &str) -> Option<&'static DevicePreset> {
        PRESETS.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let preset = DevicePreset::lookup("Desktop Safari").unwrap();
        assert_eq!(preset.default_engine, BrowserEngine::Webkit);
        assert_eq!(preset.viewport.width, 1280);
        assert!(!preset.is_mobile);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(DevicePreset::lookup("Pixel 7").is_none());
    }

    #[test]
    fn test_every_engine_has_a_preset() {
        for engine in [
            BrowserEngine::Chromium,
            BrowserEngine::Firefox,
            BrowserEngine::Webkit,
        ] {
            assert!(PRESETS.iter().any(|p| p.default_engine == engine));
        }
    }
}
