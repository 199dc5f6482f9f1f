//! Built-in four-shade palettes for original Game Boy software

/// A named palette, lightest shade first, as `0xRRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PalettePreset {
    pub name: &'static str,
    pub colors: [u32; 4],
}

impl PalettePreset {
    /// Shade `index` (0 = lightest) as RGBA8
    pub fn rgba(&self, index: usize) -> [u8; 4] {
        let c = self.colors[index & 3];
        [(c >> 16) as u8, (c >> 8) as u8, c as u8, 0xFF]
    }
}

/// Presets in menu order
pub const PALETTE_PRESETS: &[PalettePreset] = &[
    PalettePreset { name: "Grayscale", colors: [0xFFFFFF, 0xAAAAAA, 0x555555, 0x000000] },
    PalettePreset { name: "DMG Green", colors: [0xC6DE8C, 0x84A563, 0x397339, 0x081810] },
    PalettePreset { name: "GB Pocket", colors: [0xE7EFD6, 0xADB594, 0x6B7352, 0x181818] },
    PalettePreset { name: "GB Light", colors: [0x63F2D6, 0x31B5A5, 0x18846B, 0x004A31] },
    PalettePreset { name: "GBC Brown \u{2191}", colors: [0xFFFFFF, 0xFFAD63, 0x843100, 0x000000] },
    PalettePreset { name: "GBC Red \u{2191}A", colors: [0xFFFFFF, 0xFF8584, 0x943A3A, 0x000000] },
    PalettePreset { name: "GBC Dark Brown \u{2191}B", colors: [0xFFE6C5, 0xCE9C84, 0x846B29, 0x5A3108] },
    PalettePreset { name: "GBC Pale Yellow \u{2193}", colors: [0xFFFFA5, 0xFF9494, 0x9494FF, 0x000000] },
    PalettePreset { name: "GBC Orange \u{2193}A", colors: [0xFFFFFF, 0xFFFF00, 0xFF0000, 0x000000] },
    PalettePreset { name: "GBC Yellow \u{2193}B", colors: [0xFFFFFF, 0xFFFF00, 0x7B4A00, 0x000000] },
    PalettePreset { name: "GBC Blue \u{2190}", colors: [0xFFFFFF, 0x63A5FF, 0x0000FF, 0x000000] },
    PalettePreset { name: "GBC Dark Blue \u{2190}A", colors: [0xFFFFFF, 0x8C8CDE, 0x52528C, 0x000000] },
    PalettePreset { name: "GBC Gray \u{2190}B", colors: [0xFFFFFF, 0xA5A5A5, 0x525252, 0x000000] },
    PalettePreset { name: "GBC Green \u{2192}", colors: [0xFFFFFF, 0x52FF00, 0xFF4200, 0x000000] },
    PalettePreset { name: "GBC Dark Green \u{2192}A", colors: [0xFFFFFF, 0x7BFF31, 0x0063C5, 0x000000] },
    PalettePreset { name: "GBC Reverse \u{2192}B", colors: [0x000000, 0x008484, 0xFFDE00, 0xFFFFFF] },
];

/// Default palette when no preset is selected
pub fn default_preset() -> &'static PalettePreset {
    &PALETTE_PRESETS[0]
}

pub fn preset_names() -> Vec<String> {
    PALETTE_PRESETS.iter().map(|p| p.name.to_string()).collect()
}

/// Find a preset by exact name
pub fn find_preset(name: &str) -> Option<&'static PalettePreset> {
    PALETTE_PRESETS.iter().find(|p| p.name == name)
}
