// Shared types module - Colour model used across the engine

/// Clamp a single animated channel into the displayable 0-255 range.
/// Pulse calculations intentionally overshoot; clamping only happens at the
/// sampling boundary in the refresh loop.
pub fn clamp_channel(value: f64) -> u8 {
    if value > 255.0 {
        255
    } else if value < 0.0 {
        0
    } else {
        value as u8
    }
}

// RGBW color representation (sampled, clamped)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgbw {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

// RGB color for the text/foreground channels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// One set of raw channel values, kept as f64 so the pulse math can run
/// unclamped between samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Channels {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub white: f64,
}

impl Channels {
    pub fn new(red: f64, green: f64, blue: f64, white: f64) -> Self {
        Channels {
            red,
            green,
            blue,
            white,
        }
    }

    pub fn to_rgbw(self) -> Rgbw {
        Rgbw {
            r: clamp_channel(self.red),
            g: clamp_channel(self.green),
            b: clamp_channel(self.blue),
            w: clamp_channel(self.white),
        }
    }
}

/// Foreground colour for a button label: 255 minus the channel, except that
/// a lit white channel dominates all three.
pub fn text_channels(red: f64, green: f64, blue: f64, white: f64) -> (f64, f64, f64) {
    if white > 0.0 {
        (255.0 - white, 255.0 - white, 255.0 - white)
    } else {
        (255.0 - red, 255.0 - green, 255.0 - blue)
    }
}

/// Full colour definition for one palette entry: the peak brightness the
/// pulse ramps towards plus the idle glow floor shown when nothing animates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColourProfile {
    pub base: Channels,
    pub glow: Channels,
}
