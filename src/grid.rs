// Grid module - Crystal elements and the 2-D display grid they sit in

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::types::{text_channels, Channels, ColourProfile, Rgb, Rgbw};

/// Mutable animation state for one crystal. The display channels drive the
/// button/background colour, the text channels the label foreground, and the
/// pixel channels (glow-floored) the physical light.
#[derive(Clone, Copy, Debug)]
pub struct AnimState {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub white: f64,
    pub text_red: f64,
    pub text_green: f64,
    pub text_blue: f64,
    pub pixel_red: f64,
    pub pixel_green: f64,
    pub pixel_blue: f64,
    pub pixel_white: f64,
}

impl AnimState {
    /// Idle baseline: display off, text full white, pixel at the glow floor.
    pub fn idle(profile: &ColourProfile) -> Self {
        AnimState {
            red: 0.0,
            green: 0.0,
            blue: 0.0,
            white: 0.0,
            text_red: 255.0,
            text_green: 255.0,
            text_blue: 255.0,
            pixel_red: profile.glow.red,
            pixel_green: profile.glow.green,
            pixel_blue: profile.glow.blue,
            pixel_white: profile.glow.white,
        }
    }

    pub fn update_text(&mut self) {
        let (r, g, b) = text_channels(self.red, self.green, self.blue, self.white);
        self.text_red = r;
        self.text_green = g;
        self.text_blue = b;
    }

    /// Floor the pixel channels at the given glow colour so the physical
    /// light never dips below its idle illumination mid-pulse.
    pub fn apply_glow_floor(&mut self, glow: &Channels) {
        self.pixel_red = if self.red < glow.red { glow.red } else { self.red };
        self.pixel_green = if self.green < glow.green {
            glow.green
        } else {
            self.green
        };
        self.pixel_blue = if self.blue < glow.blue {
            glow.blue
        } else {
            self.blue
        };
        self.pixel_white = if self.white < glow.white {
            glow.white
        } else {
            self.white
        };
    }
}

/// Everything sampled from one crystal on a refresh tick, clamped.
#[derive(Clone, Copy, Debug)]
pub struct CrystalSample {
    pub display: Rgbw,
    pub text: Rgb,
    pub pixel: Rgbw,
}

/// Input row for building a grid, with colour names already resolved
/// against the palette.
#[derive(Clone, Debug)]
pub struct CrystalSpec {
    pub key: String,
    pub pos: usize,
    pub pixel: Option<usize>,
    pub profile: ColourProfile,
    pub cracked: bool,
    pub cracked_profile: Option<ColourProfile>,
    pub description: String,
}

/// One grid cell with an assigned crystal, optionally wired to a pixel.
pub struct Crystal {
    pub key: String,
    pub pos: usize,
    pub pixel: Option<usize>,
    pub row: usize,
    pub column: usize,
    pub profile: ColourProfile,
    pub cracked: bool,
    pub cracked_profile: Option<ColourProfile>,
    pub description: String,
    state: Mutex<AnimState>,
}

impl Crystal {
    pub fn state(&self) -> MutexGuard<'_, AnimState> {
        self.state.lock().unwrap()
    }

    /// Reset to the idle baseline using this crystal's own glow colour.
    pub fn reset_to_idle(&self) {
        *self.state() = AnimState::idle(&self.profile);
    }

    /// Read and clamp the current animation state.
    pub fn sample(&self) -> CrystalSample {
        let st = *self.state();
        let display = Channels::new(st.red, st.green, st.blue, st.white).to_rgbw();
        let text = Channels::new(st.text_red, st.text_green, st.text_blue, 0.0).to_rgbw();
        let pixel =
            Channels::new(st.pixel_red, st.pixel_green, st.pixel_blue, st.pixel_white).to_rgbw();
        CrystalSample {
            display,
            text: Rgb {
                r: text.r,
                g: text.g,
                b: text.b,
            },
            pixel,
        }
    }
}

pub struct CrystalGrid {
    crystals: Vec<Crystal>,
    by_key: HashMap<String, usize>,
    by_pos: HashMap<usize, usize>,
    /// Row counter after grid layout. Matches the layout loop exactly: one
    /// past the last row when that row is complete, the last row index
    /// otherwise. The wave formulas depend on this exact value.
    pub max_rows: usize,
    /// Highest column index (columns per row minus one).
    pub max_cols: usize,
    /// Highest pixel index plus one; zero when nothing is wired.
    pub num_pixels: usize,
    /// Whether the final row of the grid is completely filled.
    pub full_last_row: bool,
}

impl CrystalGrid {
    /// Lay the crystals out row-major, wrapping at `max_columns`.
    pub fn new(mut specs: Vec<CrystalSpec>, max_columns: usize) -> Result<Self> {
        if max_columns == 0 {
            return Err(anyhow!("grid must have at least one column"));
        }
        specs.sort_by_key(|s| s.pos);

        let max_cols = max_columns - 1;
        let mut crystals = Vec::with_capacity(specs.len());
        let mut by_key = HashMap::new();
        let mut by_pos = HashMap::new();
        let mut num_pixels = 0usize;

        let mut row = 0usize;
        let mut col = 0usize;
        let mut full_last_row = false;

        for spec in specs {
            let index = crystals.len();
            if by_key.insert(spec.key.clone(), index).is_some() {
                return Err(anyhow!("duplicate crystal key '{}'", spec.key));
            }
            if by_pos.insert(spec.pos, index).is_some() {
                return Err(anyhow!("duplicate crystal position {}", spec.pos));
            }
            if let Some(pixel) = spec.pixel {
                num_pixels = num_pixels.max(pixel + 1);
            }

            let state = Mutex::new(AnimState::idle(&spec.profile));
            crystals.push(Crystal {
                key: spec.key,
                pos: spec.pos,
                pixel: spec.pixel,
                row,
                column: col,
                profile: spec.profile,
                cracked: spec.cracked,
                cracked_profile: spec.cracked_profile,
                description: spec.description,
                state,
            });

            col += 1;
            full_last_row = false;
            if col > max_cols {
                col = 0;
                row += 1;
                full_last_row = true;
            }
        }

        if crystals.is_empty() {
            return Err(anyhow!("no crystals configured"));
        }

        Ok(CrystalGrid {
            crystals,
            by_key,
            by_pos,
            max_rows: row,
            max_cols,
            num_pixels,
            full_last_row,
        })
    }

    pub fn crystals(&self) -> &[Crystal] {
        &self.crystals
    }

    pub fn get(&self, key: &str) -> Option<&Crystal> {
        self.by_key.get(key).map(|&i| &self.crystals[i])
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn by_pos(&self, pos: usize) -> Option<&Crystal> {
        self.by_pos.get(&pos).map(|&i| &self.crystals[i])
    }

    pub fn index_by_pos(&self, pos: usize) -> Option<usize> {
        self.by_pos.get(&pos).copied()
    }

    /// Indices of the cracked crystals, in position order.
    pub fn cracked_indices(&self) -> Vec<usize> {
        self.crystals
            .iter()
            .enumerate()
            .filter(|(_, c)| c.cracked)
            .map(|(i, _)| i)
            .collect()
    }

    /// Positions of every crystal wired to a physical pixel.
    pub fn wired_positions(&self) -> Vec<usize> {
        self.crystals
            .iter()
            .filter(|c| c.pixel.is_some())
            .map(|c| c.pos)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::Channels;

    pub fn profile(base: Channels, glow: Channels) -> ColourProfile {
        ColourProfile { base, glow }
    }

    /// Fully wired rows*cols grid, pixel index equal to position.
    pub fn wired_grid(rows: usize, cols: usize) -> CrystalGrid {
        let specs = (0..rows * cols)
            .map(|pos| CrystalSpec {
                key: format!("crystal{pos}"),
                pos,
                pixel: Some(pos),
                profile: profile(
                    Channels::new(0.0, 255.0, 0.0, 0.0),
                    Channels::new(0.0, 25.0, 0.0, 0.0),
                ),
                cracked: false,
                cracked_profile: None,
                description: String::new(),
            })
            .collect();
        CrystalGrid::new(specs, cols).unwrap()
    }
}
