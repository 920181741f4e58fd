// Config Module - Display configuration, palette, timers and CLI arguments
//
// The configuration store is the external source of truth for the crystal
// layout, colour palette, timer table and sequence catalog. Everything is
// validated up front: an unknown colour, routine or timer name is fatal at
// startup, never at dispatch time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::grid::{CrystalGrid, CrystalSpec};
use crate::types::{Channels, ColourProfile};
use crate::waves::WaveKind;

pub const TIMER_BUTTON_PULSES: &str = "button press pulses";
pub const TIMER_MIN_BETWEEN: &str = "min between sequences";
pub const TIMER_MAX_BETWEEN: &str = "max between sequences";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Animated crystal display driving an addressable RGBW strip",
    long_about = "Runs the crystal display animation engine: ambient waves roll across the \n\
                  grid while it is idle, button presses pulse individual crystals, and the \n\
                  per-crystal colours are streamed to the strip over DDP."
)]
pub struct Args {
    /// Config file path or name (e.g. --cfg /full/path or --cfg display for
    /// ~/.config/crystalgrid/display.conf)
    #[arg(long)]
    pub cfg: Option<String>,

    /// Strip controller address
    #[arg(short, long)]
    pub strip_ip: Option<String>,

    /// Refresh rate in frames per second
    #[arg(long)]
    pub fps: Option<f64>,

    /// Global strip brightness multiplier (0.0 to 1.0)
    #[arg(short, long)]
    pub brightness: Option<f64>,

    /// Pixel walk-test mode: step the listed pixels through R/G/B/W
    /// (e.g. --test 0,3,8-15)
    #[arg(short = 't', long)]
    pub test: Option<String>,
}

/// One crystal row from the configuration store, ordered by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrystalRow {
    pub name: String,
    pub position: usize,
    /// Index into the strip; -1 means not wired to a physical light.
    pub pixel: i64,
    pub colour: String,
    #[serde(default)]
    pub cracked: bool,
    #[serde(default)]
    pub cracked_colour: String,
    #[serde(default)]
    pub description: String,
}

/// Palette entry: peak channel values plus the idle glow floor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ColourRow {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
    pub glow_red: u8,
    pub glow_green: u8,
    pub glow_blue: u8,
    pub glow_white: u8,
}

impl ColourRow {
    pub fn profile(&self) -> ColourProfile {
        ColourProfile {
            base: Channels::new(
                self.red as f64,
                self.green as f64,
                self.blue as f64,
                self.white as f64,
            ),
            glow: Channels::new(
                self.glow_red as f64,
                self.glow_green as f64,
                self.glow_blue as f64,
                self.glow_white as f64,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceRow {
    pub enabled: bool,
    pub routine: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>, // Stores the config file path (not serialized)

    pub strip_ip: String,
    pub fps: f64,
    pub brightness: f64, // Global brightness multiplier (0.0 to 1.0)
    /// Buttons per grid row.
    pub max_columns: usize,
    /// When false, button colours are only forwarded while a press is active.
    pub illuminate_when_idle: bool,
    /// Pulse count for the shuffle sequence.
    pub random_crystal_pulses: u32,
    pub crystals: Vec<CrystalRow>,
    pub colours: HashMap<String, ColourRow>,
    pub timers: HashMap<String, f64>,
    pub sequences: Vec<SequenceRow>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let colour_cycle = ["green", "blue", "red", "purple", "white"];
        let crystals = (0..9)
            .map(|i| CrystalRow {
                name: format!("Demo {}", i + 1),
                position: i,
                pixel: i as i64,
                colour: colour_cycle[i % colour_cycle.len()].to_string(),
                cracked: i == 4,
                cracked_colour: if i == 4 {
                    "corruption red".to_string()
                } else {
                    String::new()
                },
                description: String::new(),
            })
            .collect();

        let mut colours = HashMap::new();
        colours.insert(
            "green".to_string(),
            ColourRow {
                red: 0,
                green: 255,
                blue: 0,
                white: 0,
                glow_red: 0,
                glow_green: 25,
                glow_blue: 0,
                glow_white: 0,
            },
        );
        colours.insert(
            "blue".to_string(),
            ColourRow {
                red: 0,
                green: 0,
                blue: 255,
                white: 0,
                glow_red: 0,
                glow_green: 0,
                glow_blue: 25,
                glow_white: 0,
            },
        );
        colours.insert(
            "red".to_string(),
            ColourRow {
                red: 255,
                green: 0,
                blue: 0,
                white: 0,
                glow_red: 25,
                glow_green: 0,
                glow_blue: 0,
                glow_white: 0,
            },
        );
        colours.insert(
            "purple".to_string(),
            ColourRow {
                red: 128,
                green: 0,
                blue: 255,
                white: 0,
                glow_red: 12,
                glow_green: 0,
                glow_blue: 25,
                glow_white: 0,
            },
        );
        colours.insert(
            "white".to_string(),
            ColourRow {
                red: 0,
                green: 0,
                blue: 0,
                white: 255,
                glow_red: 0,
                glow_green: 0,
                glow_blue: 0,
                glow_white: 25,
            },
        );
        colours.insert(
            "corruption red".to_string(),
            ColourRow {
                red: 255,
                green: 0,
                blue: 0,
                white: 0,
                glow_red: 25,
                glow_green: 0,
                glow_blue: 0,
                glow_white: 0,
            },
        );

        let mut timers = HashMap::new();
        for side in [
            "left wave",
            "right wave",
            "top wave",
            "bottom wave",
            "top left wave",
            "top right wave",
            "bottom left wave",
            "bottom right wave",
            "raindrop wave",
        ] {
            timers.insert(format!("{side} stages"), 0.5);
            timers.insert(format!("{side} pulses"), 0.001);
        }
        for chain in ["forward chain", "backward chain", "centre chain"] {
            timers.insert(format!("{chain} stages"), 0.2);
            timers.insert(format!("{chain} pulses"), 0.001);
        }
        timers.insert("cracked stages".to_string(), 0.4);
        timers.insert("random stages".to_string(), 0.5);
        timers.insert(TIMER_BUTTON_PULSES.to_string(), 0.005);
        timers.insert(TIMER_MIN_BETWEEN.to_string(), 30.0);
        timers.insert(TIMER_MAX_BETWEEN.to_string(), 120.0);

        let sequences = [
            "left_wave",
            "right_wave",
            "top_wave",
            "bottom_wave",
            "top_left_wave",
            "top_right_wave",
            "bottom_left_wave",
            "bottom_right_wave",
            "chain_wave",
            "reverse_chain_wave",
            "centre_chain_wave",
            "rain_drop",
            "cracked",
            "random_crystal",
        ]
        .iter()
        .map(|routine| SequenceRow {
            enabled: true,
            routine: routine.to_string(),
        })
        .collect();

        DisplayConfig {
            config_path: None,
            strip_ip: "led.local".to_string(),
            fps: 30.0,
            brightness: 1.0,
            max_columns: 3,
            illuminate_when_idle: true,
            random_crystal_pulses: 3,
            crystals,
            colours,
            timers,
            sequences,
        }
    }
}

impl DisplayConfig {
    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            let path = PathBuf::from(cfg);
            if path.is_absolute() {
                return Ok(path);
            }
            if cfg.contains('/') || cfg.contains('\\') {
                return Ok(path);
            }

            // Otherwise treat as config name in the config directory
            let home = std::env::var("HOME")?;
            let config_dir = PathBuf::from(home).join(".config").join("crystalgrid");
            std::fs::create_dir_all(&config_dir)?;

            let filename = if cfg.ends_with(".conf") {
                cfg.to_string()
            } else {
                format!("{}.conf", cfg)
            };
            Ok(config_dir.join(filename))
        } else {
            let home = std::env::var("HOME")?;
            let config_dir = PathBuf::from(home).join(".config").join("crystalgrid");
            std::fs::create_dir_all(&config_dir)?;
            Ok(config_dir.join("config.conf"))
        }
    }

    pub fn load_with_path(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        let contents = std::fs::read_to_string(&path)?;
        let mut parsed: Self = toml::from_str(&contents)?;
        parsed.config_path = Some(path);
        Ok(parsed)
    }

    pub fn save(&self) -> Result<()> {
        let path = match &self.config_path {
            Some(p) => p.clone(),
            None => Self::config_path(None)?,
        };
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Override config values that were explicitly given on the command line.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref strip_ip) = args.strip_ip {
            self.strip_ip = strip_ip.clone();
        }
        if let Some(fps) = args.fps {
            self.fps = fps;
        }
        if let Some(brightness) = args.brightness {
            self.brightness = brightness;
        }
    }

    /// Look a colour name up in the palette. Unknown names are fatal.
    pub fn colour_profile(&self, name: &str) -> Result<ColourProfile> {
        self.colours
            .get(&name.to_lowercase())
            .map(|row| row.profile())
            .ok_or_else(|| anyhow!("unknown colour '{}' in palette", name))
    }

    /// Enabled wave kinds from the sequence catalog. Unknown routine names
    /// are rejected here rather than at dispatch time.
    pub fn enabled_sequences(&self) -> Result<Vec<WaveKind>> {
        let mut kinds = Vec::new();
        for row in self.sequences.iter().filter(|s| s.enabled) {
            let kind = WaveKind::from_routine(&row.routine)
                .ok_or_else(|| anyhow!("unknown sequence routine '{}'", row.routine))?;
            kinds.push(kind);
        }
        Ok(kinds)
    }

    pub fn timer_table(&self) -> Timers {
        Timers::new(self.timers.clone())
    }

    /// Resolve the crystal rows against the palette and lay out the grid.
    pub fn build_grid(&self) -> Result<CrystalGrid> {
        let mut specs = Vec::with_capacity(self.crystals.len());
        for row in &self.crystals {
            let profile = self.colour_profile(&row.colour)?;
            let cracked_profile = if row.cracked {
                if row.cracked_colour.is_empty() {
                    return Err(anyhow!(
                        "cracked crystal '{}' has no corruption colour",
                        row.name
                    ));
                }
                Some(self.colour_profile(&row.cracked_colour)?)
            } else {
                None
            };
            specs.push(CrystalSpec {
                key: format!("{}{}", row.name, row.position),
                pos: row.position,
                pixel: if row.pixel < 0 {
                    None
                } else {
                    Some(row.pixel as usize)
                },
                profile,
                cracked: row.cracked,
                cracked_profile,
                description: row.description.clone(),
            });
        }
        CrystalGrid::new(specs, self.max_columns)
    }

    /// Full startup validation: palette references, routine names and every
    /// timer the enabled sequences will look up.
    pub fn validate(&self) -> Result<()> {
        self.build_grid()?;

        let timers = self.timer_table();
        timers.seconds(TIMER_BUTTON_PULSES)?;
        timers.seconds(TIMER_MIN_BETWEEN)?;
        timers.seconds(TIMER_MAX_BETWEEN)?;

        for kind in self.enabled_sequences()? {
            timers.seconds(kind.stage_timer())?;
            if let Some(pulse_timer) = kind.pulse_timer() {
                timers.seconds(pulse_timer)?;
            }
        }
        Ok(())
    }
}

/// Immutable timer table: named timing parameters in seconds.
#[derive(Clone, Debug)]
pub struct Timers {
    values: HashMap<String, f64>,
}

impl Timers {
    pub fn new(values: HashMap<String, f64>) -> Self {
        Timers { values }
    }

    pub fn seconds(&self, name: &str) -> Result<f64> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("missing timer '{}'", name))
    }

    pub fn duration(&self, name: &str) -> Result<Duration> {
        let secs = self.seconds(name)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(anyhow!("timer '{}' must be a non-negative duration", name));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
