// CrystalGrid - Animated crystal display driving an addressable RGBW strip
//
// Ambient waves roll across the crystal grid while it is idle; pressing a
// crystal preempts everything and pulses that crystal alone. Colours are
// streamed to the strip controller over DDP once per refresh tick.
use anyhow::Result;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod control;
mod engine;
mod grid;
mod pulse;
mod runner;
mod sink;
mod types;
mod waves;

use config::{Args, DisplayConfig};
use engine::Engine;
use sink::{DdpSink, LogDisplaySink, PixelSink};

fn parse_pixel_numbers(test_str: &str) -> Result<Vec<usize>> {
    let mut pixels = Vec::new();

    for part in test_str.split(',') {
        let part = part.trim();
        if part.contains('-') {
            let range_parts: Vec<&str> = part.split('-').collect();
            if range_parts.len() == 2 {
                let start = range_parts[0].parse::<usize>()?;
                let end = range_parts[1].parse::<usize>()?;
                for i in start..=end {
                    pixels.push(i);
                }
            }
        } else {
            pixels.push(part.parse::<usize>()?);
        }
    }

    Ok(pixels)
}

/// Walk-test mode: step each listed pixel through red, green, blue, white
/// and off so miswired crystals are easy to spot from the floor.
async fn walk_test(config: &DisplayConfig, test_str: &str) -> Result<()> {
    let pixels = parse_pixel_numbers(test_str)?;
    let grid = config.build_grid()?;
    let mut sink = DdpSink::connect(&config.strip_ip, config.brightness)?;

    info!(
        strip = %config.strip_ip,
        pixels = pixels.len(),
        "walk test: stepping pixels through R/G/B/W"
    );

    let frame_len = grid.num_pixels * 4;
    for &pixel in &pixels {
        if pixel >= grid.num_pixels {
            warn!(pixel, "skipping: beyond the configured strip");
            continue;
        }
        for colour in [
            [255, 0, 0, 0],
            [0, 255, 0, 0],
            [0, 0, 255, 0],
            [0, 0, 0, 255],
            [0, 0, 0, 0],
        ] {
            let mut frame = vec![0u8; frame_len];
            frame[pixel * 4..pixel * 4 + 4].copy_from_slice(&colour);
            sink.write_frame(&frame)?;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        info!(pixel, "done");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match DisplayConfig::load_with_path(args.cfg.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            warn!("no usable config ({e:#}); starting from defaults");
            let mut config = DisplayConfig::default();
            config.config_path = DisplayConfig::config_path(args.cfg.as_deref()).ok();
            if let Err(e) = config.save() {
                warn!("could not write default config: {e:#}");
            }
            config
        }
    };
    config.merge_with_args(&args);
    config.validate()?;

    if let Some(ref test_str) = args.test {
        return walk_test(&config, test_str).await;
    }

    let pixel_sink = DdpSink::connect(&config.strip_ip, config.brightness)?;
    let engine = Arc::new(Engine::new(
        &config,
        Box::new(pixel_sink),
        Box::new(LogDisplaySink),
    )?);

    let shutdown = Arc::new(AtomicBool::new(false));
    let loop_handle = tokio::spawn(engine.clone().run(shutdown.clone()));

    // Headless stand-in for the display UI: a crystal key on stdin acts as
    // a button press on that crystal.
    let press_engine = engine.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let key = line.trim();
            if key.is_empty() {
                continue;
            }
            let description = press_engine
                .grid()
                .get(key)
                .map(|c| c.description.clone())
                .unwrap_or_default();
            if let Err(e) = press_engine.on_crystal_activated(key, &description).await {
                warn!("button press ignored: {e:#}");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.store(true, Ordering::SeqCst);
    loop_handle.await??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pixel_numbers() {
        assert_eq!(parse_pixel_numbers("3").unwrap(), vec![3]);
        assert_eq!(parse_pixel_numbers("0,2,5").unwrap(), vec![0, 2, 5]);
        assert_eq!(parse_pixel_numbers("1, 4-6").unwrap(), vec![1, 4, 5, 6]);
        assert!(parse_pixel_numbers("abc").is_err());
    }
}
