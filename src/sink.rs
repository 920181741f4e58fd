// Sink module - Output seams towards the excluded collaborators
//
// The engine samples crystal state once per tick and forwards it through
// these traits: `PixelSink` takes the batched RGBW frame for the strip,
// `DisplaySink` takes per-crystal button/text colours and description text
// for whatever UI is attached.

use std::net::UdpSocket;

use anyhow::Result;
use ddp_rs::connection::DDPConnection;
use ddp_rs::protocol::{PixelConfig, ID};
use tracing::info;

use crate::types::{Rgb, Rgbw};

/// Batched per-tick frame output, 4 bytes (RGBW) per pixel.
pub trait PixelSink: Send {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
}

/// Per-crystal UI output.
pub trait DisplaySink: Send {
    fn set_colour(&mut self, key: &str, colour: Rgbw, text: Rgb) -> Result<()>;
    fn show_description(&mut self, key: &str, text: &str) -> Result<()>;
}

/// Strip output over DDP. The wire frame is RGB; the white channel is
/// folded into the colour channels and the global brightness applied here.
pub struct DdpSink {
    connection: DDPConnection,
    brightness: f64,
    wire_frame: Vec<u8>,
}

impl DdpSink {
    pub fn connect(strip_ip: &str, brightness: f64) -> Result<Self> {
        let dest_addr = format!("{}:4048", strip_ip);
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let connection =
            DDPConnection::try_new(&dest_addr, PixelConfig::default(), ID::Default, socket)?;
        Ok(DdpSink {
            connection,
            brightness: brightness.clamp(0.0, 1.0),
            wire_frame: Vec::new(),
        })
    }
}

impl PixelSink for DdpSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        let pixels = frame.len() / 4;
        self.wire_frame.clear();
        self.wire_frame.reserve(pixels * 3);
        for pixel in frame.chunks_exact(4) {
            let w = pixel[3];
            for channel in [pixel[0], pixel[1], pixel[2]] {
                let mixed = channel.saturating_add(w);
                self.wire_frame
                    .push((mixed as f64 * self.brightness) as u8);
            }
        }
        self.connection.write(&self.wire_frame)?;
        Ok(())
    }
}

/// Discards frames; used by the walk test and in tests.
pub struct NullPixelSink;

impl PixelSink for NullPixelSink {
    fn write_frame(&mut self, _frame: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Headless display: colour updates are dropped, description popups go to
/// the log so a button press is still visible.
pub struct LogDisplaySink;

impl DisplaySink for LogDisplaySink {
    fn set_colour(&mut self, _key: &str, _colour: Rgbw, _text: Rgb) -> Result<()> {
        Ok(())
    }

    fn show_description(&mut self, key: &str, text: &str) -> Result<()> {
        info!(crystal = key, "{}", text);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records everything pushed through the sinks.
    #[derive(Clone, Default)]
    pub struct Recorder {
        pub frames: Arc<Mutex<Vec<Vec<u8>>>>,
        pub colours: Arc<Mutex<Vec<(String, Rgbw, Rgb)>>>,
        pub descriptions: Arc<Mutex<Vec<(String, String)>>>,
    }

    pub struct RecordingPixelSink(pub Recorder);

    impl PixelSink for RecordingPixelSink {
        fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
            self.0.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    pub struct RecordingDisplaySink(pub Recorder);

    impl DisplaySink for RecordingDisplaySink {
        fn set_colour(&mut self, key: &str, colour: Rgbw, text: Rgb) -> Result<()> {
            self.0
                .colours
                .lock()
                .unwrap()
                .push((key.to_string(), colour, text));
            Ok(())
        }

        fn show_description(&mut self, key: &str, text: &str) -> Result<()> {
            self.0
                .descriptions
                .lock()
                .unwrap()
                .push((key.to_string(), text.to_string()));
            Ok(())
        }
    }
}
