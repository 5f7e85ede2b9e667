//! MT-32 / CM-32L / LAPC-I synthesis engine
//!
//! A bit-accurate model of the Roland LA32 synthesis chip: fixed-point
//! log-domain wave generation, hardware amplitude/cutoff ramps that raise
//! emulated interrupts on boundary crossings, Boss-chip reverb, the analog
//! output-stage low-pass filter, and sample-rate conversion.
//!
//! # Quick start
//! ```no_run
//! use mt32emu::{Synth, SynthOptions};
//!
//! # fn load_roms() -> (Vec<u8>, Vec<u8>) { (Vec::new(), Vec::new()) }
//! let (control_rom, pcm_rom) = load_roms();
//! let mut synth = Synth::new();
//! synth.open(&control_rom, &pcm_rom, SynthOptions::default()).unwrap();
//! synth.play_msg(0x90_3C_64, None).unwrap(); // Note-On, middle C, velocity 100
//!
//! let mut stereo = vec![0i16; 2 * 4096];
//! synth.render(&mut stereo).unwrap();
//! ```
//!
//! This crate emulates only the synthesis engine itself (see the module
//! list below). MIDI-file playback scheduling, a GUI, audio driver
//! bindings and ROM network download are deliberately out of scope; they
//! are external collaborators that drive this crate's public surface.

#![warn(missing_docs)]

mod analog;
pub mod constants;
mod display;
mod envelope;
mod la32;
mod memory;
mod midi;
mod ramp;
mod report;
mod resampler;
mod reverb;
mod rom;
mod synth;
pub mod tables;
mod voice;

pub use analog::AnalogQuality;
pub use display::{DisplayCompatibility, DisplayState};
pub use envelope::{TvaPhase, TvfPhase, TvpPhase};
pub use la32::RendererType;
pub use midi::{MidiEvent, MidiEventQueue, MidiStreamParser, ShortMessage};
pub use report::{NullReportHandler, ReportHandler};
pub use resampler::ResamplerQuality;
pub use reverb::ReverbMode;
pub use rom::{MachineConfig, RomInfo};
pub use synth::{DacInputMode, MidiDelayMode, PartStates, PartialState, Synth, SynthOptions};
pub use voice::PolyState;

/// Error conditions raised by the synthesis engine.
///
/// Per the error handling design, only [`MT32Error::RomNotRecognized`] is
/// fatal; every other variant describes a dropped message or a rejected
/// lifecycle call that leaves engine state unchanged.
#[derive(thiserror::Error, Debug)]
pub enum MT32Error {
    /// SHA-1 of the supplied ROM pair did not match a recognized machine
    /// configuration, or the Control/PCM pairing is inconsistent.
    #[error("ROM not recognized: {0}")]
    RomNotRecognized(String),

    /// An operation requiring an open synth was attempted while closed.
    #[error("synth is not open")]
    NotOpen,

    /// `open()` was called on an already-open synth.
    #[error("synth is already open")]
    AlreadyOpen,

    /// A Data-Set-1 (DT1) Sysex message failed its 2's-complement checksum.
    #[error("sysex checksum invalid")]
    SysexChecksumInvalid,

    /// A Sysex message addressed a region outside parameter memory.
    #[error("sysex address {address:#08x} (length {length}) out of range")]
    SysexAddressOutOfRange {
        /// Target address, as decoded from the 3 base-128 address bytes.
        address: u32,
        /// Requested read/write length in bytes.
        length: usize,
    },

    /// The MIDI event queue was full; the event was discarded.
    #[error("midi event queue full")]
    MidiQueueFull,

    /// A MIDI byte stream could not be parsed (used by `MidiStreamParser`
    /// callers that choose to surface parse failures instead of resyncing).
    #[error("invalid midi data: {0}")]
    InvalidMidiFile(String),

    /// Failure reading ROM bytes or dumping rendered audio from the
    /// filesystem (an ambient concern for tests/benches, not the engine
    /// itself, which never performs I/O on its own).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<String> for MT32Error {
    fn from(msg: String) -> Self {
        MT32Error::InvalidMidiFile(msg)
    }
}

impl From<&str> for MT32Error {
    fn from(msg: &str) -> Self {
        MT32Error::InvalidMidiFile(msg.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, MT32Error>;
