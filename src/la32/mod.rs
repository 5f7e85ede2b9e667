//! Per-partial LA32 oscillator.
//!
//! Produces one signed 16-bit log-domain sample per step, blending a
//! square/saw hybrid (or PCM playback) with resonance, driven by the
//! current amplitude/cutoff ramps and pitch from `TVP`.

mod float_wave_generator;
mod wave_generator;

pub use float_wave_generator::LA32FloatWaveGenerator;
pub use wave_generator::{LA32WaveGenerator, WaveGeneratorInput};

/// Selects which wave generator variant a `Synth` instance uses.
///
/// Both variants implement the same mapping from ramps + pitch + timbre
/// parameters to a PCM sample; the integer variant matches the original
/// fixed-point firmware bit-for-bit, the float variant trades that
/// guarantee for a renderer more amenable to further DSP. The renderer
/// type is fixed for the lifetime of an open `Synth` (read once at
/// `open()`), never switched mid-stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RendererType {
    /// Bit-accurate fixed-point renderer (the default).
    #[default]
    Bit,
    /// IEEE-float renderer for higher-quality downstream processing.
    Float,
}

/// One partial's active sound-generation parameters, sampled fresh each
/// step from the bound timbre memory and the driving envelopes.
#[derive(Clone, Copy, Debug, Default)]
pub struct PartialTimbreParams {
    /// Pulse width, 0..=100 (firmware 0..=100 WG pulse width parameter).
    pub pulse_width: u8,
    /// Resonance amount, 0..=30.
    pub resonance: u8,
    /// `true` selects PCM playback mode instead of synth (square/saw) mode.
    pub pcm_mode: bool,
    /// Index into the PCM ROM wave table (only meaningful in PCM mode).
    pub pcm_wave_index: u16,
    /// `true` if the selected PCM wave loops at its stored loop point.
    pub pcm_looped: bool,
}
