//! Crate-wide numeric constants that aren't lookup tables.
//!
//! [`crate::tables::Tables`] holds derived per-sample lookup data; this
//! module holds the fixed architectural numbers around it (part/partial
//! counts, the native sample rate, MIDI limits).

/// The LA32's native internal sample rate. All envelope/ramp timing and
/// the wave generators operate at this rate; [`crate::resampler`] converts
/// to the caller's host rate.
pub const NATIVE_SAMPLE_RATE: u32 = 32_000;

/// Total partials available on MT-32/CM-32L hardware, shared across all
/// parts by the partial allocator.
pub const MAX_PARTIALS: usize = 32;

/// Number of parts: 8 melodic (MIDI channels, reassignable) plus 1 rhythm.
pub const NUM_PARTS: usize = crate::memory::NUM_PARTS;

/// Index of the fixed rhythm part within the part array.
pub const RHYTHM_PART_INDEX: usize = crate::memory::RHYTHM_PART_INDEX;

/// MIDI channel count, independent of part count (parts are reassigned to
/// channels, not fixed 1:1).
pub const NUM_MIDI_CHANNELS: usize = 16;

/// Maximum bytes held in a single System-Exclusive message's data arena.
pub const MAX_SYSEX_LEN: usize = 512;

/// Depth of the short-message ring buffer ([`crate::midi::MidiEventQueue`]).
pub const MIDI_QUEUE_CAPACITY: usize = 1024;

/// Stereo output: left/right.
pub const NUM_OUTPUT_CHANNELS: usize = 2;
