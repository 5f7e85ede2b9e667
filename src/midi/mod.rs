//! Timestamped MIDI ingest: byte-stream parsing with running status and
//! Sysex reassembly, plus the ring-buffered event queue `Synth` drains
//! each render call (`spec.md` §4.7).

mod event_queue;
mod short_message;
mod stream_parser;

pub use event_queue::MidiEventQueue;
pub use short_message::ShortMessage;
pub use stream_parser::MidiStreamParser;

/// One queued MIDI event: a short message or a Sysex byte range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    /// A 1–3 byte channel/system message.
    Short(ShortMessage),
    /// A Sysex payload (the framing `F0`/`F7` bytes excluded), stored by
    /// byte range into the queue's separate Sysex arena.
    Sysex(Vec<u8>),
}
