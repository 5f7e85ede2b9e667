//! `ReportHandler`: the push-style callback surface the engine drives
//! instead of doing any I/O of its own (`spec.md` §6).

/// External collaborator notified of engine events that aren't naturally
/// return values: display changes, dropped messages, ROM loading, and
/// partial lifecycle transitions, for embedders that want telemetry or
/// a real LCD/LED widget.
///
/// Every method has a no-op default, mirroring the teacher's hardware
/// quirk trait methods: an embedder implements only the callbacks it
/// cares about.
pub trait ReportHandler {
    /// The LCD's visible text changed.
    fn on_lcd_change(&mut self, _text: &str) {}

    /// The MIDI MESSAGE LED turned on or off.
    fn on_midi_message_led(&mut self, _on: bool) {}

    /// An incoming MIDI event was dropped because the queue was full.
    fn on_midi_queue_overflow(&mut self) {}

    /// The Control ROM was identified and loaded successfully.
    fn on_control_rom_loaded(&mut self, _machine: crate::rom::MachineConfig) {}

    /// The PCM ROM was identified and loaded successfully.
    fn on_pcm_rom_loaded(&mut self) {}

    /// A partial's lifecycle state changed (started, stolen, or freed).
    fn on_partial_state_change(&mut self, _partial_index: usize, _active: bool) {}
}

/// The default, silent [`ReportHandler`]: every callback is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReportHandler;

impl ReportHandler for NullReportHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handler_accepts_every_callback_without_panicking() {
        let mut handler = NullReportHandler;
        handler.on_lcd_change("hello");
        handler.on_midi_message_led(true);
        handler.on_midi_queue_overflow();
        handler.on_control_rom_loaded(crate::rom::MachineConfig::Mt32V107);
        handler.on_pcm_rom_loaded();
        handler.on_partial_state_change(0, true);
    }
}
