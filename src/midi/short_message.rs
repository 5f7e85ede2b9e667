//! A decoded 1–3 byte MIDI channel or system realtime message.

/// A short (non-Sysex) MIDI message: status byte plus up to two data bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortMessage {
    /// Status byte, including channel nibble for channel messages.
    pub status: u8,
    /// First data byte (note/controller/program number), if any.
    pub data1: u8,
    /// Second data byte (velocity/value), if any.
    pub data2: u8,
}

impl ShortMessage {
    /// Builds a message from its packed 32-bit form (status in the low
    /// byte, data1 next, data2 next — matching `Synth::play_msg`'s
    /// documented packed-u32 convention).
    pub fn from_packed(packed: u32) -> Self {
        ShortMessage {
            status: (packed & 0xff) as u8,
            data1: ((packed >> 8) & 0xff) as u8,
            data2: ((packed >> 16) & 0xff) as u8,
        }
    }

    /// Channel number, 0..=15, for channel messages.
    pub fn channel(&self) -> u8 {
        self.status & 0x0f
    }

    /// The message kind, masking off the channel nibble.
    pub fn kind(&self) -> u8 {
        self.status & 0xf0
    }

    /// `true` for realtime/system messages (status byte >= 0xF8) that
    /// carry no data bytes and bypass running status.
    pub fn is_realtime(status: u8) -> bool {
        status >= 0xf8
    }

    /// Number of data bytes a given status byte's message carries (0, 1 or 2).
    pub fn data_len(status: u8) -> usize {
        match status & 0xf0 {
            0xc0 | 0xd0 => 1, // Program Change, Channel Pressure
            0x80 | 0x90 | 0xa0 | 0xb0 | 0xe0 => 2,
            _ => match status {
                0xf1 | 0xf3 => 1,
                0xf2 => 2,
                _ => 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_packed_extracts_status_and_data() {
        let msg = ShortMessage::from_packed(0x64_3c_90);
        assert_eq!(msg.status, 0x90);
        assert_eq!(msg.data1, 0x3c);
        assert_eq!(msg.data2, 0x64);
        assert_eq!(msg.channel(), 0);
        assert_eq!(msg.kind(), 0x90);
    }

    #[test]
    fn data_len_matches_status_family() {
        assert_eq!(ShortMessage::data_len(0x90), 2);
        assert_eq!(ShortMessage::data_len(0xc0), 1);
        assert_eq!(ShortMessage::data_len(0xf8), 0);
    }
}
