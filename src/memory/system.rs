//! System region: master volume, reverb settings, part-to-channel
//! assignment.

/// Decoded view over the System memory region.
#[derive(Clone, Copy, Debug)]
pub struct SystemParams {
    /// Master volume, 0..=100.
    pub master_volume: u8,
    /// Master tune, signed offset in cents-ish firmware units.
    pub master_tune: i8,
    /// Reverb mode, 0..=3 (Room/Hall/Plate/Tap-Delay).
    pub reverb_mode: u8,
    /// Reverb time, 0..=7.
    pub reverb_time: u8,
    /// Reverb level, 0..=7.
    pub reverb_level: u8,
    /// `false` mutes the reverb send entirely.
    pub reverb_enabled: bool,
    /// MIDI channel assigned to each of the 9 parts (8 melodic + rhythm).
    pub channel_assign: [u8; 9],
}

impl Default for SystemParams {
    fn default() -> Self {
        SystemParams {
            master_volume: 100,
            master_tune: 0,
            reverb_mode: 0,
            reverb_time: 5,
            reverb_level: 3,
            reverb_enabled: true,
            channel_assign: [0, 1, 2, 3, 4, 5, 6, 7, 9],
        }
    }
}

impl SystemParams {
    /// Decodes from the region's raw bytes (big-endian-ish firmware
    /// layout: one byte per field, channel assignment trailing). Offset 1
    /// is `reverb_mode`, matching the address the reverb-mode DT1 sysex
    /// targets (`base_address::SYSTEM + 1`).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut params = SystemParams::default();
        if bytes.len() < 6 + 9 {
            return params;
        }
        params.master_volume = bytes[0];
        params.reverb_mode = bytes[1];
        params.master_tune = bytes[2] as i8;
        params.reverb_time = bytes[3];
        params.reverb_level = bytes[4];
        params.reverb_enabled = bytes[5] != 0;
        params.channel_assign.copy_from_slice(&bytes[6..6 + 9]);
        params
    }

    /// Encodes back to the region's raw byte layout.
    pub fn to_bytes(&self) -> [u8; 15] {
        let mut out = [0u8; 15];
        out[0] = self.master_volume;
        out[1] = self.reverb_mode;
        out[2] = self.master_tune as u8;
        out[3] = self.reverb_time;
        out[4] = self.reverb_level;
        out[5] = self.reverb_enabled as u8;
        out[6..15].copy_from_slice(&self.channel_assign);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let params = SystemParams {
            master_volume: 80,
            reverb_mode: 2,
            ..SystemParams::default()
        };
        let bytes = params.to_bytes();
        let decoded = SystemParams::from_bytes(&bytes);
        assert_eq!(decoded.master_volume, 80);
        assert_eq!(decoded.reverb_mode, 2);
    }
}
