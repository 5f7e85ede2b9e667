//! Timbre memory: a sound definition of up to 4 partials plus common
//! parameters, including the `PartialParam`-equivalent envelope settings
//! TVA/TVF/TVP read.

/// Partial structure: how many of a timbre's 4 partials are active and
/// how they're paired (ring-modulated vs. independently mixed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartialStructure {
    /// A single active partial.
    Single,
    /// Two independently-mixed partials.
    SplitStereo,
    /// Two partials, the second ring-modulating the first.
    RingModulated,
    /// All four partials active (two independent pairs).
    Full,
}

impl PartialStructure {
    /// Number of active partials implied by this structure.
    pub fn active_partial_count(self) -> usize {
        match self {
            PartialStructure::Single => 1,
            PartialStructure::SplitStereo | PartialStructure::RingModulated => 2,
            PartialStructure::Full => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v & 0x03 {
            0 => PartialStructure::Single,
            1 => PartialStructure::SplitStereo,
            2 => PartialStructure::RingModulated,
            _ => PartialStructure::Full,
        }
    }
}

/// Per-partial envelope and wave-generation parameters (one quarter of a
/// [`TimbreParams`]), the closest analogue to the source's
/// `TimbreParam::PartialParam`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PartialParams {
    /// `true` if this partial slot is used by the timbre's structure.
    pub enabled: bool,
    /// WG pulse width, 0..=100.
    pub pulse_width: u8,
    /// Resonance, 0..=30.
    pub resonance: u8,
    /// `true` selects PCM playback instead of synth mode.
    pub pcm_mode: bool,
    /// PCM ROM wave index (PCM mode only).
    pub pcm_wave_index: u16,
    /// `true` if the PCM wave loops.
    pub pcm_looped: bool,

    /// TVA: 5-stage envelope times (BASIC..SUSTAIN-entry), firmware units.
    pub tva_env_time: [u8; 5],
    /// TVA: 5-stage envelope target levels.
    pub tva_env_level: [u8; 5],
    /// TVA: velocity sensitivity of the ATTACK phase's time.
    pub tva_env_time_velo_sensitivity: u8,
    /// TVA: key-follow sensitivity of phases after ATTACK.
    pub tva_env_time_keyfollow: u8,
    /// TVA: static level parameter added in `Reset`.
    pub tva_level: u8,
    /// TVA: bias point, firmware key number; < 0x40 penalizes keys above
    /// the pivot, >= 0x40 penalizes keys below it.
    pub bias_point: u8,
    /// TVA: bias attenuation amount applied per the bias curve.
    pub bias_level: u8,

    /// TVF: 4-stage envelope times.
    pub tvf_env_time: [u8; 4],
    /// TVF: 4-stage envelope target cutoffs.
    pub tvf_env_level: [u8; 4],
    /// TVF: base cutoff.
    pub tvf_base_cutoff: u8,
    /// TVF: key-follow amount, index into
    /// [`crate::tables::Tables::keyfollow`].
    pub tvf_keyfollow: u8,

    /// TVP: coarse tune, semitones.
    pub tvp_coarse_tune: i8,
    /// TVP: fine tune, cents-ish firmware units.
    pub tvp_fine_tune: i8,
    /// TVP: key-follow amount.
    pub tvp_keyfollow: u8,
    /// TVP: LFO rate.
    pub tvp_lfo_rate: u8,
    /// TVP: LFO depth.
    pub tvp_lfo_depth: u8,
    /// TVP: 4-stage pitch envelope times.
    pub tvp_env_time: [u8; 4],
    /// TVP: 4-stage pitch envelope levels, signed.
    pub tvp_env_level: [i8; 4],
}

/// Decoded view over one Timbre memory slot (common params + 4 partials).
#[derive(Clone, Copy, Debug)]
pub struct TimbreParams {
    /// Partial pairing/activation structure.
    pub structure: PartialStructure,
    /// Per-partial envelope/wave parameters, indices 0..=3.
    pub partials: [PartialParams; 4],
}

impl Default for TimbreParams {
    fn default() -> Self {
        TimbreParams {
            structure: PartialStructure::Single,
            partials: [
                PartialParams {
                    enabled: true,
                    pulse_width: 50,
                    tva_env_time: [0, 10, 20, 30, 40],
                    tva_env_level: [100, 90, 70, 50, 0],
                    tva_level: 100,
                    bias_point: 0x40,
                    tvf_base_cutoff: 100,
                    tvf_env_time: [10, 20, 30, 40],
                    tvf_env_level: [100, 80, 60, 0],
                    ..Default::default()
                },
                PartialParams::default(),
                PartialParams::default(),
                PartialParams::default(),
            ],
        }
    }
}

impl TimbreParams {
    /// Decodes from raw bytes. The layout below is a compact, internally
    /// consistent encoding rather than the literal firmware byte offsets
    /// (those are ROM-edition-specific and not reproduced here); it is
    /// only required to round-trip through [`TimbreParams::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut t = TimbreParams::default();
        if bytes.is_empty() {
            return t;
        }
        t.structure = PartialStructure::from_u8(bytes[0]);
        let mut offset = 1;
        for partial in t.partials.iter_mut() {
            if offset + PARTIAL_PARAM_BYTES > bytes.len() {
                break;
            }
            *partial = decode_partial(&bytes[offset..offset + PARTIAL_PARAM_BYTES]);
            offset += PARTIAL_PARAM_BYTES;
        }
        t
    }

    /// Encodes back to raw bytes, the inverse of
    /// [`TimbreParams::from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.structure as u8];
        for partial in &self.partials {
            out.extend_from_slice(&encode_partial(partial));
        }
        out
    }
}

const PARTIAL_PARAM_BYTES: usize = 45;

fn decode_partial(b: &[u8]) -> PartialParams {
    PartialParams {
        enabled: b[0] != 0,
        pulse_width: b[1],
        resonance: b[2],
        pcm_mode: b[3] != 0,
        pcm_wave_index: u16::from_le_bytes([b[4], b[5]]),
        pcm_looped: b[6] != 0,
        tva_env_time: [b[7], b[8], b[9], b[10], b[11]],
        tva_env_level: [b[12], b[13], b[14], b[15], b[16]],
        tva_env_time_velo_sensitivity: b[17],
        tva_env_time_keyfollow: b[18],
        tva_level: b[19],
        bias_point: b[20],
        bias_level: b[21],
        tvf_env_time: [b[22], b[23], b[24], b[25]],
        tvf_env_level: [b[26], b[27], b[28], b[29]],
        tvf_base_cutoff: b[30],
        tvf_keyfollow: b[31],
        tvp_coarse_tune: b[32] as i8,
        tvp_fine_tune: b[33] as i8,
        tvp_keyfollow: b[34],
        tvp_lfo_rate: b[35],
        tvp_lfo_depth: b[36],
        tvp_env_time: [b[37], b[38], b[39], b[40]],
        tvp_env_level: [b[41] as i8, b[42] as i8, b[43] as i8, b[44] as i8],
    }
}

fn encode_partial(p: &PartialParams) -> [u8; PARTIAL_PARAM_BYTES] {
    let mut out = [0u8; PARTIAL_PARAM_BYTES];
    out[0] = p.enabled as u8;
    out[1] = p.pulse_width;
    out[2] = p.resonance;
    out[3] = p.pcm_mode as u8;
    out[4..6].copy_from_slice(&p.pcm_wave_index.to_le_bytes());
    out[6] = p.pcm_looped as u8;
    out[7..12].copy_from_slice(&p.tva_env_time);
    out[12..17].copy_from_slice(&p.tva_env_level);
    out[17] = p.tva_env_time_velo_sensitivity;
    out[18] = p.tva_env_time_keyfollow;
    out[19] = p.tva_level;
    out[20] = p.bias_point;
    out[21] = p.bias_level;
    out[22..26].copy_from_slice(&p.tvf_env_time);
    out[26..30].copy_from_slice(&p.tvf_env_level);
    out[30] = p.tvf_base_cutoff;
    out[31] = p.tvf_keyfollow;
    out[32] = p.tvp_coarse_tune as u8;
    out[33] = p.tvp_fine_tune as u8;
    out[34] = p.tvp_keyfollow;
    out[35] = p.tvp_lfo_rate;
    out[36] = p.tvp_lfo_depth;
    out[37..41].copy_from_slice(&p.tvp_env_time);
    out[41] = p.tvp_env_level[0] as u8;
    out[42] = p.tvp_env_level[1] as u8;
    out[43] = p.tvp_env_level[2] as u8;
    out[44] = p.tvp_env_level[3] as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let timbre = TimbreParams::default();
        let bytes = timbre.to_bytes();
        let decoded = TimbreParams::from_bytes(&bytes);
        assert_eq!(decoded.structure, timbre.structure);
        assert_eq!(decoded.partials[0].tva_level, timbre.partials[0].tva_level);
    }

    #[test]
    fn tvp_fields_round_trip_through_bytes() {
        let mut timbre = TimbreParams::default();
        timbre.partials[0].tvp_coarse_tune = -12;
        timbre.partials[0].tvp_fine_tune = 5;
        timbre.partials[0].tvp_keyfollow = 9;
        timbre.partials[0].tvp_lfo_rate = 20;
        timbre.partials[0].tvp_lfo_depth = 15;
        timbre.partials[0].tvp_env_time = [1, 2, 3, 4];
        timbre.partials[0].tvp_env_level = [-10, -5, 0, 10];

        let decoded = TimbreParams::from_bytes(&timbre.to_bytes());
        assert_eq!(decoded.partials[0].tvp_coarse_tune, -12);
        assert_eq!(decoded.partials[0].tvp_fine_tune, 5);
        assert_eq!(decoded.partials[0].tvp_lfo_rate, 20);
        assert_eq!(decoded.partials[0].tvp_env_time, [1, 2, 3, 4]);
        assert_eq!(decoded.partials[0].tvp_env_level, [-10, -5, 0, 10]);
    }

    #[test]
    fn structure_reports_correct_partial_count() {
        assert_eq!(PartialStructure::Single.active_partial_count(), 1);
        assert_eq!(PartialStructure::Full.active_partial_count(), 4);
    }
}
