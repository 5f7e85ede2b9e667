//! One voice of the polyphonic LA32 chip (`spec.md` §3, §4.2–§4.5).

use crate::envelope::{Tva, TvaResetContext, Tvf, TvfResetContext, Tvp, TvpResetContext};
use crate::la32::{LA32FloatWaveGenerator, LA32WaveGenerator, PartialTimbreParams, RendererType, WaveGeneratorInput};
use crate::memory::PartialParams;
use crate::rom::PcmRom;
use crate::tables::Tables;
use crate::voice::handle::Handle;
use crate::voice::poly::{Poly, PolyState};

#[derive(Clone, Debug)]
enum WaveGen {
    Bit(LA32WaveGenerator),
    Float(LA32FloatWaveGenerator),
}

impl Default for WaveGen {
    fn default() -> Self {
        WaveGen::Bit(LA32WaveGenerator::default())
    }
}

impl WaveGen {
    fn for_renderer(renderer: RendererType, params: PartialTimbreParams) -> Self {
        match renderer {
            RendererType::Bit => WaveGen::Bit(LA32WaveGenerator::new(params)),
            RendererType::Float => WaveGen::Float(LA32FloatWaveGenerator::new(params)),
        }
    }

    fn next_sample(&mut self, tables: &Tables, pcm: &PcmRom, input: WaveGeneratorInput) -> i16 {
        match self {
            WaveGen::Bit(gen) => gen.next_sample(tables, pcm, input),
            WaveGen::Float(gen) => {
                let sample = gen.next_sample(tables, pcm, input);
                (sample * i16::MAX as f32) as i16
            }
        }
    }
}

/// Everything [`Partial::start`] needs to bind a freshly allocated
/// partial slot to a sounding note.
pub struct PartialResetContext {
    /// Note key, 0..=127.
    pub key: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Owning part's current volume, 0..=100.
    pub part_volume: u8,
    /// Owning part's current expression (CC11), 0..=100.
    pub expression: u8,
    /// System master volume, 0..=100.
    pub master_volume: u8,
    /// Rhythm key level, only present for the rhythm part.
    pub rhythm_level: Option<u8>,
    /// Static pitch-bend offset, 256-units-per-semitone domain.
    pub pitch_bend_offset: i32,
    /// `true` selects Nice-Amp-Ramp quality behavior in TVA.
    pub nice_amp_ramp: bool,
    /// This partial's decoded timbre parameters.
    pub params: PartialParams,
    /// Which of the timbre's 4 partial slots this represents.
    pub structure_position: u8,
    /// Index (within the owning `PartialManager`) of this partial's pair
    /// partner, if the timbre structure pairs two partials.
    pub pair_index: Option<u8>,
    /// `true` if this partial's pair partner ring-modulates it.
    pub ring_modulated: bool,
    /// Pan position, 0..=14.
    pub pan: u8,
    /// Renderer variant to (re)build the wave generator with.
    pub renderer: RendererType,
    /// Seed for this partial's TVP MCU-jitter PRNG.
    pub tvp_seed: u64,
}

/// One LA32 voice: up to four of these back a sounding `Poly`.
#[derive(Clone, Debug, Default)]
pub struct Partial {
    active: bool,
    poly_state: PolyState,
    owner: Option<Handle<Poly>>,
    part_index: u8,
    activation_order: u64,
    structure_position: u8,
    pair_index: Option<u8>,
    pan: u8,
    ring_modulated: bool,
    pitch_bend_offset: i32,
    tva: Tva,
    tvf: Tvf,
    tvp: Tvp,
    wave: WaveGen,
    key: u8,
    tva_level: u8,
    bias_point: u8,
    bias_level: u8,
    tvf_resonance: u8,
    rhythm_level: Option<u8>,
    velocity: u8,
}

impl Partial {
    /// Creates a free (inactive) partial slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds this slot to a new note, resetting all three envelopes and
    /// (re)building the wave generator for the configured renderer.
    pub fn start(
        &mut self,
        tables: &Tables,
        owner: Handle<Poly>,
        part_index: u8,
        activation_order: u64,
        ctx: PartialResetContext,
    ) {
        let p = &ctx.params;

        let wg_params = PartialTimbreParams {
            pulse_width: p.pulse_width,
            resonance: p.resonance,
            pcm_mode: p.pcm_mode,
            pcm_wave_index: p.pcm_wave_index,
            pcm_looped: p.pcm_looped,
        };
        self.wave = WaveGen::for_renderer(ctx.renderer, wg_params);

        self.tva.reset(
            tables,
            &TvaResetContext {
                key: ctx.key,
                velocity: ctx.velocity,
                part_volume: ctx.part_volume,
                expression: ctx.expression,
                master_volume: ctx.master_volume,
                rhythm_level: ctx.rhythm_level,
                tva_level: p.tva_level,
                bias_point: p.bias_point,
                bias_level: p.bias_level,
                tvf_resonance: p.resonance,
                env_time: p.tva_env_time,
                env_level: p.tva_env_level,
                env_time_velo_sensitivity: p.tva_env_time_velo_sensitivity,
                env_time_keyfollow: p.tva_env_time_keyfollow,
                nice_amp_ramp: ctx.nice_amp_ramp,
            },
        );

        self.tvf.reset(
            tables,
            &TvfResetContext {
                key: ctx.key,
                base_cutoff: p.tvf_base_cutoff,
                keyfollow: p.tvf_keyfollow,
                bias_point: p.bias_point,
                bias_level: p.bias_level,
                env_time: p.tvf_env_time,
                env_level: p.tvf_env_level,
            },
        );

        self.tvp = Tvp::with_seed(ctx.tvp_seed);
        self.tvp.reset(
            tables,
            &TvpResetContext {
                key: ctx.key,
                coarse_tune: p.tvp_coarse_tune,
                fine_tune: p.tvp_fine_tune,
                keyfollow: p.tvp_keyfollow,
                lfo_rate: p.tvp_lfo_rate,
                lfo_depth: p.tvp_lfo_depth,
                env_time: p.tvp_env_time,
                env_level: p.tvp_env_level,
            },
        );

        self.active = true;
        self.poly_state = PolyState::Playing;
        self.owner = Some(owner);
        self.part_index = part_index;
        self.activation_order = activation_order;
        self.structure_position = ctx.structure_position;
        self.pair_index = ctx.pair_index;
        self.pan = ctx.pan;
        self.ring_modulated = ctx.ring_modulated;
        self.pitch_bend_offset = ctx.pitch_bend_offset;
        self.key = ctx.key;
        self.tva_level = p.tva_level;
        self.bias_point = p.bias_point;
        self.bias_level = p.bias_level;
        self.tvf_resonance = p.resonance;
        self.rhythm_level = ctx.rhythm_level;
        self.velocity = ctx.velocity;
    }

    /// Recomputes TVA's base amplitude from a changed part volume,
    /// expression or system master volume and, if TVA is currently in
    /// `Sustain`, re-arms the ramp toward the new level without an
    /// audible jump (`spec.md` §4.3 `RecalcSustain`).
    pub fn recalc_tva_sustain(&mut self, tables: &Tables, part_volume: u8, expression: u8, master_volume: u8) {
        let mut amp = self.tva_level as i32;
        amp -= (100 - master_volume as i32).max(0);
        amp -= (100 - part_volume as i32).max(0);
        amp -= (100 - expression as i32).max(0);
        if let Some(rhythm_level) = self.rhythm_level {
            amp -= (100 - rhythm_level as i32).max(0);
        }
        amp -= crate::envelope::tva::bias_subtraction(tables, self.bias_point, self.bias_level, self.key) as i32;
        amp -= crate::envelope::tva::velocity_subtraction(self.velocity) as i32;
        amp -= self.tvf_resonance as i32 / 2;
        let new_base_amp = amp.clamp(0, 100) as u8;
        self.tva.recalc_sustain(tables, new_base_amp);
    }

    /// `true` if this slot currently holds a note (alive or decaying).
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// `true` once TVA has fully decayed; the slot is free to reclaim.
    pub fn is_dead(&self) -> bool {
        !self.active || self.tva.is_dead()
    }

    /// The poly this partial belongs to, if active.
    pub fn owner(&self) -> Option<Handle<Poly>> {
        self.owner
    }

    /// Index of the part this partial's note was played on.
    pub fn part_index(&self) -> u8 {
        self.part_index
    }

    /// Insertion order among all partials ever started, for the
    /// allocator's oldest-first stealing priority.
    pub fn activation_order(&self) -> u64 {
        self.activation_order
    }

    /// The owning poly's cached lifecycle state, mirrored here so the
    /// allocator can rank stealing candidates without reaching through
    /// `owner` into the part arena.
    pub fn poly_state(&self) -> PolyState {
        self.poly_state
    }

    /// Updates the cached poly state; called by `Part`/`Synth` whenever
    /// the owning `Poly` transitions.
    pub fn set_poly_state(&mut self, tables: &Tables, state: PolyState) {
        self.poly_state = state;
        if state == PolyState::Released {
            self.tva.notify_released();
        }
        let _ = tables;
    }

    /// Pan position, 0..=14.
    pub fn pan(&self) -> u8 {
        self.pan
    }

    /// Index of this partial's pair partner, if any.
    pub fn pair_index(&self) -> Option<u8> {
        self.pair_index
    }

    /// `true` if the pair partner ring-modulates this partial's output.
    pub fn ring_modulated(&self) -> bool {
        self.ring_modulated
    }

    /// TVA phase, exposed for `Synth::partial_states`.
    pub fn tva_phase(&self) -> crate::envelope::TvaPhase {
        self.tva.phase()
    }

    /// Fast-decays this partial to silence, used when it is stolen by the
    /// allocator for a higher-priority note.
    pub fn start_abort(&mut self, tables: &Tables) {
        self.tva.start_abort(tables);
    }

    /// Marks the slot free. Does not reset envelope state; the next
    /// `start` call does that.
    pub fn free(&mut self) {
        self.active = false;
        self.poly_state = PolyState::Inactive;
        self.owner = None;
    }

    /// Produces the next signed 16-bit sample, advancing all three
    /// envelopes by one step.
    pub fn tick(&mut self, tables: &Tables, pcm: &PcmRom) -> i16 {
        let amp = self.tva.tick(tables);
        let cutoff = self.tvf.tick(tables);
        let pitch = (self.tvp.tick(tables) + self.pitch_bend_offset).clamp(0, u16::MAX as i32) as u16;
        self.wave.next_sample(tables, pcm, WaveGeneratorInput { amp, cutoff, pitch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::PcmRom;

    fn ctx() -> PartialResetContext {
        PartialResetContext {
            key: 60,
            velocity: 100,
            part_volume: 100,
            expression: 100,
            master_volume: 100,
            rhythm_level: None,
            pitch_bend_offset: 0,
            nice_amp_ramp: false,
            params: PartialParams {
                enabled: true,
                pulse_width: 50,
                tva_env_time: [0, 5, 5, 5, 5],
                tva_env_level: [100, 80, 60, 40, 0],
                tva_level: 100,
                tvf_base_cutoff: 100,
                tvf_env_time: [5, 5, 5, 5],
                tvf_env_level: [100, 80, 60, 0],
                ..Default::default()
            },
            structure_position: 0,
            pair_index: None,
            ring_modulated: false,
            pan: 7,
            renderer: RendererType::Bit,
            tvp_seed: 1,
        }
    }

    #[test]
    fn start_activates_and_ticks_to_dead() {
        let tables = Tables::build();
        let pcm = PcmRom::empty();
        let mut partial = Partial::new();
        assert!(!partial.is_active());

        partial.start(&tables, Handle::new(0, 0), 0, 0, ctx());
        assert!(partial.is_active());
        partial.set_poly_state(&tables, PolyState::Released);

        let mut ticks = 0;
        while !partial.is_dead() && ticks < 2_000_000 {
            partial.tick(&tables, &pcm);
            ticks += 1;
        }
        assert!(partial.is_dead());
    }
}
