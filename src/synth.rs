//! The top-level synthesis engine coordinator (`spec.md` §3, §4.12, §7).
//!
//! `Synth` owns every other component: the 9 [`Part`]s, the flat
//! [`PartialManager`] pool they share, Sysex-addressable parameter
//! memory, the MIDI ingest pipeline, and the render chain (reverb,
//! analog stage, resampler). It never performs I/O and never blocks;
//! callers push MIDI in and pull rendered audio out.

use crate::constants::NUM_OUTPUT_CHANNELS;
use crate::display::{Display, DisplayCompatibility, DisplayState};
use crate::envelope::TvaPhase;
use crate::analog::{Analog, AnalogQuality};
use crate::la32::RendererType;
use crate::memory::{
    self, base_address, MemoryRegion, PartialStructure, PatchParams, RhythmParams, SystemParams,
    TimbreParams, NUM_PARTS, NUM_PATCHES, NUM_TIMBRES, RHYTHM_PART_INDEX,
};
use crate::midi::{MidiEvent, MidiEventQueue, MidiStreamParser, ShortMessage};
use crate::report::{NullReportHandler, ReportHandler};
use crate::resampler::{ResamplerQuality, SampleRateConverter};
use crate::reverb::{BReverbModel, ReverbMode};
use crate::rom::{MachineConfig, PcmRom, RomInfo};
use crate::tables::{Tables, PAN_TABLE_SIZE};
use crate::voice::{Handle, Part, Partial, PartialManager, PartialResetContext, Poly};
use crate::{MT32Error, Result};

/// A coarse lifecycle bucket for a sounding (or decaying) partial,
/// derived from its TVA phase, for embedders that want a cheap overview
/// without the full [`crate::TvaPhase`] detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartialState {
    /// No note bound to this slot.
    Inactive,
    /// Basic/Attack: amplitude still rising toward its peak.
    Attack,
    /// P2 through Sustain: holding or decaying toward the sustain level.
    Sustain,
    /// Releasing toward silence after Note-Off or stealing.
    Release,
}

/// DAC emulation mode, approximating the bit depth and rounding quirks
/// of the different hardware generations' output converters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DacInputMode {
    /// No quantization; full float precision passed to the resampler.
    #[default]
    Nice,
    /// Same as `Nice`; kept distinct for embedders that distinguish "no
    /// emulated DAC" from "best available" in their own UI.
    Pure,
    /// Coarser quantization, approximating first-generation hardware.
    Generation1,
    /// Finer quantization than `Generation1`, approximating the revised
    /// second-generation DAC.
    Generation2,
}

/// Controls how a caller-supplied `timestamp: None` is resolved to an
/// effective queue timestamp for ingest ordering diagnostics. The engine
/// itself has no wall clock; events still apply strictly in arrival
/// (FIFO) order regardless of this setting; `MidiDelayMode` only changes
/// the value later visible to whatever the embedder does with it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MidiDelayMode {
    /// Untimestamped events are stamped with the current sample counter.
    #[default]
    Immediate,
    /// Untimestamped short messages are stamped one sample later than
    /// `Immediate`; Sysex is stamped immediately.
    DelayShortMessagesOnly,
    /// Untimestamped short messages and Sysex are both delayed one sample.
    DelayAll,
}

/// Configuration passed to [`Synth::open`], fixing the quality/behavior
/// knobs for the lifetime of that open session.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SynthOptions {
    /// Wave generator variant (bit-accurate or float).
    pub renderer: RendererType,
    /// Analog output stage fidelity.
    pub analog_quality: AnalogQuality,
    /// Sample rate converter fidelity.
    pub resampler_quality: ResamplerQuality,
    /// Host output sample rate; pass-through if equal to the engine's
    /// native 32 kHz rate.
    pub target_sample_rate: u32,
    /// Forces the Boss reverb's CM-32L (`Some(true)`) or MT-32
    /// (`Some(false)`) coefficient table; `None` auto-detects from the
    /// identified ROM machine at `open()` time.
    pub reverb_compatibility: Option<bool>,
    /// Quality switch: smooths TVA sustain-recalculation ramp direction
    /// changes instead of snapping abruptly.
    pub nice_amp_ramp: bool,
    /// Quality switch: equal-power pan law instead of the coarser linear
    /// law some firmware revisions used.
    pub nice_panning: bool,
    /// Quality switch: mixes partials at full float precision before a
    /// single final clip, instead of clipping each partial's
    /// contribution individually.
    pub nice_partial_mixing: bool,
    /// DAC emulation mode.
    pub dac_input_mode: DacInputMode,
    /// MIDI ingest timestamp-defaulting behavior.
    pub midi_delay_mode: MidiDelayMode,
    /// Seed for every partial's TVP MCU-timer jitter PRNG (XORed with
    /// that partial's activation order so simultaneous notes don't all
    /// jitter identically).
    pub tvp_jitter_seed: u64,
    /// Linear output gain applied to the final mixed signal.
    pub output_gain: f32,
    /// Linear gain applied to the reverb's wet signal specifically.
    pub reverb_output_gain: f32,
    /// Swaps left/right output channels.
    pub reversed_stereo: bool,
}

impl Default for SynthOptions {
    fn default() -> Self {
        SynthOptions {
            renderer: RendererType::Bit,
            analog_quality: AnalogQuality::Accurate,
            resampler_quality: ResamplerQuality::Good,
            target_sample_rate: crate::constants::NATIVE_SAMPLE_RATE,
            reverb_compatibility: None,
            nice_amp_ramp: false,
            nice_panning: true,
            nice_partial_mixing: true,
            dac_input_mode: DacInputMode::Nice,
            midi_delay_mode: MidiDelayMode::Immediate,
            tvp_jitter_seed: 0,
            output_gain: 1.0,
            reverb_output_gain: 1.0,
            reversed_stereo: false,
        }
    }
}

bitflags::bitflags! {
    /// Which of the 9 parts currently have at least one sounding or
    /// decaying note, as returned by [`Synth::part_states`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PartStates: u16 {
        /// Melodic part 1.
        const PART_1 = 1 << 0;
        /// Melodic part 2.
        const PART_2 = 1 << 1;
        /// Melodic part 3.
        const PART_3 = 1 << 2;
        /// Melodic part 4.
        const PART_4 = 1 << 3;
        /// Melodic part 5.
        const PART_5 = 1 << 4;
        /// Melodic part 6.
        const PART_6 = 1 << 5;
        /// Melodic part 7.
        const PART_7 = 1 << 6;
        /// Melodic part 8.
        const PART_8 = 1 << 7;
        /// Rhythm part.
        const RHYTHM = 1 << 8;
    }
}

/// Record length assumed for a Patch Temporary/Patches slot; matches
/// [`crate::memory::PatchParams::to_bytes`]'s fixed 5-byte layout.
const PATCH_TEMP_STRIDE: u32 = 5;

fn no_dirty(_region: &mut MemoryRegion) {}

fn reverb_mode_from_u8(value: u8) -> ReverbMode {
    match value {
        0 => ReverbMode::Room,
        1 => ReverbMode::Hall,
        2 => ReverbMode::Plate,
        _ => ReverbMode::TapDelay,
    }
}

fn verify_checksum(payload: &[u8]) -> bool {
    let sum: u32 = payload.iter().map(|&b| b as u32).sum();
    sum % 128 == 0
}

/// Locates which of `count` consecutive `stride`-byte slots starting at
/// `base` entirely contains `[address, address+length)`, rejecting
/// writes/reads that straddle a slot boundary.
fn part_slot(base: u32, stride: u32, count: usize, address: u32, length: usize) -> Option<usize> {
    if address < base {
        return None;
    }
    let rel = address - base;
    let slot = (rel / stride) as usize;
    if slot >= count {
        return None;
    }
    if (rel % stride) as usize + length > stride as usize {
        return None;
    }
    Some(slot)
}

fn dispatch_rq1_message(rest: &[u8]) -> Result<()> {
    if rest.len() != 7 {
        return Err(MT32Error::InvalidMidiFile("rq1 message malformed".to_string()));
    }
    if !verify_checksum(rest) {
        return Err(MT32Error::SysexChecksumInvalid);
    }
    // No in-engine reply path is modeled: embedders read results back via
    // `Synth::read_memory` directly instead of a MIDI OUT loopback.
    Ok(())
}

/// Groups every Sysex-addressable, persistently stored parameter region.
/// Patch Temporary and Timbre Temporary are deliberately *not* stored
/// here: their contents mirror live [`Part`] fields (timbre/pan/volume),
/// so they're synthesized on read and applied directly to `Part` on
/// write, instead of risking the two copies drifting out of sync.
struct MemoryBank {
    system: MemoryRegion,
    rhythm_temp: MemoryRegion,
    patches: MemoryRegion,
    timbres: MemoryRegion,
    display: MemoryRegion,
}

impl MemoryBank {
    fn build() -> Self {
        let mut bank = MemoryBank {
            system: MemoryRegion::new(base_address::SYSTEM, SystemParams::default().to_bytes().len()),
            rhythm_temp: MemoryRegion::new(base_address::RHYTHM_TEMP, RhythmParams::default().to_bytes().len()),
            patches: MemoryRegion::new(base_address::PATCHES, NUM_PATCHES * PatchParams::default().to_bytes().len()),
            timbres: MemoryRegion::new(base_address::TIMBRES, NUM_TIMBRES * TimbreParams::default().to_bytes().len()),
            display: MemoryRegion::new(base_address::DISPLAY, crate::display::LCD_WIDTH),
        };
        bank.reset_to_defaults();
        bank
    }

    fn reset_to_defaults(&mut self) {
        self.system.write(self.system.base(), &SystemParams::default().to_bytes());
        self.rhythm_temp.write(self.rhythm_temp.base(), &RhythmParams::default().to_bytes());

        let patch_bytes = PatchParams::default().to_bytes();
        for i in 0..NUM_PATCHES {
            let addr = self.patches.base() + (i * patch_bytes.len()) as u32;
            self.patches.write(addr, &patch_bytes);
        }

        let timbre_bytes = TimbreParams::default().to_bytes();
        for i in 0..NUM_TIMBRES {
            let addr = self.timbres.base() + (i * timbre_bytes.len()) as u32;
            self.timbres.write(addr, &timbre_bytes);
        }

        let blank = vec![0u8; self.display.len()];
        self.display.write(self.display.base(), &blank);
    }

    fn regions(&self) -> [&MemoryRegion; 5] {
        [&self.system, &self.rhythm_temp, &self.patches, &self.timbres, &self.display]
    }
}

/// The synthesis engine. Construct with [`Synth::new`], bind ROM images
/// with [`Synth::open`], then drive it with `play_msg`/`play_sysex` and
/// `render`.
pub struct Synth {
    is_open: bool,
    options: SynthOptions,
    tables: Tables,
    rom_info: Option<RomInfo>,
    pcm: PcmRom,
    parts: [Part; NUM_PARTS],
    partial_manager: PartialManager,
    memory: MemoryBank,
    midi_queue: MidiEventQueue,
    stream_parser: MidiStreamParser,
    reverb: BReverbModel,
    reverb_override: Option<bool>,
    analog: Analog,
    resampler: SampleRateConverter,
    display: Display,
    report_handler: parking_lot::Mutex<Box<dyn ReportHandler + Send>>,
    sample_counter: u64,
    activation_counter: u64,
    output_gain: f32,
    reversed_stereo: bool,
}

impl Synth {
    /// Builds a closed synth with no ROM bound. Call [`Synth::open`]
    /// before playing or rendering anything.
    pub fn new() -> Self {
        Synth {
            is_open: false,
            options: SynthOptions::default(),
            tables: Tables::build(),
            rom_info: None,
            pcm: PcmRom::empty(),
            parts: std::array::from_fn(|i| Part::new(i as u8)),
            partial_manager: PartialManager::new(0),
            memory: MemoryBank::build(),
            midi_queue: MidiEventQueue::new(),
            stream_parser: MidiStreamParser::new(),
            reverb: BReverbModel::new(MachineConfig::Mt32V107),
            reverb_override: None,
            analog: Analog::new(AnalogQuality::Accurate),
            resampler: SampleRateConverter::new(crate::constants::NATIVE_SAMPLE_RATE, ResamplerQuality::Good),
            display: Display::new(DisplayCompatibility::OldMt32),
            report_handler: parking_lot::Mutex::new(Box::new(NullReportHandler)),
            sample_counter: 0,
            activation_counter: 0,
            output_gain: 1.0,
            reversed_stereo: false,
        }
    }

    fn report(&self) -> parking_lot::MutexGuard<'_, Box<dyn ReportHandler + Send>> {
        self.report_handler.lock()
    }

    /// Installs a new report handler, replacing whatever was set before
    /// (the default is [`NullReportHandler`]).
    pub fn set_report_handler<H: ReportHandler + Send + 'static>(&mut self, handler: H) {
        *self.report_handler.lock() = Box::new(handler);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open {
            Ok(())
        } else {
            Err(MT32Error::NotOpen)
        }
    }

    /// Identifies the ROM pair, rebuilds every component fresh, and
    /// moves the synth into the open state. Fails without changing any
    /// existing state if the synth is already open or the ROMs aren't
    /// recognized.
    pub fn open(&mut self, control_rom: &[u8], pcm_rom: &[u8], options: SynthOptions) -> Result<()> {
        if self.is_open {
            return Err(MT32Error::AlreadyOpen);
        }
        let (rom_info, pcm) = RomInfo::identify(control_rom, pcm_rom)?;

        self.tables = Tables::build();
        self.rom_info = Some(rom_info);
        self.pcm = pcm;
        self.partial_manager = PartialManager::new(rom_info.machine.partial_count());
        self.parts = std::array::from_fn(|i| Part::new(i as u8));
        self.memory = MemoryBank::build();
        self.midi_queue.clear();
        self.stream_parser.reset();
        self.activation_counter = 0;
        self.sample_counter = 0;
        self.reverb_override = None;

        let reverb_is_cm32l = options.reverb_compatibility.unwrap_or_else(|| rom_info.machine.is_cm32l());
        let reverb_machine = if reverb_is_cm32l { MachineConfig::Cm32LV100 } else { MachineConfig::Mt32V107 };
        self.reverb = BReverbModel::new(reverb_machine);
        self.reverb.set_wet_gain(options.reverb_output_gain);
        self.analog = Analog::new(options.analog_quality);
        self.resampler = SampleRateConverter::new(options.target_sample_rate, options.resampler_quality);
        self.display = Display::new(self.display.compatibility());
        self.output_gain = options.output_gain;
        self.reversed_stereo = options.reversed_stereo;
        self.options = options;
        self.is_open = true;

        self.apply_system_params();

        log::debug!("synth opened with machine {:?}, {} partials", rom_info.machine, self.partial_manager.len());
        self.report().on_control_rom_loaded(rom_info.machine);
        self.report().on_pcm_rom_loaded();
        Ok(())
    }

    /// Silences every voice and returns the synth to the closed state.
    /// A no-op if already closed.
    pub fn close(&mut self) {
        if !self.is_open {
            return;
        }
        self.partial_manager.abort_all(&self.tables);
        self.midi_queue.clear();
        self.stream_parser.reset();
        self.resampler.reset();
        self.is_open = false;
    }

    /// `true` while the synth holds an identified ROM pair and can
    /// accept MIDI/Sysex and render audio.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    // ---- MIDI ingest -----------------------------------------------

    fn effective_timestamp(&self, requested: Option<u32>, is_sysex: bool) -> u32 {
        if let Some(ts) = requested {
            return ts;
        }
        let now = self.sample_counter as u32;
        match self.options.midi_delay_mode {
            MidiDelayMode::Immediate => now,
            MidiDelayMode::DelayShortMessagesOnly => {
                if is_sysex {
                    now
                } else {
                    now.wrapping_add(1)
                }
            }
            MidiDelayMode::DelayAll => now.wrapping_add(1),
        }
    }

    /// Queues a packed short message (status in the low byte, data1
    /// next, data2 next) for processing on the next `render` call.
    pub fn play_msg(&mut self, packed: u32, timestamp: Option<u32>) -> Result<()> {
        self.ensure_open()?;
        let ts = self.effective_timestamp(timestamp, false);
        let message = ShortMessage::from_packed(packed);
        self.midi_queue.push_short(ts, message).inspect_err(|_| {
            log::warn!("midi event queue full, dropping message");
            self.report().on_midi_queue_overflow();
        })
    }

    /// Applies a packed short message immediately, bypassing the queue.
    pub fn play_msg_immediate(&mut self, packed: u32) -> Result<()> {
        self.ensure_open()?;
        self.apply_short_message(ShortMessage::from_packed(packed));
        Ok(())
    }

    /// Queues a Sysex payload (framing `F0`/`F7` bytes excluded) for
    /// processing on the next `render` call.
    pub fn play_sysex(&mut self, payload: &[u8], timestamp: Option<u32>) -> Result<()> {
        self.ensure_open()?;
        let ts = self.effective_timestamp(timestamp, true);
        self.midi_queue.push_sysex(ts, payload).inspect_err(|_| {
            log::warn!("midi event queue full, dropping message");
            self.report().on_midi_queue_overflow();
        })
    }

    /// Applies a Sysex payload immediately, bypassing the queue.
    pub fn play_sysex_immediate(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.dispatch_sysex(payload)
    }

    /// Feeds raw MIDI bytes through an internal stream parser
    /// (running-status aware, Sysex-reassembling) and queues the
    /// decoded events, a convenience wrapper around
    /// [`crate::MidiStreamParser`] for callers reading a byte stream
    /// directly instead of already-decoded messages.
    pub fn feed_midi_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut events = Vec::new();
        self.stream_parser.feed(bytes, |event| events.push(event));
        for event in events {
            match event {
                MidiEvent::Short(message) => {
                    let ts = self.effective_timestamp(None, false);
                    self.midi_queue.push_short(ts, message).inspect_err(|_| {
                        log::warn!("midi event queue full, dropping message");
                        self.report().on_midi_queue_overflow();
                    })?;
                }
                MidiEvent::Sysex(payload) => {
                    let ts = self.effective_timestamp(None, true);
                    self.midi_queue.push_sysex(ts, &payload).inspect_err(|_| {
                        log::warn!("midi event queue full, dropping message");
                        self.report().on_midi_queue_overflow();
                    })?;
                }
            }
        }
        Ok(())
    }

    fn apply_short_message(&mut self, message: ShortMessage) {
        self.display.notify_midi_activity();
        self.report().on_midi_message_led(true);

        let Some(part_index) = self.part_index_for_channel(message.channel()) else {
            return;
        };
        match message.kind() {
            0x80 => self.note_off(part_index, message.data1),
            0x90 => {
                if message.data2 == 0 {
                    self.note_off(part_index, message.data1);
                } else {
                    self.note_on(part_index, message.data1, message.data2);
                }
            }
            0xb0 => self.control_change(part_index, message.data1, message.data2),
            0xc0 => self.program_change(part_index, message.data1),
            0xe0 => {
                let value = (((message.data2 as i16) << 7) | message.data1 as i16) - 8192;
                self.parts[part_index].set_pitch_bend(value);
            }
            _ => {}
        }
    }

    fn part_index_for_channel(&self, channel: u8) -> Option<usize> {
        let sys = SystemParams::from_bytes(self.memory.system.as_slice());
        sys.channel_assign.iter().position(|&c| c == channel)
    }

    fn control_change(&mut self, part_index: usize, controller: u8, value: u8) {
        match controller {
            1 => self.parts[part_index].set_modulation(value),
            7 => {
                self.parts[part_index].set_volume(((value as u32) * 100 / 127) as u8);
                self.recalc_part_sustain(part_index);
            }
            10 => self.parts[part_index].set_pan(((value as u32) * 14 / 127) as u8),
            11 => {
                self.parts[part_index].set_expression(value);
                self.recalc_part_sustain(part_index);
            }
            64 => {
                let released = self.parts[part_index].set_hold_pedal(value >= 64);
                self.apply_poly_transitions(part_index, released);
            }
            120 => {
                let changed = self.parts[part_index].all_sounds_off();
                self.abort_poly_partials(part_index, &changed);
                self.apply_poly_transitions(part_index, changed);
            }
            123 => {
                let changed = self.parts[part_index].all_notes_off();
                self.apply_poly_transitions(part_index, changed);
            }
            _ => {}
        }
    }

    fn resolve_patch(&self, part_index: usize) -> PatchParams {
        let record_len = PatchParams::default().to_bytes().len();
        let program = self.parts[part_index].program() as usize;
        let addr = self.memory.patches.base() + (program * record_len) as u32;
        let (bytes, _) = self.memory.patches.read(addr, record_len);
        PatchParams::from_bytes(&bytes)
    }

    fn resolve_timbre_by_index(&self, timbre_index: u8) -> TimbreParams {
        let record_len = TimbreParams::default().to_bytes().len();
        let addr = self.memory.timbres.base() + (timbre_index as usize * record_len) as u32;
        let (bytes, _) = self.memory.timbres.read(addr, record_len);
        TimbreParams::from_bytes(&bytes)
    }

    fn program_change(&mut self, part_index: usize, program: u8) {
        self.parts[part_index].set_program(program);
        let patch = self.resolve_patch(part_index);
        self.parts[part_index].set_timbre_index(patch.timbre_index);
        self.parts[part_index].set_pan(patch.pan);
        self.refresh_part_display(part_index);
    }

    fn refresh_part_display(&mut self, part_index: usize) {
        let text = self.patch_name(part_index);
        self.display.set_part_name_text(&text);
        self.report().on_lcd_change(&self.display.state().text);
    }

    fn note_on(&mut self, part_index: usize, key: u8, velocity: u8) {
        self.display.notify_note_on();

        let (rhythm_level, timbre, pan_override) = if part_index == RHYTHM_PART_INDEX {
            let rhythm = RhythmParams::from_bytes(self.memory.rhythm_temp.as_slice());
            let Some(mapping) = rhythm.lookup(key).copied() else {
                return;
            };
            (Some(mapping.level), self.resolve_timbre_by_index(mapping.timbre_index), Some(mapping.pan))
        } else {
            (None, self.resolve_timbre(part_index), None)
        };

        let count = timbre.structure.active_partial_count().max(1);
        let (reserved, stolen_owners) = self.partial_manager.allocate(&self.tables, part_index as u8, count);
        for owner in stolen_owners {
            self.force_deactivate_poly(owner);
        }

        let sys = SystemParams::from_bytes(self.memory.system.as_slice());
        let part_volume = self.parts[part_index].effective_volume();
        let expression = ((self.parts[part_index].expression() as u32) * 100 / 127) as u8;
        let pan = pan_override.unwrap_or(self.parts[part_index].pan());

        let mut pitch_offset = (self.parts[part_index].pitch_bend() as i32) * 512 / 8192;
        if part_index != RHYTHM_PART_INDEX {
            let patch = self.resolve_patch(part_index);
            pitch_offset += patch.key_shift as i32 * 256 + patch.fine_tune as i32;
        }

        let activation_order = self.activation_counter;
        self.activation_counter = self.activation_counter.wrapping_add(1);

        let mut partials: [Option<Handle<Partial>>; 4] = [None; 4];
        for (slot, &(handle, _)) in reserved.iter().enumerate().take(4) {
            partials[slot] = Some(handle);
        }
        let poly_handle = self.parts[part_index].note_on(key, velocity, activation_order, partials);

        for (slot, &(handle, stolen)) in reserved.iter().enumerate() {
            let params = timbre.partials[slot.min(3)];
            if !params.enabled {
                continue;
            }
            let (pair_index, ring_modulated) = pair_for(&timbre.structure, &reserved, slot);
            let ctx = PartialResetContext {
                key,
                velocity,
                part_volume,
                expression,
                master_volume: sys.master_volume,
                rhythm_level,
                pitch_bend_offset: pitch_offset,
                nice_amp_ramp: self.options.nice_amp_ramp,
                params,
                structure_position: slot as u8,
                pair_index,
                ring_modulated,
                pan,
                renderer: self.options.renderer,
                tvp_seed: self.options.tvp_jitter_seed ^ activation_order,
            };
            if let Some(partial) = self.partial_manager.partial_mut(handle.index() as usize) {
                partial.start(&self.tables, poly_handle, part_index as u8, activation_order, ctx);
            }
            self.report().on_partial_state_change(handle.index() as usize, true);
            let _ = stolen;
        }
    }

    fn resolve_timbre(&self, part_index: usize) -> TimbreParams {
        self.resolve_timbre_by_index(self.parts[part_index].timbre_index())
    }

    fn note_off(&mut self, part_index: usize, key: u8) {
        let changed = self.parts[part_index].note_off(key);
        self.apply_poly_transitions(part_index, changed);
    }

    fn apply_poly_transitions(&mut self, part_index: usize, handles: Vec<Handle<Poly>>) {
        for handle in handles {
            let Some((state, partials)) = self.parts[part_index].poly(handle).map(|p| (p.state(), *p.partials())) else {
                continue;
            };
            for partial_handle in partials.into_iter().flatten() {
                if let Some(partial) = self.partial_manager.partial_mut(partial_handle.index() as usize) {
                    if partial.owner() == Some(handle) {
                        partial.set_poly_state(&self.tables, state);
                    }
                }
            }
        }
    }

    fn abort_poly_partials(&mut self, part_index: usize, handles: &[Handle<Poly>]) {
        for &handle in handles {
            let Some(partials) = self.parts[part_index].poly(handle).map(|p| *p.partials()) else {
                continue;
            };
            for partial_handle in partials.into_iter().flatten() {
                if let Some(partial) = self.partial_manager.partial_mut(partial_handle.index() as usize) {
                    if partial.owner() == Some(handle) {
                        partial.start_abort(&self.tables);
                    }
                }
            }
        }
    }

    fn recalc_part_sustain(&mut self, part_index: usize) {
        let part_volume = self.parts[part_index].effective_volume();
        let expression = ((self.parts[part_index].expression() as u32) * 100 / 127) as u8;
        let master_volume = SystemParams::from_bytes(self.memory.system.as_slice()).master_volume;
        for index in 0..self.partial_manager.len() {
            let belongs = self
                .partial_manager
                .partial(index)
                .is_some_and(|p| p.is_active() && p.part_index() as usize == part_index);
            if belongs {
                if let Some(partial) = self.partial_manager.partial_mut(index) {
                    partial.recalc_tva_sustain(&self.tables, part_volume, expression, master_volume);
                }
            }
        }
    }

    /// Forces the `Poly` identified by `owner` straight to `Inactive`,
    /// clearing its partial handles. Used when one of its partials was
    /// stolen by a new note before the poly could die naturally and be
    /// picked up by `reclaim_dead`/`maybe_deactivate_poly`. Any of its
    /// other partials that weren't the one stolen are fast-released too,
    /// so none of them keep sounding under a poly that bookkeeping now
    /// considers inactive.
    fn force_deactivate_poly(&mut self, owner: Handle<Poly>) {
        let handles = self.parts.iter().find_map(|part| part.poly(owner).map(|poly| *poly.partials()));
        let Some(handles) = handles else {
            return;
        };
        for handle in handles.into_iter().flatten() {
            if let Some(partial) = self.partial_manager.partial_mut(handle.index() as usize) {
                if partial.owner() == Some(owner) && partial.is_active() {
                    partial.start_abort(&self.tables);
                }
            }
        }
        for part in self.parts.iter_mut() {
            if part.poly(owner).is_some() {
                part.deactivate_poly(owner);
                return;
            }
        }
    }

    fn maybe_deactivate_poly(&mut self, owner: Handle<Poly>) {
        for part in self.parts.iter_mut() {
            if let Some(poly) = part.poly(owner) {
                let all_dead = poly.partials().iter().all(|slot| {
                    slot.map_or(true, |h| self.partial_manager.get(h).is_none_or(|p| !p.is_active()))
                });
                if all_dead {
                    part.deactivate_poly(owner);
                }
                return;
            }
        }
    }

    // ---- Sysex ------------------------------------------------------

    fn dispatch_sysex(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < 4 {
            return Err(MT32Error::InvalidMidiFile("sysex message too short".to_string()));
        }
        if bytes[0] != 0x41 {
            return Err(MT32Error::InvalidMidiFile(format!("unsupported manufacturer id {:#04x}", bytes[0])));
        }
        let command = bytes[3];
        let rest = &bytes[4..];
        match command {
            0x12 => self.dispatch_dt1_message(rest),
            0x11 => dispatch_rq1_message(rest),
            other => Err(MT32Error::InvalidMidiFile(format!("unsupported sysex command {other:#04x}"))),
        }
    }

    fn dispatch_dt1_message(&mut self, rest: &[u8]) -> Result<()> {
        if rest.len() < 4 {
            return Err(MT32Error::InvalidMidiFile("dt1 message too short".to_string()));
        }
        if !verify_checksum(rest) {
            log::warn!("dt1 sysex message failed checksum verification");
            return Err(MT32Error::SysexChecksumInvalid);
        }
        let address = ((rest[0] as u32) << 16) | ((rest[1] as u32) << 8) | rest[2] as u32;
        let data = &rest[3..rest.len() - 1];
        log::trace!("dt1 write at address {address:#08x}, {} bytes", data.len());
        self.dispatch_dt1(address, data)
    }

    fn dispatch_dt1(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if let Some(part_index) = part_slot(base_address::PATCH_TEMP, PATCH_TEMP_STRIDE, NUM_PARTS, address, data.len()) {
            self.apply_patch_temp_write(part_index, address, data);
            return Ok(());
        }
        if let Some(part_index) = part_slot(base_address::TIMBRE_TEMP, 1, NUM_PARTS - 1, address, data.len()) {
            if let Some(&byte) = data.first() {
                self.parts[part_index].set_timbre_index(byte);
                self.refresh_part_display(part_index);
            }
            return Ok(());
        }

        let wrote = memory::write_region(
            &mut [
                (&mut self.memory.system, no_dirty as fn(&mut MemoryRegion)),
                (&mut self.memory.rhythm_temp, no_dirty),
                (&mut self.memory.patches, no_dirty),
                (&mut self.memory.timbres, no_dirty),
                (&mut self.memory.display, no_dirty),
            ],
            address,
            data,
        );

        match wrote {
            Ok(()) => {
                if self.memory.system.contains(address, data.len()) {
                    self.apply_system_params();
                } else if self.memory.display.contains(address, data.len()) {
                    let text = String::from_utf8_lossy(self.memory.display.as_slice()).into_owned();
                    self.display.show_message(&text);
                }
                Ok(())
            }
            Err(_) if address == base_address::RESET => {
                self.reset_engine();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn apply_patch_temp_write(&mut self, part_index: usize, address: u32, data: &[u8]) {
        let base = base_address::PATCH_TEMP + (part_index as u32) * PATCH_TEMP_STRIDE;
        let offset = (address - base) as usize;
        for (i, &byte) in data.iter().enumerate() {
            match offset + i {
                0 => self.parts[part_index].set_timbre_index(byte),
                3 => self.parts[part_index].set_pan(byte.min(14)),
                4 => self.parts[part_index].set_volume(byte),
                _ => {}
            }
        }
        self.recalc_part_sustain(part_index);
        self.refresh_part_display(part_index);
    }

    fn apply_system_params(&mut self) {
        let sys = SystemParams::from_bytes(self.memory.system.as_slice());

        let effective_reverb = self.reverb_override.unwrap_or(sys.reverb_enabled);
        if effective_reverb != self.reverb.enabled() {
            if effective_reverb {
                self.reverb.set_enabled(true);
            } else {
                self.reverb.set_reverb_enabled_and_reset(false);
            }
        }
        self.reverb.set_mode(reverb_mode_from_u8(sys.reverb_mode));
        self.reverb.set_time(sys.reverb_time);
        self.reverb.set_level(sys.reverb_level);

        for part_index in 0..NUM_PARTS {
            self.recalc_part_sustain(part_index);
        }
    }

    fn reset_engine(&mut self) {
        let partial_count = self.partial_manager.len();
        self.partial_manager = PartialManager::new(partial_count);
        self.parts = std::array::from_fn(|i| Part::new(i as u8));
        self.memory = MemoryBank::build();
        self.midi_queue.clear();
        self.stream_parser.reset();
        self.activation_counter = 0;
        self.reverb_override = None;
        self.apply_system_params();
    }

    // ---- Render -------------------------------------------------------

    fn pan_gains_for(&self, pan: u8) -> (f32, f32) {
        if self.options.nice_panning {
            self.tables.pan_gains[pan as usize]
        } else {
            let t = pan as f32 / (PAN_TABLE_SIZE - 1) as f32;
            (1.0 - t, t)
        }
    }

    fn apply_dac_quirk(&self, sample: f32) -> f32 {
        match self.options.dac_input_mode {
            DacInputMode::Nice | DacInputMode::Pure => sample,
            DacInputMode::Generation1 => (sample * 8192.0).round() / 8192.0,
            DacInputMode::Generation2 => (sample * 4096.0).round() / 4096.0,
        }
    }

    fn render_native_frame(&mut self) -> (f32, f32) {
        let mut raw = [0i16; crate::constants::MAX_PARTIALS];
        let mut active = [false; crate::constants::MAX_PARTIALS];
        let tables = &self.tables;
        let pcm = &self.pcm;
        self.partial_manager.tick_all(tables, pcm, |index, _partial, sample| {
            raw[index] = sample;
            active[index] = true;
        });

        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for index in 0..self.partial_manager.len() {
            if !active[index] {
                continue;
            }
            let Some(partial) = self.partial_manager.partial(index) else {
                continue;
            };
            let mut sample = raw[index] as f32 / 32768.0;
            if partial.ring_modulated() {
                if let Some(pair) = partial.pair_index() {
                    sample *= raw[pair as usize] as f32 / 32768.0;
                }
            }
            if !self.options.nice_partial_mixing {
                sample = sample.clamp(-1.0, 1.0);
            }
            let (pan_l, pan_r) = self.pan_gains_for(partial.pan());
            left += sample * pan_l;
            right += sample * pan_r;
        }

        if self.reversed_stereo {
            std::mem::swap(&mut left, &mut right);
        }

        let (left, right) = self.reverb.process(left, right);
        let (left, right) = self.analog.process(left, right);
        let left = self.apply_dac_quirk(left) * self.output_gain;
        let right = self.apply_dac_quirk(right) * self.output_gain;
        (left, right)
    }

    fn finish_native_frame(&mut self) {
        self.display.tick();
        let reclaimed = self.partial_manager.reclaim_dead();
        for (index, owner) in reclaimed {
            self.report().on_partial_state_change(index, false);
            self.maybe_deactivate_poly(owner);
        }
    }

    /// Drains every queued MIDI/Sysex event (in FIFO arrival order) and
    /// renders `output.len() / 2` stereo frames at the host rate chosen
    /// in [`SynthOptions::target_sample_rate`].
    pub fn render(&mut self, output: &mut [i16]) -> Result<()> {
        self.ensure_open()?;

        while let Some((_timestamp, event)) = self.midi_queue.pop() {
            match event {
                MidiEvent::Short(message) => self.apply_short_message(message),
                MidiEvent::Sysex(payload) => {
                    let _ = self.dispatch_sysex(&payload);
                }
            }
        }

        let frames = output.len() / NUM_OUTPUT_CHANNELS;
        let mut produced = 0usize;
        while produced < frames {
            let (left, right) = self.render_native_frame();
            self.finish_native_frame();
            self.resampler.feed(left, right, |l, r| {
                if produced < frames {
                    output[produced * 2] = to_i16(l);
                    output[produced * 2 + 1] = to_i16(r);
                    produced += 1;
                }
            });
            self.sample_counter = self.sample_counter.wrapping_add(1);
        }
        Ok(())
    }

    // ---- Configuration ------------------------------------------------

    /// Overrides (or clears, passing `None`) whether reverb is active,
    /// independent of the System region's `reverb_enabled` byte.
    pub fn set_reverb_enabled(&mut self, enabled: Option<bool>) {
        self.reverb_override = enabled;
        self.apply_system_params();
    }

    /// Effective reverb-enabled state (override, or the System region's
    /// setting if unoverridden).
    pub fn reverb_enabled(&self) -> bool {
        self.reverb.enabled()
    }

    /// Forces the reverb's CM-32L/MT-32 coefficient table compatibility,
    /// independent of the ROM auto-detected at `open()`.
    pub fn set_reverb_compatibility(&mut self, is_cm32l: bool) {
        let machine = if is_cm32l { MachineConfig::Cm32LV100 } else { MachineConfig::Mt32V107 };
        let mode = self.reverb.mode();
        let time = self.reverb.time();
        let level = self.reverb.level();
        let enabled = self.reverb.enabled();
        self.reverb = BReverbModel::new(machine);
        self.reverb.set_mode(mode);
        self.reverb.set_time(time);
        self.reverb.set_level(level);
        self.reverb.set_enabled(enabled);
        self.reverb.set_wet_gain(self.options.reverb_output_gain);
    }

    /// Sets the analog output stage fidelity.
    pub fn set_analog_quality(&mut self, quality: AnalogQuality) {
        self.options.analog_quality = quality;
        self.analog.set_quality(quality);
    }

    /// Sets the sample rate converter fidelity, rebuilding the converter
    /// (clearing any filter history) at the existing target rate.
    pub fn set_resampler_quality(&mut self, quality: ResamplerQuality) {
        self.options.resampler_quality = quality;
        self.resampler = SampleRateConverter::new(self.options.target_sample_rate, quality);
    }

    /// Enables or disables the Nice Amp Ramp quality switch.
    pub fn set_nice_amp_ramp(&mut self, enabled: bool) {
        self.options.nice_amp_ramp = enabled;
    }

    /// Enables or disables the Nice Panning quality switch.
    pub fn set_nice_panning(&mut self, enabled: bool) {
        self.options.nice_panning = enabled;
    }

    /// Enables or disables the Nice Partial Mixing quality switch.
    pub fn set_nice_partial_mixing(&mut self, enabled: bool) {
        self.options.nice_partial_mixing = enabled;
    }

    /// Sets the DAC emulation mode.
    pub fn set_dac_input_mode(&mut self, mode: DacInputMode) {
        self.options.dac_input_mode = mode;
    }

    /// Sets the MIDI ingest timestamp-defaulting mode.
    pub fn set_midi_delay_mode(&mut self, mode: MidiDelayMode) {
        self.options.midi_delay_mode = mode;
    }

    /// Linear output gain applied to the final mixed signal.
    pub fn output_gain(&self) -> f32 {
        self.output_gain
    }

    /// Sets the output gain.
    pub fn set_output_gain(&mut self, gain: f32) {
        self.output_gain = gain;
        self.options.output_gain = gain;
    }

    /// Linear gain applied to the reverb's wet signal.
    pub fn reverb_output_gain(&self) -> f32 {
        self.options.reverb_output_gain
    }

    /// Sets the reverb output gain.
    pub fn set_reverb_output_gain(&mut self, gain: f32) {
        self.options.reverb_output_gain = gain;
        self.reverb.set_wet_gain(gain);
    }

    /// `true` if left/right output channels are swapped.
    pub fn reversed_stereo(&self) -> bool {
        self.reversed_stereo
    }

    /// Swaps (or un-swaps) left/right output channels.
    pub fn set_reversed_stereo(&mut self, reversed: bool) {
        self.reversed_stereo = reversed;
        self.options.reversed_stereo = reversed;
    }

    // ---- v2.6+ per-part overrides and display -------------------------

    /// Sets (or clears, passing `None`) a per-part volume override that
    /// takes precedence over the part's CC7 volume.
    pub fn set_part_volume_override(&mut self, part_index: usize, volume: Option<u8>) {
        if let Some(part) = self.parts.get_mut(part_index) {
            part.set_volume_override(volume);
            self.recalc_part_sustain(part_index);
        }
    }

    /// Gets the current per-part volume override, if any.
    pub fn get_part_volume_override(&self, part_index: usize) -> Option<u8> {
        self.parts.get(part_index).and_then(|p| p.volume_override())
    }

    /// Switches the LCD back to the part-name display immediately,
    /// clearing any pending Sysex display-message override.
    pub fn set_main_display_mode(&mut self) {
        self.display.show_main_display();
    }

    /// Sets the v2.6+ display compatibility mode.
    pub fn set_display_compatibility(&mut self, compatibility: DisplayCompatibility) {
        self.display.set_compatibility(compatibility);
    }

    // ---- Queries -------------------------------------------------------

    /// `true` if any part has at least one note in flight.
    pub fn is_active(&self) -> bool {
        self.parts.iter().any(|p| p.is_active())
    }

    /// Total partial pool size (32 for every recognized machine).
    pub fn partial_count(&self) -> usize {
        self.partial_manager.len()
    }

    /// Coarse lifecycle state of every partial slot, indexed the same
    /// as [`Synth::partial_count`].
    pub fn partial_states(&self) -> Vec<PartialState> {
        (0..self.partial_manager.len())
            .map(|i| match self.partial_manager.partial(i) {
                Some(partial) if partial.is_active() => match partial.tva_phase() {
                    TvaPhase::Basic | TvaPhase::Attack => PartialState::Attack,
                    TvaPhase::P2 | TvaPhase::P3 | TvaPhase::P4 | TvaPhase::Sustain => PartialState::Sustain,
                    TvaPhase::Release => PartialState::Release,
                    TvaPhase::Dead => PartialState::Inactive,
                },
                _ => PartialState::Inactive,
            })
            .collect()
    }

    /// Bitmask of which parts currently have at least one note sounding.
    pub fn part_states(&self) -> PartStates {
        let mut flags = PartStates::empty();
        for (i, part) in self.parts.iter().enumerate() {
            if part.is_active() {
                flags |= PartStates::from_bits_truncate(1 << i);
            }
        }
        flags
    }

    /// Keys and velocities of every sounding (not fully released) note
    /// on `part_index`.
    pub fn playing_notes(&self, part_index: usize) -> (Vec<u8>, Vec<u8>) {
        self.parts.get(part_index).map(|p| p.playing_notes()).unwrap_or_default()
    }

    /// A display-only label for the part's currently active patch.
    /// Real patch names live in the copyrighted Control ROM's text
    /// table, not reproduced here; this synthesizes a placeholder from
    /// the part's program number instead.
    pub fn patch_name(&self, part_index: usize) -> String {
        if part_index == RHYTHM_PART_INDEX {
            return "Rhythm".to_string();
        }
        match self.parts.get(part_index) {
            Some(part) => format!("Patch {:03}", part.program()),
            None => String::new(),
        }
    }

    /// A display-only label for the part's timbre's sound group.
    /// Bucketed from the timbre index rather than read from a real ROM
    /// category table (same caveat as [`Synth::patch_name`]).
    pub fn sound_group_name(&self, part_index: usize) -> String {
        let Some(part) = self.parts.get(part_index) else {
            return String::new();
        };
        match part.timbre_index() / 16 {
            0 => "Piano".to_string(),
            1 => "Organ".to_string(),
            2 => "Guitar".to_string(),
            3 => "Strings".to_string(),
            _ => "Other".to_string(),
        }
    }

    /// Reads `length` bytes of Sysex-addressable parameter memory at
    /// `address`. Patch Temporary and Timbre Temporary ranges are
    /// synthesized from live `Part` state; everything else reads the
    /// region's stored bytes, or zero-fill if `address` is unclaimed.
    pub fn read_memory(&self, address: u32, length: usize) -> Vec<u8> {
        if let Some(part_index) = part_slot(base_address::PATCH_TEMP, PATCH_TEMP_STRIDE, NUM_PARTS, address, length) {
            let part = &self.parts[part_index];
            let patch = PatchParams {
                timbre_index: part.timbre_index(),
                key_shift: 0,
                fine_tune: 0,
                pan: part.pan(),
                level: part.volume(),
            };
            let bytes = patch.to_bytes();
            let base = base_address::PATCH_TEMP + (part_index as u32) * PATCH_TEMP_STRIDE;
            let offset = (address - base) as usize;
            return bytes[offset..offset + length].to_vec();
        }
        if let Some(part_index) = part_slot(base_address::TIMBRE_TEMP, 1, NUM_PARTS - 1, address, length) {
            return vec![self.parts[part_index].timbre_index(); length];
        }
        for region in self.memory.regions() {
            if region.contains(address, length) {
                return region.read(address, length).0;
            }
        }
        vec![0; length]
    }

    /// Current LCD text and MESSAGE LED state.
    pub fn display_state(&self) -> DisplayState {
        self.display.state()
    }
}

impl Default for Synth {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_for(structure: &PartialStructure, reserved: &[(Handle<Partial>, bool)], slot: usize) -> (Option<u8>, bool) {
    let pair_slot = match structure {
        PartialStructure::Single => return (None, false),
        PartialStructure::SplitStereo | PartialStructure::RingModulated => {
            if slot == 0 {
                1
            } else {
                0
            }
        }
        PartialStructure::Full => slot ^ 1,
    };
    let Some(&(pair_handle, _)) = reserved.get(pair_slot) else {
        return (None, false);
    };
    let ring_modulated = matches!(structure, PartialStructure::RingModulated) && slot == 1;
    (Some(pair_handle.index() as u8), ring_modulated)
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized_roms() -> (Vec<u8>, Vec<u8>) {
        (vec![0u8; 64 * 1024], vec![0u8; 64 * 1024])
    }

    #[test]
    fn closed_synth_rejects_play_and_render() {
        let mut synth = Synth::new();
        assert!(!synth.is_open());
        assert!(matches!(synth.play_msg(0x90_3c_64, None), Err(MT32Error::NotOpen)));
        let mut out = vec![0i16; 16];
        assert!(matches!(synth.render(&mut out), Err(MT32Error::NotOpen)));
    }

    #[test]
    fn open_then_open_again_fails() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        assert!(matches!(synth.open(&control, &pcm, SynthOptions::default()), Err(MT32Error::AlreadyOpen)));
    }

    #[test]
    fn cold_open_renders_silence() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        let mut out = vec![1i16; 512];
        synth.render(&mut out).unwrap();
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn note_on_activates_a_part_and_a_partial() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        synth.play_msg_immediate(0x90_3c_64).unwrap();
        assert!(synth.is_active());
        assert!(synth.partial_states().iter().any(|s| *s != PartialState::Inactive));
    }

    #[test]
    fn note_off_eventually_silences_the_partial() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        synth.play_msg_immediate(0x90_3c_64).unwrap();
        synth.play_msg_immediate(0x80_3c_40).unwrap();

        let mut out = vec![0i16; 2 * 4096];
        for _ in 0..200 {
            synth.render(&mut out).unwrap();
            if !synth.is_active() {
                break;
            }
        }
        assert!(!synth.is_active(), "note never fully released");
    }

    #[test]
    fn reverb_mode_sysex_is_applied() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        // F0 41 10 16 12 10 00 01 01 6E F7, framing stripped.
        let payload = [0x41, 0x10, 0x16, 0x12, 0x10, 0x00, 0x01, 0x01, 0x6E];
        synth.play_sysex_immediate(&payload).unwrap();
        assert_eq!(synth.reverb.mode(), ReverbMode::Hall);
    }

    #[test]
    fn bad_checksum_sysex_is_rejected() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        let payload = [0x41, 0x10, 0x16, 0x12, 0x10, 0x00, 0x01, 0x01, 0x00];
        assert!(matches!(synth.play_sysex_immediate(&payload), Err(MT32Error::SysexChecksumInvalid)));
    }

    #[test]
    fn voice_stealing_keeps_partial_count_bounded() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        for key in 0..33u8 {
            synth.play_msg_immediate(0x90_00_64 | ((key as u32) << 8)).unwrap();
        }
        assert_eq!(synth.partial_count(), 32);
        assert!(synth.partial_states().iter().filter(|s| **s != PartialState::Inactive).count() <= 32);
    }

    #[test]
    fn read_memory_reflects_patch_temp_after_program_change() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        synth.play_msg_immediate(0xc0_05_00).unwrap();
        let bytes = synth.read_memory(base_address::PATCH_TEMP, PATCH_TEMP_STRIDE as usize);
        assert_eq!(bytes.len(), PATCH_TEMP_STRIDE as usize);
    }

    #[test]
    fn reset_sysex_silences_and_restores_defaults() {
        let (control, pcm) = sized_roms();
        let mut synth = Synth::new();
        synth.open(&control, &pcm, SynthOptions::default()).unwrap();
        synth.play_msg_immediate(0x90_3c_64).unwrap();
        assert!(synth.is_active());

        // F0 41 10 16 12 7F 00 00 01 00 F7, framing stripped: DT1 write
        // of one data byte at the reset pseudo-address.
        let sum: u32 = [0x7Fu8, 0x00, 0x00, 0x01].iter().map(|&b| b as u32).sum();
        let checksum = ((0x80 - (sum % 128)) % 128) as u8;
        let payload = [0x41, 0x10, 0x16, 0x12, 0x7F, 0x00, 0x00, 0x01, checksum];
        synth.play_sysex_immediate(&payload).unwrap();
        assert!(!synth.is_active());
    }
}
