//! One of the 9 parts (8 melodic + rhythm) a `Synth` renders (`spec.md` §3).

use crate::voice::handle::Handle;
use crate::voice::partial::Partial;
use crate::voice::poly::{Poly, PolyState};

/// Owns a note-event arena (`Vec<Poly>`, slots reused by generation,
/// never removed) plus the part-level MIDI state that feeds TVA/TVF/TVP
/// resets for every note played on it.
#[derive(Clone, Debug)]
pub struct Part {
    index: u8,
    volume: u8,
    expression: u8,
    pan: u8,
    program: u8,
    pitch_bend: i16,
    modulation: u8,
    hold_pedal: bool,
    timbre_index: u8,
    volume_override: Option<u8>,
    polys: Vec<Poly>,
    generations: Vec<u16>,
}

impl Part {
    /// Creates a part at its power-on defaults.
    pub fn new(index: u8) -> Self {
        Part {
            index,
            volume: 100,
            expression: 127,
            pan: 7,
            program: 0,
            pitch_bend: 0,
            modulation: 0,
            hold_pedal: false,
            timbre_index: 0,
            volume_override: None,
            polys: Vec::new(),
            generations: Vec::new(),
        }
    }

    /// This part's index, 0..=7 melodic or [`crate::memory::RHYTHM_PART_INDEX`].
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Part volume (CC7), 0..=100, unless overridden.
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Sets part volume from a CC7 message.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    /// The effective volume TVA resets should use: the v2.6+ override if
    /// set, otherwise the CC7 volume.
    pub fn effective_volume(&self) -> u8 {
        self.volume_override.unwrap_or(self.volume)
    }

    /// v2.6+ per-part volume override; `None` clears it.
    pub fn volume_override(&self) -> Option<u8> {
        self.volume_override
    }

    /// Sets or clears the v2.6+ per-part volume override.
    pub fn set_volume_override(&mut self, volume: Option<u8>) {
        self.volume_override = volume.map(|v| v.min(100));
    }

    /// Expression (CC11), 0..=127 folded by the caller to the 0..=100
    /// domain TVA's `Reset` expects.
    pub fn expression(&self) -> u8 {
        self.expression
    }

    /// Sets expression from a CC11 message.
    pub fn set_expression(&mut self, expression: u8) {
        self.expression = expression.min(127);
    }

    /// Pan position, 0..=14.
    pub fn pan(&self) -> u8 {
        self.pan
    }

    /// Sets pan from a CC10 message (0..=127 folded to 0..=14 by the caller).
    pub fn set_pan(&mut self, pan: u8) {
        self.pan = pan.min(14);
    }

    /// Active program number (patch index), 0..=127.
    pub fn program(&self) -> u8 {
        self.program
    }

    /// Sets the active program from a Program Change message.
    pub fn set_program(&mut self, program: u8) {
        self.program = program;
    }

    /// Active timbre index, resolved through the current patch.
    pub fn timbre_index(&self) -> u8 {
        self.timbre_index
    }

    /// Rebinds the active timbre (following a Program Change or a Sysex
    /// write to this part's Timbre Temporary memory).
    pub fn set_timbre_index(&mut self, timbre_index: u8) {
        self.timbre_index = timbre_index;
    }

    /// Current pitch-bend value, signed, centered at 0.
    pub fn pitch_bend(&self) -> i16 {
        self.pitch_bend
    }

    /// Sets pitch-bend from a Pitch Bend Change message.
    pub fn set_pitch_bend(&mut self, value: i16) {
        self.pitch_bend = value;
    }

    /// Modulation depth (CC1), 0..=127.
    pub fn modulation(&self) -> u8 {
        self.modulation
    }

    /// Sets modulation from a CC1 message.
    pub fn set_modulation(&mut self, modulation: u8) {
        self.modulation = modulation;
    }

    /// `true` while the hold pedal (CC64 >= 64) is down.
    pub fn hold_pedal(&self) -> bool {
        self.hold_pedal
    }

    /// Sets the hold pedal from a CC64 message. Returns the handles of
    /// any `Held` polys that should drop to `Released` (pedal lifted).
    pub fn set_hold_pedal(&mut self, down: bool) -> Vec<Handle<Poly>> {
        self.hold_pedal = down;
        let mut released = Vec::new();
        if !down {
            for (index, poly) in self.polys.iter_mut().enumerate() {
                if poly.state() == PolyState::Held {
                    poly.lift_hold();
                    released.push(Handle::new(index as u16, self.generations[index]));
                }
            }
        }
        released
    }

    /// Starts a new note, reusing the oldest inactive poly slot if one
    /// exists, otherwise growing the arena. Returns the new poly's handle.
    pub fn note_on(
        &mut self,
        key: u8,
        velocity: u8,
        activation_order: u64,
        partials: [Option<Handle<Partial>>; 4],
    ) -> Handle<Poly> {
        let poly = Poly::start(key, velocity, activation_order, partials);
        if let Some(index) = self.polys.iter().position(|p| p.is_inactive()) {
            self.polys[index] = poly;
            self.generations[index] = self.generations[index].wrapping_add(1);
            Handle::new(index as u16, self.generations[index])
        } else {
            self.polys.push(poly);
            self.generations.push(0);
            Handle::new((self.polys.len() - 1) as u16, 0)
        }
    }

    /// Resolves a handle to its poly, if the slot hasn't since been reused.
    pub fn poly(&self, handle: Handle<Poly>) -> Option<&Poly> {
        let index = handle.index() as usize;
        if self.generations.get(index).copied() == Some(handle.generation()) {
            self.polys.get(index)
        } else {
            None
        }
    }

    /// Note-Off for `key`: transitions every matching `Playing` poly to
    /// `Held` or `Released` depending on the hold pedal. Returns the
    /// handles of polys that changed state.
    pub fn note_off(&mut self, key: u8) -> Vec<Handle<Poly>> {
        let hold = self.hold_pedal;
        let mut changed = Vec::new();
        for (index, poly) in self.polys.iter_mut().enumerate() {
            if poly.key() == key && poly.state() == PolyState::Playing {
                poly.note_off(hold);
                changed.push(Handle::new(index as u16, self.generations[index]));
            }
        }
        changed
    }

    /// All-Notes-Off (CC123): releases every sounding poly without the
    /// hard cutoff of All-Sounds-Off.
    pub fn all_notes_off(&mut self) -> Vec<Handle<Poly>> {
        let mut changed = Vec::new();
        for (index, poly) in self.polys.iter_mut().enumerate() {
            if matches!(poly.state(), PolyState::Playing | PolyState::Held) {
                poly.abort();
                changed.push(Handle::new(index as u16, self.generations[index]));
            }
        }
        changed
    }

    /// All-Sounds-Off (CC120): identical bookkeeping to
    /// [`Part::all_notes_off`]; the fast-decay behavior lives in
    /// `Partial::start_abort`, which the caller invokes on every
    /// partial these polys own.
    pub fn all_sounds_off(&mut self) -> Vec<Handle<Poly>> {
        self.all_notes_off()
    }

    /// Frees a poly slot once every partial it owns has reached `Dead`.
    pub fn deactivate_poly(&mut self, handle: Handle<Poly>) {
        let index = handle.index() as usize;
        if self.generations.get(index).copied() == Some(handle.generation()) {
            if let Some(poly) = self.polys.get_mut(index) {
                poly.deactivate();
            }
        }
    }

    /// Keys and velocities of every currently sounding (not yet released)
    /// note, for `Synth::playing_notes`.
    pub fn playing_notes(&self) -> (Vec<u8>, Vec<u8>) {
        let mut keys = Vec::new();
        let mut velocities = Vec::new();
        for poly in &self.polys {
            if matches!(poly.state(), PolyState::Playing | PolyState::Held) {
                keys.push(poly.key());
                velocities.push(poly.velocity());
            }
        }
        (keys, velocities)
    }

    /// `true` if any poly on this part is not `Inactive`.
    pub fn is_active(&self) -> bool {
        self.polys.iter().any(|p| !p.is_inactive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_then_note_off_without_hold_releases() {
        let mut part = Part::new(0);
        let handle = part.note_on(60, 100, 0, [None; 4]);
        assert_eq!(part.poly(handle).unwrap().state(), PolyState::Playing);

        let changed = part.note_off(60);
        assert_eq!(changed, vec![handle]);
        assert_eq!(part.poly(handle).unwrap().state(), PolyState::Released);
    }

    #[test]
    fn hold_pedal_holds_notes_until_lifted() {
        let mut part = Part::new(0);
        part.set_hold_pedal(true);
        let handle = part.note_on(60, 100, 0, [None; 4]);
        part.note_off(60);
        assert_eq!(part.poly(handle).unwrap().state(), PolyState::Held);

        let released = part.set_hold_pedal(false);
        assert_eq!(released, vec![handle]);
        assert_eq!(part.poly(handle).unwrap().state(), PolyState::Released);
    }

    #[test]
    fn deactivated_slot_is_reused_with_new_generation() {
        let mut part = Part::new(0);
        let first = part.note_on(60, 100, 0, [None; 4]);
        part.note_off(60);
        part.deactivate_poly(first);
        assert!(part.poly(first).is_none(), "stale handle must not resolve after reuse");

        let second = part.note_on(62, 90, 1, [None; 4]);
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
    }
}
