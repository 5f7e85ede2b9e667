//! Flat pool of [`Partial`] slots shared by every part (`spec.md` §4.6).
//!
//! Slots are never removed, only marked free and reused; each carries a
//! generation counter so a [`Handle<Partial>`] held by a since-stolen
//! owner compares unequal to the new occupant's handle.

use crate::rom::PcmRom;
use crate::tables::Tables;
use crate::voice::handle::Handle;
use crate::voice::partial::Partial;
use crate::voice::poly::{Poly, PolyState};

/// Owns the fixed-size array of partials (32 on MT-32/CM-32L) and
/// implements the stealing priority policy from `spec.md` §4.6.
#[derive(Clone, Debug)]
pub struct PartialManager {
    partials: Vec<Partial>,
    generations: Vec<u16>,
}

/// Lower is higher priority: (a) free, (b) released same part,
/// (c) released any part, (d) playing/held same part, (e) playing/held
/// any part.
fn candidate_rank(partial: &Partial, part_index: u8) -> (u8, u64) {
    if !partial.is_active() {
        return (0, 0);
    }
    let order = partial.activation_order();
    match partial.poly_state() {
        PolyState::Inactive => (0, 0),
        PolyState::Released => {
            if partial.part_index() == part_index {
                (1, order)
            } else {
                (2, order)
            }
        }
        PolyState::Playing | PolyState::Held => {
            if partial.part_index() == part_index {
                (3, order)
            } else {
                (4, order)
            }
        }
    }
}

impl PartialManager {
    /// Builds a pool of `count` free partial slots.
    pub fn new(count: usize) -> Self {
        PartialManager {
            partials: vec![Partial::new(); count],
            generations: vec![0; count],
        }
    }

    /// Total pool size.
    pub fn len(&self) -> usize {
        self.partials.len()
    }

    /// `true` if the pool holds no slots (never constructed this way in
    /// practice, but required alongside `len`).
    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    /// Number of slots currently sounding or decaying.
    pub fn active_count(&self) -> usize {
        self.partials.iter().filter(|p| p.is_active()).count()
    }

    /// Read access to a slot by raw index (bypassing generation checks),
    /// used by the per-sample render loop and state queries.
    pub fn partial(&self, index: usize) -> Option<&Partial> {
        self.partials.get(index)
    }

    /// Mutable access to a slot by raw index.
    pub fn partial_mut(&mut self, index: usize) -> Option<&mut Partial> {
        self.partials.get_mut(index)
    }

    /// Resolves a handle to its slot, returning `None` if the slot has
    /// since been reused under a different generation.
    pub fn get(&self, handle: Handle<Partial>) -> Option<&Partial> {
        let index = handle.index() as usize;
        if self.generations.get(index).copied() == Some(handle.generation()) {
            self.partials.get(index)
        } else {
            None
        }
    }

    /// Reserves `count` slots for a new note on `part_index`, applying the
    /// stealing priority policy. Slots ranked above priority 0 (i.e. not
    /// already free) are stolen: their TVA is fast-released via
    /// [`Partial::start_abort`] before the slot is freed for reuse.
    ///
    /// Returns one handle per reserved slot plus whether it was stolen
    /// (for `on_partial_state_change` reporting), in allocation order,
    /// together with the distinct `Poly` owners that lost a partial to
    /// stealing. A stolen slot's old owner never dies through the normal
    /// `reclaim_dead` path (its replacement note overwrites the slot
    /// immediately), so the caller must force those owners to `Inactive`
    /// itself — see `Synth::note_on`.
    pub fn allocate(
        &mut self,
        tables: &Tables,
        part_index: u8,
        count: usize,
    ) -> (Vec<(Handle<Partial>, bool)>, Vec<Handle<Poly>>) {
        let mut ranked: Vec<(usize, u8, u64)> = self
            .partials
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (rank, order) = candidate_rank(p, part_index);
                (i, rank, order)
            })
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let mut out = Vec::with_capacity(count);
        let mut stolen_owners = Vec::new();
        for &(index, rank, _) in ranked.iter().take(count) {
            let stolen = rank != 0;
            if stolen {
                log::debug!("stealing partial {index} for part {part_index}");
                if let Some(owner) = self.partials[index].owner() {
                    if !stolen_owners.contains(&owner) {
                        stolen_owners.push(owner);
                    }
                }
                self.partials[index].start_abort(tables);
            }
            self.partials[index].free();
            self.generations[index] = self.generations[index].wrapping_add(1);
            out.push((Handle::new(index as u16, self.generations[index]), stolen));
        }
        (out, stolen_owners)
    }

    /// Advances every active partial one sample and mixes its output via
    /// `sink(index, partial, sample)`. Dead partials are skipped (the
    /// caller frees them separately once their owning `Poly` notices).
    pub fn tick_all(&mut self, tables: &Tables, pcm: &PcmRom, mut sink: impl FnMut(usize, &Partial, i16)) {
        for (index, partial) in self.partials.iter_mut().enumerate() {
            if !partial.is_active() {
                continue;
            }
            let sample = partial.tick(tables, pcm);
            sink(index, partial, sample);
        }
    }

    /// Frees every slot whose TVA has reached `Dead`, returning the owner
    /// handle of each so `Part`/`Synth` can check whether the owning
    /// `Poly` is now fully inactive.
    pub fn reclaim_dead(&mut self) -> Vec<(usize, Handle<Poly>)> {
        let mut reclaimed = Vec::new();
        for (index, partial) in self.partials.iter_mut().enumerate() {
            if partial.is_active() && partial.is_dead() {
                if let Some(owner) = partial.owner() {
                    reclaimed.push((index, owner));
                }
                partial.free();
            }
        }
        reclaimed
    }

    /// Immediately aborts every active partial (All-Sounds-Off, `close()`).
    pub fn abort_all(&mut self, tables: &Tables) {
        for partial in self.partials.iter_mut() {
            if partial.is_active() {
                partial.start_abort(tables);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::partial::PartialResetContext;
    use crate::memory::PartialParams;
    use crate::la32::RendererType;

    fn tables() -> Tables {
        Tables::build()
    }

    fn start_ctx() -> PartialResetContext {
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
                tva_env_time: [0, 10, 10, 10, 10],
                tva_env_level: [100, 80, 60, 40, 0],
                tva_level: 100,
                tvf_base_cutoff: 100,
                ..Default::default()
            },
            structure_position: 0,
            pair_index: None,
            ring_modulated: false,
            pan: 7,
            renderer: RendererType::Bit,
            tvp_seed: 0,
        }
    }

    #[test]
    fn never_grows_past_pool_size() {
        let t = tables();
        let mut manager = PartialManager::new(4);
        for part in 0..5u8 {
            let (reserved, _stolen_owners) = manager.allocate(&t, part, 1);
            assert_eq!(reserved.len(), 1);
            let (handle, _stolen) = reserved[0];
            manager
                .partial_mut(handle.index() as usize)
                .unwrap()
                .start(&t, Handle::new(0, 0), part, part as u64, start_ctx());
        }
        assert_eq!(manager.active_count(), 4);
        assert_eq!(manager.len(), 4);
    }

    #[test]
    fn steals_oldest_playing_when_pool_exhausted() {
        let t = tables();
        let mut manager = PartialManager::new(2);
        for i in 0..2u64 {
            let (reserved, stolen_owners) = manager.allocate(&t, 0, 1);
            let (handle, stolen) = reserved[0];
            assert!(!stolen);
            assert!(stolen_owners.is_empty());
            manager
                .partial_mut(handle.index() as usize)
                .unwrap()
                .start(&t, Handle::new(0, 0), 0, i, start_ctx());
        }
        let (reserved, stolen_owners) = manager.allocate(&t, 0, 1);
        assert!(reserved[0].1, "third allocation should have stolen a slot");
        assert_eq!(stolen_owners, vec![Handle::new(0, 0)], "stealing must report the displaced owner");
    }
}
