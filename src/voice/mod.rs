//! Voice allocation: `Part`, `Poly`, `Partial` and the `PartialManager`
//! that pools partials across all 9 parts (`spec.md` §3, §4.6).
//!
//! Cross-links follow the owned-index graph from `spec.md` §9: `Synth`
//! owns all 9 [`Part`]s and the one [`PartialManager`]; a `Part` owns its
//! `Poly` arena; `Partial`s hold a weak, generation-checked [`Handle`]
//! back to their owning `Poly` instead of a raw pointer or `Rc`.

mod handle;
mod part;
mod partial;
mod partial_manager;
mod poly;

pub use handle::Handle;
pub use part::Part;
pub use partial::{Partial, PartialResetContext};
pub use partial_manager::PartialManager;
pub use poly::{Poly, PolyState};
