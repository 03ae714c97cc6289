//! Passes that keep deref chains tidy as the rest of the compiler rewrites the
//! IR around them. Each pass works on one function at a time and reports
//! whether it changed anything; the `*_in_function` entry points have shader
//! wide counterparts that simply map over every function.

use crate::ir::{Function, Metadata, Shader};

pub mod dead_derefs;
pub mod fixup_modes;
pub mod opt_deref;
pub mod rematerialize;

pub use self::{
    dead_derefs::{remove_dead_derefs, remove_dead_derefs_in_function, remove_if_unused},
    fixup_modes::fixup_deref_modes,
    opt_deref::{opt_deref, opt_deref_in_function},
    rematerialize::rematerialize_derefs_in_use_blocks,
};

/// Deref passes only add and remove instructions, they never touch control
/// flow.
pub(crate) const PRESERVED_METADATA: Metadata = Metadata::BLOCK_INDEX.union(Metadata::DOMINANCE);

/// Runs `pass` on every function of `shader`, reporting whether any of them
/// changed.
pub(crate) fn for_each_function(
    shader: &mut Shader,
    mut pass: impl FnMut(&mut Function) -> bool,
) -> bool {
    let mut progress = false;
    for function in shader.functions.iter_mut() {
        if pass(function) {
            progress = true;
        }
    }
    progress
}
