//! Analysis of deref chains: linearized paths, alias comparison, use
//! classification and the small queries passes make about a chain.

use crate::ir::{Deref, Function, InstrId};

pub mod compare;
pub mod layout;
pub mod path;
pub mod policy;
pub mod query;
pub mod uses;

pub use self::{
    compare::{AliasResult, compare_deref_paths, compare_derefs},
    path::DerefPath,
    uses::has_complex_use,
};

/// The deref `deref` is built on top of. `None` for variables and for casts
/// of values that are not derefs, i.e. for the roots of chains.
pub fn parent(function: &Function, deref: InstrId) -> Option<InstrId> {
    let parent = function.deref(deref)?.kind.parent()?;
    function.is_deref(parent).then_some(parent)
}

/// Walks from `leaf` up to the root of its chain, `leaf` first
pub fn ancestors(function: &Function, leaf: InstrId) -> impl Iterator<Item = InstrId> + '_ {
    std::iter::successors(Some(leaf), |&d| parent(function, d))
}

/// Shorthand for fetching an instruction that is known to be a deref
pub(crate) fn expect_deref(function: &Function, id: InstrId) -> &Deref {
    function
        .deref(id)
        .unwrap_or_else(|| panic!("{id:?} is not a deref instruction"))
}
