//! Deref chain analysis and cleanup for a shader SSA IR.
//!
//! A deref chain is a sequence of instructions resolving a storage location:
//! it starts at a variable (or a cast of some pointer value) and narrows it
//! down through array, struct and pointer-arithmetic steps. [`deref`] answers
//! questions about such chains, most importantly whether two of them may
//! touch the same memory, and [`optimization`] keeps them in a shape those
//! answers are precise for.

pub mod deref;
pub mod index;
pub mod intern;
pub mod ir;
pub mod optimization;
pub mod verify;

#[cfg(test)]
mod test_util;
