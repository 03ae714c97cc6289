//! Peephole cleanups of casts and pointer-as-array steps. Removing these
//! turns pointer arithmetic back into plain typed chains, which is what the
//! alias comparator and later copy propagation can reason about.

use crate::{
    deref::{self, expect_deref, query::ptr_as_array_stride},
    ir::{
        Builder, DerefKind, Function, InstrId, Instruction, Metadata, Shader, Slot, Use, User,
    },
    optimization::{PRESERVED_METADATA, dead_derefs::remove_if_unused, for_each_function},
};

/// A cast that changes nothing observable about its parent deref
fn is_trivial_deref_cast(function: &Function, cast: InstrId) -> bool {
    let Some(parent) = deref::parent(function, cast) else {
        return false;
    };

    let cast = expect_deref(function, cast);
    let parent = expect_deref(function, parent);

    cast.mode == parent.mode
        && cast.ty == parent.ty
        && cast.num_components == parent.num_components
        && cast.bit_size == parent.bit_size
}

/// A trivial cast whose stride also matches the array step it casts, so a
/// `PtrAsArray` on top of it advances by the same amount either way
fn is_trivial_array_deref_cast(function: &Function, cast: InstrId) -> bool {
    debug_assert!(is_trivial_deref_cast(function, cast));

    let DerefKind::Cast { ptr_stride, .. } = expect_deref(function, cast).kind else {
        unreachable!("not a cast");
    };
    let Some(parent) = deref::parent(function, cast) else {
        return false;
    };

    match expect_deref(function, parent).kind {
        DerefKind::Array { .. } => match deref::parent(function, parent) {
            Some(array) => ptr_stride == expect_deref(function, array).ty.explicit_stride(),
            None => false,
        },
        DerefKind::PtrAsArray { .. } => ptr_stride == ptr_as_array_stride(function, parent),
        _ => false,
    }
}

fn is_ptr_as_array_user(function: &Function, user: User) -> bool {
    match user {
        User::Instruction(id) => function
            .deref(id)
            .is_some_and(|d| d.kind.is_ptr_as_array()),
        User::Terminator(_) => false,
    }
}

/// Points a cast of a cast straight at the innermost cast's source
fn opt_remove_cast_cast(function: &mut Function, cast: InstrId) -> bool {
    let first_cast = deref::ancestors(function, cast)
        .take_while(|&d| expect_deref(function, d).kind.is_cast())
        .last()
        .unwrap_or(cast);

    if first_cast == cast {
        return false;
    }

    let source = expect_deref(function, first_cast)
        .kind
        .parent()
        .expect("cast without a parent");
    function.rewrite_operand(
        Use {
            user: User::Instruction(cast),
            slot: Slot::Parent,
        },
        source,
    );

    tracing::trace!(?cast, ?source, "collapsed cast of cast");
    true
}

/// Replaces a cast of a struct to the type of its first member with a plain
/// struct deref of field 0, which copy propagation understands.
fn opt_replace_struct_wrapper_cast(function: &mut Function, cast: InstrId) -> bool {
    let Some(parent) = deref::parent(function, cast) else {
        return false;
    };

    let parent_ty = &expect_deref(function, parent).ty;
    let Some(first) = parent_ty.struct_field(0) else {
        return false;
    };
    if first.offset != Some(0) || first.ty != expect_deref(function, cast).ty {
        return false;
    }

    let replacement = Builder::before(function, cast).deref_struct(parent, 0);
    function.rewrite_uses(cast, replacement);
    remove_if_unused(function, cast);

    tracing::trace!(?cast, ?replacement, "replaced struct wrapper cast");
    true
}

fn opt_deref_cast(function: &mut Function, cast: InstrId) -> bool {
    if opt_replace_struct_wrapper_cast(function, cast) {
        return true;
    }

    let mut progress = opt_remove_cast_cast(function, cast);
    if !is_trivial_deref_cast(function, cast) {
        return progress;
    }

    let trivial_array_cast = is_trivial_array_deref_cast(function, cast);
    let source = expect_deref(function, cast)
        .kind
        .parent()
        .expect("cast without a parent");

    for usage in function.uses_of(cast) {
        debug_assert!(
            usage.slot != Slot::Condition,
            "cast {cast:?} used as a branch condition"
        );

        // Dropping the cast would change the stride the ptr_as_array advances by
        if is_ptr_as_array_user(function, usage.user) && !trivial_array_cast {
            continue;
        }

        function.rewrite_operand(usage, source);
        progress = true;
    }

    if progress {
        tracing::trace!(?cast, ?source, "forwarded trivial cast");
    }

    remove_if_unused(function, cast) || progress
}

fn opt_deref_ptr_as_array(function: &mut Function, deref: InstrId) -> bool {
    let DerefKind::PtrAsArray { parent, index } = expect_deref(function, deref).kind else {
        unreachable!("not a ptr_as_array deref");
    };
    debug_assert!(function.is_deref(parent));

    if function.as_const(index) == Some(0) {
        // Advancing by zero elements does nothing. The source may be a trivial
        // cast, in which case it can be skipped as well.
        let mut target = parent;
        if expect_deref(function, parent).kind.is_cast() && is_trivial_deref_cast(function, parent)
        {
            target = expect_deref(function, parent)
                .kind
                .parent()
                .expect("cast without a parent");
        }

        function.rewrite_uses(deref, target);
        function.remove_instruction(deref);

        tracing::trace!(?deref, ?target, "removed zero ptr_as_array");
        return true;
    }

    let parent_kind = expect_deref(function, parent).kind;
    let (grandparent, parent_index) = match parent_kind {
        DerefKind::Array { parent, index } | DerefKind::PtrAsArray { parent, index } => {
            (parent, index)
        }
        _ => return false,
    };

    let new_index = Builder::before(function, deref).iadd(parent_index, index);
    let fused = match parent_kind {
        DerefKind::Array { .. } => DerefKind::Array {
            parent: grandparent,
            index: new_index,
        },
        _ => DerefKind::PtrAsArray {
            parent: grandparent,
            index: new_index,
        },
    };

    let mut folded = expect_deref(function, deref).clone();
    folded.kind = fused;
    function.replace_instruction(deref, Instruction::Deref(folded));

    tracing::trace!(?deref, kind = fused.name(), "folded ptr_as_array into its parent");
    true
}

/// One forward sweep over every deref of the function
fn opt_deref_sweep(function: &mut Function) -> bool {
    let mut progress = false;

    for block in function.block_order() {
        for instr in function.blocks[block].instructions.clone() {
            if !function.is_live(instr) {
                continue;
            }

            let changed = match function.deref(instr).map(|d| d.kind) {
                Some(DerefKind::PtrAsArray { .. }) => opt_deref_ptr_as_array(function, instr),
                Some(DerefKind::Cast { .. }) => opt_deref_cast(function, instr),
                _ => false,
            };

            progress |= changed;
        }
    }

    progress
}

/// Runs the cast and `PtrAsArray` peepholes until nothing changes
pub fn opt_deref_in_function(function: &mut Function) -> bool {
    let mut progress = false;
    while opt_deref_sweep(function) {
        progress = true;
    }

    if progress {
        tracing::debug!(function = %function.name, "opt_deref made progress");
        function.preserve_metadata(PRESERVED_METADATA);
    } else {
        #[cfg(feature = "debug-metadata")]
        function.valid_metadata.remove(Metadata::NOT_PROPERLY_RESET);
    }

    progress
}

pub fn opt_deref(shader: &mut Shader) -> bool {
    for_each_function(shader, opt_deref_in_function)
}
