use crate::{
    deref::{ancestors, expect_deref, parent},
    ir::{DerefKind, Function, InstrId},
};

/// Whether the chain ending at `deref` contains a cast or a dynamically
/// indexed step anywhere below its variable.
pub fn has_indirect(function: &Function, deref: InstrId) -> bool {
    ancestors(function, deref).any(|d| match expect_deref(function, d).kind {
        // Casts count as indirects
        DerefKind::Cast { .. } => true,
        DerefKind::Array { index, .. } | DerefKind::PtrAsArray { index, .. } => {
            !function.is_const(index)
        }
        _ => false,
    })
}

/// Whether some array step of the chain uses a constant index past the end
/// of the array it indexes.
pub fn is_known_out_of_bounds(function: &Function, deref: InstrId) -> bool {
    ancestors(function, deref).any(|d| {
        let DerefKind::Array { index, .. } = expect_deref(function, d).kind else {
            return false;
        };
        let (Some(index), Some(array)) = (function.as_const(index), parent(function, d)) else {
            return false;
        };

        index >= u64::from(expect_deref(function, array).ty.length())
    })
}

/// The element stride a `PtrAsArray` step advances by. It is inherited from
/// whatever the step's pointer came from: the array that was indexed, an
/// earlier `PtrAsArray`, or the stride declared on a cast.
pub fn ptr_as_array_stride(function: &Function, deref: InstrId) -> u32 {
    debug_assert!(expect_deref(function, deref).kind.is_ptr_as_array());

    let source = parent(function, deref).expect("ptr_as_array deref without a parent deref");

    match expect_deref(function, source).kind {
        DerefKind::Array { .. } => {
            let array = parent(function, source).expect("array deref without a parent deref");
            expect_deref(function, array).ty.explicit_stride()
        }
        DerefKind::PtrAsArray { .. } => ptr_as_array_stride(function, source),
        DerefKind::Cast { ptr_stride, .. } => ptr_stride,
        kind => unreachable!("invalid parent for ptr_as_array deref: {}", kind.name()),
    }
}
