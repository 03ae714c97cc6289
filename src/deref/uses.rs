use crate::ir::{DerefKind, Function, InstrId, Instruction, Slot, Use, User};

enum UseKind {
    Simple,
    /// A further struct or array step, whose own uses decide
    Descend(InstrId),
    Complex,
}

fn classify_use(function: &Function, usage: Use) -> UseKind {
    let User::Instruction(user) = usage.user else {
        // Branching on a pointer, or returning one
        return UseKind::Complex;
    };

    match function.instruction(user) {
        Instruction::Deref(user_deref) => {
            // A var deref has no sources
            debug_assert!(!user_deref.kind.is_var());

            // Showing up as an array index or anything but the parent is
            // opaque
            if usage.slot != Slot::Parent {
                return UseKind::Complex;
            }

            // Casts and ptr_as_array are complex. `opt_deref` turns the
            // simple ptr_as_array derefs into regular array derefs, so a
            // later run picks those up.
            match user_deref.kind {
                DerefKind::Struct { .. }
                | DerefKind::Array { .. }
                | DerefKind::ArrayWildcard { .. } => UseKind::Descend(user),
                _ => UseKind::Complex,
            }
        }
        Instruction::LoadDeref { .. } => {
            debug_assert_eq!(usage.slot, Slot::Address);
            UseKind::Simple
        }
        Instruction::CopyDeref { .. } => UseKind::Simple,
        // Writing the pointer itself into memory lets it escape to
        // whoever reads that memory later
        Instruction::StoreDeref { .. } if usage.slot != Slot::Address => UseKind::Complex,
        Instruction::StoreDeref { .. } => UseKind::Simple,
        _ => UseKind::Complex,
    }
}

/// Whether the result of `deref` is used by anything other than further
/// struct/array derefs and plain loads, stores and copies through it.
///
/// Passes that want to reason about every access to a variable use this to
/// bail out as soon as a pointer escapes somewhere they can't follow.
pub fn has_complex_use(function: &Function, deref: InstrId) -> bool {
    let mut worklist = vec![deref];

    while let Some(deref) = worklist.pop() {
        for usage in function.uses_of(deref) {
            match classify_use(function, usage) {
                UseKind::Simple => {}
                UseKind::Descend(user) => worklist.push(user),
                UseKind::Complex => return true,
            }
        }
    }

    false
}

/// Like [`has_complex_use`] but lists every operand that made the use
/// complex, in the order the walk meets them. Handy when a pass wants to
/// report why it bailed.
pub fn complex_uses(function: &Function, deref: InstrId) -> Vec<(User, Slot)> {
    debug_assert!(function.is_deref(deref));

    let mut found = Vec::new();
    let mut worklist = vec![deref];

    while let Some(deref) = worklist.pop() {
        for usage in function.uses_of(deref) {
            match classify_use(function, usage) {
                UseKind::Simple => {}
                UseKind::Descend(user) => worklist.push(user),
                UseKind::Complex => found.push((usage.user, usage.slot)),
            }
        }
    }

    found
}
