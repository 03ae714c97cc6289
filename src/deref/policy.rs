//! Address space rules used by the comparator. These are kept apart from the
//! chain walk since they encode language level policy rather than structure.

use crate::{
    deref::{DerefPath, expect_deref},
    ir::{Access, DerefKind, Function, Shader, VariableMode},
};

/// Whether pointers into `a` and `b` can ever reference the same memory.
pub fn modes_may_alias(a: VariableMode, b: VariableMode) -> bool {
    use VariableMode::*;

    // Generic pointers can alias with SSBOs
    if matches!(a, MemSsbo | MemGlobal) && matches!(b, MemSsbo | MemGlobal) {
        return true;
    }

    // Otherwise pointers can only alias within the same mode. This would need
    // to change for something like OpenCL generic pointers.
    a == b
}

/// Whether two distinct variables of these modes are known to live in
/// different storage.
pub fn distinct_variables_never_alias(a: VariableMode, b: VariableMode) -> bool {
    a.is_temporary() || b.is_temporary()
}

/// Whether the variable at the root of `path`, or any struct member the path
/// selects, was declared `coherent`.
///
/// The path must be rooted at a variable.
pub fn path_contains_coherent_decoration(
    shader: &Shader,
    function: &Function,
    path: &DerefPath,
) -> bool {
    let DerefKind::Var(variable) = expect_deref(function, path.root()).kind else {
        unreachable!("coherent decorations are only tracked on variable rooted paths");
    };

    if shader.variables[variable].access.contains(Access::COHERENT) {
        return true;
    }

    path.as_slice().windows(2).any(|pair| {
        let DerefKind::Struct { field, .. } = expect_deref(function, pair[1]).kind else {
            return false;
        };

        expect_deref(function, pair[0])
            .ty
            .struct_field(field)
            .is_some_and(|field| field.memory_coherent)
    })
}
