use crate::{
    deref::expect_deref,
    index::IndexVec,
    ir::{DerefKind, Function, Shader, Variable, VariableId},
};

/// Re-derives the mode of every deref from the variable it starts at, for
/// use after variables have been moved between modes. Casts keep their
/// declared mode and act as a new source for the derefs below them.
pub fn fixup_deref_modes(shader: &mut Shader) -> bool {
    let Shader {
        variables,
        functions,
        ..
    } = shader;

    let mut progress = false;
    for function in functions.iter_mut() {
        progress |= fixup_deref_modes_in_function(variables, function);
    }
    progress
}

fn fixup_deref_modes_in_function(
    variables: &IndexVec<VariableId, Variable>,
    function: &mut Function,
) -> bool {
    let mut progress = false;

    for block in function.block_order() {
        for instr in function.blocks[block].instructions.clone() {
            let Some(deref) = function.deref(instr) else {
                continue;
            };

            let mode = match deref.kind {
                DerefKind::Cast { .. } => continue,
                DerefKind::Var(variable) => variables[variable].mode,
                kind => {
                    let parent = kind.parent().expect("non-root deref without a parent");
                    expect_deref(function, parent).mode
                }
            };

            let deref = function.deref_mut(instr).expect("deref changed kind");
            if deref.mode != mode {
                deref.mode = mode;
                progress = true;
            }
        }
    }

    progress
}
