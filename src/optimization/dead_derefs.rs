use crate::{
    deref,
    ir::{Function, InstrId, Shader},
    optimization::{PRESERVED_METADATA, for_each_function},
};

/// Removes `deref` if nothing uses it, then keeps walking up through its
/// parents for as long as they become unused too.
pub fn remove_if_unused(function: &mut Function, deref: InstrId) -> bool {
    let mut progress = false;
    let mut next = Some(deref);

    while let Some(d) = next {
        // If anyone is using this deref, leave it alone
        if !function.is_live(d) || function.has_uses(d) {
            break;
        }

        next = deref::parent(function, d);
        function.remove_instruction(d);
        progress = true;
    }

    progress
}

/// Removes every deref in `function` that is transitively unused.
pub fn remove_dead_derefs_in_function(function: &mut Function) -> bool {
    let mut progress = false;

    for block in function.block_order() {
        for instr in function.blocks[block].instructions.clone() {
            if function.is_live(instr)
                && function.is_deref(instr)
                && remove_if_unused(function, instr)
            {
                progress = true;
            }
        }
    }

    if progress {
        tracing::debug!(function = %function.name, "removed dead derefs");
        function.preserve_metadata(PRESERVED_METADATA);
    }

    progress
}

pub fn remove_dead_derefs(shader: &mut Shader) -> bool {
    for_each_function(shader, remove_dead_derefs_in_function)
}
