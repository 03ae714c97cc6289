//! Re-materializes derefs in every block they are used in. Afterwards every
//! use of a deref reads a deref defined in the same block, and derefs left
//! without uses have been deleted. Derefs feeding phis are left alone since
//! the copies would have to come before the phi.

use hashbrown::HashMap;

use crate::{
    deref::{self, expect_deref},
    ir::{BlockId, Builder, Cursor, Function, InstrId, Slot, Use, User},
    optimization::{PRESERVED_METADATA, dead_derefs::remove_if_unused},
};

struct RematerializeState {
    block: BlockId,
    /// Original deref to its copy in `block`
    cache: HashMap<InstrId, InstrId>,
    progress: bool,
}

impl RematerializeState {
    fn enter_block(&mut self, block: BlockId) {
        self.block = block;
        self.cache.clear();
    }
}

/// Returns a deref equivalent to `deref` that is defined in the current
/// block, copying the chain in front of `cursor` where needed.
fn rematerialize_deref_in_block(
    function: &mut Function,
    state: &mut RematerializeState,
    cursor: Cursor,
    deref: InstrId,
) -> InstrId {
    // Climb until reaching a step that is already available in this block
    let mut missing = Vec::new();
    let mut base = None;
    for step in deref::ancestors(function, deref) {
        if function.block_of(step) == Some(state.block) {
            base = Some(step);
            break;
        }

        if let Some(&cached) = state.cache.get(&step) {
            base = Some(cached);
            break;
        }

        missing.push(step);
    }

    for original in missing.into_iter().rev() {
        let mut copy = expect_deref(function, original).clone();

        // Casts of plain pointers keep reading the original value
        if let Some(parent) = base {
            copy.kind = copy.kind.with_parent(parent);
        }

        debug_assert!(copy.kind.index().is_none_or(|index| !function.is_deref(index)));

        let copy = Builder::new(function, cursor).deref(copy);
        state.cache.insert(original, copy);
        base = Some(copy);

        tracing::trace!(?original, ?copy, block = ?state.block, "rematerialized deref");
    }

    base.expect("deref chain without a root")
}

fn rematerialize_operand(
    function: &mut Function,
    state: &mut RematerializeState,
    cursor: Cursor,
    usage: Use,
    value: InstrId,
) {
    if !function.is_deref(value) {
        return;
    }

    let local = rematerialize_deref_in_block(function, state, cursor, value);
    if local != value {
        function.rewrite_operand(usage, local);
        remove_if_unused(function, value);
        state.progress = true;
    }
}

fn rematerialize_block(function: &mut Function, state: &mut RematerializeState, block: BlockId) {
    state.enter_block(block);

    for instr in function.blocks[block].instructions.clone() {
        if !function.is_live(instr) {
            continue;
        }

        if function.is_deref(instr) && remove_if_unused(function, instr) {
            continue;
        }

        if function.instruction(instr).is_phi() {
            continue;
        }

        for (slot, value) in function.instruction(instr).operands() {
            let usage = Use {
                user: User::Instruction(instr),
                slot,
            };
            rematerialize_operand(function, state, Cursor::Before(instr), usage, value);
        }
    }

    for (slot, value) in function.blocks[block].terminator.operands() {
        match slot {
            Slot::Condition => debug_assert!(
                !function.is_deref(value),
                "branch condition of {block:?} is a deref"
            ),
            _ => {
                let usage = Use {
                    user: User::Terminator(block),
                    slot,
                };
                rematerialize_operand(function, state, Cursor::End(block), usage, value);
            }
        }
    }
}

pub fn rematerialize_derefs_in_use_blocks(function: &mut Function) -> bool {
    let mut state = RematerializeState {
        block: BlockId::ENTRY,
        cache: HashMap::new(),
        progress: false,
    };

    for block in function.block_order() {
        rematerialize_block(function, &mut state, block);
    }

    if state.progress {
        tracing::debug!(function = %function.name, "rematerialized derefs in use blocks");
        function.preserve_metadata(PRESERVED_METADATA);
    }

    state.progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Instruction, StructField, Terminator, Type, VariableMode},
        test_util::TestShader,
        verify::{VerifyOptions, verify_function},
    };

    fn block_local() -> VerifyOptions {
        VerifyOptions {
            require_block_local: true,
        }
    }

    fn record_type() -> Type {
        Type::structure(
            "Record",
            vec![
                StructField::new("values", Type::array(Type::uint(32), 16)),
                StructField::new("count", Type::uint(32)),
            ],
        )
    }

    #[test]
    fn deep_chains_are_copied() {
        const DEPTH: usize = 3000;

        let mut t = TestShader::new();
        let v = t.variable("x", VariableMode::FunctionTemp, Type::array(Type::float(32), 4));
        let next = t.block();
        t.function_mut()
            .set_terminator(BlockId::ENTRY, Terminator::Jump { destination: next });

        let root = t.var(v);
        let leaf = t.deep_array_chain(BlockId::ENTRY, root, DEPTH);
        let load = t.builder_at(next).load_deref(leaf);

        assert!(rematerialize_derefs_in_use_blocks(t.function_mut()));

        let function = t.function();
        let Instruction::LoadDeref { address } = *function.instruction(load) else {
            unreachable!();
        };
        let path = deref::DerefPath::new(function, address);
        assert_eq!(path.len(), DEPTH + 1);
        assert!(path.iter().all(|step| function.block_of(step) == Some(next)));
        assert!(!function.is_live(root));
        assert!(!function.is_live(leaf));

        assert_eq!(verify_function(&t.shader, t.function(), block_local()), Ok(()));
    }

    #[test]
    fn copies_chain_into_using_block() {
        let mut t = TestShader::new();
        let v = t.variable("r", VariableMode::MemSsbo, record_type());
        let next = t.block();
        t.function_mut()
            .set_terminator(BlockId::ENTRY, Terminator::Jump { destination: next });

        let root = t.var(v);
        let mut b = t.builder();
        let i = b.parameter(0, 32);
        let values = b.deref_struct(root, 0);
        let elem = b.deref_array(values, i);
        let load = t.builder_at(next).load_deref(elem);

        assert!(rematerialize_derefs_in_use_blocks(t.function_mut()));

        let function = t.function();
        // The originals lost their only use and were collected
        assert!(!function.is_live(root));
        assert!(!function.is_live(values));
        assert!(!function.is_live(elem));
        assert!(function.is_live(i));

        let Instruction::LoadDeref { address } = *function.instruction(load) else {
            unreachable!();
        };
        let path = deref::DerefPath::new(function, address);
        assert_eq!(path.len(), 3);
        for step in path.iter() {
            assert_eq!(function.block_of(step), Some(next));
        }
        assert_eq!(function.blocks[next].instructions.len(), 4);
        assert_eq!(expect_deref(function, address).kind.index(), Some(i));

        assert_eq!(verify_function(&t.shader, t.function(), block_local()), Ok(()));
    }

    #[test]
    fn clones_are_shared_within_a_block() {
        let mut t = TestShader::new();
        let v = t.variable("r", VariableMode::MemSsbo, record_type());
        let next = t.block();
        t.function_mut()
            .set_terminator(BlockId::ENTRY, Terminator::Jump { destination: next });

        let root = t.var(v);
        let count = t.builder().deref_struct(root, 1);
        let values = t.builder().deref_struct(root, 0);
        let mut b = t.builder_at(next);
        let loaded = b.load_deref(count);
        let first = b.deref_array_imm(values, 0);
        b.store_deref(first, loaded);
        b.store_deref(count, loaded);

        assert!(rematerialize_derefs_in_use_blocks(t.function_mut()));

        let function = t.function();
        let vars = function.blocks[next]
            .instructions
            .iter()
            .filter(|&&id| function.deref(id).is_some_and(|d| d.kind.is_var()))
            .count();
        let counts = function.blocks[next]
            .instructions
            .iter()
            .filter(|&&id| function.deref(id).is_some_and(|d| d.kind.is_struct()))
            .count();
        assert_eq!(vars, 1);
        assert_eq!(counts, 2);
        assert!(function.blocks[BlockId::ENTRY].instructions.is_empty());

        assert_eq!(verify_function(&t.shader, t.function(), block_local()), Ok(()));
    }

    #[test]
    fn each_block_gets_its_own_copy() {
        let mut t = TestShader::new();
        let v = t.variable("x", VariableMode::FunctionTemp, Type::float(32));
        let left = t.block();
        let right = t.block();
        let cond = t.builder().parameter(0, 1);
        t.function_mut().set_terminator(
            BlockId::ENTRY,
            Terminator::Branch {
                condition: cond,
                positive: left,
                negative: right,
            },
        );

        let root = t.var(v);
        let left_load = t.builder_at(left).load_deref(root);
        let right_load = t.builder_at(right).load_deref(root);

        assert!(rematerialize_derefs_in_use_blocks(t.function_mut()));

        let function = t.function();
        let address = |load| match *function.instruction(load) {
            Instruction::LoadDeref { address } => address,
            _ => unreachable!(),
        };
        assert_eq!(function.block_of(address(left_load)), Some(left));
        assert_eq!(function.block_of(address(right_load)), Some(right));
        assert!(!function.is_live(root));
    }

    #[test]
    fn phi_sources_are_left_in_place() {
        let mut t = TestShader::new();
        let v = t.variable("x", VariableMode::FunctionTemp, Type::float(32));
        let next = t.block();
        t.function_mut()
            .set_terminator(BlockId::ENTRY, Terminator::Jump { destination: next });

        let root = t.var(v);
        let phi = t.builder_at(next).phi(vec![(BlockId::ENTRY, root)]);

        assert!(!rematerialize_derefs_in_use_blocks(t.function_mut()));
        assert!(t.function().is_live(root));
        assert_eq!(
            t.function().instruction(phi),
            &Instruction::Phi {
                sources: vec![(BlockId::ENTRY, root)]
            }
        );
    }

    #[test]
    fn returned_derefs_are_copied_before_the_terminator() {
        let mut t = TestShader::new();
        let v = t.variable("x", VariableMode::MemShared, Type::float(32));
        let next = t.block();
        t.function_mut()
            .set_terminator(BlockId::ENTRY, Terminator::Jump { destination: next });
        let root = t.var(v);
        t.function_mut()
            .set_terminator(next, Terminator::Return { value: Some(root) });

        assert!(rematerialize_derefs_in_use_blocks(t.function_mut()));

        let function = t.function();
        let Terminator::Return { value: Some(value) } = function.blocks[next].terminator else {
            unreachable!();
        };
        assert_ne!(value, root);
        assert_eq!(function.blocks[next].instructions, vec![value]);
        assert!(!function.is_live(root));
    }

    #[test]
    fn dead_derefs_are_collected_and_local_uses_untouched() {
        let mut t = TestShader::new();
        let v = t.variable("x", VariableMode::FunctionTemp, Type::array(Type::float(32), 2));
        let root = t.var(v);
        let mut b = t.builder();
        let dead = b.deref_array_imm(root, 1);
        let live = b.deref_array_imm(root, 0);
        b.load_deref(live);

        assert!(!rematerialize_derefs_in_use_blocks(t.function_mut()));
        assert!(!t.function().is_live(dead));
        assert!(t.function().is_live(live));
        assert!(t.function().is_live(root));
    }
}
