//! Structural checks of the deref invariants the analyses and passes rely on.
//! Passes never call these themselves; they are meant for tests and for
//! drivers that want to validate the IR between passes.

use thiserror::Error;

use crate::{
    index::Index,
    intern::InternedSymbol,
    ir::{BlockId, DerefKind, Function, InstrId, Shader, Slot, Type, User, VariableId},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    /// An operand names an instruction that has been removed
    #[error("{user:?} reads %{}, which is no longer in any block", .value.index())]
    DeadOperand { user: User, value: InstrId },

    #[error("deref %{} names undeclared variable {variable:?}", .deref.index())]
    UnknownVariable {
        deref: InstrId,
        variable: VariableId,
    },

    /// Only casts may start from a value that is not a deref. Any other
    /// deref has to sit on top of a chain ending in a variable or a cast.
    #[error("parent %{} of {kind} deref %{} is not a deref", .parent.index(), .deref.index())]
    ParentNotDeref {
        deref: InstrId,
        parent: InstrId,
        kind: &'static str,
    },

    #[error("struct deref %{} selects field {field} of non-struct type {ty}", .deref.index())]
    NotAStruct { deref: InstrId, field: u32, ty: Type },

    #[error("struct deref %{} selects field {field}, but {ty} has no such field", .deref.index())]
    MissingField { deref: InstrId, field: u32, ty: Type },

    #[error("{kind} deref %{} indexes non-array type {ty}", .deref.index())]
    NotAnArray {
        deref: InstrId,
        kind: &'static str,
        ty: Type,
    },

    #[error("index %{} of deref %{} is itself a deref", .index.index(), .deref.index())]
    IndexIsDeref { deref: InstrId, index: InstrId },

    /// Only reported when [`VerifyOptions::require_block_local`] is set
    #[error("{user:?} in {block} uses deref %{} defined in another block", .value.index())]
    NotBlockLocal {
        user: User,
        block: BlockId,
        value: InstrId,
    },

    #[error("branch at the end of {block} has deref %{} as its condition", .condition.index())]
    DerefCondition { block: BlockId, condition: InstrId },

    #[error("in function {function}: {source}")]
    InFunction {
        function: InternedSymbol,
        #[source]
        source: Box<VerifyError>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Require every use of a deref to be in the block defining it, which is
    /// what rematerialization guarantees. Phi sources are exempt.
    pub require_block_local: bool,
}

pub fn verify_function(
    shader: &Shader,
    function: &Function,
    options: VerifyOptions,
) -> Result<(), VerifyError> {
    for instr in function.live_instructions() {
        for (_, value) in function.instruction(instr).operands() {
            if !function.is_live(value) {
                return Err(VerifyError::DeadOperand {
                    user: User::Instruction(instr),
                    value,
                });
            }
        }

        if let Some(deref) = function.deref(instr) {
            verify_deref(shader, function, instr, deref.kind)?;
        }

        if options.require_block_local && !function.instruction(instr).is_phi() {
            for (_, value) in function.instruction(instr).operands() {
                verify_block_local(function, User::Instruction(instr), value)?;
            }
        }
    }

    for block in function.blocks.iter() {
        for (slot, value) in block.terminator.operands() {
            if !function.is_live(value) {
                return Err(VerifyError::DeadOperand {
                    user: User::Terminator(block.id),
                    value,
                });
            }

            if !function.is_deref(value) {
                continue;
            }

            if slot == Slot::Condition {
                return Err(VerifyError::DerefCondition {
                    block: block.id,
                    condition: value,
                });
            }

            if options.require_block_local {
                verify_block_local(function, User::Terminator(block.id), value)?;
            }
        }
    }

    Ok(())
}

fn verify_deref(
    shader: &Shader,
    function: &Function,
    deref: InstrId,
    kind: DerefKind,
) -> Result<(), VerifyError> {
    let parent = match kind {
        DerefKind::Var(variable) => {
            if shader.variables.get(variable).is_none() {
                return Err(VerifyError::UnknownVariable { deref, variable });
            }
            return Ok(());
        }
        DerefKind::Cast { .. } => return Ok(()),
        kind => kind.parent().expect("non-root deref without a parent"),
    };

    let Some(parent_deref) = function.deref(parent) else {
        return Err(VerifyError::ParentNotDeref {
            deref,
            parent,
            kind: kind.name(),
        });
    };
    let parent_ty = &parent_deref.ty;

    match kind {
        DerefKind::Struct { field, .. } => {
            if !parent_ty.is_struct() {
                return Err(VerifyError::NotAStruct {
                    deref,
                    field,
                    ty: parent_ty.clone(),
                });
            }
            if parent_ty.struct_field(field).is_none() {
                return Err(VerifyError::MissingField {
                    deref,
                    field,
                    ty: parent_ty.clone(),
                });
            }
        }
        DerefKind::Array { .. } | DerefKind::ArrayWildcard { .. } if !parent_ty.is_array() => {
            return Err(VerifyError::NotAnArray {
                deref,
                kind: kind.name(),
                ty: parent_ty.clone(),
            });
        }
        _ => {}
    }

    match kind.index() {
        Some(index) if function.is_deref(index) => {
            Err(VerifyError::IndexIsDeref { deref, index })
        }
        _ => Ok(()),
    }
}

fn verify_block_local(function: &Function, user: User, value: InstrId) -> Result<(), VerifyError> {
    if !function.is_deref(value) {
        return Ok(());
    }

    let block = match user {
        User::Instruction(id) => function.block_of(id).expect("user is not in a block"),
        User::Terminator(block) => block,
    };

    if function.block_of(value) != Some(block) {
        return Err(VerifyError::NotBlockLocal { user, block, value });
    }

    Ok(())
}

pub fn verify_shader(shader: &Shader, options: VerifyOptions) -> Result<(), VerifyError> {
    for function in shader.functions.iter() {
        verify_function(shader, function, options).map_err(|error| VerifyError::InFunction {
            function: function.name,
            source: Box::new(error),
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Builder, StructField, Terminator, Use, VariableMode},
        test_util::TestShader,
    };

    #[test]
    fn well_formed_chains_pass() {
        let ty = Type::structure(
            "S",
            vec![StructField::new("a", Type::array(Type::float(32), 4))],
        );
        let mut t = TestShader::new();
        let v = t.variable("s", VariableMode::MemSsbo, ty);
        let root = t.var(v);
        let mut b = t.builder();
        let field = b.deref_struct(root, 0);
        let i = b.parameter(0, 32);
        let elem = b.deref_array(field, i);
        let ptr = b.parameter(1, 64);
        let cast = b.deref_cast(ptr, VariableMode::MemGlobal, Type::float(32), 4);
        let value = b.load_deref(cast);
        b.store_deref(elem, value);

        assert_eq!(verify_shader(&t.shader, VerifyOptions::default()), Ok(()));
    }

    fn reparent(t: &mut TestShader, deref: InstrId, parent: InstrId) {
        t.function_mut().rewrite_operand(
            Use {
                user: User::Instruction(deref),
                slot: Slot::Parent,
            },
            parent,
        );
    }

    #[test]
    fn array_step_on_non_array_parent() {
        let mut t = TestShader::new();
        let scalar = t.variable("x", VariableMode::FunctionTemp, Type::float(32));
        let array = t.variable("a", VariableMode::FunctionTemp, Type::array(Type::float(32), 2));
        let x = t.var(scalar);
        let a = t.var(array);
        let elem = t.builder().deref_array_imm(a, 1);
        reparent(&mut t, elem, x);

        assert_eq!(
            verify_function(&t.shader, t.function(), VerifyOptions::default()),
            Err(VerifyError::NotAnArray {
                deref: elem,
                kind: "array",
                ty: Type::float(32),
            })
        );
    }

    #[test]
    fn struct_field_out_of_range() {
        let ty = Type::structure("S", vec![StructField::new("a", Type::float(32))]);
        let mut t = TestShader::new();
        let v = t.variable("s", VariableMode::FunctionTemp, ty.clone());
        let root = t.var(v);
        let field = t.builder().deref_struct(root, 0);
        t.function_mut().deref_mut(field).unwrap().kind = DerefKind::Struct {
            parent: root,
            field: 3,
        };

        assert_eq!(
            verify_function(&t.shader, t.function(), VerifyOptions::default()),
            Err(VerifyError::MissingField {
                deref: field,
                field: 3,
                ty,
            })
        );
    }

    #[test]
    fn non_cast_deref_of_plain_value() {
        let mut t = TestShader::new();
        let mut b = t.builder();
        let ptr = b.parameter(0, 64);
        let cast = b.deref_cast(ptr, VariableMode::MemGlobal, Type::float(32), 4);
        let one = b.constant(1, 32);
        let step = b.deref_ptr_as_array(cast, one);
        reparent(&mut t, step, ptr);

        let error = verify_function(&t.shader, t.function(), VerifyOptions::default()).unwrap_err();
        assert_eq!(
            error,
            VerifyError::ParentNotDeref {
                deref: step,
                parent: ptr,
                kind: "ptr_as_array",
            }
        );
        assert_eq!(
            error.to_string(),
            format!(
                "parent %{} of ptr_as_array deref %{} is not a deref",
                ptr.index(),
                step.index()
            )
        );
    }

    #[test]
    fn variables_must_be_declared() {
        let mut function = Function::new("f");
        let var = Builder::at_end(&mut function, BlockId::ENTRY).deref_var(
            VariableId::new(4),
            VariableMode::ShaderIn,
            Type::float(32),
        );

        assert_eq!(
            verify_function(&Shader::new("s"), &function, VerifyOptions::default()),
            Err(VerifyError::UnknownVariable {
                deref: var,
                variable: VariableId::new(4),
            })
        );
    }

    #[test]
    fn block_locality_is_opt_in() {
        let mut t = TestShader::new();
        let v = t.variable("x", VariableMode::FunctionTemp, Type::float(32));
        let next = t.block();
        t.function_mut()
            .set_terminator(BlockId::ENTRY, Terminator::Jump { destination: next });
        let root = t.var(v);
        let load = t.builder_at(next).load_deref(root);

        assert_eq!(verify_function(&t.shader, t.function(), VerifyOptions::default()), Ok(()));
        assert_eq!(
            verify_function(
                &t.shader,
                t.function(),
                VerifyOptions {
                    require_block_local: true
                }
            ),
            Err(VerifyError::NotBlockLocal {
                user: User::Instruction(load),
                block: next,
                value: root,
            })
        );
    }

    #[test]
    fn deref_branch_condition() {
        let mut t = TestShader::new();
        let v = t.variable("x", VariableMode::FunctionTemp, Type::bool());
        let next = t.block();
        let root = t.var(v);
        t.function_mut().set_terminator(
            BlockId::ENTRY,
            Terminator::Branch {
                condition: root,
                positive: next,
                negative: next,
            },
        );

        let error = verify_shader(&t.shader, VerifyOptions::default()).unwrap_err();
        let VerifyError::InFunction { function, source } = error else {
            panic!("expected the function to be named");
        };
        assert_eq!(function.value(), "main");
        assert_eq!(
            *source,
            VerifyError::DerefCondition {
                block: BlockId::ENTRY,
                condition: root,
            }
        );
    }

    #[test]
    fn removed_operands_are_reported() {
        let mut function = Function::new("f");
        let mut b = Builder::at_end(&mut function, BlockId::ENTRY);
        let a = b.constant(1, 32);
        let sum = b.iadd(a, a);
        function.remove_instruction(a);

        let shader = Shader::new("s");
        assert_eq!(
            verify_function(&shader, &function, VerifyOptions::default()),
            Err(VerifyError::DeadOperand {
                user: User::Instruction(sum),
                value: a,
            })
        );
    }

    #[test]
    fn terminators_reading_removed_values_are_reported() {
        let mut function = Function::new("f");
        let value = Builder::at_end(&mut function, BlockId::ENTRY).constant(7, 32);
        function.set_terminator(BlockId::ENTRY, Terminator::Return { value: Some(value) });
        function.remove_instruction(value);

        let error =
            verify_function(&Shader::new("s"), &function, VerifyOptions::default()).unwrap_err();
        assert_eq!(
            error,
            VerifyError::DeadOperand {
                user: User::Terminator(BlockId::ENTRY),
                value,
            }
        );
        assert_eq!(
            error.to_string(),
            format!(
                "Terminator(BlockId(0)) reads %{}, which is no longer in any block",
                value.index()
            )
        );
    }
}
