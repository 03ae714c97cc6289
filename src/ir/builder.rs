use crate::ir::{
    BinaryOperator, BlockId, Deref, DerefKind, Function, InstrId, Instruction, Type, Variable,
    VariableId, VariableMode,
};

/// Where the [`Builder`] puts the next instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Immediately before an existing (live) instruction
    Before(InstrId),
    /// After the last instruction of a block, ahead of its terminator
    End(BlockId),
}

/// Inserts instructions into a function at a movable cursor. Deref helpers
/// derive the mode of the new deref from its parent the same way the
/// front-end would.
pub struct Builder<'f> {
    function: &'f mut Function,
    pub cursor: Cursor,
}

impl<'f> Builder<'f> {
    pub fn new(function: &'f mut Function, cursor: Cursor) -> Self {
        Self { function, cursor }
    }

    pub fn at_end(function: &'f mut Function, block: BlockId) -> Self {
        Self::new(function, Cursor::End(block))
    }

    pub fn before(function: &'f mut Function, anchor: InstrId) -> Self {
        Self::new(function, Cursor::Before(anchor))
    }

    pub fn function(&self) -> &Function {
        &*self.function
    }

    pub fn function_mut(&mut self) -> &mut Function {
        &mut *self.function
    }

    pub fn insert(&mut self, instruction: Instruction) -> InstrId {
        match self.cursor {
            Cursor::Before(anchor) => self.function.insert_instruction_before(anchor, instruction),
            Cursor::End(block) => self.function.append_instruction(block, instruction),
        }
    }

    pub fn constant(&mut self, value: u64, bit_size: u8) -> InstrId {
        self.insert(Instruction::Constant { value, bit_size })
    }

    pub fn parameter(&mut self, index: u32, bit_size: u8) -> InstrId {
        self.insert(Instruction::Parameter { index, bit_size })
    }

    pub fn binary(&mut self, operator: BinaryOperator, lhs: InstrId, rhs: InstrId) -> InstrId {
        self.insert(Instruction::BinaryOperation { operator, lhs, rhs })
    }

    pub fn iadd(&mut self, lhs: InstrId, rhs: InstrId) -> InstrId {
        self.binary(BinaryOperator::Add, lhs, rhs)
    }

    pub fn imul(&mut self, lhs: InstrId, rhs: InstrId) -> InstrId {
        self.binary(BinaryOperator::Multiply, lhs, rhs)
    }

    pub fn load_deref(&mut self, address: InstrId) -> InstrId {
        self.insert(Instruction::LoadDeref { address })
    }

    pub fn store_deref(&mut self, address: InstrId, value: InstrId) -> InstrId {
        self.insert(Instruction::StoreDeref { address, value })
    }

    pub fn copy_deref(&mut self, destination: InstrId, source: InstrId) -> InstrId {
        self.insert(Instruction::CopyDeref {
            destination,
            source,
        })
    }

    pub fn phi(&mut self, sources: Vec<(BlockId, InstrId)>) -> InstrId {
        self.insert(Instruction::Phi { sources })
    }

    pub fn deref(&mut self, deref: Deref) -> InstrId {
        self.insert(Instruction::Deref(deref))
    }

    pub fn deref_var(&mut self, variable: VariableId, mode: VariableMode, ty: Type) -> InstrId {
        self.deref(Deref {
            kind: DerefKind::Var(variable),
            mode,
            ty,
            num_components: 1,
            bit_size: 32,
        })
    }

    pub fn deref_variable(&mut self, id: VariableId, variable: &Variable) -> InstrId {
        self.deref_var(id, variable.mode, variable.ty.clone())
    }

    /// Builds a child deref of `parent` with the parent's mode and SSA shape
    fn deref_child(&mut self, parent: InstrId, kind: DerefKind, ty: Type) -> InstrId {
        let parent = self
            .function
            .deref(parent)
            .expect("parent of a deref must be a deref");

        let deref = Deref {
            kind,
            mode: parent.mode,
            ty,
            num_components: parent.num_components,
            bit_size: parent.bit_size,
        };
        self.deref(deref)
    }

    fn parent_type(&self, parent: InstrId) -> Type {
        self.function
            .deref(parent)
            .expect("parent of a deref must be a deref")
            .ty
            .clone()
    }

    pub fn deref_array(&mut self, parent: InstrId, index: InstrId) -> InstrId {
        let parent_ty = self.parent_type(parent);
        let ty = parent_ty
            .array_element()
            .cloned()
            .unwrap_or_else(|| panic!("array deref of non-array type {parent_ty}"));

        self.deref_child(parent, DerefKind::Array { parent, index }, ty)
    }

    pub fn deref_array_imm(&mut self, parent: InstrId, index: u64) -> InstrId {
        let index = self.constant(index, 32);
        self.deref_array(parent, index)
    }

    pub fn deref_array_wildcard(&mut self, parent: InstrId) -> InstrId {
        let parent_ty = self.parent_type(parent);
        let ty = parent_ty
            .array_element()
            .cloned()
            .unwrap_or_else(|| panic!("array wildcard deref of non-array type {parent_ty}"));

        self.deref_child(parent, DerefKind::ArrayWildcard { parent }, ty)
    }

    pub fn deref_struct(&mut self, parent: InstrId, field: u32) -> InstrId {
        let parent_ty = self.parent_type(parent);
        let ty = parent_ty
            .struct_field(field)
            .map(|f| f.ty.clone())
            .unwrap_or_else(|| panic!("struct deref of field {field} on {parent_ty}"));

        self.deref_child(parent, DerefKind::Struct { parent, field }, ty)
    }

    /// A pointer-as-array step keeps the type of the pointer it advances
    pub fn deref_ptr_as_array(&mut self, parent: InstrId, index: InstrId) -> InstrId {
        let ty = self.parent_type(parent);
        self.deref_child(parent, DerefKind::PtrAsArray { parent, index }, ty)
    }

    /// Casts `parent`, which does not have to be a deref, to a pointer to `ty`
    pub fn deref_cast(
        &mut self,
        parent: InstrId,
        mode: VariableMode,
        ty: Type,
        ptr_stride: u32,
    ) -> InstrId {
        let (num_components, bit_size) = match self.function.deref(parent) {
            Some(parent) => (parent.num_components, parent.bit_size),
            None => (1, 32),
        };

        self.deref(Deref {
            kind: DerefKind::Cast { parent, ptr_stride },
            mode,
            ty,
            num_components,
            bit_size,
        })
    }
}
