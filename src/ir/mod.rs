//! A small SSA IR for shader functions. Instructions live in a per-function
//! arena and are referenced by [`InstrId`]; every instruction defines at most
//! one SSA value which is named by the same id. Blocks only hold the program
//! order of the live instructions, so removing an instruction unlinks it from
//! its block while its data stays addressable.

use bitflags::bitflags;

use crate::{
    index::{IndexVec, simple_index},
    intern::InternedSymbol,
};

pub mod builder;
pub mod mode;
pub mod pretty_print;
pub mod ty;

pub use self::{
    builder::{Builder, Cursor},
    mode::{Access, VariableMode},
    ty::{StructField, StructType, Type, TypeKind},
};

simple_index! {
    /// Identifies an instruction (and the SSA value it defines) within a
    /// function
    pub struct InstrId;
}

simple_index! {
    /// Identifies a basic block within a function
    pub struct BlockId;
}

simple_index! {
    /// Identifies a variable declared in a shader
    pub struct VariableId;
}

simple_index! {
    /// Identifies a function within a shader
    pub struct FunctionId;
}

impl BlockId {
    pub const ENTRY: Self = Self(0);
}

#[derive(Debug, Clone)]
pub struct Shader {
    pub name: InternedSymbol,
    pub variables: IndexVec<VariableId, Variable>,
    pub functions: IndexVec<FunctionId, Function>,
}

impl Shader {
    pub fn new(name: &str) -> Self {
        Self {
            name: InternedSymbol::new(name),
            variables: IndexVec::new(),
            functions: IndexVec::new(),
        }
    }

    pub fn add_variable(&mut self, name: &str, mode: VariableMode, ty: Type) -> VariableId {
        self.variables.push(Variable {
            name: InternedSymbol::new(name),
            mode,
            ty,
            access: Access::empty(),
        })
    }

    pub fn add_function(&mut self, name: &str) -> FunctionId {
        self.functions.push(Function::new(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: InternedSymbol,
    pub mode: VariableMode,
    pub ty: Type,
    pub access: Access,
}

bitflags! {
    /// Analysis results attached to a function that passes either keep valid
    /// or invalidate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Metadata: u8 {
        const BLOCK_INDEX = 1 << 0;
        const DOMINANCE = 1 << 1;
        const LIVE_SSA_DEFS = 1 << 2;
        const LOOP_ANALYSIS = 1 << 3;
        /// Set by validation tooling to detect passes that forget to update
        /// the metadata when they make no progress
        const NOT_PROPERLY_RESET = 1 << 7;
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: InternedSymbol,
    pub instructions: IndexVec<InstrId, InstructionData>,
    pub blocks: IndexVec<BlockId, Block>,
    pub valid_metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct InstructionData {
    pub instruction: Instruction,
    /// The block this instruction is linked into, `None` once removed
    pub block: Option<BlockId>,
    /// Operands of live instructions and of terminators reading this value,
    /// in the order they were linked
    uses: Vec<Use>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub instructions: Vec<InstrId>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Deref(Deref),
    Constant {
        value: u64,
        bit_size: u8,
    },
    /// Function argument, opaque to every pass here
    Parameter {
        index: u32,
        bit_size: u8,
    },
    BinaryOperation {
        operator: BinaryOperator,
        lhs: InstrId,
        rhs: InstrId,
    },
    LoadDeref {
        address: InstrId,
    },
    StoreDeref {
        address: InstrId,
        value: InstrId,
    },
    CopyDeref {
        destination: InstrId,
        source: InstrId,
    },
    Phi {
        sources: Vec<(BlockId, InstrId)>,
    },
    Call {
        callee: InternedSymbol,
        arguments: Vec<InstrId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOperator {
    #[strum(serialize = "iadd")]
    Add,
    #[strum(serialize = "imul")]
    Multiply,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump {
        destination: BlockId,
    },
    Branch {
        condition: InstrId,
        positive: BlockId,
        negative: BlockId,
    },
    Return {
        value: Option<InstrId>,
    },
}

/// One step of a chain resolving a storage location
#[derive(Debug, Clone, PartialEq)]
pub struct Deref {
    pub kind: DerefKind,
    pub mode: VariableMode,
    pub ty: Type,
    pub num_components: u8,
    pub bit_size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefKind {
    Var(VariableId),
    /// Reinterprets `parent`, which may be any pointer valued SSA def and not
    /// just another deref
    Cast {
        parent: InstrId,
        ptr_stride: u32,
    },
    Array {
        parent: InstrId,
        index: InstrId,
    },
    ArrayWildcard {
        parent: InstrId,
    },
    Struct {
        parent: InstrId,
        field: u32,
    },
    /// Advances a pointer by `index` elements of an implicit stride
    PtrAsArray {
        parent: InstrId,
        index: InstrId,
    },
}

impl DerefKind {
    pub fn parent(&self) -> Option<InstrId> {
        match *self {
            Self::Var(_) => None,
            Self::Cast { parent, .. }
            | Self::Array { parent, .. }
            | Self::ArrayWildcard { parent }
            | Self::Struct { parent, .. }
            | Self::PtrAsArray { parent, .. } => Some(parent),
        }
    }

    pub fn index(&self) -> Option<InstrId> {
        match *self {
            Self::Array { index, .. } | Self::PtrAsArray { index, .. } => Some(index),
            _ => None,
        }
    }

    /// The same step re-parented onto `new_parent`. Variables have no parent
    /// and are returned unchanged.
    pub fn with_parent(self, new_parent: InstrId) -> Self {
        match self {
            Self::Var(_) => self,
            Self::Cast { ptr_stride, .. } => Self::Cast {
                parent: new_parent,
                ptr_stride,
            },
            Self::Array { index, .. } => Self::Array {
                parent: new_parent,
                index,
            },
            Self::ArrayWildcard { .. } => Self::ArrayWildcard { parent: new_parent },
            Self::Struct { field, .. } => Self::Struct {
                parent: new_parent,
                field,
            },
            Self::PtrAsArray { index, .. } => Self::PtrAsArray {
                parent: new_parent,
                index,
            },
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Self::Var(_))
    }

    pub fn is_cast(&self) -> bool {
        matches!(self, Self::Cast { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub fn is_array_wildcard(&self) -> bool {
        matches!(self, Self::ArrayWildcard { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct { .. })
    }

    pub fn is_ptr_as_array(&self) -> bool {
        matches!(self, Self::PtrAsArray { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Var(_) => "var",
            Self::Cast { .. } => "cast",
            Self::Array { .. } => "array",
            Self::ArrayWildcard { .. } => "array_wildcard",
            Self::Struct { .. } => "struct",
            Self::PtrAsArray { .. } => "ptr_as_array",
        }
    }
}

/// Names an operand position of an instruction or terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Parent,
    Index,
    Lhs,
    Rhs,
    Address,
    Value,
    Destination,
    Source,
    PhiSource(usize),
    Argument(usize),
    Condition,
    ReturnValue,
}

impl Instruction {
    pub fn as_deref(&self) -> Option<&Deref> {
        match self {
            Self::Deref(deref) => Some(deref),
            _ => None,
        }
    }

    pub fn as_deref_mut(&mut self) -> Option<&mut Deref> {
        match self {
            Self::Deref(deref) => Some(deref),
            _ => None,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    /// All SSA operands of this instruction in a fixed order
    pub fn operands(&self) -> Vec<(Slot, InstrId)> {
        match self {
            Self::Deref(deref) => match deref.kind {
                DerefKind::Var(_) => vec![],
                DerefKind::Cast { parent, .. }
                | DerefKind::ArrayWildcard { parent }
                | DerefKind::Struct { parent, .. } => vec![(Slot::Parent, parent)],
                DerefKind::Array { parent, index } | DerefKind::PtrAsArray { parent, index } => {
                    vec![(Slot::Parent, parent), (Slot::Index, index)]
                }
            },
            Self::Constant { .. } | Self::Parameter { .. } => vec![],
            Self::BinaryOperation { lhs, rhs, .. } => vec![(Slot::Lhs, *lhs), (Slot::Rhs, *rhs)],
            Self::LoadDeref { address } => vec![(Slot::Address, *address)],
            Self::StoreDeref { address, value } => {
                vec![(Slot::Address, *address), (Slot::Value, *value)]
            }
            Self::CopyDeref {
                destination,
                source,
            } => vec![(Slot::Destination, *destination), (Slot::Source, *source)],
            Self::Phi { sources } => sources
                .iter()
                .enumerate()
                .map(|(i, (_, value))| (Slot::PhiSource(i), *value))
                .collect(),
            Self::Call { arguments, .. } => arguments
                .iter()
                .enumerate()
                .map(|(i, value)| (Slot::Argument(i), *value))
                .collect(),
        }
    }

    pub fn operand_mut(&mut self, slot: Slot) -> Option<&mut InstrId> {
        match (self, slot) {
            (Self::Deref(deref), Slot::Parent) => match &mut deref.kind {
                DerefKind::Var(_) => None,
                DerefKind::Cast { parent, .. }
                | DerefKind::Array { parent, .. }
                | DerefKind::ArrayWildcard { parent }
                | DerefKind::Struct { parent, .. }
                | DerefKind::PtrAsArray { parent, .. } => Some(parent),
            },
            (Self::Deref(deref), Slot::Index) => match &mut deref.kind {
                DerefKind::Array { index, .. } | DerefKind::PtrAsArray { index, .. } => {
                    Some(index)
                }
                _ => None,
            },
            (Self::BinaryOperation { lhs, .. }, Slot::Lhs) => Some(lhs),
            (Self::BinaryOperation { rhs, .. }, Slot::Rhs) => Some(rhs),
            (Self::LoadDeref { address }, Slot::Address)
            | (Self::StoreDeref { address, .. }, Slot::Address) => Some(address),
            (Self::StoreDeref { value, .. }, Slot::Value) => Some(value),
            (Self::CopyDeref { destination, .. }, Slot::Destination) => Some(destination),
            (Self::CopyDeref { source, .. }, Slot::Source) => Some(source),
            (Self::Phi { sources }, Slot::PhiSource(i)) => sources.get_mut(i).map(|(_, v)| v),
            (Self::Call { arguments, .. }, Slot::Argument(i)) => arguments.get_mut(i),
            _ => None,
        }
    }
}

impl Terminator {
    pub fn operands(&self) -> Vec<(Slot, InstrId)> {
        match self {
            Self::Jump { .. } | Self::Return { value: None } => vec![],
            Self::Branch { condition, .. } => vec![(Slot::Condition, *condition)],
            Self::Return { value: Some(value) } => vec![(Slot::ReturnValue, *value)],
        }
    }

    pub fn operand_mut(&mut self, slot: Slot) -> Option<&mut InstrId> {
        match (self, slot) {
            (Self::Branch { condition, .. }, Slot::Condition) => Some(condition),
            (Self::Return { value: Some(value) }, Slot::ReturnValue) => Some(value),
            _ => None,
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Jump { destination } => vec![*destination],
            Self::Branch {
                positive, negative, ..
            } => vec![*positive, *negative],
            Self::Return { .. } => vec![],
        }
    }
}

/// Something that consumes an SSA value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum User {
    Instruction(InstrId),
    Terminator(BlockId),
}

/// A single operand referencing some SSA value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: User,
    pub slot: Slot,
}

impl Function {
    /// Creates a function with an empty entry block that returns nothing
    pub fn new(name: &str) -> Self {
        let mut function = Self {
            name: InternedSymbol::new(name),
            instructions: IndexVec::new(),
            blocks: IndexVec::new(),
            valid_metadata: Metadata::empty(),
        };
        function.create_block();
        function
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = self.blocks.next_index();
        self.blocks.push(Block {
            id,
            instructions: Vec::new(),
            terminator: Terminator::Return { value: None },
        })
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        let user = User::Terminator(block);
        let old = std::mem::replace(&mut self.blocks[block].terminator, terminator);
        self.unlink_operands(user, old.operands());

        let operands = self.blocks[block].terminator.operands();
        self.link_operands(user, operands);
    }

    /// Blocks in program order
    pub fn block_order(&self) -> impl Iterator<Item = BlockId> + use<> {
        self.blocks.indices()
    }

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id].instruction
    }

    fn instruction_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instructions[id].instruction
    }

    pub fn deref(&self, id: InstrId) -> Option<&Deref> {
        self.instruction(id).as_deref()
    }

    /// Mutable access to the non-operand fields of a deref. Changing its
    /// parent or index here bypasses the use lists; go through
    /// [`Function::rewrite_operand`] or [`Function::replace_instruction`].
    pub fn deref_mut(&mut self, id: InstrId) -> Option<&mut Deref> {
        self.instruction_mut(id).as_deref_mut()
    }

    pub fn is_deref(&self, id: InstrId) -> bool {
        self.deref(id).is_some()
    }

    pub fn block_of(&self, id: InstrId) -> Option<BlockId> {
        self.instructions[id].block
    }

    pub fn is_live(&self, id: InstrId) -> bool {
        self.block_of(id).is_some()
    }

    /// The value of `id` if it is defined by a constant instruction
    pub fn as_const(&self, id: InstrId) -> Option<u64> {
        match self.instruction(id) {
            Instruction::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_const(&self, id: InstrId) -> bool {
        self.as_const(id).is_some()
    }

    pub(crate) fn append_instruction(
        &mut self,
        block: BlockId,
        instruction: Instruction,
    ) -> InstrId {
        let operands = instruction.operands();
        let id = self.instructions.push(InstructionData {
            instruction,
            block: Some(block),
            uses: Vec::new(),
        });
        self.blocks[block].instructions.push(id);
        self.link_operands(User::Instruction(id), operands);
        id
    }

    pub(crate) fn insert_instruction_before(
        &mut self,
        anchor: InstrId,
        instruction: Instruction,
    ) -> InstrId {
        let block = self
            .block_of(anchor)
            .expect("cannot insert before an instruction that was removed");
        let position = self.position_in_block(anchor);

        let operands = instruction.operands();
        let id = self.instructions.push(InstructionData {
            instruction,
            block: Some(block),
            uses: Vec::new(),
        });
        self.blocks[block].instructions.insert(position, id);
        self.link_operands(User::Instruction(id), operands);
        id
    }

    /// Swaps the instruction stored at `id` for `instruction`. The id keeps
    /// its block and its users; only the operands read change.
    pub fn replace_instruction(&mut self, id: InstrId, instruction: Instruction) {
        let user = User::Instruction(id);
        let old = std::mem::replace(self.instruction_mut(id), instruction);

        if self.is_live(id) {
            self.unlink_operands(user, old.operands());
            let operands = self.instruction(id).operands();
            self.link_operands(user, operands);
        }
    }

    fn link_operands(&mut self, user: User, operands: Vec<(Slot, InstrId)>) {
        for (slot, value) in operands {
            self.instructions[value].uses.push(Use { user, slot });
        }
    }

    fn unlink_operands(&mut self, user: User, operands: Vec<(Slot, InstrId)>) {
        for (slot, value) in operands {
            self.unlink_use(value, Use { user, slot });
        }
    }

    fn unlink_use(&mut self, value: InstrId, usage: Use) {
        let uses = &mut self.instructions[value].uses;
        let position = uses
            .iter()
            .position(|&u| u == usage)
            .unwrap_or_else(|| panic!("{usage:?} is missing from the uses of {value:?}"));
        uses.remove(position);
    }

    fn position_in_block(&self, id: InstrId) -> usize {
        let block = self.block_of(id).expect("instruction is not in a block");
        self.blocks[block]
            .instructions
            .iter()
            .position(|&i| i == id)
            .expect("block does not contain its own instruction")
    }

    /// Unlinks an instruction from its block. The data stays in the arena so
    /// stale ids can still be inspected, but it no longer counts as a user of
    /// its operands.
    pub fn remove_instruction(&mut self, id: InstrId) {
        let Some(block) = self.instructions[id].block.take() else {
            return;
        };

        self.blocks[block].instructions.retain(|&i| i != id);

        let operands = self.instruction(id).operands();
        self.unlink_operands(User::Instruction(id), operands);
    }

    /// Live instructions in program order
    pub fn live_instructions(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.blocks
            .iter()
            .flat_map(|block| block.instructions.iter().copied())
    }

    /// Every operand, across live instructions and terminators, that reads
    /// `value`. The list is copied out so callers can rewrite while walking
    /// it.
    pub fn uses_of(&self, value: InstrId) -> Vec<Use> {
        self.instructions[value].uses.clone()
    }

    pub fn has_uses(&self, value: InstrId) -> bool {
        !self.instructions[value].uses.is_empty()
    }

    fn operand_mut(&mut self, usage: Use) -> &mut InstrId {
        let operand = match usage.user {
            User::Instruction(id) => self.instruction_mut(id).operand_mut(usage.slot),
            User::Terminator(block) => self.blocks[block].terminator.operand_mut(usage.slot),
        };

        match operand {
            Some(operand) => operand,
            None => unreachable!("{usage:?} does not name an operand"),
        }
    }

    fn is_live_user(&self, user: User) -> bool {
        match user {
            User::Instruction(id) => self.is_live(id),
            User::Terminator(_) => true,
        }
    }

    /// Points a single operand at `new_value`
    pub fn rewrite_operand(&mut self, usage: Use, new_value: InstrId) {
        let old_value = std::mem::replace(self.operand_mut(usage), new_value);

        // Removed instructions are not on any use list
        if self.is_live_user(usage.user) {
            self.unlink_use(old_value, usage);
            self.instructions[new_value].uses.push(usage);
        }
    }

    /// Replaces every use of `old_value` with `new_value`
    pub fn rewrite_uses(&mut self, old_value: InstrId, new_value: InstrId) {
        if old_value == new_value {
            return;
        }

        for usage in std::mem::take(&mut self.instructions[old_value].uses) {
            *self.operand_mut(usage) = new_value;
            self.instructions[new_value].uses.push(usage);
        }
    }

    /// Keeps only the metadata in `preserved` valid
    pub fn preserve_metadata(&mut self, preserved: Metadata) {
        self.valid_metadata &= preserved;
    }
}
