//! Shared fixture for unit tests: a shader with a single `main` function.

use crate::ir::{
    Access, BlockId, Builder, Deref, DerefKind, Function, FunctionId, InstrId, Shader, Type,
    VariableId, VariableMode,
};

pub(crate) struct TestShader {
    pub shader: Shader,
    pub main: FunctionId,
}

impl TestShader {
    pub fn new() -> Self {
        let mut shader = Shader::new("test");
        let main = shader.add_function("main");
        Self { shader, main }
    }

    pub fn variable(&mut self, name: &str, mode: VariableMode, ty: Type) -> VariableId {
        self.shader.add_variable(name, mode, ty)
    }

    pub fn coherent_variable(&mut self, name: &str, mode: VariableMode, ty: Type) -> VariableId {
        let id = self.variable(name, mode, ty);
        self.shader.variables[id].access |= Access::COHERENT;
        id
    }

    pub fn function(&self) -> &Function {
        &self.shader.functions[self.main]
    }

    pub fn function_mut(&mut self) -> &mut Function {
        &mut self.shader.functions[self.main]
    }

    pub fn builder(&mut self) -> Builder<'_> {
        self.builder_at(BlockId::ENTRY)
    }

    pub fn builder_at(&mut self, block: BlockId) -> Builder<'_> {
        Builder::at_end(self.function_mut(), block)
    }

    /// Emits a `deref_var` of `variable` at the end of `block`
    pub fn var_in(&mut self, block: BlockId, variable: VariableId) -> InstrId {
        let Shader {
            variables,
            functions,
            ..
        } = &mut self.shader;

        Builder::at_end(&mut functions[self.main], block)
            .deref_variable(variable, &variables[variable])
    }

    pub fn var(&mut self, variable: VariableId) -> InstrId {
        self.var_in(BlockId::ENTRY, variable)
    }

    pub fn block(&mut self) -> BlockId {
        self.function_mut().create_block()
    }

    /// Stacks `depth` array steps with a constant zero index on top of
    /// `root`, emitted at the end of `block`. Every step keeps the root's
    /// array type, so arbitrarily long chains stay well formed.
    pub fn deep_array_chain(&mut self, block: BlockId, root: InstrId, depth: usize) -> InstrId {
        let mut b = self.builder_at(block);
        let template = b.function().deref(root).expect("root is not a deref").clone();
        debug_assert!(template.ty.is_array());

        let zero = b.constant(0, 32);
        let mut leaf = root;
        for _ in 0..depth {
            leaf = b.deref(Deref {
                kind: DerefKind::Array {
                    parent: leaf,
                    index: zero,
                },
                ..template.clone()
            });
        }
        leaf
    }
}
