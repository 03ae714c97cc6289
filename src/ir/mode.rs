use bitflags::bitflags;
use strum::EnumIter;

/// The address space a variable (and every deref rooted at it) lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum VariableMode {
    ShaderIn,
    ShaderOut,
    /// Shader-global variables that are not backed by memory
    ShaderTemp,
    /// Function-local variables that are not backed by memory
    FunctionTemp,
    Uniform,
    MemUbo,
    MemSsbo,
    MemShared,
    MemGlobal,
    MemPushConst,
    SystemValue,
}

impl VariableMode {
    /// Temporaries only exist in registers, so two distinct temporaries can
    /// never share storage.
    pub fn is_temporary(self) -> bool {
        matches!(self, Self::ShaderTemp | Self::FunctionTemp)
    }
}

bitflags! {
    /// Memory access qualifiers declared on a variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u8 {
        const COHERENT = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const NON_WRITEABLE = 1 << 3;
        const NON_READABLE = 1 << 4;
    }
}
