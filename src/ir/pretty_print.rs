use colored::Colorize;
use itertools::Itertools;

use crate::{
    index::Index,
    ir::{BlockId, DerefKind, Function, InstrId, Instruction, Shader, Terminator},
};

/// Displays a function with variable and field names resolved through its
/// shader. Obtained from [`Function::display`].
pub struct FunctionDisplay<'a> {
    shader: &'a Shader,
    function: &'a Function,
}

impl Function {
    pub fn display<'a>(&'a self, shader: &'a Shader) -> FunctionDisplay<'a> {
        FunctionDisplay {
            shader,
            function: self,
        }
    }
}

pub fn pretty_print_function(shader: &Shader, function: &Function) {
    print!("{}", function.display(shader));
}

impl FunctionDisplay<'_> {
    fn write_instruction(&self, f: &mut std::fmt::Formatter<'_>, id: InstrId) -> std::fmt::Result {
        let function = self.function;

        match function.instruction(id) {
            Instruction::Deref(deref) => {
                write!(
                    f,
                    "{id} {} {} ",
                    "=".white(),
                    format!("deref_{}", deref.kind.name()).cyan()
                )?;

                match deref.kind {
                    DerefKind::Var(variable) => {
                        write!(f, "&{}", self.shader.variables[variable].name.value().blue())?
                    }
                    DerefKind::Cast { parent, ptr_stride } => {
                        write!(f, "({} *){parent}", deref.ty.colored())?;
                        if ptr_stride != 0 {
                            write!(f, " (ptr_stride={})", ptr_stride.to_string().purple())?;
                        }
                    }
                    DerefKind::Array { parent, index } => write!(f, "&{parent}[{index}]")?,
                    DerefKind::ArrayWildcard { parent } => write!(f, "&{parent}[*]")?,
                    DerefKind::Struct { parent, field } => {
                        match function
                            .deref(parent)
                            .and_then(|parent| parent.ty.struct_field(field))
                        {
                            Some(member) => {
                                write!(f, "&{parent}->{}", member.name.value().blue())?
                            }
                            None => write!(f, "&{parent}->{field}")?,
                        }
                    }
                    DerefKind::PtrAsArray { parent, index } => {
                        write!(f, "&(*{parent})[{index}]")?
                    }
                }

                write!(f, " ({} {})", deref.mode.to_string().green(), deref.ty.colored())
            }
            Instruction::Constant { value, bit_size } => write!(
                f,
                "{id} {} {} {} ({bit_size})",
                "=".white(),
                "const".cyan(),
                value.to_string().purple()
            ),
            Instruction::Parameter { index, .. } => write!(
                f,
                "{id} {} {} {}",
                "=".white(),
                "param".cyan(),
                index.to_string().purple()
            ),
            Instruction::BinaryOperation { operator, lhs, rhs } => write!(
                f,
                "{id} {} {} {lhs}, {rhs}",
                "=".white(),
                operator.to_string().white()
            ),
            Instruction::LoadDeref { address } => {
                write!(f, "{id} {} {} {address}", "=".white(), "load_deref".cyan())
            }
            Instruction::StoreDeref { address, value } => {
                write!(f, "{} {address}, {value}", "store_deref".cyan())
            }
            Instruction::CopyDeref {
                destination,
                source,
            } => write!(f, "{} {destination}, {source}", "copy_deref".cyan()),
            Instruction::Phi { sources } => {
                write!(f, "{id} {} {}{}", "=".white(), "phi".bright_green(), "(".white())?;

                write!(
                    f,
                    "{}",
                    sources
                        .iter()
                        .map(|(block, value)| format!("{} -> {value}", block.to_string().blue()))
                        .join(", ")
                )?;

                write!(f, "{}", ")".white())
            }
            Instruction::Call { callee, arguments } => write!(
                f,
                "{id} {} {} {}({})",
                "=".white(),
                "call".cyan(),
                callee.value().blue(),
                arguments.iter().join(", ")
            ),
        }
    }
}

impl core::fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} {} {}",
            "fn".magenta(),
            self.function.name.value().blue(),
            "{".white()
        )?;

        for block in self.function.blocks.iter() {
            writeln!(f, "{}", format!("{}:", block.id).bright_red())?;

            for &instr in &block.instructions {
                write!(f, "    ")?;
                self.write_instruction(f, instr)?;
                writeln!(f)?;
            }

            writeln!(f, "    {}", block.terminator)?;
        }

        writeln!(f, "{}", "}".white())
    }
}

impl core::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jump { destination } => {
                write!(f, "{} {}", "jmp".cyan(), destination.to_string().blue())
            }
            Self::Branch {
                condition,
                positive,
                negative,
            } => write!(
                f,
                "{} {condition}, {}, {}",
                "br".cyan(),
                positive.to_string().blue(),
                negative.to_string().blue()
            ),
            Self::Return { value: Some(value) } => write!(f, "{} {value}", "ret".cyan()),
            Self::Return { value: None } => write!(f, "{}", "ret".cyan()),
        }
    }
}

impl core::fmt::Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("%{}", self.index()).yellow())
    }
}

impl core::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block_{}", self.index())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        ir::{BlockId, StructField, Terminator, Type, VariableMode},
        test_util::TestShader,
    };

    fn strip(colored: String) -> String {
        String::from_utf8(strip_ansi_escapes::strip(colored)).unwrap()
    }

    #[test]
    fn prints_deref_chains() {
        let ty = Type::structure(
            "Light",
            vec![
                StructField::new("position", Type::vector(Type::float(32), 3)),
                StructField::new("weights", Type::array(Type::float(32), 4)),
            ],
        );

        let mut t = TestShader::new();
        let v = t.variable("lights", VariableMode::MemSsbo, Type::array(ty, 8));
        let root = t.var(v);
        let mut b = t.builder();
        let i = b.parameter(0, 32);
        let light = b.deref_array(root, i);
        let weights = b.deref_struct(light, 1);
        let all = b.deref_array_wildcard(weights);
        let value = b.load_deref(all);
        let one = b.constant(1, 32);
        let next = b.deref_ptr_as_array(light, one);
        let cast = b.deref_cast(next, VariableMode::MemSsbo, Type::uint(32), 4);
        b.store_deref(cast, value);

        let printed = strip(t.function().display(&t.shader).to_string());
        assert_eq!(
            printed,
            indoc! {"
                fn main {
                block_0:
                    %0 = deref_var &lights (mem_ssbo Light[8])
                    %1 = param 0
                    %2 = deref_array &%0[%1] (mem_ssbo Light)
                    %3 = deref_struct &%2->weights (mem_ssbo float[4])
                    %4 = deref_array_wildcard &%3[*] (mem_ssbo float)
                    %5 = load_deref %4
                    %6 = const 1 (32)
                    %7 = deref_ptr_as_array &(*%2)[%6] (mem_ssbo Light)
                    %8 = deref_cast (uint *)%7 (ptr_stride=4) (mem_ssbo uint)
                    store_deref %8, %5
                    ret
                }
            "}
        );
    }

    #[test]
    fn prints_terminators_and_phis() {
        let mut t = TestShader::new();
        let then = t.block();
        let join = t.block();
        let mut b = t.builder();
        let cond = b.parameter(0, 1);
        let a = b.constant(2, 32);
        let c = b.iadd(a, a);
        t.function_mut().set_terminator(
            BlockId::ENTRY,
            Terminator::Branch {
                condition: cond,
                positive: then,
                negative: join,
            },
        );
        t.function_mut()
            .set_terminator(then, Terminator::Jump { destination: join });
        let phi = t
            .builder_at(join)
            .phi(vec![(BlockId::ENTRY, a), (then, c)]);
        t.function_mut()
            .set_terminator(join, Terminator::Return { value: Some(phi) });

        let printed = strip(t.function().display(&t.shader).to_string());
        assert_eq!(
            printed,
            indoc! {"
                fn main {
                block_0:
                    %0 = param 0
                    %1 = const 2 (32)
                    %2 = iadd %1, %1
                    br %0, block_1, block_2
                block_1:
                    jmp block_2
                block_2:
                    %3 = phi(block_0 -> %1, block_1 -> %2)
                    ret %3
                }
            "}
        );
    }
}
