use std::rc::Rc;

use colored::Colorize;
use itertools::Itertools;

use crate::intern::InternedSymbol;

/// Cheaply clonable handle to a [`TypeKind`]. Equality is structural, so two
/// separately built `vec4`s compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type(Rc<TypeKind>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    /// int, uint, int64_t, etc.
    Int { bit_size: u8, signed: bool },
    /// float, double, float16_t
    Float { bit_size: u8 },
    /// vec4, uvec2, etc.
    Vector { element: Type, components: u8 },
    /// T[length]
    ///
    /// `explicit_stride` is zero unless the array comes from an explicitly
    /// laid out block (e.g. an SSBO or a `PtrAsArray` cast target).
    Array {
        element: Type,
        length: u32,
        explicit_stride: u32,
    },
    Struct(StructType),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: InternedSymbol,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: InternedSymbol,
    pub ty: Type,
    /// Byte offset from an explicit layout, if any
    pub offset: Option<u32>,
    /// Set for interface block members declared `coherent`
    pub memory_coherent: bool,
}

impl StructField {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: InternedSymbol::new(name),
            ty,
            offset: None,
            memory_coherent: false,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn coherent(mut self) -> Self {
        self.memory_coherent = true;
        self
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn void() -> Self {
        Self::new(TypeKind::Void)
    }

    pub fn bool() -> Self {
        Self::new(TypeKind::Bool)
    }

    pub fn int(bit_size: u8) -> Self {
        Self::new(TypeKind::Int {
            bit_size,
            signed: true,
        })
    }

    pub fn uint(bit_size: u8) -> Self {
        Self::new(TypeKind::Int {
            bit_size,
            signed: false,
        })
    }

    pub fn float(bit_size: u8) -> Self {
        Self::new(TypeKind::Float { bit_size })
    }

    pub fn vector(element: Type, components: u8) -> Self {
        Self::new(TypeKind::Vector {
            element,
            components,
        })
    }

    pub fn array(element: Type, length: u32) -> Self {
        Self::array_with_stride(element, length, 0)
    }

    pub fn array_with_stride(element: Type, length: u32, explicit_stride: u32) -> Self {
        Self::new(TypeKind::Array {
            element,
            length,
            explicit_stride,
        })
    }

    pub fn structure(name: &str, fields: Vec<StructField>) -> Self {
        Self::new(TypeKind::Struct(StructType {
            name: InternedSymbol::new(name),
            fields,
        }))
    }

    pub fn is_struct(&self) -> bool {
        matches!(&*self.0, TypeKind::Struct(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(&*self.0, TypeKind::Array { .. })
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match &*self.0 {
            TypeKind::Struct(struct_type) => Some(struct_type),
            _ => None,
        }
    }

    pub fn struct_field(&self, index: u32) -> Option<&StructField> {
        self.as_struct()?.fields.get(index as usize)
    }

    pub fn array_element(&self) -> Option<&Type> {
        match &*self.0 {
            TypeKind::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Number of elements of an array type, or zero for anything else
    pub fn length(&self) -> u32 {
        match &*self.0 {
            TypeKind::Array { length, .. } => *length,
            _ => 0,
        }
    }

    /// Explicit element stride of an array type, or zero if it has none
    pub fn explicit_stride(&self) -> u32 {
        match &*self.0 {
            TypeKind::Array {
                explicit_stride, ..
            } => *explicit_stride,
            _ => 0,
        }
    }

    pub fn colored(&self) -> colored::ColoredString {
        self.to_string().yellow()
    }
}

impl core::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool => write!(f, "bool"),
            Self::Int {
                bit_size: 32,
                signed: true,
            } => write!(f, "int"),
            Self::Int {
                bit_size: 32,
                signed: false,
            } => write!(f, "uint"),
            Self::Int { bit_size, signed } => {
                write!(f, "{}int{bit_size}_t", if *signed { "" } else { "u" })
            }
            Self::Float { bit_size: 32 } => write!(f, "float"),
            Self::Float { bit_size: 64 } => write!(f, "double"),
            Self::Float { bit_size } => write!(f, "float{bit_size}_t"),
            Self::Vector {
                element,
                components,
            } => match &**element {
                Self::Float { bit_size: 32 } => write!(f, "vec{components}"),
                Self::Int {
                    bit_size: 32,
                    signed: true,
                } => write!(f, "ivec{components}"),
                Self::Int {
                    bit_size: 32,
                    signed: false,
                } => write!(f, "uvec{components}"),
                Self::Bool => write!(f, "bvec{components}"),
                _ => write!(f, "{element}x{components}"),
            },
            Self::Array {
                element,
                length,
                explicit_stride: 0,
            } => write!(f, "{element}[{length}]"),
            Self::Array {
                element,
                length,
                explicit_stride,
            } => write!(f, "{element}[{length}] (stride={explicit_stride})"),
            Self::Struct(struct_type) => write!(
                f,
                "{} {{ {} }}",
                struct_type.name,
                struct_type
                    .fields
                    .iter()
                    .map(|field| format!("{} {}", field.ty, field.name))
                    .join(", ")
            ),
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.0 {
            // Struct types are printed by name only, their bodies get noisy
            TypeKind::Struct(struct_type) => write!(f, "{}", struct_type.name),
            kind => write!(f, "{kind}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_compare_structurally() {
        let a = Type::vector(Type::float(32), 4);
        let b = Type::vector(Type::float(32), 4);

        assert_eq!(a, b);
        assert_ne!(a, Type::vector(Type::float(32), 3));
        assert_eq!(a.to_string(), "vec4");
    }

    #[test]
    fn array_accessors() {
        let ty = Type::array_with_stride(Type::uint(32), 8, 16);

        assert!(ty.is_array());
        assert_eq!(ty.length(), 8);
        assert_eq!(ty.explicit_stride(), 16);
        assert_eq!(ty.array_element(), Some(&Type::uint(32)));
        assert_eq!(ty.to_string(), "uint[8] (stride=16)");
        assert_eq!(Type::float(32).length(), 0);
    }

    #[test]
    fn struct_field_lookup() {
        let ty = Type::structure(
            "Light",
            vec![
                StructField::new("position", Type::vector(Type::float(32), 3)).with_offset(0),
                StructField::new("intensity", Type::float(32)).with_offset(12),
            ],
        );

        assert!(ty.is_struct());
        assert_eq!(ty.struct_field(1).map(|f| f.offset), Some(Some(12)));
        assert!(ty.struct_field(2).is_none());
        assert_eq!(ty.to_string(), "Light");
    }
}
