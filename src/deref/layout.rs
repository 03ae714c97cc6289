//! Byte offsets of deref chains for a caller supplied memory layout.

use crate::{
    deref::{DerefPath, expect_deref},
    ir::{Builder, DerefKind, Function, InstrId, Type, TypeKind},
};

/// Computes the `(size, alignment)` in bytes of a type for some target
/// layout. Any `Fn(&Type) -> (u32, u32)` works.
pub trait SizeAlign {
    fn size_align(&self, ty: &Type) -> (u32, u32);
}

impl<F: Fn(&Type) -> (u32, u32)> SizeAlign for F {
    fn size_align(&self, ty: &Type) -> (u32, u32) {
        self(ty)
    }
}

/// Rounds `value` up to `align`, which must be a power of two
pub fn align_pot(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Scalars aligned to their own size, vectors to their size rounded up to a
/// power of two, aggregates to their most aligned member. Explicit array
/// strides and struct offsets are ignored.
pub fn natural_size_align(ty: &Type) -> (u32, u32) {
    match &**ty {
        TypeKind::Void => (0, 1),
        TypeKind::Bool => (4, 4),
        TypeKind::Int { bit_size, .. } | TypeKind::Float { bit_size } => {
            let size = u32::from(*bit_size).div_ceil(8);
            (size, size)
        }
        TypeKind::Vector {
            element,
            components,
        } => {
            let (size, _) = natural_size_align(element);
            (
                size * u32::from(*components),
                size * u32::from(*components).next_power_of_two(),
            )
        }
        TypeKind::Array { element, length, .. } => {
            let (size, align) = natural_size_align(element);
            (align_pot(size, align) * length, align)
        }
        TypeKind::Struct(struct_type) => {
            let mut offset = 0;
            let mut max_align = 1;
            for field in &struct_type.fields {
                let (size, align) = natural_size_align(&field.ty);
                offset = align_pot(offset, align) + size;
                max_align = max_align.max(align);
            }
            (align_pot(offset, max_align), max_align)
        }
    }
}

/// Distance between consecutive elements of type `element`
pub fn array_stride(element: &Type, size_align: &impl SizeAlign) -> u32 {
    let (size, align) = size_align.size_align(element);
    align_pot(size, align)
}

/// Offset of `field` within `struct_type`
pub fn struct_field_offset(struct_type: &Type, size_align: &impl SizeAlign, field: u32) -> u32 {
    let fields = &struct_type
        .as_struct()
        .unwrap_or_else(|| panic!("{struct_type} is not a struct type"))
        .fields;

    let mut offset = 0;
    for (i, member) in fields.iter().enumerate().take(field as usize + 1) {
        let (size, align) = size_align.size_align(&member.ty);
        offset = align_pot(offset, align);
        if i < field as usize {
            offset += size;
        }
    }
    offset
}

enum OffsetTerm {
    Scaled { index: InstrId, stride: u32 },
    Constant(u32),
}

/// Splits the chain ending at `deref` into per step offset contributions.
/// The chain must be rooted at a variable and only contain array and struct
/// steps.
fn offset_terms(
    function: &Function,
    deref: InstrId,
    size_align: &impl SizeAlign,
) -> Vec<OffsetTerm> {
    let path = DerefPath::new(function, deref);

    debug_assert!(expect_deref(function, path.root()).kind.is_var());

    let terms = path
        .as_slice()
        .windows(2)
        .map(|pair| {
            let step = expect_deref(function, pair[1]);
            match step.kind {
                DerefKind::Array { index, .. } => OffsetTerm::Scaled {
                    index,
                    stride: array_stride(&step.ty, size_align),
                },
                DerefKind::Struct { field, .. } => {
                    let parent = expect_deref(function, pair[0]);
                    OffsetTerm::Constant(struct_field_offset(&parent.ty, size_align, field))
                }
                kind => unreachable!("unsupported deref type in offset: {}", kind.name()),
            }
        })
        .collect();

    path.finish();
    terms
}

/// Byte offset of `deref` from the start of its variable. Every array step
/// must use a constant index.
pub fn const_offset(function: &Function, deref: InstrId, size_align: &impl SizeAlign) -> u32 {
    offset_terms(function, deref, size_align)
        .into_iter()
        .map(|term| match term {
            OffsetTerm::Scaled { index, stride } => {
                let index = function
                    .as_const(index)
                    .expect("constant offset of a dynamically indexed deref");
                index as u32 * stride
            }
            OffsetTerm::Constant(offset) => offset,
        })
        .sum()
}

/// Emits the arithmetic computing the byte offset of `deref` from the start
/// of its variable at the builder's cursor, returning the resulting value.
pub fn build_offset(builder: &mut Builder, deref: InstrId, size_align: &impl SizeAlign) -> InstrId {
    let terms = offset_terms(builder.function(), deref, size_align);

    let mut offset = builder.constant(0, 32);
    for term in terms {
        let addend = match term {
            OffsetTerm::Scaled { index, stride } => {
                let stride = builder.constant(u64::from(stride), 32);
                builder.imul(index, stride)
            }
            OffsetTerm::Constant(value) => builder.constant(u64::from(value), 32),
        };
        offset = builder.iadd(offset, addend);
    }

    offset
}
