use bitflags::bitflags;

use crate::{
    deref::{DerefPath, expect_deref, policy},
    ir::{DerefKind, Function, InstrId, Shader},
};

bitflags! {
    /// The relation between the memory addressed by two deref chains.
    ///
    /// The absence of [`AliasResult::MAY_ALIAS`] is the only authoritative
    /// "definitely disjoint" answer; everything else is conservative.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AliasResult: u8 {
        const MAY_ALIAS = 1 << 0;
        const A_CONTAINS_B = 1 << 1;
        const B_CONTAINS_A = 1 << 2;
        const EQUAL = 1 << 3;
    }
}

impl AliasResult {
    pub const DO_NOT_ALIAS: Self = Self::empty();

    pub fn may_alias(self) -> bool {
        self.contains(Self::MAY_ALIAS)
    }

    pub fn a_contains_b(self) -> bool {
        self.contains(Self::A_CONTAINS_B)
    }

    pub fn b_contains_a(self) -> bool {
        self.contains(Self::B_CONTAINS_A)
    }

    pub fn is_equal(self) -> bool {
        self.contains(Self::EQUAL)
    }
}

/// Compares two deref chains of `function`.
pub fn compare_derefs(
    shader: &Shader,
    function: &Function,
    a: InstrId,
    b: InstrId,
) -> AliasResult {
    if a == b {
        return AliasResult::all();
    }

    let a_path = DerefPath::new(function, a);
    let b_path = DerefPath::new(function, b);

    debug_assert!(is_valid_root(function, &a_path));
    debug_assert!(is_valid_root(function, &b_path));

    let result = compare_deref_paths(shader, function, &a_path, &b_path);

    a_path.finish();
    b_path.finish();

    result
}

fn is_valid_root(function: &Function, path: &DerefPath) -> bool {
    matches!(
        expect_deref(function, path.root()).kind,
        DerefKind::Var(_) | DerefKind::Cast { .. }
    )
}

/// Compares two already linearized deref chains of `function`.
pub fn compare_deref_paths(
    shader: &Shader,
    function: &Function,
    a_path: &DerefPath,
    b_path: &DerefPath,
) -> AliasResult {
    let a_root = expect_deref(function, a_path.root());
    let b_root = expect_deref(function, b_path.root());

    if !policy::modes_may_alias(b_root.mode, a_root.mode) {
        return AliasResult::DO_NOT_ALIAS;
    }

    match (a_root.kind, b_root.kind) {
        (DerefKind::Var(a_var), DerefKind::Var(b_var)) => {
            if a_var != b_var {
                // Temporaries are not backed by memory
                if policy::distinct_variables_never_alias(a_root.mode, b_root.mode) {
                    return AliasResult::DO_NOT_ALIAS;
                }

                // Memory declared coherent on both sides can be aliased behind
                // our back. Without that, distinct variables aliasing is the
                // client's problem.
                if policy::path_contains_coherent_decoration(shader, function, a_path)
                    && policy::path_contains_coherent_decoration(shader, function, b_path)
                {
                    return AliasResult::MAY_ALIAS;
                }

                return AliasResult::DO_NOT_ALIAS;
            }
        }
        (DerefKind::Cast { .. }, DerefKind::Cast { .. }) => {
            // Different casts are hard to compare (mode, type, stride all need
            // to line up) so only the exact same cast is walked further.
            if a_path.root() != b_path.root() {
                return AliasResult::MAY_ALIAS;
            }
        }
        (DerefKind::Var(_), DerefKind::Cast { .. })
        | (DerefKind::Cast { .. }, DerefKind::Var(_)) => {
            return AliasResult::MAY_ALIAS;
        }
        (a_kind, b_kind) => unreachable!(
            "deref paths must be rooted at a var or a cast, got {} and {}",
            a_kind.name(),
            b_kind.name()
        ),
    }

    // Start off assuming full containment both ways, equality falls out of
    // that at the end
    let mut result =
        AliasResult::MAY_ALIAS | AliasResult::A_CONTAINS_B | AliasResult::B_CONTAINS_A;

    let a = a_path.as_slice();
    let b = b_path.as_slice();

    let shared = 1 + a[1..]
        .iter()
        .zip(&b[1..])
        .take_while(|(a_step, b_step)| a_step == b_step)
        .count();
    let (a_rest, b_rest) = (&a[shared..], &b[shared..]);

    // Pointer arithmetic past the divergence point can land anywhere
    if a_rest
        .iter()
        .chain(b_rest)
        .any(|&d| expect_deref(function, d).kind.is_ptr_as_array())
    {
        return AliasResult::MAY_ALIAS;
    }

    for (&a_tail, &b_tail) in a_rest.iter().zip(b_rest) {
        match (
            expect_deref(function, a_tail).kind,
            expect_deref(function, b_tail).kind,
        ) {
            (DerefKind::ArrayWildcard { .. }, DerefKind::ArrayWildcard { .. }) => {}
            (DerefKind::ArrayWildcard { .. }, DerefKind::Array { .. }) => {
                result.remove(AliasResult::B_CONTAINS_A);
            }
            (DerefKind::Array { .. }, DerefKind::ArrayWildcard { .. }) => {
                result.remove(AliasResult::A_CONTAINS_B);
            }
            (DerefKind::Array { index: a_index, .. }, DerefKind::Array { index: b_index, .. }) => {
                match (function.as_const(a_index), function.as_const(b_index)) {
                    (Some(a_value), Some(b_value)) => {
                        // Two different direct elements don't even alias
                        if a_value != b_value {
                            return AliasResult::DO_NOT_ALIAS;
                        }
                    }
                    // Same indirect index, same element
                    _ if a_index == b_index => {}
                    _ => result.remove(AliasResult::A_CONTAINS_B | AliasResult::B_CONTAINS_A),
                }
            }
            (
                DerefKind::Struct { field: a_field, .. },
                DerefKind::Struct { field: b_field, .. },
            ) => {
                if a_field != b_field {
                    return AliasResult::DO_NOT_ALIAS;
                }
            }
            (a_kind, b_kind) => {
                // Casts in the middle of a chain are not compared structurally
                debug_assert!(
                    a_kind.is_cast() || b_kind.is_cast(),
                    "cannot pair {} with {} deref",
                    a_kind.name(),
                    b_kind.name()
                );
                return AliasResult::MAY_ALIAS;
            }
        }
    }

    // The longer chain addresses a subset of the shorter one, so it can't
    // contain it
    if a_rest.len() > b_rest.len() {
        result.remove(AliasResult::A_CONTAINS_B);
    }
    if b_rest.len() > a_rest.len() {
        result.remove(AliasResult::B_CONTAINS_A);
    }

    if result.contains(AliasResult::A_CONTAINS_B | AliasResult::B_CONTAINS_A) {
        result |= AliasResult::EQUAL;
    }

    result
}
