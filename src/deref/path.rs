use crate::{
    deref::ancestors,
    ir::{Function, InstrId},
};

/// Chains up to this length are stored inline without allocating.
pub const SHORT_PATH_LEN: usize = 7;

/// A root-to-leaf view of a deref chain.
///
/// The path only records instruction ids; it does not own or borrow the
/// derefs, so it stays valid for as long as the instructions do. Short
/// chains live in a fixed buffer filled from the back, longer ones in a
/// boxed slice sized exactly for the chain.
#[derive(Debug, Clone)]
pub enum DerefPath {
    Short {
        buf: [InstrId; SHORT_PATH_LEN],
        /// Index of the root within `buf`; the leaf is always the last slot
        head: usize,
    },
    Long(Box<[InstrId]>),
}

impl DerefPath {
    pub fn new(function: &Function, leaf: InstrId) -> Self {
        let mut buf = [InstrId::INVALID; SHORT_PATH_LEN];
        let mut head = SHORT_PATH_LEN;
        let mut count = 0;

        for d in ancestors(function, leaf) {
            count += 1;
            if count <= SHORT_PATH_LEN {
                head -= 1;
                buf[head] = d;
            }
        }

        if count <= SHORT_PATH_LEN {
            return Self::Short { buf, head };
        }

        let mut path = vec![InstrId::INVALID; count].into_boxed_slice();
        for (slot, d) in path.iter_mut().rev().zip(ancestors(function, leaf)) {
            *slot = d;
        }

        debug_assert!(!path.contains(&InstrId::INVALID));
        Self::Long(path)
    }

    /// Releases the path. Only the long form owns an allocation, but callers
    /// do not need to know which one they got.
    pub fn finish(self) {}

    pub fn as_slice(&self) -> &[InstrId] {
        match self {
            Self::Short { buf, head } => &buf[*head..],
            Self::Long(path) => path,
        }
    }

    pub fn is_short(&self) -> bool {
        matches!(self, Self::Short { .. })
    }

    pub fn root(&self) -> InstrId {
        self.as_slice()[0]
    }

    pub fn leaf(&self) -> InstrId {
        self.as_slice()[self.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Paths always contain at least their root
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, InstrId>> {
        self.as_slice().iter().copied()
    }
}

impl core::ops::Index<usize> for DerefPath {
    type Output = InstrId;

    fn index(&self, index: usize) -> &Self::Output {
        &self.as_slice()[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::Index,
        ir::{BlockId, Builder, Type, VariableId, VariableMode},
    };

    /// var -> [0] -> [0] -> ... `depth` array steps deep
    fn nested_arrays(depth: usize) -> (Function, Vec<InstrId>) {
        let mut ty = Type::float(32);
        for _ in 0..depth {
            ty = Type::array(ty, 4);
        }

        let mut function = Function::new("main");
        let mut b = Builder::at_end(&mut function, BlockId::ENTRY);

        let mut chain = vec![b.deref_var(VariableId::new(0), VariableMode::FunctionTemp, ty)];
        for _ in 0..depth {
            let parent = *chain.last().unwrap();
            chain.push(b.deref_array_imm(parent, 0));
        }

        (function, chain)
    }

    #[test]
    fn var_alone_is_a_single_entry_path() {
        let (function, chain) = nested_arrays(0);
        let path = DerefPath::new(&function, chain[0]);

        assert!(path.is_short());
        assert_eq!(path.as_slice(), &chain[..]);
        assert_eq!(path.root(), path.leaf());
    }

    #[test]
    fn short_path_uses_the_inline_buffer_up_to_capacity() {
        let (function, chain) = nested_arrays(SHORT_PATH_LEN - 1);
        let path = DerefPath::new(&function, *chain.last().unwrap());

        assert!(path.is_short());
        assert_eq!(path.len(), SHORT_PATH_LEN);
        assert_eq!(path.as_slice(), &chain[..]);
    }

    #[test]
    fn long_path_spills_to_the_heap() {
        let (function, chain) = nested_arrays(SHORT_PATH_LEN);
        let path = DerefPath::new(&function, *chain.last().unwrap());

        assert!(!path.is_short());
        assert_eq!(path.len(), SHORT_PATH_LEN + 1);
        assert_eq!(path.as_slice(), &chain[..]);
        assert_eq!(path[1], chain[1]);
        path.finish();
    }

    #[test]
    fn path_of_inner_node_stops_at_that_node() {
        let (function, chain) = nested_arrays(12);
        let path = DerefPath::new(&function, chain[3]);

        assert_eq!(path.as_slice(), &chain[..4]);
    }

    #[test]
    fn cast_of_non_deref_is_a_root() {
        let mut function = Function::new("main");
        let mut b = Builder::at_end(&mut function, BlockId::ENTRY);
        let ptr = b.parameter(0, 64);
        let cast = b.deref_cast(ptr, VariableMode::MemGlobal, Type::array(Type::uint(32), 4), 4);
        let elem = b.deref_array_imm(cast, 1);

        let path = DerefPath::new(&function, elem);
        assert_eq!(path.as_slice(), &[cast, elem]);
    }
}
