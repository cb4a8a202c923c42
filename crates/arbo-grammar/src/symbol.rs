/// A terminal or nonterminal symbol id within one grammar.
///
/// Regular symbols index into the grammar's symbol table. Two sentinels sit
/// at the top of the id space: [`Symbol::END`] for end-of-input lookahead
/// and [`Symbol::ERROR`] for unrecognized input and error productions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u16);

impl Symbol {
    pub const END: Self = Self(u16::MAX);
    pub const ERROR: Self = Self(u16::MAX - 1);

    pub(crate) const MAX_REGULAR: usize = (u16::MAX - 2) as usize;

    pub fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_sentinel(self) -> bool {
        self == Self::END || self == Self::ERROR
    }
}

/// Visibility class of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A visible, named node (`sum`, `identifier`).
    Named,
    /// A visible but unnamed node, typically a literal token (`"+"`).
    Anonymous,
    /// An invisible helper (repetitions, inlined rules); its children are
    /// spliced into the parent in the visible tree.
    Hidden,
}

/// A field name id within one grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub(crate) u16);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A parse state id within one grammar's action table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub(crate) u16);

impl StateId {
    pub const START: Self = Self(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A growable bitset over [`Symbol`] ids.
///
/// Sized per grammar, unlike a fixed-width kind set: symbol counts are not
/// known at compile time. Sentinels are tracked out of band.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolSet {
    bits: Vec<u64>,
    end: bool,
    error: bool,
}

impl SymbolSet {
    const BITS_PER_SLOT: usize = u64::BITS as usize;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol) {
        match symbol {
            Symbol::END => self.end = true,
            Symbol::ERROR => self.error = true,
            _ => {
                let slot = symbol.index() / Self::BITS_PER_SLOT;
                if slot >= self.bits.len() {
                    self.bits.resize(slot + 1, 0);
                }
                self.bits[slot] |= 1 << (symbol.index() % Self::BITS_PER_SLOT);
            }
        }
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        match symbol {
            Symbol::END => self.end,
            Symbol::ERROR => self.error,
            _ => {
                let slot = symbol.index() / Self::BITS_PER_SLOT;
                self.bits.get(slot).is_some_and(|bits| {
                    bits & (1 << (symbol.index() % Self::BITS_PER_SLOT)) != 0
                })
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.end && !self.error && self.bits.iter().all(|&bits| bits == 0)
    }

    /// Iterates the regular (non-sentinel) symbols in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.bits.iter().enumerate().flat_map(|(slot, &bits)| {
            (0..Self::BITS_PER_SLOT).filter_map(move |bit| {
                (bits & (1 << bit) != 0)
                    .then(|| Symbol::new((slot * Self::BITS_PER_SLOT + bit) as u16))
            })
        })
    }

    pub fn intersects(&self, other: &Self) -> bool {
        if (self.end && other.end) || (self.error && other.error) {
            return true;
        }
        self.bits.iter().zip(&other.bits).any(|(a, b)| a & b != 0)
    }
}

impl FromIterator<Symbol> for SymbolSet {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        let mut set = Self::new();
        for symbol in iter {
            set.insert(symbol);
        }
        set
    }
}
