//! Decision trees over instruction words.
//!
//! A tree is built from a classification of every 16-bit word. Internal nodes
//! test one bit window and branch on its value; a span of words that classifies
//! uniformly collapses into a single terminal (or the shared error node).
//! Sparse branch nodes keep a sorted key list instead of a full child array.

/// Index of a node inside its tree.
pub type NodeIndex = u32;

/// Shared reject node.
pub const ERROR: NodeIndex = 0;
/// Shared node a cursor parks on once it has bound its action.
pub const LOOP: NodeIndex = 1;

/// Branch nodes with at most this many live children use binary search.
const SPARSE_LIMIT: usize = 8;

/// Contiguous bit field of the instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Most significant bit of the field.
    pub left_bit: u8,
    /// Field mask after shifting down.
    pub mask: u16,
}

impl Window {
    /// Field value of `word`.
    #[must_use]
    pub const fn extract(self, word: u16) -> u16 {
        let width = self.mask.count_ones();
        (word >> (self.left_bit as u32 + 1 - width)) & self.mask
    }
}

/// Nibble-at-a-time window schedule, most significant first.
pub const SCHEDULE: [Window; 4] = [
    Window {
        left_bit: 15,
        mask: 0xF,
    },
    Window {
        left_bit: 11,
        mask: 0xF,
    },
    Window {
        left_bit: 7,
        mask: 0xF,
    },
    Window {
        left_bit: 3,
        mask: 0xF,
    },
];

const NIBBLE_BITS: u32 = 4;

#[derive(Debug, Clone)]
enum Node<A> {
    Error,
    Loop,
    Terminal(A),
    Array {
        window: Window,
        children: Vec<NodeIndex>,
    },
    Sorted {
        window: Window,
        keys: Vec<(u16, NodeIndex)>,
        default: NodeIndex,
    },
}

/// Result of visiting one node with the current word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit<A> {
    /// Continue at this child.
    Descend(NodeIndex),
    /// Terminal reached; the action is bound.
    Bind(A),
    /// Already bound; waiting for the other tree.
    Parked,
    /// No legal instruction carries these bits.
    Reject,
}

/// Immutable decision tree mapping instruction words to actions of type `A`.
#[derive(Debug, Clone)]
pub struct DecisionTree<A> {
    nodes: Vec<Node<A>>,
    terminals: Vec<(A, NodeIndex)>,
    root: NodeIndex,
}

impl<A: Copy + PartialEq> DecisionTree<A> {
    /// Builds a tree from a per-word classification; `table[word]` is the action
    /// for `word`, `None` for illegal words.
    ///
    /// # Panics
    ///
    /// Panics if `table` does not hold one entry per 16-bit word.
    #[must_use]
    pub fn build(table: &[Option<A>]) -> Self {
        assert_eq!(table.len(), 1 << 16, "one classification per word");
        let mut tree = Self {
            nodes: vec![Node::Error, Node::Loop],
            terminals: Vec::new(),
            root: ERROR,
        };
        tree.root = tree.build_span(table, 0, 0);
        tree
    }

    fn build_span(&mut self, table: &[Option<A>], prefix: usize, depth: usize) -> NodeIndex {
        let width = 16 - NIBBLE_BITS as usize * depth;
        let start = prefix << width;
        let span = &table[start..start + (1 << width)];
        let first = span[0];
        if span.iter().all(|action| *action == first) {
            return first.map_or(ERROR, |action| self.terminal(action));
        }

        let window = SCHEDULE[depth];
        let children: Vec<NodeIndex> = (0..=usize::from(window.mask))
            .map(|nibble| self.build_span(table, (prefix << NIBBLE_BITS) | nibble, depth + 1))
            .collect();
        let live = children.iter().filter(|child| **child != ERROR).count();
        let node = if live <= SPARSE_LIMIT {
            Node::Sorted {
                window,
                keys: children
                    .iter()
                    .zip(0u16..)
                    .filter(|(child, _)| **child != ERROR)
                    .map(|(child, key)| (key, *child))
                    .collect(),
                default: ERROR,
            }
        } else {
            Node::Array { window, children }
        };
        self.push(node)
    }

    fn terminal(&mut self, action: A) -> NodeIndex {
        if let Some((_, id)) = self.terminals.iter().find(|(known, _)| *known == action) {
            return *id;
        }
        let id = self.push(Node::Terminal(action));
        self.terminals.push((action, id));
        id
    }

    fn push(&mut self, node: Node<A>) -> NodeIndex {
        let id = NodeIndex::try_from(self.nodes.len()).unwrap_or(ERROR);
        self.nodes.push(node);
        id
    }

    /// Entry node.
    #[must_use]
    pub const fn root(&self) -> NodeIndex {
        self.root
    }

    /// Number of nodes, including the shared error and loop nodes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree holds at least its shared nodes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visits `node` with `word`.
    #[must_use]
    pub fn visit(&self, node: NodeIndex, word: u16) -> Visit<A> {
        match self.nodes.get(node as usize) {
            None | Some(Node::Error) => Visit::Reject,
            Some(Node::Loop) => Visit::Parked,
            Some(Node::Terminal(action)) => Visit::Bind(*action),
            Some(Node::Array { window, children }) => Visit::Descend(
                children
                    .get(usize::from(window.extract(word)))
                    .copied()
                    .unwrap_or(ERROR),
            ),
            Some(Node::Sorted {
                window,
                keys,
                default,
            }) => {
                let bits = window.extract(word);
                let child = keys
                    .binary_search_by_key(&bits, |(key, _)| *key)
                    .map_or(*default, |position| keys[position].1);
                Visit::Descend(child)
            }
        }
    }

    /// Follows `word` from the root to its action, if any.
    #[must_use]
    pub fn lookup(&self, word: u16) -> Option<A> {
        let mut node = self.root;
        loop {
            match self.visit(node, word) {
                Visit::Descend(next) => node = next,
                Visit::Bind(action) => return Some(action),
                Visit::Parked | Visit::Reject => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DecisionTree, Visit, Window, ERROR, LOOP};

    fn table(classify: impl Fn(u16) -> Option<u8>) -> Vec<Option<u8>> {
        (0..=u16::MAX).map(classify).collect()
    }

    #[test]
    fn window_extracts_nibbles() {
        let top = Window {
            left_bit: 15,
            mask: 0xF,
        };
        let low = Window {
            left_bit: 3,
            mask: 0xF,
        };
        assert_eq!(top.extract(0xA123), 0xA);
        assert_eq!(low.extract(0xA123), 0x3);
    }

    #[test]
    fn uniform_table_collapses_to_a_terminal() {
        let tree = DecisionTree::build(&table(|_| Some(7)));
        assert_eq!(tree.visit(tree.root(), 0x1234), Visit::Bind(7));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn empty_table_rejects_everything() {
        let tree = DecisionTree::<u8>::build(&table(|_| None));
        assert_eq!(tree.root(), ERROR);
        assert_eq!(tree.lookup(0), None);
    }

    #[test]
    fn lookup_matches_the_classification() {
        let classify = |word: u16| match word >> 12 {
            0x0 => Some(1),
            0x9 if word & 0x000F == 0x5 => Some(2),
            0xF => Some(3),
            _ => None,
        };
        let tree = DecisionTree::build(&table(classify));
        for word in (0..=u16::MAX).step_by(7) {
            assert_eq!(tree.lookup(word), classify(word), "word {word:#06x}");
        }
    }

    #[test]
    fn loop_node_parks() {
        let tree = DecisionTree::build(&table(|_| Some(1)));
        assert_eq!(tree.visit(LOOP, 0), Visit::<u8>::Parked);
        assert_eq!(tree.visit(ERROR, 0), Visit::<u8>::Reject);
    }
}
