/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::NodeId;
use crate::utils::ByteSet;

/// Number of values at which a vector representation switches to a bitmap.
///
/// A 32-byte bitmap breaks even with a vector of 32 single-byte values, so
/// the canonical representation for a set of `n` values is a vector for
/// `n < 32` and a bitmap otherwise.
pub const BITMAP_THRESHOLD: usize = 32;

/// The value set of an edge, in one of its two storage forms.
///
/// A vector holds the matching byte values sorted and duplicate-free; a
/// bitmap marks them in a 256-bit map. An empty set in either form makes
/// the edge an epsilon edge, which matches every byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeValues {
    Vector(Vec<u8>),
    Bitmap(Box<ByteSet>),
}

/// A labelled transition of the intermediate automaton.
///
/// Iteration over the values yields ascending byte order regardless of the
/// representation, so callers never branch on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    target: NodeId,
    advance: bool,
    values: EdgeValues,
}

impl Edge {
    /// Creates an epsilon edge, matching every byte.
    pub fn epsilon(target: NodeId, advance: bool) -> Self {
        Self {
            target,
            advance,
            values: EdgeValues::Vector(Vec::new()),
        }
    }

    /// Creates an edge matching a single byte value.
    pub fn single(target: NodeId, advance: bool, value: u8) -> Self {
        Self {
            target,
            advance,
            values: EdgeValues::Vector(vec![value]),
        }
    }

    /// Creates an edge from a list of byte values.
    ///
    /// The values are sorted and deduplicated; the canonical representation
    /// for the resulting set size is chosen.
    pub fn from_values(target: NodeId, advance: bool, mut values: Vec<u8>) -> Self {
        values.sort_unstable();
        values.dedup();
        if values.len() >= BITMAP_THRESHOLD {
            Self::from_byte_set(target, advance, &values.into_iter().collect())
        } else {
            Self {
                target,
                advance,
                values: EdgeValues::Vector(values),
            }
        }
    }

    /// Creates an edge from a byte set, choosing the canonical
    /// representation for its size.
    pub fn from_byte_set(target: NodeId, advance: bool, set: &ByteSet) -> Self {
        let values = if set.len() >= BITMAP_THRESHOLD {
            EdgeValues::Bitmap(Box::new(*set))
        } else {
            EdgeValues::Vector(set.to_vec())
        };
        Self {
            target,
            advance,
            values,
        }
    }

    /// Returns the target node.
    #[inline(always)]
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Sets the target node.
    pub fn set_target(&mut self, target: NodeId) {
        self.target = target;
    }

    /// Returns whether following this edge consumes the input byte.
    #[inline(always)]
    pub fn advance(&self) -> bool {
        self.advance
    }

    /// Sets the advance flag.
    pub fn set_advance(&mut self, advance: bool) {
        self.advance = advance;
    }

    /// Returns the number of values in the set.
    pub fn size(&self) -> usize {
        match &self.values {
            EdgeValues::Vector(v) => v.len(),
            EdgeValues::Bitmap(b) => b.len(),
        }
    }

    /// Returns true if this is an epsilon edge (empty value set).
    pub fn is_epsilon(&self) -> bool {
        match &self.values {
            EdgeValues::Vector(v) => v.is_empty(),
            EdgeValues::Bitmap(b) => b.is_empty(),
        }
    }

    /// Returns true if the edge is in bitmap representation.
    pub fn is_bitmap(&self) -> bool {
        matches!(self.values, EdgeValues::Bitmap(_))
    }

    /// Returns true if `c` is in the value set.
    ///
    /// O(log n) for the vector representation, O(1) for the bitmap; epsilon
    /// edges contain no value.
    pub fn has_value(&self, c: u8) -> bool {
        match &self.values {
            EdgeValues::Vector(v) => v.binary_search(&c).is_ok(),
            EdgeValues::Bitmap(b) => b.contains(c),
        }
    }

    /// Returns true if the edge matches input byte `c`.
    ///
    /// Unlike [`has_value`](Edge::has_value), epsilon edges match every
    /// byte.
    #[inline]
    pub fn matches(&self, c: u8) -> bool {
        self.is_epsilon() || self.has_value(c)
    }

    /// Adds `c` to the value set, preserving the current representation.
    pub fn add(&mut self, c: u8) {
        match &mut self.values {
            EdgeValues::Vector(v) => {
                if let Err(at) = v.binary_search(&c) {
                    v.insert(at, c);
                }
            }
            EdgeValues::Bitmap(b) => {
                b.insert(c);
            }
        }
    }

    /// Removes `c` from the value set, preserving the current
    /// representation.
    ///
    /// Removing the last value turns the edge into an epsilon edge.
    pub fn remove(&mut self, c: u8) {
        match &mut self.values {
            EdgeValues::Vector(v) => {
                if let Ok(at) = v.binary_search(&c) {
                    v.remove(at);
                }
            }
            EdgeValues::Bitmap(b) => {
                b.remove(c);
            }
        }
    }

    /// Clears the value set, turning the edge into an epsilon edge.
    pub fn clear(&mut self) {
        match &mut self.values {
            EdgeValues::Vector(v) => v.clear(),
            EdgeValues::Bitmap(b) => **b = ByteSet::new(),
        }
    }

    /// Replaces the value set, keeping the current representation.
    pub fn assign_set(&mut self, set: &ByteSet) {
        match &mut self.values {
            EdgeValues::Vector(v) => *v = set.to_vec(),
            EdgeValues::Bitmap(b) => **b = *set,
        }
    }

    /// Converts the value set to bitmap representation.
    pub fn switch_to_bitmap(&mut self) {
        if let EdgeValues::Vector(v) = &self.values {
            let set = v.iter().copied().collect();
            self.values = EdgeValues::Bitmap(Box::new(set));
        }
    }

    /// Converts the value set to vector representation.
    pub fn switch_to_vector(&mut self) {
        if let EdgeValues::Bitmap(b) = &self.values {
            self.values = EdgeValues::Vector(b.to_vec());
        }
    }

    /// Materializes the value set as a [`ByteSet`].
    ///
    /// Epsilon edges yield the empty set; callers deciding on match
    /// semantics must treat that case themselves.
    pub fn byte_set(&self) -> ByteSet {
        match &self.values {
            EdgeValues::Vector(v) => v.iter().copied().collect(),
            EdgeValues::Bitmap(b) => **b,
        }
    }

    /// Returns an iterator over the value set in ascending order.
    pub fn values(&self) -> EdgeValuesIter<'_> {
        match &self.values {
            EdgeValues::Vector(v) => EdgeValuesIter::Vector(v.iter()),
            EdgeValues::Bitmap(b) => EdgeValuesIter::Bitmap(b.iter()),
        }
    }
}

/// Iterator over an edge's value set, lazily decoding either
/// representation.
pub enum EdgeValuesIter<'a> {
    Vector(core::slice::Iter<'a, u8>),
    Bitmap(crate::utils::ByteSetIter<'a>),
}

impl Iterator for EdgeValuesIter<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        match self {
            EdgeValuesIter::Vector(it) => it.next().copied(),
            EdgeValuesIter::Bitmap(it) => it.next(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn target() -> NodeId {
        NodeId(0)
    }

    #[test]
    fn test_representation_switch_preserves_values() {
        let mut edge = Edge::from_values(target(), true, vec![9, 3, 3, 200]);
        assert!(!edge.is_bitmap());
        assert_eq!(edge.values().collect::<Vec<_>>(), vec![3, 9, 200]);
        edge.switch_to_bitmap();
        assert!(edge.is_bitmap());
        assert_eq!(edge.values().collect::<Vec<_>>(), vec![3, 9, 200]);
        assert!(edge.has_value(9));
        assert!(!edge.has_value(10));
        edge.switch_to_vector();
        assert!(!edge.is_bitmap());
        assert_eq!(edge.values().collect::<Vec<_>>(), vec![3, 9, 200]);
    }

    #[test]
    fn test_epsilon_matches_everything() {
        let edge = Edge::epsilon(target(), false);
        assert!(edge.is_epsilon());
        assert_eq!(edge.size(), 0);
        assert!(!edge.has_value(0));
        assert!(edge.matches(0));
        assert!(edge.matches(255));
    }

    #[test]
    fn test_add_remove_keep_order() {
        let mut edge = Edge::single(target(), true, 100);
        edge.add(5);
        edge.add(200);
        edge.add(5);
        assert_eq!(edge.values().collect::<Vec<_>>(), vec![5, 100, 200]);
        edge.remove(100);
        assert_eq!(edge.values().collect::<Vec<_>>(), vec![5, 200]);
        edge.clear();
        assert!(edge.is_epsilon());
    }

    #[test]
    fn test_canonical_representation_choice() {
        let edge = Edge::from_values(target(), true, (0..40).collect());
        assert!(edge.is_bitmap());
        let edge = Edge::from_values(target(), true, (0..10).collect());
        assert!(!edge.is_bitmap());
    }
}
