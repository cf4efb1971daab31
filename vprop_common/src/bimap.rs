//! Bidirectional id lookup shared by the domain handlers.
//!
//! Every handler translates between its own domain ids ("manager" side) and
//! packed vehicle property ids ("hal" side). Built once from a table of
//! pairs; immutable afterwards.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// Error building a bimap from parallel arrays.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BimapError {
    /// The two arrays differ in length.
    #[error("id arrays differ in length: {manager} manager ids, {hal} hal ids")]
    LengthMismatch { manager: usize, hal: usize },

    /// An id appears twice on one side.
    #[error("duplicate id in table: {0}")]
    Duplicate(String),
}

/// Two-way map between manager ids and hal ids.
#[derive(Debug, Clone)]
pub struct IdBimap<M, H> {
    to_hal: HashMap<M, H>,
    to_manager: HashMap<H, M>,
}

impl<M, H> IdBimap<M, H>
where
    M: Copy + Eq + Hash + Debug,
    H: Copy + Eq + Hash + Debug,
{
    /// Build from a table of `(manager, hal)` pairs.
    ///
    /// # Panics
    /// Panics if an id appears twice on either side.
    pub fn from_pairs(pairs: &[(M, H)]) -> Self {
        match Self::try_from_iter(pairs.iter().copied()) {
            Ok(map) => map,
            Err(e) => panic!("invalid id table: {e}"),
        }
    }

    /// Build from two arrays where `manager[i]` pairs with `hal[i]`.
    pub fn try_from_arrays(manager: &[M], hal: &[H]) -> Result<Self, BimapError> {
        if manager.len() != hal.len() {
            return Err(BimapError::LengthMismatch {
                manager: manager.len(),
                hal: hal.len(),
            });
        }
        Self::try_from_iter(manager.iter().copied().zip(hal.iter().copied()))
    }

    fn try_from_iter(pairs: impl Iterator<Item = (M, H)>) -> Result<Self, BimapError> {
        let mut to_hal = HashMap::new();
        let mut to_manager = HashMap::new();
        for (m, h) in pairs {
            if to_hal.insert(m, h).is_some() {
                return Err(BimapError::Duplicate(format!("{m:?}")));
            }
            if to_manager.insert(h, m).is_some() {
                return Err(BimapError::Duplicate(format!("{h:?}")));
            }
        }
        Ok(Self { to_hal, to_manager })
    }

    pub fn hal_id(&self, manager_id: M) -> Option<H> {
        self.to_hal.get(&manager_id).copied()
    }

    pub fn manager_id(&self, hal_id: H) -> Option<M> {
        self.to_manager.get(&hal_id).copied()
    }

    pub fn contains_hal(&self, hal_id: H) -> bool {
        self.to_manager.contains_key(&hal_id)
    }

    pub fn len(&self) -> usize {
        self.to_hal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_hal.is_empty()
    }

    /// Iterate `(manager, hal)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (M, H)> + '_ {
        self.to_hal.iter().map(|(m, h)| (*m, *h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_both_directions() {
        let map: IdBimap<i32, i32> = IdBimap::from_pairs(&[(1, 0x100), (2, 0x200)]);
        assert_eq!(map.hal_id(1), Some(0x100));
        assert_eq!(map.manager_id(0x200), Some(2));
        assert_eq!(map.hal_id(3), None);
        assert!(map.contains_hal(0x100));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn arrays_length_mismatch() {
        let err = IdBimap::<i32, i32>::try_from_arrays(&[1, 2], &[10]).unwrap_err();
        assert_eq!(err, BimapError::LengthMismatch { manager: 2, hal: 1 });
    }

    #[test]
    fn arrays_duplicate_hal_id() {
        let err = IdBimap::<i32, i32>::try_from_arrays(&[1, 2], &[10, 10]).unwrap_err();
        assert!(matches!(err, BimapError::Duplicate(_)));
    }

    #[test]
    #[should_panic(expected = "invalid id table")]
    fn pairs_duplicate_manager_panics() {
        let _ = IdBimap::<i32, i32>::from_pairs(&[(1, 10), (1, 11)]);
    }
}
