//! Hash-set type used for the face and vertex sets of dynamic-topology leaves.

/// Hashset using [`hashbrown::HashSet`].
pub type HashSet<K> = hashbrown::HashSet<K>;
