//! Hash-map type used for ownership and adjacency bookkeeping.

/// Hashmap using [`hashbrown::HashMap`].
pub type HashMap<K, V> = hashbrown::HashMap<K, V>;
