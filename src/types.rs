//! Type-safe index wrappers for nodes, cliques, formulas and components.
//!
//! Every record of an engine lives in a flat array, and these newtypes are the
//! indices into those arrays. They are assigned once at construction and never
//! reused, so a stale id can never silently point at a different record.
use std::fmt;

use serde::Serialize;

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates a new id from a raw index.
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw index as a `usize`, suitable for indexing.
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Returns the raw index as a `u32`.
            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<usize> for $name {
            /// # Panics
            ///
            /// Panics if `index` does not fit in a `u32`.
            fn from(index: usize) -> Self {
                match u32::try_from(index) {
                    Ok(raw) => Self(raw),
                    Err(_) => panic!("index {} does not fit in u32", index),
                }
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> Self {
                id.index()
            }
        }
    };
}

index_type!(
    /// A network variable, numbered in network insertion order.
    ///
    /// Formula domains are sorted by `NodeId`, so the numbering also fixes
    /// the memory layout of every potential.
    NodeId,
    "v"
);

index_type!(
    /// A clique of the junction tree, numbered in topology order.
    CliqueId,
    "c"
);

index_type!(
    /// A slot of the formula arena (and of the potential cache).
    FormulaId,
    "#"
);

index_type!(
    /// A connected component of the junction tree.
    ComponentId,
    "cc"
);

index_type!(
    /// A separator (junction tree edge).
    SeparatorId,
    "s"
);
