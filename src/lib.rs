//! # lazyprop-rs: Lazy Junction-Tree Inference in Rust
//!
//! **`lazyprop-rs`** performs exact inference on discrete **Bayesian networks** with the
//! junction-tree algorithm, using *lazy, symbolic* propagation: message passing happens once,
//! over formulas instead of numbers, and numeric potentials are computed only when a query needs them.
//!
//! ## How does it work?
//!
//! Message passing over a junction tree does not depend on the evidence, only on the tree.
//! So instead of passing numeric messages after every evidence change, the engine passes
//! *symbolic* messages once, at construction, and records them as a graph of formulas:
//! products, marginals, references to CPTs and evidence indicators.
//! Formulas are **hash-consed**: structurally equal formulas share one arena entry,
//! exactly like nodes of a decision diagram share one unique-table entry.
//!
//! Numbers live in a cache next to the arena. A query evaluates the formulas it needs and
//! caches every intermediate result. Setting evidence or replacing a CPT changes one leaf
//! and empties the cache slots that depend on it; the rest stays warm.
//!
//! ## Key Features
//!
//! - **Build once**: the formula graph depends only on the network and its junction tree.
//! - **Evaluate on demand**: repeated queries without intervening changes cost no computation.
//! - **Precise invalidation**: evidence and CPT changes only empty what actually depends on them.
//! - **Atomic updates**: batched evidence is validated completely before anything changes.
//!
//! ## Basic Usage
//!
//! ```rust
//! use indexmap::IndexMap;
//! use lazyprop_rs::engine::{InferenceEngine, LazyPropagationEngine};
//! use lazyprop_rs::network::Network;
//! use lazyprop_rs::topology::{CliqueSpec, JunctionTree};
//!
//! // 1. Describe the network
//! let network: Network = serde_json::from_str(r#"{
//!     "Rain": { "parents": [], "states": ["yes", "no"], "cpt": { "yes": 0.2, "no": 0.8 } },
//!     "Wet": {
//!         "parents": ["Rain"],
//!         "states": ["yes", "no"],
//!         "cpt": [
//!             { "when": { "Rain": "yes" }, "then": { "yes": 0.9, "no": 0.1 } },
//!             { "when": { "Rain": "no" }, "then": { "yes": 0.1, "no": 0.9 } }
//!         ]
//!     }
//! }"#).unwrap();
//!
//! // 2. Supply its junction tree
//! let tree = JunctionTree {
//!     cliques: vec![CliqueSpec { name: "RW".into(), members: vec!["Rain".into(), "Wet".into()] }],
//!     separators: vec![],
//!     factors: IndexMap::from([("Rain".to_string(), 0), ("Wet".to_string(), 0)]),
//! };
//!
//! // 3. Build the engine and query it
//! let mut engine = LazyPropagationEngine::new(network, &tree).unwrap();
//! engine.set_evidence(&IndexMap::from([("Wet".to_string(), "yes".to_string())])).unwrap();
//! let rain = engine.infer(&IndexMap::from([("Rain".to_string(), "yes".to_string())])).unwrap();
//! assert!((rain - 0.18 / 0.26).abs() < 1e-9);
//! ```
//!
//! ## Core Components
//!
//! - **[`engine`]**: The [`LazyPropagationEngine`][crate::engine::LazyPropagationEngine] and the [`InferenceEngine`][crate::engine::InferenceEngine] trait.
//! - **[`arena`]**: The hash-consed formula arena and its algebra.
//! - **[`propagation`]**: Symbolic collect/distribute message passing.
//! - **[`eval`]** and **[`cache`]**: Demand-driven evaluation and cascading invalidation.
//! - **[`dot`]**: Visualizing the formula graph using Graphviz.
//!
//! Building the junction tree itself (moralization, triangulation) is out of scope:
//! the engine consumes one through [`TopologyProvider`][crate::topology::TopologyProvider].

pub mod arena;
pub mod assembly;
pub mod cache;
pub mod clique;
pub mod debug;
pub mod dot;
pub mod engine;
pub mod error;
pub mod eval;
pub mod formula;
pub mod network;
pub mod node;
pub mod potential;
pub mod propagation;
pub mod snapshot;
pub mod topology;
pub mod types;
