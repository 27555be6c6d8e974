//! In-memory composed scene-graph store.
//!
//! The tree of composed nodes a scene-description system exposes to readers
//! after composition: a compact first-child/tagged-sibling encoding over a
//! generation-checked arena, bitmask flag predicates for O(1) filtered
//! traversal, transparent instancing onto shared prototype subtrees, and a
//! concurrent flyweight cache for per-node type metadata.
//!
//! Composition itself (which layers contribute opinions where), value
//! resolution, and serialization are external collaborators; this crate
//! only builds, queries, and traverses the composed tree in memory.

/// Error types for path parsing and composition.
pub mod error;
/// Cached per-node boolean flags.
pub mod flags;
/// Instancing: prototypes, instance keys, and proxy cursors.
pub mod instancing;
/// Scene paths and name tokens.
pub mod path;
/// Flag predicates: terms, conjunctions, disjunctions.
pub mod predicate;
/// The owning store and its read/write scopes.
pub mod stage;
/// Tag bits packed into aligned words.
pub mod tagged;
/// Filtered sibling and subtree traversal.
pub mod traverse;
/// The node arena and tree linkage.
pub mod tree;
/// Flyweight type metadata and its interning cache.
pub mod typeinfo;

pub use error::{ComposeError, PathError};
pub use flags::NodeFlags;
pub use instancing::{Advance, InstanceKey, InstancingCursor};
pub use path::{ScenePath, Token};
pub use predicate::{Conjunction, Disjunction, FlagPredicate, Term, default_predicate};
pub use stage::{Stage, StageReader, StageWriter};
pub use traverse::{Children, NodeEntry, Subtree, Visit};
pub use tree::{NodeId, NodeRef, SceneTree};
pub use typeinfo::{SchemaRegistry, TypeDefinition, TypeInfo, TypeInfoCache, TypeKey};
