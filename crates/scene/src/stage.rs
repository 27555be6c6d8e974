//! The owning store and its access scopes.
//!
//! A [`Stage`] owns the composed tree and the type-info cache and maps the
//! single-writer/many-readers discipline onto guard types: [`Stage::read`]
//! hands out shared guards that expose only the read-only [`SceneTree`]
//! surface, while [`Stage::edit`] hands out the exclusive [`StageWriter`]
//! capability, the sole path to linkage mutation. Readers can never observe
//! a half-built tree.
//!
//! The type-info cache sits outside the tree lock: interning new types is
//! safe from read scope and write scope alike.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::ComposeError;
use crate::flags::NodeFlags;
use crate::instancing::InstanceKey;
use crate::tree::{NodeId, SceneTree};
use crate::typeinfo::{SchemaRegistry, TypeInfoCache, TypeKey};

/// The owning store for one composed scene graph.
#[derive(Debug)]
pub struct Stage {
	tree: RwLock<SceneTree>,
	types: TypeInfoCache,
}

impl Stage {
	/// Creates an empty stage with no registered schemas.
	pub fn new() -> Self {
		Self::with_schemas(Arc::new(SchemaRegistry::new()))
	}

	/// Creates an empty stage resolving type definitions against `schemas`.
	pub fn with_schemas(schemas: Arc<SchemaRegistry>) -> Self {
		Self {
			tree: RwLock::new(SceneTree::new()),
			types: TypeInfoCache::new(schemas),
		}
	}

	/// Enters read scope: many readers may traverse concurrently.
	pub fn read(&self) -> StageReader<'_> {
		StageReader(self.tree.read())
	}

	/// Enters write scope: exclusive access for composition updates.
	pub fn edit(&self) -> StageWriter<'_> {
		StageWriter {
			tree: self.tree.write(),
			types: &self.types,
		}
	}

	/// The stage's type-interning cache.
	///
	/// Usable concurrently with both read and write scopes.
	pub fn type_cache(&self) -> &TypeInfoCache {
		&self.types
	}
}

impl Default for Stage {
	fn default() -> Self {
		Self::new()
	}
}

/// Shared read guard over the composed tree.
pub struct StageReader<'a>(RwLockReadGuard<'a, SceneTree>);

impl Deref for StageReader<'_> {
	type Target = SceneTree;

	fn deref(&self) -> &SceneTree {
		&self.0
	}
}

/// Exclusive writer capability: the only way to mutate tree linkage.
///
/// Derefs to [`SceneTree`] so the full read-only surface stays available
/// mid-edit.
pub struct StageWriter<'a> {
	tree: RwLockWriteGuard<'a, SceneTree>,
	types: &'a TypeInfoCache,
}

impl Deref for StageWriter<'_> {
	type Target = SceneTree;

	fn deref(&self) -> &SceneTree {
		&self.tree
	}
}

impl StageWriter<'_> {
	/// Creates a node named `name` under `parent`, appended at the tail of
	/// the sibling chain so children enumerate in authored order.
	pub fn add_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, ComposeError> {
		let parent_index = self.tree.node(parent).index;
		let index = self.tree.create_child(parent_index, name)?;
		Ok(self.tree.id(index))
	}

	/// Stores the node's composed flag snapshot. Called once per node after
	/// composition has produced its source facts.
	pub fn compose_flags(&mut self, id: NodeId, flags: NodeFlags) {
		let index = self.tree.node(id).index;
		self.tree.compose_flags(index, flags);
	}

	/// Resolves `key` through the stage's type cache and assigns the
	/// interned info to the node.
	pub fn set_type(&mut self, id: NodeId, key: &TypeKey) {
		let index = self.tree.node(id).index;
		let info = self.types.find_or_create(key);
		self.tree.set_type(index, key.type_name().clone(), info);
	}

	/// Registers `root` as the prototype subtree for `key`.
	pub fn register_prototype(&mut self, key: InstanceKey, root: NodeId) {
		let index = self.tree.node(root).index;
		debug!(key = ?key, root = %self.tree.node(root).path(), "registered prototype");
		self.tree.register_prototype(key, index);
	}

	/// Binds an instance node to the prototype registered for `key`.
	///
	/// Returns false when no prototype is registered under `key`.
	pub fn bind_instance(&mut self, id: NodeId, key: &InstanceKey) -> bool {
		let index = self.tree.node(id).index;
		self.tree.bind_instance(index, key)
	}

	/// Destroys `id` and its descendants. Their handles become stale and
	/// the nodes are marked dead before their slots are recycled.
	pub fn remove_subtree(&mut self, id: NodeId) {
		let index = self.tree.node(id).index;
		self.tree.remove_subtree(index);
	}
}
