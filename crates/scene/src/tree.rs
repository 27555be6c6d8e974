//! The composed node arena and its tree linkage.
//!
//! Nodes live in a slab arena and are addressed by generation-checked
//! [`NodeId`] handles: destroying a subtree bumps the generation of every
//! freed slot, so stale handles fail a cheap validity check instead of
//! reading recycled memory.
//!
//! The hierarchy is encoded the compact way: each node holds an exclusive
//! link to its first child plus one [`TaggedSlot`] that is either the next
//! sibling (tag `SIBLING`) or, for the last child, a walk-back link to the
//! parent (tag `PARENT_RETURN`). Following sibling links from any node
//! therefore terminates at a parent-return link or at the pseudo-root,
//! never cycling, and subtree iteration needs no separate parent array.
//!
//! All linkage mutation lives behind `pub(crate)` methods driven by the
//! stage's writer capability; readers only ever see a fully linked tree.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slab::Slab;
use tracing::trace;

use crate::error::ComposeError;
use crate::flags::NodeFlags;
use crate::instancing::InstanceKey;
use crate::path::{ScenePath, Token};
use crate::tagged::{Packed, TaggedSlot};
use crate::typeinfo::TypeInfo;

/// Internal arena index. Not exposed; readers hold [`NodeId`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeIndex(u32);

impl Packed for NodeIndex {
	// Two spare bits; the link tag needs one.
	const ALIGN: usize = 4;

	fn into_word(self) -> usize {
		(self.0 as usize) << 2
	}

	fn from_word(word: usize) -> Self {
		Self((word >> 2) as u32)
	}
}

/// Tag value: the link target is the next sibling.
pub(crate) const LINK_SIBLING: usize = 0;
/// Tag value: this node is the last child; the link target is the parent.
pub(crate) const LINK_PARENT_RETURN: usize = 1;

/// A sibling-or-parent link.
pub(crate) type Link = TaggedSlot<NodeIndex>;

/// Generation-checked handle to a composed node.
///
/// Copyable and cheap; resolving it against the tree validates the slot
/// generation, so handles left over from a destroyed subtree fail loudly
/// (or quietly, through [`SceneTree::try_node`]) rather than dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
	pub(crate) index: NodeIndex,
	pub(crate) generation: u32,
}

/// One composed node record.
#[derive(Debug)]
pub(crate) struct NodeData {
	pub(crate) path: ScenePath,
	pub(crate) type_name: Token,
	pub(crate) type_info: Option<Arc<TypeInfo>>,
	pub(crate) flags: NodeFlags,
	pub(crate) flags_composed: bool,
	pub(crate) first_child: Option<NodeIndex>,
	pub(crate) next: Option<Link>,
	/// Instance binding, as a generation-checked handle: removing the
	/// prototype subtree leaves this stale, and stale bindings read as
	/// unbound.
	pub(crate) prototype: Option<NodeId>,
}

impl NodeData {
	fn new(path: ScenePath) -> Self {
		Self {
			path,
			type_name: Token::empty(),
			type_info: None,
			flags: NodeFlags::empty(),
			flags_composed: false,
			first_child: None,
			next: None,
			prototype: None,
		}
	}
}

/// The composed scene tree: node arena, path index, and prototype registry.
///
/// Obtained from a [`Stage`](crate::stage::Stage) through its read or write
/// guards; the guards enforce the single-writer/many-readers discipline.
#[derive(Debug)]
pub struct SceneTree {
	arena: Slab<NodeData>,
	/// Per-slot generation, preserved across slab reuse.
	generations: Vec<u32>,
	path_index: FxHashMap<ScenePath, NodeIndex>,
	prototypes: FxHashMap<InstanceKey, NodeIndex>,
	prototype_keys: FxHashMap<NodeIndex, InstanceKey>,
	root: NodeIndex,
}

impl SceneTree {
	pub(crate) fn new() -> Self {
		let mut arena = Slab::new();
		let mut pseudo_root = NodeData::new(ScenePath::root());
		pseudo_root.flags =
			NodeFlags::PSEUDO_ROOT | NodeFlags::ACTIVE | NodeFlags::DEFINED | NodeFlags::LOADED;
		pseudo_root.flags_composed = true;
		let root = NodeIndex(arena.insert(pseudo_root) as u32);
		let mut path_index = FxHashMap::default();
		path_index.insert(ScenePath::root(), root);
		Self {
			arena,
			generations: vec![0],
			path_index,
			prototypes: FxHashMap::default(),
			prototype_keys: FxHashMap::default(),
			root,
		}
	}

	/// The pseudo-root node (`/`).
	pub fn pseudo_root(&self) -> NodeId {
		self.id(self.root)
	}

	/// The number of live nodes, pseudo-root included.
	pub fn len(&self) -> usize {
		self.arena.len()
	}

	/// True when only the pseudo-root exists.
	pub fn is_empty(&self) -> bool {
		self.arena.len() == 1
	}

	/// Resolves a handle, returning `None` for stale or dead handles.
	pub fn try_node(&self, id: NodeId) -> Option<NodeRef<'_>> {
		let index = id.index.0 as usize;
		if self.generations.get(index) != Some(&id.generation) {
			return None;
		}
		let data = self.arena.get(index)?;
		if data.flags.contains(NodeFlags::DEAD) {
			return None;
		}
		Some(NodeRef {
			tree: self,
			index: id.index,
			data,
		})
	}

	/// Resolves a handle.
	///
	/// # Panics
	///
	/// Panics if the handle is stale or the node is dead; holding on to a
	/// handle across the destruction of its subtree is a programming error.
	pub fn node(&self, id: NodeId) -> NodeRef<'_> {
		match self.try_node(id) {
			Some(node) => node,
			None => panic!("dereferenced a dead or stale scene node handle: {id:?}"),
		}
	}

	/// Looks up the node at an absolute path, if any.
	pub fn node_at_path(&self, path: &ScenePath) -> Option<NodeId> {
		self.path_index.get(path).map(|&index| self.id(index))
	}

	pub(crate) fn id(&self, index: NodeIndex) -> NodeId {
		NodeId {
			index,
			generation: self.generations[index.0 as usize],
		}
	}

	pub(crate) fn data(&self, index: NodeIndex) -> &NodeData {
		&self.arena[index.0 as usize]
	}

	fn data_mut(&mut self, index: NodeIndex) -> &mut NodeData {
		&mut self.arena[index.0 as usize]
	}

	pub(crate) fn root_index(&self) -> NodeIndex {
		self.root
	}

	// --- navigation over the tagged links ---

	pub(crate) fn first_child_index(&self, index: NodeIndex) -> Option<NodeIndex> {
		self.data(index).first_child
	}

	pub(crate) fn next_sibling_index(&self, index: NodeIndex) -> Option<NodeIndex> {
		match self.data(index).next {
			Some(link) if link.tag() == LINK_SIBLING => Some(link.value()),
			_ => None,
		}
	}

	/// Walks sibling links to the parent-return link.
	pub(crate) fn parent_index(&self, index: NodeIndex) -> Option<NodeIndex> {
		let mut cur = index;
		loop {
			let link = self.data(cur).next?;
			if link.tag() == LINK_PARENT_RETURN {
				return Some(link.value());
			}
			cur = link.value();
		}
	}

	/// The next node in an unfiltered pre-order walk: first child, else next
	/// sibling, else the nearest ancestor's next sibling.
	pub(crate) fn next_in_preorder_index(&self, index: NodeIndex) -> Option<NodeIndex> {
		if let Some(child) = self.data(index).first_child {
			return Some(child);
		}
		let mut cur = index;
		loop {
			let link = self.data(cur).next?;
			if link.tag() == LINK_SIBLING {
				return Some(link.value());
			}
			cur = link.value();
		}
	}

	// --- prototype registry (readers) ---

	/// The prototype root an instance node is bound to, unless the binding
	/// has gone stale because the prototype subtree was removed.
	pub fn prototype_of(&self, id: NodeId) -> Option<NodeId> {
		let node = self.node(id);
		let proto = node.data.prototype?;
		self.try_node(proto)?;
		Some(proto)
	}

	/// Validates an instance's binding, returning the prototype root's arena
	/// index only while the prototype is still alive.
	pub(crate) fn live_prototype(&self, index: NodeIndex) -> Option<NodeIndex> {
		let proto = self.data(index).prototype?;
		self.try_node(proto)?;
		Some(proto.index)
	}

	/// The prototype root registered for an instance key.
	pub fn prototype_for_key(&self, key: &InstanceKey) -> Option<NodeId> {
		self.prototypes.get(key).map(|&index| self.id(index))
	}

	/// The instance key a prototype root was registered under.
	pub fn prototype_key(&self, id: NodeId) -> Option<&InstanceKey> {
		let node = self.node(id);
		self.prototype_keys.get(&node.index)
	}

	/// True if the node is the root of a registered prototype subtree.
	pub fn is_prototype_root(&self, id: NodeId) -> bool {
		let node = self.node(id);
		self.prototype_keys.contains_key(&node.index)
	}

	// --- mutation (write scope only; driven by the stage writer) ---

	pub(crate) fn create_child(
		&mut self,
		parent: NodeIndex,
		name: &str,
	) -> Result<NodeIndex, ComposeError> {
		let path = self.data(parent).path.child(name)?;
		if self.path_index.contains_key(&path) {
			return Err(ComposeError::DuplicatePath(path.as_str().to_owned()));
		}
		let index = NodeIndex(self.arena.insert(NodeData::new(path.clone())) as u32);
		if self.generations.len() <= index.0 as usize {
			self.generations.resize(index.0 as usize + 1, 0);
		}
		self.path_index.insert(path, index);
		self.link_last_child(parent, index);
		trace!(path = %self.data(index).path, "created node");
		Ok(index)
	}

	/// Appends `child` at the tail of `parent`'s sibling chain, so children
	/// enumerate in authored order.
	fn link_last_child(&mut self, parent: NodeIndex, child: NodeIndex) {
		self.data_mut(child).next = Some(Link::new(parent, LINK_PARENT_RETURN));
		match self.data(parent).first_child {
			None => self.data_mut(parent).first_child = Some(child),
			Some(first) => {
				let mut last = first;
				while let Some(next) = self.next_sibling_index(last) {
					last = next;
				}
				self.data_mut(last).next = Some(Link::new(child, LINK_SIBLING));
			}
		}
	}

	/// Stores the composed flags snapshot. Prototype membership propagates
	/// from the parent so whole prototype subtrees stay consistently marked.
	pub(crate) fn compose_flags(&mut self, index: NodeIndex, flags: NodeFlags) {
		debug_assert!(
			!self.data(index).flags_composed,
			"flags are composed once per node: {}",
			self.data(index).path,
		);
		let mut flags = flags - NodeFlags::PSEUDO_ROOT - NodeFlags::DEAD;
		let in_prototype = self
			.parent_index(index)
			.is_some_and(|p| self.data(p).flags.contains(NodeFlags::IN_PROTOTYPE))
			|| self.prototype_keys.contains_key(&index);
		flags.set(NodeFlags::IN_PROTOTYPE, in_prototype);
		let data = self.data_mut(index);
		data.flags = flags;
		data.flags_composed = true;
	}

	pub(crate) fn set_type(&mut self, index: NodeIndex, type_name: Token, info: Arc<TypeInfo>) {
		let data = self.data_mut(index);
		data.type_name = type_name;
		data.type_info = Some(info);
	}

	/// Registers `root` as the prototype subtree shared by every instance
	/// with `key`, marking the whole subtree as prototype-resident.
	pub(crate) fn register_prototype(&mut self, key: InstanceKey, root: NodeIndex) {
		self.prototypes.insert(key.clone(), root);
		self.prototype_keys.insert(root, key);
		let mut cur = Some(root);
		while let Some(index) = cur {
			self.data_mut(index).flags.insert(NodeFlags::IN_PROTOTYPE);
			cur = self.next_in_preorder_index(index).filter(|&n| self.is_in_subtree(n, root));
		}
	}

	/// Binds an instance node to the prototype registered for `key`.
	/// Returns false when no such prototype exists.
	pub(crate) fn bind_instance(&mut self, index: NodeIndex, key: &InstanceKey) -> bool {
		let Some(&proto) = self.prototypes.get(key) else {
			return false;
		};
		let proto = self.id(proto);
		let data = self.data_mut(index);
		data.prototype = Some(proto);
		data.flags.insert(NodeFlags::INSTANCE);
		true
	}

	fn is_in_subtree(&self, node: NodeIndex, root: NodeIndex) -> bool {
		let mut cur = Some(node);
		while let Some(i) = cur {
			if i == root {
				return true;
			}
			cur = self.parent_index(i);
		}
		false
	}

	/// Destroys `index` and its descendants: unlinks the subtree from the
	/// parent chain, marks every node dead, clears links, and bumps slot
	/// generations so in-flight handles fail their validity checks. Instances
	/// bound to a prototype inside the subtree are left with a stale binding,
	/// which reads as unbound from then on.
	pub(crate) fn remove_subtree(&mut self, index: NodeIndex) {
		debug_assert!(index != self.root, "the pseudo-root cannot be removed");
		self.unlink_from_parent(index);

		// Collect before condemning so link walks see intact structure.
		let mut doomed = Vec::new();
		let mut cur = Some(index);
		while let Some(i) = cur {
			doomed.push(i);
			cur = self.next_in_preorder_index(i).filter(|&n| self.is_in_subtree(n, index));
		}

		for i in doomed {
			let data = self.data_mut(i);
			data.flags.insert(NodeFlags::DEAD);
			data.first_child = None;
			data.next = None;
			data.type_info = None;
			data.prototype = None;
			let path = data.path.clone();
			self.path_index.remove(&path);
			if let Some(key) = self.prototype_keys.remove(&i) {
				self.prototypes.remove(&key);
			}
			self.generations[i.0 as usize] = self.generations[i.0 as usize].wrapping_add(1);
			self.arena.remove(i.0 as usize);
			trace!(path = %path, "destroyed node");
		}
	}

	fn unlink_from_parent(&mut self, index: NodeIndex) {
		let Some(parent) = self.parent_index(index) else {
			return;
		};
		let removed_next = self.data(index).next;
		if self.data(parent).first_child == Some(index) {
			self.data_mut(parent).first_child = match removed_next {
				Some(link) if link.tag() == LINK_SIBLING => Some(link.value()),
				_ => None,
			};
			return;
		}
		let mut prev = self.data(parent).first_child;
		while let Some(p) = prev {
			if self.next_sibling_index(p) == Some(index) {
				// Inherit the removed node's link: either the next sibling
				// or the parent-return marker.
				self.data_mut(p).next = removed_next;
				return;
			}
			prev = self.next_sibling_index(p);
		}
		debug_assert!(false, "node {} not found among its parent's children", self.data(index).path);
	}
}

/// A validated borrow of one node, carrying its read-only queries.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
	pub(crate) tree: &'t SceneTree,
	pub(crate) index: NodeIndex,
	pub(crate) data: &'t NodeData,
}

impl<'t> NodeRef<'t> {
	/// This node's handle.
	pub fn id(&self) -> NodeId {
		self.tree.id(self.index)
	}

	/// The absolute composed path.
	pub fn path(&self) -> &'t ScenePath {
		&self.data.path
	}

	/// The final path component.
	pub fn name(&self) -> &'t str {
		self.data.path.name()
	}

	/// The cached flag snapshot.
	pub fn flags(&self) -> NodeFlags {
		self.data.flags
	}

	/// The composed type name.
	pub fn type_name(&self) -> &'t Token {
		&self.data.type_name
	}

	/// The interned type metadata, if a type was composed.
	pub fn type_info(&self) -> Option<&'t Arc<TypeInfo>> {
		self.data.type_info.as_ref()
	}

	/// True unless composition deactivated this node.
	pub fn is_active(&self) -> bool {
		self.data.flags.contains(NodeFlags::ACTIVE)
	}

	/// True when the node's payloads, if any, are loaded.
	pub fn is_loaded(&self) -> bool {
		self.data.flags.contains(NodeFlags::LOADED)
	}

	/// True when the node's kind classifies it as a model.
	pub fn is_model(&self) -> bool {
		self.data.flags.contains(NodeFlags::MODEL)
	}

	/// True when the node's kind classifies it as a group.
	pub fn is_group(&self) -> bool {
		self.data.flags.contains(NodeFlags::GROUP)
	}

	/// True when the node has class ancestry.
	pub fn is_abstract(&self) -> bool {
		self.data.flags.contains(NodeFlags::ABSTRACT)
	}

	/// True when the node is backed by a defining specifier.
	pub fn is_defined(&self) -> bool {
		self.data.flags.contains(NodeFlags::DEFINED)
	}

	/// True when the node itself carries a defining specifier.
	pub fn has_defining_specifier(&self) -> bool {
		self.data.flags.contains(NodeFlags::HAS_DEFINING_SPECIFIER)
	}

	/// True when the node is an instance.
	pub fn is_instance(&self) -> bool {
		self.data.flags.contains(NodeFlags::INSTANCE)
	}

	/// True when the node lives inside a prototype subtree.
	pub fn is_in_prototype(&self) -> bool {
		self.data.flags.contains(NodeFlags::IN_PROTOTYPE)
	}

	/// True when the node has an authored payload arc.
	pub fn has_payload(&self) -> bool {
		self.data.flags.contains(NodeFlags::HAS_PAYLOAD)
	}

	/// True when the node may be affected by value clips.
	pub fn may_have_clips(&self) -> bool {
		self.data.flags.contains(NodeFlags::MAY_HAVE_CLIPS)
	}

	/// True for the stage's pseudo-root.
	pub fn is_pseudo_root(&self) -> bool {
		self.data.flags.contains(NodeFlags::PSEUDO_ROOT)
	}

	/// The parent node, or `None` for the pseudo-root.
	pub fn parent(&self) -> Option<NodeRef<'t>> {
		let parent = self.tree.parent_index(self.index)?;
		Some(self.tree.node_ref(parent))
	}

	/// The first child, or `None` for a leaf.
	pub fn first_child(&self) -> Option<NodeRef<'t>> {
		let child = self.tree.first_child_index(self.index)?;
		Some(self.tree.node_ref(child))
	}

	/// The next sibling, or `None` when this is the last child.
	pub fn next_sibling(&self) -> Option<NodeRef<'t>> {
		let sibling = self.tree.next_sibling_index(self.index)?;
		Some(self.tree.node_ref(sibling))
	}

	/// The next node in an unfiltered pre-order walk over the whole tree.
	pub fn next_in_preorder(&self) -> Option<NodeRef<'t>> {
		let next = self.tree.next_in_preorder_index(self.index)?;
		Some(self.tree.node_ref(next))
	}

	/// The prototype root this instance is bound to, while that prototype
	/// is still alive.
	pub fn prototype(&self) -> Option<NodeRef<'t>> {
		self.tree.try_node(self.data.prototype?)
	}
}

impl SceneTree {
	pub(crate) fn node_ref(&self, index: NodeIndex) -> NodeRef<'_> {
		NodeRef {
			tree: self,
			index,
			data: self.data(index),
		}
	}
}

impl std::fmt::Debug for NodeRef<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NodeRef")
			.field("path", &self.data.path)
			.field("flags", &self.data.flags)
			.finish()
	}
}
