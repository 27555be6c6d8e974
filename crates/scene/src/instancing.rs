//! Instancing: shared prototype subtrees presented at per-instance paths.
//!
//! An instance node physically has no descendants of its own; for read
//! purposes its subtree is the subtree of the prototype root it is bound
//! to, shared by every instance with an equal [`InstanceKey`]. Because the
//! prototype nodes are physically shared, nothing per-instance is ever
//! stored on them: a traversal cursor instead carries a *logical path*
//! recording where in the instance's namespace the current prototype node
//! is being presented. A node counts as an instance proxy exactly while
//! that logical path is non-empty.
//!
//! Bindings are generation-checked handles: removing a prototype subtree
//! leaves its instances with a stale binding that reads as unbound, so
//! their proxy expansion is simply empty.

use std::fmt;

use crate::flags::NodeFlags;
use crate::path::{ScenePath, Token};
use crate::predicate::FlagPredicate;
use crate::tree::{NodeId, NodeIndex, SceneTree};

/// Opaque grouping key deciding which instances share a prototype.
///
/// Computed by the composition layer; this subsystem only compares keys for
/// equality.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey(Token);

impl InstanceKey {
	/// Wraps a composition-provided key string.
	pub fn new(key: impl AsRef<str>) -> Self {
		Self(Token::new(key))
	}
}

impl fmt::Debug for InstanceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "InstanceKey({:?})", self.0)
	}
}

impl SceneTree {
	/// Translates a path in an instance's namespace to the corresponding
	/// path inside its prototype.
	pub fn translate_path_to_prototype(
		&self,
		instance: NodeId,
		path: &ScenePath,
	) -> Option<ScenePath> {
		let inst = self.node(instance);
		let proto = inst.prototype()?;
		path.replace_prefix(inst.path(), proto.path())
	}

	/// Translates the path of a node inside a prototype to the path at
	/// which `instance` presents it.
	pub fn translate_path_from_prototype(
		&self,
		prototype_node: NodeId,
		instance: NodeId,
	) -> Option<ScenePath> {
		let inst = self.node(instance);
		let proto = inst.prototype()?;
		self.node(prototype_node).path().replace_prefix(proto.path(), inst.path())
	}

	/// Resolves a logical path to a physical node, crossing instance nodes
	/// into their prototypes where the path descends through them.
	///
	/// A plain physical lookup is tried first; otherwise the path is walked
	/// component by component, redirecting each descent through an instance
	/// onto its prototype's children.
	pub(crate) fn resolve_in_namespace(&self, path: &ScenePath) -> Option<NodeIndex> {
		if let Some(id) = self.node_at_path(path) {
			return Some(id.index);
		}
		let mut cur = self.root_index();
		for name in path.components() {
			let search = if self.data(cur).flags.contains(NodeFlags::INSTANCE) {
				self.live_prototype(cur)?
			} else {
				cur
			};
			cur = self.child_named(search, name)?;
		}
		Some(cur)
	}

	fn child_named(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
		let mut child = self.first_child_index(parent);
		while let Some(c) = child {
			if self.data(c).path.name() == name {
				return Some(c);
			}
			child = self.next_sibling_index(c);
		}
		None
	}
}

/// How a cursor moved when asked for the next sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
	/// Moved to a predicate-passing sibling.
	Sibling,
	/// Siblings exhausted; moved to the parent.
	Parent,
	/// Siblings exhausted and no parent remains.
	Exhausted,
}

/// A traversal cursor that transparently redirects through prototypes.
///
/// State is exactly `(node, logical_path)`: the physical node plus, while
/// inside an instance's expansion, the logical path at which that node is
/// being presented. Predicate evaluation receives the proxy bit derived
/// from the logical path being present, never from node state.
pub struct InstancingCursor<'t> {
	tree: &'t SceneTree,
	index: NodeIndex,
	logical: Option<ScenePath>,
}

impl<'t> InstancingCursor<'t> {
	/// Positions a cursor on a physical node.
	pub fn new(tree: &'t SceneTree, id: NodeId) -> Self {
		let node = tree.node(id);
		Self {
			tree,
			index: node.index,
			logical: None,
		}
	}

	/// The physical node under the cursor.
	pub fn node(&self) -> NodeId {
		self.tree.id(self.index)
	}

	/// The path at which the current node is presented: the logical path in
	/// proxy mode, the physical path otherwise.
	pub fn presented_path(&self) -> ScenePath {
		self.logical.clone().unwrap_or_else(|| self.tree.data(self.index).path.clone())
	}

	/// True while the cursor presents a prototype node at an instance path.
	pub fn is_instance_proxy(&self) -> bool {
		self.logical.is_some()
	}

	/// Descends to the first child passing `pred`, entering the prototype
	/// when the current node is an instance.
	///
	/// Returns false when no child passes, when the node is an instance and
	/// `pred` does not traverse instance proxies (descent is refused
	/// outright), or when the instance's prototype has been removed (a stale
	/// binding reads as unbound).
	pub fn move_to_child(&mut self, pred: &FlagPredicate) -> bool {
		let data = self.tree.data(self.index);
		let (search_root, base) = if data.flags.contains(NodeFlags::INSTANCE) {
			if !pred.traverses_instance_proxies() {
				return false;
			}
			let Some(proto) = self.tree.live_prototype(self.index) else {
				return false;
			};
			(proto, Some(self.presented_path()))
		} else {
			(self.index, self.logical.clone())
		};

		let mut child = self.tree.first_child_index(search_root);
		while let Some(c) = child {
			let child_data = self.tree.data(c);
			if pred.evaluate_at(child_data.flags, base.is_some()) {
				self.logical = base.map(|b| {
					let name = child_data.path.name().to_owned();
					b.child_unchecked(&name)
				});
				self.index = c;
				return true;
			}
			child = self.tree.next_sibling_index(c);
		}
		false
	}

	/// Scans forward among physical siblings for the first predicate pass;
	/// on exhaustion moves to the parent.
	pub fn move_to_next_sibling_or_parent(&mut self, pred: &FlagPredicate) -> Advance {
		let is_proxy = self.logical.is_some();
		let mut cur = self.index;
		while let Some(sib) = self.tree.next_sibling_index(cur) {
			if pred.evaluate_at(self.tree.data(sib).flags, is_proxy) {
				if let Some(logical) = &self.logical {
					let parent = logical
						.parent()
						.unwrap_or_else(|| desync(logical, self.tree.data(sib).path.name()));
					self.logical = Some(parent.child_unchecked(self.tree.data(sib).path.name()));
				}
				self.index = sib;
				return Advance::Sibling;
			}
			cur = sib;
		}
		if self.move_to_parent() {
			Advance::Parent
		} else {
			Advance::Exhausted
		}
	}

	/// Moves to the parent, popping one logical component and resolving
	/// back out of the prototype indirection when the walk exits it.
	pub fn move_to_parent(&mut self) -> bool {
		if let Some(logical) = &self.logical {
			self.logical = logical.parent();
		}
		let Some(parent) = self.tree.parent_index(self.index) else {
			return false;
		};
		self.index = parent;

		if let Some(logical) = self.logical.clone() {
			if self.tree.is_prototype_root(self.tree.id(parent)) {
				// We walked up out of this prototype's subtree: the logical
				// path now addresses the owning instance (or a proxy of it,
				// under nested instancing).
				let Some(resolved) = self.tree.resolve_in_namespace(&logical) else {
					desync(&logical, self.tree.data(parent).path.name())
				};
				self.index = resolved;
				if self.tree.data(resolved).path == logical {
					self.logical = None;
				}
			}
		}
		true
	}
}

#[cold]
fn desync(logical: &ScenePath, at: &str) -> ! {
	panic!("instancing cursor desynchronized: logical path {logical} has no counterpart near {at}");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::predicate::FlagPredicate;
	use crate::stage::Stage;

	/// Builds a stage with a prototype and two instances bound to it:
	///
	/// ```text
	/// /__Prototype_1/Wheel/Hub
	/// /Car   (instance of __Prototype_1)
	/// /Truck (instance of __Prototype_1)
	/// ```
	fn instanced_stage() -> (Stage, NodeId, NodeId, NodeId) {
		let stage = Stage::new();
		let (proto, car, truck) = {
			let mut edit = stage.edit();
			let root = edit.pseudo_root();
			let key = InstanceKey::new("wheel-rig");

			let proto = edit.add_child(root, "__Prototype_1").unwrap();
			edit.register_prototype(key.clone(), proto);
			let wheel = edit.add_child(proto, "Wheel").unwrap();
			let hub = edit.add_child(wheel, "Hub").unwrap();
			for id in [proto, wheel, hub] {
				edit.compose_flags(id, NodeFlags::ACTIVE | NodeFlags::DEFINED | NodeFlags::LOADED);
			}

			let car = edit.add_child(root, "Car").unwrap();
			let truck = edit.add_child(root, "Truck").unwrap();
			for id in [car, truck] {
				edit.compose_flags(
					id,
					NodeFlags::ACTIVE | NodeFlags::DEFINED | NodeFlags::LOADED | NodeFlags::INSTANCE,
				);
				assert!(edit.bind_instance(id, &key));
			}
			(proto, car, truck)
		};
		(stage, proto, car, truck)
	}

	#[test]
	fn path_translation_round_trips() {
		let (stage, proto, car, _) = instanced_stage();
		let tree = stage.read();
		let hub = tree.node_at_path(&"/__Prototype_1/Wheel/Hub".parse().unwrap()).unwrap();
		let logical = tree.translate_path_from_prototype(hub, car).unwrap();
		assert_eq!(logical.as_str(), "/Car/Wheel/Hub");
		let physical = tree.translate_path_to_prototype(car, &logical).unwrap();
		assert_eq!(&physical, tree.node(hub).path());
		// Translation requires an instance binding.
		assert!(tree.translate_path_from_prototype(hub, proto).is_none());
	}

	#[test]
	fn cursor_enters_prototype_with_logical_paths() {
		let (stage, _, car, _) = instanced_stage();
		let tree = stage.read();
		let pred = FlagPredicate::tautology().traverse_instance_proxies(true);

		let mut cursor = InstancingCursor::new(&tree, car);
		assert!(!cursor.is_instance_proxy());
		assert!(cursor.move_to_child(&pred));
		assert!(cursor.is_instance_proxy());
		assert_eq!(cursor.presented_path().as_str(), "/Car/Wheel");
		assert_eq!(
			tree.node(cursor.node()).path().as_str(),
			"/__Prototype_1/Wheel"
		);

		assert!(cursor.move_to_child(&pred));
		assert_eq!(cursor.presented_path().as_str(), "/Car/Wheel/Hub");
	}

	#[test]
	fn cursor_refuses_instances_without_proxy_traversal() {
		let (stage, _, car, _) = instanced_stage();
		let tree = stage.read();
		let pred = FlagPredicate::tautology();
		let mut cursor = InstancingCursor::new(&tree, car);
		assert!(!cursor.move_to_child(&pred));
	}

	#[test]
	fn cursor_exits_prototype_back_to_the_instance() {
		let (stage, _, car, _) = instanced_stage();
		let tree = stage.read();
		let pred = FlagPredicate::tautology().traverse_instance_proxies(true);

		let mut cursor = InstancingCursor::new(&tree, car);
		assert!(cursor.move_to_child(&pred));
		assert!(cursor.move_to_parent());
		// Back on the instance itself: proxy mode cleared.
		assert!(!cursor.is_instance_proxy());
		assert_eq!(cursor.node(), car);
		assert_eq!(cursor.presented_path().as_str(), "/Car");
	}

	#[test]
	fn sibling_scan_respects_predicates() {
		let stage = Stage::new();
		let p = {
			let mut edit = stage.edit();
			let root = edit.pseudo_root();
			let p = edit.add_child(root, "P").unwrap();
			let one = edit.add_child(p, "one").unwrap();
			let two = edit.add_child(p, "two").unwrap();
			let three = edit.add_child(p, "three").unwrap();
			edit.compose_flags(p, NodeFlags::ACTIVE | NodeFlags::DEFINED | NodeFlags::LOADED);
			edit.compose_flags(one, NodeFlags::ACTIVE | NodeFlags::DEFINED | NodeFlags::LOADED);
			edit.compose_flags(two, NodeFlags::DEFINED | NodeFlags::LOADED);
			edit.compose_flags(three, NodeFlags::ACTIVE | NodeFlags::DEFINED | NodeFlags::LOADED);
			p
		};
		let tree = stage.read();
		let pred = crate::predicate::default_predicate();
		let mut cursor = InstancingCursor::new(&tree, p);
		assert!(cursor.move_to_child(&pred));
		assert_eq!(cursor.presented_path().as_str(), "/P/one");
		// "two" is inactive and skipped.
		assert_eq!(cursor.move_to_next_sibling_or_parent(&pred), Advance::Sibling);
		assert_eq!(cursor.presented_path().as_str(), "/P/three");
		assert_eq!(cursor.move_to_next_sibling_or_parent(&pred), Advance::Parent);
		assert_eq!(cursor.node(), p);
	}

	#[test]
	fn removing_the_prototype_unbinds_its_instances() {
		let (stage, proto, car, truck) = instanced_stage();
		stage.edit().remove_subtree(proto);
		let tree = stage.read();
		let pred = FlagPredicate::tautology().traverse_instance_proxies(true);

		for inst in [car, truck] {
			assert!(tree.prototype_of(inst).is_none());
			assert!(tree.node(inst).prototype().is_none());
			let mut cursor = InstancingCursor::new(&tree, inst);
			assert!(!cursor.move_to_child(&pred));
		}
		// The instance nodes themselves stay alive and addressable.
		assert_eq!(tree.node(car).path().as_str(), "/Car");
	}

	#[test]
	fn two_instances_share_prototype_nodes() {
		let (stage, _, car, truck) = instanced_stage();
		let tree = stage.read();
		let pred = FlagPredicate::tautology().traverse_instance_proxies(true);

		let mut a = InstancingCursor::new(&tree, car);
		let mut b = InstancingCursor::new(&tree, truck);
		assert!(a.move_to_child(&pred));
		assert!(b.move_to_child(&pred));
		// Same physical prototype node, different logical addresses.
		assert_eq!(a.node(), b.node());
		assert_eq!(a.presented_path().as_str(), "/Car/Wheel");
		assert_eq!(b.presented_path().as_str(), "/Truck/Wheel");
	}
}
