//! Filtered traversal: sibling iteration and subtree ranges.
//!
//! [`Children`] drives an [`InstancingCursor`] across one node's (possibly
//! proxied) children. [`Subtree`] walks a whole subtree in pre-order or
//! pre-and-post-order with an explicit pending stack, supporting one-shot
//! [`prune_children`](Subtree::prune_children) on the current pre-visit.
//! Iterators are independent per-thread value objects; nothing they touch
//! mutates the tree.
//!
//! Predicates filter subtrees, not just nodes: a node that fails the
//! predicate is skipped along with all of its descendants.

use smallvec::SmallVec;

use crate::flags::NodeFlags;
use crate::instancing::{Advance, InstancingCursor};
use crate::path::ScenePath;
use crate::predicate::FlagPredicate;
use crate::tree::{NodeId, NodeIndex, NodeRef, SceneTree};

/// One traversal result: a node presented at a (possibly logical) path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
	/// Handle to the physical node (a shared prototype node for proxies).
	pub id: NodeId,
	/// The path at which the node is presented.
	pub path: ScenePath,
	/// True when the node is presented as an instance proxy.
	pub is_instance_proxy: bool,
}

/// Which side of a node a [`Subtree`] event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
	/// Before any of the node's descendants.
	Pre,
	/// After all of the node's descendants.
	Post,
}

enum ChildrenState {
	Start,
	Mid,
	Done,
}

/// Iterator over one node's predicate-passing children.
pub struct Children<'t> {
	cursor: InstancingCursor<'t>,
	pred: FlagPredicate,
	state: ChildrenState,
}

impl<'t> Children<'t> {
	fn entry(&self) -> NodeEntry {
		NodeEntry {
			id: self.cursor.node(),
			path: self.cursor.presented_path(),
			is_instance_proxy: self.cursor.is_instance_proxy(),
		}
	}
}

impl<'t> Iterator for Children<'t> {
	type Item = NodeEntry;

	fn next(&mut self) -> Option<NodeEntry> {
		match self.state {
			ChildrenState::Start => {
				if self.cursor.move_to_child(&self.pred) {
					self.state = ChildrenState::Mid;
					Some(self.entry())
				} else {
					self.state = ChildrenState::Done;
					None
				}
			}
			ChildrenState::Mid => match self.cursor.move_to_next_sibling_or_parent(&self.pred) {
				Advance::Sibling => Some(self.entry()),
				Advance::Parent | Advance::Exhausted => {
					self.state = ChildrenState::Done;
					None
				}
			},
			ChildrenState::Done => None,
		}
	}
}

#[derive(Clone)]
struct Frame {
	index: NodeIndex,
	path: ScenePath,
	proxy: bool,
}

enum Work {
	Enter(Frame),
	Leave(Frame),
}

/// Subtree range iterator: pre-order, or pre-and-post-order where every
/// qualifying node is yielded twice.
///
/// The range owns an explicit pending stack rather than recursing, which
/// bounds memory and lets post visits interleave correctly. Exhaustion is
/// the iterator returning `None`.
pub struct Subtree<'t> {
	tree: &'t SceneTree,
	pred: FlagPredicate,
	post_visits: bool,
	stack: Vec<Work>,
	/// The frame whose pre-visit was just yielded; its children are pushed
	/// lazily on the next advance so [`prune_children`](Self::prune_children)
	/// can cancel them.
	pending: Option<Frame>,
	prune: bool,
}

impl<'t> Subtree<'t> {
	fn new(tree: &'t SceneTree, stack: Vec<Work>, pred: FlagPredicate, post_visits: bool) -> Self {
		Self {
			tree,
			pred,
			post_visits,
			stack,
			pending: None,
			prune: false,
		}
	}

	/// Skips the descendants of the node whose pre-visit was just yielded,
	/// as if it had none. In pre-and-post-order mode its post visit still
	/// follows immediately.
	///
	/// # Panics
	///
	/// Panics when the iterator is not positioned on a pre-order visit
	/// (before the first step, after exhaustion, or on a post visit).
	pub fn prune_children(&mut self) {
		assert!(
			self.pending.is_some(),
			"prune_children() is only valid while positioned on a pre-order visit"
		);
		self.prune = true;
	}

	fn push_children(&mut self, frame: &Frame) {
		let data = self.tree.data(frame.index);
		let (source, proxy) = if data.flags.contains(NodeFlags::INSTANCE) {
			if !self.pred.traverses_instance_proxies() {
				return;
			}
			// A stale binding (removed prototype) expands to nothing.
			match self.tree.live_prototype(frame.index) {
				Some(proto) => (proto, true),
				None => return,
			}
		} else {
			(frame.index, frame.proxy)
		};

		let mut children: SmallVec<[NodeIndex; 8]> = SmallVec::new();
		let mut child = self.tree.first_child_index(source);
		while let Some(c) = child {
			children.push(c);
			child = self.tree.next_sibling_index(c);
		}
		for &c in children.iter().rev() {
			let child_path = if proxy {
				frame.path.child_unchecked(self.tree.data(c).path.name())
			} else {
				self.tree.data(c).path.clone()
			};
			self.stack.push(Work::Enter(Frame {
				index: c,
				path: child_path,
				proxy,
			}));
		}
	}

	fn entry(&self, frame: &Frame) -> NodeEntry {
		NodeEntry {
			id: self.tree.id(frame.index),
			path: frame.path.clone(),
			is_instance_proxy: frame.proxy,
		}
	}
}

impl<'t> Iterator for Subtree<'t> {
	type Item = (Visit, NodeEntry);

	fn next(&mut self) -> Option<(Visit, NodeEntry)> {
		loop {
			if let Some(frame) = self.pending.take() {
				let pruned = std::mem::take(&mut self.prune);
				if self.post_visits {
					self.stack.push(Work::Leave(frame.clone()));
				}
				if !pruned {
					self.push_children(&frame);
				}
			}
			match self.stack.pop() {
				None => return None,
				Some(Work::Leave(frame)) => return Some((Visit::Post, self.entry(&frame))),
				Some(Work::Enter(frame)) => {
					if !self.pred.evaluate_at(self.tree.data(frame.index).flags, frame.proxy) {
						continue;
					}
					let event = (Visit::Pre, self.entry(&frame));
					self.pending = Some(frame);
					return Some(event);
				}
			}
		}
	}
}

impl SceneTree {
	/// The predicate-passing children of `id`, instancing rules applied.
	pub fn children(&self, id: NodeId, pred: &FlagPredicate) -> Children<'_> {
		Children {
			cursor: InstancingCursor::new(self, id),
			pred: *pred,
			state: ChildrenState::Start,
		}
	}

	/// Pre-order range over `root` and its filtered descendants.
	pub fn subtree(&self, root: NodeId, pred: &FlagPredicate) -> Subtree<'_> {
		self.subtree_range(root, pred, false)
	}

	/// Pre-and-post-order range over `root` and its filtered descendants.
	pub fn subtree_with_post_visits(&self, root: NodeId, pred: &FlagPredicate) -> Subtree<'_> {
		self.subtree_range(root, pred, true)
	}

	fn subtree_range(&self, root: NodeId, pred: &FlagPredicate, post_visits: bool) -> Subtree<'_> {
		let node = self.node(root);
		let stack = vec![Work::Enter(Frame {
			index: node.index,
			path: node.path().clone(),
			proxy: false,
		})];
		Subtree::new(self, stack, *pred, post_visits)
	}

	/// Whole-stage pre-order walk: every filtered node below the
	/// pseudo-root, top-level nodes in authored order.
	pub fn traverse(&self, pred: &FlagPredicate) -> Subtree<'_> {
		self.traverse_range(pred, false)
	}

	/// Whole-stage pre-and-post-order walk.
	pub fn traverse_with_post_visits(&self, pred: &FlagPredicate) -> Subtree<'_> {
		self.traverse_range(pred, true)
	}

	fn traverse_range(&self, pred: &FlagPredicate, post_visits: bool) -> Subtree<'_> {
		let mut tops = Vec::new();
		let mut child = self.first_child_index_of_root();
		while let Some(c) = child {
			tops.push(c);
			child = self.next_sibling_index(c);
		}
		let stack = tops
			.into_iter()
			.rev()
			.map(|index| {
				Work::Enter(Frame {
					index,
					path: self.data(index).path.clone(),
					proxy: false,
				})
			})
			.collect();
		Subtree::new(self, stack, *pred, post_visits)
	}

	fn first_child_index_of_root(&self) -> Option<NodeIndex> {
		self.first_child_index(self.root_index())
	}
}

impl<'t> NodeRef<'t> {
	/// The predicate-passing children of this node.
	pub fn children(&self, pred: &FlagPredicate) -> Children<'t> {
		self.tree.children(self.id(), pred)
	}

	/// Pre-order range over this node and its filtered descendants.
	pub fn subtree(&self, pred: &FlagPredicate) -> Subtree<'t> {
		self.tree.subtree(self.id(), pred)
	}

	/// Pre-and-post-order range over this node and its filtered
	/// descendants.
	pub fn subtree_with_post_visits(&self, pred: &FlagPredicate) -> Subtree<'t> {
		self.tree.subtree_with_post_visits(self.id(), pred)
	}
}
