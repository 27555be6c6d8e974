//! Cached per-node boolean flags.

bitflags::bitflags! {
	/// Boolean facts about a composed node, computed once by the writer
	/// during composition and never mutated by readers.
	///
	/// Predicates over these flags evaluate with a single mask compare, so
	/// filtered traversal stays O(1) per node.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct NodeFlags: u32 {
		/// The node is active (not deactivated by composition).
		const ACTIVE = 1 << 0;
		/// The node's payloads, if any, are loaded.
		const LOADED = 1 << 1;
		/// The node's kind classifies it as a model.
		const MODEL = 1 << 2;
		/// The node's kind classifies it as a group of models.
		const GROUP = 1 << 3;
		/// The node is abstract (class ancestry).
		const ABSTRACT = 1 << 4;
		/// The node is backed by a defining specifier.
		const DEFINED = 1 << 5;
		/// The node itself carries a defining specifier (def or class).
		const HAS_DEFINING_SPECIFIER = 1 << 6;
		/// The node is an instance whose descendants live on a prototype.
		const INSTANCE = 1 << 7;
		/// The node has an authored payload arc.
		const HAS_PAYLOAD = 1 << 8;
		/// The node may be affected by value clips.
		const MAY_HAVE_CLIPS = 1 << 9;
		/// The node has been destroyed; its slot is condemned.
		const DEAD = 1 << 10;
		/// The node lives inside a prototype subtree.
		const IN_PROTOTYPE = 1 << 11;
		/// The node is the stage's pseudo-root.
		const PSEUDO_ROOT = 1 << 12;
	}
}

#[cfg(test)]
mod tests {
	use super::NodeFlags;

	#[test]
	fn flags_compose_and_query() {
		let flags = NodeFlags::ACTIVE | NodeFlags::DEFINED | NodeFlags::LOADED;
		assert!(flags.contains(NodeFlags::ACTIVE));
		assert!(!flags.contains(NodeFlags::ABSTRACT));
		assert!(flags.contains(NodeFlags::ACTIVE | NodeFlags::DEFINED));
	}
}
