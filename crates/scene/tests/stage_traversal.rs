//! End-to-end stage construction and traversal scenarios.

use canopy_scene::{
	FlagPredicate, InstanceKey, NodeFlags, Stage, Term, Visit, default_predicate,
};
use pretty_assertions::assert_eq;

const LIVE: NodeFlags = NodeFlags::ACTIVE
	.union(NodeFlags::DEFINED)
	.union(NodeFlags::LOADED);

fn pre_order_paths(stage: &Stage, root: &str, pred: &FlagPredicate) -> Vec<String> {
	let tree = stage.read();
	let root = tree.node_at_path(&root.parse().unwrap()).unwrap();
	tree.subtree(root, pred)
		.filter(|(visit, _)| *visit == Visit::Pre)
		.map(|(_, entry)| entry.path.as_str().to_owned())
		.collect()
}

/// Builds `/A` with children `/A/B` (inactive) and `/A/C`.
fn ab_inactive_c() -> Stage {
	let stage = Stage::new();
	let mut edit = stage.edit();
	let root = edit.pseudo_root();
	let a = edit.add_child(root, "A").unwrap();
	let b = edit.add_child(a, "B").unwrap();
	let c = edit.add_child(a, "C").unwrap();
	edit.compose_flags(a, LIVE);
	edit.compose_flags(b, NodeFlags::DEFINED | NodeFlags::LOADED);
	edit.compose_flags(c, LIVE);
	drop(edit);
	stage
}

#[test]
fn default_predicate_skips_the_inactive_child() {
	let stage = ab_inactive_c();
	assert_eq!(
		pre_order_paths(&stage, "/A", &default_predicate()),
		vec!["/A".to_owned(), "/A/C".to_owned()]
	);
}

#[test]
fn tautology_yields_every_child_in_authored_order() {
	let stage = ab_inactive_c();
	assert_eq!(
		pre_order_paths(&stage, "/A", &FlagPredicate::tautology()),
		vec!["/A".to_owned(), "/A/B".to_owned(), "/A/C".to_owned()]
	);
}

#[test]
fn custom_predicates_compose_over_traversal() {
	let stage = Stage::new();
	{
		let mut edit = stage.edit();
		let root = edit.pseudo_root();
		let world = edit.add_child(root, "World").unwrap();
		let model = edit.add_child(world, "Model").unwrap();
		let class = edit.add_child(world, "Class").unwrap();
		edit.compose_flags(world, LIVE | NodeFlags::GROUP);
		edit.compose_flags(model, LIVE | NodeFlags::MODEL);
		edit.compose_flags(class, LIVE | NodeFlags::ABSTRACT);
	}

	let models = (Term::new(NodeFlags::MODEL) & !Term::new(NodeFlags::ABSTRACT)).into_predicate();
	assert_eq!(
		pre_order_paths(&stage, "/World/Model", &models),
		vec!["/World/Model".to_owned()]
	);
	// The abstract child fails a !ABSTRACT conjunction.
	assert_eq!(
		pre_order_paths(&stage, "/World/Class", &models),
		Vec::<String>::new()
	);

	let either = (Term::new(NodeFlags::MODEL) | Term::new(NodeFlags::GROUP)).into_predicate();
	assert_eq!(
		pre_order_paths(&stage, "/World", &either),
		vec!["/World".to_owned(), "/World/Model".to_owned()]
	);
}

#[test]
fn instancing_presents_one_prototype_at_many_paths() {
	let stage = Stage::new();
	{
		let mut edit = stage.edit();
		let root = edit.pseudo_root();
		let key = InstanceKey::new("tree-rig");

		let proto = edit.add_child(root, "__Prototype_1").unwrap();
		edit.register_prototype(key.clone(), proto);
		let trunk = edit.add_child(proto, "Trunk").unwrap();
		let branch = edit.add_child(trunk, "Branch").unwrap();
		for id in [proto, trunk, branch] {
			edit.compose_flags(id, LIVE);
		}

		for name in ["Oak", "Elm"] {
			let inst = edit.add_child(root, name).unwrap();
			edit.compose_flags(inst, LIVE | NodeFlags::INSTANCE);
			assert!(edit.bind_instance(inst, &key));
		}
	}

	let pred = default_predicate().traverse_instance_proxies(true);
	assert_eq!(
		pre_order_paths(&stage, "/Oak", &pred),
		vec![
			"/Oak".to_owned(),
			"/Oak/Trunk".to_owned(),
			"/Oak/Trunk/Branch".to_owned(),
		]
	);
	assert_eq!(
		pre_order_paths(&stage, "/Elm", &pred),
		vec![
			"/Elm".to_owned(),
			"/Elm/Trunk".to_owned(),
			"/Elm/Trunk/Branch".to_owned(),
		]
	);

	// Both expansions are backed by the same physical prototype nodes.
	let tree = stage.read();
	let oak = tree.node_at_path(&"/Oak".parse().unwrap()).unwrap();
	let elm = tree.node_at_path(&"/Elm".parse().unwrap()).unwrap();
	let oak_ids: Vec<_> = tree.subtree(oak, &pred).skip(1).map(|(_, e)| e.id).collect();
	let elm_ids: Vec<_> = tree.subtree(elm, &pred).skip(1).map(|(_, e)| e.id).collect();
	assert_eq!(oak_ids, elm_ids);

	// Whole-stage traversal without proxy expansion sees the prototype
	// subtree physically and the instances as leaves.
	let physical: Vec<_> = tree
		.traverse(&FlagPredicate::tautology())
		.filter(|(visit, _)| *visit == Visit::Pre)
		.map(|(_, e)| e.path.as_str().to_owned())
		.collect();
	assert_eq!(
		physical,
		vec![
			"/__Prototype_1".to_owned(),
			"/__Prototype_1/Trunk".to_owned(),
			"/__Prototype_1/Trunk/Branch".to_owned(),
			"/Oak".to_owned(),
			"/Elm".to_owned(),
		]
	);
}

#[test]
fn removing_a_prototype_empties_instance_expansion() {
	let stage = Stage::new();
	let (proto, oak) = {
		let mut edit = stage.edit();
		let root = edit.pseudo_root();
		let key = InstanceKey::new("tree-rig");

		let proto = edit.add_child(root, "__Prototype_1").unwrap();
		edit.register_prototype(key.clone(), proto);
		let trunk = edit.add_child(proto, "Trunk").unwrap();
		for id in [proto, trunk] {
			edit.compose_flags(id, LIVE);
		}

		let oak = edit.add_child(root, "Oak").unwrap();
		edit.compose_flags(oak, LIVE | NodeFlags::INSTANCE);
		assert!(edit.bind_instance(oak, &key));
		(proto, oak)
	};
	stage.edit().remove_subtree(proto);

	let pred = default_predicate().traverse_instance_proxies(true);
	{
		let tree = stage.read();
		assert!(tree.prototype_of(oak).is_none());
		assert_eq!(tree.children(oak, &pred).count(), 0);
	}
	assert_eq!(
		pre_order_paths(&stage, "/Oak", &pred),
		vec!["/Oak".to_owned()]
	);

	// Refill the freed slots with unrelated nodes; the stale binding must
	// not present their children as the instance's.
	{
		let mut edit = stage.edit();
		let root = edit.pseudo_root();
		let other = edit.add_child(root, "Other").unwrap();
		let secret = edit.add_child(other, "Secret").unwrap();
		edit.compose_flags(other, LIVE);
		edit.compose_flags(secret, LIVE);
	}
	let tree = stage.read();
	assert!(tree.prototype_of(oak).is_none());
	assert_eq!(tree.children(oak, &pred).count(), 0);
}

#[test]
fn rebuild_invalidates_handles_but_not_paths() {
	let stage = ab_inactive_c();
	let old_b = {
		let tree = stage.read();
		tree.node_at_path(&"/A/B".parse().unwrap()).unwrap()
	};
	{
		let mut edit = stage.edit();
		edit.remove_subtree(old_b);
		let a = edit.node_at_path(&"/A".parse().unwrap()).unwrap();
		let b = edit.add_child(a, "B").unwrap();
		edit.compose_flags(b, LIVE);
	}
	let tree = stage.read();
	assert!(tree.try_node(old_b).is_none(), "stale handle must not resolve");
	let new_b = tree.node_at_path(&"/A/B".parse().unwrap()).unwrap();
	assert_ne!(new_b, old_b);
	assert!(tree.node(new_b).is_active());
}
