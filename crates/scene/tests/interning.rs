//! Concurrency tests for the type-interning cache.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use canopy_scene::{SchemaRegistry, Token, TypeDefinition, TypeInfoCache, TypeKey};

fn registry() -> Arc<SchemaRegistry> {
	let mut reg = SchemaRegistry::new();
	for name in ["Xform", "Sphere", "Scope", "Camera"] {
		reg.register(name, TypeDefinition::new().with_property("visibility"));
	}
	Arc::new(reg)
}

#[test]
fn concurrent_find_or_create_yields_one_info_per_key() {
	let cache = Arc::new(TypeInfoCache::new(registry()));
	let keys: Vec<TypeKey> = ["Xform", "Sphere", "Scope", "Camera"]
		.iter()
		.map(|name| TypeKey::new(*name))
		.collect();

	let handles: Vec<_> = (0..16)
		.map(|worker| {
			let cache = Arc::clone(&cache);
			let keys = keys.clone();
			thread::spawn(move || {
				let mut seen = Vec::new();
				for round in 0..100 {
					let key = &keys[(worker + round) % keys.len()];
					seen.push(Arc::as_ptr(&cache.find_or_create(key)) as usize);
				}
				seen
			})
		})
		.collect();

	let mut distinct = HashSet::new();
	for handle in handles {
		distinct.extend(handle.join().unwrap());
	}
	// Every matching caller observed the same canonical object per key.
	assert_eq!(distinct.len(), keys.len());
	assert_eq!(cache.len(), keys.len());
}

#[test]
fn concurrent_definition_requests_publish_once() {
	let cache = TypeInfoCache::new(registry());
	let info = cache.find_or_create(
		&TypeKey::new("Sphere").with_applied_schemas([Token::new("Xform")]),
	);

	thread::scope(|scope| {
		let handles: Vec<_> = (0..16)
			.map(|_| {
				let info = &info;
				scope.spawn(move || std::ptr::from_ref(info.definition()) as usize)
			})
			.collect();
		let addrs: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
		assert_eq!(addrs.len(), 1, "all callers must observe one published definition");
	});
}

#[test]
fn equal_keys_intern_to_the_same_object_across_scopes() {
	let cache = TypeInfoCache::new(registry());
	let key = TypeKey::new("Camera")
		.with_fallback("Xform")
		.with_applied_schemas([Token::new("A"), Token::new("B")]);
	let a = cache.find_or_create(&key);
	let b = cache.find_or_create(&key.clone());
	assert!(Arc::ptr_eq(&a, &b));

	// A reordered schema list is a different key.
	let reordered = TypeKey::new("Camera")
		.with_fallback("Xform")
		.with_applied_schemas([Token::new("B"), Token::new("A")]);
	let c = cache.find_or_create(&reordered);
	assert!(!Arc::ptr_eq(&a, &c));
}
