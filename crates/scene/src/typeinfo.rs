//! Flyweight type metadata and its interning cache.
//!
//! Every distinct (type name, fallback, applied-schema list) combination maps
//! to exactly one live [`TypeInfo`], interned by [`TypeInfoCache`]. Type
//! infos are immutable; their merged [`TypeDefinition`] is built lazily, once
//! per info, the first time any thread asks for it.

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::path::Token;

/// Value-equality key identifying a composed node type.
///
/// Two keys are equal iff the primary type name, the mapped fallback name,
/// and the applied-schema list (order-sensitive) are all equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TypeKey {
	type_name: Token,
	fallback: Token,
	applied_schemas: SmallVec<[Token; 4]>,
}

impl TypeKey {
	/// A key with just a primary type name.
	pub fn new(type_name: impl Into<Token>) -> Self {
		Self {
			type_name: type_name.into(),
			..Self::default()
		}
	}

	/// The key of the untyped, schema-less node.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Sets the mapped fallback type name.
	pub fn with_fallback(mut self, fallback: impl Into<Token>) -> Self {
		self.fallback = fallback.into();
		self
	}

	/// Sets the applied-schema list. Order is significant.
	pub fn with_applied_schemas(mut self, schemas: impl IntoIterator<Item = Token>) -> Self {
		self.applied_schemas = schemas.into_iter().collect();
		self
	}

	/// The primary type name.
	pub fn type_name(&self) -> &Token {
		&self.type_name
	}

	/// The mapped fallback type name.
	pub fn fallback(&self) -> &Token {
		&self.fallback
	}

	/// The applied schemas, in application order.
	pub fn applied_schemas(&self) -> &[Token] {
		&self.applied_schemas
	}

	/// True when the key names no type and no schemas.
	pub fn is_empty(&self) -> bool {
		self.type_name.is_empty() && self.fallback.is_empty() && self.applied_schemas.is_empty()
	}
}

/// Merged built-in properties and metadata for a type plus its applied
/// schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDefinition {
	properties: Vec<Token>,
	metadata: FxHashMap<Token, Token>,
}

impl TypeDefinition {
	/// Creates an empty definition.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a built-in property name.
	pub fn with_property(mut self, name: impl Into<Token>) -> Self {
		self.properties.push(name.into());
		self
	}

	/// Adds a metadata entry.
	pub fn with_metadata(mut self, key: impl Into<Token>, value: impl Into<Token>) -> Self {
		self.metadata.insert(key.into(), value.into());
		self
	}

	/// The built-in property names.
	pub fn properties(&self) -> &[Token] {
		&self.properties
	}

	/// Returns true if the definition declares the property.
	pub fn has_property(&self, name: &str) -> bool {
		self.properties.iter().any(|p| p.as_str() == name)
	}

	/// Looks up a metadata value.
	pub fn metadata(&self, key: &str) -> Option<&Token> {
		self.metadata.iter().find_map(|(k, v)| (k.as_str() == key).then_some(v))
	}

	/// Merges `other` into `self`. Later metadata does not override
	/// earlier entries (the primary type is merged first and wins).
	fn merge(&mut self, other: &TypeDefinition) {
		self.properties.extend(other.properties.iter().cloned());
		for (k, v) in &other.metadata {
			self.metadata.entry(k.clone()).or_insert_with(|| v.clone());
		}
	}

	fn normalize(&mut self) {
		self.properties.sort();
		self.properties.dedup();
	}
}

/// Registry of built-in definitions per type or schema name.
///
/// Supplied by the schema layer at stage construction; immutable afterwards.
/// Unknown names merge as empty definitions.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
	definitions: FxHashMap<Token, TypeDefinition>,
}

impl SchemaRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the built-in definition for a type or schema name.
	pub fn register(&mut self, name: impl Into<Token>, definition: TypeDefinition) {
		self.definitions.insert(name.into(), definition);
	}

	/// Looks up the built-in definition for a name.
	pub fn lookup(&self, name: &Token) -> Option<&TypeDefinition> {
		self.definitions.get(name)
	}
}

/// Immutable, interned metadata for one distinct [`TypeKey`].
///
/// The merged definition is computed at most once across all concurrent
/// callers; whichever thread initializes first publishes for everyone.
#[derive(Debug)]
pub struct TypeInfo {
	key: TypeKey,
	schemas: Arc<SchemaRegistry>,
	definition: OnceCell<TypeDefinition>,
}

impl TypeInfo {
	fn new(key: TypeKey, schemas: Arc<SchemaRegistry>) -> Self {
		Self {
			key,
			schemas,
			definition: OnceCell::new(),
		}
	}

	/// The key this info was interned under.
	pub fn key(&self) -> &TypeKey {
		&self.key
	}

	/// The primary type name.
	pub fn type_name(&self) -> &Token {
		self.key.type_name()
	}

	/// The applied schemas, in application order.
	pub fn applied_schemas(&self) -> &[Token] {
		self.key.applied_schemas()
	}

	/// Returns the merged definition, building it on first request.
	///
	/// Concurrent first requests are raced through the cell: exactly one
	/// build is published and every caller observes that same immutable
	/// definition from then on.
	pub fn definition(&self) -> &TypeDefinition {
		self.definition.get_or_init(|| {
			let mut merged = TypeDefinition::new();
			// The mapped fallback only participates when the primary name
			// has no registered definition.
			let primary = self
				.schemas
				.lookup(self.key.type_name())
				.or_else(|| self.schemas.lookup(self.key.fallback()));
			if let Some(def) = primary {
				merged.merge(def);
			}
			for schema in self.key.applied_schemas() {
				if let Some(def) = self.schemas.lookup(schema) {
					merged.merge(def);
				}
			}
			merged.normalize();
			merged
		})
	}
}

static EMPTY_TYPE_INFO: Lazy<Arc<TypeInfo>> =
	Lazy::new(|| Arc::new(TypeInfo::new(TypeKey::empty(), Arc::new(SchemaRegistry::new()))));

/// Concurrent interning cache from [`TypeKey`] to its canonical
/// [`TypeInfo`].
///
/// `find_or_create` is idempotent under races: the first successful insert
/// wins and losers observe the winner. The cache owns every info for the
/// life of the owning stage.
#[derive(Debug)]
pub struct TypeInfoCache {
	schemas: Arc<SchemaRegistry>,
	infos: RwLock<FxHashMap<TypeKey, Arc<TypeInfo>>>,
}

impl TypeInfoCache {
	/// Creates a cache resolving definitions against `schemas`.
	pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
		Self {
			schemas,
			infos: RwLock::new(FxHashMap::default()),
		}
	}

	/// Returns the canonical info for `key`, interning it if unseen.
	///
	/// The empty key maps to a process-wide sentinel without touching the
	/// map.
	pub fn find_or_create(&self, key: &TypeKey) -> Arc<TypeInfo> {
		if key.is_empty() {
			return Arc::clone(&EMPTY_TYPE_INFO);
		}
		if let Some(info) = self.infos.read().get(key) {
			return Arc::clone(info);
		}
		// Build outside the write lock; under a race the first insert wins
		// and this instance is dropped unobserved.
		let candidate = Arc::new(TypeInfo::new(key.clone(), Arc::clone(&self.schemas)));
		let mut infos = self.infos.write();
		let info = infos.entry(key.clone()).or_insert_with(|| {
			debug!(type_name = %key.type_name(), schemas = key.applied_schemas().len(), "interned type info");
			candidate
		});
		Arc::clone(info)
	}

	/// The number of interned infos (excluding the empty sentinel).
	pub fn len(&self) -> usize {
		self.infos.read().len()
	}

	/// True when nothing has been interned.
	pub fn is_empty(&self) -> bool {
		self.infos.read().is_empty()
	}
}

impl Default for TypeInfoCache {
	fn default() -> Self {
		Self::new(Arc::new(SchemaRegistry::new()))
	}
}
