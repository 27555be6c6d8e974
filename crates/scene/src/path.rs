//! Scene paths and name tokens.
//!
//! A [`ScenePath`] is the canonical identity of a composed node: an absolute,
//! `/`-separated sequence of identifier components. Paths are immutable and
//! cheap to clone (the text is shared). A [`Token`] is a shared immutable
//! string used for path components, type names, and schema names.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::PathError;

/// A shared immutable name string.
///
/// Tokens compare and hash by content. Cloning is a reference-count bump.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(Arc<str>);

impl Token {
	/// Creates a token from a string.
	pub fn new(s: impl AsRef<str>) -> Self {
		Self(Arc::from(s.as_ref()))
	}

	/// The empty token.
	pub fn empty() -> Self {
		Self(Arc::from(""))
	}

	/// Returns the token text.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns true if the token is the empty string.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl Default for Token {
	fn default() -> Self {
		Self::empty()
	}
}

impl From<&str> for Token {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", &*self.0)
	}
}

/// Returns true if `name` is a legal path component.
///
/// Components match `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_name(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An absolute composed scene path, e.g. `/World/Car/Wheel`.
///
/// The root path is `/`. Every other path is a non-empty sequence of
/// identifier components. Paths order lexically by component; because legal
/// component characters all sort after `/`, plain string ordering coincides
/// with component-wise ordering and is what the derived `Ord` provides.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenePath(Arc<str>);

impl ScenePath {
	/// The root path `/`.
	pub fn root() -> Self {
		Self(Arc::from("/"))
	}

	/// Parses and validates an absolute path.
	pub fn parse(text: &str) -> Result<Self, PathError> {
		if text == "/" {
			return Ok(Self::root());
		}
		let Some(rest) = text.strip_prefix('/') else {
			return Err(PathError::NotAbsolute(text.to_owned()));
		};
		if rest.is_empty() {
			return Err(PathError::EmptyComponent(text.to_owned()));
		}
		for component in rest.split('/') {
			if component.is_empty() {
				return Err(PathError::EmptyComponent(text.to_owned()));
			}
			if !is_valid_name(component) {
				return Err(PathError::InvalidComponent {
					path: text.to_owned(),
					component: component.to_owned(),
				});
			}
		}
		Ok(Self(Arc::from(text)))
	}

	/// Returns true if this is the root path.
	pub fn is_root(&self) -> bool {
		&*self.0 == "/"
	}

	/// Returns the path text.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns the final component, or `""` for the root.
	pub fn name(&self) -> &str {
		match self.0.rfind('/') {
			Some(idx) if !self.is_root() => &self.0[idx + 1..],
			_ => "",
		}
	}

	/// Returns the parent path, or `None` for the root.
	pub fn parent(&self) -> Option<Self> {
		if self.is_root() {
			return None;
		}
		match self.0.rfind('/') {
			Some(0) => Some(Self::root()),
			Some(idx) => Some(Self(Arc::from(&self.0[..idx]))),
			None => None,
		}
	}

	/// Appends a validated component.
	pub fn child(&self, name: &str) -> Result<Self, PathError> {
		if !is_valid_name(name) {
			return Err(PathError::InvalidComponent {
				path: self.0.to_string(),
				component: name.to_owned(),
			});
		}
		Ok(self.child_unchecked(name))
	}

	/// Appends a component already known to be a legal name.
	pub(crate) fn child_unchecked(&self, name: &str) -> Self {
		debug_assert!(is_valid_name(name), "invalid path component {name:?}");
		if self.is_root() {
			Self(Arc::from(format!("/{name}")))
		} else {
			Self(Arc::from(format!("{}/{name}", self.0)))
		}
	}

	/// Iterates the path components, root first.
	pub fn components(&self) -> impl Iterator<Item = &str> {
		self.0.split('/').filter(|c| !c.is_empty())
	}

	/// Returns the number of components (0 for the root).
	pub fn component_count(&self) -> usize {
		self.components().count()
	}

	/// Returns true if `prefix` is this path or a component-wise ancestor
	/// of it.
	pub fn starts_with(&self, prefix: &ScenePath) -> bool {
		if prefix.is_root() {
			return true;
		}
		match self.0.strip_prefix(&*prefix.0) {
			Some("") => true,
			Some(rest) => rest.starts_with('/'),
			None => false,
		}
	}

	/// Replaces the `old` prefix of this path with `new`.
	///
	/// Returns `None` when `old` is not a prefix of this path. Used to
	/// translate paths between an instance's namespace and its prototype's.
	pub fn replace_prefix(&self, old: &ScenePath, new: &ScenePath) -> Option<Self> {
		if !self.starts_with(old) {
			return None;
		}
		let rest = if old.is_root() {
			&self.0[..]
		} else {
			&self.0[old.0.len()..]
		};
		if rest.is_empty() || rest == "/" {
			return Some(new.clone());
		}
		let rest = rest.strip_prefix('/').unwrap_or(rest);
		if new.is_root() {
			Some(Self(Arc::from(format!("/{rest}"))))
		} else {
			Some(Self(Arc::from(format!("{}/{rest}", new.0))))
		}
	}
}

impl Default for ScenePath {
	fn default() -> Self {
		Self::root()
	}
}

impl FromStr for ScenePath {
	type Err = PathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for ScenePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for ScenePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", &*self.0)
	}
}
