//! Error types for path parsing and construction.

use thiserror::Error;

/// Errors that can occur while composing nodes into the tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComposeError {
	/// The requested child name was not a legal path component.
	#[error(transparent)]
	Path(#[from] PathError),

	/// A node already exists at the target path.
	#[error("a node already exists at {0}")]
	DuplicatePath(String),
}

/// Errors that can occur when parsing or building a scene path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
	/// The path text did not begin with `/`.
	#[error("path is not absolute: {0:?}")]
	NotAbsolute(String),

	/// A path component was empty (`//` or a trailing `/`).
	#[error("empty component in path: {0:?}")]
	EmptyComponent(String),

	/// A component contained a character outside `[A-Za-z0-9_]` or began
	/// with a digit.
	#[error("invalid component {component:?} in path {path:?}")]
	InvalidComponent {
		/// The full path text being parsed.
		path: String,
		/// The offending component.
		component: String,
	},
}
