//! Flag predicates: restricted boolean algebra over [`NodeFlags`].
//!
//! A [`FlagPredicate`] is a normal-form `(mask, values, negate)` triple, so
//! evaluating one against a node is a mask compare. [`Conjunction`] and
//! [`Disjunction`] grow incrementally from [`Term`]s and collapse to a
//! contradiction or tautology when their terms conflict; `!` interconverts
//! the two by De Morgan's law. General nesting is deliberately unsupported,
//! which is what keeps filtered traversal O(1) per node.

use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use once_cell::sync::Lazy;

use crate::flags::NodeFlags;

/// A single predicate term: one flag, possibly negated.
///
/// `Term::new(NodeFlags::ACTIVE)` requires the flag set;
/// `!Term::new(NodeFlags::ACTIVE)` requires it clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Term {
	flag: NodeFlags,
	negated: bool,
}

impl Term {
	/// A term requiring `flag` to be set. `flag` must be a single bit.
	pub fn new(flag: NodeFlags) -> Self {
		debug_assert_eq!(flag.bits().count_ones(), 1, "predicate terms take a single flag");
		Self { flag, negated: false }
	}

	/// The flag this term tests.
	pub fn flag(&self) -> NodeFlags {
		self.flag
	}

	/// The truth value this term requires of its flag.
	pub fn truth(&self) -> bool {
		!self.negated
	}
}

impl Not for Term {
	type Output = Term;

	fn not(self) -> Term {
		Term {
			flag: self.flag,
			negated: !self.negated,
		}
	}
}

/// Outcome of merging one term into a `(mask, values)` pair.
enum Merge {
	Added,
	Duplicate,
	Conflict,
}

/// A normal-form predicate over [`NodeFlags`].
///
/// A node with flags `f` passes iff `((f & mask) == (values & mask)) ^ negate`.
/// The default predicate (`mask` empty, `negate` false) is a tautology.
#[derive(Debug, Clone, Copy)]
pub struct FlagPredicate {
	mask: NodeFlags,
	values: NodeFlags,
	negate: bool,
	traverse_proxies: bool,
}

impl FlagPredicate {
	/// The always-passing predicate.
	pub fn tautology() -> Self {
		Self {
			mask: NodeFlags::empty(),
			values: NodeFlags::empty(),
			negate: false,
			traverse_proxies: false,
		}
	}

	/// The never-passing predicate.
	pub fn contradiction() -> Self {
		Self {
			negate: true,
			..Self::tautology()
		}
	}

	/// Returns true if this predicate passes every node.
	pub fn is_tautology(&self) -> bool {
		self.mask.is_empty() && !self.negate
	}

	/// Returns true if this predicate passes no node.
	pub fn is_contradiction(&self) -> bool {
		self.mask.is_empty() && self.negate
	}

	/// Requests that traversal expand instance nodes through their
	/// prototypes, reporting results as instance proxies with logical paths.
	///
	/// This bit sits outside the flag algebra: it never affects
	/// [`evaluate`](Self::evaluate), only whether traversal descends into
	/// instances at all.
	pub fn traverse_instance_proxies(mut self, traverse: bool) -> Self {
		self.traverse_proxies = traverse;
		self
	}

	/// Whether traversal may descend into instance nodes.
	pub fn traverses_instance_proxies(&self) -> bool {
		self.traverse_proxies
	}

	/// Evaluates the predicate against a node's flags.
	pub fn evaluate(&self, flags: NodeFlags) -> bool {
		((flags & self.mask) == (self.values & self.mask)) ^ self.negate
	}

	/// Evaluates against a node presented through the instancing layer.
	///
	/// An instance proxy presents a physically-shared prototype node at an
	/// instance's logical path, so prototype membership is not part of the
	/// proxy's identity: the `IN_PROTOTYPE` bit is cleared before the mask
	/// compare. Whether a node is a proxy is a property of the traversal
	/// cursor (a non-empty logical path), never of the node itself.
	pub fn evaluate_at(&self, mut flags: NodeFlags, is_instance_proxy: bool) -> bool {
		if is_instance_proxy {
			flags.remove(NodeFlags::IN_PROTOTYPE);
		}
		self.evaluate(flags)
	}

	/// Merges the requirement `flag == truth` into the mask/value pair.
	fn merge_term(&mut self, flag: NodeFlags, truth: bool) -> Merge {
		if self.mask.contains(flag) {
			if self.values.contains(flag) == truth {
				Merge::Duplicate
			} else {
				Merge::Conflict
			}
		} else {
			self.mask.insert(flag);
			self.values.set(flag, truth);
			Merge::Added
		}
	}
}

impl Default for FlagPredicate {
	fn default() -> Self {
		Self::tautology()
	}
}

impl From<Term> for FlagPredicate {
	fn from(term: Term) -> Self {
		Conjunction::from(term).into_predicate()
	}
}

impl Not for FlagPredicate {
	type Output = FlagPredicate;

	fn not(mut self) -> FlagPredicate {
		self.negate = !self.negate;
		self
	}
}

impl PartialEq for FlagPredicate {
	fn eq(&self, other: &Self) -> bool {
		self.mask == other.mask
			&& (self.values & self.mask) == (other.values & other.mask)
			&& self.negate == other.negate
			&& self.traverse_proxies == other.traverse_proxies
	}
}

impl Eq for FlagPredicate {}

impl Hash for FlagPredicate {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.mask.bits().hash(state);
		(self.values & self.mask).bits().hash(state);
		self.negate.hash(state);
		self.traverse_proxies.hash(state);
	}
}

/// A conjunction of terms: passes when every term passes.
///
/// AND-ing a term whose flag already appears with the opposite truth value
/// collapses the conjunction to a contradiction; once contradictory, further
/// terms are no-ops. The empty conjunction is a tautology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Conjunction(FlagPredicate);

impl Conjunction {
	/// The empty conjunction (a tautology).
	pub fn new() -> Self {
		Self(FlagPredicate::tautology())
	}

	/// Consumes the conjunction as a plain predicate.
	pub fn into_predicate(self) -> FlagPredicate {
		self.0
	}

	/// Borrows the underlying predicate.
	pub fn as_predicate(&self) -> &FlagPredicate {
		&self.0
	}
}

impl From<Term> for Conjunction {
	fn from(term: Term) -> Self {
		let mut conj = Self::new();
		conj &= term;
		conj
	}
}

impl BitAndAssign<Term> for Conjunction {
	fn bitand_assign(&mut self, term: Term) {
		if self.0.is_contradiction() {
			return;
		}
		if let Merge::Conflict = self.0.merge_term(term.flag(), term.truth()) {
			let traverse = self.0.traverse_proxies;
			self.0 = FlagPredicate::contradiction().traverse_instance_proxies(traverse);
		}
	}
}

impl BitAnd<Term> for Conjunction {
	type Output = Conjunction;

	fn bitand(mut self, term: Term) -> Conjunction {
		self &= term;
		self
	}
}

impl BitAnd for Term {
	type Output = Conjunction;

	fn bitand(self, rhs: Term) -> Conjunction {
		let mut conj = Conjunction::from(self);
		conj &= rhs;
		conj
	}
}

impl Not for Conjunction {
	type Output = Disjunction;

	/// De Morgan: `!(a && b) == !a || !b`.
	fn not(self) -> Disjunction {
		Disjunction(!self.0)
	}
}

impl From<Conjunction> for FlagPredicate {
	fn from(conj: Conjunction) -> Self {
		conj.into_predicate()
	}
}

/// A disjunction of terms: passes when any term passes.
///
/// Stored as the negation of a conjunction of the negated terms (De
/// Morgan), so evaluation stays a single mask compare. OR-ing a term whose
/// flag already appears with the opposite truth value collapses the
/// disjunction to a tautology. The empty disjunction is a contradiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Disjunction(FlagPredicate);

impl Disjunction {
	/// The empty disjunction (a contradiction).
	pub fn new() -> Self {
		Self(FlagPredicate::contradiction())
	}

	/// Consumes the disjunction as a plain predicate.
	pub fn into_predicate(self) -> FlagPredicate {
		self.0
	}

	/// Borrows the underlying predicate.
	pub fn as_predicate(&self) -> &FlagPredicate {
		&self.0
	}
}

impl Default for Disjunction {
	fn default() -> Self {
		Self::new()
	}
}

impl From<Term> for Disjunction {
	fn from(term: Term) -> Self {
		let mut disj = Self::new();
		disj |= term;
		disj
	}
}

impl BitOrAssign<Term> for Disjunction {
	fn bitor_assign(&mut self, term: Term) {
		if self.0.is_tautology() {
			return;
		}
		// The stored pair is the inner conjunction `!t1 && !t2 && ...`;
		// adding `term` to the disjunction ANDs `!term` into it.
		if let Merge::Conflict = self.0.merge_term(term.flag(), !term.truth()) {
			let traverse = self.0.traverse_proxies;
			self.0 = FlagPredicate::tautology().traverse_instance_proxies(traverse);
		}
	}
}

impl BitOr<Term> for Disjunction {
	type Output = Disjunction;

	fn bitor(mut self, term: Term) -> Disjunction {
		self |= term;
		self
	}
}

impl BitOr for Term {
	type Output = Disjunction;

	fn bitor(self, rhs: Term) -> Disjunction {
		let mut disj = Disjunction::from(self);
		disj |= rhs;
		disj
	}
}

impl Not for Disjunction {
	type Output = Conjunction;

	/// De Morgan: `!(a || b) == !a && !b`.
	fn not(self) -> Conjunction {
		Conjunction(!self.0)
	}
}

impl From<Disjunction> for FlagPredicate {
	fn from(disj: Disjunction) -> Self {
		disj.into_predicate()
	}
}

static DEFAULT_PREDICATE: Lazy<FlagPredicate> = Lazy::new(|| {
	let conj = Term::new(NodeFlags::ACTIVE)
		& Term::new(NodeFlags::DEFINED)
		& Term::new(NodeFlags::LOADED)
		& !Term::new(NodeFlags::ABSTRACT);
	conj.into_predicate()
});

/// The conventional traversal filter: active ∧ defined ∧ loaded ∧ ¬abstract.
pub fn default_predicate() -> FlagPredicate {
	*DEFAULT_PREDICATE
}
