//! Tag bits packed into the low bits of an aligned word.
//!
//! A [`TaggedSlot`] stores a value and a small unsigned tag in one machine
//! word, exploiting the zero low bits guaranteed by the value's alignment.
//! Values are anything implementing [`Packed`]: raw pointers carry
//! `log2(align_of::<T>())` tag bits for free, and arena node indices are
//! shifted left to make room. Tags are truncated modulo the alignment
//! (`tag & (ALIGN - 1)`); callers must not store out-of-range tags expecting
//! them back losslessly.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A value that round-trips through an aligned machine word.
///
/// `ALIGN` must be a power of two >= 2, otherwise the word has no spare low
/// bits and the type cannot carry a tag. This is enforced at compile time
/// when a [`TaggedSlot`] over the type is first constructed.
pub trait Packed: Copy {
	/// Alignment of the packed word; the tag occupies `log2(ALIGN)` bits.
	const ALIGN: usize;

	/// Converts to a word whose low `log2(ALIGN)` bits are zero.
	fn into_word(self) -> usize;

	/// Rebuilds the value from a word with the tag bits already masked off.
	fn from_word(word: usize) -> Self;
}

impl<T> Packed for NonNull<T> {
	const ALIGN: usize = align_of::<T>();

	fn into_word(self) -> usize {
		self.as_ptr() as usize
	}

	fn from_word(word: usize) -> Self {
		// The word came from `into_word` on a live NonNull, so masking the
		// tag bits cannot have produced zero.
		NonNull::new(word as *mut T).expect("TaggedSlot word lost its pointer")
	}
}

/// One `usize` holding a [`Packed`] value plus a tag in the spare low bits.
pub struct TaggedSlot<P: Packed> {
	word: usize,
	_marker: PhantomData<P>,
}

impl<P: Packed> TaggedSlot<P> {
	const ALIGN_OK: () = assert!(
		P::ALIGN >= 2 && P::ALIGN.is_power_of_two(),
		"TaggedSlot requires a power-of-two alignment >= 2",
	);

	const TAG_MASK: usize = P::ALIGN - 1;

	/// Packs `value` and `tag` together. `tag` is truncated modulo the
	/// alignment.
	pub fn new(value: P, tag: usize) -> Self {
		let () = Self::ALIGN_OK;
		let word = value.into_word();
		debug_assert_eq!(word & Self::TAG_MASK, 0, "Packed value produced a misaligned word");
		Self {
			word: word | (tag & Self::TAG_MASK),
			_marker: PhantomData,
		}
	}

	/// Replaces both the value and the tag.
	pub fn set(&mut self, value: P, tag: usize) {
		*self = Self::new(value, tag);
	}

	/// Replaces the tag, leaving the value unchanged.
	pub fn set_tag(&mut self, tag: usize) {
		self.word = (self.word & !Self::TAG_MASK) | (tag & Self::TAG_MASK);
	}

	/// Returns the stored value with the tag bits masked off.
	pub fn value(&self) -> P {
		P::from_word(self.word & !Self::TAG_MASK)
	}

	/// Returns the stored tag.
	pub fn tag(&self) -> usize {
		self.word & Self::TAG_MASK
	}

	/// The largest representable tag value.
	pub fn max_tag() -> usize {
		Self::TAG_MASK
	}

	/// The number of distinct tag values.
	pub fn num_tag_values() -> usize {
		P::ALIGN
	}
}

impl<P: Packed> Clone for TaggedSlot<P> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<P: Packed> Copy for TaggedSlot<P> {}

impl<P: Packed + fmt::Debug> fmt::Debug for TaggedSlot<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaggedSlot")
			.field("value", &self.value())
			.field("tag", &self.tag())
			.finish()
	}
}
