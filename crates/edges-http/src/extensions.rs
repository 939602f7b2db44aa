//! Typed values attached to a request.
//!
//! Middleware uses this to hand things like the request's state context to
//! handlers further down the chain.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

type Slot = Box<dyn Any + Send + Sync>;

/// One value per type. Clones share the same slots.
#[derive(Clone, Default)]
pub struct Extensions {
	slots: Arc<RwLock<HashMap<TypeId, Slot>>>,
}

impl Extensions {
	/// An empty map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores `value`, replacing the previous value of the same type.
	///
	/// # Examples
	///
	/// ```
	/// use edges_http::Extensions;
	///
	/// let extensions = Extensions::new();
	/// extensions.insert(42u32);
	/// extensions.insert(7u32);
	/// assert_eq!(extensions.get::<u32>(), Some(7));
	/// ```
	pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
		self.slots.write().insert(TypeId::of::<T>(), Box::new(value));
	}

	/// A clone of the `T` slot.
	pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
		self.slots
			.read()
			.get(&TypeId::of::<T>())
			.and_then(|slot| slot.downcast_ref::<T>().cloned())
	}

	/// Whether a `T` slot is occupied
	pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
		self.slots.read().contains_key(&TypeId::of::<T>())
	}

	/// Takes the `T` slot out.
	pub fn remove<T: Send + Sync + 'static>(&self) -> Option<T> {
		let slot = self.slots.write().remove(&TypeId::of::<T>())?;
		slot.downcast::<T>().ok().map(|boxed| *boxed)
	}

	/// Number of occupied slots
	pub fn len(&self) -> usize {
		self.slots.read().len()
	}

	/// True when no slot is occupied
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for Extensions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Extensions").field("len", &self.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_clones_share_slots() {
		// Arrange
		let a = Extensions::new();
		let b = a.clone();

		// Act
		a.insert("request-scoped".to_string());

		// Assert
		assert_eq!(b.get::<String>().as_deref(), Some("request-scoped"));
		assert_eq!(b.len(), 1);
	}

	#[rstest]
	fn test_remove_empties_slot() {
		let extensions = Extensions::new();
		extensions.insert(7u8);

		assert_eq!(extensions.remove::<u8>(), Some(7));
		assert!(!extensions.contains::<u8>());
		assert_eq!(extensions.remove::<u8>(), None);
		assert!(extensions.is_empty());
	}
}
