//! Store decorators.
//!
//! Each decorator wraps one store and implements [`Store`](crate::Store)
//! itself, so decorators nest freely. The chain builder applies them in a
//! fixed order, innermost first:
//!
//! 1. [`WriteBehindStore`] when `async_store.enabled`
//! 2. [`ReadOnlyStore`] when `ignore_modifications`
//! 3. [`SingletonStore`] when `singleton_store.enabled`
//!
//! Every decorator forwards [`store_type`](crate::Store::store_type) to the
//! store it wraps.

mod read_only;
mod singleton;
mod write_behind;

pub use read_only::ReadOnlyStore;
pub use singleton::SingletonStore;
pub use write_behind::{Modification, WriteBehindStore};
