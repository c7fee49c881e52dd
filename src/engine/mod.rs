/// The command engine and the layers underneath it.
///
/// A command enters [`Store`], which type-checks the key through [`Keyspace`].
/// The keyspace reads through the [`Cache`] to the adapter and writes values and
/// key index updates back as a single adapter batch.
pub mod cache;
pub mod keyspace;
pub mod store;
pub mod value;

pub use cache::Cache;
pub use keyspace::Keyspace;
pub use store::{Store, DEFAULT_DATABASES};
pub use value::{Entry, KeyType, Value};
