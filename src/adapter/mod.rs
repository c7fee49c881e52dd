/// Persistence backends for the store.
///
/// Every backend implements [`crate::Adapter`]; pick one per [`crate::Store`].
pub mod file;
pub mod local;
pub mod null;

pub use file::FileAdapter;
pub use local::{LocalStorage, LocalStorageAdapter, DEFAULT_QUOTA};
pub use null::NullAdapter;
