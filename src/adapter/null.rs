use crate::{Adapter, Result, WriteOp};

/// An adapter that remembers nothing.
///
/// Reads always miss and writes are discarded, so a store built on it lives
/// entirely in its read-through cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

impl Adapter for NullAdapter {
    fn read(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn write(&mut self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    fn apply(&mut self, _batch: &[WriteOp]) -> Result<()> {
        Ok(())
    }
}
