use std::collections::HashMap;

use tracing::debug;

use crate::{
    tensor::{Blob, BlobHandle, BlobMap, MemoryPool, TensorDesc},
    utils::error::{InferError, Result},
};

/// Owns every blob of a network by name, plus the memory behind them.
///
/// Blobs handed out are copies of the table entries. Replacing an entry is a
/// table update that frees whatever pool memory the old entry held.
#[derive(Default)]
pub struct BlobManager {
    blobs: HashMap<String, Blob>,
    memory: MemoryPool,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl BlobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_boundary(&mut self, inputs: Vec<String>, outputs: Vec<String>) {
        self.input_names = inputs;
        self.output_names = outputs;
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Add an unbound blob described by `desc`.
    pub fn create_blob(&mut self, desc: TensorDesc) -> Result<()> {
        let name = desc.name().to_string();
        if self.blobs.contains_key(&name) {
            return Err(InferError::Model(format!("blob '{}' already exists", name)));
        }
        self.blobs.insert(name, Blob::new(desc));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Blob> {
        self.blobs
            .get(name)
            .ok_or_else(|| InferError::Model(format!("unknown blob '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Copies of the named blobs, in the order asked for.
    pub fn blobs_of(&self, names: &[String]) -> Result<Vec<Blob>> {
        names.iter().map(|n| self.get(n).cloned()).collect()
    }

    /// Swap in `blob` under `name`, releasing memory the old entry owned.
    pub fn replace_blob(&mut self, name: &str, blob: Blob) -> Result<()> {
        let old = self
            .blobs
            .insert(name.to_string(), blob)
            .ok_or_else(|| InferError::Model(format!("cannot replace unknown blob '{}'", name)))?;
        if let BlobHandle::Direct(memory) = old.handle() {
            // the entry may already point at released memory after a reshape
            if self.memory.is_valid(memory) {
                self.memory.release(memory)?;
            }
        }
        Ok(())
    }

    /// Wrap the named blob in a foreign tensor unless it already is one.
    pub fn wrap_foreign(&mut self, name: &str) -> Result<()> {
        let blob = self.get(name)?;
        if blob.is_foreign() {
            return Ok(());
        }
        let wrapped = blob.clone().into_foreign();
        debug!("wrap blob '{}' as foreign tensor", name);
        self.replace_blob(name, wrapped)
    }

    pub fn set_dims(&mut self, name: &str, dims: Vec<usize>) -> Result<()> {
        let blob = self
            .blobs
            .get_mut(name)
            .ok_or_else(|| InferError::Model(format!("unknown blob '{}'", name)))?;
        blob.desc_mut().set_dims(dims);
        Ok(())
    }

    /// Give every non-foreign blob fresh memory sized for its current shape.
    ///
    /// All previous allocations are released first, so handles fetched before
    /// the call go stale.
    pub fn allocate_all(&mut self) {
        self.memory.release_all();
        for blob in self.blobs.values_mut() {
            if blob.is_foreign() {
                continue;
            }
            let handle = self.memory.allocate(blob.desc().size_in_bytes());
            blob.bind(handle);
        }
    }

    pub fn release_all(&mut self) {
        self.memory.release_all();
    }

    pub fn clear(&mut self) {
        self.memory.release_all();
        self.blobs.clear();
        self.input_names.clear();
        self.output_names.clear();
    }

    pub fn input_blobs(&self) -> Result<BlobMap> {
        self.snapshot(&self.input_names)
    }

    pub fn output_blobs(&self) -> Result<BlobMap> {
        self.snapshot(&self.output_names)
    }

    pub fn memory(&self) -> &MemoryPool {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryPool {
        &mut self.memory
    }

    fn snapshot(&self, names: &[String]) -> Result<BlobMap> {
        names
            .iter()
            .map(|n| Ok((n.clone(), self.get(n)?.clone())))
            .collect()
    }
}
