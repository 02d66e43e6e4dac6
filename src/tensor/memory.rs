use crate::utils::error::{InferError, Result};

/// Non-owning reference to a slot in a [`MemoryPool`].
///
/// A handle stays valid until its slot is released. Reusing a slot bumps its
/// generation, so a handle fetched before a reshape cannot read the new data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryHandle {
    slot: usize,
    generation: u32,
}

impl MemoryHandle {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Word backed so typed views of f32 data are always aligned.
struct Slot {
    generation: u32,
    live: bool,
    len_bytes: usize,
    words: Box<[u32]>,
}

impl Slot {
    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u32, u8>(&self.words)[..self.len_bytes]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u32, u8>(&mut self.words)[..self.len_bytes]
    }
}

#[derive(Default)]
pub struct MemoryPool {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed buffer of `len_bytes`.
    pub fn allocate(&mut self, len_bytes: usize) -> MemoryHandle {
        let words = vec![0u32; len_bytes.div_ceil(4)].into_boxed_slice();

        if let Some(slot_idx) = self.free.pop() {
            let slot = &mut self.slots[slot_idx];
            slot.generation = slot.generation.wrapping_add(1);
            slot.live = true;
            slot.len_bytes = len_bytes;
            slot.words = words;
            return MemoryHandle {
                slot: slot_idx,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            live: true,
            len_bytes,
            words,
        });
        MemoryHandle {
            slot: self.slots.len() - 1,
            generation: 0,
        }
    }

    pub fn release(&mut self, handle: MemoryHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        slot.live = false;
        slot.words = Box::new([]);
        slot.len_bytes = 0;
        self.free.push(handle.slot);
        Ok(())
    }

    /// Release every slot; generations are kept so old handles stay stale.
    pub fn release_all(&mut self) {
        self.free.clear();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            slot.live = false;
            slot.words = Box::new([]);
            slot.len_bytes = 0;
            self.free.push(idx);
        }
    }

    pub fn is_valid(&self, handle: MemoryHandle) -> bool {
        self.slot(handle).is_ok()
    }

    pub fn len_bytes(&self, handle: MemoryHandle) -> Result<usize> {
        Ok(self.slot(handle)?.len_bytes)
    }

    /// Bytes held by live slots.
    pub fn total_bytes(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.live)
            .map(|s| s.len_bytes)
            .sum()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    pub fn bytes(&self, handle: MemoryHandle) -> Result<&[u8]> {
        Ok(self.slot(handle)?.bytes())
    }

    pub fn bytes_mut(&mut self, handle: MemoryHandle) -> Result<&mut [u8]> {
        Ok(self.slot_mut(handle)?.bytes_mut())
    }

    /// Borrow inputs shared and outputs exclusively in one go.
    ///
    /// Views come back in the order of the handles passed. An output may not
    /// alias an input or another output.
    pub fn split_io(
        &mut self,
        inputs: &[MemoryHandle],
        outputs: &[MemoryHandle],
    ) -> Result<(Vec<&[u8]>, Vec<&mut [u8]>)> {
        for &h in inputs.iter().chain(outputs.iter()) {
            self.slot(h)?;
        }
        for (i, out) in outputs.iter().enumerate() {
            if inputs.iter().chain(outputs[..i].iter()).any(|h| h.slot == out.slot) {
                return Err(InferError::Memory(format!(
                    "output buffer in slot {} aliases another bound buffer",
                    out.slot
                )));
            }
        }

        let mut by_slot: Vec<Option<&mut Slot>> = self.slots.iter_mut().map(Some).collect();

        let mut out_views = Vec::with_capacity(outputs.len());
        for h in outputs {
            let slot = by_slot[h.slot]
                .take()
                .ok_or_else(|| InferError::Memory(format!("slot {} borrowed twice", h.slot)))?;
            out_views.push(slot.bytes_mut());
        }

        let shared: Vec<Option<&Slot>> = by_slot.into_iter().map(|s| s.map(|s| &*s)).collect();
        let mut in_views = Vec::with_capacity(inputs.len());
        for h in inputs {
            let slot = shared[h.slot]
                .ok_or_else(|| InferError::Memory(format!("slot {} borrowed twice", h.slot)))?;
            in_views.push(slot.bytes());
        }

        Ok((in_views, out_views))
    }

    fn slot(&self, handle: MemoryHandle) -> Result<&Slot> {
        match self.slots.get(handle.slot) {
            Some(slot) if slot.live && slot.generation == handle.generation => Ok(slot),
            Some(_) => Err(InferError::Memory(format!(
                "stale memory handle (slot {}, generation {})",
                handle.slot, handle.generation
            ))),
            None => Err(InferError::Memory(format!(
                "unknown memory handle (slot {})",
                handle.slot
            ))),
        }
    }

    fn slot_mut(&mut self, handle: MemoryHandle) -> Result<&mut Slot> {
        self.slot(handle)?;
        Ok(&mut self.slots[handle.slot])
    }
}
