use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing,
};

/// Number of 8-byte elements per memory unit: 256 Ki * 8 B = 1 MiB.
pub const MEMORY_COUNT_BASE: usize = 256 * 1024;

/// A buffer whose only purpose is to inflate the resident memory of the process.
///
/// Allocated once at startup and kept by its owner until exit.
/// It cannot be resized, and no request ever touches it.
#[derive(Debug)]
pub struct MemorySlab(Box<[i64]>);

impl MemorySlab {
    /// Allocate `units * MEMORY_COUNT_BASE` elements.
    ///
    /// Fails instead of panicking when the size does not fit the address space
    /// or the allocator cannot provide it.
    pub fn try_allocate(units: u64) -> Result<Self, BoxError> {
        let len = usize::try_from(units)
            .ok()
            .and_then(|units| units.checked_mul(MEMORY_COUNT_BASE))
            .filter(|len| {
                len.checked_mul(std::mem::size_of::<i64>())
                    .is_some_and(|bytes| bytes <= isize::MAX as usize)
            })
            .ok_or_else(|| {
                BoxError::from("memory slab size overflows the address space")
                    .context_field("units", units)
            })?;

        let mut slab = Vec::<i64>::new();
        slab.try_reserve_exact(len)
            .context("reserve memory slab")
            .context_field("units", units)?;
        // zeroed pages may be lazily mapped, write them so they count as resident
        slab.extend((0..len).map(|idx| idx as i64));
        let slab = slab.into_boxed_slice();

        tracing::info!(
            elements = len,
            "mem alloc: {len} int64 summing up to {units} MB is allocated"
        );
        Ok(Self(slab))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        std::mem::size_of_val(&*self.0)
    }
}
