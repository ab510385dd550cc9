use crate::ProcessError;
use kernel_exec::{ExecutableImage, load};
use kernel_info::memory::TRAPFRAME;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_vmem::{AddressSpace, Permissions, PhysMemory};
use log::debug;

/// Where a freshly exec'd program starts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ExecStart {
    pub entry: VirtualAddress,
    pub stack_pointer: VirtualAddress,
    /// Also the value of `a0`; `a1` is the stack pointer.
    pub argc: usize,
}

/// A user address space and the size of its region `[0, size)`.
///
/// Must be [`release`](Self::release)d; dropping it leaks the pages.
#[derive(Debug)]
#[must_use]
pub struct UserMemory {
    space: AddressSpace,
    size: u64,
}

impl UserMemory {
    /// Memory of the first user process: `initcode` at address 0.
    ///
    /// # Errors
    /// [`ProcessError::OutOfMemory`] or [`ProcessError::Vm`].
    ///
    /// # Panics
    /// If `initcode` does not fit in less than one page.
    pub fn first<M: PhysMemory + ?Sized>(mem: &M, initcode: &[u8]) -> Result<Self, ProcessError> {
        let mut space = AddressSpace::create_empty(mem).ok_or(ProcessError::OutOfMemory)?;
        if let Err(e) = space.map_first(mem, initcode) {
            space.destroy(mem, 0);
            return Err(e.into());
        }
        Ok(Self {
            space,
            size: PAGE_SIZE,
        })
    }

    #[inline]
    pub const fn space(&self) -> &AddressSpace {
        &self.space
    }

    #[inline]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Replace this image with `image`.
    ///
    /// The old space is only destroyed once the new one is complete; on
    /// failure `self` is unchanged.
    ///
    /// # Errors
    /// [`ProcessError::Exec`].
    pub fn exec<M, I>(&mut self, mem: &M, image: &I, argv: &[&[u8]]) -> Result<ExecStart, ProcessError>
    where
        M: PhysMemory + ?Sized,
        I: ExecutableImage + ?Sized,
    {
        let loaded = load(mem, image, argv)?;
        let old = core::mem::replace(&mut self.space, loaded.space);
        let old_size = core::mem::replace(&mut self.size, loaded.size);
        old.destroy(mem, old_size);

        Ok(ExecStart {
            entry: loaded.entry,
            stack_pointer: loaded.stack_pointer,
            argc: loaded.argc,
        })
    }

    /// Grow (`n > 0`, mapped writable) or shrink (`n < 0`) the user region by
    /// `n` bytes. Returns the previous size.
    ///
    /// # Errors
    /// - [`ProcessError::SizeLimit`] if the new size would be negative or
    ///   reach [`TRAPFRAME`].
    /// - [`ProcessError::Vm`] when out of memory; the size is unchanged.
    pub fn grow_by<M: PhysMemory + ?Sized>(&mut self, mem: &M, n: i64) -> Result<u64, ProcessError> {
        let old = self.size;
        let new = old
            .checked_add_signed(n)
            .ok_or(ProcessError::SizeLimit)?;
        if new >= TRAPFRAME {
            return Err(ProcessError::SizeLimit);
        }

        self.size = if n >= 0 {
            self.space.grow(mem, old, new, Permissions::WRITE)?
        } else {
            self.space.shrink(mem, old, new)
        };
        Ok(old)
    }

    /// A copy of this memory with fresh frames.
    ///
    /// # Errors
    /// [`ProcessError::OutOfMemory`] or [`ProcessError::Vm`]; nothing of the
    /// child survives.
    pub fn fork<M: PhysMemory + ?Sized>(&self, mem: &M) -> Result<Self, ProcessError> {
        let mut child = AddressSpace::create_empty(mem).ok_or(ProcessError::OutOfMemory)?;
        if let Err(e) = self.space.copy_address_space(mem, &mut child, self.size) {
            debug!("fork: {e}, releasing child");
            child.destroy(mem, 0);
            return Err(e.into());
        }
        Ok(Self {
            space: child,
            size: self.size,
        })
    }

    /// Free the user pages and the tables.
    pub fn release<M: PhysMemory + ?Sized>(self, mem: &M) {
        self.space.destroy(mem, self.size);
    }
}
