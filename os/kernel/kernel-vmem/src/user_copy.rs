//! Copies between kernel buffers and user virtual memory.
//!
//! Every access goes through the user's page table one page at a time; a
//! page that is unmapped, kernel-only or (for writes) read-only aborts the
//! copy with [`VmError::BadAddress`]. Bytes already copied stay copied.

use crate::{AddressSpace, PhysMapper, Permissions, VmError, frame_bytes};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalPage, VirtualAddress};

impl AddressSpace {
    /// The user frame behind `va`, checked for `need`.
    fn checked_page<M: PhysMapper + ?Sized>(
        &self,
        m: &M,
        va: VirtualAddress,
        need: Permissions,
    ) -> Result<PhysicalPage, VmError> {
        match self.user_page(m, va) {
            Some((page, perm)) if perm.contains(need) => Ok(page),
            _ => Err(VmError::BadAddress(va)),
        }
    }

    /// Run `f` on consecutive user chunks covering `len` bytes from `va`.
    ///
    /// `f` gets the chunk's bytes and its position in the whole transfer and
    /// returns `false` to stop early. Returns the number of bytes visited.
    fn for_each_chunk<M, F>(
        &self,
        m: &M,
        va: VirtualAddress,
        len: usize,
        need: Permissions,
        mut f: F,
    ) -> Result<usize, VmError>
    where
        M: PhysMapper + ?Sized,
        F: FnMut(&mut [u8], usize) -> bool,
    {
        let mut done = 0;
        let mut cur = va;
        while done < len {
            let page = self.checked_page(m, cur, need)?;
            let off = cur.offset() as usize;
            let n = (PAGE_SIZE as usize - off).min(len - done);
            // SAFETY: the frame is mapped by this user space; the kernel holds
            // no other reference to it during the copy.
            let bytes = &mut unsafe { frame_bytes(m, page) }[off..off + n];
            if !f(bytes, done) {
                return Ok(done);
            }
            done += n;
            cur = cur
                .checked_add(n as u64)
                .ok_or(VmError::BadAddress(cur))?;
        }
        Ok(done)
    }

    /// Copy `src` to user memory at `dst`.
    ///
    /// # Errors
    /// [`VmError::BadAddress`] if a touched page is not user-accessible.
    /// User write permission is not required.
    pub fn copy_out<M: PhysMapper + ?Sized>(
        &self,
        m: &M,
        dst: VirtualAddress,
        src: &[u8],
    ) -> Result<(), VmError> {
        self.for_each_chunk(m, dst, src.len(), Permissions::USER, |chunk, at| {
            chunk.copy_from_slice(&src[at..at + chunk.len()]);
            true
        })?;
        Ok(())
    }

    /// Fill `dst` from user memory at `src`.
    ///
    /// # Errors
    /// [`VmError::BadAddress`] if a touched page is not user-accessible.
    pub fn copy_in<M: PhysMapper + ?Sized>(
        &self,
        m: &M,
        dst: &mut [u8],
        src: VirtualAddress,
    ) -> Result<(), VmError> {
        self.for_each_chunk(m, src, dst.len(), Permissions::USER, |chunk, at| {
            dst[at..at + chunk.len()].copy_from_slice(chunk);
            true
        })?;
        Ok(())
    }

    /// Copy a NUL-terminated string from user memory at `src` into `dst`,
    /// reading at most `max` bytes (and never more than `dst` holds).
    ///
    /// On success `dst` holds the string including its terminator and the
    /// length without the terminator is returned.
    ///
    /// # Errors
    /// - [`VmError::StringTooLong`] if no NUL appears within the limit.
    /// - [`VmError::BadAddress`] if a touched page is not user-accessible.
    pub fn copy_in_string<M: PhysMapper + ?Sized>(
        &self,
        m: &M,
        dst: &mut [u8],
        src: VirtualAddress,
        max: usize,
    ) -> Result<usize, VmError> {
        let limit = max.min(dst.len());
        let mut found = None;
        self.for_each_chunk(m, src, limit, Permissions::USER, |chunk, at| {
            match chunk.iter().position(|&b| b == 0) {
                Some(i) => {
                    dst[at..=at + i].copy_from_slice(&chunk[..=i]);
                    found = Some(at + i);
                    false
                }
                None => {
                    dst[at..at + chunk.len()].copy_from_slice(chunk);
                    true
                }
            }
        })?;
        found.ok_or(VmError::StringTooLong)
    }
}
