use crate::ExecError;

/// Random-access source of executable bytes (a file, or a buffer in tests).
pub trait ExecutableImage {
    /// Read up to `dst.len()` bytes at `offset`; returns how many were read.
    /// A short count means the image ends early.
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> usize;

    /// Fill `dst` completely or fail with `err`.
    ///
    /// # Errors
    /// `err` on a short read.
    fn read_exact_at(&self, offset: u64, dst: &mut [u8], err: ExecError) -> Result<(), ExecError> {
        if self.read_at(offset, dst) == dst.len() {
            Ok(())
        } else {
            Err(err)
        }
    }
}

impl ExecutableImage for [u8] {
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> usize {
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        let Some(src) = self.get(start..) else {
            return 0;
        };
        let n = src.len().min(dst.len());
        dst[..n].copy_from_slice(&src[..n]);
        n
    }
}

impl<T: ExecutableImage + ?Sized> ExecutableImage for &T {
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> usize {
        (**self).read_at(offset, dst)
    }
}
