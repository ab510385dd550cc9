use crate::elf::{ELF_HEADER_SIZE, ElfHeader, PROGRAM_HEADER_SIZE, ProgramHeader};
use crate::{ExecError, ExecutableImage};
use kernel_info::memory::PLIC;
use kernel_info::param::MAX_ARG;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, page_round_up};
use kernel_vmem::{AddressSpace, PhysMemory, Permissions};
use log::{debug, warn};

/// Pages added above the image: one guard page, then the stack page.
pub const STACK_PAGES: u64 = 2;

/// A ready-to-run user address space.
#[derive(Debug)]
#[must_use = "dropping a LoadedImage leaks its address space"]
pub struct LoadedImage {
    pub space: AddressSpace,
    /// Size of the user region (`sz`), including guard and stack pages.
    pub size: u64,
    pub entry: VirtualAddress,
    /// Initial stack pointer; also the address of `argv[0]`.
    pub stack_pointer: VirtualAddress,
    pub argc: usize,
}

/// Load `image` into a new address space and push `argv` onto its stack.
///
/// # Errors
/// Any [`ExecError`]. Everything allocated for the new space has been freed
/// again by the time the error is returned.
pub fn load<M, I>(mem: &M, image: &I, argv: &[&[u8]]) -> Result<LoadedImage, ExecError>
where
    M: PhysMemory + ?Sized,
    I: ExecutableImage + ?Sized,
{
    let mut raw = [0_u8; ELF_HEADER_SIZE];
    image.read_exact_at(0, &mut raw, ExecError::ShortRead)?;
    let header = ElfHeader::parse(&raw);
    if !header.has_valid_magic() {
        warn!("exec: bad magic {:#x}", header.magic);
        return Err(ExecError::BadMagic);
    }

    let mut space = AddressSpace::create_empty(mem).ok_or(ExecError::OutOfMemory)?;
    let mut size = 0;
    match build(mem, image, &header, argv, &mut space, &mut size) {
        Ok((stack_pointer, argc)) => {
            debug!(
                "exec: entry {:?}, size {size:#x}, sp {stack_pointer:?}, {argc} args",
                header.entry
            );
            Ok(LoadedImage {
                space,
                size,
                entry: header.entry,
                stack_pointer,
                argc,
            })
        }
        Err(e) => {
            warn!("exec: {e}");
            space.destroy(mem, size);
            Err(e)
        }
    }
}

/// Map the segments and the stack. `size` always holds the current extent so
/// the caller can tear down after a failure.
fn build<M, I>(
    mem: &M,
    image: &I,
    header: &ElfHeader,
    argv: &[&[u8]],
    space: &mut AddressSpace,
    size: &mut u64,
) -> Result<(VirtualAddress, usize), ExecError>
where
    M: PhysMemory + ?Sized,
    I: ExecutableImage + ?Sized,
{
    for i in 0..u64::from(header.phnum) {
        let mut raw = [0_u8; PROGRAM_HEADER_SIZE];
        let off = header.phoff + i * PROGRAM_HEADER_SIZE as u64;
        image.read_exact_at(off, &mut raw, ExecError::ShortRead)?;
        let ph = ProgramHeader::parse(&raw);
        if !ph.is_load() {
            continue;
        }

        let end = check_segment(&ph)?;
        *size = space.grow(mem, *size, end, segment_permissions(&ph))?;
        load_segment(mem, image, space, &ph)?;
    }

    // Guard page and stack page above the page-rounded image.
    let base = page_round_up(*size);
    *size = space.grow(mem, base, base + STACK_PAGES * PAGE_SIZE, Permissions::WRITE)?;
    space.clear_user_access(mem, VirtualAddress::new(base));

    let top = VirtualAddress::new(*size);
    let stack_base = top.as_u64() - PAGE_SIZE;
    push_arguments(mem, space, top, stack_base, argv)
}

/// Validate a loadable segment; returns its end address.
fn check_segment(ph: &ProgramHeader) -> Result<u64, ExecError> {
    if ph.memsz < ph.filesz {
        return Err(ExecError::SegmentSize);
    }
    let end = ph
        .vaddr
        .as_u64()
        .checked_add(ph.memsz)
        .ok_or(ExecError::SegmentOverflow)?;
    if !ph.vaddr.is_page_aligned() {
        return Err(ExecError::SegmentMisaligned);
    }
    if end >= PLIC {
        return Err(ExecError::SegmentInDeviceRegion);
    }
    Ok(end)
}

/// Readable always; executable and writable as the segment says.
fn segment_permissions(ph: &ProgramHeader) -> Permissions {
    let mut perm = Permissions::empty();
    if ph.flags.execute() {
        perm |= Permissions::EXECUTE;
    }
    if ph.flags.write() {
        perm |= Permissions::WRITE;
    }
    perm
}

/// Copy the file bytes of `ph` into its (already mapped) pages.
fn load_segment<M, I>(
    mem: &M,
    image: &I,
    space: &AddressSpace,
    ph: &ProgramHeader,
) -> Result<(), ExecError>
where
    M: PhysMemory + ?Sized,
    I: ExecutableImage + ?Sized,
{
    let mut done = 0;
    while done < ph.filesz {
        let va = ph.vaddr + done;
        let Some(pa) = space.translate(mem, va) else {
            panic!("load_segment: {va:?} should be mapped");
        };
        let n = (ph.filesz - done).min(PAGE_SIZE);
        // SAFETY: the page was just mapped into the new space and nothing
        // else refers to it yet.
        let dst = unsafe { core::slice::from_raw_parts_mut(mem.phys_to_ptr(pa), n as usize) };
        image.read_exact_at(ph.offset + done, dst, ExecError::SegmentRead)?;
        done += n;
    }
    Ok(())
}

/// Push the argument strings, then the `argv[]` array, below `top`.
fn push_arguments<M: PhysMemory + ?Sized>(
    mem: &M,
    space: &AddressSpace,
    top: VirtualAddress,
    stack_base: u64,
    argv: &[&[u8]],
) -> Result<(VirtualAddress, usize), ExecError> {
    if argv.len() >= MAX_ARG {
        return Err(ExecError::TooManyArguments);
    }

    let mut pointers = [0_u64; MAX_ARG];
    let mut sp = top.as_u64();
    for (slot, arg) in pointers.iter_mut().zip(argv) {
        sp = push(sp, arg.len() as u64 + 1, stack_base)?;
        space.copy_out(mem, VirtualAddress::new(sp), arg)?;
        space.copy_out(mem, VirtualAddress::new(sp + arg.len() as u64), &[0])?;
        *slot = sp;
    }

    let argc = argv.len();
    let table = &pointers[..=argc];
    sp = push(sp, (table.len() * size_of::<u64>()) as u64, stack_base)?;
    let mut bytes = [0_u8; MAX_ARG * size_of::<u64>()];
    for (chunk, p) in bytes.chunks_exact_mut(size_of::<u64>()).zip(table) {
        chunk.copy_from_slice(&p.to_le_bytes());
    }
    space.copy_out(mem, VirtualAddress::new(sp), &bytes[..table.len() * size_of::<u64>()])?;

    Ok((VirtualAddress::new(sp), argc))
}

/// Reserve `len` bytes below `sp`, 16-byte aligned and not below `floor`.
fn push(sp: u64, len: u64, floor: u64) -> Result<u64, ExecError> {
    let sp = sp.checked_sub(len).ok_or(ExecError::StackOverflow)? & !0xF;
    if sp < floor {
        return Err(ExecError::StackOverflow);
    }
    Ok(sp)
}
