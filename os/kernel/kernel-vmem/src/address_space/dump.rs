use crate::address_space::AddressSpace;
use crate::page_table::EntryKind;
use crate::{PhysMapper, table_ref};
use core::fmt;
use kernel_memory_addresses::PhysicalPage;

impl AddressSpace {
    /// Print the tree, one line per valid entry:
    ///
    /// ```text
    /// page table 0x0000000087f6b000
    ///  ..0: pte 0x0000000021fd9c01 pa 0x0000000087f67000
    ///  .. ..0: pte 0x0000000021fd9801 pa 0x0000000087f66000
    ///  .. .. ..0: pte 0x0000000021fda01b pa 0x0000000087f68000
    /// ```
    ///
    /// # Errors
    /// Propagates errors from `w`.
    pub fn dump<M: PhysMapper + ?Sized>(&self, m: &M, w: &mut impl fmt::Write) -> fmt::Result {
        writeln!(w, "page table {:#018x}", self.root_page().base().as_u64())?;
        dump_table(m, w, self.root_page(), 1)
    }
}

fn dump_table<M: PhysMapper + ?Sized>(
    m: &M,
    w: &mut impl fmt::Write,
    page: PhysicalPage,
    depth: usize,
) -> fmt::Result {
    // SAFETY: only reached from an owned root.
    let table = unsafe { table_ref(m, page) };
    for (i, entry) in table.valid_entries() {
        for _ in 0..depth {
            w.write_str(" ..")?;
        }
        writeln!(
            w,
            "{i}: pte {:#018x} pa {:#018x}",
            entry.raw(),
            entry.bits().physical_address().as_u64()
        )?;
        // Depth is bounded by the three levels.
        if let EntryKind::Table(child) = entry.kind()
            && depth < 3
        {
            dump_table(m, w, child, depth + 1)?;
        }
    }
    Ok(())
}
