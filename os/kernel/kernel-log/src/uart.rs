//! Polled output on the QEMU `virt` 16550 UART.
//!
//! Only transmit is used. The UART must already be mapped at its physical
//! address (true before paging and under the kernel page table).

use core::fmt::{self, Write};
use kernel_info::memory::UART0;

/// Transmit holding register.
const THR: u64 = 0;
/// Line status register.
const LSR: u64 = 5;
/// LSR: transmit holding register empty.
const LSR_TX_IDLE: u8 = 1 << 5;

struct Uart;

impl Uart {
    #[inline]
    fn putc(c: u8) {
        let lsr = (UART0 + LSR) as *const u8;
        let thr = (UART0 + THR) as *mut u8;
        // SAFETY: UART0 is an always-mapped MMIO window on this board.
        unsafe {
            while core::ptr::read_volatile(lsr) & LSR_TX_IDLE == 0 {
                core::hint::spin_loop();
            }
            core::ptr::write_volatile(thr, c);
        }
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(Uart::putc);
        Ok(())
    }
}

/// A [`Sink`](crate::Sink) writing to UART0.
#[allow(clippy::needless_pass_by_value)]
pub fn uart_write(args: fmt::Arguments) {
    let _ = Uart.write_fmt(args);
}
