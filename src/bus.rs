/// Trait that defines the CPU's native view of the address space.
///
/// The core can only address a 64 KiB data window at a time. The window is
/// moved by writing a page number to the page-select register. Code space and
/// side-band registers are reached through dedicated instructions and are
/// exposed as separate methods.
///
/// [`Memory`](crate::Memory) is the only user of the paging methods and
/// restores the page-select register after each access.
pub trait Bus {
    /// Read the page-select register.
    ///
    /// Chips with unified 16-bit addressing have no page register and can
    /// return 0 here.
    fn page(&mut self) -> u8;

    /// Write the page-select register.
    fn set_page(&mut self, page: u8);

    /// Load a byte through the data window of the current page.
    fn load(&mut self, offset: u16) -> u8;

    /// Store a byte through the data window of the current page.
    fn store(&mut self, offset: u16, value: u8);

    /// Read a byte from code space.
    fn read_code(&mut self, offset: u32) -> u8;

    /// Read a side-band register. Unmapped registers read as 0.
    fn get_register(&mut self, addr: u8) -> u8;

    /// Write a side-band register. Writes to unmapped registers are dropped.
    fn set_register(&mut self, addr: u8, value: u8);

    /// Stop executing and wait for the hardware to reset the chip.
    fn halt(&mut self) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}
