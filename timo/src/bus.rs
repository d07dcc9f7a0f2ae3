//! The hardware seam the driver talks through.
//!
//! The methods of this trait *assume* the SPI device and the nIRQ input pin
//! are already configured; the driver owns framing, timing, and retries on
//! top of it.

/// A full-duplex SPI device plus the dedicated "not-IRQ" handshake line.
pub trait Bus {
    /// Exchange `tx.len()` bytes full-duplex. `tx` and `rx` are always the
    /// same length.
    ///
    /// # Errors
    /// Returns an error if the underlying bus transaction fails.
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> anyhow::Result<()>;

    /// Level of the nIRQ line; the device is ready for the data phase of a
    /// transaction when the line reads low.
    fn irq_low(&mut self) -> bool;
}
