//! A mock bus that simulates the transceiver chip, used in testing the
//! driver without hardware.

use crate::{
    bus::Bus,
    registers::{self, RegisterSpec},
    SpiCommand,
};
use anyhow::bail;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
enum Pending {
    ReadReg(u8),
    WriteReg(u8),
    WriteDmx,
}

/// Simulated device state: register memory, the command/data-phase protocol,
/// and fault-injection knobs for the driver's error paths.
#[derive(Debug, Default)]
pub struct MockBus {
    memory: HashMap<u8, Vec<u8>>,
    pending: Option<Pending>,
    /// DMX blocks captured from WRITE_DMX data phases, in arrival order.
    pub dmx_blocks: Vec<Vec<u8>>,
    /// Register addresses written, in order.
    pub write_log: Vec<u8>,
    /// When false, the nIRQ line never goes low and every ready-wait times
    /// out.
    pub never_ready: bool,
    /// When true, every exchange fails at the bus level.
    pub fail_exchange: bool,
    /// Corrupt the first byte of the next register read served; cleared
    /// after use. Exercises write-verify mismatch.
    pub corrupt_next_read: bool,
}

impl MockBus {
    #[must_use]
    pub fn new() -> Self {
        let mut memory = HashMap::new();
        for RegisterSpec { addr, len } in registers::ALL {
            memory.insert(*addr, vec![0u8; *len]);
        }
        Self {
            memory,
            ..Self::default()
        }
    }

    /// Raw register memory, for asserting on what the driver wrote.
    #[must_use]
    pub fn register(&self, addr: u8) -> &[u8] {
        &self.memory[&addr]
    }

    /// Preload register memory, for driving the read paths.
    pub fn set_register(&mut self, addr: u8, bytes: &[u8]) {
        self.memory.insert(addr, bytes.to_vec());
    }
}

impl Bus for MockBus {
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> anyhow::Result<()> {
        assert_eq!(tx.len(), rx.len(), "exchange buffers must match");
        if self.fail_exchange {
            bail!("simulated bus failure");
        }

        // A one-byte exchange is always the command phase; every data phase
        // is the payload plus the IRQ-flags prefix.
        if tx.len() == 1 {
            let byte = tx[0];
            self.pending = match byte & 0b1100_0000 {
                0b0000_0000 => Some(Pending::ReadReg(byte & registers::REG_ADDR_MAX)),
                0b0100_0000 => Some(Pending::WriteReg(byte & registers::REG_ADDR_MAX)),
                _ if byte == SpiCommand::WriteDmx as u8 => Some(Pending::WriteDmx),
                _ => None,
            };
            rx[0] = 0;
            return Ok(());
        }

        match self.pending.take() {
            Some(Pending::ReadReg(addr)) => {
                rx[0] = 0;
                let stored = self
                    .memory
                    .get(&addr)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let n = (rx.len() - 1).min(stored.len());
                rx[1..=n].copy_from_slice(&stored[..n]);
                if self.corrupt_next_read {
                    self.corrupt_next_read = false;
                    rx[1] ^= 0xFF;
                }
            }
            Some(Pending::WriteReg(addr)) => {
                self.memory.insert(addr, tx[1..].to_vec());
                self.write_log.push(addr);
                rx[0] = 0;
            }
            Some(Pending::WriteDmx) => {
                self.dmx_blocks.push(tx[1..].to_vec());
                rx[0] = 0;
            }
            None => bail!("data phase with no preceding command"),
        }
        Ok(())
    }

    fn irq_low(&mut self) -> bool {
        !self.never_ready
    }
}
