//! An SPI register protocol driver for the LumenRadio TimoTwo wireless DMX
//! transceiver module.
//!
//! The device speaks a command/register protocol: every transaction starts
//! with one 8-bit command byte (a 2-bit opcode class OR'd with a 6-bit
//! register address, or a fixed opcode), then waits for the module to pull
//! its nIRQ line low, then exchanges the payload prefixed by one IRQ-flags
//! byte. Register transactions are capped at 32 bytes, so a full DMX
//! universe is streamed through the WRITE_DMX opcode in four 128-byte
//! blocks.
//!
//! The driver is single-owner: the task feeding the transceiver owns the
//! [`Timo`] value exclusively, so no internal locking is done here.

pub mod bus;
mod color;
pub mod mock;
pub mod registers;

pub use bus::Bus;
pub use color::Rgb;
pub use registers::{DmxDataSource, Register, RegisterSpec, RfPower, RfProtocol, TxRxMode};

use num_traits::FromPrimitive;
use registers::MAX_REG_SIZE;
use std::{
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// One scheduler tick, the ready-poll interval.
const TICK: Duration = Duration::from_millis(1);

/// How long a transaction waits for the nIRQ handshake before giving up.
const TRANSACTION_TIMEOUT: Duration = Duration::from_millis(100);

/// Settle time between a register write and its verification readback.
const VERIFY_DELAY: Duration = Duration::from_millis(10);

/// Settle time after each configuration step. The chip silently ignores
/// commands issued too soon after certain register writes; omitting these
/// shows up as verify failures on the next step.
const SETTLE_DELAY: Duration = Duration::from_millis(10);

/// A DMX universe is streamed as four blocks of this size.
const DMX_BLOCK_LEN: usize = 128;

/// Pause between DMX blocks.
const DMX_BLOCK_DELAY: Duration = Duration::from_millis(1);

/// The number of channels in a DMX-512 universe.
pub const DMX_UNIVERSE_LEN: usize = 512;

/// The SPI command byte table, bit-for-bit.
///
/// READ_REG and WRITE_REG carry the register address in their 6 LSBs; the
/// rest are fixed opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpiCommand {
    /// Read from a register. 6 LSB = register address.
    ReadReg = 0b0000_0000,
    /// Write to a register. 6 LSB = register address.
    WriteReg = 0b0100_0000,
    /// Read the latest received DMX values from the configured window.
    ReadDmx = 0b1000_0001,
    /// Read the latest received alternate-start-code frame.
    ReadAsc = 0b1000_0010,
    /// Read the received RDM request (RX mode) or response (TX mode).
    ReadRdm = 0b1000_0011,
    /// Read available RXTX interface data.
    ReadRxTx = 0b1000_0100,
    /// Write DMX to the internal DMX generation buffer.
    WriteDmx = 0b1001_0001,
    /// Write an RDM response (RX mode) or request (TX mode).
    WriteRdm = 0b1001_0010,
    /// Write RXTX interface data.
    WriteRxTx = 0b1001_0011,
    /// Write a radio discover-unique-branch command.
    RadioDiscovery = 0b1010_0000,
    /// Read the radio DUB result.
    RadioDiscoveryResult = 0b1010_0001,
    /// Write a radio mute command.
    RadioMute = 0b1010_0010,
    /// Read the radio mute response.
    RadioMuteResult = 0b1010_0011,
    /// Write an RDM DUB command.
    RdmDiscovery = 0b1010_0100,
    /// Read the RDM DUB result.
    RdmDiscoveryResult = 0b1010_0101,
    /// Write a radio node query command.
    NodeQuery = 0b1010_0110,
    /// Read the radio node query response.
    NodeQueryResponse = 0b1010_0111,
    /// No operation; shortcut to read the IRQ_FLAGS register.
    Nop = 0b1111_1111,
}

/// Errors that can be thrown from driver operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("timed out waiting for the device ready line")]
    Timeout,
    #[error("SPI bus exchange failed")]
    Transport(#[from] anyhow::Error),
    #[error("register {addr:#04x} readback does not match the written value")]
    VerifyMismatch { addr: u8 },
    #[error("device is not initialized")]
    NotInitialized,
    #[error("device is already initialized")]
    AlreadyInitialized,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The logical radio configuration, mirrored from the last writes that
/// actually succeeded. Used to detect redundant configuration pushes and to
/// answer getters without touching hardware.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SoftwareConfig {
    pub radio_enabled: bool,
    pub tx_rx_mode: TxRxMode,
    pub rf_protocol: RfProtocol,
    pub rf_power: RfPower,
    pub dmx_source: DmxDataSource,
    pub universe_color: Rgb,
    pub device_name: String,
    pub universe_name: String,
}

/// A point-in-time snapshot of the STATUS register. Not persisted; `valid`
/// is false when the register could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimoStatus {
    pub valid: bool,
    pub update_mode: bool,
    pub dmx_available: bool,
    pub rdm_identify: bool,
    pub rf_link: bool,
    pub linked: bool,
}

/// The TimoTwo driver over a [`Bus`].
#[derive(Debug)]
pub struct Timo<B> {
    bus: B,
    initialized: bool,
    sw_config: SoftwareConfig,
    ready_timeout: Duration,
}

impl<B: Bus> Timo<B> {
    /// A driver in the `Uninitialized` state; call [`Timo::init`] before any
    /// transaction.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            initialized: false,
            sw_config: SoftwareConfig::default(),
            ready_timeout: TRANSACTION_TIMEOUT,
        }
    }

    /// Moves the driver to `Initialized`. One-way; initializing twice is an
    /// error.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyInitialized`] on a second call.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            error!("cannot initialize the transceiver twice");
            return Err(Error::AlreadyInitialized);
        }
        self.initialized = true;
        Ok(())
    }

    /// Overrides the nIRQ handshake timeout. Mostly useful in tests.
    pub fn set_ready_timeout(&mut self, timeout: Duration) {
        self.ready_timeout = timeout;
    }

    fn ensure_init(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            error!("transceiver is not initialized");
            Err(Error::NotInitialized)
        }
    }

    /// True when the device has pulled nIRQ low and will accept the data
    /// phase of a transaction.
    pub fn is_ready(&mut self) -> bool {
        self.initialized && self.bus.irq_low()
    }

    /// Busy-polls the ready line once per tick. Blocks only the calling
    /// task.
    fn wait_ready(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_ready() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(TICK);
        }
        true
    }

    /// Transmits one command byte: the opcode OR'd with a 6-bit register
    /// address where applicable.
    ///
    /// # Errors
    /// Fails if the address exceeds the 6-bit maximum or the device is not
    /// initialized.
    pub fn send_command(&mut self, cmd: SpiCommand, addr: u8) -> Result<()> {
        self.ensure_init()?;
        if addr > registers::REG_ADDR_MAX {
            error!(addr, "register address is larger than the 6-bit maximum");
            return Err(Error::InvalidArgument("register address is 6 bits"));
        }
        let mut scratch = [0u8; 1];
        self.bus.exchange(&[cmd as u8 | addr], &mut scratch)?;
        Ok(())
    }

    /// One full register transaction: command, ready handshake, then the
    /// `len + 1` byte full-duplex data phase (IRQ-flags prefix + payload).
    fn transact(&mut self, write: bool, addr: u8, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        debug_assert_eq!(tx.len(), rx.len());
        let len = tx.len() - 1;
        if len > MAX_REG_SIZE {
            error!(len, "requested register size is more than the maximum");
            return Err(Error::InvalidArgument("register transaction too long"));
        }
        let cmd = if write {
            SpiCommand::WriteReg
        } else {
            SpiCommand::ReadReg
        };
        self.send_command(cmd, addr)?;
        if !self.wait_ready(self.ready_timeout) {
            error!(addr, "timed out waiting for the command handshake");
            return Err(Error::Timeout);
        }
        self.bus.exchange(tx, rx)?;
        Ok(())
    }

    /// Writes a register with write-verify at the default settle delay.
    ///
    /// # Errors
    /// See [`Timo::write_register_with`].
    pub fn write_register(&mut self, reg: &Register) -> Result<()> {
        self.write_register_with(reg, true, VERIFY_DELAY)
    }

    /// Writes a register's raw bytes; with `verify`, waits `verify_delay`
    /// and reads the register back. The protocol has no CRC, so the
    /// readback is the only guard against silent corruption.
    ///
    /// # Errors
    /// [`Error::VerifyMismatch`] if the readback differs bytewise from what
    /// was written; otherwise the usual transaction errors.
    pub fn write_register_with(
        &mut self,
        reg: &Register,
        verify: bool,
        verify_delay: Duration,
    ) -> Result<()> {
        self.ensure_init()?;
        let len = reg.len();
        let mut tx = [0u8; MAX_REG_SIZE + 1];
        let mut rx = [0u8; MAX_REG_SIZE + 1];
        tx[0] = 0xFF;
        tx[1..=len].copy_from_slice(reg.bytes());
        self.transact(true, reg.addr(), &tx[..=len], &mut rx[..=len])?;

        if verify {
            thread::sleep(verify_delay);
            let readback = self.read_register(reg.spec())?;
            if readback.bytes() != reg.bytes() {
                error!(
                    addr = reg.addr(),
                    wrote = ?reg.bytes(),
                    read = ?readback.bytes(),
                    "register verify failed"
                );
                return Err(Error::VerifyMismatch { addr: reg.addr() });
            }
        }
        debug!(addr = reg.addr(), len, "register written");
        Ok(())
    }

    /// Reads a register into fresh storage. The transmit payload is cleared
    /// first; a read has nothing to send beyond the command.
    ///
    /// # Errors
    /// Returns the usual transaction errors.
    pub fn read_register(&mut self, spec: RegisterSpec) -> Result<Register> {
        self.ensure_init()?;
        let mut tx = [0u8; MAX_REG_SIZE + 1];
        let mut rx = [0u8; MAX_REG_SIZE + 1];
        tx[0] = 0xFF;
        self.transact(false, spec.addr, &tx[..=spec.len], &mut rx[..=spec.len])?;
        let mut reg = Register::new(spec);
        reg.bytes_mut().copy_from_slice(&rx[1..=spec.len]);
        Ok(reg)
    }

    /// Streams one universe into the device's internal DMX generation
    /// buffer as four 128-byte blocks. The device's register transaction
    /// buffer is far smaller than a universe, so the command framing is
    /// repeated per block. No verify; this path runs every refresh cycle.
    ///
    /// # Errors
    /// Returns the usual transaction errors.
    pub fn write_dmx(&mut self, universe: &[u8; DMX_UNIVERSE_LEN]) -> Result<()> {
        self.ensure_init()?;
        for block in universe.chunks(DMX_BLOCK_LEN) {
            self.send_command(SpiCommand::WriteDmx, 0)?;
            if !self.wait_ready(self.ready_timeout) {
                error!("timed out waiting for the DMX block handshake");
                return Err(Error::Timeout);
            }
            let mut tx = [0u8; DMX_BLOCK_LEN + 1];
            let mut rx = [0u8; DMX_BLOCK_LEN + 1];
            tx[0] = 0xFF;
            tx[1..].copy_from_slice(block);
            self.bus.exchange(&tx, &mut rx)?;
            thread::sleep(DMX_BLOCK_DELAY);
        }
        Ok(())
    }

    /// Applies a full configuration in the order the chip requires, with a
    /// settle delay after every step. The first failing step
    /// short-circuits the rest; the shadow config only ever reflects writes
    /// that actually succeeded, so a partial failure leaves it consistent
    /// with the hardware.
    ///
    /// # Errors
    /// Returns the first failing step's error.
    pub fn apply_config(&mut self, cfg: &SoftwareConfig) -> Result<()> {
        self.ensure_init()?;

        let config = registers::CONFIG
            .register()
            .set(registers::config::RADIO_ENABLE, u8::from(cfg.radio_enabled))
            .set(registers::config::TX_RX_MODE, cfg.tx_rx_mode as u8)
            .set(registers::config::UART_EN, 0);
        self.write_register(&config)?;
        self.sw_config.radio_enabled = cfg.radio_enabled;
        self.sw_config.tx_rx_mode = cfg.tx_rx_mode;
        thread::sleep(SETTLE_DELAY);

        self.set_rf_protocol(cfg.rf_protocol)?;
        thread::sleep(SETTLE_DELAY);
        self.set_dmx_source(cfg.dmx_source)?;
        thread::sleep(SETTLE_DELAY);
        self.set_rf_power(cfg.rf_power)?;
        thread::sleep(SETTLE_DELAY);
        self.set_universe_color(cfg.universe_color)?;
        thread::sleep(SETTLE_DELAY);
        self.set_device_name(&cfg.device_name)?;
        thread::sleep(SETTLE_DELAY);
        self.set_universe_name(&cfg.universe_name)?;
        thread::sleep(SETTLE_DELAY);

        let spec = registers::DMX_SPEC
            .register()
            .set(registers::dmx_spec::N_CHANNELS_MSB, 0x02)
            .set(registers::dmx_spec::N_CHANNELS_LSB, 0x00);
        self.write_register(&spec)?;
        thread::sleep(SETTLE_DELAY);

        let control = registers::DMX_CONTROL
            .register()
            .set(registers::dmx_control::ENABLE, 1);
        self.write_register(&control)?;
        thread::sleep(SETTLE_DELAY);

        Ok(())
    }

    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_radio_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_init()?;
        let config = registers::CONFIG
            .register()
            .set(registers::config::RADIO_ENABLE, u8::from(enabled))
            .set(registers::config::TX_RX_MODE, self.sw_config.tx_rx_mode as u8)
            .set(registers::config::UART_EN, 0);
        self.write_register(&config)?;
        self.sw_config.radio_enabled = enabled;
        Ok(())
    }

    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_tx_rx_mode(&mut self, mode: TxRxMode) -> Result<()> {
        self.ensure_init()?;
        let config = registers::CONFIG
            .register()
            .set(
                registers::config::RADIO_ENABLE,
                u8::from(self.sw_config.radio_enabled),
            )
            .set(registers::config::TX_RX_MODE, mode as u8)
            .set(registers::config::UART_EN, 0);
        self.write_register(&config)?;
        self.sw_config.tx_rx_mode = mode;
        Ok(())
    }

    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_rf_protocol(&mut self, protocol: RfProtocol) -> Result<()> {
        self.ensure_init()?;
        let reg = registers::RF_PROTOCOL
            .register()
            .set(registers::rf_protocol::TX_PROTOCOL, protocol as u8);
        self.write_register(&reg)?;
        self.sw_config.rf_protocol = protocol;
        Ok(())
    }

    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_rf_power(&mut self, power: RfPower) -> Result<()> {
        self.ensure_init()?;
        let reg = registers::RF_POWER
            .register()
            .set(registers::rf_power::OUTPUT_POWER, power as u8);
        self.write_register(&reg)?;
        self.sw_config.rf_power = power;
        Ok(())
    }

    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_dmx_source(&mut self, source: DmxDataSource) -> Result<()> {
        self.ensure_init()?;
        let reg = registers::DMX_SOURCE
            .register()
            .set(registers::dmx_source::DATA_SOURCE, source as u8);
        self.write_register(&reg)?;
        self.sw_config.dmx_source = source;
        Ok(())
    }

    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_universe_color(&mut self, color: Rgb) -> Result<()> {
        self.ensure_init()?;
        let reg = registers::UNIVERSE_COLOR
            .register()
            .set(registers::universe_color::RED, color.red)
            .set(registers::universe_color::GREEN, color.green)
            .set(registers::universe_color::BLUE, color.blue);
        self.write_register(&reg)?;
        self.sw_config.universe_color = color;
        Ok(())
    }

    /// Writes the 32-byte ASCII name register; longer names are truncated.
    ///
    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_device_name(&mut self, name: &str) -> Result<()> {
        self.ensure_init()?;
        let mut reg = Register::new(registers::DEVICE_NAME);
        let bytes = name.as_bytes();
        let n = bytes.len().min(reg.len());
        reg.bytes_mut()[..n].copy_from_slice(&bytes[..n]);
        self.write_register(&reg)?;
        self.sw_config.device_name = name.to_string();
        Ok(())
    }

    /// Writes the 16-byte ASCII universe name register; longer names are
    /// truncated.
    ///
    /// # Errors
    /// Returns the usual transaction errors.
    pub fn set_universe_name(&mut self, name: &str) -> Result<()> {
        self.ensure_init()?;
        let mut reg = Register::new(registers::UNIVERSE_NAME);
        let bytes = name.as_bytes();
        let n = bytes.len().min(reg.len());
        reg.bytes_mut()[..n].copy_from_slice(&bytes[..n]);
        self.write_register(&reg)?;
        self.sw_config.universe_name = name.to_string();
        Ok(())
    }

    /// The last configuration that was actually applied to hardware.
    pub fn sw_config(&self) -> &SoftwareConfig {
        &self.sw_config
    }

    /// Snapshot of the STATUS register. An unreadable STATUS yields an
    /// invalid snapshot rather than an error; status polling is advisory.
    pub fn status(&mut self) -> TimoStatus {
        match self.read_register(registers::STATUS) {
            Ok(reg) => TimoStatus {
                valid: true,
                update_mode: reg.get(registers::status::UPDATE_MODE) != 0,
                dmx_available: reg.get(registers::status::DMX) != 0,
                rdm_identify: reg.get(registers::status::IDENTIFY) != 0,
                rf_link: reg.get(registers::status::RF_LINK) != 0,
                linked: reg.get(registers::status::LINKED) != 0,
            },
            Err(e) => {
                warn!(error = %e, "could not read the status register");
                TimoStatus::default()
            }
        }
    }

    /// The DMX data source the device is currently configured for, read
    /// from hardware rather than the shadow.
    ///
    /// # Errors
    /// Fails on transaction errors or if the device reports a value outside
    /// the known source table.
    pub fn dmx_source(&mut self) -> Result<DmxDataSource> {
        let reg = self.read_register(registers::DMX_SOURCE)?;
        DmxDataSource::from_u8(reg.get(registers::dmx_source::DATA_SOURCE))
            .ok_or(Error::InvalidArgument("unknown DMX data source reported"))
    }

    /// Hardware and software version words, big-endian.
    ///
    /// # Errors
    /// Returns the usual transaction errors.
    #[allow(clippy::missing_panics_doc)]
    pub fn version(&mut self) -> Result<(u32, u32)> {
        let reg = self.read_register(registers::VERSION)?;
        let hw = u32::from_be_bytes(reg.bytes()[..4].try_into().unwrap());
        let sw = u32::from_be_bytes(reg.bytes()[4..].try_into().unwrap());
        Ok((hw, sw))
    }

    /// RF packet delivery rate in percent.
    ///
    /// # Errors
    /// Returns the usual transaction errors.
    pub fn link_quality(&mut self) -> Result<u8> {
        let reg = self.read_register(registers::LINK_QUALITY)?;
        Ok(reg.get(registers::link_quality::PDR))
    }

    /// Hands the bus back, consuming the driver.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// The underlying bus, for test assertions.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
