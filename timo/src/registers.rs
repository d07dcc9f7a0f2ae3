//! The TimoTwo SPI register map as a data-driven field-descriptor table.
//!
//! Every hardware register is a fixed 6-bit address plus an ordered byte
//! array of known length. Named bit-ranges within a register byte are
//! described by [`Field`] descriptors and packed/unpacked with plain
//! mask-and-shift, so there is no per-register type machinery; a concrete
//! register is just a [`RegisterSpec`] constant plus a module of `Field`
//! constants.
//!
//! Register layout follows <https://docs.lumenrad.io/timotwo/spi-interface/>

use num_derive::{FromPrimitive, ToPrimitive};

/// Register addresses are 6 bits.
pub const REG_ADDR_MAX: u8 = 0b0011_1111;

/// The largest register on the device (DEVICE_NAME) is 32 bytes, which also
/// bounds a single register transaction.
pub const MAX_REG_SIZE: usize = 32;

/// A named bit-range over one byte of a register.
///
/// `start` is the index of the least significant bit, `len` the number of
/// bits, and `offset` the byte within the register the field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub start: u8,
    pub len: u8,
    pub offset: usize,
}

impl Field {
    /// # Panics
    /// Panics if the field does not fit within a single byte. Field
    /// constants are evaluated at compile time, so a bad descriptor fails
    /// the build.
    #[must_use]
    pub const fn new(start: u8, len: u8, offset: usize) -> Self {
        assert!(start + len <= 8, "field must fit within one byte");
        assert!(len > 0, "field must be at least one bit wide");
        Self { start, len, offset }
    }

    #[must_use]
    pub const fn mask(self) -> u8 {
        (((1u16 << self.len) - 1) as u8) << self.start
    }
}

/// Returns `byte` with the field's bits replaced by `(value << start) & mask`,
/// leaving all other bits untouched. Values wider than the field are silently
/// truncated by the mask.
#[must_use]
pub const fn set_field(byte: u8, field: Field, value: u8) -> u8 {
    let mask = field.mask();
    (byte & !mask) | ((value << field.start) & mask)
}

/// Extracts a field's bits: `(byte & mask) >> start`.
#[must_use]
pub const fn get_field(byte: u8, field: Field) -> u8 {
    (byte & field.mask()) >> field.start
}

/// The address and length of one hardware register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub addr: u8,
    pub len: usize,
}

impl RegisterSpec {
    /// # Panics
    /// Panics (at compile time, for the constants below) if the address
    /// exceeds the 6-bit maximum or the length exceeds [`MAX_REG_SIZE`].
    #[must_use]
    pub const fn new(addr: u8, len: usize) -> Self {
        assert!(addr <= REG_ADDR_MAX, "register address is 6 bits");
        assert!(len >= 1 && len <= MAX_REG_SIZE);
        Self { addr, len }
    }

    /// A zeroed register with this layout.
    #[must_use]
    pub fn register(self) -> Register {
        Register::new(self)
    }
}

/// A register value: spec plus owned bytes. Constructed fresh per
/// transaction; the device is the source of truth, no cache is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    spec: RegisterSpec,
    data: Vec<u8>,
}

impl Register {
    #[must_use]
    pub fn new(spec: RegisterSpec) -> Self {
        Self {
            spec,
            data: vec![0; spec.len],
        }
    }

    #[must_use]
    pub fn spec(&self) -> RegisterSpec {
        self.spec
    }

    #[must_use]
    pub fn addr(&self) -> u8 {
        self.spec.addr
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spec.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Builder-style field write, chainable.
    ///
    /// # Panics
    /// Panics if the field's byte offset is beyond the register length; that
    /// is a programming error in the register table, not a runtime
    /// condition.
    #[must_use]
    pub fn set(mut self, field: Field, value: u8) -> Self {
        assert!(
            field.offset < self.spec.len,
            "field offset {} out of range for register {:#04x} (len {})",
            field.offset,
            self.spec.addr,
            self.spec.len
        );
        self.data[field.offset] = set_field(self.data[field.offset], field, value);
        self
    }

    /// # Panics
    /// Panics if the field's byte offset is beyond the register length.
    #[must_use]
    pub fn get(&self, field: Field) -> u8 {
        assert!(field.offset < self.spec.len);
        get_field(self.data[field.offset], field)
    }
}

// ---------------------------------------------------------------------------
// The register table
// ---------------------------------------------------------------------------

pub const CONFIG: RegisterSpec = RegisterSpec::new(0x00, 1);
pub mod config {
    use super::Field;
    pub const RADIO_ENABLE: Field = Field::new(7, 1, 0);
    pub const SPI_RDM: Field = Field::new(3, 1, 0);
    pub const TX_RX_MODE: Field = Field::new(1, 1, 0);
    pub const UART_EN: Field = Field::new(0, 1, 0);
}

pub const STATUS: RegisterSpec = RegisterSpec::new(0x01, 1);
pub mod status {
    use super::Field;
    pub const UPDATE_MODE: Field = Field::new(7, 1, 0);
    pub const DMX: Field = Field::new(3, 1, 0);
    pub const IDENTIFY: Field = Field::new(2, 1, 0);
    pub const RF_LINK: Field = Field::new(1, 1, 0);
    pub const LINKED: Field = Field::new(0, 1, 0);
}

pub const IRQ_MASK: RegisterSpec = RegisterSpec::new(0x02, 1);
pub mod irq_mask {
    use super::Field;
    pub const EXTENDED_IRQ_EN: Field = Field::new(6, 1, 0);
    pub const IDENTIFY_IRQ_EN: Field = Field::new(5, 1, 0);
    pub const ASC_IRQ_EN: Field = Field::new(4, 1, 0);
    pub const RF_LINK_IRQ_EN: Field = Field::new(3, 1, 0);
    pub const DMX_CHANGED_IRQ_EN: Field = Field::new(2, 1, 0);
    pub const LOST_DMX_IRQ_EN: Field = Field::new(1, 1, 0);
    pub const RX_DMX_IRQ_EN: Field = Field::new(0, 1, 0);
}

pub const IRQ_FLAGS: RegisterSpec = RegisterSpec::new(0x03, 1);
pub mod irq_flags {
    use super::Field;
    pub const SPI_DEVICE_BUSY: Field = Field::new(7, 1, 0);
    pub const EXTENDED_IRQ: Field = Field::new(6, 1, 0);
    pub const IDENTIFY_IRQ: Field = Field::new(5, 1, 0);
    pub const ASC_IRQ: Field = Field::new(4, 1, 0);
    pub const RF_LINK_IRQ: Field = Field::new(3, 1, 0);
    pub const DMX_CHANGED_IRQ: Field = Field::new(2, 1, 0);
    pub const LOST_DMX_IRQ: Field = Field::new(1, 1, 0);
    pub const RX_DMX_IRQ: Field = Field::new(0, 1, 0);
}

pub const DMX_WINDOW: RegisterSpec = RegisterSpec::new(0x04, 4);
pub mod dmx_window {
    use super::Field;
    pub const WINDOW_SIZE_MSB: Field = Field::new(0, 8, 0);
    pub const WINDOW_SIZE_LSB: Field = Field::new(0, 8, 1);
    pub const START_ADDRESS_MSB: Field = Field::new(0, 8, 2);
    pub const START_ADDRESS_LSB: Field = Field::new(0, 8, 3);
}

pub const ASC_FRAME: RegisterSpec = RegisterSpec::new(0x05, 3);
pub mod asc_frame {
    use super::Field;
    pub const LENGTH_MSB: Field = Field::new(0, 8, 0);
    pub const LENGTH_LSB: Field = Field::new(0, 8, 1);
    pub const START_CODE: Field = Field::new(0, 8, 2);
}

pub const LINK_QUALITY: RegisterSpec = RegisterSpec::new(0x06, 1);
pub mod link_quality {
    use super::Field;
    /// Packet delivery rate in percent.
    pub const PDR: Field = Field::new(0, 8, 0);
}

pub const DMX_SPEC: RegisterSpec = RegisterSpec::new(0x08, 8);
pub mod dmx_spec {
    use super::Field;
    pub const N_CHANNELS_MSB: Field = Field::new(0, 8, 0);
    pub const N_CHANNELS_LSB: Field = Field::new(0, 8, 1);
    pub const INTERSLOT_TIME_MSB: Field = Field::new(0, 8, 2);
    pub const INTERSLOT_TIME_LSB: Field = Field::new(0, 8, 3);
    pub const REFRESH_PERIOD_MSB: Field = Field::new(0, 8, 4);
    pub const REFRESH_PERIOD_B2: Field = Field::new(0, 8, 5);
    pub const REFRESH_PERIOD_B1: Field = Field::new(0, 8, 6);
    pub const REFRESH_PERIOD_LSB: Field = Field::new(0, 8, 7);
}

pub const DMX_CONTROL: RegisterSpec = RegisterSpec::new(0x09, 1);
pub mod dmx_control {
    use super::Field;
    pub const ENABLE: Field = Field::new(0, 1, 0);
}

pub const EXTENDED_IRQ_MASK: RegisterSpec = RegisterSpec::new(0x0A, 4);
pub const EXTENDED_IRQ_FLAGS: RegisterSpec = RegisterSpec::new(0x0B, 4);

pub const RF_PROTOCOL: RegisterSpec = RegisterSpec::new(0x0C, 1);
pub mod rf_protocol {
    use super::Field;
    pub const TX_PROTOCOL: Field = Field::new(0, 8, 0);
}

pub const DMX_SOURCE: RegisterSpec = RegisterSpec::new(0x0D, 1);
pub mod dmx_source {
    use super::Field;
    pub const DATA_SOURCE: Field = Field::new(0, 8, 0);
}

pub const LOLLIPOP: RegisterSpec = RegisterSpec::new(0x0E, 1);

/// Four big-endian bytes of hardware version followed by four of software
/// version. Use the byte buffer directly.
pub const VERSION: RegisterSpec = RegisterSpec::new(0x10, 8);

pub const RF_POWER: RegisterSpec = RegisterSpec::new(0x11, 1);
pub mod rf_power {
    use super::Field;
    pub const OUTPUT_POWER: Field = Field::new(0, 8, 0);
}

pub const BLOCKED_CHANNELS: RegisterSpec = RegisterSpec::new(0x12, 11);

/// RDM UID, most significant byte first. Use the byte buffer directly.
pub const BINDING_UID: RegisterSpec = RegisterSpec::new(0x20, 6);

pub const BLE_STATUS: RegisterSpec = RegisterSpec::new(0x30, 1);
pub mod ble_status {
    use super::Field;
    pub const PIN_ACTIVE: Field = Field::new(1, 1, 0);
    pub const BLE_ENABLE: Field = Field::new(0, 1, 0);
}

pub const BATTERY: RegisterSpec = RegisterSpec::new(0x32, 1);

pub const UNIVERSE_COLOR: RegisterSpec = RegisterSpec::new(0x33, 3);
pub mod universe_color {
    use super::Field;
    pub const RED: Field = Field::new(0, 8, 0);
    pub const GREEN: Field = Field::new(0, 8, 1);
    pub const BLUE: Field = Field::new(0, 8, 2);
}

pub const OEM_INFO: RegisterSpec = RegisterSpec::new(0x34, 4);

pub const RXTX_STATUS: RegisterSpec = RegisterSpec::new(0x35, 1);
pub mod rxtx_status {
    use super::Field;
    pub const CLEAR_TO_SEND: Field = Field::new(1, 1, 0);
    pub const DATA_AVAILABLE: Field = Field::new(0, 1, 0);
}

/// ASCII device name. Use the byte buffer directly.
pub const DEVICE_NAME: RegisterSpec = RegisterSpec::new(0x36, 32);

/// ASCII universe name. Use the byte buffer directly.
pub const UNIVERSE_NAME: RegisterSpec = RegisterSpec::new(0x37, 16);

pub const INSTALLED_OPTIONS: RegisterSpec = RegisterSpec::new(0x3D, 13);

pub const PRODUCT_ID: RegisterSpec = RegisterSpec::new(0x3F, 4);

/// Every register the driver knows about, used to size simulated device
/// memory in tests.
pub const ALL: &[RegisterSpec] = &[
    CONFIG,
    STATUS,
    IRQ_MASK,
    IRQ_FLAGS,
    DMX_WINDOW,
    ASC_FRAME,
    LINK_QUALITY,
    DMX_SPEC,
    DMX_CONTROL,
    EXTENDED_IRQ_MASK,
    EXTENDED_IRQ_FLAGS,
    RF_PROTOCOL,
    DMX_SOURCE,
    LOLLIPOP,
    VERSION,
    RF_POWER,
    BLOCKED_CHANNELS,
    BINDING_UID,
    BLE_STATUS,
    BATTERY,
    UNIVERSE_COLOR,
    OEM_INFO,
    RXTX_STATUS,
    DEVICE_NAME,
    UNIVERSE_NAME,
    INSTALLED_OPTIONS,
    PRODUCT_ID,
];

// ---------------------------------------------------------------------------
// Wire-value enums
// ---------------------------------------------------------------------------

/// CONFIG.TX_RX_MODE values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum TxRxMode {
    #[default]
    Rx = 0,
    Tx = 1,
}

/// RF_PROTOCOL.TX_PROTOCOL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum RfProtocol {
    #[default]
    Crmx = 0,
    WDmxG3 = 1,
    WDmxG4s = 2,
}

/// RF_POWER.OUTPUT_POWER values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum RfPower {
    Pwr100mW = 2,
    Pwr40mW = 3,
    Pwr13mW = 4,
    #[default]
    Pwr3mW = 5,
}

/// DMX_SOURCE.DATA_SOURCE values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum DmxDataSource {
    #[default]
    NoData = 0,
    UartDmx = 1,
    WirelessDmx = 2,
    Spi = 3,
    Ble = 4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks() {
        assert_eq!(Field::new(0, 1, 0).mask(), 0x01);
        assert_eq!(Field::new(6, 2, 0).mask(), 0xC0);
        assert_eq!(Field::new(0, 8, 0).mask(), 0xFF);
    }

    #[test]
    fn set_field_cases() {
        let low = Field::new(0, 1, 0);
        assert_eq!(set_field(0x00, low, 0), 0x00);
        assert_eq!(set_field(0x00, low, 1), 0x01);
        assert_eq!(set_field(0x01, low, 0), 0x00);
        assert_eq!(set_field(0x01, low, 1), 0x01);

        let mid = Field::new(4, 3, 0);
        assert_eq!(set_field(0x00, mid, 1), 0x10);
        assert_eq!(set_field(0xFF, mid, 0), 0x8F);
        // Values wider than the field truncate silently.
        assert_eq!(set_field(0xFF, mid, 0xFF), 0xFF);
        assert_eq!(set_field(0x00, mid, 0xFF), 0x70);
    }

    #[test]
    fn pack_unpack_roundtrip() {
        // get(set(x, v)) == v & ((1 << len) - 1) for every in-byte field.
        for start in 0..8u8 {
            for len in 1..=(8 - start) {
                let field = Field::new(start, len, 0);
                for &x in &[0x00u8, 0xFF, 0xA5, 0x3C] {
                    for &v in &[0x00u8, 0x01, 0x7F, 0xFF] {
                        let truncated = v & (((1u16 << len) - 1) as u8);
                        assert_eq!(get_field(set_field(x, field, v), field), truncated);
                    }
                }
            }
        }
    }

    #[test]
    fn builder_chains_and_reads_back() {
        let reg = CONFIG
            .register()
            .set(config::RADIO_ENABLE, 1)
            .set(config::TX_RX_MODE, TxRxMode::Tx as u8)
            .set(config::UART_EN, 0);
        assert_eq!(reg.bytes(), &[0b1000_0010]);
        assert_eq!(reg.get(config::RADIO_ENABLE), 1);
        assert_eq!(reg.get(config::TX_RX_MODE), 1);
        assert_eq!(reg.get(config::UART_EN), 0);
    }

    #[test]
    fn multibyte_register_offsets() {
        let reg = UNIVERSE_COLOR
            .register()
            .set(universe_color::RED, 0xFF)
            .set(universe_color::BLUE, 0x10);
        assert_eq!(reg.bytes(), &[0xFF, 0x00, 0x10]);
    }

    #[test]
    fn equality_is_bytewise() {
        let a = STATUS.register().set(status::LINKED, 1);
        let b = STATUS.register().set(status::LINKED, 1);
        let c = STATUS.register();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn field_offset_beyond_register_panics() {
        let bad = Field::new(0, 8, 1);
        let _ = CONFIG.register().set(bad, 1);
    }
}
