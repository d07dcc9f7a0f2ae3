/// The RGB identification color assigned to a wireless universe, shown on
/// linked fixtures and the bridge's own status LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb {
        red: 0xFF,
        green: 0,
        blue: 0,
    };
    pub const GREEN: Rgb = Rgb {
        red: 0,
        green: 0xFF,
        blue: 0,
    };
    pub const BLUE: Rgb = Rgb {
        red: 0,
        green: 0,
        blue: 0xFF,
    };
}
