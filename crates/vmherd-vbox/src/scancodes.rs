//! PC/AT (set 1) scan codes for `keyboardputscancode`

use vmherd_host_api::{HostError, HostResult};

/// Prefix byte of extended keys
const EXTENDED: u8 = 0xE0;

/// Added to the final make byte to form the break byte
const BREAK_BIT: u8 = 0x80;

/// Key whose make sequence already contains its release
const PAUSE: &str = "PAUSE";

static SCAN_CODES: &[(&str, &[u8])] = &[
    ("ESCAPE", &[0x01]),
    ("NUMBER_1", &[0x02]),
    ("NUMBER_2", &[0x03]),
    ("NUMBER_3", &[0x04]),
    ("NUMBER_4", &[0x05]),
    ("NUMBER_5", &[0x06]),
    ("NUMBER_6", &[0x07]),
    ("NUMBER_7", &[0x08]),
    ("NUMBER_8", &[0x09]),
    ("NUMBER_9", &[0x0A]),
    ("NUMBER_0", &[0x0B]),
    ("MINUS", &[0x0C]),
    ("EQUAL", &[0x0D]),
    ("BACKSPACE", &[0x0E]),
    ("TAB", &[0x0F]),
    ("Q", &[0x10]),
    ("W", &[0x11]),
    ("E", &[0x12]),
    ("R", &[0x13]),
    ("T", &[0x14]),
    ("Y", &[0x15]),
    ("U", &[0x16]),
    ("I", &[0x17]),
    ("O", &[0x18]),
    ("P", &[0x19]),
    ("LEFTBRACKET", &[0x1A]),
    ("RIGHTBRACKET", &[0x1B]),
    ("ENTER", &[0x1C]),
    ("CTRL", &[0x1D]),
    ("A", &[0x1E]),
    ("S", &[0x1F]),
    ("D", &[0x20]),
    ("F", &[0x21]),
    ("G", &[0x22]),
    ("H", &[0x23]),
    ("J", &[0x24]),
    ("K", &[0x25]),
    ("L", &[0x26]),
    ("SEMICOLON", &[0x27]),
    ("QUOTE", &[0x28]),
    ("BACKQUOTE", &[0x29]),
    ("SHIFT", &[0x2A]),
    ("BACKSLASH", &[0x2B]),
    ("Z", &[0x2C]),
    ("X", &[0x2D]),
    ("C", &[0x2E]),
    ("V", &[0x2F]),
    ("B", &[0x30]),
    ("N", &[0x31]),
    ("M", &[0x32]),
    ("COMMA", &[0x33]),
    ("PERIOD", &[0x34]),
    ("SLASH", &[0x35]),
    ("R_SHIFT", &[0x36]),
    ("PRT_SC", &[0x37]),
    ("ALT", &[0x38]),
    ("SPACE", &[0x39]),
    ("CAPS_LOCK", &[0x3A]),
    ("F1", &[0x3B]),
    ("F2", &[0x3C]),
    ("F3", &[0x3D]),
    ("F4", &[0x3E]),
    ("F5", &[0x3F]),
    ("F6", &[0x40]),
    ("F7", &[0x41]),
    ("F8", &[0x42]),
    ("F9", &[0x43]),
    ("F10", &[0x44]),
    ("NUM_LOCK", &[0x45]),
    ("SCROLL_LOCK", &[0x46]),
    ("NUMPAD_7", &[0x47]),
    ("NUMPAD_8", &[0x48]),
    ("NUMPAD_9", &[0x49]),
    ("NUMPAD_SUBTRACT", &[0x4A]),
    ("NUMPAD_4", &[0x4B]),
    ("NUMPAD_5", &[0x4C]),
    ("NUMPAD_6", &[0x4D]),
    ("NUMPAD_ADD", &[0x4E]),
    ("NUMPAD_1", &[0x4F]),
    ("NUMPAD_2", &[0x50]),
    ("NUMPAD_3", &[0x51]),
    ("NUMPAD_0", &[0x52]),
    ("NUMPAD_DECIMAL", &[0x53]),
    ("F11", &[0x57]),
    ("F12", &[0x58]),
    ("R_CTRL", &[EXTENDED, 0x1D]),
    ("NUMBER_DIVIDE", &[EXTENDED, 0x35]),
    ("R_ALT", &[EXTENDED, 0x38]),
    ("HOME", &[EXTENDED, 0x47]),
    ("UP", &[EXTENDED, 0x48]),
    ("PAGE_UP", &[EXTENDED, 0x49]),
    ("LEFT", &[EXTENDED, 0x4B]),
    ("RIGHT", &[EXTENDED, 0x4D]),
    ("END", &[EXTENDED, 0x4F]),
    ("DOWN", &[EXTENDED, 0x50]),
    ("PAGE_DOWN", &[EXTENDED, 0x51]),
    ("INSERT", &[EXTENDED, 0x52]),
    ("DELETE", &[EXTENDED, 0x53]),
    ("WINDOW", &[EXTENDED, 0x5B]),
    ("R_WINDOW", &[EXTENDED, 0x5C]),
    ("MENU", &[EXTENDED, 0x5D]),
    (PAUSE, &[0xE1, 0x1D, 0x45, 0xE1, 0x9D, 0xC5]),
];

/// Names of every known key
pub fn key_names() -> impl Iterator<Item = &'static str> {
    SCAN_CODES.iter().map(|(name, _)| *name)
}

/// Scan codes sent when `key` is pressed
pub fn make_code(key: &str) -> HostResult<&'static [u8]> {
    SCAN_CODES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| *code)
        .ok_or_else(|| HostError::UnknownKey(key.to_string()))
}

/// Scan codes sent when `key` is released
pub fn break_code(key: &str) -> HostResult<Vec<u8>> {
    let make = make_code(key)?;

    if key == PAUSE {
        return Ok(Vec::new());
    }

    Ok(match make {
        [EXTENDED, code, ..] => vec![EXTENDED, code.wrapping_add(BREAK_BIT)],
        [code, ..] => vec![code.wrapping_add(BREAK_BIT)],
        [] => Vec::new(),
    })
}

/// Lowercase two-digit hex codes joined by spaces
pub fn format_scancodes(codes: &[u8]) -> String {
    codes
        .iter()
        .map(|code| format!("{:02x}", code))
        .collect::<Vec<_>>()
        .join(" ")
}
