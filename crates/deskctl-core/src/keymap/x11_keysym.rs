//! X11 KeySym resolution for the RFB backend.
//!
//! RFB `KeyEvent` messages carry X11 KeySym values, the same values defined in
//! `X11/keysymdef.h`.  Two lookups live here:
//!
//! - [`keysym_from_name`] resolves a KeySym *name* such as `"Return"` or
//!   `"Control_L"`.  Matching ignores ASCII case so `"return"` and `"RETURN"`
//!   resolve too.
//! - [`keysym_from_char`] resolves one typed character.  Latin-1 printable
//!   characters use their code point directly; everything else uses the
//!   Unicode KeySym range `0x0100_0000 + code point`.

/// Offset of the Unicode KeySym range.
const UNICODE_KEYSYM_OFFSET: u32 = 0x0100_0000;

/// Returns the KeySym for a named key, or `None` if the name is unknown.
pub fn keysym_from_name(name: &str) -> Option<u32> {
    let keysym = match name.to_ascii_lowercase().as_str() {
        // Control keys
        "return" => 0xFF0D,
        "escape" => 0xFF1B,
        "backspace" => 0xFF08,
        "tab" => 0xFF09,
        "space" => 0x0020,
        "caps_lock" => 0xFFE5,
        "scroll_lock" => 0xFF14,
        "pause" => 0xFF13,
        "insert" => 0xFF63,
        "home" => 0xFF50,
        "page_up" | "prior" => 0xFF55,
        "delete" => 0xFFFF,
        "end" => 0xFF57,
        "page_down" | "next" => 0xFF56,
        "print" => 0xFF61,
        "menu" => 0xFF67,

        // Arrow keys
        "left" => 0xFF51,
        "up" => 0xFF52,
        "right" => 0xFF53,
        "down" => 0xFF54,

        // Function keys
        "f1" => 0xFFBE,
        "f2" => 0xFFBF,
        "f3" => 0xFFC0,
        "f4" => 0xFFC1,
        "f5" => 0xFFC2,
        "f6" => 0xFFC3,
        "f7" => 0xFFC4,
        "f8" => 0xFFC5,
        "f9" => 0xFFC6,
        "f10" => 0xFFC7,
        "f11" => 0xFFC8,
        "f12" => 0xFFC9,

        // Latin-1 punctuation, by keysymdef.h name
        "exclam" => 0x0021,
        "quotedbl" => 0x0022,
        "numbersign" => 0x0023,
        "dollar" => 0x0024,
        "percent" => 0x0025,
        "ampersand" => 0x0026,
        "apostrophe" | "quoteright" => 0x0027,
        "parenleft" => 0x0028,
        "parenright" => 0x0029,
        "asterisk" => 0x002A,
        "plus" => 0x002B,
        "comma" => 0x002C,
        "minus" => 0x002D,
        "period" => 0x002E,
        "slash" => 0x002F,
        "colon" => 0x003A,
        "semicolon" => 0x003B,
        "less" => 0x003C,
        "equal" => 0x003D,
        "greater" => 0x003E,
        "question" => 0x003F,
        "at" => 0x0040,
        "bracketleft" => 0x005B,
        "backslash" => 0x005C,
        "bracketright" => 0x005D,
        "asciicircum" => 0x005E,
        "underscore" => 0x005F,
        "grave" | "quoteleft" => 0x0060,
        "braceleft" => 0x007B,
        "bar" => 0x007C,
        "braceright" => 0x007D,
        "asciitilde" => 0x007E,

        // Keypad
        "num_lock" => 0xFF7F,
        "kp_enter" => 0xFF8D,
        "kp_multiply" => 0xFFAA,
        "kp_add" => 0xFFAB,
        "kp_subtract" => 0xFFAD,
        "kp_decimal" => 0xFFAE,
        "kp_divide" => 0xFFAF,
        "kp_0" => 0xFFB0,
        "kp_1" => 0xFFB1,
        "kp_2" => 0xFFB2,
        "kp_3" => 0xFFB3,
        "kp_4" => 0xFFB4,
        "kp_5" => 0xFFB5,
        "kp_6" => 0xFFB6,
        "kp_7" => 0xFFB7,
        "kp_8" => 0xFFB8,
        "kp_9" => 0xFFB9,

        // Modifiers, plus the short spellings xdotool accepts
        "shift_l" | "shift" => 0xFFE1,
        "shift_r" => 0xFFE2,
        "control_l" | "ctrl" | "control" => 0xFFE3,
        "control_r" => 0xFFE4,
        "meta_l" | "meta" => 0xFFE7,
        "meta_r" => 0xFFE8,
        "alt_l" | "alt" => 0xFFE9,
        "alt_r" => 0xFFEA,
        "super_l" | "super" => 0xFFEB,
        "super_r" => 0xFFEC,

        _ => return None,
    };
    Some(keysym)
}

/// Returns the KeySym that types `c`.
pub fn keysym_from_char(c: char) -> u32 {
    match c {
        '\n' | '\r' => 0xFF0D,
        '\t' => 0xFF09,
        '\u{8}' => 0xFF08,
        '\u{1b}' => 0xFF1B,
        ' '..='~' | '\u{a0}'..='\u{ff}' => c as u32,
        _ => UNICODE_KEYSYM_OFFSET + c as u32,
    }
}

/// Resolves a translated key name: a single character types itself, anything
/// longer must be a known KeySym name.
pub fn resolve(name: &str) -> Option<u32> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(keysym_from_char(c)),
        (Some(_), Some(_)) => keysym_from_name(name),
        (None, _) => None,
    }
}
