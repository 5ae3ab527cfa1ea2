//! Normalized key-name table.
//!
//! Drivers name keys the way computer-use models emit them: `"ENTER"`,
//! `"ESC"`, `"CTRL"`, `"PAGEDOWN"`, or a bare character such as `"a"`.  Each
//! [`NamedKey`] knows how to spell itself for both backends.
//!
//! Only names longer than one character are looked up, and the lookup ignores
//! ASCII case.  Single characters never match this table: `"a"` and `"A"` are
//! different keys and must reach the backend unchanged.

/// A key with a symbolic name in the normalized vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    CapsLock,
    Control,
    Alt,
    Shift,
    Super,
}

impl NamedKey {
    /// Looks up a normalized name.
    pub fn parse(name: &str) -> Option<Self> {
        if name.chars().nth(1).is_none() {
            return None;
        }
        let key = match name.to_ascii_uppercase().as_str() {
            "ENTER" | "RETURN" => NamedKey::Enter,
            "ESC" | "ESCAPE" => NamedKey::Escape,
            "TAB" => NamedKey::Tab,
            "SPACE" => NamedKey::Space,
            "BACKSPACE" => NamedKey::Backspace,
            "DELETE" | "DEL" => NamedKey::Delete,
            "INSERT" => NamedKey::Insert,
            "HOME" => NamedKey::Home,
            "END" => NamedKey::End,
            "PAGEUP" | "PAGE_UP" | "PGUP" => NamedKey::PageUp,
            "PAGEDOWN" | "PAGE_DOWN" | "PGDN" => NamedKey::PageDown,
            "LEFT" | "ARROWLEFT" => NamedKey::ArrowLeft,
            "RIGHT" | "ARROWRIGHT" => NamedKey::ArrowRight,
            "UP" | "ARROWUP" => NamedKey::ArrowUp,
            "DOWN" | "ARROWDOWN" => NamedKey::ArrowDown,
            "CAPSLOCK" => NamedKey::CapsLock,
            "CTRL" | "CONTROL" => NamedKey::Control,
            "ALT" | "OPTION" => NamedKey::Alt,
            "SHIFT" => NamedKey::Shift,
            "META" | "SUPER" | "CMD" | "WIN" => NamedKey::Super,
            _ => return None,
        };
        Some(key)
    }

    /// The key name `xdotool key` expects.
    pub fn xdotool_name(self) -> &'static str {
        match self {
            NamedKey::Enter => "Return",
            NamedKey::Escape => "Escape",
            NamedKey::Tab => "Tab",
            NamedKey::Space => "space",
            NamedKey::Backspace => "BackSpace",
            NamedKey::Delete => "Delete",
            NamedKey::Insert => "Insert",
            NamedKey::Home => "Home",
            NamedKey::End => "End",
            NamedKey::PageUp => "Page_Up",
            NamedKey::PageDown => "Page_Down",
            NamedKey::ArrowLeft => "Left",
            NamedKey::ArrowRight => "Right",
            NamedKey::ArrowUp => "Up",
            NamedKey::ArrowDown => "Down",
            NamedKey::CapsLock => "Caps_Lock",
            NamedKey::Control => "ctrl",
            NamedKey::Alt => "alt",
            NamedKey::Shift => "shift",
            NamedKey::Super => "super",
        }
    }

    /// The X11 KeySym name sent over RFB; resolvable by
    /// [`super::x11_keysym::keysym_from_name`].
    pub fn keysym_name(self) -> &'static str {
        match self {
            NamedKey::Control => "Control_L",
            NamedKey::Alt => "Alt_L",
            NamedKey::Shift => "Shift_L",
            NamedKey::Super => "Super_L",
            other => other.xdotool_name(),
        }
    }
}
