//! Input translation tables.
//!
//! The normalized vocabulary (key names like `"ENTER"`, buttons like
//! `"right"`) is translated to backend form at the last moment, right before
//! a command string or RFB message is built.  Every lookup here is pure and
//! total: names outside the tables pass through unchanged.
//!
//! # The modifier-combo rule
//!
//! When a key-press names more than one key, a bare uppercase letter in the
//! combo is lowercased (`["CTRL", "A"]` becomes `ctrl+a`).  Shift is expressed
//! by an explicit modifier key in combos, never by letter case.  A single-key
//! press keeps its case, so `["A"]` still types a capital A.

pub mod buttons;
pub mod names;
pub mod x11_keysym;

use std::borrow::Cow;

use thiserror::Error;

pub use buttons::{rfb_button_mask, wheel_steps, xdotool_button, WheelDirection, WheelStep};
pub use names::NamedKey;

/// A translated key name that the RFB backend cannot turn into a KeySym.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no X11 keysym for key {0:?}")]
pub struct UnknownKey(pub String);

/// Unified key mapper providing the translation for each backend.
pub struct KeyMapper;

impl KeyMapper {
    /// Translates one normalized key name into its xdotool spelling.
    pub fn xdotool_key(name: &str) -> Cow<'_, str> {
        match NamedKey::parse(name) {
            Some(key) => Cow::Borrowed(key.xdotool_name()),
            None => Cow::Borrowed(name),
        }
    }

    /// Translates one normalized key name into its X11 KeySym name.
    pub fn keysym_name(name: &str) -> Cow<'_, str> {
        match NamedKey::parse(name) {
            Some(key) => Cow::Borrowed(key.keysym_name()),
            None => Cow::Borrowed(name),
        }
    }

    /// Translates a key-press request for the exec backend and joins it into
    /// the single `a+b+c` argument `xdotool key` takes.
    pub fn xdotool_combo<S: AsRef<str>>(keys: &[S]) -> String {
        translate_combo(keys, Self::xdotool_key).join("+")
    }

    /// Translates a key-press request for the RFB backend into KeySyms, in
    /// press order.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownKey`] if a multi-character name is neither in the
    /// normalized table nor a known X11 KeySym name.
    pub fn rfb_combo<S: AsRef<str>>(keys: &[S]) -> Result<Vec<u32>, UnknownKey> {
        translate_combo(keys, Self::keysym_name)
            .into_iter()
            .map(|name| x11_keysym::resolve(&name).ok_or(UnknownKey(name)))
            .collect()
    }
}

/// Applies `map` to each key, then the modifier-combo lowercasing rule.
pub fn translate_combo<'a, S, F>(keys: &'a [S], map: F) -> Vec<String>
where
    S: AsRef<str>,
    F: Fn(&'a str) -> Cow<'a, str>,
{
    let combo = keys.len() > 1;
    keys.iter()
        .map(|key| {
            let mapped = map(key.as_ref());
            if combo && is_single_uppercase_letter(&mapped) {
                mapped.to_ascii_lowercase()
            } else {
                mapped.into_owned()
            }
        })
        .collect()
}

fn is_single_uppercase_letter(s: &str) -> bool {
    let mut chars = s.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
