//! Pointer button and scroll-wheel translation.
//!
//! # Button numbering
//!
//! | Button  | xdotool | RFB button-mask bit |
//! |---------|---------|---------------------|
//! | left    | 1       | `0x01`              |
//! | middle  | 2       | `0x02`              |
//! | right   | 3       | `0x04`              |
//! | back    | 8       | (unsupported)       |
//! | forward | 9       | (unsupported)       |
//!
//! # Wheel ticks
//!
//! Scroll deltas arrive in pixels.  Each axis with a nonzero delta is quantized
//! into `max(1, |delta| / 10)` wheel clicks; X11 and RFB both model a wheel
//! click as a press+release of buttons 4–7.

use crate::domain::event::PointerButton;

/// Pixels of scroll delta per wheel tick.
pub const PIXELS_PER_TICK: u32 = 10;

/// The xdotool button number for `button`.
pub fn xdotool_button(button: PointerButton) -> u8 {
    match button {
        PointerButton::Left => 1,
        PointerButton::Middle => 2,
        PointerButton::Right => 3,
        PointerButton::Back => 8,
        PointerButton::Forward => 9,
    }
}

/// The RFB `PointerEvent` button-mask bit for `button`.
///
/// Returns `None` for back/forward, which have no bit in the RFB mask.
pub fn rfb_button_mask(button: PointerButton) -> Option<u8> {
    match button {
        PointerButton::Left => Some(0x01),
        PointerButton::Middle => Some(0x02),
        PointerButton::Right => Some(0x04),
        PointerButton::Back | PointerButton::Forward => None,
    }
}

/// Direction of one wheel click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Up,
    Down,
    Left,
    Right,
}

impl WheelDirection {
    /// X11 button number (4–7) for this direction.
    pub fn xdotool_button(self) -> u8 {
        match self {
            WheelDirection::Up => 4,
            WheelDirection::Down => 5,
            WheelDirection::Left => 6,
            WheelDirection::Right => 7,
        }
    }

    /// RFB button-mask bit for this direction.
    pub fn rfb_mask(self) -> u8 {
        1 << (self.xdotool_button() - 1)
    }
}

/// A run of wheel clicks in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelStep {
    pub direction: WheelDirection,
    pub ticks: u32,
}

/// Quantizes a pixel delta into wheel clicks: `max(1, |delta| / 10)`.
pub fn scroll_ticks(delta: i32) -> u32 {
    (delta.unsigned_abs() / PIXELS_PER_TICK).max(1)
}

/// Expands a scroll request into wheel steps, vertical axis first.
///
/// Positive `dy` scrolls down and positive `dx` scrolls right.  A zero axis
/// produces no step.
pub fn wheel_steps(dx: i32, dy: i32) -> Vec<WheelStep> {
    let mut steps = Vec::with_capacity(2);
    if dy != 0 {
        steps.push(WheelStep {
            direction: if dy > 0 {
                WheelDirection::Down
            } else {
                WheelDirection::Up
            },
            ticks: scroll_ticks(dy),
        });
    }
    if dx != 0 {
        steps.push(WheelStep {
            direction: if dx > 0 {
                WheelDirection::Right
            } else {
                WheelDirection::Left
            },
            ticks: scroll_ticks(dx),
        });
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xdotool_supports_all_five_buttons() {
        let numbers: Vec<u8> = PointerButton::ALL.iter().map(|b| xdotool_button(*b)).collect();
        assert_eq!(numbers, vec![1, 3, 2, 8, 9]);
    }

    #[test]
    fn test_rfb_rejects_back_and_forward() {
        assert_eq!(rfb_button_mask(PointerButton::Right), Some(0x04));
        assert_eq!(rfb_button_mask(PointerButton::Back), None);
        assert_eq!(rfb_button_mask(PointerButton::Forward), None);
    }

    #[test]
    fn test_wheel_masks_match_x11_buttons_four_to_seven() {
        assert_eq!(WheelDirection::Up.rfb_mask(), 0x08);
        assert_eq!(WheelDirection::Down.rfb_mask(), 0x10);
        assert_eq!(WheelDirection::Left.rfb_mask(), 0x20);
        assert_eq!(WheelDirection::Right.rfb_mask(), 0x40);
    }

    #[test]
    fn test_scroll_ticks_quantizes_and_floors_at_one() {
        assert_eq!(scroll_ticks(25), 2);
        assert_eq!(scroll_ticks(5), 1);
        assert_eq!(scroll_ticks(-30), 3);
        assert_eq!(scroll_ticks(10), 1);
    }

    #[test]
    fn test_wheel_steps_positive_dy_scrolls_down() {
        // Arrange / Act
        let steps = wheel_steps(0, 25);

        // Assert
        assert_eq!(
            steps,
            vec![WheelStep {
                direction: WheelDirection::Down,
                ticks: 2
            }]
        );
    }

    #[test]
    fn test_wheel_steps_fires_both_axes_independently() {
        let steps = wheel_steps(-40, -5);
        assert_eq!(
            steps,
            vec![
                WheelStep {
                    direction: WheelDirection::Up,
                    ticks: 1
                },
                WheelStep {
                    direction: WheelDirection::Left,
                    ticks: 4
                },
            ]
        );
    }

    #[test]
    fn test_wheel_steps_zero_delta_is_empty() {
        assert!(wheel_steps(0, 0).is_empty());
    }
}
