/// Device capabilities that decide on-screen overlay visibility.
///
/// The host samples these on startup and again on every input-device
/// hotplug and display/focus change; the policy itself is stateless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayCapabilities {
    /// Installation-level flag that hides the overlay unconditionally.
    pub force_hide: bool,
    pub has_touchscreen: bool,
    /// The session is being shown on a secondary/presentation display
    /// (TV, external monitor) that cannot receive touches.
    pub presentation_display: bool,
    /// Any connected input device reports gamepad- or joystick-class
    /// sources.
    pub gamepad_connected: bool,
}

/// Whether the on-screen control overlay should be visible. Any
/// disqualifying condition hides it.
pub fn should_show_overlay(caps: &OverlayCapabilities) -> bool {
    !caps.force_hide
        && caps.has_touchscreen
        && !caps.presentation_display
        && !caps.gamepad_connected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_only() -> OverlayCapabilities {
        OverlayCapabilities {
            force_hide: false,
            has_touchscreen: true,
            presentation_display: false,
            gamepad_connected: false,
        }
    }

    #[test]
    fn touch_device_without_gamepad_shows_overlay() {
        assert!(should_show_overlay(&touch_only()));
    }

    #[test]
    fn connected_gamepad_hides_overlay_regardless_of_touch() {
        let caps = OverlayCapabilities {
            gamepad_connected: true,
            ..touch_only()
        };
        assert!(!should_show_overlay(&caps));
    }

    #[test]
    fn no_touchscreen_hides_overlay() {
        let caps = OverlayCapabilities {
            has_touchscreen: false,
            ..touch_only()
        };
        assert!(!should_show_overlay(&caps));
    }

    #[test]
    fn presentation_display_hides_overlay() {
        let caps = OverlayCapabilities {
            presentation_display: true,
            ..touch_only()
        };
        assert!(!should_show_overlay(&caps));
    }

    #[test]
    fn force_hide_wins_over_everything() {
        let caps = OverlayCapabilities {
            force_hide: true,
            ..touch_only()
        };
        assert!(!should_show_overlay(&caps));
    }
}
