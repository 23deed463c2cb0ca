use std::collections::HashSet;

use monocart_core::{KeyAction, MotionSource};

use crate::session::Session;

/// Logical key codes the router recognizes, matching the host
/// platform's gamepad button codes.
pub mod keycodes {
    pub const DPAD_UP: i32 = 19;
    pub const DPAD_DOWN: i32 = 20;
    pub const DPAD_LEFT: i32 = 21;
    pub const DPAD_RIGHT: i32 = 22;
    pub const BUTTON_A: i32 = 96;
    pub const BUTTON_B: i32 = 97;
    pub const BUTTON_X: i32 = 99;
    pub const BUTTON_Y: i32 = 100;
    pub const BUTTON_L1: i32 = 102;
    pub const BUTTON_R1: i32 = 103;
    pub const BUTTON_L2: i32 = 104;
    pub const BUTTON_R2: i32 = 105;
    pub const BUTTON_THUMBL: i32 = 106;
    pub const BUTTON_THUMBR: i32 = 107;
    pub const BUTTON_START: i32 = 108;
    pub const BUTTON_SELECT: i32 = 109;
}

/// Reserved pseudo-codes that trigger shell actions instead of ever
/// reaching the core. Negative so they can never collide with real
/// platform key codes.
pub mod reserved {
    pub const SAVE_STATE: i32 = -1;
    pub const LOAD_STATE: i32 = -2;
    pub const MUTE: i32 = -3;
    pub const FAST_FORWARD: i32 = -4;
}

/// Side-channel requests the router raises toward the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellRequest {
    OpenMenu,
    SaveState,
    LoadState,
    ToggleMute,
    ToggleFastForward,
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Key codes forwarded to the core; anything else is rejected so
    /// the host can fall back to default handling.
    pub recognized: HashSet<i32>,
    /// Pressed-key set that opens the in-session menu. Matched by set
    /// equality, not containment.
    pub menu_combo: HashSet<i32>,
    /// Whether reserved pseudo-codes are honored from physical input.
    /// Off by default: only the on-screen overlay may trigger them.
    pub reserved_from_physical: bool,
    /// When set, a key event completing the menu combo is swallowed
    /// instead of also being forwarded to the core.
    pub combo_swallows_event: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        use keycodes::*;
        Self {
            recognized: HashSet::from([
                BUTTON_A,
                BUTTON_B,
                BUTTON_X,
                BUTTON_Y,
                DPAD_UP,
                DPAD_LEFT,
                DPAD_DOWN,
                DPAD_RIGHT,
                BUTTON_L1,
                BUTTON_L2,
                BUTTON_R1,
                BUTTON_R2,
                BUTTON_THUMBL,
                BUTTON_THUMBR,
                BUTTON_START,
                BUTTON_SELECT,
            ]),
            menu_combo: HashSet::from([BUTTON_START, BUTTON_SELECT]),
            reserved_from_physical: false,
            combo_swallows_event: false,
        }
    }
}

/// One physical motion event, as read from the device's axes. The
/// router decomposes it into the three logical motion sources the
/// core understands.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionAxes {
    /// Directional hat.
    pub hat_x: f32,
    pub hat_y: f32,
    /// Left analog stick.
    pub x: f32,
    pub y: f32,
    /// Right analog stick.
    pub z: f32,
    pub rz: f32,
}

/// Zero-based controller port for a device's one-based controller
/// number; devices that report no number land on port 0.
pub fn port_for(controller_number: Option<u32>) -> u8 {
    controller_number
        .map(|n| n.saturating_sub(1))
        .unwrap_or(0)
        .min(u8::MAX as u32) as u8
}

/// Maps physical and overlay input onto the core's logical inputs.
///
/// Holds the pressed-key set used for menu-combination detection.
/// Mutated only by the thread delivering input events; never shared.
pub struct InputRouter {
    config: InputConfig,
    pressed: HashSet<i32>,
    on_request: Box<dyn FnMut(ShellRequest) + Send>,
}

impl InputRouter {
    pub fn new(config: InputConfig, on_request: impl FnMut(ShellRequest) + Send + 'static) -> Self {
        Self {
            config,
            pressed: HashSet::new(),
            on_request: Box::new(on_request),
        }
    }

    /// Routes a key event from a physical controller or keyboard.
    ///
    /// Returns `false` when the code is not recognized (no forwarding,
    /// no side effects) so the host can apply its default handling.
    /// Events arriving before the readiness barrier opens are consumed
    /// without forwarding: there is no core to receive them, but they
    /// must not leak into host navigation either.
    pub fn route_key(
        &mut self,
        session: &Session,
        keycode: i32,
        action: KeyAction,
        controller_number: Option<u32>,
    ) -> bool {
        if let Some(request) = reserved_request(keycode) {
            if !self.config.reserved_from_physical {
                return false;
            }
            if action == KeyAction::Down {
                (self.on_request)(request);
            }
            return true;
        }

        if !self.config.recognized.contains(&keycode) {
            return false;
        }

        if !session.is_ready() {
            return true;
        }

        match action {
            KeyAction::Down => self.pressed.insert(keycode),
            KeyAction::Up => self.pressed.remove(&keycode),
        };

        let combo_hit = self.pressed == self.config.menu_combo;

        if !(combo_hit && self.config.combo_swallows_event) {
            // ready_core cannot fail here; readiness was checked above.
            if let Ok(core) = session.ready_core() {
                core.send_key_event(action, keycode, port_for(controller_number));
            }
        }

        if combo_hit {
            (self.on_request)(ShellRequest::OpenMenu);
        }

        true
    }

    /// Routes a button event from the on-screen overlay. Overlay
    /// buttons always sit on port 0 and reserved pseudo-codes are
    /// always honored from this path.
    pub fn route_overlay_key(&mut self, session: &Session, keycode: i32, action: KeyAction) -> bool {
        if let Some(request) = reserved_request(keycode) {
            if action == KeyAction::Down {
                (self.on_request)(request);
            }
            return true;
        }

        let Ok(core) = session.ready_core() else {
            return true;
        };
        core.send_key_event(action, keycode, 0);
        true
    }

    /// Routes one physical motion event, decomposed into the
    /// directional pad, left stick, and right stick sources, all
    /// tagged with the same port. Returns `false` while the readiness
    /// barrier is pending: nothing is forwarded.
    pub fn route_motion(
        &self,
        session: &Session,
        axes: MotionAxes,
        controller_number: Option<u32>,
    ) -> bool {
        let Ok(core) = session.ready_core() else {
            return false;
        };
        let port = port_for(controller_number);

        core.send_motion_event(MotionSource::DPad, axes.hat_x, axes.hat_y, port);
        core.send_motion_event(MotionSource::AnalogLeft, axes.x, axes.y, port);
        core.send_motion_event(MotionSource::AnalogRight, axes.z, axes.rz, port);
        true
    }

    /// Currently held keys; exposed for diagnostics.
    pub fn pressed(&self) -> &HashSet<i32> {
        &self.pressed
    }
}

fn reserved_request(keycode: i32) -> Option<ShellRequest> {
    match keycode {
        reserved::SAVE_STATE => Some(ShellRequest::SaveState),
        reserved::LOAD_STATE => Some(ShellRequest::LoadState),
        reserved::MUTE => Some(ShellRequest::ToggleMute),
        reserved::FAST_FORWARD => Some(ShellRequest::ToggleFastForward),
        _ => None,
    }
}
