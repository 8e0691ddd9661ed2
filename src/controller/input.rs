/// Platform-agnostic input handling: raw events, action sets and focus routing

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::model::EntityId;

/// Platform-independent input events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    // Keyboard events
    KeyDown(String),
    KeyUp(String),

    // Mouse events
    MouseMove { dx: f32, dy: f32 },
    MouseClick { button: MouseButton, is_down: bool, x: f32, y: f32 },
    MouseWheel { delta_y: f32 },

    // Window events
    FocusLost,
    VisibilityChanged { visible: bool },
    PointerLockChanged { locked: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn from_web_button(button: i16) -> Self {
        match button {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::Left,
        }
    }
}

/// Canonical key name: single characters lowercased, common aliases folded.
pub fn normalize_key(key: &str) -> String {
    match key {
        "Space" | "Spacebar" => " ".to_string(),
        "ShiftLeft" | "ShiftRight" => "Shift".to_string(),
        k if k.chars().count() == 1 => k.to_lowercase(),
        k => k.to_string(),
    }
}

/// A named control an entity reacts to.
pub trait Action: Copy + Eq + Hash + Debug + 'static {}

/// Held state plus edges since the end of the last tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionState {
    pub pressed: bool,
    pub just_pressed: bool,
    pub just_released: bool,
}

#[derive(Debug, Clone)]
pub struct ActionSet<A: Action> {
    states: HashMap<A, ActionState>,
    changed: bool,
}

impl<A: Action> Default for ActionSet<A> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
            changed: false,
        }
    }
}

impl<A: Action> ActionSet<A> {
    /// Record a press or release; repeats of the held state are ignored.
    pub fn set(&mut self, action: A, pressed: bool) -> bool {
        let state = self.states.entry(action).or_default();
        if state.pressed == pressed {
            return false;
        }
        state.pressed = pressed;
        if pressed {
            state.just_pressed = true;
        } else {
            state.just_released = true;
        }
        self.changed = true;
        true
    }

    pub fn is_pressed(&self, action: A) -> bool {
        self.states.get(&action).is_some_and(|s| s.pressed)
    }

    pub fn just_pressed(&self, action: A) -> bool {
        self.states.get(&action).is_some_and(|s| s.just_pressed)
    }

    pub fn just_released(&self, action: A) -> bool {
        self.states.get(&action).is_some_and(|s| s.just_released)
    }

    pub fn any_pressed(&self) -> bool {
        self.states.values().any(|s| s.pressed)
    }

    /// Whether anything changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Clear the per-tick edges; held state is kept.
    pub fn end_tick(&mut self) {
        for state in self.states.values_mut() {
            state.just_pressed = false;
            state.just_released = false;
        }
    }

    /// Release everything, reporting the releases as edges.
    pub fn release_all(&mut self) {
        for state in self.states.values_mut().filter(|s| s.pressed) {
            state.pressed = false;
            state.just_released = true;
            self.changed = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterAction {
    Up,
    Down,
    Left,
    Right,
    Run,
    Jump,
    Enter,
    EnterPassenger,
    SeatSwitch,
    Primary,
    Secondary,
}

impl Action for CharacterAction {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleAction {
    Throttle,
    Reverse,
    Brake,
    Left,
    Right,
    Ascend,
    Descend,
    PitchUp,
    PitchDown,
    YawLeft,
    YawRight,
    RollLeft,
    RollRight,
    ExitVehicle,
    SeatSwitch,
}

impl Action for VehicleAction {}

/// Key mapping configuration
#[derive(Debug, Clone)]
pub struct KeyBindings<A: Action> {
    keys: HashMap<String, A>,
    buttons: HashMap<MouseButton, A>,
}

impl<A: Action> KeyBindings<A> {
    pub fn new(keys: &[(&str, A)], buttons: &[(MouseButton, A)]) -> Self {
        Self {
            keys: keys.iter().map(|(k, a)| (normalize_key(k), *a)).collect(),
            buttons: buttons.iter().copied().collect(),
        }
    }

    pub fn action_for_key(&self, key: &str) -> Option<A> {
        self.keys.get(&normalize_key(key)).copied()
    }

    pub fn action_for_button(&self, button: MouseButton) -> Option<A> {
        self.buttons.get(&button).copied()
    }
}

pub static CHARACTER_BINDINGS: Lazy<KeyBindings<CharacterAction>> = Lazy::new(|| {
    use CharacterAction::*;
    KeyBindings::new(
        &[
            ("w", Up),
            ("ArrowUp", Up),
            ("s", Down),
            ("ArrowDown", Down),
            ("a", Left),
            ("ArrowLeft", Left),
            ("d", Right),
            ("ArrowRight", Right),
            ("Shift", Run),
            (" ", Jump),
            ("f", Enter),
            ("g", EnterPassenger),
            ("x", SeatSwitch),
        ],
        &[(MouseButton::Left, Primary), (MouseButton::Right, Secondary)],
    )
});

pub static CAR_BINDINGS: Lazy<KeyBindings<VehicleAction>> = Lazy::new(|| {
    use VehicleAction::*;
    KeyBindings::new(
        &[
            ("w", Throttle),
            ("ArrowUp", Throttle),
            ("s", Reverse),
            ("ArrowDown", Reverse),
            (" ", Brake),
            ("a", Left),
            ("ArrowLeft", Left),
            ("d", Right),
            ("ArrowRight", Right),
            ("f", ExitVehicle),
            ("x", SeatSwitch),
        ],
        &[],
    )
});

pub static HELICOPTER_BINDINGS: Lazy<KeyBindings<VehicleAction>> = Lazy::new(|| {
    use VehicleAction::*;
    KeyBindings::new(
        &[
            ("Shift", Ascend),
            (" ", Descend),
            ("w", PitchDown),
            ("s", PitchUp),
            ("q", YawLeft),
            ("e", YawRight),
            ("a", RollLeft),
            ("d", RollRight),
            ("f", ExitVehicle),
            ("x", SeatSwitch),
        ],
        &[],
    )
});

pub static AIRPLANE_BINDINGS: Lazy<KeyBindings<VehicleAction>> = Lazy::new(|| {
    use VehicleAction::*;
    KeyBindings::new(
        &[
            ("Shift", Throttle),
            (" ", Brake),
            ("s", PitchUp),
            ("w", PitchDown),
            ("q", YawLeft),
            ("e", YawRight),
            ("a", RollLeft),
            ("d", RollRight),
            ("f", ExitVehicle),
            ("x", SeatSwitch),
        ],
        &[],
    )
});

/// Something that can hold input focus.
pub trait InputReceiver {
    fn handle_key(&mut self, key: &str, pressed: bool);

    fn handle_mouse_move(&mut self, dx: f32, dy: f32);

    fn handle_mouse_button(&mut self, button: MouseButton, pressed: bool);

    /// Drop every held control; called whenever focus moves away.
    fn reset_controls(&mut self);

    fn on_focus_gained(&mut self) {}
}

/// Swallows input while nothing is focused.
#[derive(Debug, Default)]
pub struct NoOpReceiver;

impl InputReceiver for NoOpReceiver {
    fn handle_key(&mut self, key: &str, pressed: bool) {
        trace!(key, pressed, "key ignored, nothing focused");
    }

    fn handle_mouse_move(&mut self, _dx: f32, _dy: f32) {}

    fn handle_mouse_button(&mut self, _button: MouseButton, _pressed: bool) {}

    fn reset_controls(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFocus {
    Entity(EntityId),
    #[default]
    NoOp,
}

/// Lookup from entity id to a focusable receiver.
pub trait ReceiverSource {
    fn receiver_mut(&mut self, id: EntityId) -> Option<&mut dyn InputReceiver>;
}

/// Delivers every input event to exactly one receiver.
#[derive(Debug, Default)]
pub struct InputRouter {
    focus: InputFocus,
    noop: NoOpReceiver,
    pointer_locked: bool,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> InputFocus {
        self.focus
    }

    pub fn pointer_locked(&self) -> bool {
        self.pointer_locked
    }

    fn current<'a>(&'a mut self, source: &'a mut dyn ReceiverSource) -> &'a mut dyn InputReceiver {
        match self.focus {
            InputFocus::Entity(id) => match source.receiver_mut(id) {
                Some(receiver) => receiver,
                None => &mut self.noop,
            },
            InputFocus::NoOp => &mut self.noop,
        }
    }

    /// Move focus; the previous receiver's held controls are cleared first.
    /// Returns the previous focus.
    pub fn set_receiver(&mut self, focus: InputFocus, source: &mut dyn ReceiverSource) -> InputFocus {
        let previous = self.focus;
        if previous == focus {
            return previous;
        }
        self.current(source).reset_controls();
        self.focus = focus;
        self.current(source).on_focus_gained();
        debug!(?previous, ?focus, "input focus changed");
        previous
    }

    /// Focus fell back to nothing, e.g. because the focused entity despawned.
    pub fn clear_if_focused(&mut self, id: EntityId) {
        if self.focus == InputFocus::Entity(id) {
            debug!(entity = %id, "focused entity removed, input focus cleared");
            self.focus = InputFocus::NoOp;
        }
    }

    pub fn route(&mut self, event: &InputEvent, source: &mut dyn ReceiverSource) {
        match event {
            InputEvent::PointerLockChanged { locked } => {
                self.pointer_locked = *locked;
                if !*locked {
                    self.current(source).reset_controls();
                }
                return;
            }
            InputEvent::FocusLost | InputEvent::VisibilityChanged { visible: false } => {
                self.current(source).reset_controls();
                return;
            }
            _ => {}
        }

        let receiver = self.current(source);
        match event {
            InputEvent::KeyDown(key) => receiver.handle_key(key, true),
            InputEvent::KeyUp(key) => receiver.handle_key(key, false),
            InputEvent::MouseMove { dx, dy } => receiver.handle_mouse_move(*dx, *dy),
            InputEvent::MouseClick { button, is_down, .. } => receiver.handle_mouse_button(*button, *is_down),
            _ => {}
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub mod wasm {
    use super::*;
    use web_sys::{KeyboardEvent, MouseEvent};

    pub fn keyboard_event_to_input(e: &KeyboardEvent, is_down: bool) -> InputEvent {
        let key = e.key();
        if is_down {
            InputEvent::KeyDown(key)
        } else {
            InputEvent::KeyUp(key)
        }
    }

    pub fn mouse_move_to_input(e: &MouseEvent) -> InputEvent {
        InputEvent::MouseMove {
            dx: e.movement_x() as f32,
            dy: e.movement_y() as f32,
        }
    }

    pub fn mouse_click_to_input(e: &MouseEvent, is_down: bool) -> InputEvent {
        InputEvent::MouseClick {
            button: MouseButton::from_web_button(e.button()),
            is_down,
            x: e.client_x() as f32,
            y: e.client_y() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        keys: Vec<(String, bool)>,
        resets: usize,
        gained: usize,
    }

    impl InputReceiver for Recorder {
        fn handle_key(&mut self, key: &str, pressed: bool) {
            self.keys.push((key.to_string(), pressed));
        }
        fn handle_mouse_move(&mut self, _dx: f32, _dy: f32) {}
        fn handle_mouse_button(&mut self, _button: MouseButton, _pressed: bool) {}
        fn reset_controls(&mut self) {
            self.resets += 1;
        }
        fn on_focus_gained(&mut self) {
            self.gained += 1;
        }
    }

    #[derive(Default)]
    struct Receivers(HashMap<EntityId, Recorder>);

    impl ReceiverSource for Receivers {
        fn receiver_mut(&mut self, id: EntityId) -> Option<&mut dyn InputReceiver> {
            self.0.get_mut(&id).map(|r| r as &mut dyn InputReceiver)
        }
    }

    #[test]
    fn action_edges_clear_at_end_of_tick() {
        let mut set = ActionSet::<CharacterAction>::default();
        assert!(set.set(CharacterAction::Jump, true));
        assert!(!set.set(CharacterAction::Jump, true), "key repeat is not an edge");
        assert!(set.just_pressed(CharacterAction::Jump));
        assert!(set.take_changed());
        assert!(!set.take_changed());
        set.end_tick();
        assert!(!set.just_pressed(CharacterAction::Jump));
        assert!(set.is_pressed(CharacterAction::Jump));
    }

    #[test]
    fn release_all_reports_releases() {
        let mut set = ActionSet::<VehicleAction>::default();
        set.set(VehicleAction::Throttle, true);
        set.end_tick();
        set.take_changed();
        set.release_all();
        assert!(!set.any_pressed());
        assert!(set.just_released(VehicleAction::Throttle));
        assert!(set.take_changed());
    }

    #[test]
    fn bindings_normalize_keys() {
        assert_eq!(CHARACTER_BINDINGS.action_for_key("W"), Some(CharacterAction::Up));
        assert_eq!(CHARACTER_BINDINGS.action_for_key("Space"), Some(CharacterAction::Jump));
        assert_eq!(CAR_BINDINGS.action_for_key("f"), Some(VehicleAction::ExitVehicle));
        assert_eq!(CHARACTER_BINDINGS.action_for_button(MouseButton::Left), Some(CharacterAction::Primary));
        assert_eq!(AIRPLANE_BINDINGS.action_for_key("z"), None);
    }

    #[test]
    fn focus_swap_resets_previous_receiver() {
        let (a, b) = (EntityId(1), EntityId(2));
        let mut receivers = Receivers::default();
        receivers.0.insert(a, Recorder::default());
        receivers.0.insert(b, Recorder::default());
        let mut router = InputRouter::new();

        router.set_receiver(InputFocus::Entity(a), &mut receivers);
        router.route(&InputEvent::KeyDown("w".into()), &mut receivers);
        router.set_receiver(InputFocus::Entity(b), &mut receivers);
        router.route(&InputEvent::KeyDown("d".into()), &mut receivers);

        assert_eq!(receivers.0[&a].keys, vec![("w".to_string(), true)]);
        assert_eq!(receivers.0[&a].resets, 1);
        assert_eq!(receivers.0[&b].keys, vec![("d".to_string(), true)]);
        assert_eq!(receivers.0[&b].gained, 1);
    }

    #[test]
    fn window_blur_resets_focused_receiver() {
        let id = EntityId(3);
        let mut receivers = Receivers::default();
        receivers.0.insert(id, Recorder::default());
        let mut router = InputRouter::new();
        router.set_receiver(InputFocus::Entity(id), &mut receivers);
        router.route(&InputEvent::FocusLost, &mut receivers);
        router.route(&InputEvent::VisibilityChanged { visible: true }, &mut receivers);
        assert_eq!(receivers.0[&id].resets, 1);
    }

    #[test]
    fn missing_receiver_falls_back_to_noop() {
        let mut receivers = Receivers::default();
        let mut router = InputRouter::new();
        router.set_receiver(InputFocus::Entity(EntityId(9)), &mut receivers);
        router.route(&InputEvent::KeyDown("w".into()), &mut receivers);
        router.clear_if_focused(EntityId(9));
        assert_eq!(router.focus(), InputFocus::NoOp);
    }
}
