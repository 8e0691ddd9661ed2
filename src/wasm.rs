// WASM: DOM listeners feed an input queue drained every frame

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Event, KeyboardEvent, MouseEvent, Window};

use crate::controller::input::wasm::{keyboard_event_to_input, mouse_click_to_input, mouse_move_to_input};
use crate::physics::StaticCollider;
use crate::{logging, EntityId, InputEvent, InputFocus, SimConfig, SimulationWorld, VehicleKind};

type InputQueue = Rc<RefCell<Vec<InputEvent>>>;

#[wasm_bindgen]
pub struct WasmSimulation {
    world: SimulationWorld,
    queue: InputQueue,
    player: Option<EntityId>,
}

#[wasm_bindgen]
impl WasmSimulation {
    /// Build a world from an optional JSON config, with a ground plane at y = 0.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<WasmSimulation, JsValue> {
        let config = match config_json {
            Some(text) => SimConfig::from_json_str(&text).map_err(js_error)?,
            None => SimConfig::default(),
        };
        logging::init(&config.logging);

        let mut world = SimulationWorld::new(config).map_err(js_error)?;
        world.physics_mut().add_static(StaticCollider::ground(0.0));
        Ok(Self {
            world,
            queue: Rc::new(RefCell::new(Vec::new())),
            player: None,
        })
    }

    pub fn spawn_character(&mut self, x: f32, y: f32, z: f32) -> Result<u32, JsValue> {
        let id = self.world.spawn_character(Vec3::new(x, y, z)).map_err(js_error)?;
        self.player.get_or_insert(id);
        Ok(id.0)
    }

    pub fn spawn_vehicle(&mut self, kind: &str, x: f32, y: f32, z: f32, yaw: f32) -> Result<u32, JsValue> {
        let kind = match kind {
            "car" => VehicleKind::Car,
            "helicopter" => VehicleKind::Helicopter,
            "airplane" => VehicleKind::Airplane,
            other => return Err(js_error(format!("unknown vehicle kind {other}"))),
        };
        let id = self.world.spawn_vehicle(kind, Vec3::new(x, y, z), yaw).map_err(js_error)?;
        Ok(id.0)
    }

    /// Listen for keyboard, mouse and page focus events on `document`.
    pub fn attach(&self) -> Result<(), JsValue> {
        let window = web_sys::window().ok_or_else(|| js_error("no global `window`"))?;
        let document = window.document().ok_or_else(|| js_error("no document on window"))?;
        setup_input_listeners(&window, &document, self.queue.clone())
    }

    /// Route queued input, then advance by `delta` seconds. Returns the
    /// number of physics steps taken.
    pub fn frame(&mut self, delta: f32) -> u32 {
        let events: Vec<InputEvent> = self.queue.borrow_mut().drain(..).collect();
        for event in &events {
            self.world.handle_input(event);
        }
        self.world.frame(delta).steps
    }

    /// While the UI holds input nothing in the world reacts to keys.
    pub fn set_ui_capture(&mut self, captured: bool) -> Result<(), JsValue> {
        if captured {
            self.world.set_receiver(InputFocus::NoOp);
            Ok(())
        } else if let Some(player) = self.player {
            self.world.restore_control(player).map_err(js_error)
        } else {
            Ok(())
        }
    }

    pub fn alpha(&self) -> f32 {
        self.world.alpha()
    }

    /// `[x, y, z, qx, qy, qz, qw]` of the interpolated transform, empty if unknown.
    pub fn render_transform(&self, id: u32) -> Vec<f32> {
        match self.world.render_transform(EntityId(id)) {
            Some((p, q)) => vec![p.x, p.y, p.z, q.x, q.y, q.z, q.w],
            None => Vec::new(),
        }
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        self.world.snapshot().to_json().map_err(js_error)
    }

    /// Apply one remote entity snapshot (JSON) to a ghost.
    pub fn apply_remote_json(&mut self, json: &str) -> Result<(), JsValue> {
        let snapshot = serde_json::from_str(json).map_err(js_error)?;
        self.world.apply_remote(&snapshot).map_err(js_error)
    }
}

fn setup_input_listeners(window: &Window, document: &Document, queue: InputQueue) -> Result<(), JsValue> {
    // Keyboard down
    {
        let queue = queue.clone();
        let keydown = Closure::wrap(Box::new(move |e: KeyboardEvent| {
            if !e.repeat() {
                queue.borrow_mut().push(keyboard_event_to_input(&e, true));
            }
        }) as Box<dyn FnMut(KeyboardEvent)>);
        document.add_event_listener_with_callback("keydown", keydown.as_ref().unchecked_ref())?;
        keydown.forget();
    }

    // Keyboard up
    {
        let queue = queue.clone();
        let keyup = Closure::wrap(Box::new(move |e: KeyboardEvent| {
            queue.borrow_mut().push(keyboard_event_to_input(&e, false));
        }) as Box<dyn FnMut(KeyboardEvent)>);
        document.add_event_listener_with_callback("keyup", keyup.as_ref().unchecked_ref())?;
        keyup.forget();
    }

    // Window blur drops held keys
    {
        let queue = queue.clone();
        let blur = Closure::wrap(Box::new(move |_e: Event| {
            queue.borrow_mut().push(InputEvent::FocusLost);
        }) as Box<dyn FnMut(Event)>);
        window.add_event_listener_with_callback("blur", blur.as_ref().unchecked_ref())?;
        blur.forget();
    }

    // Tab hidden
    {
        let queue = queue.clone();
        let doc = document.clone();
        let visibility = Closure::wrap(Box::new(move |_e: Event| {
            queue.borrow_mut().push(InputEvent::VisibilityChanged { visible: !doc.hidden() });
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("visibilitychange", visibility.as_ref().unchecked_ref())?;
        visibility.forget();
    }

    // Pointer lock
    {
        let queue = queue.clone();
        let doc = document.clone();
        let plc = Closure::wrap(Box::new(move |_e: Event| {
            let locked = doc.pointer_lock_element().is_some();
            queue.borrow_mut().push(InputEvent::PointerLockChanged { locked });
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("pointerlockchange", plc.as_ref().unchecked_ref())?;
        plc.forget();
    }

    // Mouse move
    {
        let queue = queue.clone();
        let mm = Closure::wrap(Box::new(move |e: MouseEvent| {
            queue.borrow_mut().push(mouse_move_to_input(&e));
        }) as Box<dyn FnMut(MouseEvent)>);
        document.add_event_listener_with_callback("mousemove", mm.as_ref().unchecked_ref())?;
        mm.forget();
    }

    // Mouse buttons
    for (name, is_down) in [("mousedown", true), ("mouseup", false)] {
        let queue = queue.clone();
        let click = Closure::wrap(Box::new(move |e: MouseEvent| {
            queue.borrow_mut().push(mouse_click_to_input(&e, is_down));
        }) as Box<dyn FnMut(MouseEvent)>);
        document.add_event_listener_with_callback(name, click.as_ref().unchecked_ref())?;
        click.forget();
    }

    Ok(())
}

fn js_error(err: impl ToString) -> JsValue {
    JsValue::from_str(&err.to_string())
}
