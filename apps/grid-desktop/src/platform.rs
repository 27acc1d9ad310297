//! Window and event pumping on top of `winit`.
//!
//! The frame loop drives the event loop by hand: every
//! [`Platform::swap_buffers_poll_events`] presents and then drains whatever
//! the OS has queued, without blocking.

use grid_game::WindowControl;
use grid_input::{Key, KeySource};
use grid_render::RenderDevice;
use grid_render_wgpu::WgpuDevice;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

/// How long to wait for the OS to hand us a window.
const WINDOW_CREATE_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-pump wait while the window is being created.
const WINDOW_CREATE_PUMP: Duration = Duration::from_millis(16);

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to create event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(String),
    #[error("event loop exited with code {0} before a window was created")]
    Exited(i32),
    #[error("no window appeared within {0:?}")]
    NoWindow(Duration),
}

/// Event handler state shared with `winit` while pumping.
struct WindowState {
    title: String,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    creation_error: Option<String>,
    keys_held: HashSet<Key>,
    close_requested: bool,
    resized: Option<PhysicalSize<u32>>,
}

impl WindowState {
    fn new(title: &str, width: u32, height: u32) -> Self {
        Self {
            title: title.to_owned(),
            size: PhysicalSize::new(width, height),
            window: None,
            creation_error: None,
            keys_held: HashSet::new(),
            close_requested: false,
            resized: None,
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(self.size)
            .with_resizable(false);
        match event_loop.create_window(attrs) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => self.creation_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                self.resized = Some(size);
            }
            WindowEvent::Focused(false) => {
                self.keys_held.clear();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                let Some(key) = map_key(code) else {
                    return;
                };
                match state {
                    ElementState::Pressed => self.keys_held.insert(key),
                    ElementState::Released => self.keys_held.remove(&key),
                };
            }
            _ => {}
        }
    }
}

/// OS window plus the event loop that feeds it.
pub struct Platform {
    event_loop: EventLoop<()>,
    state: WindowState,
    window: Arc<Window>,
}

impl Platform {
    /// Open a `width` x `height` window titled `title`.
    pub fn init(width: u32, height: u32, title: &str) -> Result<Self, PlatformError> {
        let mut event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut state = WindowState::new(title, width, height);
        pump_until(
            &mut state,
            WINDOW_CREATE_TIMEOUT,
            |state| event_loop.pump_app_events(Some(WINDOW_CREATE_PUMP), state),
            |state| match state.creation_error.take() {
                Some(err) => Err(PlatformError::Window(err)),
                None => Ok(state.window.is_some()),
            },
        )?;
        let window = state
            .window
            .clone()
            .ok_or(PlatformError::NoWindow(WINDOW_CREATE_TIMEOUT))?;

        tracing::info!("window \"{title}\" opened at {width}x{height}");
        Ok(Self {
            event_loop,
            state,
            window,
        })
    }

    pub fn window(&self) -> Arc<Window> {
        Arc::clone(&self.window)
    }

    pub fn window_is_open(&self) -> bool {
        !self.state.close_requested
    }

    /// Present the recorded frame, then drain pending OS events.
    pub fn swap_buffers_poll_events(&mut self, device: &mut WgpuDevice) {
        if let Err(e) = device.end_frame() {
            tracing::error!("present failed: {e}");
        }

        if let PumpStatus::Exit(code) = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state)
        {
            tracing::debug!("event loop exited with code {code}");
            self.state.close_requested = true;
        }

        if let Some(size) = self.state.resized.take() {
            device.resize(size.width, size.height);
        }
    }

    /// Release the window and event loop.
    pub fn shutdown(self) {
        tracing::info!("shutting down");
        drop(self.window);
        drop(self.state);
        drop(self.event_loop);
    }
}

impl WindowControl for Platform {
    fn request_close(&mut self) {
        self.state.close_requested = true;
    }
}

impl KeySource for Platform {
    fn is_down(&self, key: Key) -> bool {
        self.state.keys_held.contains(&key)
    }
}

/// Pump until `ready` reports true, the loop exits, or `timeout` passes.
/// Always pumps at least once.
fn pump_until<S>(
    state: &mut S,
    timeout: Duration,
    mut pump: impl FnMut(&mut S) -> PumpStatus,
    mut ready: impl FnMut(&mut S) -> Result<bool, PlatformError>,
) -> Result<(), PlatformError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let PumpStatus::Exit(code) = pump(state) {
            return Err(PlatformError::Exited(code));
        }
        if ready(state)? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(PlatformError::NoWindow(timeout));
        }
    }
}

/// Map a physical key to the tracked key set.
pub fn map_key(code: KeyCode) -> Option<Key> {
    let key = match code {
        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,
        KeyCode::Digit0 => Key::Digit0,
        KeyCode::Digit1 => Key::Digit1,
        KeyCode::Digit2 => Key::Digit2,
        KeyCode::Digit3 => Key::Digit3,
        KeyCode::Digit4 => Key::Digit4,
        KeyCode::Digit5 => Key::Digit5,
        KeyCode::Digit6 => Key::Digit6,
        KeyCode::Digit7 => Key::Digit7,
        KeyCode::Digit8 => Key::Digit8,
        KeyCode::Digit9 => Key::Digit9,
        KeyCode::Space => Key::Space,
        KeyCode::Enter => Key::Enter,
        KeyCode::Escape => Key::Escape,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        KeyCode::ShiftLeft => Key::ShiftLeft,
        KeyCode::ShiftRight => Key::ShiftRight,
        KeyCode::ControlLeft => Key::ControlLeft,
        KeyCode::ControlRight => Key::ControlRight,
        KeyCode::AltLeft => Key::AltLeft,
        KeyCode::AltRight => Key::AltRight,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        KeyCode::F6 => Key::F6,
        KeyCode::F7 => Key::F7,
        KeyCode::F8 => Key::F8,
        KeyCode::F9 => Key::F9,
        KeyCode::F10 => Key::F10,
        KeyCode::F11 => Key::F11,
        KeyCode::F12 => Key::F12,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_keys_are_mapped() {
        assert_eq!(map_key(KeyCode::Escape), Some(Key::Escape));
        assert_eq!(map_key(KeyCode::KeyW), Some(Key::W));
        assert_eq!(map_key(KeyCode::KeyA), Some(Key::A));
        assert_eq!(map_key(KeyCode::KeyS), Some(Key::S));
        assert_eq!(map_key(KeyCode::KeyD), Some(Key::D));
        assert_eq!(map_key(KeyCode::KeyH), Some(Key::H));
    }

    #[test]
    fn untracked_keys_map_to_none() {
        assert_eq!(map_key(KeyCode::NumpadAdd), None);
        assert_eq!(map_key(KeyCode::PrintScreen), None);
    }

    #[test]
    fn mapping_is_injective() {
        let codes = [
            KeyCode::KeyA,
            KeyCode::KeyZ,
            KeyCode::Digit0,
            KeyCode::Digit9,
            KeyCode::ArrowUp,
            KeyCode::ArrowDown,
            KeyCode::ShiftLeft,
            KeyCode::ShiftRight,
            KeyCode::F1,
            KeyCode::F12,
        ];
        let keys: HashSet<Key> = codes.iter().filter_map(|&c| map_key(c)).collect();
        assert_eq!(keys.len(), codes.len());
    }

    #[test]
    fn slow_window_creation_keeps_pumping() {
        let mut pumps = 0u32;
        let result = pump_until(
            &mut pumps,
            Duration::from_secs(5),
            |n| {
                *n += 1;
                PumpStatus::Continue
            },
            |n| Ok(*n >= 100),
        );
        assert!(result.is_ok());
        assert_eq!(pumps, 100);
    }

    #[test]
    fn gives_up_after_the_timeout() {
        let mut pumps = 0u32;
        let result = pump_until(
            &mut pumps,
            Duration::from_millis(20),
            |n| {
                *n += 1;
                std::thread::sleep(Duration::from_millis(5));
                PumpStatus::Continue
            },
            |_| Ok(false),
        );
        assert!(matches!(result, Err(PlatformError::NoWindow(_))));
        assert!(pumps >= 1);
    }

    #[test]
    fn loop_exit_and_creation_errors_stop_the_wait() {
        let mut pumps = 0u32;
        let exited = pump_until(
            &mut pumps,
            Duration::from_secs(5),
            |_| PumpStatus::Exit(3),
            |_| Ok(false),
        );
        assert!(matches!(exited, Err(PlatformError::Exited(3))));

        let failed = pump_until(
            &mut pumps,
            Duration::from_secs(5),
            |_| PumpStatus::Continue,
            |_| Err(PlatformError::Window("denied".into())),
        );
        assert!(matches!(failed, Err(PlatformError::Window(_))));
    }

    #[test]
    fn held_keys_feed_key_source() {
        let mut state = WindowState::new("test", 1, 1);
        state.keys_held.insert(Key::W);
        assert!(state.keys_held.is_down(Key::W));
        assert!(!state.keys_held.is_down(Key::S));
    }
}
