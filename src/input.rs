//! Input simulation backend for mouse and keyboard control

use std::sync::Arc;

use crate::error::InputError;

/// Low-level input backend.
///
/// One method per primitive gesture; the [`crate::actuator::Actuator`]
/// composes these into the fast-click loop, key holds and the rod cast.
/// Implementations must be callable from any thread.
pub trait InputDriver: Send + Sync {
    /// Press the primary mouse button.
    fn mouse_down(&self) -> Result<(), InputError>;
    /// Release the primary mouse button.
    fn mouse_up(&self) -> Result<(), InputError>;
    /// Single primary click.
    fn click(&self) -> Result<(), InputError>;
    /// Press and hold a key by name ("A", "F9", "SPACE", ...).
    fn key_down(&self, key: &str) -> Result<(), InputError>;
    /// Release a key by name.
    fn key_up(&self, key: &str) -> Result<(), InputError>;
}

/// Build the platform input driver.
pub fn platform_driver() -> Result<Arc<dyn InputDriver>, InputError> {
    #[cfg(windows)]
    {
        Ok(Arc::new(windows_impl::EnigoDriver::new()?))
    }
    #[cfg(not(windows))]
    {
        tracing::warn!("[INPUT] No input backend on this platform, gestures are dropped");
        Ok(Arc::new(InertDriver))
    }
}

/// Fallback driver that swallows every gesture.
pub struct InertDriver;

impl InputDriver for InertDriver {
    fn mouse_down(&self) -> Result<(), InputError> {
        Ok(())
    }

    fn mouse_up(&self) -> Result<(), InputError> {
        Ok(())
    }

    fn click(&self) -> Result<(), InputError> {
        Ok(())
    }

    fn key_down(&self, _key: &str) -> Result<(), InputError> {
        Ok(())
    }

    fn key_up(&self, _key: &str) -> Result<(), InputError> {
        Ok(())
    }
}

#[cfg(windows)]
mod windows_impl {
    use enigo::{Button, Direction, Enigo, Key, Keyboard, Mouse, Settings};
    use parking_lot::Mutex;

    use super::InputDriver;
    use crate::error::InputError;

    /// Enigo-backed driver. Enigo is not thread-safe, so every gesture
    /// goes through the mutex.
    pub struct EnigoDriver {
        enigo: Mutex<Enigo>,
    }

    impl EnigoDriver {
        pub fn new() -> Result<Self, InputError> {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| InputError::Backend(format!("enigo init: {e:?}")))?;
            Ok(Self {
                enigo: Mutex::new(enigo),
            })
        }

        fn button(&self, direction: Direction) -> Result<(), InputError> {
            self.enigo
                .lock()
                .button(Button::Left, direction)
                .map_err(|e| InputError::Backend(format!("mouse: {e:?}")))
        }

        fn key(&self, key: &str, direction: Direction) -> Result<(), InputError> {
            let key_code = resolve_key(key).ok_or_else(|| InputError::UnknownKey(key.to_string()))?;
            self.enigo
                .lock()
                .key(key_code, direction)
                .map_err(|e| InputError::Backend(format!("key '{key}': {e:?}")))
        }
    }

    impl InputDriver for EnigoDriver {
        fn mouse_down(&self) -> Result<(), InputError> {
            self.button(Direction::Press)
        }

        fn mouse_up(&self) -> Result<(), InputError> {
            self.button(Direction::Release)
        }

        fn click(&self) -> Result<(), InputError> {
            self.button(Direction::Click)
        }

        fn key_down(&self, key: &str) -> Result<(), InputError> {
            self.key(key, Direction::Press)
        }

        fn key_up(&self, key: &str) -> Result<(), InputError> {
            self.key(key, Direction::Release)
        }
    }

    /// Convert a key name to an enigo key.
    fn resolve_key(key: &str) -> Option<Key> {
        // Single characters go through Unicode; lowercase avoids keyboard
        // layout mapping issues.
        if key.len() == 1 {
            let c = key.chars().next()?.to_ascii_lowercase();
            return Some(Key::Unicode(c));
        }

        let key_upper = key.to_uppercase();
        match key_upper.as_str() {
            "F1" => Some(Key::F1),
            "F2" => Some(Key::F2),
            "F3" => Some(Key::F3),
            "F4" => Some(Key::F4),
            "F5" => Some(Key::F5),
            "F6" => Some(Key::F6),
            "F7" => Some(Key::F7),
            "F8" => Some(Key::F8),
            "F9" => Some(Key::F9),
            "F10" => Some(Key::F10),
            "F11" => Some(Key::F11),
            "F12" => Some(Key::F12),
            "ESC" | "ESCAPE" => Some(Key::Escape),
            "ENTER" | "RETURN" => Some(Key::Return),
            "SPACE" => Some(Key::Space),
            "TAB" => Some(Key::Tab),
            "UP" => Some(Key::UpArrow),
            "DOWN" => Some(Key::DownArrow),
            "LEFT" => Some(Key::LeftArrow),
            "RIGHT" => Some(Key::RightArrow),
            "SHIFT" => Some(Key::Shift),
            "CTRL" | "CONTROL" => Some(Key::Control),
            "ALT" => Some(Key::Alt),
            _ => None,
        }
    }

}
