//! Global hotkey dispatch for the three controller commands

use std::thread;

use global_hotkey::{
    hotkey::{Code, HotKey},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};

use crate::config::Config;
use crate::error::FishingError;
use crate::fishing::FishingController;

/// Registers the start/stop/emergency chords and forwards them to the
/// controller from a dedicated event thread.
///
/// The manager must stay alive for the bindings to fire; keep the
/// dispatcher around for the life of the process.
pub struct HotkeyDispatcher {
    _manager: GlobalHotKeyManager,
}

impl HotkeyDispatcher {
    pub fn spawn(config: &Config, controller: FishingController) -> Result<Self, FishingError> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| FishingError::Init(format!("hotkey manager: {e}")))?;

        let start = register(&manager, &config.hotkey_start, "start")?;
        let stop = register(&manager, &config.hotkey_stop, "stop")?;
        let emergency = register(&manager, &config.hotkey_emergency, "emergency")?;

        thread::spawn(move || {
            let receiver = GlobalHotKeyEvent::receiver();
            loop {
                let Ok(event) = receiver.recv() else {
                    tracing::warn!("[HOTKEY] Event channel closed");
                    return;
                };
                if event.state != HotKeyState::Pressed {
                    continue;
                }

                if event.id == start.id() {
                    tracing::info!("[HOTKEY] Start requested");
                    if let Err(e) = controller.start() {
                        tracing::warn!("[HOTKEY] Start failed: {}", e);
                    }
                } else if event.id == stop.id() {
                    tracing::info!("[HOTKEY] Stop requested");
                    controller.stop();
                } else if event.id == emergency.id() {
                    controller.emergency_stop();
                }
            }
        });

        Ok(Self { _manager: manager })
    }
}

fn register(
    manager: &GlobalHotKeyManager,
    chord: &str,
    what: &str,
) -> Result<HotKey, FishingError> {
    let code = string_to_code(chord)
        .ok_or_else(|| FishingError::Init(format!("unknown {what} hotkey '{chord}'")))?;
    let hotkey = HotKey::new(None, code);
    manager
        .register(hotkey)
        .map_err(|e| FishingError::Init(format!("register {what} hotkey '{chord}': {e}")))?;
    Ok(hotkey)
}

/// Convert a key name to a global-hotkey code.
fn string_to_code(key: &str) -> Option<Code> {
    let key_upper = key.to_uppercase();
    match key_upper.as_str() {
        "A" => Some(Code::KeyA),
        "B" => Some(Code::KeyB),
        "C" => Some(Code::KeyC),
        "D" => Some(Code::KeyD),
        "E" => Some(Code::KeyE),
        "F" => Some(Code::KeyF),
        "G" => Some(Code::KeyG),
        "H" => Some(Code::KeyH),
        "I" => Some(Code::KeyI),
        "J" => Some(Code::KeyJ),
        "K" => Some(Code::KeyK),
        "L" => Some(Code::KeyL),
        "M" => Some(Code::KeyM),
        "N" => Some(Code::KeyN),
        "O" => Some(Code::KeyO),
        "P" => Some(Code::KeyP),
        "Q" => Some(Code::KeyQ),
        "R" => Some(Code::KeyR),
        "S" => Some(Code::KeyS),
        "T" => Some(Code::KeyT),
        "U" => Some(Code::KeyU),
        "V" => Some(Code::KeyV),
        "W" => Some(Code::KeyW),
        "X" => Some(Code::KeyX),
        "Y" => Some(Code::KeyY),
        "Z" => Some(Code::KeyZ),
        "0" => Some(Code::Digit0),
        "1" => Some(Code::Digit1),
        "2" => Some(Code::Digit2),
        "3" => Some(Code::Digit3),
        "4" => Some(Code::Digit4),
        "5" => Some(Code::Digit5),
        "6" => Some(Code::Digit6),
        "7" => Some(Code::Digit7),
        "8" => Some(Code::Digit8),
        "9" => Some(Code::Digit9),
        "F1" => Some(Code::F1),
        "F2" => Some(Code::F2),
        "F3" => Some(Code::F3),
        "F4" => Some(Code::F4),
        "F5" => Some(Code::F5),
        "F6" => Some(Code::F6),
        "F7" => Some(Code::F7),
        "F8" => Some(Code::F8),
        "F9" => Some(Code::F9),
        "F10" => Some(Code::F10),
        "F11" => Some(Code::F11),
        "F12" => Some(Code::F12),
        "ESC" | "ESCAPE" => Some(Code::Escape),
        "SPACE" => Some(Code::Space),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_code() {
        assert_eq!(string_to_code("F9"), Some(Code::F9));
        assert_eq!(string_to_code("a"), Some(Code::KeyA));
        assert_eq!(string_to_code("esc"), Some(Code::Escape));
        assert!(string_to_code("CHORD?").is_none());
    }

    #[test]
    fn test_default_chords_resolve() {
        let config = Config::default();
        assert!(string_to_code(&config.hotkey_start).is_some());
        assert!(string_to_code(&config.hotkey_stop).is_some());
        assert!(string_to_code(&config.hotkey_emergency).is_some());
    }
}
