//! Actuators built on the input driver: fast-click loop, key holds, rod cast

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::error::InputError;
use crate::input::InputDriver;

/// Poll interval of the click thread while paused.
const PAUSE_POLL: Duration = Duration::from_millis(10);
/// Gap between key press and release for a tap.
const TAP_GAP: Duration = Duration::from_millis(35);

struct Clicker {
    exit: Arc<AtomicBool>,
    // Pause is reversible and deliberately separate from exit.
    paused: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Drives mouse and keyboard gestures for the fishing controller.
///
/// All operations are callable from any thread; `start_fast_click` and
/// `stop_fast_click` are serialized against each other by the clicker
/// mutex. Held keys are tracked so `release_all` can undo them.
pub struct Actuator {
    driver: Arc<dyn InputDriver>,
    clicker: Mutex<Option<Clicker>>,
    held_keys: Mutex<HashSet<String>>,
    click_delay_min: Duration,
    click_delay_max: Duration,
    cast_hold: Duration,
}

impl Actuator {
    pub fn new(
        driver: Arc<dyn InputDriver>,
        click_jitter: (Duration, Duration),
        cast_hold: Duration,
    ) -> Self {
        Self {
            driver,
            clicker: Mutex::new(None),
            held_keys: Mutex::new(HashSet::new()),
            click_delay_min: click_jitter.0,
            click_delay_max: click_jitter.1,
            cast_hold,
        }
    }

    /// Spawn the fast-click thread, or resume it if it is alive. Idempotent.
    pub fn start_fast_click(&self) -> Result<(), InputError> {
        let mut slot = self.clicker.lock();

        if let Some(clicker) = slot.as_ref() {
            if !clicker.exit.load(Ordering::SeqCst) {
                clicker.paused.store(false, Ordering::SeqCst);
                return Ok(());
            }
        }

        let exit = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let driver = self.driver.clone();
        let (delay_min, delay_max) = (self.click_delay_min, self.click_delay_max);

        let thread = {
            let exit = exit.clone();
            let paused = paused.clone();
            thread::spawn(move || {
                tracing::debug!("[CLICK] Fast-click loop started");
                let mut rng = rand::rng();
                while !exit.load(Ordering::SeqCst) {
                    if paused.load(Ordering::SeqCst) {
                        thread::sleep(PAUSE_POLL);
                        continue;
                    }
                    if let Err(e) = driver.click() {
                        tracing::warn!("[CLICK] Click failed: {}", e);
                    }
                    let delay = if delay_max > delay_min {
                        rng.random_range(delay_min.as_secs_f64()..=delay_max.as_secs_f64())
                    } else {
                        delay_min.as_secs_f64()
                    };
                    thread::sleep(Duration::from_secs_f64(delay));
                }
                tracing::debug!("[CLICK] Fast-click loop exited");
            })
        };

        *slot = Some(Clicker {
            exit,
            paused,
            thread,
        });
        Ok(())
    }

    /// Suspend clicking without tearing the thread down.
    pub fn pause_fast_click(&self) {
        if let Some(clicker) = self.clicker.lock().as_ref() {
            clicker.paused.store(true, Ordering::SeqCst);
        }
    }

    /// Resume a paused click loop; takes effect within one click interval.
    pub fn resume_fast_click(&self) {
        if let Some(clicker) = self.clicker.lock().as_ref() {
            clicker.paused.store(false, Ordering::SeqCst);
        }
    }

    /// Terminate the click thread; returns once it has exited.
    pub fn stop_fast_click(&self) -> Result<(), InputError> {
        let clicker = self.clicker.lock().take();
        if let Some(clicker) = clicker {
            clicker.exit.store(true, Ordering::SeqCst);
            clicker
                .thread
                .join()
                .map_err(|_| InputError::Backend("click thread panicked".to_string()))?;
        }
        Ok(())
    }

    /// True while the click thread exists and is not paused.
    pub fn is_clicking(&self) -> bool {
        self.clicker
            .lock()
            .as_ref()
            .is_some_and(|c| !c.exit.load(Ordering::SeqCst) && !c.paused.load(Ordering::SeqCst))
    }

    /// True while the click thread exists but is paused.
    pub fn is_click_paused(&self) -> bool {
        self.clicker
            .lock()
            .as_ref()
            .is_some_and(|c| !c.exit.load(Ordering::SeqCst) && c.paused.load(Ordering::SeqCst))
    }

    /// Hold a key for `duration`. Blocks the caller.
    pub fn hold_key(&self, key: &str, duration: Duration) -> Result<(), InputError> {
        self.driver.key_down(key)?;
        self.held_keys.lock().insert(key.to_string());

        thread::sleep(duration);

        let result = self.driver.key_up(key);
        self.held_keys.lock().remove(key);
        result
    }

    /// Press and release a key.
    pub fn tap_key(&self, key: &str) -> Result<(), InputError> {
        self.driver.key_down(key)?;
        thread::sleep(TAP_GAP);
        self.driver.key_up(key)
    }

    /// Hold the primary button for the cast duration, then release.
    ///
    /// The hold is not interruptible; a mid-cast release leaves the game in
    /// an ambiguous state. Emergency stop bypasses this via `release_all`.
    pub fn cast_rod(&self) -> Result<(), InputError> {
        tracing::debug!("[CAST] Holding primary button for {:?}", self.cast_hold);
        self.driver.mouse_down()?;
        thread::sleep(self.cast_hold);
        self.driver.mouse_up()
    }

    /// Force-release the primary button and every held key.
    pub fn release_all(&self) -> Result<(), InputError> {
        let mut first_err = None;

        if let Err(e) = self.driver.mouse_up() {
            first_err.get_or_insert(e);
        }

        let held: Vec<String> = self.held_keys.lock().drain().collect();
        for key in held {
            if let Err(e) = self.driver.key_up(&key) {
                tracing::warn!("[INPUT] Failed to release '{}': {}", key, e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Actuator {
    fn drop(&mut self) {
        let _ = self.stop_fast_click();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingDriver {
        clicks: AtomicUsize,
        downs: AtomicUsize,
        ups: AtomicUsize,
        key_ups: Mutex<Vec<String>>,
    }

    impl InputDriver for CountingDriver {
        fn mouse_down(&self) -> Result<(), InputError> {
            self.downs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn mouse_up(&self) -> Result<(), InputError> {
            self.ups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn click(&self) -> Result<(), InputError> {
            self.clicks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn key_down(&self, _key: &str) -> Result<(), InputError> {
            Ok(())
        }

        fn key_up(&self, key: &str) -> Result<(), InputError> {
            self.key_ups.lock().push(key.to_string());
            Ok(())
        }
    }

    fn fast_actuator(driver: Arc<CountingDriver>) -> Actuator {
        Actuator::new(
            driver,
            (Duration::from_millis(2), Duration::from_millis(5)),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_fast_click_runs_and_stops() {
        let driver = Arc::new(CountingDriver::default());
        let actuator = fast_actuator(driver.clone());

        actuator.start_fast_click().unwrap();
        assert!(actuator.is_clicking());
        thread::sleep(Duration::from_millis(50));
        actuator.stop_fast_click().unwrap();

        let clicked = driver.clicks.load(Ordering::SeqCst);
        assert!(clicked > 0, "expected clicks, got {}", clicked);
        assert!(!actuator.is_clicking());

        // No clicks after the join returned.
        let after = driver.clicks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(after, driver.clicks.load(Ordering::SeqCst));
    }

    #[test]
    fn test_pause_and_resume() {
        let driver = Arc::new(CountingDriver::default());
        let actuator = fast_actuator(driver.clone());

        actuator.start_fast_click().unwrap();
        thread::sleep(Duration::from_millis(30));
        actuator.pause_fast_click();
        assert!(actuator.is_click_paused());
        thread::sleep(Duration::from_millis(30));

        let while_paused = driver.clicks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        // At most one in-flight click can land after the pause flag flips.
        assert!(driver.clicks.load(Ordering::SeqCst) <= while_paused + 1);

        actuator.resume_fast_click();
        thread::sleep(Duration::from_millis(40));
        assert!(driver.clicks.load(Ordering::SeqCst) > while_paused);
        actuator.stop_fast_click().unwrap();
    }

    #[test]
    fn test_start_is_idempotent() {
        let driver = Arc::new(CountingDriver::default());
        let actuator = fast_actuator(driver);

        actuator.start_fast_click().unwrap();
        actuator.start_fast_click().unwrap();
        assert!(actuator.is_clicking());
        actuator.stop_fast_click().unwrap();
    }

    #[test]
    fn test_cast_rod_press_then_release() {
        let driver = Arc::new(CountingDriver::default());
        let actuator = fast_actuator(driver.clone());

        actuator.cast_rod().unwrap();
        assert_eq!(driver.downs.load(Ordering::SeqCst), 1);
        assert_eq!(driver.ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_all_releases_held_keys() {
        let driver = Arc::new(CountingDriver::default());
        let actuator = Arc::new(fast_actuator(driver.clone()));

        let held = actuator.clone();
        let holder = thread::spawn(move || {
            held.hold_key("D", Duration::from_millis(80)).unwrap();
        });
        thread::sleep(Duration::from_millis(20));

        actuator.release_all().unwrap();
        assert!(driver.key_ups.lock().contains(&"D".to_string()));

        holder.join().unwrap();
    }
}
