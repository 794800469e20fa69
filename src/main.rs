//! Autoreel - screen-reading fishing automaton
//!
//! Classifies screenshots into fishing phases, reads direction cues with
//! OCR, and drives mouse/keyboard input to play the mini-game round after
//! round. Start, stop and emergency stop are bound to global hotkeys.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use autoreel::config::{get_data_dir, Config};
use autoreel::fishing::{FishingController, Phase};
use autoreel::hotkeys::HotkeyDispatcher;
use autoreel::perception::{Detector, ScreenGrabber, TemplateClassifier, TesseractReader};
use autoreel::{Actuator, input};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    const LOG_FILTER: &str = "info,autoreel=info";

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_FILTER));

    let log_dir = get_data_dir().join("debug").join("log");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file_path = log_dir.join("debug.log");
    let file_result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path);

    match file_result {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false);
            let stdout_layer = tracing_subscriber::fmt::layer();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();

            tracing::info!("[INIT] Logging initialized, file: {:?}", log_file_path);
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(LOG_FILTER))
                .init();
            eprintln!(
                "[INIT] Failed to create debug log file at {:?}: {}",
                log_file_path, e
            );
        }
    }
}

fn main() {
    init_logging();

    println!("Autoreel {}", APP_VERSION);
    println!("================================");

    let config = Config::load();
    config.save();

    let classifier = match TemplateClassifier::new(&config.template_path()) {
        Ok(classifier) => classifier,
        Err(e) => {
            eprintln!("Cannot load phase templates: {}", e);
            eprintln!("Place the template images under {:?}", config.template_path());
            std::process::exit(1);
        }
    };
    let text = TesseractReader::new(config.ocr_lang.clone());
    let detector = Arc::new(Detector::new(
        Box::new(ScreenGrabber::new()),
        Box::new(classifier),
        Box::new(text),
        &config,
    ));

    let driver = match input::platform_driver() {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("Cannot initialize input backend: {}", e);
            std::process::exit(1);
        }
    };
    let actuator = Arc::new(Actuator::new(
        driver,
        config.click_jitter(),
        config.cast_hold(),
    ));

    let controller = FishingController::new(&config, detector, actuator);

    // Console status line, one per phase change.
    let _subscription = {
        let last_phase = parking_lot::Mutex::new(Phase::Stopped);
        controller.subscribe_status(move |status| {
            let mut last = last_phase.lock();
            if *last != status.phase {
                *last = status.phase;
                match &status.last_error {
                    Some(error) => println!(
                        "[{}] {} ({})",
                        status.round_count,
                        status.phase.description(),
                        error
                    ),
                    None => println!("[{}] {}", status.round_count, status.phase.description()),
                }
            }
        })
    };

    let _hotkeys = match HotkeyDispatcher::spawn(&config, controller.clone()) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            eprintln!("Cannot register hotkeys: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Hotkeys: START={}, STOP={}, EMERGENCY={}",
        config.hotkey_start, config.hotkey_stop, config.hotkey_emergency
    );
    println!("Waiting for the start hotkey...");

    // The hotkey thread owns all further control flow.
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
