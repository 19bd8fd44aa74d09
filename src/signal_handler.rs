use std::{fs, thread};

use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};

use crate::backup::log::LogTracker;

/// On SIGINT/SIGTERM drop the unfinished run log and exit 1.
pub fn signal_handler(tracker: &LogTracker) {
    let tracker = tracker.clone();
    thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(err) => {
                eprintln!("signal handler setup failed: {}", err);
                return;
            }
        };
        if signals.forever().next().is_some() {
            let pending = match tracker.lock() {
                Ok(mut current) => current.take(),
                Err(_) => None,
            };
            if let Some(path) = pending {
                let _ = fs::remove_file(path);
            }
            println!("Interrupted");
            std::process::exit(1);
        }
    });
}
