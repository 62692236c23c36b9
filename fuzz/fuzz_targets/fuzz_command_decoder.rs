//! Fuzz target for the inbound command decoder.
//!
//! Feeds arbitrary bytes through `RemoteCommand::decode` and, on success,
//! through the application-level interpretation.  Neither step may panic.

#![no_main]

use levelwatch::app::commands::AppCommand;
use levelwatch::cloud::payload::RemoteCommand;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(cmd) = RemoteCommand::decode(data) {
        let _ = cmd.parameter("Level");
        if let Ok(app) = AppCommand::from_remote(cmd) {
            let _ = app.wants_actuator_on();
        }
    }
});
