//! Logging helpers.
//!
//! The library only talks to the `log` facade. Binaries call [`init`] once; it installs
//! `env_logger` with `info` as the default level (`debug` when verbose). `RUST_LOG` still wins.

use crate::event::InputEvent;

/// Install the process-wide logger.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .try_init();
}

/// One-line human description of an event, kernel code names included.
pub fn describe_event(event: &InputEvent) -> String {
    match event {
        InputEvent::Key { key, value } => {
            let action = match value {
                0 => "release",
                1 => "press",
                2 => "repeat",
                _ => "?",
            };
            format!("{key:?} {action}")
        }
        InputEvent::Relative { axis, value } => format!("{axis:?} {value:+}"),
        InputEvent::Absolute { axis, value } => format!("{axis:?} = {value}"),
        InputEvent::Sync => "SYN_REPORT".to_owned(),
        InputEvent::Other => "(other)".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::{AbsoluteAxisCode, KeyCode, RelativeAxisCode};

    #[test]
    fn test_describe_event() {
        assert_eq!(
            describe_event(&InputEvent::key(KeyCode::BTN_LEFT, 1)),
            "BTN_LEFT press"
        );
        assert_eq!(
            describe_event(&InputEvent::rel(RelativeAxisCode::REL_X, 3)),
            "REL_X +3"
        );
        assert_eq!(
            describe_event(&InputEvent::abs(AbsoluteAxisCode::ABS_MT_SLOT, 2)),
            "ABS_MT_SLOT = 2"
        );
        assert_eq!(describe_event(&InputEvent::Sync), "SYN_REPORT");
    }
}
