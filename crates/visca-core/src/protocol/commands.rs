//! Message catalogue
//!
//! Module-defined commands and inquiries for common PTZ camera functions.
//! Byte layouts follow the VISCA command list shared by Sony-compatible
//! cameras; the camera address byte is always `81`.

use super::message::{Command, Inquiry};
use super::params::{AnswerTemplate, FieldRule, Param};

fn focus_modes() -> FieldRule {
    FieldRule::Table(vec![(2, "auto"), (3, "manual")])
}

fn power_states() -> FieldRule {
    FieldRule::Table(vec![(2, "on"), (3, "standby")])
}

/// Pan/tilt directions as the `0X 0Y` nibble pair of a drive command
fn pan_tilt_directions() -> FieldRule {
    FieldRule::Table(vec![
        (0x31, "up"),
        (0x32, "down"),
        (0x13, "left"),
        (0x23, "right"),
        (0x11, "up-left"),
        (0x21, "up-right"),
        (0x12, "down-left"),
        (0x22, "down-right"),
        (0x33, "stop"),
    ])
}

/// Close the on-screen menu
pub fn osd_close() -> Command {
    Command::new("Close OSD", vec![0x81, 0x01, 0x06, 0x06, 0x03, 0xFF])
}

/// Stop focus movement
pub fn focus_stop() -> Command {
    Command::new("Focus Stop", vec![0x81, 0x01, 0x04, 0x08, 0x00, 0xFF])
}

/// Focus far at standard speed
pub fn focus_far() -> Command {
    Command::new("Focus Far", vec![0x81, 0x01, 0x04, 0x08, 0x02, 0xFF])
}

/// Focus near at standard speed
pub fn focus_near() -> Command {
    Command::new("Focus Near", vec![0x81, 0x01, 0x04, 0x08, 0x03, 0xFF])
}

/// Focus far at `speed` 0 (slow) to 7 (fast)
pub fn focus_far_variable() -> Command {
    Command::new("Focus Far (variable)", vec![0x81, 0x01, 0x04, 0x08, 0x20, 0xFF]).param(
        "speed",
        &[9],
        FieldRule::Raw,
    )
}

/// Focus near at `speed` 0 (slow) to 7 (fast)
pub fn focus_near_variable() -> Command {
    Command::new("Focus Near (variable)", vec![0x81, 0x01, 0x04, 0x08, 0x30, 0xFF]).param(
        "speed",
        &[9],
        FieldRule::Raw,
    )
}

/// Option `mode`: `"auto"` or `"manual"`
pub fn focus_mode() -> Command {
    Command::new("Focus Mode", vec![0x81, 0x01, 0x04, 0x38, 0x00, 0xFF]).param(
        "mode",
        &[9],
        focus_modes(),
    )
}

/// Answer `mode`: `"auto"` or `"manual"`
pub fn focus_mode_inquiry() -> Inquiry {
    Inquiry::new(
        "Focus Mode Inquiry",
        vec![0x81, 0x09, 0x04, 0x38, 0xFF],
        AnswerTemplate::new(
            vec![0x90, 0x50, 0x00, 0xFF],
            vec![Param::new("mode", &[5], focus_modes())],
        ),
    )
}

/// Option `position`: 16-bit zoom position, `0` is wide end
pub fn zoom_direct() -> Command {
    Command::new(
        "Zoom Direct",
        vec![0x81, 0x01, 0x04, 0x47, 0x00, 0x00, 0x00, 0x00, 0xFF],
    )
    .param("position", &[9, 11, 13, 15], FieldRule::Raw)
}

/// Answer `position`: 16-bit zoom position
pub fn zoom_position_inquiry() -> Inquiry {
    Inquiry::new(
        "Zoom Position Inquiry",
        vec![0x81, 0x09, 0x04, 0x47, 0xFF],
        AnswerTemplate::new(
            vec![0x90, 0x50, 0x00, 0x00, 0x00, 0x00, 0xFF],
            vec![Param::new("position", &[5, 7, 9, 11], FieldRule::Raw)],
        ),
    )
}

/// Option `preset`: memory number
pub fn preset_recall() -> Command {
    Command::new(
        "Preset Recall",
        vec![0x81, 0x01, 0x04, 0x3F, 0x02, 0x00, 0xFF],
    )
    .param("preset", &[10, 11], FieldRule::Raw)
}

/// Option `preset`: memory number
pub fn preset_set() -> Command {
    Command::new("Preset Set", vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x00, 0xFF]).param(
        "preset",
        &[10, 11],
        FieldRule::Raw,
    )
}

/// Return pan/tilt to its home position
pub fn pan_tilt_home() -> Command {
    Command::new("Pan-Tilt Home", vec![0x81, 0x01, 0x06, 0x04, 0xFF])
}

/// Drive pan/tilt.
///
/// Options: `pan_speed` (1 to 0x18), `tilt_speed` (1 to 0x17) and
/// `direction`, one of `up`, `down`, `left`, `right`, `up-left`,
/// `up-right`, `down-left`, `down-right` or `stop`.
pub fn pan_tilt_drive() -> Command {
    Command::new(
        "Pan-Tilt Drive",
        vec![0x81, 0x01, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0xFF],
    )
    .param("pan_speed", &[8, 9], FieldRule::Raw)
    .param("tilt_speed", &[10, 11], FieldRule::Raw)
    .param("direction", &[13, 15], pan_tilt_directions())
}

/// Option `state`: `"on"` or `"standby"`
pub fn power() -> Command {
    Command::new("Power", vec![0x81, 0x01, 0x04, 0x00, 0x00, 0xFF]).param(
        "state",
        &[9],
        power_states(),
    )
}

/// Answer `state`: `"on"` or `"standby"`
pub fn power_inquiry() -> Inquiry {
    Inquiry::new(
        "Power Inquiry",
        vec![0x81, 0x09, 0x04, 0x00, 0xFF],
        AnswerTemplate::new(
            vec![0x90, 0x50, 0x00, 0xFF],
            vec![Param::new("state", &[5], power_states())],
        ),
    )
}

/// Vendor, model, ROM revision and socket count. Cheap enough to use as a
/// liveness check.
pub fn version_inquiry() -> Inquiry {
    Inquiry::new(
        "Version Inquiry",
        vec![0x81, 0x09, 0x00, 0x02, 0xFF],
        AnswerTemplate::new(
            vec![0x90, 0x50, 0, 0, 0, 0, 0, 0, 0, 0xFF],
            vec![
                Param::new("vendor", &[4, 5, 6, 7], FieldRule::Raw),
                Param::new("model", &[8, 9, 10, 11], FieldRule::Raw),
                Param::new("rom", &[12, 13, 14, 15], FieldRule::Raw),
                Param::new("sockets", &[16, 17], FieldRule::Raw),
            ],
        ),
    )
}

/// Every catalogue command, for listing in a host UI
pub fn all_commands() -> Vec<Command> {
    vec![
        osd_close(),
        focus_stop(),
        focus_far(),
        focus_near(),
        focus_far_variable(),
        focus_near_variable(),
        focus_mode(),
        zoom_direct(),
        preset_recall(),
        preset_set(),
        pan_tilt_home(),
        pan_tilt_drive(),
        power(),
    ]
}

/// Every catalogue inquiry
pub fn all_inquiries() -> Vec<Inquiry> {
    vec![
        focus_mode_inquiry(),
        zoom_position_inquiry(),
        power_inquiry(),
        version_inquiry(),
    ]
}
