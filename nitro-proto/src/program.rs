//! MicroPython source synthesis for the hub.
//!
//! Both the resident listener and the per-command discrete programs are
//! generated from the same motion table, so a token and its discrete
//! counterpart always move the actuators the same way.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::{DriveCommand, Tuning};

/// A named program ready to be uploaded to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Short identifier, e.g. `run_forward`.
    pub name: String,
    /// Program source text.
    pub source: String,
}

/// Actuator handle names used in generated source.
const LEFT: &str = "left";
/// Right drive motor handle.
const RIGHT: &str = "right";
/// Steering motor handle.
const STEER: &str = "steer";

/// Motor instructions for one command, one statement per line.
fn motion(cmd: DriveCommand, t: &Tuning) -> Vec<String> {
    match cmd {
        DriveCommand::Forward => vec![
            format!("{LEFT}.run(-{})", t.forward_speed),
            format!("{RIGHT}.run({})", t.forward_speed),
        ],
        DriveCommand::Turbo => vec![
            format!("{LEFT}.run(-{})", t.turbo_speed),
            format!("{RIGHT}.run({})", t.turbo_speed),
        ],
        DriveCommand::Backward => vec![
            format!("{LEFT}.run({})", t.reverse_speed),
            format!("{RIGHT}.run(-{})", t.reverse_speed),
        ],
        DriveCommand::TurnLeft => vec![format!(
            "{STEER}.run_target({}, -{}, wait=False)",
            t.steer_speed, t.steer_angle
        )],
        DriveCommand::TurnRight => vec![format!(
            "{STEER}.run_target({}, {}, wait=False)",
            t.steer_speed, t.steer_angle
        )],
        DriveCommand::Center => vec![
            format!("{STEER}.run_target({}, 0, wait=True)", t.steer_speed),
            format!("{STEER}.stop()"),
        ],
        DriveCommand::Stop => stop_drive(),
        DriveCommand::Shutdown => stop_all(),
    }
}

/// Halts both drive motors.
fn stop_drive() -> Vec<String> {
    vec![format!("{LEFT}.stop()"), format!("{RIGHT}.stop()")]
}

/// Halts every actuator.
fn stop_all() -> Vec<String> {
    let mut lines = stop_drive();
    lines.push(format!("{STEER}.stop()"));
    lines
}

/// Common imports and actuator handles.
fn prelude(t: &Tuning, out: &mut String) {
    out.push_str("from pybricks.hubs import PrimeHub\n");
    out.push_str("from pybricks.pupdevices import Motor\n");
    out.push_str("from pybricks.parameters import Port\n");
    out.push_str("from pybricks.tools import wait\n");
    out.push('\n');
    out.push_str("hub = PrimeHub()\n");
    let _ = writeln!(out, "{LEFT} = Motor(Port.{})", t.drive_left);
    let _ = writeln!(out, "{RIGHT} = Motor(Port.{})", t.drive_right);
    let _ = writeln!(out, "{STEER} = Motor(Port.{})", t.steering);
    out.push('\n');
}

/// Generates the resident listener for streaming mode.
///
/// The listener polls stdin for single-byte tokens and maps each to its
/// motion; `X` stops every actuator and exits the program.
pub fn listener_program(t: &Tuning) -> Program {
    let mut src = String::new();
    src.push_str("import uselect\nimport usys\n");
    prelude(t, &mut src);
    src.push_str("poll = uselect.poll()\n");
    src.push_str("poll.register(usys.stdin, uselect.POLLIN)\n\n");
    src.push_str("hub.display.char('G')\n\n");
    src.push_str("while True:\n");
    src.push_str("    if poll.poll(10):\n");
    src.push_str("        cmd = usys.stdin.read(1)\n");

    for (i, cmd) in DriveCommand::ALL.into_iter().enumerate() {
        let kw = if i == 0 { "if" } else { "elif" };
        let _ = writeln!(src, "        {kw} cmd == '{}':", char::from(cmd.token()));
        for line in motion(cmd, t) {
            let _ = writeln!(src, "            {line}");
        }
        if cmd == DriveCommand::Shutdown {
            src.push_str("            raise SystemExit\n");
        }
    }
    src.push_str("    wait(10)\n");

    Program {
        name: "listener".to_owned(),
        source: src,
    }
}

/// Generates the self-terminating program for one command.
///
/// The program issues the command's motion, holds for the configured
/// dwell, then always stops the drive motors.
pub fn discrete_program(cmd: DriveCommand, t: &Tuning) -> Program {
    let mut src = String::new();
    prelude(t, &mut src);
    for line in motion(cmd, t) {
        src.push_str(&line);
        src.push('\n');
    }
    let dwell = t.dwell.for_command(cmd).as_millis();
    if dwell > 0 {
        let _ = writeln!(src, "wait({dwell})");
    }
    for line in stop_drive() {
        src.push_str(&line);
        src.push('\n');
    }

    Program {
        name: format!("run_{}", cmd.name()),
        source: src,
    }
}
