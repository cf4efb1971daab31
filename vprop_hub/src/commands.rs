//! Diagnostic command table.
//!
//! A fixed set of named operator commands, each a single get, set or toggle
//! of one property area. Commands are independent: running one never runs
//! another.
//!
//! | Label | Property | Action |
//! |-------|----------|--------|
//! | `read-speed` | PERF_VEHICLE_SPEED | get |
//! | `read-gear` | GEAR_SELECTION | get |
//! | `read-vin` | INFO_VIN | get |
//! | `night-mode-on` / `night-mode-off` | NIGHT_MODE | set |
//! | `toggle-night-mode` | NIGHT_MODE | toggle |
//! | `display-brightness-max` | DISPLAY_BRIGHTNESS | set 100 |
//! | `fold-mirrors` / `unfold-mirrors` | MIRROR_FOLD | set |
//! | `toggle-driver-door-lock` | DOOR_LOCK, driver row 1 left | toggle |
//! | `clear-freeze-frames` | OBD2_FREEZE_FRAME_CLEAR | set empty |

use crate::hub::VehicleHub;
use std::fmt;
use tracing::info;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::props::{
    DISPLAY_BRIGHTNESS, DOOR_LOCK, GEAR_SELECTION, INFO_VIN, MIRROR_FOLD, NIGHT_MODE,
    OBD2_FREEZE_FRAME_CLEAR, PERF_VEHICLE_SPEED,
};
use vprop_common::vhal::types::{
    AreaId, GLOBAL_AREA, PropId, PropertyId, PropertyValue, Value, ValueShape,
    elapsed_realtime_nanos,
};

/// Door area of the driver seat, row 1 left.
const DOOR_ROW_1_LEFT: AreaId = 0x0001;

/// Value written by a set command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int32(i32),
    Float(f32),
    /// The zero value of the property's shape.
    Empty,
}

impl Literal {
    fn to_value(self, shape: ValueShape) -> Value {
        match self {
            Self::Bool(v) => Value::Bool(v),
            Self::Int32(v) => Value::Int32(v),
            Self::Float(v) => Value::Float(v),
            Self::Empty => Value::default_for(shape),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandAction {
    Get,
    Set(Literal),
    /// Read a boolean and write back its negation.
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub id: u16,
    pub label: &'static str,
    pub prop_id: PropertyId,
    pub area_id: AreaId,
    pub action: CommandAction,
}

pub const COMMANDS: &[Command] = &[
    Command {
        id: 1,
        label: "read-speed",
        prop_id: PERF_VEHICLE_SPEED,
        area_id: GLOBAL_AREA,
        action: CommandAction::Get,
    },
    Command {
        id: 2,
        label: "read-gear",
        prop_id: GEAR_SELECTION,
        area_id: GLOBAL_AREA,
        action: CommandAction::Get,
    },
    Command {
        id: 3,
        label: "read-vin",
        prop_id: INFO_VIN,
        area_id: GLOBAL_AREA,
        action: CommandAction::Get,
    },
    Command {
        id: 10,
        label: "night-mode-on",
        prop_id: NIGHT_MODE,
        area_id: GLOBAL_AREA,
        action: CommandAction::Set(Literal::Bool(true)),
    },
    Command {
        id: 11,
        label: "night-mode-off",
        prop_id: NIGHT_MODE,
        area_id: GLOBAL_AREA,
        action: CommandAction::Set(Literal::Bool(false)),
    },
    Command {
        id: 12,
        label: "toggle-night-mode",
        prop_id: NIGHT_MODE,
        area_id: GLOBAL_AREA,
        action: CommandAction::Toggle,
    },
    Command {
        id: 20,
        label: "display-brightness-max",
        prop_id: DISPLAY_BRIGHTNESS,
        area_id: GLOBAL_AREA,
        action: CommandAction::Set(Literal::Int32(100)),
    },
    Command {
        id: 30,
        label: "fold-mirrors",
        prop_id: MIRROR_FOLD,
        area_id: GLOBAL_AREA,
        action: CommandAction::Set(Literal::Bool(true)),
    },
    Command {
        id: 31,
        label: "unfold-mirrors",
        prop_id: MIRROR_FOLD,
        area_id: GLOBAL_AREA,
        action: CommandAction::Set(Literal::Bool(false)),
    },
    Command {
        id: 32,
        label: "toggle-driver-door-lock",
        prop_id: DOOR_LOCK,
        area_id: DOOR_ROW_1_LEFT,
        action: CommandAction::Toggle,
    },
    Command {
        id: 40,
        label: "clear-freeze-frames",
        prop_id: OBD2_FREEZE_FRAME_CLEAR,
        area_id: GLOBAL_AREA,
        action: CommandAction::Set(Literal::Empty),
    },
];

/// Result of one command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Read(PropertyValue),
    Written(PropertyValue),
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(value) => write!(f, "read {value}"),
            Self::Written(value) => write!(f, "wrote {value}"),
        }
    }
}

pub fn find(label: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.label == label)
}

pub fn labels() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|c| c.label)
}

/// Look up `label` and run it against `hub`.
///
/// # Errors
/// `InvalidArgument` for an unknown label; otherwise whatever the hub returns.
pub fn run(hub: &VehicleHub, label: &str) -> Result<CommandOutcome, VhalError> {
    let command = find(label)
        .ok_or_else(|| VhalError::InvalidArgument(format!("unknown command '{label}'")))?;
    execute(hub, command)
}

pub fn execute(hub: &VehicleHub, command: &Command) -> Result<CommandOutcome, VhalError> {
    info!(
        command = command.label,
        prop = %PropId(command.prop_id),
        "Executing {:?}",
        command.action
    );
    match command.action {
        CommandAction::Get => hub
            .get_value(&PropertyValue::request(command.prop_id, command.area_id))
            .map(CommandOutcome::Read),
        CommandAction::Set(literal) => {
            let desc = hub
                .registry()
                .lookup(command.prop_id)
                .ok_or(VhalError::InvalidProperty(command.prop_id))?;
            write(hub, command, literal.to_value(desc.shape))
        }
        CommandAction::Toggle => {
            let current =
                hub.get_value(&PropertyValue::request(command.prop_id, command.area_id))?;
            let on = current.value.as_bool().ok_or_else(|| {
                VhalError::InvalidArgument(format!(
                    "cannot toggle {} holding {}",
                    PropId(command.prop_id),
                    current.value
                ))
            })?;
            write(hub, command, Value::Bool(!on))
        }
    }
}

fn write(hub: &VehicleHub, command: &Command, value: Value) -> Result<CommandOutcome, VhalError> {
    let value = PropertyValue::new(
        command.prop_id,
        command.area_id,
        elapsed_realtime_nanos(),
        value,
    );
    hub.set_value(&value)?;
    Ok(CommandOutcome::Written(value))
}
