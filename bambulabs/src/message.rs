//! A message from the printer.

use std::collections::BTreeMap;

use parse_display::{Display, FromStr};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::sequence_id::SequenceId;

/// A message from the printer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    /// A print message.
    Print(Print),
    /// A well formed JSON message which is not modelled here.
    Json(Value),
    /// The message could not be parsed. The `Option<String>` contains the raw message.
    /// If the message could not be parsed as a string, the `Option` will be `None`.
    Unknown(Option<String>),
}

impl Message {
    /// Returns the sequence id of the message.
    pub fn sequence_id(&self) -> Option<SequenceId> {
        match self {
            Message::Print(print) => Some(print.sequence_id()),
            Message::Json(_) | Message::Unknown(_) => None,
        }
    }
}

impl From<Print> for Message {
    fn from(print: Print) -> Self {
        Message::Print(print)
    }
}

/// A print message, discriminated by its `command` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Print {
    /// The status of the printer. Usually a partial update; only the
    /// fields that changed since the last push are present.
    PushStatus(PushStatus),
    /// A print job was started from a project file.
    ProjectFile(ProjectFile),
}

impl Print {
    /// Returns the sequence id of the message.
    pub fn sequence_id(&self) -> SequenceId {
        match self {
            Print::PushStatus(push_status) => push_status.sequence_id.clone(),
            Print::ProjectFile(project_file) => project_file.sequence_id.clone(),
        }
    }
}

/// The state of the gcode runner, as reported in `gcode_state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[display(style = "SNAKE_CASE")]
pub enum GcodeState {
    /// Nothing is printing.
    Idle,
    /// A job is being prepared (heating, levelling, ...).
    Prepare,
    /// The job is printing.
    Running,
    /// The job is paused.
    Pause,
    /// The job finished successfully.
    Finish,
    /// The job failed or was cancelled.
    Failed,
    /// The printer is slicing the job itself.
    Slicing,
    /// Some state this crate does not know about.
    #[display("{0}")]
    #[serde(untagged)]
    Unknown(String),
}

/// A project file message, sent when a print is started from a 3MF project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// The sequence id.
    pub sequence_id: SequenceId,
    /// Path of the gcode stream inside the project archive, e.g.
    /// `Metadata/plate_1.gcode`.
    pub param: Option<String>,
    /// Where the project archive can be retrieved from.
    pub url: String,
    /// The task id.
    pub task_id: String,
    /// The subtask id.
    pub subtask_id: String,
    /// The subtask name.
    #[serde(default)]
    pub subtask_name: String,
    /// Whether the AMS feeds the print.
    #[serde(default)]
    pub use_ams: bool,
    /// Filament slot to AMS tray mapping. `-1` marks a slot without a tray.
    /// Sent as an empty string when the AMS is not in use.
    #[serde(default, deserialize_with = "deserialize_ams_mapping")]
    pub ams_mapping: Option<Vec<i64>>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

fn deserialize_ams_mapping<'de, D>(deserializer: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<i64>),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::List(mapping)) => Some(mapping),
        Some(Raw::Text(_)) | None => None,
    })
}

/// A push status message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PushStatus {
    /// The sequence id.
    #[serde(default)]
    pub sequence_id: SequenceId,
    /// The gcode state.
    pub gcode_state: Option<GcodeState>,
    /// The current layer.
    pub layer_num: Option<i64>,
    /// The total number of layers of the job.
    pub total_layer_num: Option<i64>,
    /// The percentage of the print completed.
    pub mc_percent: Option<i64>,
    /// The remaining time of the print, in minutes.
    pub mc_remaining_time: Option<i64>,
    /// The print stage.
    pub mc_print_stage: Option<String>,
    /// The print error code.
    pub print_error: Option<i64>,
    /// The task id.
    pub task_id: Option<String>,
    /// The subtask id.
    pub subtask_id: Option<String>,
    /// The subtask name.
    pub subtask_name: Option<String>,
    /// The gcode file.
    pub gcode_file: Option<String>,
    /// The print type (`local`, `cloud`, ...).
    pub print_type: Option<String>,
    /// The ams.
    pub ams: Option<PrintAms>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// The AMS section of a status push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintAms {
    /// The ams units.
    pub ams: Option<Vec<PrintAmsData>>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// A single ams unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintAmsData {
    /// The unit id.
    pub id: String,
    /// The trays of this unit.
    #[serde(default)]
    pub tray: Vec<PrintTray>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// A tray of an ams unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintTray {
    /// The tray id, local to its unit.
    pub id: String,
    /// The filament type.
    pub tray_type: Option<String>,
    /// The filament colour as `RRGGBBAA`.
    pub tray_color: Option<String>,
    /// The spool uuid read from the RFID tag, all zeros when no tag was
    /// read.
    pub tray_uuid: Option<String>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_deserialize_message_json() {
        let message = r#"{ "hello": "world" }"#;

        let result = serde_json::from_str::<Message>(message);

        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_push_status_partial() {
        let message = r#"{ "print": { "bed_temper": 17.40625, "layer_num": 12, "command": "push_status", "msg": 1, "sequence_id": "2" }}"#;

        let Message::Print(Print::PushStatus(status)) = serde_json::from_str::<Message>(message).unwrap() else {
            panic!("expected a push status");
        };

        assert_eq!(status.layer_num, Some(12));
        assert_eq!(status.gcode_state, None);
        assert_eq!(status.sequence_id, SequenceId::String("2".to_string()));
    }

    #[test]
    fn test_deserialize_push_status_ams() {
        let message = r#"{ "print": { "command": "push_status", "sequence_id": "9", "ams": { "tray_now": "1", "ams": [
            { "id": "1", "humidity": "4", "tray": [
                { "id": "0", "tray_type": "PLA", "tray_color": "FFFFFFFF", "tray_uuid": "6A8F2C1D9E3B4A5F8C7D6E5F4A3B2C1D" },
                { "id": "1" }
            ] }
        ] } }}"#;

        let Message::Print(Print::PushStatus(status)) = serde_json::from_str::<Message>(message).unwrap() else {
            panic!("expected a push status");
        };

        let units = status.ams.unwrap().ams.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, "1");
        assert_eq!(units[0].tray.len(), 2);
        assert_eq!(
            units[0].tray[0].tray_uuid.as_deref(),
            Some("6A8F2C1D9E3B4A5F8C7D6E5F4A3B2C1D")
        );
        assert_eq!(units[0].tray[1].tray_type, None);
    }

    #[test]
    fn test_deserialize_gcode_state() {
        let state: GcodeState = serde_json::from_str(r#""RUNNING""#).unwrap();
        assert_eq!(state, GcodeState::Running);

        let state: GcodeState = serde_json::from_str(r#""FINISH""#).unwrap();
        assert_eq!(state, GcodeState::Finish);

        let state: GcodeState = serde_json::from_str(r#""WARMING_UP""#).unwrap();
        assert_eq!(state, GcodeState::Unknown("WARMING_UP".to_string()));
    }

    #[test]
    fn test_gcode_state_display() {
        assert_eq!(GcodeState::Running.to_string(), "RUNNING");
        assert_eq!(GcodeState::Unknown("WARMING_UP".to_string()).to_string(), "WARMING_UP");
    }

    #[test]
    fn test_deserialize_project_file_with_ams() {
        let message = r#"{
            "print": {
                "sequence_id": "0",
                "command": "project_file",
                "param": "Metadata/plate_1.gcode",
                "project_id": "0",
                "profile_id": "0",
                "task_id": "1234",
                "subtask_id": "5678",
                "subtask_name": "benchy",
                "url": "https://example.com/benchy.3mf",
                "timelapse": false,
                "use_ams": true,
                "ams_mapping": [2, -1, 0]
            }
        }"#;

        let Message::Print(Print::ProjectFile(project)) = serde_json::from_str::<Message>(message).unwrap() else {
            panic!("expected a project file");
        };

        assert_eq!(project.param.as_deref(), Some("Metadata/plate_1.gcode"));
        assert_eq!(project.task_id, "1234");
        assert_eq!(project.subtask_id, "5678");
        assert!(project.use_ams);
        assert_eq!(project.ams_mapping, Some(vec![2, -1, 0]));
    }

    #[test]
    fn test_deserialize_project_file_without_ams() {
        let message = r#"{
            "print": {
                "sequence_id": 3,
                "command": "project_file",
                "param": "Metadata/plate_2.gcode",
                "task_id": "1",
                "subtask_id": "2",
                "url": "file:///sdcard/cube.3mf",
                "use_ams": false,
                "ams_mapping": ""
            }
        }"#;

        let Message::Print(Print::ProjectFile(project)) = serde_json::from_str::<Message>(message).unwrap() else {
            panic!("expected a project file");
        };

        assert!(!project.use_ams);
        assert_eq!(project.ams_mapping, None);
        assert_eq!(project.subtask_name, "");
    }

    #[test]
    fn test_deserialize_unmodelled_print_command() {
        let message = r#"{ "print": { "command": "gcode_line", "param": "G28", "sequence_id": "1" }}"#;

        assert!(serde_json::from_str::<Message>(message).is_err());
    }
}
