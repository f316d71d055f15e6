// Display model shared by every rendering surface.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::reading::{Reading, JOINT_COUNT};

/// Joint slots in the order the controller reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Joint {
    M1,
    M2,
    M3,
    M4,
    M5,
    M6,
}

impl Joint {
    pub const ALL: [Joint; JOINT_COUNT] = [Joint::M1, Joint::M2, Joint::M3, Joint::M4, Joint::M5, Joint::M6];

    pub fn key(self) -> &'static str {
        match self {
            Joint::M1 => "M1",
            Joint::M2 => "M2",
            Joint::M3 => "M3",
            Joint::M4 => "M4",
            Joint::M5 => "M5",
            Joint::M6 => "M6",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Joint::M1 => "M1 – Base",
            Joint::M2 => "M2 – Shoulder",
            Joint::M3 => "M3 – Elbow",
            Joint::M4 => "M4 – Wrist Pitch",
            Joint::M5 => "M5 – Wrist Roll",
            Joint::M6 => "M6 – Gripper",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Connected,
    #[default]
    Disconnected,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Connected => "CONNECTED",
            LinkStatus::Disconnected => "DISCONNECTED",
        }
    }
}

/// Last applied reading plus connection status. The only input a surface renders from.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DisplayState {
    pub status: LinkStatus,
    pub reading: Option<Reading>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DisplayState {
    pub fn apply_reading(&mut self, reading: Reading, at: DateTime<Utc>) {
        self.reading = Some(reading);
        self.updated_at = Some(at);
    }

    pub fn set_status(&mut self, status: LinkStatus) -> bool {
        let changed = self.status != status;
        self.status = status;
        changed
    }

    pub fn is_connected(&self) -> bool {
        self.status == LinkStatus::Connected
    }

    pub fn value(&self, joint: Joint) -> Option<f64> {
        let idx = Joint::ALL.iter().position(|j| *j == joint)?;
        self.reading.map(|r| r.values()[idx])
    }

    /// Slot text as shown to the user; `--` until the first reading arrives.
    pub fn slot_text(&self, joint: Joint) -> String {
        match self.value(joint) {
            Some(v) => v.to_string(),
            None => "--".to_string(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Robotic Arm Telemetry  [{}]", self.status.as_str());
        for joint in Joint::ALL {
            let _ = writeln!(out, "{:<18}{:>10}", joint.label(), self.slot_text(joint));
        }
        if let Some(at) = self.updated_at {
            let _ = writeln!(out, "updated {}", at.format("%H:%M:%S%.3f"));
        }
        out
    }
}
