use armview_core::{DisplayState, Joint, LinkStatus};
use armview_link::Endpoint;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub joint: &'static str,
    pub label: &'static str,
    pub value: Option<f64>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayResponse {
    pub status: LinkStatus,
    pub endpoint: String,
    pub slots: Vec<SlotView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DisplayResponse {
    pub fn from_state(state: &DisplayState, endpoint: &Endpoint) -> Self {
        let slots = Joint::ALL
            .iter()
            .map(|joint| SlotView {
                joint: joint.key(),
                label: joint.label(),
                value: state.value(*joint),
                text: state.slot_text(*joint),
            })
            .collect();
        Self {
            status: state.status,
            endpoint: endpoint.url(),
            slots,
            updated_at: state.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use armview_core::Reading;

    #[test]
    fn empty_display_has_six_placeholder_slots() {
        let resp = DisplayResponse::from_state(&DisplayState::default(), &Endpoint::new("192.168.1.100", 81));
        assert_eq!(resp.slots.len(), 6);
        assert!(resp.slots.iter().all(|s| s.value.is_none() && s.text == "--"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "DISCONNECTED");
        assert_eq!(json["endpoint"], "ws://192.168.1.100:81");
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn slots_follow_reading_order() {
        let mut state = DisplayState::default();
        state.set_status(LinkStatus::Connected);
        state.apply_reading(Reading::new([10.0, 20.0, 30.0, 40.0, 50.0, 60.5]), Utc::now());
        let resp = DisplayResponse::from_state(&state, &Endpoint::new("arm.local", 81));

        let texts: Vec<&str> = resp.slots.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["10", "20", "30", "40", "50", "60.5"]);
        assert_eq!(resp.slots[0].label, "M1 – Base");
        assert_eq!(resp.slots[5].joint, "M6");
        assert_eq!(serde_json::to_value(&resp).unwrap()["status"], "CONNECTED");
    }
}
