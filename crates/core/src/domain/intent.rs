use serde::{Deserialize, Serialize};

/// A raw operator intent. The text is opaque to the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub text: String,
}

impl Intent {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// The evaluation intents processed when no intent file is supplied.
pub fn builtin_intents() -> Vec<Intent> {
    vec![
        Intent::new(
            "intent_1",
            "Provision a basic PDU session that provides bidirectional Internet connectivity (uplink and downlink) with no explicit QoS guarantees, operating under a best-effort service model.",
        ),
        Intent::new(
            "intent_2",
            "Create a PDU session for Netflix video streaming traffic, identified by destination IP address 203.0.113.80. Enforce a minimum downlink throughput of ≥ 5 Mbps and a packet delay budget of ≤ 100 ms for downlink traffic, while treating uplink traffic as best-effort.",
        ),
        Intent::new(
            "intent_3",
            "Create a PDU session for Netflix video streaming traffic, identified by destination IP address 203.0.113.80, applying appropriate QoS requirements for non-conversational video services.",
        ),
        Intent::new(
            "intent_4",
            "Create a PDU session for Netflix video streaming traffic, identified by destination IP address 203.0.113.80, with QoS guarantees.",
        ),
        Intent::new(
            "intent_5",
            "Establish a PDU session for the user identified by GPSI +012111111 to support a real-time gaming application, enforcing appropriate QoS requirements, including an uplink packet delay budget of 30 ms.",
        ),
        Intent::new(
            "intent_6",
            "Establish a PDU session for the user identified by GPSI +012111111 to support a real-time gaming application. Enforce appropriate QoS requirements, including an uplink packet delay budget of 30 ms. Enable lawful intercept by duplicating only the downlink traffic to collector IP 198.51.100.10.",
        ),
    ]
}
