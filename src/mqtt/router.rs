use crate::config::MqttConfig;
use crate::error::{PvInverterError, Result};
use crate::phase::{Phase, PhaseReading};

/// Maps inbound topics to phases by exact name
#[derive(Debug, Clone)]
pub struct TopicRouter {
    topics: [String; 3],
}

impl TopicRouter {
    pub fn new(l1: impl Into<String>, l2: impl Into<String>, l3: impl Into<String>) -> Self {
        Self {
            topics: [l1.into(), l2.into(), l3.into()],
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        let [l1, l2, l3] = config.phase_topics();
        Self::new(l1, l2, l3)
    }

    /// Phase for a topic; wildcards are not interpreted
    pub fn phase_for(&self, topic: &str) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|p| self.topics[p.index()] == topic)
    }

    pub fn topic_for(&self, phase: Phase) -> &str {
        &self.topics[phase.index()]
    }

    /// Route a message to a reading.
    ///
    /// `Ok(None)` for topics that are not phase topics, `Err` when a phase
    /// topic carries a payload that is not a number.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Result<Option<PhaseReading>> {
        let Some(phase) = self.phase_for(topic) else {
            return Ok(None);
        };
        let power = parse_power_payload(payload).map_err(|msg| PvInverterError::payload(topic, msg))?;
        Ok(Some(PhaseReading::new(phase, power)))
    }
}

/// Parse a plain-text decimal power value.
///
/// Surrounding whitespace is ignored. Only a dot separates decimals; a comma
/// is ambiguous with thousands grouping and is rejected. NaN and infinities
/// are rejected.
pub fn parse_power_payload(payload: &[u8]) -> std::result::Result<f64, String> {
    let text = std::str::from_utf8(payload).map_err(|e| format!("payload is not UTF-8: {}", e))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty payload".to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err(format!("non-finite value '{}'", trimmed)),
        Err(e) => Err(format!("'{}' is not a number: {}", truncate(trimmed, 32), e)),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> TopicRouter {
        TopicRouter::new("pv/l1/power", "pv/l2/power", "pv/l3/power")
    }

    #[test]
    fn exact_topics_map_to_phases() {
        let r = router();
        assert_eq!(r.phase_for("pv/l1/power"), Some(Phase::L1));
        assert_eq!(r.phase_for("pv/l3/power"), Some(Phase::L3));
        assert_eq!(r.topic_for(Phase::L2), "pv/l2/power");
    }

    #[test]
    fn near_misses_are_ignored() {
        let r = router();
        assert_eq!(r.phase_for("pv/l1/power/"), None);
        assert_eq!(r.phase_for("pv/+/power"), None);
        assert_eq!(r.phase_for("PV/L1/POWER"), None);
        assert!(r.route("pv/status", b"online").unwrap().is_none());
    }

    #[test]
    fn route_parses_payload() {
        let r = router();
        let reading = r.route("pv/l2/power", b" 1150.5\n").unwrap().unwrap();
        assert_eq!(reading, PhaseReading::new(Phase::L2, 1150.5));
    }

    #[test]
    fn route_rejects_garbage_on_phase_topic() {
        let err = router().route("pv/l1/power", b"n/a").unwrap_err();
        assert!(matches!(err, PvInverterError::Payload { ref topic, .. } if topic == "pv/l1/power"));
    }

    #[test]
    fn payload_variants() {
        assert_eq!(parse_power_payload(b"460"), Ok(460.0));
        assert_eq!(parse_power_payload(b"-12.5"), Ok(-12.5));
        assert_eq!(parse_power_payload(b"1e3"), Ok(1000.0));
        assert!(parse_power_payload(b"").is_err());
        assert!(parse_power_payload(b"   ").is_err());
        assert!(parse_power_payload(b"NaN").is_err());
        assert!(parse_power_payload(b"inf").is_err());
        assert!(parse_power_payload(&[0xff, 0xfe]).is_err());
        assert!(parse_power_payload(b"{\"power\": 5}").is_err());
    }

    #[test]
    fn comma_separated_payloads_are_rejected() {
        assert!(parse_power_payload(b"1,234").is_err());
        assert!(parse_power_payload(b"1,234.5").is_err());
        assert!(parse_power_payload(b"7,25").is_err());
        assert!(router().route("pv/l3/power", b"1,234").is_err());
    }
}
