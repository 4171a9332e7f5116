/// Display formatting for a bus path's `GetText`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    /// Generic rendering of the raw value
    #[default]
    Plain,
    Watts,
    Amps,
    Volts,
    KilowattHours,
}

impl TextFormat {
    pub fn format(self, val: &serde_json::Value) -> String {
        let (decimals, unit) = match self {
            TextFormat::Plain => return format_text_value(val),
            TextFormat::Watts => (1, "W"),
            TextFormat::Amps => (1, "A"),
            TextFormat::Volts => (1, "V"),
            TextFormat::KilowattHours => (2, "kWh"),
        };
        match val.as_f64() {
            Some(f) => format!("{:.*}{}", decimals, f, unit),
            // Dormant paths (e.g. energy) hold null
            None => format_text_value(val),
        }
    }
}

pub(crate) fn format_text_value(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "---".to_string(),
        serde_json::Value::Number(n) => {
            if n.is_f64() {
                n.as_f64()
                    .map(|f| format!("{:.2}", f))
                    .unwrap_or_else(|| n.to_string())
            } else {
                n.to_string()
            }
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => val.to_string(),
    }
}
