use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Why a state won its bucket, rendered as a one-character code in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum SelectionReason {
    #[strum(serialize = "C")]
    #[serde(rename = "C")]
    CongestionConstraint,
    #[strum(serialize = "E")]
    #[serde(rename = "E")]
    EnergyTarget,
    #[strum(serialize = "T")]
    #[serde(rename = "T")]
    TariffTarget,
    #[strum(serialize = "M")]
    #[serde(rename = "M")]
    MinEnergy,
    #[strum(serialize = "_")]
    #[serde(rename = "_")]
    NoAlternative,
    #[strum(serialize = "!")]
    #[serde(rename = "!")]
    EmergencyState,
}

/// Outcome of comparing two states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionResult {
    pub result: bool,
    pub reason: SelectionReason,
}

impl SelectionResult {
    pub fn new(result: bool, reason: SelectionReason) -> Self {
        Self { result, reason }
    }
}

/// Concatenated reason codes, `.` for steps without a reason
pub fn reason_trail(reasons: &[Option<SelectionReason>]) -> String {
    reasons
        .iter()
        .map(|r| r.map_or_else(|| ".".to_string(), |r| r.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_reason_codes() {
        assert_eq!(SelectionReason::CongestionConstraint.to_string(), "C");
        assert_eq!(SelectionReason::EmergencyState.to_string(), "!");
        assert_eq!(SelectionReason::from_str("M").unwrap(), SelectionReason::MinEnergy);
        assert_eq!(
            serde_json::to_string(&SelectionReason::NoAlternative).unwrap(),
            "\"_\""
        );
    }

    #[test]
    fn test_reason_trail() {
        let trail = reason_trail(&[
            None,
            Some(SelectionReason::EnergyTarget),
            Some(SelectionReason::NoAlternative),
        ]);
        assert_eq!(trail, ".E_");
    }
}
