use shared::RiskLevel;

pub const HIGH_RISK_THRESHOLD: f64 = 0.75;
pub const MODERATE_RISK_THRESHOLD: f64 = 0.40;

/// Lower bounds are inclusive: a score on a threshold lands in the higher bucket.
pub fn classify_risk(confidence: f64) -> RiskLevel {
    if confidence >= HIGH_RISK_THRESHOLD {
        RiskLevel::High
    } else if confidence >= MODERATE_RISK_THRESHOLD {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

pub fn recommendation(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => {
            "High Risk: The model is confident that signs of anemia are present. It is highly recommended to consult a doctor for a clinical diagnosis."
        }
        RiskLevel::Moderate => {
            "Moderate Risk: The model has detected some potential indicators of anemia. Monitoring your health and considering a consultation with a doctor is advised."
        }
        RiskLevel::Low => {
            "Low Risk: The model did not detect strong visual indicators of anemia. Continue to monitor your health as usual."
        }
    }
}
