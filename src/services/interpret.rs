use crate::models::report::{AnomalySummary, FleetHealth, FleetSummary, Interpretation};
use crate::models::telemetry::{DeviceVerdict, Severity};
use std::collections::BTreeMap;

/// Fraction of high-dominant devices above which the fleet is Elevated Risk.
const HIGH_RATIO_ALERT: f64 = 0.3;
/// Fraction of medium-dominant devices above which the fleet is Mixed.
const MEDIUM_RATIO_ALERT: f64 = 0.4;

struct Rating {
    label: &'static str,
    summary: &'static str,
    actions: [&'static str; 4],
}

static CRITICAL_RATING: Rating = Rating {
    label: "Immediate Action Required",
    summary: "Critical anomalies detected indicating potential safety or reliability risks. Immediate diagnostic and potential replacement recommended.",
    actions: [
        "Isolate battery from high load operations",
        "Run full diagnostic and thermal inspection",
        "Schedule replacement procurement",
        "Increase monitoring frequency to real-time",
    ],
};

static HIGH_RATING: Rating = Rating {
    label: "Degradation Accelerating",
    summary: "High severity anomalies present. Performance trending downward; proactive maintenance advisable soon.",
    actions: [
        "Plan a detailed capacity test",
        "Check cell balancing configuration",
        "Review recent charge/discharge cycles",
        "Increase monitoring to daily summaries",
    ],
};

static MEDIUM_RATING: Rating = Rating {
    label: "Moderate Irregularities",
    summary: "Some anomalies observed but within controlled bounds. Monitor and optimize usage patterns.",
    actions: [
        "Schedule periodic internal resistance measurements",
        "Verify thermal management firmware",
        "Optimize charging schedule for longevity",
        "Maintain normal monitoring cadence",
    ],
};

static LOW_RATING: Rating = Rating {
    label: "Stable",
    summary: "No material anomalies. Battery operating within expected parameters.",
    actions: [
        "Continue standard performance logging",
        "Maintain periodic preventative checks",
        "Review historical trend monthly",
        "No immediate intervention required",
    ],
};

fn rating_for(severity: Severity) -> &'static Rating {
    match severity {
        Severity::Critical => &CRITICAL_RATING,
        Severity::High => &HIGH_RATING,
        Severity::Medium => &MEDIUM_RATING,
        Severity::Low => &LOW_RATING,
    }
}

/// Highest tier with a non-zero count; presence at a higher tier wins
/// regardless of relative magnitude.
pub fn dominant_severity(counts: &BTreeMap<Severity, u64>) -> Severity {
    Severity::ORDER
        .into_iter()
        .find(|severity| counts.get(severity).copied().unwrap_or(0) > 0)
        .unwrap_or(Severity::Low)
}

pub fn interpret_device(device_id: &str, verdict: &DeviceVerdict) -> Interpretation {
    let rating = rating_for(dominant_severity(&verdict.severity_counts));
    Interpretation {
        device_id: device_id.to_string(),
        status: rating.label,
        summary: rating.summary,
        recommended_actions: rating.actions.to_vec(),
        anomalies: AnomalySummary {
            total: verdict.total_anomalies,
            breakdown: verdict.severity_counts.clone(),
        },
    }
}

pub fn summarize_fleet(devices: &[Interpretation]) -> FleetSummary {
    let mut distribution: BTreeMap<Severity, u64> =
        Severity::ORDER.into_iter().map(|s| (s, 0)).collect();
    for device in devices {
        *distribution
            .entry(dominant_severity(&device.anomalies.breakdown))
            .or_insert(0) += 1;
    }

    // Empty fleets use denominator 1: both ratios are 0 and health
    // degenerates to Stable.
    let total_devices = devices.len().max(1) as f64;
    let critical = distribution[&Severity::Critical];
    let high = distribution[&Severity::High];
    let medium = distribution[&Severity::Medium];
    let risk_devices = critical + high;

    let fleet_health = if critical > 0 {
        FleetHealth::CriticalRisk
    } else if high as f64 / total_devices > HIGH_RATIO_ALERT {
        FleetHealth::ElevatedRisk
    } else if medium as f64 / total_devices > MEDIUM_RATIO_ALERT {
        FleetHealth::Mixed
    } else {
        FleetHealth::Stable
    };

    FleetSummary {
        fleet_health,
        distribution,
        risk_summary: format!("{risk_devices} devices require attention (critical/high)."),
        recommendation: if risk_devices > 0 {
            "Prioritize diagnostics for critical units and schedule maintenance window."
        } else {
            "Maintain routine monitoring; no immediate interventions required."
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(counts: &[(Severity, u64)]) -> DeviceVerdict {
        let severity_counts: BTreeMap<Severity, u64> = counts.iter().copied().collect();
        let samples: u64 = severity_counts.values().sum();
        let low = severity_counts.get(&Severity::Low).copied().unwrap_or(0);
        DeviceVerdict {
            severity_counts,
            total_anomalies: samples - low,
            samples,
        }
    }

    fn interpretation_with_dominant(id: &str, dominant: Severity) -> Interpretation {
        interpret_device(id, &verdict(&[(dominant, 1), (Severity::Low, 9)]))
    }

    #[test]
    fn single_critical_reading_dominates_device() {
        let v = verdict(&[(Severity::Critical, 1), (Severity::Low, 9)]);
        let interpretation = interpret_device("device5", &v);

        assert_eq!(interpretation.status, "Immediate Action Required");
        assert_eq!(interpretation.anomalies.total, 1);
        assert_eq!(dominant_severity(&v.severity_counts), Severity::Critical);
    }

    #[test]
    fn dominant_severity_ignores_relative_magnitude() {
        let counts: BTreeMap<Severity, u64> =
            [(Severity::High, 1), (Severity::Medium, 50)].into_iter().collect();
        assert_eq!(dominant_severity(&counts), Severity::High);
    }

    #[test]
    fn empty_counts_default_to_low() {
        assert_eq!(dominant_severity(&BTreeMap::new()), Severity::Low);
    }

    #[test]
    fn four_high_of_ten_is_elevated_risk() {
        let mut fleet = Vec::new();
        for i in 0..4 {
            fleet.push(interpretation_with_dominant(&format!("hot{i}"), Severity::High));
        }
        for i in 0..6 {
            fleet.push(interpretation_with_dominant(&format!("ok{i}"), Severity::Low));
        }

        let summary = summarize_fleet(&fleet);
        assert_eq!(summary.fleet_health, FleetHealth::ElevatedRisk);
        assert_eq!(summary.distribution[&Severity::High], 4);
        assert_eq!(summary.risk_summary, "4 devices require attention (critical/high).");
    }

    #[test]
    fn all_low_fleet_is_stable() {
        let fleet: Vec<Interpretation> = (0..10)
            .map(|i| interpretation_with_dominant(&format!("dev{i}"), Severity::Low))
            .collect();

        let summary = summarize_fleet(&fleet);
        assert_eq!(summary.fleet_health, FleetHealth::Stable);
        assert_eq!(summary.risk_summary, "0 devices require attention (critical/high).");
        assert_eq!(
            summary.recommendation,
            "Maintain routine monitoring; no immediate interventions required."
        );
    }

    #[test]
    fn empty_fleet_degenerates_to_stable() {
        let summary = summarize_fleet(&[]);
        assert_eq!(summary.fleet_health, FleetHealth::Stable);
        assert_eq!(summary.distribution.values().sum::<u64>(), 0);
    }

    #[test]
    fn any_critical_device_outranks_ratios() {
        let mut fleet = vec![interpretation_with_dominant("bad", Severity::Critical)];
        for i in 0..9 {
            fleet.push(interpretation_with_dominant(&format!("ok{i}"), Severity::Low));
        }

        let summary = summarize_fleet(&fleet);
        assert_eq!(summary.fleet_health, FleetHealth::CriticalRisk);
        assert_eq!(
            summary.recommendation,
            "Prioritize diagnostics for critical units and schedule maintenance window."
        );
    }

    #[test]
    fn adding_critical_devices_never_downgrades_health() {
        let mut fleet = vec![interpretation_with_dominant("bad0", Severity::Critical)];
        for i in 0..4 {
            fleet.push(interpretation_with_dominant(&format!("hot{i}"), Severity::High));
        }

        for extra in 0..5 {
            let summary = summarize_fleet(&fleet);
            assert_eq!(summary.fleet_health, FleetHealth::CriticalRisk);
            fleet.push(interpretation_with_dominant(
                &format!("bad{}", extra + 1),
                Severity::Critical,
            ));
        }
    }

    #[test]
    fn medium_heavy_fleet_is_mixed() {
        let mut fleet = Vec::new();
        for i in 0..5 {
            fleet.push(interpretation_with_dominant(&format!("med{i}"), Severity::Medium));
        }
        for i in 0..5 {
            fleet.push(interpretation_with_dominant(&format!("ok{i}"), Severity::Low));
        }

        let summary = summarize_fleet(&fleet);
        assert_eq!(summary.fleet_health, FleetHealth::Mixed);
    }
}
