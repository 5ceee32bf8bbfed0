use pharmassist_core::error::DataError;
use pharmassist_core::trial::{TrialData, TrialSite};

/// Fold per-site rows into the aggregate the workflow analyzes.
///
/// A site is high-dropout when its dropout rate exceeds
/// `dropout_threshold_pct`, and violation-flagged when it has any protocol
/// violations.
pub fn aggregate_sites(
    sites: &[TrialSite],
    enrollment_target: u32,
    dropout_threshold_pct: f64,
) -> Result<TrialData, DataError> {
    if sites.is_empty() {
        return Err(DataError::invalid("trial sites", "no site records"));
    }

    for site in sites {
        if site.site_name.trim().is_empty() {
            return Err(DataError::invalid("site_name", "empty site name"));
        }
        if !site.dropout_rate.is_finite() || site.dropout_rate < 0.0 {
            return Err(DataError::invalid(
                "dropout_rate",
                format!("{}: {}", site.site_name, site.dropout_rate),
            ));
        }
    }

    let total_enrolled = checked_total(sites, "enrolled", |s| s.enrolled)?;
    let total_saes =
        checked_total(sites, "serious_adverse_events", |s| s.serious_adverse_events)?;
    let avg_dropout_rate =
        sites.iter().map(|s| s.dropout_rate).sum::<f64>() / sites.len() as f64;

    let high_dropout_sites = sites
        .iter()
        .filter(|s| s.dropout_rate > dropout_threshold_pct)
        .map(|s| s.site_name.clone())
        .collect();

    let violation_sites = sites
        .iter()
        .filter(|s| s.protocol_violations > 0)
        .map(|s| s.site_name.clone())
        .collect();

    let data = TrialData {
        total_enrolled,
        enrollment_target,
        site_count: sites.len(),
        high_dropout_sites,
        violation_sites,
        total_saes,
        avg_dropout_rate,
        efficacy_range: efficacy_range(sites),
    };
    data.validate()?;
    Ok(data)
}

fn checked_total(
    sites: &[TrialSite],
    field: &str,
    value: impl Fn(&TrialSite) -> u32,
) -> Result<u32, DataError> {
    sites
        .iter()
        .try_fold(0u32, |acc, s| acc.checked_add(value(s)))
        .ok_or_else(|| DataError::invalid(field, "total overflows"))
}

fn efficacy_range(sites: &[TrialSite]) -> String {
    let values: Vec<f64> = sites.iter().filter_map(|s| s.efficacy_pct).collect();
    if values.is_empty() {
        return "not reported".to_string();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        format!("{:.0}%", min)
    } else {
        format!("{:.0}-{:.0}%", min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, enrolled: u32, dropout: f64, violations: u32, saes: u32) -> TrialSite {
        TrialSite {
            site_name: name.to_string(),
            enrolled,
            dropout_rate: dropout,
            protocol_violations: violations,
            serious_adverse_events: saes,
            efficacy_pct: Some(40.0 + f64::from(enrolled % 5)),
        }
    }

    #[test]
    fn test_flags_high_dropout_and_violations() {
        let sites = vec![
            site("Site_A", 120, 6.0, 0, 0),
            site("Site_B", 110, 9.5, 2, 1),
            site("Site_C", 90, 14.2, 0, 0),
            site("Site_D", 80, 10.0, 0, 0),
        ];
        let data = aggregate_sites(&sites, 788, 10.0).unwrap();
        assert_eq!(data.total_enrolled, 400);
        assert_eq!(data.site_count, 4);
        // Exactly at the threshold is not high-dropout.
        assert_eq!(data.high_dropout_sites, vec!["Site_C"]);
        assert_eq!(data.violation_sites, vec!["Site_B"]);
        assert_eq!(data.total_saes, 1);
        assert!((data.avg_dropout_rate - 9.925).abs() < 1e-9);
    }

    #[test]
    fn test_efficacy_range_formatting() {
        let mut sites = vec![site("A", 10, 1.0, 0, 0), site("B", 10, 1.0, 0, 0)];
        sites[0].efficacy_pct = Some(38.0);
        sites[1].efficacy_pct = Some(44.0);
        assert_eq!(aggregate_sites(&sites, 100, 10.0).unwrap().efficacy_range, "38-44%");

        sites[1].efficacy_pct = None;
        assert_eq!(aggregate_sites(&sites, 100, 10.0).unwrap().efficacy_range, "38%");
    }

    #[test]
    fn test_rejects_empty_and_bad_rows() {
        assert!(aggregate_sites(&[], 788, 10.0).is_err());
        let bad = vec![site("A", 10, f64::NAN, 0, 0)];
        assert!(aggregate_sites(&bad, 788, 10.0).is_err());
    }

    #[test]
    fn test_rejects_overflowing_totals() {
        let sites = vec![
            site("A", 3_000_000_000, 1.0, 0, 0),
            site("B", 3_000_000_000, 1.0, 0, 0),
        ];
        let err = aggregate_sites(&sites, 788, 10.0).unwrap_err();
        assert!(matches!(err, DataError::Invalid { ref field, .. } if field == "enrolled"));

        let sites = vec![site("A", 10, 1.0, 0, u32::MAX), site("B", 10, 1.0, 0, 1)];
        let err = aggregate_sites(&sites, 788, 10.0).unwrap_err();
        assert!(matches!(
            err,
            DataError::Invalid { ref field, .. } if field == "serious_adverse_events"
        ));
    }

    #[test]
    fn test_rejects_zero_target() {
        let sites = vec![site("A", 10, 1.0, 0, 0)];
        let err = aggregate_sites(&sites, 0, 10.0).unwrap_err();
        assert!(err.to_string().contains("enrollment_target"));
    }
}
