//! Markdown rendering for workflow reports and drug profiles.

use std::fmt::Write;

use pharmassist_core::trial::DrugProfile;

use crate::graph::FinalReport;

pub fn render_report(report: &FinalReport) -> String {
    let mut out = String::new();
    let rec = &report.final_recommendation;

    let _ = writeln!(out, "# Phase III Recommendation: {}\n", rec.go_no_go.as_str());
    let _ = writeln!(out, "**Confidence:** {}\n", rec.confidence_level.as_str());
    let _ = writeln!(out, "{}\n", rec.executive_summary);

    if !rec.critical_actions.is_empty() {
        let _ = writeln!(out, "## Critical actions\n");
        for action in &rec.critical_actions {
            let _ = writeln!(out, "- {}", action);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Trial analysis\n\n{}\n", report.initial_analysis);

    if let Some(risk) = &report.risk_assessment {
        let _ = writeln!(out, "## Risk assessment: {}\n", risk.risk_level.as_str());
        for factor in &risk.risk_factors {
            let _ = writeln!(out, "- {}", factor);
        }
        let _ = writeln!(out, "\n**Mitigation:** {}\n", risk.mitigation_strategy);
    }

    if let Some(safety) = &report.safety_review {
        let _ = writeln!(out, "## Safety review: {}\n", safety.safety_status.as_str());
        let _ = writeln!(out, "{}\n", safety.adverse_events_summary);
        for item in &safety.monitoring_recommendations {
            let _ = writeln!(out, "- {}", item);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Step log\n");
    for notice in &report.message_log {
        let _ = writeln!(
            out,
            "- `{}` {}: {}",
            notice.timestamp.format("%H:%M:%S"),
            notice.step,
            notice.message
        );
    }
    let _ = writeln!(out, "\n_Run {}_", report.run_id);
    out
}

/// Short summary: name, indication, stage, target market.
pub fn render_drug_profile(profile: &DrugProfile) -> String {
    let mut out = format!("# {}\n\n", profile.name);
    let _ = writeln!(out, "- **Indication:** {}", profile.indication);
    let _ = writeln!(out, "- **Stage:** {}", profile.stage);
    let market = if profile.target_market.is_empty() {
        "not specified"
    } else {
        profile.target_market.as_str()
    };
    let _ = writeln!(out, "- **Target market:** {}", market);
    let _ = writeln!(out, "\n| Operation | Readiness |\n|---|---|");
    let _ = writeln!(out, "| Manufacturing | {} |", profile.manufacturing.readiness);
    let _ = writeln!(out, "| Regulatory | {} |", profile.regulatory.readiness);
    let _ = writeln!(out, "| Commercial | {} |", profile.commercial.readiness);
    out
}
