//! Deterministic educational outreach drafts for doctors.

use serde::Serialize;

use pharmassist_data::Doctor;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutreachDraft {
    pub name: String,
    pub specialty: String,
    pub email_draft: String,
}

/// One draft per doctor, in input order.
pub fn draft_outreach(doctors: &[Doctor]) -> Vec<OutreachDraft> {
    doctors
        .iter()
        .map(|d| OutreachDraft {
            name: d.name.clone(),
            specialty: d.specialty.clone(),
            email_draft: format!(
                "Dear Dr. {}, here is an educational update on our therapy for {}.",
                d.name, d.specialty
            ),
        })
        .collect()
}

/// Render drafts as a markdown table.
pub fn render_outreach_table(drafts: &[OutreachDraft]) -> String {
    let mut out = String::from("| Doctor | Specialty | Draft |\n|---|---|---|\n");
    for d in drafts {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            escape_cell(&d.name),
            escape_cell(&d.specialty),
            escape_cell(&d.email_draft)
        ));
    }
    out
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}
