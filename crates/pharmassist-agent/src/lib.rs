pub mod graph;
pub mod outreach;
pub mod report;

pub use graph::{route, FinalReport, WorkflowExecutor, WorkflowState};
pub use outreach::{draft_outreach, render_outreach_table, OutreachDraft};
pub use report::{render_drug_profile, render_report};
