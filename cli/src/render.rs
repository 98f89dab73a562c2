use comfy_table::Table;
use slidegen_client::display_percent;
use slidegen_common::{JobSnapshot, JobStatus, RenderReport};

pub fn print_snapshot(snapshot: &JobSnapshot, min_visible_progress: f64) {
    println!("Job Details:");
    println!("  ID:       {}", snapshot.job_id);
    println!("  Status:   {} ({})", snapshot.status.label(), snapshot.status);
    println!("  Progress: {}%", display_percent(snapshot.progress, min_visible_progress));
    if let Some(created) = &snapshot.created_at {
        println!("  Created:  {}", created);
    }
    if let Some(updated) = &snapshot.updated_at {
        println!("  Updated:  {}", updated);
    }
    if snapshot.status == JobStatus::Failed {
        println!("  Error:    {}", snapshot.error.as_deref().unwrap_or("(none given)"));
    }
}

pub fn print_report(report: &RenderReport) {
    let mut table = Table::new();
    table.set_header(vec!["Slide", "Overflow", "Actions"]);
    for slide in &report.slides {
        let actions = if slide.actions.is_empty() {
            "-".to_string()
        } else {
            slide.actions.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
        };
        let overflow = if slide.overflow_detected { "yes" } else { "no" };
        table.add_row(vec![slide.slide_id.clone(), overflow.to_string(), actions]);
    }

    println!("Render report for job {}", report.job_id);
    println!("{table}");
    println!(
        "{} slides, {} with overflow",
        report.slide_count(),
        report.overflow_count()
    );
    if let Some(t) = report.generation_time {
        println!("Content generated in {:.1}s", t);
    }
    if let Some(t) = report.render_time {
        println!("Rendered in {:.1}s", t);
    }
}
