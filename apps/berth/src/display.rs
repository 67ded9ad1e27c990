//! Output rendering and formatting

use berth_ops::{EnqueueReport, JobInfo, OperationResult, ProgressReport};
use berth_types::{ColorChoice, FaultyPackageRecord, JobStatus};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use std::io;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Render operation result
    pub fn render_result(&self, result: &OperationResult) -> io::Result<()> {
        if self.json_output {
            self.render_json(result)
        } else {
            self.render_table(result)
        }
    }

    fn render_json(&self, result: &OperationResult) -> io::Result<()> {
        let json = result.to_json().map_err(io::Error::other)?;
        self.term.write_line(&json)
    }

    fn render_table(&self, result: &OperationResult) -> io::Result<()> {
        match result {
            OperationResult::JobList(jobs) => self.render_job_list(jobs),
            OperationResult::Faults(faults) => self.render_faults(faults),
            OperationResult::Progress(report) => self.render_progress(report),
            OperationResult::Enqueue(report) => self.render_enqueue_report(report),
            OperationResult::Success(message) => self.render_success_message(message),
        }
    }

    fn render_job_list(&self, jobs: &[JobInfo]) -> io::Result<()> {
        if jobs.is_empty() {
            return self.term.write_line("No jobs on record.");
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Job").add_attribute(Attribute::Bold),
            Cell::new("Title").add_attribute(Attribute::Bold),
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
        ]);

        for job in jobs {
            let package = if job.package_name.is_empty() {
                "-"
            } else {
                job.package_name.as_str()
            };
            table.add_row(vec![
                Cell::new(&job.id),
                Cell::new(&job.title),
                Cell::new(package),
                Cell::new(job.job_type),
                self.format_status(job.status),
                Cell::new(format_size(job.app_size)),
            ]);
        }

        self.term.write_line(&table.to_string())
    }

    fn render_faults(&self, faults: &[FaultyPackageRecord]) -> io::Result<()> {
        if faults.is_empty() {
            return self.term.write_line("No faulty packages recorded.");
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Reason").add_attribute(Attribute::Bold),
            Cell::new("Recorded").add_attribute(Attribute::Bold),
        ]);

        for fault in faults {
            table.add_row(vec![
                Cell::new(&fault.package_name),
                Cell::new(fault.reason).fg(Color::Red),
                Cell::new(fault.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")),
            ]);
        }

        self.term.write_line(&table.to_string())
    }

    fn render_progress(&self, report: &ProgressReport) -> io::Result<()> {
        self.term.write_line(&format!(
            "{}: {} / {} ({}%)",
            self.style_job_id(&report.job_id),
            format_size(report.bytes_downloaded),
            format_size(report.total_size_bytes),
            report.percent()
        ))
    }

    fn render_enqueue_report(&self, report: &EnqueueReport) -> io::Result<()> {
        self.term.write_line(&format!(
            "Accepted {} job(s), rejected {}",
            report.accepted.len(),
            report.rejected.len()
        ))?;
        for id in &report.rejected {
            self.term.write_line(&format!("  rejected: {id}"))?;
        }
        if report.remaining.is_empty() {
            return self.term.write_line("All submitted jobs finished.");
        }
        self.term.write_line("")?;
        self.render_job_list(&report.remaining)
    }

    fn render_success_message(&self, message: &str) -> io::Result<()> {
        let line = if self.supports_color() {
            Style::new().green().apply_to(message).to_string()
        } else {
            message.to_string()
        };
        self.term.write_line(&line)
    }

    fn format_status(&self, status: JobStatus) -> Cell {
        let cell = Cell::new(status);
        if !self.supports_color() {
            return cell;
        }
        match status {
            JobStatus::Installed => cell.fg(Color::Green),
            JobStatus::InstallationIssue | JobStatus::Blocked => cell.fg(Color::Red),
            JobStatus::Unavailable | JobStatus::PurchaseNeeded => cell.fg(Color::Yellow),
            _ => cell.fg(Color::Blue),
        }
    }

    fn style_job_id(&self, id: &str) -> String {
        if self.supports_color() {
            Style::new().bold().apply_to(id).to_string()
        } else {
            id.to_string()
        }
    }

    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

/// Format byte size in human readable format
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{size:.0} {}", UNITS[unit_index])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}
