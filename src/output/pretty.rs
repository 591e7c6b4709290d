use colored::Colorize;

use crate::queue::{DrainReport, NotifyLevel, QueueStats, QueuedAction};

/// Format queued actions as a table in dispatch order
pub fn format_actions_pretty(actions: &[QueuedAction]) -> String {
    if actions.is_empty() {
        return "Queue (0 actions)\n  Nothing queued".to_string();
    }

    let mut output = format!("Queue ({} actions)\n", actions.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for action in actions {
        let type_name = if action.action_type.is_known() {
            action.action_type.to_string().bold()
        } else {
            action.action_type.to_string().red().bold()
        };
        let mut line = format!("{} {}", format!("[P{}]", action.priority).cyan(), type_name);

        line.push_str(&format!("  {}", action.id.dimmed()));

        if action.retries > 0 {
            line.push_str(&format!("  {}", format!("retry {}", action.retries).yellow()));
        }

        line.push_str(&format!(
            "  {}",
            action.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        ));

        output.push_str(&line);
        output.push('\n');
    }

    output.trim_end().to_string()
}

/// Format queue status
pub fn format_stats_pretty(stats: &QueueStats, backend: &str) -> String {
    let total = stats.pending + stats.in_backoff;
    let mut output = String::new();

    let headline = if total == 0 {
        "Queue is empty".green().to_string()
    } else {
        format!("{total} actions waiting to sync").yellow().to_string()
    };
    output.push_str(&headline);
    output.push('\n');

    output.push_str(&format!("  Pending:    {}\n", stats.pending));
    output.push_str(&format!("  In backoff: {}\n", stats.in_backoff));
    if let Some(oldest) = stats.oldest {
        output.push_str(&format!(
            "  Oldest:     {}\n",
            oldest.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    output.push_str(&format!("  Storage:    {}", backend.dimmed()));

    output
}

/// Format a drain result. `None` means the drain did not run.
pub fn format_drain_pretty(report: Option<&DrainReport>) -> String {
    let Some(report) = report else {
        return "Drain skipped".yellow().to_string();
    };

    let message = report.message();
    let mut output = match report.level() {
        NotifyLevel::Success => message.green().to_string(),
        NotifyLevel::Info => message.dimmed().to_string(),
        NotifyLevel::Warning => message.yellow().to_string(),
        NotifyLevel::Error => message.red().to_string(),
    };

    if report.retried > 0 {
        output.push_str(&format!("\n  Retrying later: {}", report.retried));
    }
    for id in &report.failed_ids {
        output.push_str(&format!("\n  {} {}", "Dropped:".red(), id));
    }

    output
}
