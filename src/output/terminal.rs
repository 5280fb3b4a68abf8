// Colored terminal output for alerts and listing probes.

use colored::Colorize;

use crate::alert::TriggerAlert;
use crate::monitor::probe::ProbeRow;

/// Print one triggered post as a block.
pub fn display_alert(alert: &TriggerAlert) {
    println!(
        "\n{}",
        format!("=== RISING POST in {} ===", alert.display_name)
            .red()
            .bold()
    );
    println!("  Title: {}", super::truncate_chars(&alert.title, 120).bold());
    println!("  URL: {}", alert.url);
    println!(
        "  Score: {}  Comments: {}",
        alert.score, alert.comment_count
    );
    println!(
        "  Upvote rate: {:.1}/min  Moving avg: {}  Initial: {:.1}/min",
        alert.current_rate,
        format!("{:.1}/min", alert.moving_avg_rate).yellow().bold(),
        alert.initial_rate
    );
    println!("  Comment rate: {:.1}/min", alert.comment_rate);
    println!(
        "  {}",
        format!(
            "Thresholds: initial {:.1}/min, follow-up {:.1}/min  |  {} snapshots  |  {}",
            alert.thresholds.initial,
            alert.thresholds.followup,
            alert.snapshot_count,
            alert.triggered_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .dimmed()
    );
}

/// Print a probe table: one row per post in the listing.
pub fn display_probe(display_name: &str, initial_threshold: f64, rows: &[ProbeRow]) {
    if rows.is_empty() {
        println!("No posts returned for {display_name}.");
        return;
    }

    println!(
        "\n{}",
        format!(
            "=== {display_name}: {} posts (initial threshold {initial_threshold:.1}/min) ===",
            rows.len()
        )
        .bold()
    );
    println!();

    println!(
        "  {:<10} {:>7} {:>7} {:>6} {:>9}  {}",
        "Post".dimmed(),
        "Age".dimmed(),
        "Score".dimmed(),
        "Cmts".dimmed(),
        "Rate".dimmed(),
        "Title".dimmed(),
    );
    println!("  {}", "-".repeat(78).dimmed());

    for row in rows {
        let rate = match row.rate {
            Some(rate) if row.would_track => format!("{rate:>9.1}").green().bold(),
            Some(rate) => format!("{rate:>9.1}").normal(),
            None => format!("{:>9}", "young").dimmed(),
        };
        println!(
            "  {:<10} {:>6.0}m {:>7} {:>6} {}  {}",
            row.post_id,
            row.age_minutes,
            row.score,
            row.comment_count,
            rate,
            super::truncate_chars(&row.title, 48),
        );
    }

    let promoted = rows.iter().filter(|r| r.would_track).count();
    println!();
    if promoted > 0 {
        println!("  {} {} would start tracking", "!".yellow().bold(), promoted);
    } else {
        println!("  {}", "Nothing clears the initial threshold right now.".dimmed());
    }
}
