// Configuration status display: what the radar would watch and how.

use colored::Colorize;

use crate::config::Config;
use crate::momentum::evaluator::ThresholdMode;

/// Display the effective configuration to the terminal.
pub fn show(config: &Config) {
    match &config.settings_path {
        Some(path) => println!("Settings: {}", path.display()),
        None => println!("Settings: built-in defaults (no radar.json found)"),
    }
    println!("Alert log: {}", config.alert_log_path.display());

    let missing = config.credentials.missing();
    if missing.is_empty() {
        println!(
            "Credentials: {} as u/{}",
            "configured".green(),
            config.credentials.username
        );
    } else {
        println!("Credentials: {} {}", "missing".red(), missing.join(", "));
        println!("  Add them to your .env file");
    }

    println!("\n{}", format!("Communities ({}):", config.communities.len()).bold());
    for c in &config.communities {
        let mode = match c.mode {
            ThresholdMode::TwoStage => format!(
                "start >= {:.1}/min, fire >= {:.1}/min",
                c.initial_threshold, c.followup_threshold
            ),
            ThresholdMode::Single => {
                format!("single threshold, fire >= {:.1}/min", c.followup_threshold)
            }
        };
        println!(
            "  {:<16} every {:>3}s  {:<7} min age {:.0}m  {}",
            c.display_name(),
            c.poll_interval_seconds,
            c.listing.as_path(),
            c.min_age_minutes,
            mode
        );
    }

    let t = &config.tracking;
    println!("\n{}", "Tracking:".bold());
    println!(
        "  Up to {} posts per community, dropped after {} minutes",
        t.max_tracked_posts, t.max_post_age_minutes
    );
    println!(
        "  {} snapshots per post, moving average over {} intervals",
        t.max_snapshots, t.moving_average_window
    );
    println!("  {} posts per listing fetch", t.listing_limit);
    if let Some(max) = t.max_listing_score {
        println!("  Skipping new posts already above score {max}");
    }
    if !t.skip_post_ids.is_empty() {
        println!("  {} blocklisted post ids", t.skip_post_ids.len());
    }
    println!(
        "  API budget: {} requests/min, {}ms spacing, {}s timeout",
        config.api.requests_per_minute,
        config.api.min_request_delay_ms,
        config.api.request_timeout_seconds
    );
}
