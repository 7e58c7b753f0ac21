//! Terminal styling for the training run

use console::{style, Emoji};
use std::path::Path;

use crate::config::PipelineConfig;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
pub static DICE: Emoji<'_, '_> = Emoji("🎲 ", "");
pub static BRAIN: Emoji<'_, '_> = Emoji("🧠 ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    let banner = r#"
     ___  _ __   ___ ___  _ __(_)___| | __
    / _ \| '_ \ / __/ _ \| '__| / __| |/ /
   | (_) | | | | (_| (_) | |  | \__ \   <
    \___/|_| |_|\___\___/|_|  |_|___/_|\_\
    "#;

    println!();
    println!("{}", style(banner).cyan().bold());
    println!("    {}", style("Cancer risk scoring from blood panels").dim());
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print the run configuration card
pub fn print_config(config: &PipelineConfig) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    println!("    ┌{}┐", line);
    println!(
        "    │ {}{}│",
        style("⚙️  Configuration").cyan().bold(),
        " ".repeat(box_width - 20)
    );
    println!("    ├{}┤", line);
    println!("    │  {} Raw data: {:<37}│", FOLDER, truncate_path(&config.raw_dir, 36));
    println!("    │  {} Output:   {:<37}│", SAVE, truncate_path(&config.output_dir, 36));
    println!("    ├{}┤", line);
    println!(
        "    │  {} Model family:      {:<28}│",
        BRAIN,
        style(config.model_family.to_string()).yellow()
    );
    println!(
        "    │  {} Search trials:     {:<28}│",
        DICE,
        style(config.search.trials).yellow()
    );
    println!(
        "    │  {} Missing threshold: {:<28}│",
        CHART,
        style(format!("{:.1}%", config.harmonizer.missing_threshold * 100.0)).yellow()
    );
    println!(
        "    │  {} Threshold / seed:  {:<28}│",
        CHART,
        style(format!("{:.2} / {}", config.decision.threshold, config.seed)).yellow()
    );
    println!("    └{}┘", line);
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print a warning in the step output (also logged through tracing by the caller)
pub fn print_warning(message: &str) {
    println!("    {} {}", WARN, style(message).yellow());
}

/// Print the final completion message
pub fn print_completion(model_dir: &Path) {
    println!();
    println!(
        "    {} {} {}",
        ROCKET,
        style("Training complete, bundle written to").green().bold(),
        style(model_dir.display()).cyan()
    );
    println!();
}

/// Print a styled count message
pub fn print_count(description: &str, count: usize, detail: Option<&str>) {
    match detail {
        Some(info) => println!(
            "      {} {} {}",
            style(count).yellow().bold(),
            description,
            style(info).dim()
        ),
        None => println!("      {} {}", style(count).yellow().bold(), description),
    }
}

/// Print elapsed time of a step
pub fn print_step_time(elapsed: std::time::Duration) {
    println!(
        "    {}",
        style(format!("⏱  {:.2}s", elapsed.as_secs_f64())).dim()
    );
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    truncate_string(&path.display().to_string(), max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
