//! Training summary printed at the end of a run

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::model::ModelFamily;
use crate::pipeline::imbalance::SmoteOutcome;
use crate::pipeline::metrics::EvaluationMetrics;

/// What a training run did, for display
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub harmonized_rows: usize,
    pub dropped_columns: Vec<String>,
    pub feature_count: usize,
    pub smote: SmoteOutcome,
    pub family: ModelFamily,
    pub best_trial_score: f64,
    pub metrics: EvaluationMetrics,
}

fn metric_color(value: f64) -> Color {
    if value >= 0.8 {
        Color::Green
    } else if value >= 0.6 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn indent(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

impl RunSummary {
    fn smote_text(&self) -> String {
        match &self.smote {
            SmoteOutcome::Applied { synthesized, k, .. } => format!("+{} rows (k={})", synthesized, k),
            SmoteOutcome::AlreadyBalanced => "not needed".to_string(),
            SmoteOutcome::Skipped { minority_size, .. } => format!("skipped (minority {})", minority_size),
        }
    }

    pub fn display(&self) {
        println!();
        println!("    {} {}", style("📋").cyan(), style("TRAINING SUMMARY").white().bold());
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Stage").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![Cell::new("📁 Harmonized rows"), Cell::new(self.harmonized_rows)]);
        table.add_row(vec![
            Cell::new("🗑️  Dropped columns"),
            Cell::new(self.dropped_columns.len()).fg(if self.dropped_columns.is_empty() {
                Color::White
            } else {
                Color::Red
            }),
        ]);
        table.add_row(vec![Cell::new("🧮 Model features"), Cell::new(self.feature_count)]);
        table.add_row(vec![Cell::new("⚖️  SMOTE"), Cell::new(self.smote_text())]);
        table.add_row(vec![Cell::new("🧠 Model family"), Cell::new(self.family.to_string())]);
        table.add_row(vec![
            Cell::new("🎲 Best trial F1"),
            Cell::new(format!("{:.4}", self.best_trial_score)),
        ]);
        indent(&table);

        println!();
        println!(
            "    {} {} {}",
            style("📊").cyan(),
            style("HELD-OUT METRICS").white().bold(),
            style(format!("(threshold {:.2})", self.metrics.threshold)).dim()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        let m = &self.metrics;
        let mut metrics = Table::new();
        metrics.load_preset(UTF8_FULL_CONDENSED);
        metrics.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);
        for (name, value) in [
            ("ROC-AUC", m.auc_roc),
            ("PR-AUC", m.pr_auc),
            ("Precision", m.precision),
            ("Recall", m.recall),
            ("F1", m.f1_score),
            ("Accuracy", m.accuracy),
        ] {
            metrics.add_row(vec![
                Cell::new(name),
                Cell::new(format!("{:.4}", value))
                    .fg(metric_color(value))
                    .add_attribute(Attribute::Bold),
            ]);
        }
        indent(&metrics);

        println!();
        let cm = &m.confusion;
        let mut confusion = Table::new();
        confusion.load_preset(UTF8_FULL_CONDENSED);
        confusion.set_header(vec![
            Cell::new("").add_attribute(Attribute::Bold),
            Cell::new("Predicted 0").add_attribute(Attribute::Bold),
            Cell::new("Predicted 1").add_attribute(Attribute::Bold),
        ]);
        confusion.add_row(vec![
            Cell::new("Actual 0"),
            Cell::new(cm.true_negative).fg(Color::Green),
            Cell::new(cm.false_positive).fg(Color::Red),
        ]);
        confusion.add_row(vec![
            Cell::new("Actual 1"),
            Cell::new(cm.false_negative).fg(Color::Red),
            Cell::new(cm.true_positive).fg(Color::Green),
        ]);
        indent(&confusion);

        if !self.dropped_columns.is_empty() {
            println!();
            println!(
                "      {} {}:",
                style("High Missing Values").yellow(),
                style(format!("({})", self.dropped_columns.len())).dim()
            );
            for column in &self.dropped_columns {
                println!("        {} {}", style("•").dim(), column);
            }
        }
    }
}
