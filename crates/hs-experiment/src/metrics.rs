//! Final metrics scraped from a training log.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a learner's log lives inside the results bucket.
pub fn training_log_key(run_id: &str) -> String {
    format!("{run_id}/learner-1/training-log.txt")
}

/// Summary figures a training script prints when it finishes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub train_accuracy: Option<f64>,
    pub train_loss: Option<f64>,
    pub test_accuracy: Option<f64>,
    pub test_loss: Option<f64>,
    /// Kept verbatim; scripts print it with a unit suffix.
    pub train_time: Option<String>,
}

impl FinalMetrics {
    /// Scan `log` for the `Final ...:` and `Total train time:` lines.
    /// Missing or unparseable lines leave the field `None`; if a line
    /// appears more than once the last one wins.
    pub fn parse(log: &str) -> Self {
        let mut metrics = Self::default();

        for line in log.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("Final train accuracy:") {
                metrics.train_accuracy = parse_number("train accuracy", rest);
            } else if let Some(rest) = line.strip_prefix("Final train loss:") {
                metrics.train_loss = parse_number("train loss", rest);
            } else if let Some(rest) = line.strip_prefix("Final test accuracy:") {
                metrics.test_accuracy = parse_number("test accuracy", rest);
            } else if let Some(rest) = line.strip_prefix("Final test loss:") {
                metrics.test_loss = parse_number("test loss", rest);
            } else if let Some(rest) = line.strip_prefix("Total train time:") {
                let rest = rest.trim();
                metrics.train_time = (!rest.is_empty()).then(|| rest.to_string());
            }
        }

        metrics
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn parse_number(metric: &str, text: &str) -> Option<f64> {
    let text = text.trim();
    match text.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(metric = metric, value = text, "unparseable metric value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
Epoch 1/10 loss: 0.61
Epoch 10/10 loss: 0.21
Final train accuracy: 0.9213
Final train loss: 0.2104
Final test accuracy: 0.9015
Final test loss: 0.2788
Total train time: 312.4s
";

    #[test]
    fn parses_all_fields() {
        let metrics = FinalMetrics::parse(LOG);
        assert_eq!(metrics.train_accuracy, Some(0.9213));
        assert_eq!(metrics.train_loss, Some(0.2104));
        assert_eq!(metrics.test_accuracy, Some(0.9015));
        assert_eq!(metrics.test_loss, Some(0.2788));
        assert_eq!(metrics.train_time.as_deref(), Some("312.4s"));
    }

    #[test]
    fn missing_lines_stay_none() {
        let metrics = FinalMetrics::parse("Final test accuracy: 0.88\nsomething else\n");
        assert_eq!(metrics.test_accuracy, Some(0.88));
        assert_eq!(metrics.train_accuracy, None);
        assert_eq!(metrics.train_time, None);

        assert!(FinalMetrics::parse("").is_empty());
    }

    #[test]
    fn garbage_values_ignored() {
        let metrics = FinalMetrics::parse("Final train loss: nan-ish\nTotal train time:\n");
        assert_eq!(metrics.train_loss, None);
        assert_eq!(metrics.train_time, None);
    }

    #[test]
    fn log_key_layout() {
        assert_eq!(training_log_key("training-abc"), "training-abc/learner-1/training-log.txt");
    }
}
