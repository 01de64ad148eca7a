//! Formats retrieved context for injection into prompts.

use crate::record::MemoryRecord;
use chrono::Utc;

/// Renders ranked retrieval results as a prompt prefix block.
pub struct ContextFormatter;

impl ContextFormatter {
    /// Formats records for injection into a prompt.
    pub fn format_for_prompt(records: &[MemoryRecord]) -> String {
        if records.is_empty() {
            return String::new();
        }

        let mut output = String::new();
        output.push_str("## Relevant memory (for reference)\n\n");
        output.push_str(
            "The following comes from earlier in this conversation and may be relevant:\n\n",
        );

        for (i, record) in records.iter().enumerate() {
            let age_desc = Self::format_age(record.created_at);
            let label = if record.is_summary() { "summary" } else { "note" };

            output.push_str(&format!(
                "{}. [{}] ({})\n   \"{}\"\n\n",
                i + 1,
                age_desc,
                label,
                Self::truncate(&record.content, 200)
            ));
        }

        output.push_str("---\n\n");
        output.push_str("## Current exchange (takes priority)\n\n");

        output
    }

    /// Formats the age of a record in human-readable form.
    fn format_age(created_at: i64) -> String {
        let now = Utc::now().timestamp();
        let age_seconds = (now - created_at).max(0);

        if age_seconds < 3600 {
            let minutes = age_seconds / 60;
            format!("{} min ago", minutes.max(1))
        } else if age_seconds < 86_400 {
            format!("{} h ago", age_seconds / 3600)
        } else {
            let days = age_seconds / 86_400;
            if days == 1 {
                "yesterday".to_string()
            } else {
                format!("{days} days ago")
            }
        }
    }

    /// Truncates text with ellipsis.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let cut: String = s.chars().take(max_len).collect();
            format!("{cut}...")
        }
    }
}
