//! Output classification for orchestrator lines.
//!
//! Each line is categorised on its own, with no state carried between
//! lines. Failure markers are checked before success markers so that a
//! recap line such as `ok=3 changed=0 unreachable=0 failed=1` is `Failed`.

use serde::{Deserialize, Serialize};

/// Semantic category of one streamed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Synthetic lines produced by the session itself.
    Info,
    Ok,
    Changed,
    Failed,
    /// `PLAY [...]` / `TASK [...]` banners.
    SectionHeader,
    Neutral,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Info => write!(f, "info"),
            Category::Ok => write!(f, "ok"),
            Category::Changed => write!(f, "changed"),
            Category::Failed => write!(f, "failed"),
            Category::SectionHeader => write!(f, "section_header"),
            Category::Neutral => write!(f, "neutral"),
        }
    }
}

const FAILED_MARKERS: &[&str] = &["fatal:", "failed=", "unreachable="];
const CHANGED_MARKERS: &[&str] = &["changed:", "changed="];
const OK_MARKERS: &[&str] = &["ok:", "ok="];
const SECTION_PREFIXES: &[&str] = &["TASK", "PLAY"];

/// Categorise one line. Blank lines yield `None` and are dropped.
pub fn classify(line: &str) -> Option<Category> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let contains_any = |markers: &[&str]| markers.iter().any(|m| line.contains(m));

    let category = if contains_any(FAILED_MARKERS) {
        Category::Failed
    } else if contains_any(CHANGED_MARKERS) {
        Category::Changed
    } else if contains_any(OK_MARKERS) {
        Category::Ok
    } else if SECTION_PREFIXES.iter().any(|p| line.starts_with(p)) {
        Category::SectionHeader
    } else {
        Category::Neutral
    };
    Some(category)
}

/// A line ready for the client feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLine {
    pub text: String,
    pub category: Category,
}

impl ClassifiedLine {
    pub fn new(text: impl Into<String>, category: Category) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }

    /// Classify a raw process line; `None` for blank lines.
    ///
    /// Surrounding whitespace (including the trailing newline) is stripped.
    pub fn from_output(raw: &str) -> Option<Self> {
        classify(raw).map(|category| Self::new(raw.trim(), category))
    }

    /// One NDJSON record: `{"text":"...","category":"ok"}` plus `\n`.
    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn classification_is_pure(line in ".{0,80}") {
            prop_assert_eq!(classify(&line), classify(&line));
        }

        #[test]
        fn failure_markers_always_win(prefix in "[ -~]{0,20}", suffix in "[ -~]{0,20}") {
            let line = format!("{prefix} ok=1 changed=1 failed=1 {suffix}");
            prop_assert_eq!(classify(&line), Some(Category::Failed));
        }
    }

    #[test]
    fn blank_lines_are_dropped() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("   \t"), None);
        assert!(ClassifiedLine::from_output("\n").is_none());
    }

    #[test]
    fn ansible_line_shapes() {
        assert_eq!(classify("PLAY [webservers] ****"), Some(Category::SectionHeader));
        assert_eq!(classify("TASK [Gathering Facts] ****"), Some(Category::SectionHeader));
        assert_eq!(classify("ok: [web1]"), Some(Category::Ok));
        assert_eq!(classify("changed: [web1]"), Some(Category::Changed));
        assert_eq!(
            classify("fatal: [db1]: UNREACHABLE! => {\"changed\": false}"),
            Some(Category::Failed)
        );
        assert_eq!(classify("skipping: [web2]"), Some(Category::Neutral));
    }

    #[test]
    fn failure_beats_success_in_recap() {
        let recap = "web1 : ok=3 changed=1 unreachable=0 failed=1 skipped=0";
        assert_eq!(classify(recap), Some(Category::Failed));
    }

    #[test]
    fn clean_recap_is_still_failed_by_marker_presence() {
        // The zero counters still contain the markers.
        let recap = "web1 : ok=3 changed=0 unreachable=0 failed=0";
        assert_eq!(classify(recap), Some(Category::Failed));
    }

    #[test]
    fn changed_beats_ok() {
        assert_eq!(classify("ok=1 changed=2"), Some(Category::Changed));
    }

    #[test]
    fn play_recap_banner_is_section_header() {
        assert_eq!(classify("PLAY RECAP *****"), Some(Category::SectionHeader));
    }

    #[test]
    fn leading_whitespace_is_ignored_for_prefixes() {
        assert_eq!(classify("   TASK [x]"), Some(Category::SectionHeader));
    }

    #[test]
    fn from_output_trims_text() {
        let line = ClassifiedLine::from_output("  ok: [h1]\n").unwrap();
        assert_eq!(line.text, "ok: [h1]");
        assert_eq!(line.category, Category::Ok);
    }

    #[test]
    fn ndjson_shape() {
        let line = ClassifiedLine::new("changed: [h1]", Category::Changed);
        assert_eq!(
            line.to_ndjson().unwrap(),
            "{\"text\":\"changed: [h1]\",\"category\":\"changed\"}\n"
        );
        let header = ClassifiedLine::new("PLAY [x]", Category::SectionHeader)
            .to_ndjson()
            .unwrap();
        assert!(header.contains("\"section_header\""));
    }

    #[test]
    fn ndjson_escapes_control_characters() {
        let line = ClassifiedLine::new("fatal: [h1]\u{1b}[0m\ttab", Category::Failed);
        let record = line.to_ndjson().unwrap();
        assert!(record.contains("\\u001b[0m\\ttab"), "{record}");
        let back: serde_json::Value = serde_json::from_str(record.trim_end()).unwrap();
        assert_eq!(back["text"], "fatal: [h1]\u{1b}[0m\ttab");
    }
}
