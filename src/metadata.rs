//! Document identity and title extraction.
//!
//! Pure functions, no I/O: given a source path and raw content, derive the
//! stable identity (the primary key for every downstream operation) and a
//! display title. The companion [`is_eligible`] predicate gates both the
//! tracker and the reconciler — no document is ever materialized for an
//! ineligible path.

use crate::events::{EventSink, SyncEvent};
use crate::models::Document;

/// Recognized document suffixes, matched case-insensitively.
const DOCUMENT_SUFFIXES: [&str; 2] = [".md", ".markdown"];

/// Index filename rejected regardless of directory, case-insensitively.
const INDEX_STEM: &str = "readme";

/// Whether a source path names a policy document.
///
/// Rejects paths without a recognized document suffix and the well-known
/// `README` file in any directory.
pub fn is_eligible(path: &str) -> bool {
    let name = final_segment(path);
    let Some(stem) = strip_document_suffix(name) else {
        return false;
    };
    !stem.eq_ignore_ascii_case(INDEX_STEM)
}

/// Stable identity for a path: the final segment with its document suffix
/// removed. Nested directories collapse to a flat name, so `a/b/C.md`,
/// `C.md`, and `C.MD` all yield `C`.
pub fn identity_for(path: &str) -> String {
    let name = final_segment(path);
    strip_document_suffix(name).unwrap_or(name).to_string()
}

/// Build a [`Document`] from raw source material.
///
/// The title is the first line-leading level-1 heading in the content,
/// whitespace-trimmed. When no heading exists the title falls back to the
/// identity, observable as a [`SyncEvent::TitleFallback`] warning.
/// Deterministic given its inputs; lifecycle timestamps are stamped by the
/// caller, never here.
pub fn extract(path: &str, content: &str, version_token: &str, events: &dyn EventSink) -> Document {
    let identity = identity_for(path);
    let title = match heading_title(content) {
        Some(title) => title,
        None => {
            events.emit(SyncEvent::TitleFallback {
                identity: identity.clone(),
            });
            identity.clone()
        }
    };
    Document {
        identity,
        title,
        body: content.to_string(),
        version_token: version_token.to_string(),
        path: path.to_string(),
    }
}

fn final_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Strip a recognized suffix case-insensitively; `None` if no suffix matches.
fn strip_document_suffix(name: &str) -> Option<&str> {
    for suffix in DOCUMENT_SUFFIXES {
        if name.len() <= suffix.len() {
            continue;
        }
        let split = name.len() - suffix.len();
        match name.get(split..) {
            Some(tail) if tail.eq_ignore_ascii_case(suffix) => return Some(&name[..split]),
            _ => {}
        }
    }
    None
}

/// First `# ` heading at the start of a line, trimmed. Mid-line markers and
/// deeper heading levels do not match.
fn heading_title(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix("# ")?;
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BufferSink;

    #[test]
    fn identity_collapses_directories_and_suffix_case() {
        assert_eq!(identity_for("a/b/C.md"), "C");
        assert_eq!(identity_for("C.md"), "C");
        assert_eq!(identity_for("a/b/C.MD"), "C");
        assert_eq!(identity_for("policies/data-retention.markdown"), "data-retention");
    }

    #[test]
    fn eligibility_requires_document_suffix() {
        assert!(is_eligible("policies/aml.md"));
        assert!(is_eligible("aml.MD"));
        assert!(!is_eligible("policies/aml.txt"));
        assert!(!is_eligible("policies/aml"));
        assert!(!is_eligible("scripts/build.sh"));
    }

    #[test]
    fn readme_rejected_in_any_directory_and_case() {
        assert!(!is_eligible("README.md"));
        assert!(!is_eligible("readme.MD"));
        assert!(!is_eligible("policies/ReadMe.md"));
        assert!(!is_eligible("a/b/c/README.markdown"));
    }

    #[test]
    fn title_from_first_level_one_heading() {
        let events = BufferSink::new();
        let doc = extract(
            "policies/aml.md",
            "preamble\n#  Anti-Money Laundering  \nbody",
            "a".repeat(40).as_str(),
            &events,
        );
        assert_eq!(doc.title, "Anti-Money Laundering");
        assert!(events.take().is_empty());
    }

    #[test]
    fn midline_and_deeper_headings_do_not_match() {
        let events = BufferSink::new();
        let doc = extract(
            "kyc.md",
            "see # not a heading\n## Subsection\n# Know Your Customer\n",
            "b",
            &events,
        );
        assert_eq!(doc.title, "Know Your Customer");
    }

    #[test]
    fn missing_heading_falls_back_to_identity_with_warning() {
        let events = BufferSink::new();
        let doc = extract("a/b/sanctions.md", "no heading here\n", "c", &events);
        assert_eq!(doc.title, "sanctions");
        assert_eq!(
            events.take(),
            vec![SyncEvent::TitleFallback {
                identity: "sanctions".into()
            }]
        );
    }

    #[test]
    fn extract_preserves_inputs_verbatim() {
        let events = BufferSink::new();
        let doc = extract("dir/gdpr.md", "# GDPR\nbody", "deadbeef", &events);
        assert_eq!(doc.identity, "gdpr");
        assert_eq!(doc.body, "# GDPR\nbody");
        assert_eq!(doc.version_token, "deadbeef");
        assert_eq!(doc.path, "dir/gdpr.md");
    }
}
