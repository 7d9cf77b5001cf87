//! InSpec control-block extraction
//!
//! Baselines are Ruby files made of `control '<id>' do ... end` blocks. The
//! knowledge writer and the simulator only need the id, the title and the
//! raw block text, so a line-anchored scan is enough: a block ends at the
//! first `end` in column zero.

use crate::control::{ControlEntry, ControlId};
use once_cell::sync::Lazy;
use regex::Regex;

static CONTROL_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?ms)^control\s*\(?\s*['"]([^'"]+)['"]\s*\)?\s*do\b.*?^end\b"#)
        .expect("control block regex is valid")
});

static TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"title\s*\(?\s*['"](.*?)['"]"#)
        .expect("title regex is valid")
});

/// A control block found in InSpec source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedControl {
    pub id: ControlId,
    pub title: Option<String>,
    pub code: String,
}

impl ParsedControl {
    /// Convert into a manifest entry, using the title as description
    #[must_use]
    pub fn into_entry(self) -> ControlEntry {
        ControlEntry {
            id: self.id,
            description: self.title.unwrap_or_default(),
            implementation: Some(self.code),
        }
    }
}

/// Extract every control block in `source`, in file order
#[must_use]
pub fn parse_controls(source: &str) -> Vec<ParsedControl> {
    CONTROL_BLOCK
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?;
            let code = whole.as_str().trim().to_string();
            Some(ParsedControl {
                id: ControlId::new(id.as_str()),
                title: extract_title(&code),
                code,
            })
        })
        .collect()
}

/// The `title '...'` of a control block, if it has one
#[must_use]
pub fn extract_title(code: &str) -> Option<String> {
    TITLE
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = "\
# frozen_string_literal: true

control 'V-230222' do
  title 'RHEL 9 must be a vendor-supported release.'
  impact 0.7
  describe file('/etc/redhat-release') do
    its('content') { should match(/Red Hat Enterprise Linux release 9/) }
  end
end

control \"V-230225\" do
  title \"RHEL 9 /etc/login.defs must have mode 0644 or less permissive.\"
  describe file('/etc/login.defs') do
    its('mode') { should cmp <= '0644' }
  end
end
";

    #[test]
    fn parses_all_blocks_including_nested_ends() {
        let controls = parse_controls(PROFILE);
        assert_eq!(controls.len(), 2);

        assert_eq!(controls[0].id.as_str(), "V-230222");
        assert_eq!(
            controls[0].title.as_deref(),
            Some("RHEL 9 must be a vendor-supported release.")
        );
        assert!(controls[0].code.starts_with("control 'V-230222' do"));
        assert!(controls[0].code.ends_with("end"));
        assert!(controls[0].code.contains("redhat-release"));
        assert!(!controls[0].code.contains("V-230225"));

        assert_eq!(controls[1].id.as_str(), "V-230225");
    }

    #[test]
    fn block_without_title() {
        let controls = parse_controls("control 'V-1' do\n  impact 0.5\nend\n");
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].title, None);
        assert_eq!(controls[0].clone().into_entry().description, "");
    }

    #[test]
    fn no_controls_in_plain_text() {
        assert!(parse_controls("name: my-baseline\nversion: 0.1.0\n").is_empty());
    }

    #[test]
    fn title_extraction() {
        assert_eq!(
            extract_title("control 'x' do\n  title('Use FIPS')\nend"),
            Some("Use FIPS".to_string())
        );
        assert_eq!(extract_title("control 'x' do\n  title ''\nend"), None);
    }
}
