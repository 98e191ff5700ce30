use regex::Regex;

#[derive(Clone, Debug)]
pub struct JiraRule {
    regex: Regex,
    url: String,
}

impl JiraRule {
    pub fn new(regex: Regex, url: impl Into<String>) -> Self {
        Self {
            regex,
            url: url.into(),
        }
    }

    /// The first match of the rule's regex in `text`.
    pub fn find(&self, text: &str) -> Option<String> {
        self.regex.find(text).map(|found| found.as_str().to_owned())
    }

    pub fn url_for(&self, id: &str) -> String {
        if self.url.contains("{id}") {
            self.url.replace("{id}", id)
        } else {
            format!("{}/browse/{id}", self.url.trim_end_matches('/'))
        }
    }
}

/// Parses `regex@url`. The split happens at the last `@` before the URL's
/// scheme, so regexes may contain `@` themselves.
pub fn parse_jira_rule(rule: &str) -> Result<JiraRule, String> {
    let split = ["@http://", "@https://"]
        .iter()
        .filter_map(|marker| rule.rfind(marker))
        .max()
        .or_else(|| rule.rfind('@'))
        .ok_or_else(|| format!("Missing '@' between regex and URL in \"{rule}\""))?;

    let (pattern, url) = (&rule[..split], &rule[split + 1..]);
    if pattern.is_empty() || url.is_empty() {
        return Err(format!("Expected regex@url, got \"{rule}\""));
    }

    let regex = Regex::new(pattern).map_err(|err| format!("Invalid regex \"{pattern}\": {err}"))?;

    Ok(JiraRule::new(regex, url))
}
