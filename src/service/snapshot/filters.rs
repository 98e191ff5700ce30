use crate::models::Alert;
use regex::Regex;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

impl Operator {
    /// Longer operators first, so `!=` is not read as `!` followed by `=`.
    const ALL: [(&'static str, Operator); 4] = [
        ("!=", Operator::NotEqual),
        ("!~", Operator::NotRegex),
        ("=~", Operator::Regex),
        ("=", Operator::Equal),
    ];
}

#[derive(Clone, Debug)]
enum FilterValue {
    Literal(String),
    Pattern(Regex),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Subject {
    Label(String),
    Receiver,
    State,
    Alertmanager,
    SilenceAuthor,
    SilenceJira,
}

/// A single `name<op>value` filter from the query string.
#[derive(Clone, Debug)]
pub struct Filter {
    text: String,
    matcher: Option<(Subject, Operator, FilterValue)>,
    hits: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStatus {
    pub text: String,
    pub hits: usize,
    pub is_valid: bool,
}

pub fn parse_filter(text: &str) -> Filter {
    Filter {
        text: text.to_owned(),
        matcher: parse_matcher(text.trim()),
        hits: 0,
    }
}

fn parse_matcher(text: &str) -> Option<(Subject, Operator, FilterValue)> {
    let (position, token, operator) = text.char_indices().find_map(|(position, _)| {
        Operator::ALL
            .iter()
            .find(|(token, _)| text[position..].starts_with(token))
            .map(|(token, operator)| (position, *token, *operator))
    })?;

    let name = text[..position].trim();
    let value = text[position + token.len()..].trim();

    let subject = match name {
        "" => return None,
        "@receiver" => Subject::Receiver,
        "@state" => Subject::State,
        "@alertmanager" => Subject::Alertmanager,
        "@silence_author" => Subject::SilenceAuthor,
        "@silence_jira" => Subject::SilenceJira,
        name if name.starts_with('@') => return None,
        name => Subject::Label(name.to_owned()),
    };

    let value = match operator {
        Operator::Equal | Operator::NotEqual => FilterValue::Literal(value.to_owned()),
        Operator::Regex | Operator::NotRegex => {
            FilterValue::Pattern(Regex::new(&format!("^(?:{value})$")).ok()?)
        }
    };

    Some((subject, operator, value))
}

impl Filter {
    pub fn is_valid(&self) -> bool {
        self.matcher.is_some()
    }

    /// Whether the alert passes this filter. Invalid filters pass everything.
    pub fn matches(&self, alert: &Alert) -> bool {
        let Some((subject, operator, value)) = &self.matcher else {
            return true;
        };

        let values = subject_values(subject, alert);
        let found = values.iter().any(|candidate| match value {
            FilterValue::Literal(literal) => candidate == literal,
            FilterValue::Pattern(regex) => regex.is_match(candidate),
        });

        match operator {
            Operator::Equal | Operator::Regex => found,
            Operator::NotEqual | Operator::NotRegex => !found,
        }
    }

    /// Like `matches`, but counts hits of valid filters.
    pub fn apply(&mut self, alert: &Alert) -> bool {
        let matched = self.matches(alert);
        if matched && self.is_valid() {
            self.hits += 1;
        }
        matched
    }

    pub fn status(&self) -> FilterStatus {
        FilterStatus {
            text: self.text.clone(),
            hits: self.hits,
            is_valid: self.is_valid(),
        }
    }
}

fn subject_values<'a>(subject: &Subject, alert: &'a Alert) -> Vec<&'a str> {
    match subject {
        Subject::Label(name) => alert.labels.get(name).map(String::as_str).into_iter().collect(),
        Subject::Receiver => vec![alert.receiver.as_str()],
        Subject::State => vec![alert.state.as_str()],
        Subject::Alertmanager => alert
            .alertmanager
            .iter()
            .map(|instance| instance.name.as_str())
            .collect(),
        Subject::SilenceAuthor => alert
            .alertmanager
            .iter()
            .flat_map(|instance| instance.silences.values())
            .map(|silence| silence.created_by.as_str())
            .collect(),
        Subject::SilenceJira => alert
            .alertmanager
            .iter()
            .flat_map(|instance| instance.silences.values())
            .filter_map(|silence| silence.jira_id.as_deref())
            .collect(),
    }
}
