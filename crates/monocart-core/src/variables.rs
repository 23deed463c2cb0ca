/// A single `key=value` core configuration variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub key: String,
    pub value: String,
}

impl Variable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Parses a `,`-separated list of `key=value` pairs.
///
/// Entries that do not contain exactly one `=` are skipped without
/// reporting; an installation ships this string as static
/// configuration and a malformed entry is not worth failing over.
pub fn parse_variables(raw: &str) -> Vec<Variable> {
    let mut variables = Vec::new();

    for entry in raw.split(',') {
        let mut parts = entry.splitn(3, '=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        variables.push(Variable::new(key, value));
    }

    variables
}
