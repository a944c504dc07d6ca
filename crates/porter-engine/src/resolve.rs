use std::collections::BTreeMap;

use porter_domain::OutputMap;
use serde_json::{Map, Value};

use crate::error::ResolveError;
use crate::values::scalar_to_string;

/// Outputs recorded so far in a run, keyed by resource name.
pub type OutputTable = BTreeMap<String, OutputMap>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed `{ .resource.key[0] }` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    resource: String,
    path: Vec<Segment>,
}

impl Query {
    /// Parse the inside of a query expression, e.g. `.web.ingress.hosts[0]`.
    ///
    /// # Errors
    ///
    /// Returns an error when the expression does not start with a resource
    /// reference or contains a malformed index.
    pub fn parse(expression: &str) -> Result<Self, ResolveError> {
        let text = format!("{{ {} }}", expression.trim());
        let invalid = |reason| ResolveError::InvalidQuery {
            query: text.clone(),
            reason,
        };

        let body = expression
            .trim()
            .strip_prefix('.')
            .ok_or_else(|| invalid("expected a leading '.'"))?;

        let mut segments = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let (digits, tail) = after
                    .split_once(']')
                    .ok_or_else(|| invalid("unterminated index"))?;
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("index must be a non-negative integer"))?;
                segments.push(Segment::Index(index));
                rest = tail.strip_prefix('.').unwrap_or(tail);
                continue;
            }

            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let key = &rest[..end];
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(invalid("empty or malformed key"));
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &rest[end..];
            rest = rest.strip_prefix('.').unwrap_or(rest);
        }

        let mut segments = segments.into_iter();
        let Some(Segment::Key(resource)) = segments.next() else {
            return Err(invalid("expected a resource name"));
        };

        Ok(Self {
            text,
            resource,
            path: segments.collect(),
        })
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn lookup<'a>(&self, output: &'a OutputMap) -> Result<&'a Value, ResolveError> {
        let mut segments = self.path.iter();
        let mut current = match segments.next() {
            None => return Err(self.type_mismatch("a resource output")),
            Some(Segment::Key(key)) => output.get(key).ok_or_else(|| ResolveError::MissingKey {
                query: self.text.clone(),
                key: key.clone(),
            })?,
            Some(Segment::Index(_)) => return Err(self.type_mismatch("a resource output")),
        };

        for segment in segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => {
                    map.get(key).ok_or_else(|| ResolveError::MissingKey {
                        query: self.text.clone(),
                        key: key.clone(),
                    })?
                }
                (Segment::Index(index), Value::Array(items)) => {
                    items.get(*index).ok_or_else(|| ResolveError::IndexOutOfRange {
                        query: self.text.clone(),
                        index: *index,
                    })?
                }
                (_, other) => return Err(self.type_mismatch(kind_of(other))),
            };
        }

        Ok(current)
    }

    fn type_mismatch(&self, found: &'static str) -> ResolveError {
        ResolveError::TypeMismatch {
            query: self.text.clone(),
            found,
        }
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a map",
    }
}

/// Substitutes query expressions in config trees with values from earlier
/// resources' outputs.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    outputs: &'a OutputTable,
    allowed: Option<&'a [String]>,
}

impl<'a> Resolver<'a> {
    /// Resolver that only admits references to `dependencies`.
    #[must_use]
    pub const fn for_dependencies(outputs: &'a OutputTable, dependencies: &'a [String]) -> Self {
        Self {
            outputs,
            allowed: Some(dependencies),
        }
    }

    /// Resolver that may reference any resource with recorded output.
    #[must_use]
    pub const fn unrestricted(outputs: &'a OutputTable) -> Self {
        Self {
            outputs,
            allowed: None,
        }
    }

    /// # Errors
    ///
    /// Returns the first reference that cannot be resolved.
    pub fn resolve_map(&self, raw: &Map<String, Value>) -> Result<Map<String, Value>, ResolveError> {
        raw.iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve_value(value)?)))
            .collect()
    }

    /// # Errors
    ///
    /// Returns the first reference that cannot be resolved.
    pub fn resolve_value(&self, value: &Value) -> Result<Value, ResolveError> {
        match value {
            Value::String(text) => self.resolve_string(text),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => self.resolve_map(map).map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, text: &str) -> Result<Value, ResolveError> {
        let spans = find_expressions(text);
        if spans.is_empty() {
            return Ok(Value::String(text.to_string()));
        }

        if let [(start, end)] = spans.as_slice() {
            if text[..*start].trim().is_empty() && text[*end..].trim().is_empty() {
                return self.evaluate(&text[start + 1..end - 1]).cloned();
            }
        }

        let mut rendered = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end) in spans {
            rendered.push_str(&text[cursor..start]);
            rendered.push_str(&scalar_to_string(self.evaluate(&text[start + 1..end - 1])?));
            cursor = end;
        }
        rendered.push_str(&text[cursor..]);
        Ok(Value::String(rendered))
    }

    fn evaluate(&self, expression: &str) -> Result<&'a Value, ResolveError> {
        let query = Query::parse(expression)?;
        if let Some(allowed) = self.allowed {
            if !allowed.iter().any(|name| name == query.resource()) {
                return Err(ResolveError::UndeclaredDependency {
                    query: query.text.clone(),
                    resource: query.resource.clone(),
                });
            }
        }

        let output =
            self.outputs
                .get(query.resource())
                .ok_or_else(|| ResolveError::UnknownResource {
                    query: query.text.clone(),
                    resource: query.resource.clone(),
                })?;
        query.lookup(output)
    }
}

/// Byte spans of `{ .… }` expressions in `text`, braces included.
fn find_expressions(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some(open) = text[offset..].find('{') {
        let start = offset + open;
        let inner = &text[start + 1..];
        if !inner.trim_start().starts_with('.') {
            offset = start + 1;
            continue;
        }
        match inner.find(['}', '{']) {
            Some(close) if inner.as_bytes()[close] == b'}' => {
                let end = start + 1 + close + 1;
                spans.push((start, end));
                offset = end;
            }
            _ => offset = start + 1,
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use serde_json::{Value, json};

    use super::{OutputTable, Query, Resolver};
    use crate::error::ResolveError;

    fn outputs() -> OutputTable {
        let mut table = OutputTable::new();
        table.insert(
            "web".to_string(),
            json!({
                "ingress": {
                    "porter_hosts": ["web-abc.porter.run"],
                    "hosts": [],
                },
                "service": {"port": 80},
            })
            .as_object()
            .cloned()
            .expect("object"),
        );
        table
    }

    #[test]
    fn parses_keys_and_indexes() {
        let query = Query::parse(" .web.ingress.porter_hosts[0] ").expect("query");
        assert_eq!(query.resource(), "web");
    }

    #[test]
    fn rejects_malformed_queries() {
        assert!(Query::parse("web.ingress").is_err());
        assert!(Query::parse(".web.hosts[x]").is_err());
        assert!(Query::parse(".web.hosts[0").is_err());
    }

    #[test]
    fn whole_string_query_keeps_value_type() {
        let table = outputs();
        let deps = vec!["web".to_string()];
        let resolver = Resolver::for_dependencies(&table, &deps);

        let resolved = resolver
            .resolve_value(&json!({"port": "{ .web.service.port }"}))
            .expect("resolved");
        assert_eq!(resolved, json!({"port": 80}));
    }

    #[test]
    fn embedded_queries_render_as_strings() {
        let table = outputs();
        let deps = vec!["web".to_string()];
        let resolver = Resolver::for_dependencies(&table, &deps);

        let resolved = resolver
            .resolve_value(&json!("https://{ .web.ingress.porter_hosts[0] }:{ .web.service.port }"))
            .expect("resolved");
        assert_eq!(resolved, Value::String("https://web-abc.porter.run:80".to_string()));
    }

    #[test]
    fn plain_braces_are_left_alone() {
        let table = outputs();
        let resolver = Resolver::unrestricted(&table);
        let text = json!("{\"json\": true} and {name}");
        assert_eq!(resolver.resolve_value(&text).expect("resolved"), text);
    }

    #[test]
    fn only_declared_dependencies_are_visible() {
        let table = outputs();
        let resolver = Resolver::for_dependencies(&table, &[]);
        let error = resolver
            .resolve_value(&json!("{ .web.service.port }"))
            .expect_err("undeclared");
        assert!(matches!(error, ResolveError::UndeclaredDependency { .. }));
    }

    #[test]
    fn missing_paths_are_errors() {
        let table = outputs();
        let resolver = Resolver::unrestricted(&table);

        let error = resolver
            .resolve_value(&json!("{ .web.ingress.hosts[0] }"))
            .expect_err("empty array");
        assert!(matches!(error, ResolveError::IndexOutOfRange { index: 0, .. }));

        let error = resolver
            .resolve_value(&json!("{ .web.missing }"))
            .expect_err("missing key");
        assert!(matches!(error, ResolveError::MissingKey { .. }));

        let error = resolver
            .resolve_value(&json!("{ .db.url }"))
            .expect_err("no output");
        assert!(matches!(error, ResolveError::UnknownResource { .. }));
    }
}
