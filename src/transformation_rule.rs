use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A literal keyword rewrite applied while producing the final schema form.
///
/// A rule matches when a keyword equals `keyword` and its value equals
/// `value` exactly; the whole keyword is then replaced by `replacement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub keyword: String,
    pub value: Value,
    pub replacement: Map<String, Value>,
}

impl RewriteRule {
    pub fn new(keyword: &str, value: Value, replacement: Value) -> Self {
        let replacement = match replacement {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(keyword.to_string(), other);
                map
            }
        };

        Self {
            keyword: keyword.to_string(),
            value,
            replacement,
        }
    }

    /// Shorthand for the common `type: <from>` rewrite.
    pub fn for_type(from: &str, replacement: Value) -> Self {
        Self::new("type", Value::String(from.to_string()), replacement)
    }

    pub fn matches(&self, keyword: &str, value: &Value) -> bool {
        self.keyword == keyword && &self.value == value
    }
}

/// Find the first rule matching `(keyword, value)` and return its replacement.
pub fn first_match<'a>(
    rules: &'a [RewriteRule],
    keyword: &str,
    value: &Value,
) -> Option<&'a Map<String, Value>> {
    rules
        .iter()
        .find(|rule| rule.matches(keyword, value))
        .map(|rule| &rule.replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rewrite_rule_creation() {
        let rule = RewriteRule::for_type("text", json!({ "type": "string" }));

        assert_eq!(rule.keyword, "type");
        assert_eq!(rule.value, json!("text"));
        assert_eq!(Value::Object(rule.replacement.clone()), json!({ "type": "string" }));
    }

    #[test]
    fn test_scalar_replacement_is_keyed_by_keyword() {
        let rule = RewriteRule::new("format", json!("datetime"), json!("date-time"));
        assert_eq!(
            Value::Object(rule.replacement),
            json!({ "format": "date-time" })
        );
    }

    #[test]
    fn test_matches_requires_exact_value() {
        let rule = RewriteRule::for_type("code", json!({ "type": "string" }));

        assert!(rule.matches("type", &json!("code")));
        assert!(!rule.matches("type", &json!("Code")));
        assert!(!rule.matches("format", &json!("code")));
        assert!(!rule.matches("type", &json!(["code"])));
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            RewriteRule::for_type("json", json!({ "type": "object", "properties": {} })),
            RewriteRule::for_type("json", json!({ "type": "string" })),
        ];

        let replacement = first_match(&rules, "type", &json!("json")).unwrap();
        assert_eq!(replacement.get("type"), Some(&json!("object")));
        assert!(first_match(&rules, "type", &json!("number")).is_none());
    }
}
