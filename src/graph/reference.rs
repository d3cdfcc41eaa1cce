//! Reference detection for declared property values.
//!
//! A property value is either a literal or a reference to another
//! node's output. References are written as a whole-string
//! `${node.output}` (same unit) or `${unit/node.output}` (cross-unit).
//! Values are never resolved here; resolution happens only after the
//! producer has been provisioned.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// A declared property value: a literal, or a reference to a
/// producer's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A reference edge to another node's output.
    Reference {
        /// The producing node.
        producer: NodeId,
        /// The output key on the producer.
        output: String,
    },
    /// A plain literal value, passed through to the provider unchanged.
    Literal(serde_json::Value),
}

/// A dependency edge from a consumer's property to a producer's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// The consuming node.
    pub consumer: NodeId,
    /// The property on the consumer holding the reference.
    pub property: String,
    /// The producing node.
    pub producer: NodeId,
    /// The output key on the producer.
    pub output: String,
}

/// A reference expression as written in configuration, before the
/// producer has been qualified against its unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    /// Node path: `name` (same unit) or `unit/name`.
    pub node: String,
    /// Output key.
    pub output: String,
}

impl RawReference {
    /// Parses a string as a reference expression.
    ///
    /// Returns `Ok(None)` for plain literals, `Ok(Some(_))` for a
    /// well-formed whole-string reference, and `Err` when the string
    /// contains reference syntax but is malformed (including mid-string
    /// interpolation, which is not supported).
    ///
    /// # Errors
    ///
    /// Returns a description of the syntax problem.
    pub fn parse(value: &str) -> std::result::Result<Option<Self>, String> {
        let is_wrapped = value.starts_with("${") && value.ends_with('}');

        if !is_wrapped {
            if value.contains("${") {
                return Err(String::from(
                    "references must be whole-string values; interpolation inside a literal is not supported",
                ));
            }
            return Ok(None);
        }

        let inner = &value[2..value.len() - 1];
        if inner.contains("${") {
            return Err(String::from("nested reference expressions are not supported"));
        }

        let Some((node, output)) = inner.rsplit_once('.') else {
            return Err(format!("expected 'node.output' inside '{value}'"));
        };

        if node.is_empty() || output.is_empty() {
            return Err(format!("empty node or output segment in '{value}'"));
        }

        if node.matches('/').count() > 1 {
            return Err(format!("node path '{node}' has more than one '/' segment"));
        }

        Ok(Some(Self {
            node: node.to_string(),
            output: output.to_string(),
        }))
    }

    /// Qualifies the node path against the consumer's unit, producing a
    /// concrete producer identifier.
    #[must_use]
    pub fn qualify(&self, default_unit: &str) -> NodeId {
        if self.node.contains('/') {
            NodeId::from_qualified(self.node.clone())
        } else {
            NodeId::new(default_unit, &self.node)
        }
    }
}

impl PropertyValue {
    /// Classifies a declared JSON value as a literal or a reference,
    /// qualifying same-unit references against `default_unit`.
    ///
    /// # Errors
    ///
    /// Returns a description of the syntax problem when the value uses
    /// malformed reference syntax.
    pub fn classify(
        value: &serde_json::Value,
        default_unit: &str,
    ) -> std::result::Result<Self, String> {
        if let serde_json::Value::String(s) = value
            && let Some(raw) = RawReference::parse(s)?
        {
            return Ok(Self::Reference {
                producer: raw.qualify(default_unit),
                output: raw.output,
            });
        }

        Ok(Self::Literal(value.clone()))
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.consumer, self.property, self.producer, self.output
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(RawReference::parse("plain string"), Ok(None));
        assert_eq!(RawReference::parse("8080"), Ok(None));
    }

    #[test]
    fn test_parse_same_unit_reference() {
        let raw = RawReference::parse("${queue.arn}").unwrap().unwrap();
        assert_eq!(raw.node, "queue");
        assert_eq!(raw.output, "arn");
        assert_eq!(raw.qualify("messaging"), NodeId::new("messaging", "queue"));
    }

    #[test]
    fn test_parse_cross_unit_reference() {
        let raw = RawReference::parse("${messaging/queue.arn}").unwrap().unwrap();
        assert_eq!(raw.node, "messaging/queue");
        assert_eq!(raw.qualify("monitoring"), NodeId::new("messaging", "queue"));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(RawReference::parse("${queue}").is_err());
        assert!(RawReference::parse("${.arn}").is_err());
        assert!(RawReference::parse("${queue.}").is_err());
        assert!(RawReference::parse("prefix-${queue.arn}").is_err());
    }

    #[test]
    fn test_classify_property_values() {
        let literal = PropertyValue::classify(&serde_json::json!(300), "messaging").unwrap();
        assert_eq!(literal, PropertyValue::Literal(serde_json::json!(300)));

        let reference =
            PropertyValue::classify(&serde_json::json!("${queue.url}"), "messaging").unwrap();
        assert_eq!(
            reference,
            PropertyValue::Reference {
                producer: NodeId::new("messaging", "queue"),
                output: String::from("url"),
            }
        );
    }
}
