//! Rule atoms and combinators.
//!
//! A rule tree is either a single atom (`regexp` or `subnet` test) or a
//! binary combination of two subtrees. The JSON form is a discriminated
//! union without a tag: decoding tries the atom shape first and falls back
//! to the combination shape.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Deserialize;
use serde::de::{self, Deserializer};

use crate::error::RoutingError;

/// Atom kind: what the rule tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Unanchored regex match against the selected variable.
    Regexp,
    /// IPv4 CIDR membership test against the host.
    Subnet,
}

/// Which part of the destination a `regexp` rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    Host,
    Port,
    Addr,
}

/// A single rule atom.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub rule: RuleKind,
    #[serde(default)]
    pub variable: Option<Variable>,
    pub content: String,
    #[serde(default)]
    pub negate: bool,
}

impl Rule {
    /// Evaluates the atom against a destination `host:port` string.
    pub fn evaluate(&self, addr: &str) -> Result<bool, RoutingError> {
        let (host, port) = hopper_proto::split_host_port(addr)?;

        match self.rule {
            RuleKind::Regexp => {
                let port = port.to_string();
                let subject = match self.variable.ok_or(RoutingError::MissingVariable)? {
                    Variable::Host => host,
                    Variable::Port => port.as_str(),
                    Variable::Addr => addr,
                };
                let re = regex::Regex::new(&self.content).map_err(|e| RoutingError::Regex {
                    pattern: self.content.clone(),
                    source: Box::new(e),
                })?;
                Ok(self.negate != re.is_match(subject))
            }
            RuleKind::Subnet => {
                // A non-IPv4 host never belongs to a subnet; this is a miss,
                // not an error, and negation does not apply.
                let Ok(host) = host.parse::<Ipv4Addr>() else {
                    return Ok(false);
                };
                let net = self
                    .content
                    .parse::<Ipv4Net>()
                    .map_err(|_| RoutingError::Cidr(self.content.clone()))?;
                Ok(self.negate != net.contains(&host))
            }
        }
    }
}

/// Boolean operator joining two rule subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
}

impl<'de> Deserialize<'de> for Op {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "&" | "&&" => Ok(Op::And),
            "|" | "||" => Ok(Op::Or),
            _ if s.eq_ignore_ascii_case("and") => Ok(Op::And),
            _ if s.eq_ignore_ascii_case("or") => Ok(Op::Or),
            _ => Err(de::Error::custom(format!("unknown operator '{s}'"))),
        }
    }
}

/// Binary combination of two rule subtrees.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCombo {
    pub rule1: RuleNode,
    pub op: Op,
    pub rule2: RuleNode,
}

/// A rule tree node.
#[derive(Debug, Clone)]
pub enum RuleNode {
    Atom(Rule),
    Combo(Box<RuleCombo>),
}

impl RuleNode {
    /// Evaluates the tree against a destination `host:port` string.
    ///
    /// Both children of a combination are evaluated; an error in either
    /// child aborts the whole evaluation.
    pub fn evaluate(&self, addr: &str) -> Result<bool, RoutingError> {
        match self {
            RuleNode::Atom(rule) => rule.evaluate(addr),
            RuleNode::Combo(combo) => {
                let left = combo.rule1.evaluate(addr)?;
                let right = combo.rule2.evaluate(addr)?;
                Ok(match combo.op {
                    Op::And => left && right,
                    Op::Or => left || right,
                })
            }
        }
    }
}

impl<'de> Deserialize<'de> for RuleNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match serde_json::from_value::<Rule>(value.clone()) {
            Ok(atom) => Ok(RuleNode::Atom(atom)),
            Err(atom_err) => match serde_json::from_value::<RuleCombo>(value) {
                Ok(combo) => Ok(RuleNode::Combo(Box::new(combo))),
                Err(combo_err) => Err(de::Error::custom(format!(
                    "neither a rule ({atom_err}) nor a rule combination ({combo_err})"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(json: &str) -> Rule {
        serde_json::from_str(json).unwrap()
    }

    fn node(json: &str) -> RuleNode {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn regexp_host_match() {
        let r = atom(r#"{"rule":"regexp","variable":"host","content":"^foo$"}"#);
        assert!(r.evaluate("foo:80").unwrap());
        assert!(!r.evaluate("foobar:80").unwrap());
    }

    #[test]
    fn regexp_is_unanchored() {
        let r = atom(r#"{"rule":"regexp","variable":"host","content":"corp"}"#);
        assert!(r.evaluate("intra.corp.example:443").unwrap());
    }

    #[test]
    fn regexp_case_insensitive_flag() {
        let r = atom(r#"{"rule":"regexp","variable":"host","content":"(?i)^EXAMPLE\\."}"#);
        assert!(r.evaluate("example.com:80").unwrap());
    }

    #[test]
    fn regexp_port_negated() {
        let r = atom(r#"{"rule":"regexp","variable":"port","content":"^(80|443)$","negate":true}"#);
        assert!(r.evaluate("host:22").unwrap());
        assert!(!r.evaluate("host:443").unwrap());
    }

    #[test]
    fn regexp_addr_variable() {
        let r = atom(r#"{"rule":"regexp","variable":"addr","content":"^10\\.0\\.0\\.1:22$"}"#);
        assert!(r.evaluate("10.0.0.1:22").unwrap());
        assert!(!r.evaluate("10.0.0.1:23").unwrap());
    }

    #[test]
    fn regexp_without_variable_errors() {
        let r = atom(r#"{"rule":"regexp","content":"^foo$"}"#);
        assert!(matches!(
            r.evaluate("foo:80"),
            Err(RoutingError::MissingVariable)
        ));
    }

    #[test]
    fn regexp_bad_pattern_errors() {
        let r = atom(r#"{"rule":"regexp","variable":"host","content":"("}"#);
        assert!(matches!(r.evaluate("foo:80"), Err(RoutingError::Regex { .. })));
    }

    #[test]
    fn subnet_membership() {
        let r = atom(r#"{"rule":"subnet","content":"10.0.0.0/8"}"#);
        assert!(r.evaluate("10.1.2.3:80").unwrap());
        assert!(!r.evaluate("11.1.2.3:80").unwrap());
    }

    #[test]
    fn subnet_non_ipv4_host_is_false() {
        let r = atom(r#"{"rule":"subnet","content":"10.0.0.0/8"}"#);
        assert!(!r.evaluate("example.com:80").unwrap());
        // Negation does not turn the miss into a match.
        let r = atom(r#"{"rule":"subnet","content":"10.0.0.0/8","negate":true}"#);
        assert!(!r.evaluate("example.com:80").unwrap());
    }

    #[test]
    fn subnet_negated() {
        let r = atom(r#"{"rule":"subnet","content":"10.0.0.0/8","negate":true}"#);
        assert!(!r.evaluate("10.1.2.3:80").unwrap());
        assert!(r.evaluate("192.168.0.1:80").unwrap());
    }

    #[test]
    fn subnet_bad_cidr_errors() {
        let r = atom(r#"{"rule":"subnet","content":"10.0.0.0/33"}"#);
        assert!(matches!(r.evaluate("10.0.0.1:80"), Err(RoutingError::Cidr(_))));
    }

    #[test]
    fn negation_inverts_atoms() {
        for json in [
            r#"{"rule":"regexp","variable":"host","content":"^foo$"}"#,
            r#"{"rule":"regexp","variable":"port","content":"^80$"}"#,
        ] {
            let plain = atom(json);
            let mut negated = plain.clone();
            negated.negate = !negated.negate;
            for addr in ["foo:80", "bar:443", "10.0.0.9:80", "192.168.1.1:22"] {
                assert_eq!(
                    plain.evaluate(addr).unwrap(),
                    !negated.evaluate(addr).unwrap(),
                    "rule {json} addr {addr}"
                );
            }
        }

        // Subnet atoms invert only over IPv4 hosts; non-IPv4 hosts are a
        // fixed miss either way.
        let plain = atom(r#"{"rule":"subnet","content":"10.0.0.0/8"}"#);
        let mut negated = plain.clone();
        negated.negate = true;
        for addr in ["10.0.0.9:80", "192.168.1.1:22"] {
            assert_eq!(
                plain.evaluate(addr).unwrap(),
                !negated.evaluate(addr).unwrap(),
                "addr {addr}"
            );
        }
    }

    #[test]
    fn combo_and_or() {
        let n = node(
            r#"{"rule1":{"rule":"regexp","variable":"host","content":"^foo$"},
                "op":"AND",
                "rule2":{"rule":"regexp","variable":"port","content":"^80$"}}"#,
        );
        assert!(n.evaluate("foo:80").unwrap());
        assert!(!n.evaluate("foo:81").unwrap());

        let n = node(
            r#"{"rule1":{"rule":"regexp","variable":"host","content":"^foo$"},
                "op":"or",
                "rule2":{"rule":"subnet","content":"10.0.0.0/8"}}"#,
        );
        assert!(n.evaluate("foo:80").unwrap());
        assert!(n.evaluate("10.0.0.1:80").unwrap());
        assert!(!n.evaluate("bar:80").unwrap());
    }

    #[test]
    fn combo_operator_spellings() {
        for op in ["AND", "and", "And", "&", "&&"] {
            let n = node(&format!(
                r#"{{"rule1":{{"rule":"regexp","variable":"host","content":"^a$"}},
                    "op":"{op}",
                    "rule2":{{"rule":"regexp","variable":"port","content":"^1$"}}}}"#
            ));
            assert!(n.evaluate("a:1").unwrap());
            assert!(!n.evaluate("a:2").unwrap());
        }
        for op in ["OR", "or", "Or", "|", "||"] {
            let n = node(&format!(
                r#"{{"rule1":{{"rule":"regexp","variable":"host","content":"^a$"}},
                    "op":"{op}",
                    "rule2":{{"rule":"regexp","variable":"port","content":"^1$"}}}}"#
            ));
            assert!(n.evaluate("b:1").unwrap());
            assert!(!n.evaluate("b:2").unwrap());
        }
    }

    #[test]
    fn combo_unknown_operator_rejected_at_decode() {
        let result: Result<RuleNode, _> = serde_json::from_str(
            r#"{"rule1":{"rule":"regexp","variable":"host","content":"a"},
                "op":"XOR",
                "rule2":{"rule":"regexp","variable":"host","content":"b"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn combo_child_error_propagates() {
        let n = node(
            r#"{"rule1":{"rule":"subnet","content":"not-a-cidr"},
                "op":"OR",
                "rule2":{"rule":"regexp","variable":"host","content":"^foo$"}}"#,
        );
        assert!(n.evaluate("10.0.0.1:80").is_err());
    }

    #[test]
    fn nested_combo_decodes() {
        let n = node(
            r#"{"rule1":{"rule1":{"rule":"regexp","variable":"host","content":"^a$"},
                         "op":"OR",
                         "rule2":{"rule":"regexp","variable":"host","content":"^b$"}},
                "op":"AND",
                "rule2":{"rule":"regexp","variable":"port","content":"^80$"}}"#,
        );
        assert!(n.evaluate("a:80").unwrap());
        assert!(n.evaluate("b:80").unwrap());
        assert!(!n.evaluate("c:80").unwrap());
        assert!(!n.evaluate("a:81").unwrap());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<RuleNode, _> = serde_json::from_str(
            r#"{"rule":"regexp","variable":"host","content":"a","bogus":1}"#,
        );
        assert!(result.is_err());
    }
}
