use crate::types::StackName;
use serde::{Deserialize, Serialize};

/// A stack to tear down together with the stacks it depends on.
///
/// `depends_on` names the parents: each of them must outlive this stack and is
/// only deleted once this stack is confirmed gone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackDescriptor {
    pub name: StackName,
    #[serde(default)]
    pub depends_on: Vec<StackName>,
}

impl StackDescriptor {
    pub fn new<I, S>(name: impl Into<StackName>, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StackName>,
    {
        Self {
            name: name.into(),
            depends_on: depends_on.into_iter().map(Into::into).collect(),
        }
    }

    /// A stack with no parents.
    pub fn root(name: impl Into<StackName>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_converts_dependency_names() {
        let d = StackDescriptor::new("web", ["api", "cache"]);
        assert_eq!(d.name, "web");
        assert_eq!(d.depends_on, vec![StackName::from("api"), StackName::from("cache")]);
    }

    #[test]
    fn root_has_no_parents() {
        assert!(StackDescriptor::root("network").depends_on.is_empty());
    }

    #[test]
    fn deserializes_without_depends_on() {
        let d: StackDescriptor = serde_json::from_str(r#"{"name":"db"}"#).unwrap();
        assert_eq!(d, StackDescriptor::root("db"));
    }
}
