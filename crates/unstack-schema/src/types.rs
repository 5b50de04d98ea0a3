//! Newtype wrappers for the string identifiers that flow through a teardown.
//!
//! All newtypes serialize/deserialize as plain strings so config files and
//! JSON reports stay readable.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        // Lets `HashMap<$name, _>` be queried with a plain `&str`.
        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Unique name of a remote stack, as known to the control plane.
    StackName
);

string_newtype!(
    /// Name of a remote key pair created alongside the stacks.
    KeyName
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn stack_name_display_and_as_str() {
        let name = StackName::new("network");
        assert_eq!(name.to_string(), "network");
        assert_eq!(name.as_str(), "network");
        assert_eq!(name, "network");
    }

    #[test]
    fn stack_name_serializes_as_plain_string() {
        let name = StackName::from("compute");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"compute\"");
        let back: StackName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(StackName::from("db"), 2_usize);
        assert_eq!(map.get("db"), Some(&2));
        assert!(map.get("web").is_none());
    }

    #[test]
    fn key_name_into_inner() {
        let key = KeyName::new("bastion".to_owned());
        assert_eq!(key.into_inner(), "bastion");
    }
}
