use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing string as an opaque identifier.
            ///
            /// Callers are responsible for uniqueness; the control plane
            /// never validates the shape of an id minted elsewhere.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrows the identifier as a plain string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(JobId, "Opaque job identifier, unique within a `JobTracker`.");
opaque_id!(
    ArtifactId,
    "Opaque artifact identifier, assigned by `ArtifactStore::store`."
);
opaque_id!(
    EntityId,
    "Opaque principal identifier (user or org) scoped by `QuotaManager`."
);
opaque_id!(NodeId, "Opaque worker node identifier.");
opaque_id!(RegionId, "Opaque region identifier.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_inner_string() {
        let id = JobId::from("job-1");
        assert_eq!(id.as_str(), "job-1");
        assert_eq!(id.to_string(), "job-1");
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(JobId::new("a"), JobId::new("a"));
        assert_ne!(JobId::new("a"), JobId::new("b"));
    }
}
