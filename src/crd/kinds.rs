//! # Referencing Kinds
//!
//! The fixed table of resource kinds that may authenticate with a credential secret.
//!
//! These kinds are owned by their own controllers. This controller only watches
//! and reads them, so they are addressed dynamically instead of through typed CRDs.

use kube::core::ApiResource;
use std::fmt;

/// API group of the referencing resources
pub const AIVEN_GROUP: &str = "aiven.io";

/// API version of the referencing resources
pub const AIVEN_VERSION: &str = "v1alpha1";

/// A resource kind that declares `spec.authSecretRef`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceKind {
    /// Kind as it appears in `kind:` (e.g. `KafkaTopic`)
    pub kind: &'static str,
    /// Lower-case plural used in API paths (e.g. `kafkatopics`)
    pub plural: &'static str,
}

impl ReferenceKind {
    #[must_use]
    pub const fn new(kind: &'static str, plural: &'static str) -> Self {
        Self { kind, plural }
    }

    /// Dynamic API resource used to list and watch this kind
    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: AIVEN_GROUP.to_string(),
            version: AIVEN_VERSION.to_string(),
            api_version: format!("{AIVEN_GROUP}/{AIVEN_VERSION}"),
            kind: self.kind.to_string(),
            plural: self.plural.to_string(),
        }
    }

    /// Look up a kind from the table by kind name or plural, ignoring case
    #[must_use]
    pub fn find(name: &str) -> Option<&'static ReferenceKind> {
        REFERENCE_KINDS
            .iter()
            .find(|k| k.kind.eq_ignore_ascii_case(name) || k.plural.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind)
    }
}

/// Every kind checked before a protected secret is released.
///
/// Order is fixed and carries no priority: the first kind reporting a live
/// reference short-circuits the check.
pub const REFERENCE_KINDS: [ReferenceKind; 11] = [
    ReferenceKind::new("Kafka", "kafkas"),
    ReferenceKind::new("KafkaACL", "kafkaacls"),
    ReferenceKind::new("KafkaTopic", "kafkatopics"),
    ReferenceKind::new("KafkaSchema", "kafkaschemas"),
    ReferenceKind::new("Project", "projects"),
    ReferenceKind::new("ProjectVPC", "projectvpcs"),
    ReferenceKind::new("ServiceIntegration", "serviceintegrations"),
    ReferenceKind::new("ServiceUser", "serviceusers"),
    ReferenceKind::new("PG", "pgs"),
    ReferenceKind::new("Database", "databases"),
    ReferenceKind::new("ConnectionPool", "connectionpools"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_kind_table_is_unique() {
        let kinds: HashSet<_> = REFERENCE_KINDS.iter().map(|k| k.kind).collect();
        let plurals: HashSet<_> = REFERENCE_KINDS.iter().map(|k| k.plural).collect();
        assert_eq!(kinds.len(), REFERENCE_KINDS.len());
        assert_eq!(plurals.len(), REFERENCE_KINDS.len());
    }

    #[test]
    fn test_api_resource_for_kind() {
        let ar = ReferenceKind::new("Database", "databases").api_resource();
        assert_eq!(ar.api_version, "aiven.io/v1alpha1");
        assert_eq!(ar.plural, "databases");
        assert_eq!(ar.kind, "Database");
    }

    #[test]
    fn test_find_by_kind_or_plural() {
        assert_eq!(ReferenceKind::find("pg").map(|k| k.plural), Some("pgs"));
        assert_eq!(
            ReferenceKind::find("connectionpools").map(|k| k.kind),
            Some("ConnectionPool")
        );
        assert!(ReferenceKind::find("Redis").is_none());
    }
}
