//! # Status Command
//!
//! Shows the deletion state and finalizers of a secret, plus the verdict the
//! controller would reach on its next reconciliation. Nothing is written.

use crate::OutputFormat;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::{Client, ResourceExt};
use secret_protection_controller::constants::SECRET_PROTECTION_FINALIZER;
use secret_protection_controller::controller::reconciler::{
    first_holder, has_finalizer, is_marked_for_deletion,
};
use secret_protection_controller::crd::{ReferenceKind, REFERENCE_KINDS};
use secret_protection_controller::store::{ApiReferenceLookup, KubeSecretStore, SecretStore};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    name: String,
    namespace: String,
    exists: bool,
    deletion_requested: bool,
    protected: bool,
    finalizers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    held_by: Option<String>,
    verdict: &'static str,
}

fn build_report(
    namespace: &str,
    name: &str,
    secret: Option<&Secret>,
    holder: Option<&ReferenceKind>,
) -> StatusReport {
    let Some(secret) = secret else {
        return StatusReport {
            name: name.to_string(),
            namespace: namespace.to_string(),
            exists: false,
            deletion_requested: false,
            protected: false,
            finalizers: Vec::new(),
            held_by: None,
            verdict: "gone",
        };
    };

    let deletion_requested = is_marked_for_deletion(secret);
    let protected = has_finalizer(secret, SECRET_PROTECTION_FINALIZER);
    let verdict = match (deletion_requested, protected, holder) {
        (false, _, _) => "not-marked-for-deletion",
        (true, false, _) => "not-protected",
        (true, true, Some(_)) => "needs-wait",
        (true, true, None) => "releasable",
    };

    StatusReport {
        name: name.to_string(),
        namespace: namespace.to_string(),
        exists: true,
        deletion_requested,
        protected,
        finalizers: secret.finalizers().to_vec(),
        held_by: holder.map(|kind| kind.kind.to_string()),
        verdict,
    }
}

fn render(report: &StatusReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Yaml => serde_yaml::to_string(report)?,
        OutputFormat::Text => {
            let mut out = format!("Status for Secret '{}/{}'\n\n", report.namespace, report.name);
            if !report.exists {
                out.push_str("  Secret does not exist\n");
                return Ok(out);
            }
            out.push_str(&format!("  Deletion Requested: {}\n", report.deletion_requested));
            out.push_str(&format!("  Protected: {}\n", report.protected));
            if report.finalizers.is_empty() {
                out.push_str("  Finalizers: <none>\n");
            } else {
                out.push_str(&format!("  Finalizers: {}\n", report.finalizers.join(", ")));
            }
            if let Some(kind) = &report.held_by {
                out.push_str(&format!("  Held By: {kind}\n"));
            }
            out.push_str(&format!("  Verdict: {}\n", report.verdict));
            out
        }
    })
}

pub async fn status_command(
    client: Client,
    name: String,
    namespace: String,
    output: OutputFormat,
) -> Result<()> {
    let store = KubeSecretStore::new(client.clone());
    let lookup = ApiReferenceLookup::new(client);

    let secret = store
        .get_secret(&namespace, &name)
        .await
        .with_context(|| format!("Failed to get Secret '{namespace}/{name}'"))?;

    let holder = match &secret {
        Some(secret) => first_holder(&lookup, secret, &REFERENCE_KINDS)
            .await
            .context("Failed to check referencing resources")?,
        None => None,
    };

    let report = build_report(&namespace, &name, secret.as_ref(), holder);
    print!("{}", render(&report, output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret(finalizers: &[&str], deleting: bool) -> Secret {
        let mut metadata = json!({ "name": "db-creds", "namespace": "ns1", "finalizers": finalizers });
        if deleting {
            metadata["deletionTimestamp"] = json!("2024-01-01T00:00:00Z");
        }
        serde_json::from_value(json!({ "apiVersion": "v1", "kind": "Secret", "metadata": metadata }))
            .unwrap()
    }

    #[test]
    fn test_verdicts() {
        let database = ReferenceKind::new("Database", "databases");
        let protected_deleting = secret(&[SECRET_PROTECTION_FINALIZER], true);

        assert_eq!(build_report("ns1", "db-creds", None, None).verdict, "gone");
        assert_eq!(
            build_report("ns1", "db-creds", Some(&secret(&[SECRET_PROTECTION_FINALIZER], false)), None).verdict,
            "not-marked-for-deletion"
        );
        assert_eq!(
            build_report("ns1", "db-creds", Some(&secret(&["other"], true)), None).verdict,
            "not-protected"
        );
        let waiting = build_report("ns1", "db-creds", Some(&protected_deleting), Some(&database));
        assert_eq!(waiting.verdict, "needs-wait");
        assert_eq!(waiting.held_by.as_deref(), Some("Database"));
        assert_eq!(
            build_report("ns1", "db-creds", Some(&protected_deleting), None).verdict,
            "releasable"
        );
    }

    #[test]
    fn test_render_formats() {
        let report = build_report(
            "ns1",
            "db-creds",
            Some(&secret(&[SECRET_PROTECTION_FINALIZER], true)),
            None,
        );

        let json: serde_json::Value =
            serde_json::from_str(&render(&report, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["verdict"], "releasable");
        assert_eq!(json["deletionRequested"], true);
        assert!(json.get("heldBy").is_none());

        let yaml = render(&report, OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("verdict: releasable"));

        let text = render(&report, OutputFormat::Text).unwrap();
        assert!(text.contains("Finalizers: secret-protection"));
        assert!(text.contains("Verdict: releasable"));
    }
}
