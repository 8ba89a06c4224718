//! # Holders Command
//!
//! Lists, per referencing kind, the resources that name a secret in `spec.authSecretRef`.

use anyhow::{Context, Result};
use kube::Client;
use secret_protection_controller::crd::REFERENCE_KINDS;
use secret_protection_controller::store::{ApiReferenceLookup, ReferenceLookup};

pub async fn holders_command(client: Client, name: String, namespace: String) -> Result<()> {
    let lookup = ApiReferenceLookup::new(client);

    println!("Resources referencing secret '{namespace}/{name}':");
    println!();

    let mut total = 0usize;
    for kind in &REFERENCE_KINDS {
        match lookup.list_referencing(kind, &namespace, &name, usize::MAX).await {
            Ok(holders) if holders.is_empty() => {}
            Ok(holders) => {
                total += holders.len();
                println!("  {} ({}):", kind.kind, holders.len());
                for holder in holders {
                    println!("    - {}", holder.name);
                }
            }
            Err(e) if e.is_not_found() => {
                println!("  {}: not served by this cluster", kind.kind);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", kind.plural));
            }
        }
    }

    println!();
    if total == 0 {
        println!("No resources reference this secret; it can be released.");
    } else {
        println!("{total} resource(s) still reference this secret.");
    }
    Ok(())
}
