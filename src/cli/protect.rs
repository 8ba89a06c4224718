//! # Protect Command
//!
//! Adds the `secret-protection` finalizer to an existing secret.

use anyhow::{anyhow, Context, Result};
use kube::Client;
use secret_protection_controller::constants::SECRET_PROTECTION_FINALIZER;
use secret_protection_controller::controller::reconciler::ensure_finalizer;
use secret_protection_controller::store::{KubeSecretStore, SecretStore};

pub async fn protect_command(client: Client, name: String, namespace: String) -> Result<()> {
    let store = KubeSecretStore::new(client);

    let secret = store
        .get_secret(&namespace, &name)
        .await
        .with_context(|| format!("Failed to get Secret '{namespace}/{name}'"))?
        .ok_or_else(|| anyhow!("Secret '{namespace}/{name}' not found"))?;

    let added = ensure_finalizer(&store, &secret, SECRET_PROTECTION_FINALIZER)
        .await
        .with_context(|| format!("Failed to add finalizer to Secret '{namespace}/{name}'"))?;

    if added {
        println!("Added '{SECRET_PROTECTION_FINALIZER}' finalizer to Secret '{namespace}/{name}'");
    } else {
        println!("Secret '{namespace}/{name}' is already protected");
    }
    Ok(())
}
