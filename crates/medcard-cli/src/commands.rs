//! Subcommand implementations

use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use medcard_core::{
    ClientVault, CryptoConfig, EncryptedPayload, FileStore, MasterSecret, UserKeyring,
};

/// Print-ready hex for a brand new master secret
pub fn generate_secret() -> String {
    MasterSecret::generate().to_hex()
}

/// Services opened over the data-directory store
pub struct Context {
    keyring: UserKeyring,
    vault: ClientVault,
}

impl Context {
    pub async fn open(config: &CryptoConfig, data_dir: &Path) -> anyhow::Result<Self> {
        let store = Arc::new(
            FileStore::open(data_dir)
                .await
                .with_context(|| format!("Failed to open store in {}", data_dir.display()))?,
        );

        Ok(Self {
            keyring: UserKeyring::new(config, store.clone()),
            vault: ClientVault::new(store, config.kdf),
        })
    }

    pub async fn register(&self, user_id: &str) -> anyhow::Result<()> {
        self.keyring.register_user(user_id).await?;
        Ok(())
    }

    pub async fn encrypt_file(&self, user_id: &str, input: &Path, output: &Path) -> anyhow::Result<()> {
        let plaintext = read_input(input).await?;
        let payload = self.keyring.encrypt_for_user(user_id, &plaintext).await?;
        write_output(output, payload.as_str().as_bytes()).await?;
        info!("Encrypted {} for {}", input.display(), user_id);
        Ok(())
    }

    pub async fn decrypt_file(&self, user_id: &str, input: &Path, output: &Path) -> anyhow::Result<()> {
        let payload = read_payload(input).await?;
        let plaintext = self.keyring.decrypt_for_user(user_id, &payload).await?;
        write_output(output, &plaintext).await?;
        info!("Decrypted {} for {}", input.display(), user_id);
        Ok(())
    }

    pub async fn client_setup(&self, user_id: &str, password: &str) -> anyhow::Result<()> {
        self.vault.setup(user_id, password).await?;
        Ok(())
    }

    pub async fn client_encrypt_file(
        &self,
        user_id: &str,
        password: &str,
        input: &Path,
        output: &Path,
    ) -> anyhow::Result<()> {
        let plaintext = read_input(input).await?;
        let cipher = self.vault.unlock(user_id, password, None).await?.into_cipher();
        let payload = cipher.encrypt(&plaintext)?;
        write_output(output, payload.as_str().as_bytes()).await?;
        Ok(())
    }

    pub async fn client_decrypt_file(
        &self,
        user_id: &str,
        password: &str,
        input: &Path,
        output: &Path,
    ) -> anyhow::Result<()> {
        let payload = read_payload(input).await?;
        let unlocked = self
            .vault
            .unlock(user_id, password, Some(&payload))
            .await
            .map_err(wrong_password)?;
        let plaintext = unlocked.cipher().decrypt(&payload)?;
        write_output(output, &plaintext).await?;
        Ok(())
    }

    /// Returns `false` when there was nothing to check the password against
    pub async fn client_verify(
        &self,
        user_id: &str,
        password: &str,
        probe: Option<&Path>,
    ) -> anyhow::Result<bool> {
        let probe = match probe {
            Some(path) => Some(read_payload(path).await?),
            None => None,
        };
        let unlocked = self
            .vault
            .unlock(user_id, password, probe.as_ref())
            .await
            .map_err(wrong_password)?;
        Ok(unlocked.is_verified())
    }
}

/// In the client flow a failed decrypt means the password was wrong
fn wrong_password(e: medcard_core::MedcardError) -> anyhow::Error {
    if e.is_decryption_failure() {
        anyhow::anyhow!("Wrong password")
    } else {
        e.into()
    }
}

async fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn read_payload(path: &Path) -> anyhow::Result<EncryptedPayload> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(EncryptedPayload::new(raw.trim()))
}

async fn write_output(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use medcard_core::KdfParams;
    use tempfile::TempDir;

    fn config() -> CryptoConfig {
        let secret = MasterSecret::from_hex(&"5e".repeat(32)).unwrap();
        CryptoConfig::new(secret, KdfParams { iterations: 1_000 }).unwrap()
    }

    #[test]
    fn test_generate_secret_is_valid() {
        let hex = generate_secret();
        assert_eq!(hex.len(), 64);
        assert!(MasterSecret::from_hex(&hex).is_ok());
    }

    #[tokio::test]
    async fn test_server_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::open(&config(), dir.path()).await.unwrap();
        ctx.register("user_1").await.unwrap();

        let input = dir.path().join("report.json");
        let sealed = dir.path().join("report.enc");
        let output = dir.path().join("report.out");
        std::fs::write(&input, b"[{\"Date\":\"05.01.2023\",\"WBC\":5.4}]").unwrap();

        ctx.encrypt_file("user_1", &input, &sealed).await.unwrap();
        let raw = std::fs::read_to_string(&sealed).unwrap();
        assert_eq!(raw.split(':').count(), 3);

        ctx.decrypt_file("user_1", &sealed, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
    }

    #[tokio::test]
    async fn test_registration_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let sealed = dir.path().join("sealed");
        let output = dir.path().join("out");
        std::fs::write(&input, b"persisted").unwrap();

        {
            let ctx = Context::open(&config(), dir.path()).await.unwrap();
            ctx.register("user_1").await.unwrap();
            ctx.encrypt_file("user_1", &input, &sealed).await.unwrap();
        }

        let ctx = Context::open(&config(), dir.path()).await.unwrap();
        ctx.decrypt_file("user_1", &sealed, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"persisted");
    }

    #[tokio::test]
    async fn test_client_flow() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::open(&config(), dir.path()).await.unwrap();
        let input = dir.path().join("in");
        let sealed = dir.path().join("sealed");
        let output = dir.path().join("out");
        std::fs::write(&input, b"device data").unwrap();

        ctx.client_setup("user_1", "correct-password").await.unwrap();
        assert!(!ctx.client_verify("user_1", "anything", None).await.unwrap());

        ctx.client_encrypt_file("user_1", "correct-password", &input, &sealed)
            .await
            .unwrap();
        assert!(ctx
            .client_verify("user_1", "correct-password", Some(&sealed))
            .await
            .unwrap());

        let err = ctx
            .client_decrypt_file("user_1", "wrong-password", &sealed, &output)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Wrong password");

        ctx.client_decrypt_file("user_1", "correct-password", &sealed, &output)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"device data");
    }
}
