//! Unit tests for backend selection and the vault contract.

use std::cell::Cell;
use std::iter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

/// A keychain stand-in that can be switched off after commitment.
struct SwitchableBackend {
    healthy: Arc<AtomicBool>,
    inner: MemoryBackend,
}

impl SwitchableBackend {
    fn new(healthy: Arc<AtomicBool>) -> Self {
        Self {
            healthy,
            inner: MemoryBackend::new(),
        }
    }

    fn check(&self) -> Result<(), VaultError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VaultError::Backend {
                tier: Tier::Keyring,
                message: String::from("keychain locked"),
                source: None,
            })
        }
    }
}

impl SecretBackend for SwitchableBackend {
    fn tier(&self) -> Tier {
        Tier::Keyring
    }

    fn store(&self, key: &str, secret: &Secret) -> Result<(), VaultError> {
        self.check()?;
        self.inner.store(key, secret)
    }

    fn get(&self, key: &str) -> Result<Option<Secret>, VaultError> {
        self.check()?;
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.check()?;
        self.inner.delete(key)
    }
}

/// A keychain stand-in that accepts writes but never reads them back.
struct ForgetfulBackend;

impl SecretBackend for ForgetfulBackend {
    fn tier(&self) -> Tier {
        Tier::Keyring
    }

    fn store(&self, _key: &str, _secret: &Secret) -> Result<(), VaultError> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Result<Option<Secret>, VaultError> {
        Ok(None)
    }

    fn delete(&self, _key: &str) -> Result<(), VaultError> {
        Ok(())
    }
}

/// A keychain stand-in that only accepts the sentinel key.
#[derive(Default)]
struct SentinelOnlyBackend {
    inner: MemoryBackend,
}

impl SecretBackend for SentinelOnlyBackend {
    fn tier(&self) -> Tier {
        Tier::Keyring
    }

    fn store(&self, key: &str, secret: &Secret) -> Result<(), VaultError> {
        if key != SENTINEL_KEY {
            return Err(VaultError::Backend {
                tier: Tier::Keyring,
                message: String::from("item limit reached"),
                source: None,
            });
        }
        self.inner.store(key, secret)
    }

    fn get(&self, key: &str) -> Result<Option<Secret>, VaultError> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.inner.delete(key)
    }
}

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn embedded(dir: &TempDir) -> Candidate {
    SqliteBackend::open(dir.path().join("credentials.db"))
        .map(|backend| Box::new(backend) as Box<dyn SecretBackend>)
}

fn memory_vault() -> Vault {
    Vault::with_backends(iter::empty())
}

#[rstest]
fn healthy_first_candidate_is_committed() {
    let healthy = Arc::new(AtomicBool::new(true));
    let vault = Vault::with_backends([Ok(
        Box::new(SwitchableBackend::new(healthy)) as Box<dyn SecretBackend>
    )]);
    assert_eq!(vault.tier(), Tier::Keyring);
}

#[rstest]
fn failed_probe_falls_back_to_embedded(temp_dir: TempDir) {
    let vault = Vault::with_backends([
        Ok(Box::new(ForgetfulBackend) as Box<dyn SecretBackend>),
        embedded(&temp_dir),
    ]);
    assert_eq!(vault.tier(), Tier::Embedded);
}

#[rstest]
fn unavailable_backends_fall_back_to_memory() {
    let unavailable: Candidate = Err(VaultError::Backend {
        tier: Tier::Embedded,
        message: String::from("read-only file system"),
        source: None,
    });
    let vault = Vault::with_backends([
        Ok(Box::new(ForgetfulBackend) as Box<dyn SecretBackend>),
        unavailable,
    ]);
    assert_eq!(vault.tier(), Tier::Memory);
}

#[rstest]
fn later_candidates_are_not_opened_after_commitment() {
    let opened = Cell::new(false);
    let candidates = iter::once(Ok(Box::new(MemoryBackend::new()) as Box<dyn SecretBackend>))
        .chain(iter::once_with(|| {
            opened.set(true);
            Ok(Box::new(MemoryBackend::new()) as Box<dyn SecretBackend>)
        }));
    let vault = Vault::with_backends(candidates);
    assert_eq!(vault.tier(), Tier::Memory);
    assert!(!opened.get());
}

#[rstest]
fn sentinel_is_removed_after_probe(temp_dir: TempDir) {
    let vault = Vault::with_backends([embedded(&temp_dir)]);
    vault.close().expect("close");
    let reopened = SqliteBackend::open(temp_dir.path().join("credentials.db")).expect("reopen");
    assert!(reopened.get(SENTINEL_KEY).expect("get").is_none());
}

#[rstest]
fn committed_tier_never_falls_through() {
    let healthy = Arc::new(AtomicBool::new(true));
    let vault = Vault::with_backends([Ok(
        Box::new(SwitchableBackend::new(Arc::clone(&healthy))) as Box<dyn SecretBackend>
    )]);
    vault.store("a", &Secret::from("1")).expect("store while healthy");

    healthy.store(false, Ordering::SeqCst);
    let err = vault.store("b", &Secret::from("2")).expect_err("backend down");
    assert!(matches!(err, VaultError::Backend { tier: Tier::Keyring, .. }));
    assert_eq!(vault.tier(), Tier::Keyring);

    healthy.store(true, Ordering::SeqCst);
    assert!(vault.get("b").expect_err("never stored elsewhere").is_not_found());
    assert_eq!(vault.get("a").expect("still there").expose(), "1");
}

#[rstest]
fn secrets_survive_restart(temp_dir: TempDir) {
    let first = Vault::with_backends([embedded(&temp_dir)]);
    first.store("prod-db", &Secret::from("s3cret")).expect("store");
    first.close().expect("close");

    let second = Vault::with_backends([embedded(&temp_dir)]);
    assert_eq!(second.tier(), Tier::Embedded);
    assert_eq!(second.get("prod-db").expect("get").expose(), "s3cret");
}

#[rstest]
fn get_after_delete_is_not_found() {
    let vault = memory_vault();
    vault.store("k", &Secret::from("v")).expect("store");
    vault.delete("k").expect("delete");
    vault.delete("k").expect("delete again");
    let err = vault.get("k").expect_err("deleted");
    assert!(matches!(err, VaultError::NotFound { ref key } if key == "k"));
}

#[rstest]
fn empty_key_is_rejected() {
    let vault = memory_vault();
    assert!(matches!(
        vault.store("", &Secret::from("v")),
        Err(VaultError::EmptyKey)
    ));
    assert!(matches!(vault.get(""), Err(VaultError::EmptyKey)));
    assert!(matches!(vault.delete(""), Err(VaultError::EmptyKey)));
}

#[rstest]
fn close_is_idempotent_and_final() {
    let vault = memory_vault();
    vault.store("k", &Secret::from("v")).expect("store");
    vault.close().expect("close");
    vault.close().expect("close again");
    assert!(vault.is_closed());
    assert!(matches!(vault.get("k"), Err(VaultError::Closed)));
    assert!(matches!(vault.delete("k"), Err(VaultError::Closed)));
}

#[test]
fn secret_debug_is_redacted() {
    let secret = Secret::from("hunter2");
    let rendered = format!("{secret:?}");
    assert!(!rendered.contains("hunter2"), "leaked: {rendered}");
    assert_eq!(secret.clone().into_inner(), "hunter2");
}

fn switchable(healthy: &Arc<AtomicBool>) -> Option<impl FnOnce() -> Candidate> {
    let flag = Arc::clone(healthy);
    Some(move || -> Candidate { Ok(Box::new(SwitchableBackend::new(flag))) })
}

#[rstest]
fn secret_stored_on_fallback_is_found_once_keychain_recovers(temp_dir: TempDir) {
    let options = VaultOptions::new("quarry-test", temp_dir.path().join("credentials.db"));
    let locked = Arc::new(AtomicBool::new(false));
    let first = Vault::open_with(&options, switchable(&locked));
    assert_eq!(first.tier(), Tier::Embedded);
    first.store("prod-db", &Secret::from("s3cret")).expect("store");
    first.close().expect("close");

    let unlocked = Arc::new(AtomicBool::new(true));
    let second = Vault::open_with(&options, switchable(&unlocked));
    assert_eq!(second.tier(), Tier::Keyring);
    assert_eq!(second.get("prod-db").expect("moved").expose(), "s3cret");

    let leftover = SqliteBackend::open(&options.path).expect("reopen");
    assert!(leftover.entries().expect("entries").is_empty());
}

#[rstest]
fn entries_stay_embedded_when_the_keychain_rejects_them(temp_dir: TempDir) {
    let options = VaultOptions::new("quarry-test", temp_dir.path().join("credentials.db"));
    let embedded_store = SqliteBackend::open(&options.path).expect("open");
    embedded_store.store("prod-db", &Secret::from("s3cret")).expect("seed");
    embedded_store.close().expect("close");

    let vault = Vault::open_with(
        &options,
        Some(|| -> Candidate { Ok(Box::new(SentinelOnlyBackend::default())) }),
    );
    assert_eq!(vault.tier(), Tier::Keyring);
    assert!(vault.get("prod-db").expect_err("not moved").is_not_found());

    let leftover = SqliteBackend::open(&options.path).expect("reopen");
    assert_eq!(leftover.get("prod-db").expect("get").expect("kept").expose(), "s3cret");
}

#[rstest]
fn keyring_off_starts_at_the_embedded_store(temp_dir: TempDir) {
    let options =
        VaultOptions::new("quarry-test", temp_dir.path().join("credentials.db")).without_keyring();
    let vault = Vault::open(&options);
    assert_eq!(vault.tier(), Tier::Embedded);
    vault.store("k", &Secret::from("v")).expect("store");
    vault.close().expect("close");
    assert!(options.path.exists());
}
