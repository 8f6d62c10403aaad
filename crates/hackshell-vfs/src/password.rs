//! Salted password hashes stored in user records.
//!
//! Format: `sha256$<salt-hex>$<digest-hex>`, where the digest is
//! SHA-256 over the salt bytes followed by the password. Values without the
//! prefix are legacy plaintext and compare directly until migrated.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::machine::Machine;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt[..]);
    format!(
        "{SCHEME}${}${}",
        hex::encode(salt),
        hex::encode(digest(&salt, password))
    )
}

pub fn is_hashed(stored: &str) -> bool {
    stored
        .strip_prefix(SCHEME)
        .is_some_and(|rest| rest.starts_with('$'))
}

/// Check `password` against a stored hash or legacy plaintext value.
/// An empty stored value never matches.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.is_empty() {
        return false;
    }
    if !is_hashed(stored) {
        if stored.starts_with("$2") {
            log::warn!("bcrypt hashes are not supported; reset this password with passwd");
            return false;
        }
        return constant_time_eq(password.as_bytes(), stored.as_bytes());
    }
    let mut parts = stored.splitn(3, '$').skip(1);
    let (Some(salt_hex), Some(digest_hex)) = (parts.next(), parts.next()) else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    constant_time_eq(&digest(&salt, password), &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hash every plaintext password on `machine` in place, including the
/// host-wide ssh password. Returns how many values changed.
pub fn migrate_passwords(machine: &mut Machine) -> usize {
    let mut changed = 0;
    for (name, user) in &mut machine.meta_data.users {
        if !user.password.is_empty() && !is_hashed(&user.password) {
            user.password = hash_password(&user.password);
            log::info!("migrated password for {name}");
            changed += 1;
        }
    }
    if let Some(host) = machine.meta_data.password.as_mut() {
        if !host.is_empty() && !is_hashed(host) {
            *host = hash_password(host);
            changed += 1;
        }
    }
    changed
}
