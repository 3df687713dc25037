//! Recovery kits: Shamir shares of the vault key, handed to the user and
//! never persisted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{shamir, KEY_SIZE};
use crate::error::{EngramError, Result};

/// One share of a recovery kit. `index` is 0-based; `data` is base64 of the
/// raw share bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryShare {
    pub index: u8,
    pub data: String,
}

/// An ephemeral kit: generated on demand, shown to the user, discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryKit {
    pub user_id: String,
    pub total: u8,
    pub threshold: u8,
    pub shares: Vec<RecoveryShare>,
}

/// Shamir-split the vault key into `total` shares with the given threshold.
pub fn generate_recovery_kit(
    vault_key: &[u8; KEY_SIZE],
    user_id: &str,
    total: u8,
    threshold: u8,
) -> Result<RecoveryKit> {
    let raw_shares = shamir::split(vault_key, total, threshold)?;
    let shares = raw_shares
        .into_iter()
        .enumerate()
        .map(|(index, bytes)| RecoveryShare {
            index: index as u8,
            data: BASE64.encode(bytes),
        })
        .collect();

    Ok(RecoveryKit {
        user_id: user_id.to_string(),
        total,
        threshold,
        shares,
    })
}

/// Combine shares back into the vault key. Any malformed share fails with
/// [`EngramError::Recovery`].
pub fn recover_from_kit(shares: &[RecoveryShare]) -> Result<[u8; KEY_SIZE]> {
    let mut raw = Vec::with_capacity(shares.len());
    for share in shares {
        let bytes = BASE64.decode(&share.data).map_err(|e| {
            EngramError::Recovery(format!("share {} is not valid base64: {e}", share.index))
        })?;
        raw.push(bytes);
    }
    shamir::combine(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_master_key, CryptoService};

    #[test]
    fn kit_shares_carry_zero_based_indices() {
        let vault_key = generate_master_key();
        let kit = generate_recovery_kit(&vault_key, "user", 5, 3).unwrap();

        assert_eq!(kit.total, 5);
        assert_eq!(kit.threshold, 3);
        assert_eq!(kit.shares.len(), 5);
        let indices: Vec<u8> = kit.shares.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn any_threshold_shares_recover_the_vault_key() {
        let vault_key = generate_master_key();
        let kit = generate_recovery_kit(&vault_key, "user", 5, 3).unwrap();

        let subset = vec![
            kit.shares[4].clone(),
            kit.shares[0].clone(),
            kit.shares[2].clone(),
        ];
        assert_eq!(recover_from_kit(&subset).unwrap(), vault_key);
    }

    #[test]
    fn recovered_key_decrypts_prior_envelopes() {
        let vault_key = generate_master_key();
        let envelope = CryptoService::new(vault_key).encrypt("probe payload").unwrap();

        let kit = generate_recovery_kit(&vault_key, "user", 4, 2).unwrap();
        let recovered = recover_from_kit(&kit.shares[1..3]).unwrap();

        let restored = CryptoService::new(recovered);
        assert_eq!(restored.decrypt(&envelope).unwrap(), "probe payload");
    }

    #[test]
    fn malformed_share_is_recovery_error() {
        let vault_key = generate_master_key();
        let mut kit = generate_recovery_kit(&vault_key, "user", 3, 2).unwrap();

        kit.shares[0].data = "!!! not base64 !!!".into();
        assert!(matches!(
            recover_from_kit(&kit.shares[..2]),
            Err(EngramError::Recovery(_))
        ));

        let kit = generate_recovery_kit(&vault_key, "user", 3, 2).unwrap();
        let mut truncated = kit.shares.clone();
        truncated[0].data = BASE64.encode([1u8, 2, 3]);
        assert!(matches!(
            recover_from_kit(&truncated[..2]),
            Err(EngramError::Recovery(_))
        ));
    }

    #[test]
    fn insufficient_shares_rejected() {
        let vault_key = generate_master_key();
        let kit = generate_recovery_kit(&vault_key, "user", 3, 2).unwrap();
        assert!(matches!(
            recover_from_kit(&kit.shares[..1]),
            Err(EngramError::Recovery(_))
        ));
    }

    #[test]
    fn invalid_kit_parameters_rejected() {
        let vault_key = generate_master_key();
        assert!(generate_recovery_kit(&vault_key, "user", 1, 1).is_err());
        assert!(generate_recovery_kit(&vault_key, "user", 3, 5).is_err());
    }
}
