//! Shamir secret sharing over GF(2^8) for 32-byte keys.
//!
//! Each share is `[x, y_0 .. y_31]`: one x-coordinate byte followed by one
//! polynomial evaluation per secret byte. Combining interpolates at x = 0.
//! Any `threshold` of the `total` shares recover the secret exactly; fewer
//! reveal nothing about it.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{EngramError, Result};

/// Length of the secrets this module splits (vault keys).
pub const SECRET_LEN: usize = 32;

/// Serialized share length: x-coordinate byte plus one byte per secret byte.
pub const SHARE_LEN: usize = SECRET_LEN + 1;

/// Split a 32-byte secret into `total` shares requiring `threshold` to
/// recover. `threshold` must be in `[2, total]`.
pub fn split(secret: &[u8; SECRET_LEN], total: u8, threshold: u8) -> Result<Vec<Vec<u8>>> {
    if total < 2 {
        return Err(EngramError::Recovery("at least 2 shares required".into()));
    }
    if threshold < 2 || threshold > total {
        return Err(EngramError::Recovery(format!(
            "threshold must be in [2, {total}], got {threshold}"
        )));
    }

    // One random polynomial per secret byte, degree threshold - 1, with the
    // secret byte as the constant term.
    let mut coefficients = vec![[0u8; SECRET_LEN]; threshold as usize];
    coefficients[0].copy_from_slice(secret);
    for row in coefficients.iter_mut().skip(1) {
        OsRng.fill_bytes(row);
    }

    let mut shares = Vec::with_capacity(total as usize);
    for i in 0..total {
        let x = i + 1; // x = 0 would expose the secret directly
        let mut share = Vec::with_capacity(SHARE_LEN);
        share.push(x);
        for byte_idx in 0..SECRET_LEN {
            let mut y = 0u8;
            // Horner evaluation from the highest coefficient down.
            for row in coefficients.iter().rev() {
                y = gf_add(gf_mul(y, x), row[byte_idx]);
            }
            share.push(y);
        }
        shares.push(share);
    }

    Ok(shares)
}

/// Recover the secret from at least two distinct shares produced by [`split`].
///
/// Passing fewer shares than the original threshold yields an incorrect
/// secret rather than an error; callers verify the result against a known
/// envelope (the recovery flow decrypts a probe payload).
pub fn combine(shares: &[Vec<u8>]) -> Result<[u8; SECRET_LEN]> {
    if shares.len() < 2 {
        return Err(EngramError::Recovery(format!(
            "need at least 2 shares, got {}",
            shares.len()
        )));
    }

    let mut xs = Vec::with_capacity(shares.len());
    for share in shares {
        if share.len() != SHARE_LEN {
            return Err(EngramError::Recovery(format!(
                "share must be {SHARE_LEN} bytes, got {}",
                share.len()
            )));
        }
        let x = share[0];
        if x == 0 {
            return Err(EngramError::Recovery("share has zero x-coordinate".into()));
        }
        if xs.contains(&x) {
            return Err(EngramError::Recovery(format!("duplicate share index {x}")));
        }
        xs.push(x);
    }

    let mut secret = [0u8; SECRET_LEN];
    for (byte_idx, out) in secret.iter_mut().enumerate() {
        let mut acc = 0u8;
        for (j, share) in shares.iter().enumerate() {
            // Lagrange basis polynomial evaluated at x = 0.
            let mut weight = 1u8;
            for (m, share_m) in shares.iter().enumerate() {
                if m == j {
                    continue;
                }
                let num = share_m[0];
                let den = gf_add(share_m[0], share[0]);
                weight = gf_mul(weight, gf_div(num, den)?);
            }
            acc = gf_add(acc, gf_mul(share[1 + byte_idx], weight));
        }
        *out = acc;
    }

    Ok(secret)
}

/// Addition in GF(2^8) is XOR.
#[inline]
fn gf_add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Multiplication in GF(2^8) with the AES reduction polynomial 0x11b.
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    product
}

/// Division via the multiplicative inverse (b^254 in GF(2^8)).
fn gf_div(a: u8, b: u8) -> Result<u8> {
    if b == 0 {
        return Err(EngramError::Recovery(
            "division by zero in share field".into(),
        ));
    }
    let mut inverse = 1u8;
    let mut base = b;
    let mut exp = 254u8;
    while exp != 0 {
        if exp & 1 != 0 {
            inverse = gf_mul(inverse, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    Ok(gf_mul(a, inverse))
}
