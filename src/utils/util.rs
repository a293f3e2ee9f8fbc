// Copyright 2023 Fondazione LINKS

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at

//     http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bls12_381_plus::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use elliptic_curve::group::Curve;
use elliptic_curve::hash2curve::{ExpandMsg, Expander};
use rand::RngCore;

use crate::{errors::Error, ticket::ciphersuites::TicketCiphersuite};

pub const SCALAR_LEN: usize = 32;
pub const G1_LEN: usize = 48;
pub const G2_LEN: usize = 96;

/// hash_to_scalar(msg_octets, dst)
///
/// Expands the message to `EXPAND_LEN` uniform bytes and reduces them mod r.
/// A zero output is rehashed with an incremented counter byte appended.
pub fn hash_to_scalar<CS>(msg_octets: &[u8], dst: &[u8]) -> Result<Scalar, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let mut counter: u8 = 0;
    let mut uniform_bytes = [0u8; 48];
    loop {
        let msg_prime = [msg_octets, &[counter; 1][..]].concat();
        CS::Expander::expand_message(&[msg_prime.as_slice()], &[dst], CS::EXPAND_LEN)
            .map_err(|_| Error::HashToScalarError)?
            .fill_bytes(&mut uniform_bytes);
        let hashed_scalar = Scalar::from_okm(&uniform_bytes);
        if hashed_scalar != Scalar::ZERO {
            return Ok(hashed_scalar);
        }
        counter = counter.checked_add(1).ok_or(Error::HashToScalarError)?;
    }
}

/// Fresh scalar from the thread-local CSPRNG.
pub fn random_scalar() -> Scalar {
    let mut rng = rand::thread_rng();
    let mut buf = [0u8; 48];
    rng.fill_bytes(&mut buf);
    Scalar::from_okm(&buf)
}

pub fn random_nonzero_scalar() -> Scalar {
    loop {
        let s = random_scalar();
        if s != Scalar::ZERO {
            return s;
        }
    }
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}

/// (a)^-1 mod r
pub fn invert(a: &Scalar) -> Result<Scalar, Error> {
    Option::<Scalar>::from(a.invert()).ok_or(Error::ModularInverseUndefined)
}

/// Samples `e` until `(x + e)` is invertible and returns `(e, 1/(x + e))`.
///
/// `ModularInverseUndefined` never leaves this function.
pub fn sample_invertible_offset(x: &Scalar) -> (Scalar, Scalar) {
    loop {
        let e = random_scalar();
        match invert(&(x + e)) {
            Ok(inv) => return (e, inv),
            Err(_) => log::debug!("x + e == 0 mod r, resampling e"),
        }
    }
}

pub trait ScalarExt: Sized {
    fn to_bytes_be(&self) -> [u8; SCALAR_LEN];
    fn from_bytes_be(bytes: &[u8]) -> Result<Self, Error>;
}

impl ScalarExt for Scalar {
    fn to_bytes_be(&self) -> [u8; SCALAR_LEN] {
        self.to_be_bytes()
    }

    fn from_bytes_be(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; SCALAR_LEN] = bytes
            .try_into()
            .map_err(|_| Error::DeserializationError(format!("scalar must be {} bytes", SCALAR_LEN)))?;
        Option::<Scalar>::from(Scalar::from_be_bytes(&bytes))
            .ok_or_else(|| Error::DeserializationError("scalar is not reduced mod r".to_owned()))
    }
}

pub fn g1_to_bytes(p: &G1Projective) -> [u8; G1_LEN] {
    p.to_affine().to_compressed()
}

pub fn g2_to_bytes(p: &G2Projective) -> [u8; G2_LEN] {
    p.to_affine().to_compressed()
}

pub fn parse_g1_projective(bytes: &[u8]) -> Result<G1Projective, Error> {
    let bytes: [u8; G1_LEN] = bytes
        .try_into()
        .map_err(|_| Error::DeserializationError(format!("G1 point must be {} bytes", G1_LEN)))?;
    Option::<G1Affine>::from(G1Affine::from_compressed(&bytes))
        .map(G1Projective::from)
        .ok_or_else(|| Error::DeserializationError("invalid G1 point".to_owned()))
}

pub fn parse_g2_projective(bytes: &[u8]) -> Result<G2Projective, Error> {
    let bytes: [u8; G2_LEN] = bytes
        .try_into()
        .map_err(|_| Error::DeserializationError(format!("G2 point must be {} bytes", G2_LEN)))?;
    Option::<G2Affine>::from(G2Affine::from_compressed(&bytes))
        .map(G2Projective::from)
        .ok_or_else(|| Error::DeserializationError("invalid G2 point".to_owned()))
}

pub fn parse_utf8(bytes: &[u8]) -> Result<String, Error> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::DeserializationError("identifier is not UTF-8".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::ciphersuites::{Bls12381Sha256, Bls12381Shake256};

    fn h2s_is_deterministic<CS>()
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let dst = CS::dst(b"H2S_");
        let a = hash_to_scalar::<CS>(b"ticket", &dst).unwrap();
        let b = hash_to_scalar::<CS>(b"ticket", &dst).unwrap();
        let c = hash_to_scalar::<CS>(b"ticket!", &dst).unwrap();
        let d = hash_to_scalar::<CS>(b"ticket", b"OTHER_DST").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, Scalar::ZERO);
    }

    #[test]
    fn h2s_sha256() {
        h2s_is_deterministic::<Bls12381Sha256>();
    }

    #[test]
    fn h2s_shake256() {
        h2s_is_deterministic::<Bls12381Shake256>();
    }

    #[test]
    fn scalar_bytes_roundtrip_and_reject_unreduced() {
        let s = random_scalar();
        assert_eq!(Scalar::from_bytes_be(&s.to_bytes_be()).unwrap(), s);
        assert!(Scalar::from_bytes_be(&[0xffu8; 32]).is_err());
        assert!(Scalar::from_bytes_be(&[0u8; 31]).is_err());
    }

    #[test]
    fn point_parsing_rejects_garbage() {
        let p = G1Projective::GENERATOR * random_scalar();
        assert_eq!(parse_g1_projective(&g1_to_bytes(&p)).unwrap(), p);
        assert!(parse_g1_projective(&[0x13u8; G1_LEN]).is_err());
        assert!(parse_g1_projective(&[0u8; 10]).is_err());
        let q = G2Projective::GENERATOR * random_scalar();
        assert_eq!(parse_g2_projective(&g2_to_bytes(&q)).unwrap(), q);
    }

    #[test]
    fn zero_has_no_inverse() {
        assert_eq!(invert(&Scalar::ZERO), Err(Error::ModularInverseUndefined));
        let x = random_nonzero_scalar();
        assert_eq!(invert(&x).unwrap() * x, Scalar::ONE);
    }

    #[test]
    fn offset_is_invertible() {
        let x = random_scalar();
        let (e, inv) = sample_invertible_offset(&x);
        assert_eq!((x + e) * inv, Scalar::ONE);
    }
}
