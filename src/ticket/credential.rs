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

use bls12_381_plus::{pairing, G1Projective, G2Projective, Scalar};
use group::Curve;

use super::generators::GroupParameters;
use crate::{
    errors::Error,
    keys::key::{G1PublicKey, G2PublicKey, SecretKey},
    utils::{
        codec,
        util::{g1_to_bytes, parse_g1_projective, random_scalar, sample_invertible_offset, ScalarExt},
    },
};

/// Registration credential `(sigma, r, e)` issued by the authority on the
/// holder's public key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Credential {
    pub sigma: G1Projective,
    pub r: Scalar,
    pub e: Scalar,
}

impl Credential {
    /// `sigma = (g + h·r + Y_U)·(x_A + e)^-1` with fresh `r, e`.
    pub fn issue(params: &GroupParameters, authority_sk: &SecretKey, holder_pk: &G1PublicKey) -> Self {
        let r = random_scalar();
        let (e, inv) = sample_invertible_offset(&authority_sk.0);
        let sigma = signed_base(params, &r, holder_pk) * inv;
        Self { sigma, r, e }
    }

    /// `e(sigma, W_A + g_frak·e) == e(g + h·r + Y_U, g_frak)`
    pub fn verify(&self, params: &GroupParameters, authority_pk: &G2PublicKey, holder_pk: &G1PublicKey) -> bool {
        if bool::from(self.sigma.is_identity()) {
            return false;
        }
        pairing_signature_holds(
            params,
            &self.sigma,
            &authority_pk.0,
            &self.e,
            &signed_base(params, &self.r, holder_pk),
        )
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(&[
            g1_to_bytes(&self.sigma).to_vec(),
            self.r.to_bytes_be().to_vec(),
            self.e.to_bytes_be().to_vec(),
        ])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let fields = codec::decode_exact(bytes, 3)?;
        Ok(Self {
            sigma: parse_g1_projective(&fields[0])?,
            r: Scalar::from_bytes_be(&fields[1])?,
            e: Scalar::from_bytes_be(&fields[2])?,
        })
    }
}

fn signed_base(params: &GroupParameters, r: &Scalar, holder_pk: &G1PublicKey) -> G1Projective {
    params.g + params.h * r + holder_pk.0
}

/// Shared pairing check of credentials and ticket tags:
/// `e(sig, pk + g_frak·e) == e(base, g_frak)`.
pub(crate) fn pairing_signature_holds(
    params: &GroupParameters,
    sig: &G1Projective,
    pk: &G2Projective,
    e: &Scalar,
    base: &G1Projective,
) -> bool {
    let lhs = pairing(&sig.to_affine(), &(pk + params.g_frak * e).to_affine());
    let rhs = pairing(&base.to_affine(), &params.g_frak.to_affine());
    lhs == rhs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        keys::pair::KeyPair,
        ticket::ciphersuites::{Bls12381Sha256, Bls12381Shake256, TicketCiphersuite},
    };
    use elliptic_curve::hash2curve::ExpandMsg;

    struct Setup {
        params: GroupParameters,
        authority: KeyPair<G2PublicKey>,
        holder: KeyPair<G1PublicKey>,
    }

    fn setup<CS>() -> Setup
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let params = GroupParameters::generate::<CS>(CS::GENERATOR_SEED);
        let authority = KeyPair::<G2PublicKey>::generate(&params.g_frak);
        let holder = KeyPair::<G1PublicKey>::generate(&params.theta);
        Setup { params, authority, holder }
    }

    fn completeness<CS>()
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let s = setup::<CS>();
        for _ in 0..3 {
            let cred = Credential::issue(&s.params, s.authority.private_key(), s.holder.public_key());
            assert!(cred.verify(&s.params, s.authority.public_key(), s.holder.public_key()));
            let decoded = Credential::from_bytes(&cred.to_bytes()).unwrap();
            assert_eq!(decoded, cred);
        }
    }

    #[test]
    fn completeness_sha256() {
        completeness::<Bls12381Sha256>();
    }

    #[test]
    fn completeness_shake256() {
        completeness::<Bls12381Shake256>();
    }

    #[test]
    fn other_holder_key_does_not_verify() {
        let s = setup::<Bls12381Sha256>();
        let cred = Credential::issue(&s.params, s.authority.private_key(), s.holder.public_key());
        let other = KeyPair::<G1PublicKey>::generate(&s.params.theta);
        assert!(!cred.verify(&s.params, s.authority.public_key(), other.public_key()));

        let other_authority = KeyPair::<G2PublicKey>::generate(&s.params.g_frak);
        assert!(!cred.verify(&s.params, other_authority.public_key(), s.holder.public_key()));
    }

    #[test]
    fn flipping_a_byte_breaks_the_credential() {
        let s = setup::<Bls12381Sha256>();
        let cred = Credential::issue(&s.params, s.authority.private_key(), s.holder.public_key());
        let bytes = cred.to_bytes();

        // low bit, and the top bit that carries the point flags of sigma
        for mask in [0x01u8, 0x80] {
            for pos in 0..bytes.len() {
                let mut tampered = bytes.clone();
                tampered[pos] ^= mask;
                let accepted = match Credential::from_bytes(&tampered) {
                    Ok(c) => c.verify(&s.params, s.authority.public_key(), s.holder.public_key()),
                    Err(_) => false,
                };
                assert!(!accepted, "byte {} xor {:#04x} still verified", pos, mask);
            }
        }
    }

    #[test]
    fn identity_sigma_is_refused() {
        let s = setup::<Bls12381Sha256>();
        let mut cred = Credential::issue(&s.params, s.authority.private_key(), s.holder.public_key());
        cred.sigma = G1Projective::IDENTITY;
        assert!(!cred.verify(&s.params, s.authority.public_key(), s.holder.public_key()));
    }
}
