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

use bls12_381_plus::{G1Projective, Scalar};
use elliptic_curve::hash2curve::ExpandMsg;

use super::{
    ciphersuites::TicketCiphersuite,
    generators::GroupParameters,
    tag::{TicketTag, TAG_FIELDS},
};
use crate::{
    errors::{Error, VerificationFailure},
    keys::{
        key::{G1PublicKey, G2PublicKey, SecretKey},
        pair::KeyPair,
    },
    utils::{
        codec,
        transcript::Transcript,
        util::{g1_to_bytes, parse_g1_projective, random_scalar, ScalarExt},
    },
};

pub const NONCE_LEN: usize = 32;
const PROOF_FIELDS: usize = 5;

/// Proof of knowledge of `(x_u, D)` with `P = theta·x_u + Y_T·D` and
/// `Q = xi·D`, bound to one verifier nonce.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UseProof {
    pub P_prime: G1Projective,
    pub Q_prime: G1Projective,
    pub c: Scalar,
    pub z1: Scalar,
    pub z2: Scalar,
}

/// Outcome of every independent check of one presentation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UseReport {
    pub challenge: bool,
    pub first_equation: bool,
    pub second_equation: bool,
    pub binding: bool,
    pub signature: bool,
}

impl UseReport {
    pub fn is_valid(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn failures(&self) -> Vec<VerificationFailure> {
        [
            (self.challenge, VerificationFailure::UseChallenge),
            (self.first_equation, VerificationFailure::UseFirstEquation),
            (self.second_equation, VerificationFailure::UseSecondEquation),
            (self.binding, VerificationFailure::TagBinding),
            (self.signature, VerificationFailure::TagSignature),
        ]
        .into_iter()
        .filter_map(|(ok, failure)| (!ok).then_some(failure))
        .collect()
    }

    /// First failed check as an error.
    pub fn into_result(self) -> Result<(), Error> {
        match self.failures().first() {
            Some(failure) => Err(Error::CryptographicVerificationFailure(*failure)),
            None => Ok(()),
        }
    }
}

fn use_challenge<CS>(
    verifier: &str,
    nonce: &[u8],
    P: &G1Projective,
    Q: &G1Projective,
    P_prime: &G1Projective,
    Q_prime: &G1Projective,
) -> Result<Scalar, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let mut t = Transcript::new(&CS::dst(b"TICKET_USE_"));
    t.append_message(b"verifier", verifier.as_bytes());
    t.append_message(b"nonce", nonce);
    t.append_point(b"P", P);
    t.append_point(b"Q", Q);
    t.append_point(b"P'", P_prime);
    t.append_point(b"Q'", Q_prime);
    t.challenge::<CS>()
}

/// Holder side. `D` is the pseudonym scalar kept for this tag at request time.
pub fn prove_use<CS>(
    params: &GroupParameters,
    holder_sk: &SecretKey,
    tracer_pk: &G1PublicKey,
    tag: &TicketTag,
    D: &Scalar,
    nonce: &[u8],
) -> Result<UseProof, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let k1 = random_scalar();
    let k2 = random_scalar();
    let P_prime = params.theta * k1 + tracer_pk.0 * k2;
    let Q_prime = params.xi * k2;
    let c = use_challenge::<CS>(&tag.verifier, nonce, &tag.P, &tag.Q, &P_prime, &Q_prime)?;

    Ok(UseProof {
        P_prime,
        Q_prime,
        c,
        z1: k1 - c * holder_sk.0,
        z2: k2 - c * D,
    })
}

/// Verifier side. Every check runs regardless of the others.
#[allow(clippy::too_many_arguments)]
pub fn verify_use<CS>(
    params: &GroupParameters,
    issuer_pk: &G2PublicKey,
    tracer_pk: &G1PublicKey,
    verifier_id: &str,
    verifier: &KeyPair<G1PublicKey>,
    tag: &TicketTag,
    proof: &UseProof,
    nonce: &[u8],
    ticket_text: &[u8],
) -> UseReport
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let UseProof { P_prime, Q_prime, c, z1, z2 } = proof;

    let challenge = use_challenge::<CS>(verifier_id, nonce, &tag.P, &tag.Q, P_prime, Q_prime)
        .map(|expected| expected == *c)
        .unwrap_or(false);
    let first_equation = params.theta * z1 + tracer_pk.0 * z2 + tag.P * c == *P_prime;
    let second_equation = params.xi * z2 + tag.Q * c == *Q_prime;
    let binding = tag.verifier == verifier_id
        && tag.F == tag.E * verifier.private_key().0
        && tag.K == verifier.public_key().0;
    let signature =
        tag.hash_matches::<CS>(ticket_text).unwrap_or(false) && tag.signature_holds(params, issuer_pk);

    let report = UseReport { challenge, first_equation, second_equation, binding, signature };
    if !report.is_valid() {
        log::debug!("{} presentation failed: {:?}", verifier_id, report.failures());
    }
    report
}

impl UseProof {
    pub fn to_fields(&self) -> Vec<Vec<u8>> {
        vec![
            g1_to_bytes(&self.P_prime).to_vec(),
            g1_to_bytes(&self.Q_prime).to_vec(),
            self.c.to_bytes_be().to_vec(),
            self.z1.to_bytes_be().to_vec(),
            self.z2.to_bytes_be().to_vec(),
        ]
    }

    pub fn from_fields(fields: &[Vec<u8>]) -> Result<Self, Error> {
        if fields.len() != PROOF_FIELDS {
            return Err(Error::MalformedMessage(format!(
                "a use proof has {} fields, got {}",
                PROOF_FIELDS,
                fields.len()
            )));
        }
        Ok(Self {
            P_prime: parse_g1_projective(&fields[0])?,
            Q_prime: parse_g1_projective(&fields[1])?,
            c: Scalar::from_bytes_be(&fields[2])?,
            z1: Scalar::from_bytes_be(&fields[3])?,
            z2: Scalar::from_bytes_be(&fields[4])?,
        })
    }
}

/// A tag followed by its use proof, flattened into one list.
pub fn encode_presentation(tag: &TicketTag, proof: &UseProof) -> Vec<u8> {
    let mut elements = tag.to_fields();
    elements.extend(proof.to_fields());
    codec::encode(&elements)
}

pub fn decode_presentation(bytes: &[u8]) -> Result<(TicketTag, UseProof), Error> {
    let elements = codec::decode_exact(bytes, TAG_FIELDS + PROOF_FIELDS)?;
    let (tag, proof) = elements.split_at(TAG_FIELDS);
    Ok((TicketTag::from_fields(tag)?, UseProof::from_fields(proof)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ticket::{
            ciphersuites::{Bls12381Sha256, Bls12381Shake256},
            issuance::{issue_ticket, tests::World, HolderTicketSecrets},
            tag::Ticket,
        },
        utils::util::random_bytes,
    };

    fn issued<CS>(n: usize) -> (World, Ticket, HolderTicketSecrets)
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let w = World::new::<CS>(n);
        let (request, secrets) = w.request::<CS>();
        let ticket = issue_ticket::<CS>(
            &w.params,
            w.authority.public_key(),
            w.issuer.private_key(),
            &request,
            &w.recipients(),
            b"e-ticket",
        )
        .unwrap();
        (w, ticket, secrets)
    }

    fn present<CS>(w: &World, ticket: &Ticket, secrets: &HolderTicketSecrets, index: usize, nonce: &[u8]) -> UseProof
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let tag = &ticket.tags[index];
        prove_use::<CS>(
            &w.params,
            w.holder.private_key(),
            w.tracer.public_key(),
            tag,
            secrets.scalar_for(&tag.verifier).unwrap(),
            nonce,
        )
        .unwrap()
    }

    fn check<CS>(w: &World, index: usize, tag: &TicketTag, proof: &UseProof, nonce: &[u8]) -> UseReport
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        verify_use::<CS>(
            &w.params,
            w.issuer.public_key(),
            w.tracer.public_key(),
            &format!("verifier-{}", index + 1),
            &w.verifiers[index],
            tag,
            proof,
            nonce,
            b"e-ticket",
        )
    }

    fn completeness<CS>()
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        for n in [1usize, 2, 6] {
            let (w, ticket, secrets) = issued::<CS>(n);
            for i in 0..n {
                let nonce = random_bytes(NONCE_LEN);
                let proof = present::<CS>(&w, &ticket, &secrets, i, &nonce);
                let report = check::<CS>(&w, i, &ticket.tags[i], &proof, &nonce);
                assert!(report.is_valid(), "verifier {} of {}: {:?}", i, n, report);
                assert_eq!(report.into_result(), Ok(()));
            }
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
    fn flipped_responses_fail_their_equation() {
        let (w, ticket, secrets) = issued::<Bls12381Sha256>(2);
        let nonce = random_bytes(NONCE_LEN);
        let proof = present::<Bls12381Sha256>(&w, &ticket, &secrets, 0, &nonce);

        let mut bad = proof.clone();
        bad.z1 += Scalar::ONE;
        let report = check::<Bls12381Sha256>(&w, 0, &ticket.tags[0], &bad, &nonce);
        assert_eq!(report.failures(), vec![VerificationFailure::UseFirstEquation]);

        let mut bad = proof.clone();
        bad.z2 += Scalar::ONE;
        let report = check::<Bls12381Sha256>(&w, 0, &ticket.tags[0], &bad, &nonce);
        assert_eq!(
            report.failures(),
            vec![VerificationFailure::UseFirstEquation, VerificationFailure::UseSecondEquation]
        );
        assert_eq!(
            report.into_result(),
            Err(Error::CryptographicVerificationFailure(VerificationFailure::UseFirstEquation))
        );
    }

    #[test]
    fn proof_is_bound_to_the_nonce() {
        let (w, ticket, secrets) = issued::<Bls12381Sha256>(1);
        let nonce = random_bytes(NONCE_LEN);
        let proof = present::<Bls12381Sha256>(&w, &ticket, &secrets, 0, &nonce);
        let replayed = check::<Bls12381Sha256>(&w, 0, &ticket.tags[0], &proof, &random_bytes(NONCE_LEN));
        assert_eq!(replayed.failures(), vec![VerificationFailure::UseChallenge]);
    }

    #[test]
    fn tag_of_another_verifier_is_not_bound() {
        let (w, ticket, secrets) = issued::<Bls12381Sha256>(2);
        let nonce = random_bytes(NONCE_LEN);
        // holder shows verifier-2's tag to verifier-1
        let proof = present::<Bls12381Sha256>(&w, &ticket, &secrets, 1, &nonce);
        let report = check::<Bls12381Sha256>(&w, 0, &ticket.tags[1], &proof, &nonce);
        assert!(!report.binding);
        assert!(report.signature);
        assert!(!report.is_valid());
    }

    #[test]
    fn forged_signature_is_reported_alone() {
        let (w, mut ticket, secrets) = issued::<Bls12381Sha256>(1);
        let nonce = random_bytes(NONCE_LEN);
        let proof = present::<Bls12381Sha256>(&w, &ticket, &secrets, 0, &nonce);
        ticket.tags[0].Z += w.params.g;
        let report = check::<Bls12381Sha256>(&w, 0, &ticket.tags[0], &proof, &nonce);
        assert_eq!(report.failures(), vec![VerificationFailure::TagSignature]);
    }

    #[test]
    fn presentation_wire_layout() {
        let (w, ticket, secrets) = issued::<Bls12381Sha256>(1);
        let nonce = random_bytes(NONCE_LEN);
        let proof = present::<Bls12381Sha256>(&w, &ticket, &secrets, 0, &nonce);
        let bytes = encode_presentation(&ticket.tags[0], &proof);
        let (tag, decoded) = decode_presentation(&bytes).unwrap();
        assert_eq!(tag, ticket.tags[0]);
        assert_eq!(decoded, proof);
        assert!(matches!(
            decode_presentation(&bytes[..bytes.len() - 3]),
            Err(Error::MalformedMessage(_))
        ));
    }
}
