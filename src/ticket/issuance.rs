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

use bls12_381_plus::{pairing, G1Projective, Scalar};
use elliptic_curve::hash2curve::ExpandMsg;
use group::Curve;

use super::{
    ciphersuites::TicketCiphersuite,
    credential::Credential,
    generators::GroupParameters,
    tag::{Ticket, TicketTag},
};
use crate::{
    errors::{Error, RejectReason},
    keys::key::{G1PublicKey, G2PublicKey, SecretKey},
    utils::{
        codec,
        transcript::Transcript,
        util::{
            g1_to_bytes, hash_to_scalar, invert, parse_g1_projective, parse_utf8, random_bytes, random_nonzero_scalar,
            random_scalar, ScalarExt,
        },
    },
};

const HEADER_FIELDS: usize = 12;
const TAG_COMMITMENT_FIELDS: usize = 6;
const PSEUDONYM_SEED_LEN: usize = 32;

/// Someone a ticket tag is issued for.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Recipient {
    pub id: String,
    pub key: G1PublicKey,
    pub tracer: bool,
}

impl Recipient {
    pub fn verifier(id: &str, key: G1PublicKey) -> Self {
        Self { id: id.to_owned(), key, tracer: false }
    }

    pub fn tracer(id: &str, key: G1PublicKey) -> Self {
        Self { id: id.to_owned(), key, tracer: true }
    }

    /// Verifier keys live on `g`, the tracer key on `xi`.
    pub fn base(&self, params: &GroupParameters) -> G1Projective {
        if self.tracer {
            params.xi
        } else {
            params.g
        }
    }
}

/// Per-recipient part of a ticket request: the blinded pseudonym `(P, Q)`,
/// its commitments and the response for `D`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TagCommitment {
    pub verifier: String,
    pub P: G1Projective,
    pub Q: G1Projective,
    pub P_prime: G1Projective,
    pub Q_prime: G1Projective,
    pub z_D: Scalar,
}

/// Ticket request sent by the holder to the issuer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TicketRequest {
    pub sigma_bar: G1Projective,
    pub sigma_tilde: G1Projective,
    pub d: G1Projective,
    pub T1: G1Projective,
    pub T2: G1Projective,
    pub c: Scalar,
    pub z_e: Scalar,
    pub z_v2: Scalar,
    pub z_v3: Scalar,
    pub z_v: Scalar,
    pub z_xu: Scalar,
    pub tags: Vec<TagCommitment>,
}

/// What the holder keeps after a request: the `D_i` derived from the
/// per-ticket pseudonym seed for each recipient, needed later for the use proofs.
#[derive(Clone, PartialEq, Eq)]
pub struct HolderTicketSecrets {
    scalars: Vec<(String, Scalar)>,
}

impl HolderTicketSecrets {
    pub fn scalar_for(&self, verifier: &str) -> Option<&Scalar> {
        self.scalars.iter().find(|(id, _)| id == verifier).map(|(_, d)| d)
    }
}

impl core::fmt::Debug for HolderTicketSecrets {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HolderTicketSecrets").field("tags", &self.scalars.len()).finish()
    }
}

/// `D_i = H(z || id_i)`
fn pseudonym_scalar<CS>(seed: &[u8], verifier: &str) -> Result<Scalar, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    hash_to_scalar::<CS>(&[seed, verifier.as_bytes()].concat(), &CS::dst(b"PSEUDONYM_"))
}

fn request_challenge<CS>(
    sigma_bar: &G1Projective,
    sigma_tilde: &G1Projective,
    d: &G1Projective,
    T1: &G1Projective,
    T2: &G1Projective,
    tags: &[TagCommitment],
) -> Result<Scalar, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let mut t = Transcript::new(&CS::dst(b"TICKET_REQUEST_"));
    t.append_point(b"sigma_bar", sigma_bar);
    t.append_point(b"sigma_tilde", sigma_tilde);
    t.append_point(b"d", d);
    t.append_point(b"T1", T1);
    t.append_point(b"T2", T2);
    t.append_message(b"count", &codec::encode_count(tags.len()));
    for tag in tags {
        t.append_message(b"id", tag.verifier.as_bytes());
        t.append_point(b"P", &tag.P);
        t.append_point(b"Q", &tag.Q);
        t.append_point(b"P'", &tag.P_prime);
        t.append_point(b"Q'", &tag.Q_prime);
    }
    t.challenge::<CS>()
}

/// Holder side: blinds the credential and proves, in one Fiat-Shamir proof,
/// possession of it together with the opening of every `(P_i, Q_i)`.
///
/// `recipients` are the verifiers followed by the tracer, in the order the
/// issuer expects them.
pub fn build_ticket_request<CS>(
    params: &GroupParameters,
    credential: &Credential,
    holder_sk: &SecretKey,
    tracer_pk: &G1PublicKey,
    recipients: &[String],
) -> Result<(TicketRequest, HolderTicketSecrets), Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let x_u = holder_sk.0;
    let Credential { sigma, r, e } = credential;

    let v1 = random_nonzero_scalar();
    let v3 = invert(&v1)?;
    let v2 = random_scalar();
    let B = params.g + params.h * r + params.theta * x_u;

    let sigma_bar = sigma * v1;
    let sigma_tilde = B * v1 - sigma_bar * e;
    let d = B * v1 - params.h * v2;
    let v = v2 * v3 - r;

    let k_e = random_scalar();
    let k_v2 = random_scalar();
    let k_v3 = random_scalar();
    let k_v = random_scalar();
    let k_xu = random_scalar();

    let T1 = params.h * k_v2 - sigma_bar * k_e;
    let T2 = d * k_v3 + params.h * k_v - params.theta * k_xu;

    let seed = random_bytes(PSEUDONYM_SEED_LEN);
    let mut scalars = Vec::with_capacity(recipients.len());
    let mut nonces = Vec::with_capacity(recipients.len());
    let mut tags = Vec::with_capacity(recipients.len());
    for id in recipients {
        let D = pseudonym_scalar::<CS>(&seed, id)?;
        let k_D = random_scalar();
        tags.push(TagCommitment {
            verifier: id.clone(),
            P: params.theta * x_u + tracer_pk.0 * D,
            Q: params.xi * D,
            P_prime: params.theta * k_xu + tracer_pk.0 * k_D,
            Q_prime: params.xi * k_D,
            z_D: Scalar::ZERO,
        });
        scalars.push((id.clone(), D));
        nonces.push(k_D);
    }

    let c = request_challenge::<CS>(&sigma_bar, &sigma_tilde, &d, &T1, &T2, &tags)?;

    for (tag, (k_D, (_, D))) in tags.iter_mut().zip(nonces.iter().zip(scalars.iter())) {
        tag.z_D = k_D - c * D;
    }

    let request = TicketRequest {
        sigma_bar,
        sigma_tilde,
        d,
        T1,
        T2,
        c,
        z_e: k_e - c * e,
        z_v2: k_v2 - c * v2,
        z_v3: k_v3 - c * v3,
        z_v: k_v - c * v,
        z_xu: k_xu - c * x_u,
        tags,
    };

    Ok((request, HolderTicketSecrets { scalars }))
}

fn reject(reason: RejectReason) -> Error {
    Error::TicketRejected(reason)
}

/// Issuer side check of a ticket request.
///
/// Structural problems (recipient list) are reported before any
/// cryptographic check. Failures come back as `Error::TicketRejected`.
pub fn verify_ticket_request<CS>(
    params: &GroupParameters,
    authority_pk: &G2PublicKey,
    tracer_pk: &G1PublicKey,
    request: &TicketRequest,
    recipients: &[Recipient],
) -> Result<(), Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let tracer = recipients
        .iter()
        .find(|r| r.tracer)
        .ok_or_else(|| reject(RejectReason::MissingTracerTag))?;
    if !request.tags.iter().any(|t| t.verifier == tracer.id) {
        return Err(reject(RejectReason::MissingTracerTag));
    }
    if request.tags.len() != recipients.len() {
        return Err(reject(RejectReason::MismatchedVerifierCount {
            expected: recipients.len(),
            got: request.tags.len(),
        }));
    }
    for (index, (tag, recipient)) in request.tags.iter().zip(recipients).enumerate() {
        if tag.verifier != recipient.id {
            return Err(reject(RejectReason::UnexpectedVerifier {
                index,
                expected: recipient.id.clone(),
                got: tag.verifier.clone(),
            }));
        }
    }

    let TicketRequest { sigma_bar, sigma_tilde, d, T1, T2, c, .. } = request;

    if bool::from(sigma_bar.is_identity()) {
        return Err(reject(RejectReason::DegenerateCredential));
    }
    let lhs = pairing(&sigma_bar.to_affine(), &authority_pk.0.to_affine());
    let rhs = pairing(&sigma_tilde.to_affine(), &params.g_frak.to_affine());
    if lhs != rhs {
        return Err(reject(RejectReason::BadPairing));
    }

    let expected_c = request_challenge::<CS>(sigma_bar, sigma_tilde, d, T1, T2, &request.tags)
        .map_err(|_| reject(RejectReason::BadHash))?;
    if expected_c != *c {
        return Err(reject(RejectReason::BadHash));
    }

    let T1_check = params.h * request.z_v2 - sigma_bar * request.z_e + (sigma_tilde - d) * c;
    if T1_check != *T1 {
        return Err(reject(RejectReason::BadResponse("T1".to_owned())));
    }
    let T2_check =
        d * request.z_v3 + params.h * request.z_v - params.theta * request.z_xu + params.g * c;
    if T2_check != *T2 {
        return Err(reject(RejectReason::BadResponse("T2".to_owned())));
    }
    for tag in &request.tags {
        let P_check = params.theta * request.z_xu + tracer_pk.0 * tag.z_D + tag.P * c;
        if P_check != tag.P_prime {
            return Err(reject(RejectReason::BadResponse(format!("P' of {}", tag.verifier))));
        }
        let Q_check = params.xi * tag.z_D + tag.Q * c;
        if Q_check != tag.Q_prime {
            return Err(reject(RejectReason::BadResponse(format!("Q' of {}", tag.verifier))));
        }
    }

    Ok(())
}

/// Issues one signed tag per recipient on an already checked request.
pub fn sign_ticket<CS>(
    params: &GroupParameters,
    issuer_sk: &SecretKey,
    request: &TicketRequest,
    recipients: &[Recipient],
    ticket_text: &[u8],
) -> Result<Ticket, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    if request.tags.len() != recipients.len() {
        return Err(reject(RejectReason::MismatchedVerifierCount {
            expected: recipients.len(),
            got: request.tags.len(),
        }));
    }

    let mut tags = Vec::with_capacity(recipients.len());
    for (commitment, recipient) in request.tags.iter().zip(recipients) {
        let d_i = random_nonzero_scalar();
        let E = recipient.base(params) * d_i;
        let F = recipient.key.0 * d_i;
        let K = recipient.key.0;
        tags.push(TicketTag::sign::<CS>(
            params,
            issuer_sk,
            &recipient.id,
            commitment.P,
            commitment.Q,
            E,
            F,
            K,
            ticket_text,
        )?);
    }
    Ok(Ticket::new(tags))
}

/// [`verify_ticket_request`] followed by [`sign_ticket`].
pub fn issue_ticket<CS>(
    params: &GroupParameters,
    authority_pk: &G2PublicKey,
    issuer_sk: &SecretKey,
    request: &TicketRequest,
    recipients: &[Recipient],
    ticket_text: &[u8],
) -> Result<Ticket, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let tracer_pk = recipients
        .iter()
        .find(|r| r.tracer)
        .map(|r| r.key)
        .ok_or_else(|| reject(RejectReason::MissingTracerTag))?;
    verify_ticket_request::<CS>(params, authority_pk, &tracer_pk, request, recipients)?;
    sign_ticket::<CS>(params, issuer_sk, request, recipients, ticket_text)
}

impl TicketRequest {
    /// `[sigma_bar, sigma_tilde, d, T1, T2, c, z_e, z_v2, z_v3, z_v, z_xu,
    /// count, (id, P, Q, P', Q', z_D)*]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut elements: Vec<Vec<u8>> = Vec::with_capacity(HEADER_FIELDS + TAG_COMMITMENT_FIELDS * self.tags.len());
        for p in [&self.sigma_bar, &self.sigma_tilde, &self.d, &self.T1, &self.T2] {
            elements.push(g1_to_bytes(p).to_vec());
        }
        for s in [&self.c, &self.z_e, &self.z_v2, &self.z_v3, &self.z_v, &self.z_xu] {
            elements.push(s.to_bytes_be().to_vec());
        }
        elements.push(codec::encode_count(self.tags.len()).to_vec());
        for tag in &self.tags {
            elements.push(tag.verifier.as_bytes().to_vec());
            elements.push(g1_to_bytes(&tag.P).to_vec());
            elements.push(g1_to_bytes(&tag.Q).to_vec());
            elements.push(g1_to_bytes(&tag.P_prime).to_vec());
            elements.push(g1_to_bytes(&tag.Q_prime).to_vec());
            elements.push(tag.z_D.to_bytes_be().to_vec());
        }
        codec::encode(&elements)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let elements = codec::decode(bytes)?;
        if elements.len() < HEADER_FIELDS {
            return Err(Error::MalformedMessage(format!(
                "ticket request needs at least {} fields, got {}",
                HEADER_FIELDS,
                elements.len()
            )));
        }
        let (header, rest) = elements.split_at(HEADER_FIELDS);
        let count = codec::decode_count(&header[11])?;
        if rest.len() != count.saturating_mul(TAG_COMMITMENT_FIELDS) {
            return Err(Error::MalformedMessage(format!(
                "ticket request declares {} tags but carries {} fields",
                count,
                rest.len()
            )));
        }

        let tags = rest
            .chunks_exact(TAG_COMMITMENT_FIELDS)
            .map(|f| {
                Ok(TagCommitment {
                    verifier: parse_utf8(&f[0])?,
                    P: parse_g1_projective(&f[1])?,
                    Q: parse_g1_projective(&f[2])?,
                    P_prime: parse_g1_projective(&f[3])?,
                    Q_prime: parse_g1_projective(&f[4])?,
                    z_D: Scalar::from_bytes_be(&f[5])?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            sigma_bar: parse_g1_projective(&header[0])?,
            sigma_tilde: parse_g1_projective(&header[1])?,
            d: parse_g1_projective(&header[2])?,
            T1: parse_g1_projective(&header[3])?,
            T2: parse_g1_projective(&header[4])?,
            c: Scalar::from_bytes_be(&header[5])?,
            z_e: Scalar::from_bytes_be(&header[6])?,
            z_v2: Scalar::from_bytes_be(&header[7])?,
            z_v3: Scalar::from_bytes_be(&header[8])?,
            z_v: Scalar::from_bytes_be(&header[9])?,
            z_xu: Scalar::from_bytes_be(&header[10])?,
            tags,
        })
    }
}
