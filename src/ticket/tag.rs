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

use super::{ciphersuites::TicketCiphersuite, credential::pairing_signature_holds, generators::GroupParameters};
use crate::{
    errors::Error,
    keys::key::{G2PublicKey, SecretKey},
    utils::{
        codec,
        transcript::Transcript,
        util::{g1_to_bytes, parse_g1_projective, parse_utf8, random_scalar, sample_invertible_offset, ScalarExt},
    },
};

/// Fields of one tag on the wire:
/// `verifier, P, Q, E, F, K, s, w, e, Z`
pub const TAG_FIELDS: usize = 10;

/// One verifier's share of a ticket.
///
/// `(P, Q)` hide the holder pseudonym under the tracer key, `(E, F, K)` bind
/// the tag to the verifier key and `Z` is the issuer signature over
/// `g + h·w + h_tilde·s`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TicketTag {
    pub verifier: String,
    pub P: G1Projective,
    pub Q: G1Projective,
    pub E: G1Projective,
    pub F: G1Projective,
    pub K: G1Projective,
    pub s: Scalar,
    pub w: Scalar,
    pub e: Scalar,
    pub Z: G1Projective,
}

/// The part of a tag a verifier sees when the ticket is used; what the
/// tracer later has to find inside the ticket.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Presentation {
    pub P: G1Projective,
    pub Q: G1Projective,
}

impl TicketTag {
    /// `s = H(verifier || P || Q || E || F || K || ticket_text)`
    pub fn hash_commitment<CS>(
        verifier: &str,
        P: &G1Projective,
        Q: &G1Projective,
        E: &G1Projective,
        F: &G1Projective,
        K: &G1Projective,
        ticket_text: &[u8],
    ) -> Result<Scalar, Error>
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let mut t = Transcript::new(&CS::dst(b"TAG_HASH_"));
        t.append_message(b"verifier", verifier.as_bytes());
        t.append_point(b"P", P);
        t.append_point(b"Q", Q);
        t.append_point(b"E", E);
        t.append_point(b"F", F);
        t.append_point(b"K", K);
        t.append_message(b"text", ticket_text);
        t.challenge::<CS>()
    }

    /// Issuer side: hash the bundle and sign it with fresh `(w, e)`.
    #[allow(clippy::too_many_arguments)]
    pub fn sign<CS>(
        params: &GroupParameters,
        issuer_sk: &SecretKey,
        verifier: &str,
        P: G1Projective,
        Q: G1Projective,
        E: G1Projective,
        F: G1Projective,
        K: G1Projective,
        ticket_text: &[u8],
    ) -> Result<Self, Error>
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let s = Self::hash_commitment::<CS>(verifier, &P, &Q, &E, &F, &K, ticket_text)?;
        let w = random_scalar();
        let (e, inv) = sample_invertible_offset(&issuer_sk.0);
        let Z = signed_base(params, &w, &s) * inv;

        Ok(Self { verifier: verifier.to_owned(), P, Q, E, F, K, s, w, e, Z })
    }

    /// Recomputes `s` from the bundle.
    pub fn hash_matches<CS>(&self, ticket_text: &[u8]) -> Result<bool, Error>
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let s = Self::hash_commitment::<CS>(&self.verifier, &self.P, &self.Q, &self.E, &self.F, &self.K, ticket_text)?;
        Ok(s == self.s)
    }

    /// `e(Z, W_I + g_frak·e) == e(g + h·w + h_tilde·s, g_frak)`
    pub fn signature_holds(&self, params: &GroupParameters, issuer_pk: &G2PublicKey) -> bool {
        pairing_signature_holds(params, &self.Z, &issuer_pk.0, &self.e, &signed_base(params, &self.w, &self.s))
    }

    pub fn presentation(&self) -> Presentation {
        Presentation { P: self.P, Q: self.Q }
    }

    pub fn to_fields(&self) -> Vec<Vec<u8>> {
        vec![
            self.verifier.as_bytes().to_vec(),
            g1_to_bytes(&self.P).to_vec(),
            g1_to_bytes(&self.Q).to_vec(),
            g1_to_bytes(&self.E).to_vec(),
            g1_to_bytes(&self.F).to_vec(),
            g1_to_bytes(&self.K).to_vec(),
            self.s.to_bytes_be().to_vec(),
            self.w.to_bytes_be().to_vec(),
            self.e.to_bytes_be().to_vec(),
            g1_to_bytes(&self.Z).to_vec(),
        ]
    }

    pub fn from_fields(fields: &[Vec<u8>]) -> Result<Self, Error> {
        if fields.len() != TAG_FIELDS {
            return Err(Error::MalformedMessage(format!(
                "a tag has {} fields, got {}",
                TAG_FIELDS,
                fields.len()
            )));
        }
        Ok(Self {
            verifier: parse_utf8(&fields[0])?,
            P: parse_g1_projective(&fields[1])?,
            Q: parse_g1_projective(&fields[2])?,
            E: parse_g1_projective(&fields[3])?,
            F: parse_g1_projective(&fields[4])?,
            K: parse_g1_projective(&fields[5])?,
            s: Scalar::from_bytes_be(&fields[6])?,
            w: Scalar::from_bytes_be(&fields[7])?,
            e: Scalar::from_bytes_be(&fields[8])?,
            Z: parse_g1_projective(&fields[9])?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(&self.to_fields())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_fields(&codec::decode_exact(bytes, TAG_FIELDS)?)
    }
}

impl Presentation {
    pub fn to_fields(&self) -> [Vec<u8>; 2] {
        [g1_to_bytes(&self.P).to_vec(), g1_to_bytes(&self.Q).to_vec()]
    }
}

fn signed_base(params: &GroupParameters, w: &Scalar, s: &Scalar) -> G1Projective {
    params.g + params.h * w + params.h_tilde * s
}

/// All tags issued for one ticket request, the tracer's tag included.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Ticket {
    pub tags: Vec<TicketTag>,
}

impl Ticket {
    pub fn new(tags: Vec<TicketTag>) -> Self {
        Self { tags }
    }

    pub fn tag_for(&self, verifier: &str) -> Option<&TicketTag> {
        self.tags.iter().find(|t| t.verifier == verifier)
    }

    /// `[count, tag_0 fields.., tag_1 fields.., ...]`, each tag `TAG_FIELDS` long.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut elements = Vec::with_capacity(1 + self.tags.len() * TAG_FIELDS);
        elements.push(codec::encode_count(self.tags.len()).to_vec());
        for tag in &self.tags {
            elements.extend(tag.to_fields());
        }
        codec::encode(&elements)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let elements = codec::decode(bytes)?;
        let (count, rest) = elements
            .split_first()
            .ok_or_else(|| Error::MalformedMessage("empty ticket".to_owned()))?;
        let count = codec::decode_count(count)?;
        if rest.len() != count.saturating_mul(TAG_FIELDS) {
            return Err(Error::MalformedMessage(format!(
                "ticket declares {} tags but carries {} fields",
                count,
                rest.len()
            )));
        }
        let tags = rest
            .chunks_exact(TAG_FIELDS)
            .map(TicketTag::from_fields)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tags })
    }
}
