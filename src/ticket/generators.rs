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

use bls12_381_plus::{G1Projective, G2Projective};
use elliptic_curve::hash2curve::{ExpandMsg, Expander};

use super::ciphersuites::TicketCiphersuite;
use crate::{
    errors::Error,
    utils::{
        codec,
        util::{g1_to_bytes, g2_to_bytes, parse_g1_projective, parse_g2_projective},
    },
};

pub const SCHEME_ID: &[u8] = b"BLS12-381";
/// Order r of the BLS12-381 scalar field, big-endian
pub const FIELD_ORDER_HEX: &str = "73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001";

const G1_GENERATORS: usize = 5;
const DESCRIPTION_FIELDS: usize = 3 + G1_GENERATORS + 1;

/// Bilinear group description shared by every actor of a run.
///
/// All generators are hash-to-curve outputs of a public seed, so nobody knows
/// a discrete log relation between them and every actor holding the same seed
/// rebuilds byte-identical parameters. The seed is never used for secrets.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GroupParameters {
    pub g: G1Projective,
    pub h: G1Projective,
    pub h_tilde: G1Projective,
    pub xi: G1Projective,
    pub theta: G1Projective,
    pub g_frak: G2Projective,
    suite_id: Vec<u8>,
}

impl GroupParameters {
    /// Derives the parameters from `seed`. Deterministic.
    pub fn generate<CS>(seed: &[u8]) -> Self
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let g1 = create_g1_generators::<CS>(seed, G1_GENERATORS);

        let mut v = vec![0u8; CS::EXPAND_LEN];
        expand::<CS>(&[seed, b"G2"].concat(), CS::GENERATOR_SEED_DST, &mut v);
        let g_frak = G2Projective::hash::<CS::Expander>(&v, CS::GENERATOR_DST);

        Self {
            g: g1[0],
            h: g1[1],
            h_tilde: g1[2],
            xi: g1[3],
            theta: g1[4],
            g_frak,
            suite_id: CS::ID.to_vec(),
        }
    }

    /// Serialized description sent to the other side at setup:
    /// `[scheme id, ciphersuite id, field order, g, h, h_tilde, xi, theta, g_frak]`.
    pub fn to_description(&self) -> Vec<u8> {
        let order = hex::decode(FIELD_ORDER_HEX).unwrap_or_default();
        let mut elements: Vec<Vec<u8>> = vec![SCHEME_ID.to_vec(), self.suite_id.clone(), order];
        for p in [&self.g, &self.h, &self.h_tilde, &self.xi, &self.theta] {
            elements.push(g1_to_bytes(p).to_vec());
        }
        elements.push(g2_to_bytes(&self.g_frak).to_vec());
        codec::encode(&elements)
    }

    /// Rebuilds the parameters from a received description and the public seed.
    ///
    /// The generators are rederived from `seed` and must equal the transmitted
    /// ones, so a description that was not produced from the same seed and
    /// ciphersuite is refused.
    pub fn from_description<CS>(bytes: &[u8], seed: &[u8]) -> Result<Self, Error>
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let fields = codec::decode_exact(bytes, DESCRIPTION_FIELDS)?;

        if fields[0] != SCHEME_ID {
            return Err(Error::InvalidParameters(format!(
                "unsupported pairing scheme {:?}",
                String::from_utf8_lossy(&fields[0])
            )));
        }
        if fields[1] != CS::ID {
            return Err(Error::InvalidParameters("ciphersuite mismatch".to_owned()));
        }
        if hex::encode(&fields[2]) != FIELD_ORDER_HEX {
            return Err(Error::InvalidParameters("field order mismatch".to_owned()));
        }

        let mut g1 = Vec::with_capacity(G1_GENERATORS);
        for f in &fields[3..3 + G1_GENERATORS] {
            g1.push(parse_g1_projective(f)?);
        }
        let g_frak = parse_g2_projective(&fields[3 + G1_GENERATORS])?;

        let received = Self {
            g: g1[0],
            h: g1[1],
            h_tilde: g1[2],
            xi: g1[3],
            theta: g1[4],
            g_frak,
            suite_id: CS::ID.to_vec(),
        };

        let expected = Self::generate::<CS>(seed);
        if received != expected {
            return Err(Error::InvalidParameters("generators do not match the seed".to_owned()));
        }

        Ok(received)
    }
}

fn expand<CS>(msg: &[u8], dst: &[u8], out: &mut [u8])
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    // only fails for empty DST or oversized output, both constant here
    if let Ok(mut expander) = CS::Expander::expand_message(&[msg], &[dst], out.len()) {
        expander.fill_bytes(out);
    }
}

fn create_g1_generators<CS>(seed: &[u8], count: usize) -> Vec<G1Projective>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let mut generators = Vec::with_capacity(count);

    let mut v = vec![0u8; CS::EXPAND_LEN];
    let mut buffer = vec![0u8; CS::EXPAND_LEN];

    expand::<CS>(seed, CS::GENERATOR_SEED_DST, &mut v);
    let mut n = 1u32;
    while generators.len() < count {
        v.extend_from_slice(&n.to_be_bytes());
        expand::<CS>(&v, CS::GENERATOR_SEED_DST, &mut buffer);
        v = buffer.clone();
        n += 1;
        let candidate = G1Projective::hash::<CS::Expander>(&v, CS::GENERATOR_DST);
        if !generators.contains(&candidate) {
            generators.push(candidate);
        }
    }

    generators
}
