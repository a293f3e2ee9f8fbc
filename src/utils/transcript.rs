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

use super::util::{g1_to_bytes, hash_to_scalar};
use crate::{errors::Error, ticket::ciphersuites::TicketCiphersuite};

/// Fiat-Shamir transcript.
///
/// Every absorbed value is written as `I2OSP(len(label), 1) || label ||
/// I2OSP(len(value), 4) || value`, so two different sequences of appends
/// never serialize to the same bytes.
#[derive(Clone, Debug)]
pub struct Transcript {
    bytes: Vec<u8>,
}

impl Transcript {
    pub fn new(domain: &[u8]) -> Self {
        let mut t = Self { bytes: Vec::new() };
        t.append_message(b"domain", domain);
        t
    }

    pub fn append_message(&mut self, label: &[u8], value: &[u8]) {
        self.bytes.push(label.len() as u8);
        self.bytes.extend_from_slice(label);
        self.bytes.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.bytes.extend_from_slice(value);
    }

    pub fn append_point(&mut self, label: &[u8], point: &G1Projective) {
        self.append_message(label, &g1_to_bytes(point));
    }

    pub fn challenge<CS>(&self) -> Result<Scalar, Error>
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        hash_to_scalar::<CS>(&self.bytes, &CS::dst(b"CHALLENGE_"))
    }
}
