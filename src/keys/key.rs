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

use bls12_381_plus::{G1Projective, G2Projective, Scalar};

use crate::{
    errors::Error,
    utils::util::{g1_to_bytes, g2_to_bytes, parse_g1_projective, parse_g2_projective, ScalarExt, SCALAR_LEN},
};

pub trait PublicKey: Sized + Clone {
    /// Group element the key lives in
    type Element;

    fn from_secret(base: &Self::Element, sk: &SecretKey) -> Self;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, Error>;

    fn encode(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// Public key `Y = base·x` in G1 (holders, verifiers and the tracer).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct G1PublicKey(pub G1Projective);

/// Public key `W = g_frak·x` in G2 (authority and issuer).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct G2PublicKey(pub G2Projective);

impl PublicKey for G1PublicKey {
    type Element = G1Projective;

    fn from_secret(base: &G1Projective, sk: &SecretKey) -> Self {
        Self(base * sk.0)
    }

    fn to_bytes(&self) -> Vec<u8> {
        g1_to_bytes(&self.0).to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(parse_g1_projective(bytes)?))
    }
}

impl PublicKey for G2PublicKey {
    type Element = G2Projective;

    fn from_secret(base: &G2Projective, sk: &SecretKey) -> Self {
        Self(base * sk.0)
    }

    fn to_bytes(&self) -> Vec<u8> {
        g2_to_bytes(&self.0).to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(parse_g2_projective(bytes)?))
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(pub(crate) Scalar);

impl SecretKey {
    //in BE order
    pub fn to_bytes(&self) -> [u8; SCALAR_LEN] {
        self.0.to_bytes_be()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(Scalar::from_bytes_be(bytes)?))
    }
}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}
