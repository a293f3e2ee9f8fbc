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

use digest::HashMarker;
use elliptic_curve::hash2curve::{ExpandMsg, ExpandMsgXmd, ExpandMsgXof};
use sha2::Sha256;
use sha3::Shake256;

pub trait TicketCiphersuite: 'static {
    const ID: &'static [u8];
    /// Default seed the public parameters are derived from
    const GENERATOR_SEED: &'static [u8];
    const GENERATOR_SEED_DST: &'static [u8];
    const GENERATOR_DST: &'static [u8];
    const EXPAND_LEN: usize = 48;
    type HashAlg: HashMarker;
    type Expander: ExpandMsg<'static>;

    fn dst(label: &[u8]) -> Vec<u8> {
        [Self::ID, label].concat()
    }
}

pub struct Bls12381Sha256 {}
pub struct Bls12381Shake256 {}

impl TicketCiphersuite for Bls12381Sha256 {
    const ID: &'static [u8] = b"ETICKET_BLS12381G1_XMD:SHA-256_SSWU_RO_";
    const GENERATOR_SEED: &'static [u8] = b"ETICKET_BLS12381G1_XMD:SHA-256_SSWU_RO_PUBLIC_PARAMETER_SEED";
    const GENERATOR_SEED_DST: &'static [u8] = b"ETICKET_BLS12381G1_XMD:SHA-256_SSWU_RO_GENERATOR_SEED_";
    const GENERATOR_DST: &'static [u8] = b"ETICKET_BLS12381G1_XMD:SHA-256_SSWU_RO_GENERATOR_DST_";
    type HashAlg = Sha256;
    type Expander = ExpandMsgXmd<Self::HashAlg>;
}

impl TicketCiphersuite for Bls12381Shake256 {
    const ID: &'static [u8] = b"ETICKET_BLS12381G1_XOF:SHAKE-256_SSWU_RO_";
    const GENERATOR_SEED: &'static [u8] = b"ETICKET_BLS12381G1_XOF:SHAKE-256_SSWU_RO_PUBLIC_PARAMETER_SEED";
    const GENERATOR_SEED_DST: &'static [u8] = b"ETICKET_BLS12381G1_XOF:SHAKE-256_SSWU_RO_GENERATOR_SEED_";
    const GENERATOR_DST: &'static [u8] = b"ETICKET_BLS12381G1_XOF:SHAKE-256_SSWU_RO_GENERATOR_DST_";
    type HashAlg = Shake256;
    type Expander = ExpandMsgXof<Self::HashAlg>;
}
