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

//! Textbook Schnorr proof over the multiplicative group of a small prime
//! field. Exponents live modulo `p - 1`, the order of the group.

use crate::errors::Error;

/// `(Z/pZ)*` with a fixed generator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ToyGroup {
    pub p: u64,
    pub g: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SchnorrProof {
    pub commitment: u64,
    pub challenge: u64,
    pub response: u64,
}

pub fn mod_pow(base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let m = modulus as u128;
    let mut acc: u128 = 1;
    let mut b = base as u128 % m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc * b % m;
        }
        b = b * b % m;
        exp >>= 1;
    }
    acc as u64
}

/// Inverse of `a` modulo `m` with the extended Euclidean algorithm.
pub fn mod_inverse(a: u64, m: u64) -> Result<u64, Error> {
    let (mut old_r, mut r) = (a as i128 % m as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }
    if old_r != 1 {
        return Err(Error::ModularInverseUndefined);
    }
    Ok(old_s.rem_euclid(m as i128) as u64)
}

impl ToyGroup {
    pub fn new(p: u64, g: u64) -> Self {
        Self { p, g }
    }

    fn order(&self) -> u64 {
        self.p - 1
    }

    pub fn public_key(&self, x: u64) -> u64 {
        mod_pow(self.g, x, self.p)
    }

    /// `t = g^k`, `s = (k - c·x) mod (p - 1)`.
    pub fn prove(&self, x: u64, k: u64, challenge: u64) -> SchnorrProof {
        let q = self.order() as i128;
        let response = (k as i128 - challenge as i128 * x as i128).rem_euclid(q) as u64;
        SchnorrProof { commitment: mod_pow(self.g, k, self.p), challenge, response }
    }

    /// `g^s · Y^c == t`
    pub fn verify(&self, y: u64, proof: &SchnorrProof) -> bool {
        let lhs = mod_pow(self.g, proof.response, self.p) as u128 * mod_pow(y, proof.challenge, self.p) as u128
            % self.p as u128;
        lhs as u64 == proof.commitment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toy_scenario() {
        let group = ToyGroup::new(23, 5);
        let y = group.public_key(6);
        assert_eq!(y, 8);

        let proof = group.prove(6, 4, 3);
        assert_eq!(proof.commitment, 4);
        assert_eq!(proof.response, 8);
        assert!(group.verify(y, &proof));

        // reducing modulo p instead of the group order gives 9, which does not verify
        let wrong = SchnorrProof { response: 9, ..proof };
        assert!(!group.verify(y, &wrong));
    }

    #[test]
    fn every_secret_verifies() {
        let group = ToyGroup::new(23, 5);
        for x in 1..22 {
            let y = group.public_key(x);
            for c in 0..22 {
                let proof = group.prove(x, 7, c);
                assert!(group.verify(y, &proof), "x={} c={}", x, c);
            }
        }
    }

    #[test]
    fn inverses() {
        assert_eq!(mod_inverse(3, 22).unwrap(), 15);
        assert_eq!(mod_inverse(5, 23).unwrap(), 14);
        assert_eq!(mod_inverse(2, 22), Err(Error::ModularInverseUndefined));
        assert_eq!(mod_pow(5, 22, 23), 1);
    }
}
