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

use super::key::{PublicKey, SecretKey};
use crate::utils::util::random_nonzero_scalar;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KeyPair<PK: PublicKey> {
    pub(crate) public: PK,
    pub(crate) private: SecretKey,
}

impl<PK> KeyPair<PK>
where
    PK: PublicKey,
{
    /// Samples a fresh secret `x` and returns `(x, base·x)`.
    pub fn generate(base: &PK::Element) -> Self {
        let private = SecretKey(random_nonzero_scalar());
        Self::from_secret(base, private)
    }

    pub fn from_secret(base: &PK::Element, private: SecretKey) -> Self {
        let public = PK::from_secret(base, &private);
        Self { public, private }
    }

    pub fn public_key(&self) -> &PK {
        &self.public
    }

    pub fn private_key(&self) -> &SecretKey {
        &self.private
    }

    /// Returns the couple `(sk, pk)`.
    pub fn into_parts(self) -> (SecretKey, PK) {
        (self.private, self.public)
    }
}
