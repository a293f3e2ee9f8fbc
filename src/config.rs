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

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{errors::Error, ticket::ciphersuites::TicketCiphersuite};

pub const MAX_VERIFIERS: usize = 255;

/// What happens when a cryptographic check fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// The run fails.
    #[default]
    Strict,
    /// The failure is logged as a warning and the run goes on. Benchmarking only.
    WarnOnly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Number of verifiers a ticket is issued for, the tracer not included
    pub verifiers: usize,
    /// Largest payload carried by one transport frame
    pub frame_size: usize,
    pub verification: VerificationMode,
    /// Fixed text every tag hash commits to
    pub ticket_text: String,
    /// Seed of the public group parameters, the ciphersuite default if absent
    pub parameter_seed: Option<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            verifiers: 2,
            frame_size: 250,
            verification: VerificationMode::Strict,
            ticket_text: "e-ticket".to_owned(),
            parameter_seed: None,
        }
    }
}

impl ProtocolConfig {
    pub fn from_json(data: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(data).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&data)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.frame_size == 0 {
            return Err(Error::InvalidConfig("frame_size must be positive".to_owned()));
        }
        if self.verifiers > MAX_VERIFIERS {
            return Err(Error::InvalidConfig(format!(
                "at most {} verifiers, got {}",
                MAX_VERIFIERS, self.verifiers
            )));
        }
        Ok(())
    }

    pub fn seed<CS: TicketCiphersuite>(&self) -> Vec<u8> {
        match &self.parameter_seed {
            Some(seed) => seed.as_bytes().to_vec(),
            None => CS::GENERATOR_SEED.to_vec(),
        }
    }

    pub fn strict(&self) -> bool {
        self.verification == VerificationMode::Strict
    }

    pub fn verifier_id(index: usize) -> String {
        format!("verifier-{}", index + 1)
    }
}

/// Identity of the tracing authority in every ticket.
pub const TRACER_ID: &str = "tracer";
