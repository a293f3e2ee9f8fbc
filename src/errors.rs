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

use thiserror::Error;

use crate::engine::context::Role;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Cryptographic verification failed: {0}")]
    CryptographicVerificationFailure(VerificationFailure),
    #[error("Ticket request rejected: {0}")]
    TicketRejected(RejectReason),
    #[error("Tracing failed: {0}")]
    TraceFailed(TraceFailure),
    /// Only raised internally, callers resample when they see it
    #[error("Modular inverse undefined")]
    ModularInverseUndefined,
    #[error("Transport failure")]
    TransportFailure,
    #[error("Unexpected message in state {state} ({detail})")]
    UnexpectedMessage { state: usize, detail: String },
    #[error("Unknown state index {0}")]
    UnknownState(usize),
    #[error("No {0} actor in this context")]
    MissingActor(Role),
    #[error("Protocol step out of order: {0}")]
    OutOfOrder(String),
    #[error("Invalid group parameters: {0}")]
    InvalidParameters(String),
    #[error("Error during deserialization: {0}")]
    DeserializationError(String),
    #[error("Error during hash to scalar computation")]
    HashToScalarError,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Which check of a verification did not hold
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("credential pairing equation")]
    CredentialPairing,
    #[error("use proof challenge")]
    UseChallenge,
    #[error("use proof first response equation")]
    UseFirstEquation,
    #[error("use proof second response equation")]
    UseSecondEquation,
    #[error("tag is not bound to this verifier")]
    TagBinding,
    #[error("tag signature")]
    TagSignature,
}

/// Reasons an issuer refuses a ticket request.
///
/// The first four are cryptographic and may be downgraded to warnings by
/// [`crate::config::VerificationMode::WarnOnly`]; the structural ones never are.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    #[error("blinded credential is the identity element")]
    DegenerateCredential,
    #[error("blinded credential pairing check failed")]
    BadPairing,
    #[error("challenge does not match the commitments")]
    BadHash,
    #[error("response equation {0} does not hold")]
    BadResponse(String),
    #[error("expected {expected} tags, got {got}")]
    MismatchedVerifierCount { expected: usize, got: usize },
    #[error("tag {index} is for {got}, expected {expected}")]
    UnexpectedVerifier { index: usize, expected: String, got: String },
    #[error("no tag for the tracing authority")]
    MissingTracerTag,
}

impl RejectReason {
    pub fn is_cryptographic(&self) -> bool {
        matches!(
            self,
            Self::DegenerateCredential | Self::BadPairing | Self::BadHash | Self::BadResponse(_)
        )
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TraceFailure {
    #[error("tag {index} ({verifier}) decodes to a different pseudonym")]
    InconsistentPseudonym { index: usize, verifier: String },
    #[error("presented tag {index} is not part of the ticket")]
    TagNotFound { index: usize },
    #[error("hash commitment of tag {index} ({verifier}) does not match")]
    BadHash { index: usize, verifier: String },
    #[error("issuer signature of tag {index} ({verifier}) is invalid")]
    BadSignature { index: usize, verifier: String },
    #[error("no tag for the tracing authority")]
    MissingTracerTag,
    #[error("ticket has no tags")]
    EmptyTicket,
}

impl TraceFailure {
    pub fn is_cryptographic(&self) -> bool {
        matches!(self, Self::BadHash { .. } | Self::BadSignature { .. })
    }
}
