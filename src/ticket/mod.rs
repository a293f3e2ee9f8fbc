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

//! Pairing-based anonymous e-tickets over BLS12-381.
//!
//! An authority registers a holder by signing a credential on the holder's
//! public key. The holder later blinds that credential and asks an issuer for
//! a ticket, proving in zero knowledge that it owns a valid credential and
//! that each per-verifier tag hides the same pseudonym. The issuer signs one
//! tag per verifier plus one for the tracing authority. Each verifier checks
//! only its own tag and a fresh proof of knowledge bound to its nonce, so
//! verifiers cannot link presentations. The tracer alone can remove the
//! blinding, recover the holder pseudonym and detect a forged or reused
//! ticket.

/// Module for ciphersuites
pub mod ciphersuites;
/// Registration credential
pub mod credential;
/// Module for the public group parameters
pub mod generators;
/// Ticket request NIZK and tag issuance
pub mod issuance;
/// Textbook Schnorr proof over a toy group
pub mod schnorr;
/// Ticket tags and their wire layout
pub mod tag;
/// Tracing and double-use detection
pub mod tracing;
/// Presentation of a tag to a verifier
pub mod verification;
