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

use bls12_381_plus::G1Projective;
use elliptic_curve::hash2curve::ExpandMsg;

use super::{
    ciphersuites::TicketCiphersuite,
    generators::GroupParameters,
    tag::{Presentation, Ticket},
};
use crate::{
    errors::{Error, TraceFailure},
    keys::{
        key::{G1PublicKey, G2PublicKey},
        pair::KeyPair,
    },
    utils::util::g1_to_bytes,
};

/// Holder pseudonym `Y_U` recovered from a ticket.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TracedPseudonym(pub G1Projective);

impl TracedPseudonym {
    /// Two tickets link to the same holder iff their pseudonyms are equal.
    pub fn links(&self, other: &TracedPseudonym) -> bool {
        self.0 == other.0
    }

    pub fn encode(&self) -> String {
        hex::encode(g1_to_bytes(&self.0))
    }
}

fn fail(failure: TraceFailure) -> Error {
    Error::TraceFailed(failure)
}

/// Recomputes every hash commitment and issuer signature of the ticket.
pub fn audit_signatures<CS>(
    params: &GroupParameters,
    issuer_pk: &G2PublicKey,
    ticket: &Ticket,
    ticket_text: &[u8],
) -> Result<(), Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    for (index, tag) in ticket.tags.iter().enumerate() {
        if !tag.hash_matches::<CS>(ticket_text)? {
            return Err(fail(TraceFailure::BadHash { index, verifier: tag.verifier.clone() }));
        }
        if !tag.signature_holds(params, issuer_pk) {
            return Err(fail(TraceFailure::BadSignature { index, verifier: tag.verifier.clone() }));
        }
    }
    Ok(())
}

/// Removes the tracer blinding from every tag, `Y_i = P_i − Q_i·x_T`, and
/// requires all of them to agree with the tracer's own tag. Every presented
/// `(P, Q)` must be one of the ticket's tags.
pub fn recover_pseudonym(
    tracer: &KeyPair<G1PublicKey>,
    tracer_id: &str,
    ticket: &Ticket,
    presented: &[Presentation],
) -> Result<TracedPseudonym, Error> {
    if ticket.tags.is_empty() {
        return Err(fail(TraceFailure::EmptyTicket));
    }
    let x_T = tracer.private_key().0;
    let reference = ticket
        .tag_for(tracer_id)
        .map(|t| t.P - t.Q * x_T)
        .ok_or_else(|| fail(TraceFailure::MissingTracerTag))?;

    for (index, tag) in ticket.tags.iter().enumerate() {
        if tag.P - tag.Q * x_T != reference {
            return Err(fail(TraceFailure::InconsistentPseudonym { index, verifier: tag.verifier.clone() }));
        }
    }

    for (index, shown) in presented.iter().enumerate() {
        if !ticket.tags.iter().any(|t| t.presentation() == *shown) {
            return Err(fail(TraceFailure::TagNotFound { index }));
        }
    }

    Ok(TracedPseudonym(reference))
}

/// [`audit_signatures`] followed by [`recover_pseudonym`].
#[allow(clippy::too_many_arguments)]
pub fn trace<CS>(
    params: &GroupParameters,
    issuer_pk: &G2PublicKey,
    tracer: &KeyPair<G1PublicKey>,
    tracer_id: &str,
    ticket: &Ticket,
    presented: &[Presentation],
    ticket_text: &[u8],
) -> Result<TracedPseudonym, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    audit_signatures::<CS>(params, issuer_pk, ticket, ticket_text)?;
    let pseudonym = recover_pseudonym(tracer, tracer_id, ticket, presented)?;
    log::debug!("traced pseudonym {}", pseudonym.encode());
    Ok(pseudonym)
}
