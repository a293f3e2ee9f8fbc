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

//! On the terminal side state `k` handles the reply to command `k - 1` and
//! issues command `k`. On the holder side state `k` handles command `k` and
//! produces its reply.

use std::fmt;

use elliptic_curve::hash2curve::ExpandMsg;

use super::{
    context::{Actor, Directory, HeldTicket, HolderActor, ProtocolContext, Role},
    Action, Command, Message, StateIndex, MAX_PAYLOAD,
};
use crate::{
    errors::{Error, VerificationFailure},
    keys::{
        key::{G1PublicKey, PublicKey},
        pair::KeyPair,
    },
    ticket::{
        ciphersuites::TicketCiphersuite,
        credential::Credential,
        generators::GroupParameters,
        issuance::{build_ticket_request, sign_ticket, verify_ticket_request, TicketRequest},
        tag::{Ticket, TicketTag},
        tracing::{audit_signatures, recover_pseudonym},
        verification::{decode_presentation, encode_presentation, prove_use, verify_use, NONCE_LEN},
    },
    utils::{
        codec,
        util::{parse_utf8, random_bytes},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Select,
    Parameters,
    Directory,
    HolderKey,
    Credential,
    TicketRequest,
    TicketIssue,
    TicketTag,
    UseChallenge,
    UseProof,
    UseVerdict,
    Trace,
}

const STATES: [State; 12] = [
    State::Select,
    State::Parameters,
    State::Directory,
    State::HolderKey,
    State::Credential,
    State::TicketRequest,
    State::TicketIssue,
    State::TicketTag,
    State::UseChallenge,
    State::UseProof,
    State::UseVerdict,
    State::Trace,
];

impl State {
    pub fn from_index(index: StateIndex) -> Result<Self, Error> {
        STATES.get(index).copied().ok_or(Error::UnknownState(index))
    }

    pub fn index(self) -> StateIndex {
        self as StateIndex
    }

    pub fn name(self) -> &'static str {
        match self {
            State::Select => "select",
            State::Parameters => "parameters",
            State::Directory => "directory",
            State::HolderKey => "holder_key",
            State::Credential => "credential",
            State::TicketRequest => "ticket_request",
            State::TicketIssue => "ticket_issue",
            State::TicketTag => "ticket_tag",
            State::UseChallenge => "use_challenge",
            State::UseProof => "use_proof",
            State::UseVerdict => "use_verdict",
            State::Trace => "trace",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index(), self.name())
    }
}

fn cont(next: State, command: Command, payload: Vec<u8>) -> Action {
    Action::Continue { next: next.index(), command, payload }
}

fn get(next: State) -> Action {
    cont(next, Command::Get { max_len: MAX_PAYLOAD }, Vec::new())
}

fn put(next: State, payload: Vec<u8>) -> Action {
    cont(next, Command::Put, payload)
}

fn reply(next: State, payload: Vec<u8>) -> Action {
    cont(next, Command::Respond, payload)
}

fn ack(next: State) -> Action {
    reply(next, Vec::new())
}

fn unexpected(state: State, msg: &Message) -> Error {
    Error::UnexpectedMessage { state: state.index(), detail: format!("{} not handled here", msg.kind()) }
}

pub(crate) fn terminal_step<CS>(ctx: &mut ProtocolContext, state: State, msg: Message) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    match (state, msg) {
        (State::Select, Message::Request) => {
            log::info!("selecting the holder application");
            Ok(cont(State::Parameters, Command::Select, Vec::new()))
        }
        (State::Parameters, Message::Success) => Ok(put(State::Directory, ctx.params()?.to_description())),
        (State::Directory, Message::Success) => Ok(put(State::HolderKey, ctx.directory()?.to_bytes())),
        (State::HolderKey, Message::Success) => Ok(get(State::Credential)),
        (State::Credential, Message::Data(bytes)) => issue_credential(ctx, &bytes),
        (State::TicketRequest, Message::Success) => Ok(get(State::TicketIssue)),
        (State::TicketIssue, Message::Data(bytes)) => issue_ticket::<CS>(ctx, &bytes),
        (State::TicketTag, Message::Success) => send_next_tag(ctx),
        (State::UseChallenge, Message::Success) => next_challenge(ctx),
        (State::UseProof, Message::Success) => Ok(get(State::UseVerdict)),
        (State::UseVerdict, Message::Data(bytes)) => {
            check_presentation::<CS>(ctx, &bytes)?;
            next_challenge(ctx)
        }
        (State::Trace, Message::Data(bytes)) => trace_ticket::<CS>(ctx, &bytes),
        (state, msg) => Err(unexpected(state, &msg)),
    }
}

fn issue_credential(ctx: &ProtocolContext, bytes: &[u8]) -> Result<Action, Error> {
    let fields = codec::decode_exact(bytes, 1)?;
    let holder_pk = G1PublicKey::from_bytes(&fields[0])?;
    log::debug!("holder key {}", holder_pk.encode());

    let credential = Credential::issue(ctx.params()?, ctx.authority()?.keys.private_key(), &holder_pk);
    log::info!("credential issued");
    Ok(put(State::TicketRequest, credential.to_bytes()))
}

fn issue_ticket<CS>(ctx: &mut ProtocolContext, bytes: &[u8]) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let request = TicketRequest::from_bytes(bytes)?;
    let params = ctx.params()?;
    let directory = ctx.directory()?;
    let recipients = directory.recipients();

    match verify_ticket_request::<CS>(params, &directory.authority, &directory.tracer.key, &request, &recipients) {
        Ok(()) => {}
        Err(Error::TicketRejected(reason)) if reason.is_cryptographic() => {
            ctx.enforce(Error::TicketRejected(reason))?
        }
        Err(e) => return Err(e),
    }

    let ticket = sign_ticket::<CS>(
        params,
        ctx.issuer()?.keys.private_key(),
        &request,
        &recipients,
        ctx.config.ticket_text.as_bytes(),
    )?;
    log::info!("ticket issued with {} tags", ticket.tags.len());

    ctx.issuer_mut()?.issued += 1;
    ctx.session.issued = Some(ticket);
    ctx.session.tag_cursor = 0;
    send_next_tag(ctx)
}

fn send_next_tag(ctx: &mut ProtocolContext) -> Result<Action, Error> {
    let ticket = ctx
        .session
        .issued
        .as_ref()
        .ok_or_else(|| Error::OutOfOrder("no ticket to send".to_owned()))?;
    let cursor = ctx.session.tag_cursor;
    let tag = ticket
        .tags
        .get(cursor)
        .ok_or_else(|| Error::OutOfOrder(format!("tag {} was never issued", cursor)))?;

    let payload = tag.to_bytes();
    let next = if cursor + 1 < ticket.tags.len() { State::TicketTag } else { State::UseChallenge };
    ctx.session.tag_cursor += 1;
    Ok(put(next, payload))
}

/// Sends the nonce of the next verifier, or asks for the ticket bundle once
/// every verifier has seen the ticket.
fn next_challenge(ctx: &mut ProtocolContext) -> Result<Action, Error> {
    let cursor = ctx.session.verifier_cursor;
    if cursor >= ctx.config.verifiers {
        log::info!("all {} verifiers done, asking for the ticket bundle", cursor);
        return Ok(get(State::Trace));
    }

    let id = ctx.verifier(cursor)?.id.clone();
    let nonce = random_bytes(NONCE_LEN);
    log::debug!("{} nonce {}", id, hex::encode(&nonce));
    let payload = codec::encode(&[id.as_bytes(), nonce.as_slice()]);
    ctx.session.challenge = Some((id, nonce));
    Ok(put(State::UseProof, payload))
}

fn check_presentation<CS>(ctx: &mut ProtocolContext, bytes: &[u8]) -> Result<(), Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let (tag, proof) = decode_presentation(bytes)?;
    let (id, nonce) = ctx
        .session
        .challenge
        .take()
        .ok_or_else(|| Error::OutOfOrder("use proof without a challenge".to_owned()))?;
    let cursor = ctx.session.verifier_cursor;

    let report = {
        let directory = ctx.directory()?;
        verify_use::<CS>(
            ctx.params()?,
            &directory.issuer,
            &directory.tracer.key,
            &id,
            &ctx.verifier(cursor)?.keys,
            &tag,
            &proof,
            &nonce,
            ctx.config.ticket_text.as_bytes(),
        )
    };
    match report.into_result() {
        Ok(()) => log::info!("{} accepted the ticket", id),
        Err(e) => ctx.enforce(e)?,
    }

    ctx.verifier_mut(cursor)?.presentations.push(tag.presentation());
    ctx.session.presented.push(tag.presentation());
    ctx.session.verifier_cursor += 1;
    Ok(())
}

fn trace_ticket<CS>(ctx: &mut ProtocolContext, bytes: &[u8]) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let ticket = Ticket::from_bytes(bytes)?;
    let presented = ctx.session.presented.clone();

    match audit_signatures::<CS>(
        ctx.params()?,
        &ctx.directory()?.issuer,
        &ticket,
        ctx.config.ticket_text.as_bytes(),
    ) {
        Ok(()) => {}
        Err(Error::TraceFailed(failure)) if failure.is_cryptographic() => ctx.enforce(Error::TraceFailed(failure))?,
        Err(e) => return Err(e),
    }

    let pseudonym = {
        let tracer = ctx.tracer()?;
        recover_pseudonym(&tracer.keys, &tracer.id, &ticket, &presented)?
    };

    let seen = ctx.tracer_mut()?.record(pseudonym);
    if seen > 0 {
        log::warn!("pseudonym {} already traced {} time(s): tickets are linked", pseudonym.encode(), seen);
    }
    log::info!("ticket traced to pseudonym {}", pseudonym.encode());
    ctx.session.pseudonym = Some(pseudonym);
    Ok(Action::Succeed)
}

pub(crate) fn holder_step<CS>(ctx: &mut ProtocolContext, state: State, msg: Message) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    match (state, msg) {
        (State::Select, Message::Request) => Ok(ack(State::Parameters)),
        (State::Parameters, Message::Data(bytes)) => load_parameters::<CS>(ctx, &bytes),
        (State::Directory, Message::Data(bytes)) => {
            let directory = Directory::from_bytes(&bytes)?;
            if directory.verifiers.len() != ctx.config.verifiers {
                return Err(Error::UnexpectedMessage {
                    state: state.index(),
                    detail: format!(
                        "directory lists {} verifiers, configuration says {}",
                        directory.verifiers.len(),
                        ctx.config.verifiers
                    ),
                });
            }
            ctx.directory = Some(directory);
            Ok(ack(State::HolderKey))
        }
        (State::HolderKey, Message::Request) => {
            let pk = ctx.holder_actor()?.keys.public_key().to_bytes();
            Ok(reply(State::Credential, codec::encode(&[pk])))
        }
        (State::Credential, Message::Data(bytes)) => store_credential(ctx, &bytes),
        (State::TicketRequest, Message::Request) => request_ticket::<CS>(ctx),
        (State::TicketIssue, Message::Data(bytes)) | (State::TicketTag, Message::Data(bytes)) => {
            store_tag::<CS>(ctx, state, &bytes)
        }
        (State::UseChallenge, Message::Data(bytes)) | (State::UseVerdict, Message::Data(bytes)) => {
            store_challenge(ctx, state, &bytes)
        }
        (State::UseChallenge, Message::Request) | (State::UseVerdict, Message::Request) => {
            let bundle = held(ctx.holder_actor()?)?.ticket.to_bytes();
            log::info!("handing the ticket bundle over for tracing");
            Ok(reply(State::Trace, bundle))
        }
        (State::UseProof, Message::Request) => prove::<CS>(ctx),
        (state, msg) => Err(unexpected(state, &msg)),
    }
}

fn held(holder: &HolderActor) -> Result<&HeldTicket, Error> {
    holder
        .held
        .as_ref()
        .ok_or_else(|| Error::OutOfOrder("no ticket was requested".to_owned()))
}

fn load_parameters<CS>(ctx: &mut ProtocolContext, bytes: &[u8]) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let params = GroupParameters::from_description::<CS>(bytes, &ctx.config.seed::<CS>())?;
    if !ctx.actors.contains_key(&Role::Holder) {
        let keys = KeyPair::<G1PublicKey>::generate(&params.theta);
        log::debug!("holder key generated {}", keys.public_key().encode());
        ctx.actors
            .insert(Role::Holder, Actor::Holder(HolderActor { keys, credential: None, held: None }));
    }
    ctx.params = Some(params);
    Ok(ack(State::Directory))
}

fn store_credential(ctx: &mut ProtocolContext, bytes: &[u8]) -> Result<Action, Error> {
    let credential = Credential::from_bytes(bytes)?;
    let valid = credential.verify(
        ctx.params()?,
        &ctx.directory()?.authority,
        ctx.holder_actor()?.keys.public_key(),
    );
    if !valid {
        ctx.enforce(Error::CryptographicVerificationFailure(VerificationFailure::CredentialPairing))?;
    } else {
        log::info!("credential verified");
    }
    ctx.holder_mut()?.credential = Some(credential);
    Ok(ack(State::TicketRequest))
}

fn request_ticket<CS>(ctx: &mut ProtocolContext) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let (request, secrets) = {
        let holder = ctx.holder_actor()?;
        let credential = holder
            .credential
            .as_ref()
            .ok_or_else(|| Error::OutOfOrder("no credential to request a ticket with".to_owned()))?;
        let directory = ctx.directory()?;
        build_ticket_request::<CS>(
            ctx.params()?,
            credential,
            holder.keys.private_key(),
            &directory.tracer.key,
            &directory.ids(),
        )?
    };

    let payload = request.to_bytes();
    log::debug!("ticket request of {} bytes for {} tags", payload.len(), request.tags.len());
    ctx.holder_mut()?.held = Some(HeldTicket { secrets, requested: request.tags, ticket: Ticket::default() });
    Ok(reply(State::TicketIssue, payload))
}

fn store_tag<CS>(ctx: &mut ProtocolContext, state: State, bytes: &[u8]) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let tag = TicketTag::from_bytes(bytes)?;
    {
        let held = held(ctx.holder_actor()?)?;
        let index = held.ticket.tags.len();
        let expected = held.requested.get(index).ok_or_else(|| Error::UnexpectedMessage {
            state: state.index(),
            detail: "more tags than requested".to_owned(),
        })?;
        if tag.verifier != expected.verifier || tag.P != expected.P || tag.Q != expected.Q {
            return Err(Error::UnexpectedMessage {
                state: state.index(),
                detail: format!("tag {} does not match the request", index),
            });
        }
    }

    let signed = tag.hash_matches::<CS>(ctx.config.ticket_text.as_bytes())?
        && tag.signature_holds(ctx.params()?, &ctx.directory()?.issuer);
    if !signed {
        ctx.enforce(Error::CryptographicVerificationFailure(VerificationFailure::TagSignature))?;
    }

    let holder = ctx.holder_mut()?;
    let held = holder
        .held
        .as_mut()
        .ok_or_else(|| Error::OutOfOrder("no ticket was requested".to_owned()))?;
    log::debug!("stored tag for {}", tag.verifier);
    held.ticket.tags.push(tag);
    if held.complete() {
        log::info!("ticket complete with {} tags", held.ticket.tags.len());
        Ok(ack(State::UseChallenge))
    } else {
        Ok(ack(State::TicketTag))
    }
}

fn store_challenge(ctx: &mut ProtocolContext, state: State, bytes: &[u8]) -> Result<Action, Error> {
    let fields = codec::decode_exact(bytes, 2)?;
    let id = parse_utf8(&fields[0])?;
    if fields[1].len() != NONCE_LEN {
        return Err(Error::MalformedMessage(format!("nonce must be {} bytes", NONCE_LEN)));
    }
    if held(ctx.holder_actor()?)?.ticket.tag_for(&id).is_none() {
        return Err(Error::UnexpectedMessage { state: state.index(), detail: format!("no tag for {}", id) });
    }
    ctx.session.challenge = Some((id, fields[1].clone()));
    Ok(ack(State::UseProof))
}

fn prove<CS>(ctx: &mut ProtocolContext) -> Result<Action, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let (id, nonce) = ctx
        .session
        .challenge
        .take()
        .ok_or_else(|| Error::OutOfOrder("use proof asked before the nonce".to_owned()))?;

    let holder = ctx.holder_actor()?;
    let held = held(holder)?;
    let tag = held
        .ticket
        .tag_for(&id)
        .ok_or_else(|| Error::OutOfOrder(format!("no tag for {}", id)))?;
    let D = held
        .secrets
        .scalar_for(&id)
        .ok_or_else(|| Error::OutOfOrder(format!("no pseudonym scalar for {}", id)))?;

    let proof = prove_use::<CS>(
        ctx.params()?,
        holder.keys.private_key(),
        &ctx.directory()?.tracer.key,
        tag,
        D,
        &nonce,
    )?;
    log::debug!("use proof for {}", id);
    Ok(reply(State::UseVerdict, encode_presentation(tag, &proof)))
}
