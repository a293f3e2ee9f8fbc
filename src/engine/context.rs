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

use std::{collections::BTreeMap, fmt};

use elliptic_curve::hash2curve::ExpandMsg;

use crate::{
    config::{ProtocolConfig, TRACER_ID},
    errors::Error,
    keys::{
        key::{G1PublicKey, G2PublicKey, PublicKey},
        pair::KeyPair,
    },
    ticket::{
        ciphersuites::TicketCiphersuite,
        credential::Credential,
        generators::GroupParameters,
        issuance::{HolderTicketSecrets, Recipient, TagCommitment},
        tag::{Presentation, Ticket},
        tracing::TracedPseudonym,
    },
    utils::{
        codec,
        util::{g1_to_bytes, parse_utf8},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Drives the run: authority, issuer, verifiers and tracer
    Terminal,
    /// Answers the terminal: the ticket holder
    Holder,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Terminal => f.write_str("terminal"),
            Side::Holder => f.write_str("holder"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Authority,
    Issuer,
    Holder,
    /// Zero-based verifier index
    Verifier(u16),
    Tracer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Authority => f.write_str("authority"),
            Role::Issuer => f.write_str("issuer"),
            Role::Holder => f.write_str("holder"),
            Role::Verifier(i) => write!(f, "{}", ProtocolConfig::verifier_id(*i as usize)),
            Role::Tracer => f.write_str(TRACER_ID),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthorityActor {
    pub keys: KeyPair<G2PublicKey>,
}

#[derive(Clone, Debug)]
pub struct IssuerActor {
    pub keys: KeyPair<G2PublicKey>,
    pub issued: usize,
}

/// Ticket held by the holder while tags arrive and afterwards.
#[derive(Clone, Debug)]
pub struct HeldTicket {
    pub secrets: HolderTicketSecrets,
    pub requested: Vec<TagCommitment>,
    pub ticket: Ticket,
}

impl HeldTicket {
    pub fn complete(&self) -> bool {
        self.ticket.tags.len() == self.requested.len()
    }
}

#[derive(Clone, Debug)]
pub struct HolderActor {
    pub keys: KeyPair<G1PublicKey>,
    pub credential: Option<Credential>,
    pub held: Option<HeldTicket>,
}

#[derive(Clone, Debug)]
pub struct VerifierActor {
    pub id: String,
    pub keys: KeyPair<G1PublicKey>,
    /// Every `(P, Q)` accepted by this verifier
    pub presentations: Vec<Presentation>,
}

#[derive(Clone, Debug)]
pub struct TracerActor {
    pub id: String,
    pub keys: KeyPair<G1PublicKey>,
    pub pseudonyms: Vec<TracedPseudonym>,
}

impl TracerActor {
    /// Stores a traced pseudonym, returns how many times it was seen before.
    pub fn record(&mut self, pseudonym: TracedPseudonym) -> usize {
        let seen = self.pseudonyms.iter().filter(|p| p.links(&pseudonym)).count();
        self.pseudonyms.push(pseudonym);
        seen
    }
}

#[derive(Clone, Debug)]
pub enum Actor {
    Authority(AuthorityActor),
    Issuer(IssuerActor),
    Holder(HolderActor),
    Verifier(VerifierActor),
    Tracer(TracerActor),
}

/// Public keys every actor of a run needs to know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directory {
    pub authority: G2PublicKey,
    pub issuer: G2PublicKey,
    pub tracer: Recipient,
    pub verifiers: Vec<Recipient>,
}

impl Directory {
    /// Verifiers in order, then the tracer.
    pub fn recipients(&self) -> Vec<Recipient> {
        let mut out = self.verifiers.clone();
        out.push(self.tracer.clone());
        out
    }

    pub fn ids(&self) -> Vec<String> {
        self.recipients().into_iter().map(|r| r.id).collect()
    }

    /// `[W_A, W_I, tracer id, Y_T, count, (verifier id, Y_V)*]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut elements = vec![
            self.authority.to_bytes(),
            self.issuer.to_bytes(),
            self.tracer.id.as_bytes().to_vec(),
            self.tracer.key.to_bytes(),
            codec::encode_count(self.verifiers.len()).to_vec(),
        ];
        for v in &self.verifiers {
            elements.push(v.id.as_bytes().to_vec());
            elements.push(v.key.to_bytes());
        }
        codec::encode(&elements)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let elements = codec::decode(bytes)?;
        if elements.len() < 5 {
            return Err(Error::MalformedMessage(format!("directory has {} fields", elements.len())));
        }
        let count = codec::decode_count(&elements[4])?;
        let rest = &elements[5..];
        if rest.len() != count.saturating_mul(2) {
            return Err(Error::MalformedMessage(format!(
                "directory declares {} verifiers but carries {} fields",
                count,
                rest.len()
            )));
        }
        let verifiers = rest
            .chunks_exact(2)
            .map(|f| Ok(Recipient::verifier(&parse_utf8(&f[0])?, G1PublicKey::from_bytes(&f[1])?)))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            authority: G2PublicKey::from_bytes(&elements[0])?,
            issuer: G2PublicKey::from_bytes(&elements[1])?,
            tracer: Recipient::tracer(&parse_utf8(&elements[2])?, G1PublicKey::from_bytes(&elements[3])?),
            verifiers,
        })
    }
}

/// Reassembly of inbound frames and the reply being served frame by frame.
#[derive(Clone, Debug, Default)]
pub struct Buffers {
    pub inbound: Vec<u8>,
    pub outbound: Vec<u8>,
    pub offset: usize,
}

impl Buffers {
    pub fn clear(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        self.offset = 0;
    }
}

/// Per-run progress of multi-round states.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub tag_cursor: usize,
    pub verifier_cursor: usize,
    pub issued: Option<Ticket>,
    /// Verifier the next use proof is for, with its nonce
    pub challenge: Option<(String, Vec<u8>)>,
    /// Presentations accepted during this run
    pub presented: Vec<Presentation>,
    pub pseudonym: Option<TracedPseudonym>,
}

/// Everything one side of a run knows.
#[derive(Clone, Debug)]
pub struct ProtocolContext {
    pub side: Side,
    pub config: ProtocolConfig,
    pub params: Option<GroupParameters>,
    pub actors: BTreeMap<Role, Actor>,
    pub directory: Option<Directory>,
    pub buffers: Buffers,
    pub session: Session,
}

impl ProtocolContext {
    /// Terminal context: derives the parameters and generates the keys of the
    /// authority, the issuer, every verifier and the tracer.
    pub fn terminal<CS>(config: ProtocolConfig) -> Result<Self, Error>
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        config.validate()?;
        let params = GroupParameters::generate::<CS>(&config.seed::<CS>());

        let mut actors = BTreeMap::new();
        let authority = KeyPair::<G2PublicKey>::generate(&params.g_frak);
        let issuer = KeyPair::<G2PublicKey>::generate(&params.g_frak);
        let tracer = KeyPair::<G1PublicKey>::generate(&params.xi);

        let mut verifiers = Vec::with_capacity(config.verifiers);
        for i in 0..config.verifiers {
            let id = ProtocolConfig::verifier_id(i);
            let keys = KeyPair::<G1PublicKey>::generate(&params.g);
            verifiers.push(Recipient::verifier(&id, *keys.public_key()));
            actors.insert(
                Role::Verifier(i as u16),
                Actor::Verifier(VerifierActor { id, keys, presentations: Vec::new() }),
            );
        }

        let directory = Directory {
            authority: *authority.public_key(),
            issuer: *issuer.public_key(),
            tracer: Recipient::tracer(TRACER_ID, *tracer.public_key()),
            verifiers,
        };

        actors.insert(Role::Authority, Actor::Authority(AuthorityActor { keys: authority }));
        actors.insert(Role::Issuer, Actor::Issuer(IssuerActor { keys: issuer, issued: 0 }));
        actors.insert(
            Role::Tracer,
            Actor::Tracer(TracerActor { id: TRACER_ID.to_owned(), keys: tracer, pseudonyms: Vec::new() }),
        );

        log::debug!(
            "terminal context ready: {} verifiers, g = {}",
            config.verifiers,
            hex::encode(g1_to_bytes(&params.g))
        );

        Ok(Self {
            side: Side::Terminal,
            config,
            params: Some(params),
            actors,
            directory: Some(directory),
            buffers: Buffers::default(),
            session: Session::default(),
        })
    }

    /// Holder context. Parameters, keys and directory arrive during the run.
    pub fn holder(config: ProtocolConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            side: Side::Holder,
            config,
            params: None,
            actors: BTreeMap::new(),
            directory: None,
            buffers: Buffers::default(),
            session: Session::default(),
        })
    }

    /// Forgets everything tied to the current run, keeping keys and history.
    pub fn reset_session(&mut self) {
        self.buffers.clear();
        self.session = Session::default();
        if let Some(Actor::Holder(h)) = self.actors.get_mut(&Role::Holder) {
            h.credential = None;
            h.held = None;
        }
    }

    pub fn params(&self) -> Result<&GroupParameters, Error> {
        self.params
            .as_ref()
            .ok_or_else(|| Error::OutOfOrder("group parameters are not set".to_owned()))
    }

    pub fn directory(&self) -> Result<&Directory, Error> {
        self.directory
            .as_ref()
            .ok_or_else(|| Error::OutOfOrder("public key directory is not set".to_owned()))
    }

    pub fn authority(&self) -> Result<&AuthorityActor, Error> {
        match self.actors.get(&Role::Authority) {
            Some(Actor::Authority(a)) => Ok(a),
            _ => Err(Error::MissingActor(Role::Authority)),
        }
    }

    pub fn issuer(&self) -> Result<&IssuerActor, Error> {
        match self.actors.get(&Role::Issuer) {
            Some(Actor::Issuer(i)) => Ok(i),
            _ => Err(Error::MissingActor(Role::Issuer)),
        }
    }

    pub fn issuer_mut(&mut self) -> Result<&mut IssuerActor, Error> {
        match self.actors.get_mut(&Role::Issuer) {
            Some(Actor::Issuer(i)) => Ok(i),
            _ => Err(Error::MissingActor(Role::Issuer)),
        }
    }

    pub fn holder_actor(&self) -> Result<&HolderActor, Error> {
        match self.actors.get(&Role::Holder) {
            Some(Actor::Holder(h)) => Ok(h),
            _ => Err(Error::MissingActor(Role::Holder)),
        }
    }

    pub fn holder_mut(&mut self) -> Result<&mut HolderActor, Error> {
        match self.actors.get_mut(&Role::Holder) {
            Some(Actor::Holder(h)) => Ok(h),
            _ => Err(Error::MissingActor(Role::Holder)),
        }
    }

    pub fn verifier(&self, index: usize) -> Result<&VerifierActor, Error> {
        let role = Role::Verifier(index as u16);
        match self.actors.get(&role) {
            Some(Actor::Verifier(v)) => Ok(v),
            _ => Err(Error::MissingActor(role)),
        }
    }

    pub fn verifier_mut(&mut self, index: usize) -> Result<&mut VerifierActor, Error> {
        let role = Role::Verifier(index as u16);
        match self.actors.get_mut(&role) {
            Some(Actor::Verifier(v)) => Ok(v),
            _ => Err(Error::MissingActor(role)),
        }
    }

    pub fn tracer(&self) -> Result<&TracerActor, Error> {
        match self.actors.get(&Role::Tracer) {
            Some(Actor::Tracer(t)) => Ok(t),
            _ => Err(Error::MissingActor(Role::Tracer)),
        }
    }

    pub fn tracer_mut(&mut self) -> Result<&mut TracerActor, Error> {
        match self.actors.get_mut(&Role::Tracer) {
            Some(Actor::Tracer(t)) => Ok(t),
            _ => Err(Error::MissingActor(Role::Tracer)),
        }
    }

    /// Presentations accepted by all verifiers so far, in verifier order.
    pub fn presentations(&self) -> Vec<Presentation> {
        self.actors
            .values()
            .filter_map(|a| match a {
                Actor::Verifier(v) => Some(v.presentations.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Applies the configured verification mode to a failed cryptographic
    /// check: an error when strict, a warning otherwise.
    pub fn enforce(&self, failure: Error) -> Result<(), Error> {
        if self.config.strict() {
            Err(failure)
        } else {
            log::warn!("{} side: {} (ignored, verification is warn-only)", self.side, failure);
            Ok(())
        }
    }
}
