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

//! Reactive protocol engine.
//!
//! Both sides walk the same numbered [`states::State`] table. The engine
//! never blocks and never loops: [`Engine::step`] consumes one inbound
//! [`Message`] and returns one [`Action`]. The terminal side is driven by
//! [`run_terminal`]; the holder side is driven by frames arriving at a
//! [`transport::CardEndpoint`].

use std::{
    marker::PhantomData,
    time::{Duration, Instant},
};

use elliptic_curve::hash2curve::ExpandMsg;

use crate::{config::ProtocolConfig, errors::Error, ticket::ciphersuites::TicketCiphersuite};

use self::{
    context::{ProtocolContext, Side},
    states::State,
    transport::Transport,
};

/// Shared context, actors and per-run session
pub mod context;
/// State table and transition functions
pub mod states;
/// Frame based transport and the in-process channel
pub mod transport;

pub type StateIndex = usize;

/// Largest payload the terminal accepts for a single GET.
pub const MAX_PAYLOAD: usize = 1 << 20;

/// What a state receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A command without payload (SELECT, GET)
    Request,
    /// A fully reassembled payload
    Data(Vec<u8>),
    /// Acknowledgement without payload
    Success,
    /// Anything that went wrong below the engine
    Failure,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request => "request",
            Message::Data(_) => "data",
            Message::Success => "success",
            Message::Failure => "failure",
        }
    }
}

/// What a state asks the transport to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Select,
    Get { max_len: usize },
    Put,
    /// Holder side: answer the command just handled
    Respond,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Continue { next: StateIndex, command: Command, payload: Vec<u8> },
    Succeed,
    Fail(Error),
}

pub struct Engine<CS> {
    ctx: ProtocolContext,
    _ciphersuite: PhantomData<CS>,
}

impl<CS> Engine<CS>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    pub fn new(ctx: ProtocolContext) -> Self {
        Self { ctx, _ciphersuite: PhantomData }
    }

    pub fn terminal(config: ProtocolConfig) -> Result<Self, Error> {
        Ok(Self::new(ProtocolContext::terminal::<CS>(config)?))
    }

    pub fn holder(config: ProtocolConfig) -> Result<Self, Error> {
        Ok(Self::new(ProtocolContext::holder(config)?))
    }

    pub fn context(&self) -> &ProtocolContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ProtocolContext {
        &mut self.ctx
    }

    /// One transition. Errors and unmatched messages end in [`Action::Fail`].
    pub fn step(&mut self, state: StateIndex, msg: Message) -> Action {
        if msg == Message::Failure {
            log::error!("{} side: transport failure in state {}", self.ctx.side, state);
            return Action::Fail(Error::TransportFailure);
        }

        let result = State::from_index(state).and_then(|s| {
            log::debug!("{} side: {} <- {}", self.ctx.side, s, msg.kind());
            match self.ctx.side {
                Side::Terminal => states::terminal_step::<CS>(&mut self.ctx, s, msg),
                Side::Holder => states::holder_step::<CS>(&mut self.ctx, s, msg),
            }
        });

        match result {
            Ok(action) => action,
            Err(e) => {
                log::error!("{} side failed in state {}: {}", self.ctx.side, state, e);
                Action::Fail(e)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(Error),
}

/// Time spent in one terminal step: computing the action, then waiting for
/// the transport round trip it triggered.
#[derive(Clone, Copy, Debug)]
pub struct StepTiming {
    pub state: State,
    pub compute: Duration,
    pub exchange: Duration,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    pub steps: Vec<StepTiming>,
    pub total: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// Total time and number of visits per state, in state order.
    pub fn per_state(&self) -> Vec<(State, Duration, usize)> {
        let mut out: Vec<(State, Duration, usize)> = Vec::new();
        for step in &self.steps {
            match out.iter_mut().find(|(s, _, _)| *s == step.state) {
                Some(entry) => {
                    entry.1 += step.compute + step.exchange;
                    entry.2 += 1;
                }
                None => out.push((step.state, step.compute + step.exchange, 1)),
            }
        }
        out.sort_by_key(|(s, _, _)| s.index());
        out
    }
}

/// Drives a terminal engine from state 0 until it succeeds or fails. Keys
/// and the history of earlier runs are kept.
pub fn run_terminal<CS, T>(engine: &mut Engine<CS>, transport: &mut T) -> RunReport
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
    T: Transport,
{
    engine.context_mut().reset_session();
    let started = Instant::now();
    let mut steps = Vec::new();
    let mut state: StateIndex = 0;
    let mut msg = Message::Request;

    let outcome = loop {
        let step_started = Instant::now();
        let action = engine.step(state, msg);
        let compute = step_started.elapsed();

        match action {
            Action::Continue { next, command, payload } => {
                let exchange_started = Instant::now();
                msg = transport.transceive(&command, &payload);
                if let Ok(s) = State::from_index(state) {
                    steps.push(StepTiming { state: s, compute, exchange: exchange_started.elapsed() });
                }
                state = next;
            }
            Action::Succeed => {
                if let Ok(s) = State::from_index(state) {
                    steps.push(StepTiming { state: s, compute, exchange: Duration::ZERO });
                }
                break Outcome::Succeeded;
            }
            Action::Fail(e) => break Outcome::Failed(e),
        }
    };

    let total = started.elapsed();
    match &outcome {
        Outcome::Succeeded => log::info!("run succeeded in {:.2?} over {} steps", total, steps.len()),
        Outcome::Failed(e) => log::error!("run failed after {} steps: {}", steps.len(), e),
    }
    RunReport { outcome, steps, total }
}
