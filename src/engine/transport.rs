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

use elliptic_curve::hash2curve::ExpandMsg;

use super::{Action, Command, Engine, Message, StateIndex};
use crate::{errors::Error, ticket::ciphersuites::TicketCiphersuite};

/// Carries one engine command and returns the reassembled answer.
///
/// Implementations never return errors: whatever goes wrong is reported as
/// [`Message::Failure`].
pub trait Transport {
    fn transceive(&mut self, command: &Command, payload: &[u8]) -> Message;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    Select,
    Get,
    Put,
}

/// One length-limited exchange unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub instruction: Instruction,
    /// More PUT frames of the same payload follow
    pub more: bool,
    /// Largest reply the sender accepts
    pub le: usize,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ok,
    /// The reply continues in the next GET
    More,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReply {
    pub status: FrameStatus,
    pub data: Vec<u8>,
}

impl FrameReply {
    pub fn ok() -> Self {
        Self { status: FrameStatus::Ok, data: Vec::new() }
    }

    pub fn error() -> Self {
        Self { status: FrameStatus::Error, data: Vec::new() }
    }
}

pub trait FrameChannel {
    fn exchange(&mut self, frame: Frame) -> Result<FrameReply, Error>;
}

/// Splits PUT payloads into frames and joins GET replies.
pub struct ChunkedTransport<C> {
    channel: C,
    frame_size: usize,
    frames: usize,
}

impl<C: FrameChannel> ChunkedTransport<C> {
    pub fn new(channel: C, frame_size: usize) -> Self {
        Self { channel, frame_size: frame_size.max(1), frames: 0 }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Frames exchanged so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    fn send(&mut self, frame: Frame) -> Result<FrameReply, Error> {
        self.frames += 1;
        let reply = self.channel.exchange(frame)?;
        if reply.status == FrameStatus::Error {
            return Err(Error::TransportFailure);
        }
        Ok(reply)
    }

    fn select(&mut self, payload: &[u8]) -> Result<Message, Error> {
        let reply = self.send(Frame {
            instruction: Instruction::Select,
            more: false,
            le: self.frame_size,
            data: payload.to_vec(),
        })?;
        self.collect(reply, usize::MAX)
    }

    fn put(&mut self, payload: &[u8]) -> Result<Message, Error> {
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(self.frame_size).collect()
        };
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            let reply = self.send(Frame {
                instruction: Instruction::Put,
                more: i < last,
                le: self.frame_size,
                data: chunk.to_vec(),
            })?;
            if i == last {
                return self.collect(reply, usize::MAX);
            }
        }
        Err(Error::TransportFailure)
    }

    fn get(&mut self, max_len: usize) -> Result<Message, Error> {
        let reply = self.send(Frame { instruction: Instruction::Get, more: false, le: self.frame_size, data: Vec::new() })?;
        self.collect(reply, max_len)
    }

    /// Follows `More` replies with further GETs until the answer is complete.
    fn collect(&mut self, first: FrameReply, max_len: usize) -> Result<Message, Error> {
        let mut status = first.status;
        let mut data = first.data;
        while status == FrameStatus::More {
            let reply = self.send(Frame { instruction: Instruction::Get, more: false, le: self.frame_size, data: Vec::new() })?;
            data.extend_from_slice(&reply.data);
            status = reply.status;
            if data.len() > max_len {
                return Err(Error::TransportFailure);
            }
        }
        if data.len() > max_len {
            return Err(Error::TransportFailure);
        }
        if data.is_empty() {
            Ok(Message::Success)
        } else {
            Ok(Message::Data(data))
        }
    }
}

impl<C: FrameChannel> Transport for ChunkedTransport<C> {
    fn transceive(&mut self, command: &Command, payload: &[u8]) -> Message {
        let result = match command {
            Command::Select => self.select(payload),
            Command::Put => self.put(payload),
            Command::Get { max_len } => self.get(*max_len),
            Command::Respond => Err(Error::OutOfOrder("respond is not a terminal command".to_owned())),
        };
        result.unwrap_or_else(|e| {
            log::debug!("transport: {}", e);
            Message::Failure
        })
    }
}

/// Holder side of the channel: reassembles PUT frames, steps the holder
/// engine once per complete payload and serves its reply frame by frame.
pub struct CardEndpoint<CS> {
    engine: Engine<CS>,
    state: StateIndex,
    failure: Option<Error>,
}

impl<CS> CardEndpoint<CS>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    pub fn new(engine: Engine<CS>) -> Self {
        Self { engine, state: 0, failure: None }
    }

    pub fn engine(&self) -> &Engine<CS> {
        &self.engine
    }

    pub fn state(&self) -> StateIndex {
        self.state
    }

    /// Why the holder engine stopped, if it failed.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    fn frame_size(&self) -> usize {
        self.engine.context().config.frame_size
    }

    pub fn handle(&mut self, frame: Frame) -> FrameReply {
        if frame.data.len() > self.frame_size() {
            log::debug!("card: oversized frame of {} bytes", frame.data.len());
            return FrameReply::error();
        }

        match frame.instruction {
            Instruction::Select => {
                // a SELECT always starts a new run
                self.engine.context_mut().reset_session();
                self.state = 0;
                self.failure = None;
                self.dispatch(Message::Request, frame.le)
            }
            _ if self.failure.is_some() => FrameReply::error(),
            Instruction::Put => {
                let buffers = &mut self.engine.context_mut().buffers;
                buffers.inbound.extend_from_slice(&frame.data);
                if frame.more {
                    return FrameReply::ok();
                }
                let payload = std::mem::take(&mut buffers.inbound);
                self.dispatch(Message::Data(payload), frame.le)
            }
            Instruction::Get => {
                if self.engine.context().buffers.outbound.is_empty() {
                    self.dispatch(Message::Request, frame.le)
                } else {
                    self.serve(frame.le)
                }
            }
        }
    }

    fn dispatch(&mut self, msg: Message, le: usize) -> FrameReply {
        match self.engine.step(self.state, msg) {
            Action::Continue { next, payload, .. } => {
                self.state = next;
                let buffers = &mut self.engine.context_mut().buffers;
                buffers.outbound = payload;
                buffers.offset = 0;
                self.serve(le)
            }
            Action::Succeed => FrameReply::ok(),
            Action::Fail(e) => {
                self.failure = Some(e);
                FrameReply::error()
            }
        }
    }

    fn serve(&mut self, le: usize) -> FrameReply {
        let frame_size = self.frame_size();
        let buffers = &mut self.engine.context_mut().buffers;
        let remaining = buffers.outbound.len() - buffers.offset;
        let n = remaining.min(le.max(1)).min(frame_size);
        let data = buffers.outbound[buffers.offset..buffers.offset + n].to_vec();
        buffers.offset += n;

        if buffers.offset < buffers.outbound.len() {
            FrameReply { status: FrameStatus::More, data }
        } else {
            buffers.outbound.clear();
            buffers.offset = 0;
            FrameReply { status: FrameStatus::Ok, data }
        }
    }
}

/// In-process channel to a [`CardEndpoint`], counting the traffic.
pub struct LoopbackChannel<CS> {
    card: CardEndpoint<CS>,
    frames: usize,
    bytes: usize,
}

impl<CS> LoopbackChannel<CS>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    pub fn new(holder: Engine<CS>) -> Self {
        Self { card: CardEndpoint::new(holder), frames: 0, bytes: 0 }
    }

    pub fn card(&self) -> &CardEndpoint<CS> {
        &self.card
    }

    /// `(frames, bytes)` in both directions
    pub fn traffic(&self) -> (usize, usize) {
        (self.frames, self.bytes)
    }
}

impl<CS> FrameChannel for LoopbackChannel<CS>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    fn exchange(&mut self, frame: Frame) -> Result<FrameReply, Error> {
        self.frames += 1;
        self.bytes += frame.data.len();
        let reply = self.card.handle(frame);
        self.bytes += reply.data.len();
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ProtocolConfig, ticket::ciphersuites::Bls12381Sha256};

    type CS = Bls12381Sha256;

    /// Records frames and answers like a card that echoes PUT payloads back.
    struct Echo {
        inbound: Vec<u8>,
        outbound: Vec<u8>,
        frame_size: usize,
        seen: Vec<Frame>,
    }

    impl FrameChannel for Echo {
        fn exchange(&mut self, frame: Frame) -> Result<FrameReply, Error> {
            self.seen.push(frame.clone());
            match frame.instruction {
                Instruction::Put => {
                    self.inbound.extend_from_slice(&frame.data);
                    if !frame.more {
                        self.outbound = std::mem::take(&mut self.inbound);
                    }
                    Ok(FrameReply::ok())
                }
                Instruction::Get => {
                    let n = self.outbound.len().min(self.frame_size);
                    let data: Vec<u8> = self.outbound.drain(..n).collect();
                    let status = if self.outbound.is_empty() { FrameStatus::Ok } else { FrameStatus::More };
                    Ok(FrameReply { status, data })
                }
                Instruction::Select => Ok(FrameReply::ok()),
            }
        }
    }

    #[test]
    fn put_is_split_and_get_is_joined() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let echo = Echo { inbound: Vec::new(), outbound: Vec::new(), frame_size: 64, seen: Vec::new() };
        let mut transport = ChunkedTransport::new(echo, 64);

        assert_eq!(transport.transceive(&Command::Put, &payload), Message::Success);
        let puts: Vec<&Frame> = transport.channel().seen.iter().collect();
        assert_eq!(puts.len(), 16);
        assert!(puts[..15].iter().all(|f| f.more && f.data.len() == 64));
        assert!(!puts[15].more);

        assert_eq!(transport.transceive(&Command::Get { max_len: 4096 }, &[]), Message::Data(payload.clone()));
        assert_eq!(transport.frames(), 32);

        transport.channel_mut().outbound = payload.clone();
        assert_eq!(transport.transceive(&Command::Get { max_len: 100 }, &[]), Message::Failure);
        assert_eq!(transport.transceive(&Command::Respond, &[]), Message::Failure);
    }

    #[test]
    fn card_reassembles_and_serves_in_frames() {
        let config = ProtocolConfig { frame_size: 16, ..Default::default() };
        let holder = Engine::<CS>::holder(config).unwrap();
        let mut card = CardEndpoint::new(holder);

        let select = Frame { instruction: Instruction::Select, more: false, le: 16, data: Vec::new() };
        assert_eq!(card.handle(select), FrameReply::ok());
        assert_eq!(card.state(), 1);

        let oversized = Frame { instruction: Instruction::Put, more: true, le: 16, data: vec![0; 17] };
        assert_eq!(card.handle(oversized).status, FrameStatus::Error);

        // garbage parameters, split over two frames, fail the holder
        let first = Frame { instruction: Instruction::Put, more: true, le: 16, data: vec![1; 16] };
        assert_eq!(card.handle(first), FrameReply::ok());
        assert_eq!(card.state(), 1);
        let last = Frame { instruction: Instruction::Put, more: false, le: 16, data: vec![2; 4] };
        assert_eq!(card.handle(last).status, FrameStatus::Error);
        assert!(matches!(card.failure(), Some(Error::MalformedMessage(_))));

        // dead until the next SELECT
        let get = Frame { instruction: Instruction::Get, more: false, le: 16, data: Vec::new() };
        assert_eq!(card.handle(get).status, FrameStatus::Error);
        let select = Frame { instruction: Instruction::Select, more: false, le: 16, data: Vec::new() };
        assert_eq!(card.handle(select), FrameReply::ok());
        assert!(card.failure().is_none());
    }
}
