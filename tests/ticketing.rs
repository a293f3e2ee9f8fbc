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

#![allow(non_snake_case)]

#[cfg(test)]
mod ticketing_tests {

    use elliptic_curve::hash2curve::ExpandMsg;
    use zkticket::{
        config::{ProtocolConfig, VerificationMode},
        engine::{
            run_terminal,
            states::State,
            transport::{ChunkedTransport, LoopbackChannel, Transport},
            Command, Engine, Message, Outcome, RunReport,
        },
        errors::{Error, TraceFailure, VerificationFailure},
        ticket::{
            ciphersuites::{Bls12381Sha256, Bls12381Shake256, TicketCiphersuite},
            tag::Ticket,
        },
        utils::codec,
    };

    type Loopback<CS> = ChunkedTransport<LoopbackChannel<CS>>;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn setup<CS>(config: &ProtocolConfig) -> (Engine<CS>, Loopback<CS>)
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        let terminal = Engine::<CS>::terminal(config.clone()).unwrap();
        let holder = Engine::<CS>::holder(config.clone()).unwrap();
        (terminal, ChunkedTransport::new(LoopbackChannel::new(holder), config.frame_size))
    }

    fn assert_traced<CS>(report: &RunReport, terminal: &Engine<CS>, transport: &Loopback<CS>, verifiers: usize)
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        assert!(report.succeeded(), "run failed: {:?}", report.outcome);

        let holder_pk = transport.channel().card().engine().context().holder_actor().unwrap().keys.public_key().0;
        let pseudonym = terminal.context().session.pseudonym.unwrap();
        assert_eq!(pseudonym.0, holder_pk);

        for i in 0..verifiers {
            assert_eq!(terminal.context().verifier(i).unwrap().presentations.len(), 1);
        }
        assert_eq!(terminal.context().session.presented.len(), verifiers);
        assert_eq!(terminal.context().issuer().unwrap().issued, 1);
    }

    fn full_run<CS>(verifiers: usize, frame_size: usize)
    where
        CS: TicketCiphersuite,
        CS::Expander: for<'a> ExpandMsg<'a>,
    {
        init();
        let config = ProtocolConfig { verifiers, frame_size, ..Default::default() };
        let (mut terminal, mut transport) = setup::<CS>(&config);
        let report = run_terminal(&mut terminal, &mut transport);
        assert_traced(&report, &terminal, &transport, verifiers);

        // ticket tags: one per verifier plus the tracer, then one proof round each
        let per_state = report.per_state();
        let visits = |s: State| per_state.iter().find(|(st, _, _)| *st == s).map(|(_, _, n)| *n);
        assert_eq!(visits(State::TicketTag), Some(verifiers));
        assert_eq!(visits(State::UseProof), Some(verifiers));
        assert_eq!(visits(State::Trace), Some(1));
    }

    #[test]
    fn single_verifier_sha256() {
        full_run::<Bls12381Sha256>(1, 250);
    }

    #[test]
    fn two_verifiers_sha256() {
        full_run::<Bls12381Sha256>(2, 250);
    }

    #[test]
    fn two_verifiers_shake256() {
        full_run::<Bls12381Shake256>(2, 250);
    }

    #[test]
    fn six_verifiers_sha256() {
        full_run::<Bls12381Sha256>(6, 250);
    }

    #[test]
    fn tiny_frames_sha256() {
        full_run::<Bls12381Sha256>(2, 16);
    }

    #[test]
    fn small_frames_shake256() {
        full_run::<Bls12381Shake256>(3, 64);
    }

    #[test]
    fn larger_frames_need_fewer_exchanges() {
        init();
        let mut frames = Vec::new();
        for frame_size in [32, 250] {
            let config = ProtocolConfig { verifiers: 2, frame_size, ..Default::default() };
            let (mut terminal, mut transport) = setup::<Bls12381Sha256>(&config);
            assert!(run_terminal(&mut terminal, &mut transport).succeeded());
            frames.push(transport.frames());
        }
        assert!(frames[0] > frames[1]);
    }

    #[test]
    fn repeated_runs_link_the_holder() {
        init();
        let config = ProtocolConfig { verifiers: 2, ..Default::default() };
        let (mut terminal, mut transport) = setup::<Bls12381Sha256>(&config);

        assert!(run_terminal(&mut terminal, &mut transport).succeeded());
        assert!(run_terminal(&mut terminal, &mut transport).succeeded());

        let tracer = terminal.context().tracer().unwrap();
        assert_eq!(tracer.pseudonyms.len(), 2);
        assert!(tracer.pseudonyms[0].links(&tracer.pseudonyms[1]));
        assert_eq!(terminal.context().issuer().unwrap().issued, 2);
        assert_eq!(terminal.context().presentations().len(), 4);
        assert_eq!(terminal.context().session.presented.len(), 2);
    }

    #[test]
    fn different_holders_do_not_link() {
        init();
        let config = ProtocolConfig { verifiers: 1, ..Default::default() };
        let (mut terminal, mut first) = setup::<Bls12381Sha256>(&config);
        assert!(run_terminal(&mut terminal, &mut first).succeeded());

        let other = Engine::<Bls12381Sha256>::holder(config.clone()).unwrap();
        let mut second = ChunkedTransport::new(LoopbackChannel::new(other), config.frame_size);
        assert!(run_terminal(&mut terminal, &mut second).succeeded());

        let tracer = terminal.context().tracer().unwrap();
        assert!(!tracer.pseudonyms[0].links(&tracer.pseudonyms[1]));
    }

    /// Changes one whole payload of a run.
    enum Target {
        /// Flips the low bit of one field of the n-th PUT payload
        Put { payload: usize, field: usize },
        /// Flips the low bit of one field of the n-th GET answer
        Get { payload: usize, field: usize },
        /// Replaces the n-th GET answer
        Rewrite { payload: usize, with: Box<dyn Fn(&[u8]) -> Vec<u8>> },
    }

    struct Tampering<T> {
        inner: T,
        target: Target,
        puts: usize,
        gets: usize,
    }

    fn flip(bytes: &[u8], field: usize) -> Vec<u8> {
        let mut fields = codec::decode(bytes).unwrap();
        let last = fields[field].len() - 1;
        fields[field][last] ^= 1;
        codec::encode(&fields)
    }

    impl<T: Transport> Transport for Tampering<T> {
        fn transceive(&mut self, command: &Command, payload: &[u8]) -> Message {
            match command {
                Command::Put => {
                    let n = self.puts;
                    self.puts += 1;
                    match &self.target {
                        Target::Put { payload: p, field } if *p == n => {
                            self.inner.transceive(command, &flip(payload, *field))
                        }
                        _ => self.inner.transceive(command, payload),
                    }
                }
                Command::Get { .. } => {
                    let n = self.gets;
                    self.gets += 1;
                    match (self.inner.transceive(command, payload), &self.target) {
                        (Message::Data(bytes), Target::Get { payload: p, field }) if *p == n => {
                            Message::Data(flip(&bytes, *field))
                        }
                        (Message::Data(bytes), Target::Rewrite { payload: p, with }) if *p == n => {
                            Message::Data(with(&bytes))
                        }
                        (other, _) => other,
                    }
                }
                _ => self.inner.transceive(command, payload),
            }
        }
    }

    fn tampered_run(target: Target, verification: VerificationMode) -> (RunReport, Engine<Bls12381Sha256>, Tampering<Loopback<Bls12381Sha256>>) {
        init();
        let config = ProtocolConfig { verifiers: 2, frame_size: 64, verification, ..Default::default() };
        let (mut terminal, inner) = setup::<Bls12381Sha256>(&config);
        let mut transport = Tampering { inner, target, puts: 0, gets: 0 };
        let report = run_terminal(&mut terminal, &mut transport);
        (report, terminal, transport)
    }

    // PUT payloads: parameters, directory, credential, tags, nonces.
    // GET answers: holder key, ticket request, use proofs, ticket bundle.

    #[test]
    fn tampered_credential_fails_the_holder() {
        let (report, _, transport) = tampered_run(Target::Put { payload: 2, field: 2 }, VerificationMode::Strict);
        assert_eq!(report.outcome, Outcome::Failed(Error::TransportFailure));
        assert_eq!(
            transport.inner.channel().card().failure(),
            Some(&Error::CryptographicVerificationFailure(VerificationFailure::CredentialPairing))
        );
    }

    #[test]
    fn tampered_ticket_request_is_rejected() {
        let (report, terminal, _) = tampered_run(Target::Get { payload: 1, field: 6 }, VerificationMode::Strict);
        match report.outcome {
            Outcome::Failed(Error::TicketRejected(reason)) => assert!(reason.is_cryptographic()),
            other => panic!("expected a rejected request, got {:?}", other),
        }
        assert_eq!(terminal.context().issuer().unwrap().issued, 0);
    }

    #[test]
    fn tampered_use_proof_is_refused() {
        let (report, terminal, _) = tampered_run(Target::Get { payload: 2, field: 14 }, VerificationMode::Strict);
        assert!(matches!(report.outcome, Outcome::Failed(Error::CryptographicVerificationFailure(_))));
        assert!(terminal.context().session.pseudonym.is_none());
        assert!(terminal.context().verifier(0).unwrap().presentations.is_empty());
    }

    #[test]
    fn tampered_tag_signature_fails_when_strict() {
        let (report, _, transport) = tampered_run(Target::Put { payload: 3, field: 8 }, VerificationMode::Strict);
        assert_eq!(report.outcome, Outcome::Failed(Error::TransportFailure));
        assert_eq!(
            transport.inner.channel().card().failure(),
            Some(&Error::CryptographicVerificationFailure(VerificationFailure::TagSignature))
        );
    }

    #[test]
    fn warn_only_lets_a_bad_tag_through() {
        let (report, terminal, transport) = tampered_run(Target::Put { payload: 3, field: 8 }, VerificationMode::WarnOnly);
        assert!(report.succeeded(), "run failed: {:?}", report.outcome);
        assert!(transport.inner.channel().card().failure().is_none());

        let holder_pk = transport.inner.channel().card().engine().context().holder_actor().unwrap().keys.public_key().0;
        assert_eq!(terminal.context().session.pseudonym.unwrap().0, holder_pk);
    }

    #[test]
    fn undecodable_bundle_is_malformed() {
        // last GET: the bundle, field 2 is P of the first tag
        let (report, terminal, _) = tampered_run(Target::Get { payload: 4, field: 2 }, VerificationMode::Strict);
        assert!(matches!(report.outcome, Outcome::Failed(Error::DeserializationError(_))));
        assert!(terminal.context().tracer().unwrap().pseudonyms.is_empty());
    }

    #[test]
    fn renamed_tag_fails_the_audit() {
        // field 1 is the verifier id of the first tag, covered by its hash
        let (report, _, _) = tampered_run(Target::Get { payload: 4, field: 1 }, VerificationMode::Strict);
        assert!(matches!(
            report.outcome,
            Outcome::Failed(Error::TraceFailed(TraceFailure::BadHash { index: 0, .. }))
        ));
    }

    fn held_ticket(transport: &Loopback<Bls12381Sha256>) -> Ticket {
        let holder = transport.channel().card().engine().context().holder_actor().unwrap();
        holder.held.as_ref().unwrap().ticket.clone()
    }

    #[test]
    fn bundle_of_an_earlier_run_is_not_found() {
        init();
        let config = ProtocolConfig { verifiers: 2, ..Default::default() };
        let (mut terminal, mut transport) = setup::<Bls12381Sha256>(&config);
        assert!(run_terminal(&mut terminal, &mut transport).succeeded());
        let earlier = held_ticket(&transport).to_bytes();

        let mut replaying = Tampering {
            inner: transport,
            target: Target::Rewrite { payload: 4, with: Box::new(move |_: &[u8]| earlier.clone()) },
            puts: 0,
            gets: 0,
        };
        let report = run_terminal(&mut terminal, &mut replaying);
        assert_eq!(report.outcome, Outcome::Failed(Error::TraceFailed(TraceFailure::TagNotFound { index: 0 })));
        assert_eq!(terminal.context().tracer().unwrap().pseudonyms.len(), 1);
    }

    #[test]
    fn tag_of_another_holder_is_inconsistent() {
        init();
        let config = ProtocolConfig { verifiers: 2, ..Default::default() };
        let (mut terminal, mut other) = setup::<Bls12381Sha256>(&config);
        assert!(run_terminal(&mut terminal, &mut other).succeeded());
        let foreign = held_ticket(&other).tags[0].clone();
        assert_eq!(foreign.verifier, "verifier-1");

        let holder = Engine::<Bls12381Sha256>::holder(config.clone()).unwrap();
        let mut splicing = Tampering {
            inner: ChunkedTransport::new(LoopbackChannel::new(holder), config.frame_size),
            target: Target::Rewrite {
                payload: 4,
                with: Box::new(move |bytes: &[u8]| {
                    let mut ticket = Ticket::from_bytes(bytes).unwrap();
                    ticket.tags[0] = foreign.clone();
                    ticket.to_bytes()
                }),
            },
            puts: 0,
            gets: 0,
        };
        let report = run_terminal(&mut terminal, &mut splicing);
        assert_eq!(
            report.outcome,
            Outcome::Failed(Error::TraceFailed(TraceFailure::InconsistentPseudonym {
                index: 0,
                verifier: "verifier-1".to_owned(),
            }))
        );
    }
}
