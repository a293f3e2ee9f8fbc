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

use std::{env, process::ExitCode, time::Instant};

use elliptic_curve::hash2curve::ExpandMsg;
use zkticket::{
    config::ProtocolConfig,
    engine::{
        run_terminal,
        transport::{ChunkedTransport, LoopbackChannel},
        Engine, Outcome,
    },
    errors::Error,
    ticket::ciphersuites::{Bls12381Sha256, Bls12381Shake256, TicketCiphersuite},
};

fn bench<CS>(config: ProtocolConfig) -> Result<bool, Error>
where
    CS: TicketCiphersuite,
    CS::Expander: for<'a> ExpandMsg<'a>,
{
    let setup_start_time = Instant::now();
    let mut terminal = Engine::<CS>::terminal(config.clone())?;
    let holder = Engine::<CS>::holder(config.clone())?;
    println!("Setup {:.2?}", setup_start_time.elapsed());

    let mut transport = ChunkedTransport::new(LoopbackChannel::new(holder), config.frame_size);
    let report = run_terminal(&mut terminal, &mut transport);

    for (state, elapsed, visits) in report.per_state() {
        println!("{:<18} {:>4} x {:.2?}", state.to_string(), visits, elapsed);
    }
    let (frames, bytes) = transport.channel().traffic();
    println!("Frames {} ({} bytes)", frames, bytes);
    println!("Total {:.2?}", report.total);

    match &report.outcome {
        Outcome::Succeeded => {
            if let Some(pseudonym) = &terminal.context().session.pseudonym {
                println!("Traced pseudonym {}", pseudonym.encode());
            }
            Ok(true)
        }
        Outcome::Failed(e) => {
            eprintln!("Run failed: {}", e);
            if let Some(card) = transport.channel().card().failure() {
                eprintln!("Holder failed: {}", card);
            }
            Ok(false)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match args.iter().find(|a| a.ends_with(".json")) {
        Some(path) => match ProtocolConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ProtocolConfig::default(),
    };
    let shake = args.iter().any(|a| a == "--shake256");

    println!(
        "{} verifiers, frames of {} bytes, {}",
        config.verifiers,
        config.frame_size,
        if shake { "BLS12-381-SHAKE-256" } else { "BLS12-381-SHA-256" }
    );
    let result = if shake { bench::<Bls12381Shake256>(config) } else { bench::<Bls12381Sha256>(config) };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
