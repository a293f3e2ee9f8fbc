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

//! Binary message codec.
//!
//! Every protocol message is an ordered list of opaque byte strings laid out as
//!
//! ```text
//! I2OSP(count, 4) || ( I2OSP(len_i, 4) || bytes_i )*
//! ```
//!
//! with all integers big-endian. The codec knows nothing about the content of
//! the elements, each field is turned into bytes by its own canonical encoder.

use crate::errors::Error;

pub const LENGTH_PREFIX: usize = 4;

pub fn encode<T: AsRef<[u8]>>(elements: &[T]) -> Vec<u8> {
    let total: usize = elements.iter().map(|e| e.as_ref().len() + LENGTH_PREFIX).sum();
    let mut out = Vec::with_capacity(LENGTH_PREFIX + total);
    out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
    for element in elements {
        let element = element.as_ref();
        out.extend_from_slice(&(element.len() as u32).to_be_bytes());
        out.extend_from_slice(element);
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut reader = Reader { bytes, pos: 0 };
    let count = reader.read_u32()? as usize;

    // every element needs at least its length prefix
    if count > reader.remaining() / LENGTH_PREFIX {
        return Err(Error::MalformedMessage(format!(
            "declared {} elements but only {} bytes follow",
            count,
            reader.remaining()
        )));
    }

    let mut elements = Vec::with_capacity(count);
    for i in 0..count {
        let len = reader.read_u32()? as usize;
        let element = reader.take(len).map_err(|_| {
            Error::MalformedMessage(format!("element {} truncated ({} bytes declared)", i, len))
        })?;
        elements.push(element.to_vec());
    }

    if reader.remaining() != 0 {
        return Err(Error::MalformedMessage(format!(
            "{} trailing bytes after {} elements",
            reader.remaining(),
            count
        )));
    }

    Ok(elements)
}

/// Decodes and checks the element count in one go.
pub fn decode_exact(bytes: &[u8], expected: usize) -> Result<Vec<Vec<u8>>, Error> {
    let elements = decode(bytes)?;
    if elements.len() != expected {
        return Err(Error::MalformedMessage(format!(
            "expected {} elements, got {}",
            expected,
            elements.len()
        )));
    }
    Ok(elements)
}

pub fn encode_count(count: usize) -> [u8; 4] {
    (count as u32).to_be_bytes()
}

pub fn decode_count(bytes: &[u8]) -> Result<usize, Error> {
    let bytes: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::MalformedMessage("count field must be 4 bytes".to_owned()))?;
    Ok(u32::from_be_bytes(bytes) as usize)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            return Err(Error::MalformedMessage("truncated message".to_owned()));
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        let raw = self.take(LENGTH_PREFIX)?;
        let mut buf = [0u8; LENGTH_PREFIX];
        buf.copy_from_slice(raw);
        Ok(u32::from_be_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_mixed_lengths() {
        let cases: Vec<Vec<Vec<u8>>> = vec![
            vec![],
            vec![vec![]],
            vec![b"P".to_vec(), vec![], vec![0u8; 48], vec![0xffu8; 300]],
            (0..40u8).map(|i| vec![i; i as usize]).collect(),
        ];
        for case in cases {
            assert_eq!(decode(&encode(&case)).unwrap(), case);
        }
    }

    #[test]
    fn layout_is_big_endian_count_then_length_prefixed() {
        let bytes = encode(&[b"ab".as_slice(), b"c".as_slice()]);
        assert_eq!(hex::encode(&bytes), "000000020000000261620000000163");
    }

    #[test]
    fn every_truncation_is_malformed() {
        let bytes = encode(&[b"ticket".as_slice(), &[7u8; 20], b"".as_slice()]);
        for cut in 0..bytes.len() {
            match decode(&bytes[..cut]) {
                Err(Error::MalformedMessage(_)) => {}
                other => panic!("cut at {} gave {:?}", cut, other),
            }
        }
    }

    #[test]
    fn count_larger_than_data_is_malformed() {
        let mut bytes = encode(&[b"x".as_slice()]);
        bytes[3] = 200;
        assert!(matches!(decode(&bytes), Err(Error::MalformedMessage(_))));

        let huge = [0xffu8, 0xff, 0xff, 0xff];
        assert!(matches!(decode(&huge), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let mut bytes = encode(&[b"x".as_slice()]);
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn garbage_never_panics() {
        let mut state = 0x2545f491u32;
        for len in 0..64 {
            let garbage: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    state as u8
                })
                .collect();
            let _ = decode(&garbage);
        }
    }

    #[test]
    fn decode_exact_checks_count() {
        let bytes = encode(&[b"a".as_slice(), b"b".as_slice()]);
        assert!(decode_exact(&bytes, 2).is_ok());
        assert!(matches!(decode_exact(&bytes, 3), Err(Error::MalformedMessage(_))));
    }
}
