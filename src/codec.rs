/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid particle sizes: even {even} bytes, odd {odd} bytes")]
    InvalidParticleSizes { even: usize, odd: usize },
    #[error("invalid reconstruction sizes: data {data} bytes, parity {parity} bytes")]
    InvalidReconstructionSizes { data: usize, parity: usize },
}

type Result<T> = std::result::Result<T, CodecError>;

/// Demultiplexes `data` into the even-index and odd-index byte streams.
pub fn split(data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut even = Vec::with_capacity(data.len().div_ceil(2));
    let mut odd = Vec::with_capacity(data.len() / 2);
    for chunk in data.chunks(2) {
        even.push(chunk[0]);
        if chunk.len() == 2 {
            odd.push(chunk[1]);
        }
    }
    (even, odd)
}

/// Inverse of [`split`]. The even stream must hold the same number of
/// bytes as the odd stream, or exactly one more.
pub fn merge(even: &[u8], odd: &[u8]) -> Result<Vec<u8>> {
    if even.len() != odd.len() && even.len() != odd.len() + 1 {
        return Err(CodecError::InvalidParticleSizes {
            even: even.len(),
            odd: odd.len(),
        });
    }
    let mut data = Vec::with_capacity(even.len() + odd.len());
    for i in 0..even.len() {
        data.push(even[i]);
        if i < odd.len() {
            data.push(odd[i]);
        }
    }
    Ok(data)
}

/// XOR parity stream. Always as long as the even stream; the trailing
/// unpartnered even byte of an odd-length object copies through.
pub fn parity(even: &[u8], odd: &[u8]) -> Vec<u8> {
    let mut parity = Vec::with_capacity(even.len());
    for i in 0..even.len() {
        match odd.get(i) {
            Some(o) => parity.push(even[i] ^ o),
            None => parity.push(even[i]),
        }
    }
    parity
}

/// Recovers the full object from the even stream plus parity.
///
/// `odd_length` is the recorded parity of the original object length;
/// it decides whether the last derived odd byte is real or padding.
pub fn reconstruct_from_even(even: &[u8], parity: &[u8], odd_length: bool) -> Result<Vec<u8>> {
    if even.len() != parity.len() {
        return Err(CodecError::InvalidReconstructionSizes {
            data: even.len(),
            parity: parity.len(),
        });
    }
    let mut odd: Vec<u8> = even.iter().zip(parity).map(|(e, p)| e ^ p).collect();
    if odd_length && !odd.is_empty() {
        odd.pop();
    }
    merge(even, &odd)
}

/// Recovers the full object from the odd stream plus parity.
pub fn reconstruct_from_odd(odd: &[u8], parity: &[u8], odd_length: bool) -> Result<Vec<u8>> {
    let expected = if odd_length { odd.len() + 1 } else { odd.len() };
    if parity.len() != expected {
        return Err(CodecError::InvalidReconstructionSizes {
            data: odd.len(),
            parity: parity.len(),
        });
    }
    let mut even: Vec<u8> = odd.iter().zip(parity).map(|(o, p)| o ^ p).collect();
    if odd_length {
        // trailing even byte has no odd partner, parity copied it through
        even.push(parity[parity.len() - 1]);
    }
    merge(&even, odd)
}

/// Logical size when only the even and parity particles are present.
pub fn size_from_even_and_parity(even: u64, parity: u64, odd_length: bool) -> u64 {
    even + parity - u64::from(odd_length)
}

/// Logical size when only the odd and parity particles are present.
pub fn size_from_odd_and_parity(odd: u64, parity: u64) -> u64 {
    odd + parity
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_split_empty() {
        let (even, odd) = split(b"");
        assert!(even.is_empty());
        assert!(odd.is_empty());
        assert_eq!(b"".to_vec(), merge(&even, &odd).unwrap());
    }

    #[test]
    fn test_split_single_byte() {
        let (even, odd) = split(b"A");
        assert_eq!(b"A".to_vec(), even);
        assert!(odd.is_empty());
        assert_eq!(b"A".to_vec(), parity(&even, &odd));
    }

    #[test]
    fn test_split_interleaves() {
        let (even, odd) = split(b"ABCDEFGHIJK");
        assert_eq!(b"ACEGIK".to_vec(), even);
        assert_eq!(b"BDFHJ".to_vec(), odd);
        assert_eq!(b"ABCDEFGHIJK".to_vec(), merge(&even, &odd).unwrap());
    }

    #[test]
    fn test_merge_rejects_bad_sizes() {
        assert_eq!(
            Err(CodecError::InvalidParticleSizes { even: 1, odd: 3 }),
            merge(b"a", b"bcd")
        );
        assert_eq!(
            Err(CodecError::InvalidParticleSizes { even: 4, odd: 2 }),
            merge(b"abcd", b"ef")
        );
        // even may exceed odd by exactly one
        assert!(merge(b"ab", b"c").is_ok());
        assert!(merge(b"ab", b"cd").is_ok());
    }

    #[test]
    fn test_parity_trailing_byte() {
        let (even, odd) = split(b"ABC");
        let p = parity(&even, &odd);
        assert_eq!(2, p.len());
        assert_eq!(b'A' ^ b'B', p[0]);
        assert_eq!(b'C', p[1]);
    }

    #[test]
    fn test_reconstruct_rejects_bad_sizes() {
        assert_eq!(
            Err(CodecError::InvalidReconstructionSizes { data: 2, parity: 3 }),
            reconstruct_from_even(b"ab", b"xyz", false)
        );
        assert_eq!(
            Err(CodecError::InvalidReconstructionSizes { data: 2, parity: 2 }),
            reconstruct_from_odd(b"ab", b"xy", true)
        );
        assert_eq!(
            Err(CodecError::InvalidReconstructionSizes { data: 2, parity: 4 }),
            reconstruct_from_odd(b"ab", b"wxyz", false)
        );
    }

    #[test]
    fn test_roundtrip_known_data() {
        let data = b"Hello Self-Healing World!";
        let (even, odd) = split(data);
        let p = parity(&even, &odd);
        let odd_length = data.len() % 2 == 1;
        assert!(odd_length);
        assert_eq!(
            data.to_vec(),
            reconstruct_from_even(&even, &p, odd_length).unwrap()
        );
        assert_eq!(
            data.to_vec(),
            reconstruct_from_odd(&odd, &p, odd_length).unwrap()
        );
    }

    #[test]
    fn test_roundtrip_random() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..500 {
            let len = rng.gen_range(0..512);
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let (even, odd) = split(&data);
            let p = parity(&even, &odd);
            let odd_length = data.len() % 2 == 1;

            assert_eq!(data, merge(&even, &odd).unwrap());
            assert_eq!(data, reconstruct_from_even(&even, &p, odd_length).unwrap());
            assert_eq!(data, reconstruct_from_odd(&odd, &p, odd_length).unwrap());

            assert_eq!(
                data.len() as u64,
                size_from_even_and_parity(even.len() as u64, p.len() as u64, odd_length)
            );
            assert_eq!(
                data.len() as u64,
                size_from_odd_and_parity(odd.len() as u64, p.len() as u64)
            );
        }
    }
}
