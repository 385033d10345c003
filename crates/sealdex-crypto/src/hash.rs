//! Digest helpers: fixed-output hashing plus n-fold chaining.

use sha2::{Digest, Sha256, Sha512};

/// Digest selector for [`chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlg {
    Sha256,
    #[default]
    Sha512,
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Apply the selected hash `n` times to `value`.
///
/// `n = 0` returns the input unchanged.
pub fn chain(value: &[u8], n: usize, alg: HashAlg) -> Vec<u8> {
    let mut out = value.to_vec();
    for _ in 0..n {
        out = match alg {
            HashAlg::Sha256 => sha256(&out).to_vec(),
            HashAlg::Sha512 => sha512(&out).to_vec(),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256_known_answer() {
        assert_eq!(
            sha256(b"abc"),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn sha512_known_answer() {
        assert_eq!(
            sha512(b"abc"),
            hex!(
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a"
                "2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
            )
        );
    }

    #[test]
    fn chain_zero_is_identity() {
        assert_eq!(chain(b"payload", 0, HashAlg::Sha256), b"payload");
    }

    #[test]
    fn chain_composes() {
        let once = chain(b"payload", 1, HashAlg::Sha512);
        let twice = chain(b"payload", 2, HashAlg::Sha512);
        assert_eq!(chain(&once, 1, HashAlg::Sha512), twice);
        assert_eq!(once.as_slice(), &sha512(b"payload")[..]);
    }
}
