//! Reusable test routines, shared by the unit tests, the integration tests and
//! the guard crates that plug their own reclamation strategy in.
//!
//! Every routine is generic over the `Guard` so one body covers all of them.

pub mod sorted_list_tests;

use std::hash::{BuildHasherDefault, Hasher};

/// Hasher that passes integer keys through unchanged.
///
/// Lets tests choose hash codes directly: bucket placement, growth and
/// collisions become deterministic. Non-integer input falls back to FNV-1a.
#[derive(Default, Clone, Copy)]
pub struct IdentityHasher {
    hash: u64,
}

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.hash
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut hash = if self.hash == 0 {
            0xcbf2_9ce4_8422_2325
        } else {
            self.hash
        };
        for byte in bytes {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        self.hash = hash;
    }

    fn write_u32(&mut self, n: u32) {
        self.hash = n as u64;
    }

    fn write_u64(&mut self, n: u64) {
        self.hash = n;
    }

    fn write_usize(&mut self, n: usize) {
        self.hash = n as u64;
    }

    fn write_i32(&mut self, n: i32) {
        self.hash = n as u32 as u64;
    }

    fn write_i64(&mut self, n: i64) {
        self.hash = n as u64;
    }
}

pub type IdentityState = BuildHasherDefault<IdentityHasher>;
