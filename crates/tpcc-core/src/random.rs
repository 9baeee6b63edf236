//! TPC-C random input generators.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const SYLLABLES: [&str; 10] = [
    "BAR", "OUGHT", "ABLE", "PRI", "PRES", "ESE", "ANTI", "CALLY", "ATION", "EING",
];

/// Run-wide `C` constants of the NURand function, one per `A` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NurandConstants {
    pub c_last: u32,
    pub c_id: u32,
    pub ol_i_id: u32,
}

impl NurandConstants {
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        Self {
            c_last: rng.gen_range(0..=255),
            c_id: rng.gen_range(0..=1023),
            ol_i_id: rng.gen_range(0..=8191),
        }
    }

    fn for_a(&self, a: u32) -> u32 {
        match a {
            255 => self.c_last,
            1023 => self.c_id,
            8191 => self.ol_i_id,
            _ => 0,
        }
    }
}

/// Per-worker random stream.
#[derive(Debug, Clone)]
pub struct TpccRng {
    rng: SmallRng,
    constants: NurandConstants,
}

impl TpccRng {
    pub fn new(seed: u64, constants: NurandConstants) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            constants,
        }
    }

    /// Uniform integer in `[low, high]`.
    pub fn uniform(&mut self, low: u32, high: u32) -> u32 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// TPC-C non-uniform random integer in `[low, high]`.
    pub fn nurand(&mut self, a: u32, low: u32, high: u32) -> u32 {
        let c = self.constants.for_a(a);
        let spread = high - low + 1;
        (((self.uniform(0, a) | self.uniform(low, high)) + c) % spread) + low
    }
}

/// Customer last name for `num` in `0..=999`, built from three syllables.
pub fn lastname(num: u32) -> String {
    let num = num % 1000;
    let mut name = String::with_capacity(16);
    name.push_str(SYLLABLES[(num / 100) as usize]);
    name.push_str(SYLLABLES[((num / 10) % 10) as usize]);
    name.push_str(SYLLABLES[(num % 10) as usize]);
    name
}
