use rand::{RngExt, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

// pi * 100_000
pub const DEFAULT_SEED: u64 = 314159;

pub fn new() -> impl RngExt {
    from_seed(DEFAULT_SEED)
}

pub fn from_seed(seed: u64) -> impl RngExt {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}
