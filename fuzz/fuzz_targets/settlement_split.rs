#![no_main]

use libfuzzer_sys::fuzz_target;
use pylon_core::settlement::split_fee;
use pylon_core::{Coins, Denom, FeeRate};

fuzz_target!(|input: (u128, u128, u64)| {
    let (a, b, atoms) = input;
    let Ok(rate) = FeeRate::from_atoms(u128::from(atoms) % (FeeRate::ONE.atoms() + 1)) else {
        return;
    };
    let (Ok(upylon), Ok(stake)) = (Denom::new("upylon"), Denom::new("ustake")) else {
        return;
    };
    let Ok(gross) = Coins::from_pairs([(upylon, a), (stake, b)]) else {
        return;
    };
    let (fee, net) = split_fee(&gross, rate).expect("split never fails for valid rates");
    assert_eq!(fee.checked_add(&net).expect("no overflow"), gross);
    assert!(gross.is_all_gte(&fee));
});
