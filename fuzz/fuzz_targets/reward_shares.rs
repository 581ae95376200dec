#![no_main]

use libfuzzer_sys::fuzz_target;
use pylon_core::{
    calculate_reward_shares, distribution_percentages, Address, Coins, Delegation, Denom,
    StakeSnapshot,
};

const MAX_STAKERS: usize = 64;

struct Cursor<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, index: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.index.checked_add(n)?;
        if end > self.bytes.len() {
            return None;
        }
        let out = &self.bytes[self.index..end];
        self.index = end;
        Some(out)
    }

    fn take_u8(&mut self) -> Option<u8> {
        Some(*self.take(1)?.first()?)
    }

    fn take_u128_le(&mut self) -> Option<u128> {
        let s = self.take(16)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(s);
        Some(u128::from_le_bytes(out))
    }
}

fuzz_target!(|data: &[u8]| {
    let mut c = Cursor::new(data);
    let n = match c.take_u8() {
        Some(x) => (x as usize).min(MAX_STAKERS),
        None => return,
    };
    let pool_amount = match c.take_u128_le() {
        Some(x) => x,
        None => return,
    };

    let mut delegations = Vec::with_capacity(n);
    for _ in 0..n {
        // Few distinct names so aggregation across validators is exercised.
        let who = match c.take_u8() {
            Some(x) => x % 16,
            None => return,
        };
        let weight = match c.take_u128_le() {
            Some(x) => x >> 8,
            None => return,
        };
        let (Ok(delegator), Ok(validator)) = (
            Address::new(format!("staker{who}")),
            Address::new(format!("val{}", who % 3)),
        ) else {
            return;
        };
        delegations.push(Delegation {
            delegator,
            validator,
            weight,
        });
    }

    let Ok(denom) = Denom::new("upylon") else {
        return;
    };
    let pool = Coins::single(denom.clone(), pool_amount);
    let snapshot = StakeSnapshot::new(delegations);

    // Aggregated weights may overflow u128; that must be a clean error, never a panic.
    let Ok(percentages) = distribution_percentages(&snapshot) else {
        return;
    };
    let shares = calculate_reward_shares(&percentages, &pool).expect("consistent percentages");

    let mut total: u128 = 0;
    for share in &shares {
        let amount = share.coins.amount_of(&denom);
        assert!(amount > 0, "zero shares are omitted");
        total = total.checked_add(amount).expect("shares fit the pool");
    }
    assert!(total <= pool_amount, "shares exceed pool");
    if !percentages.is_empty() {
        assert!(pool_amount - total < percentages.len() as u128);
    }
});
