//! Domain types: accounts, denominations, coin bundles, fee rates, recipes and execution records.
//!
//! Every constructor validates its input once; after construction the values are trusted by the
//! engines (invalid states are unrepresentable).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bounds::RuntimeBounds;
use crate::math::{add_u128, mul_div_floor, sub_u128};
use crate::{PylonError, Result};

/// Integer coin amount in the smallest unit of its denomination.
pub type Amount = u128;

pub const MAX_ADDRESS_LEN: usize = 255;
pub const MIN_DENOM_LEN: usize = 3;
pub const MAX_DENOM_LEN: usize = 128;

/// Account identifier in the external ledger (opaque, e.g. bech32).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Result<Address> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(PylonError::InvalidInput("address must be non-empty".into()));
        }
        if value.len() > MAX_ADDRESS_LEN {
            return Err(PylonError::InvalidInput(format!(
                "address longer than {MAX_ADDRESS_LEN} bytes"
            )));
        }
        Ok(Address(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = PylonError;
    fn try_from(value: String) -> Result<Self> {
        Address::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coin denomination, validated against `[a-zA-Z][a-zA-Z0-9/:._-]{2,127}`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Denom(String);

impl Denom {
    pub fn new(value: impl Into<String>) -> Result<Denom> {
        let value = value.into();
        let len = value.len();
        if !(MIN_DENOM_LEN..=MAX_DENOM_LEN).contains(&len) {
            return Err(PylonError::InvalidInput(format!(
                "denom length {len} outside [{MIN_DENOM_LEN}, {MAX_DENOM_LEN}]: {value:?}"
            )));
        }
        let mut chars = value.chars();
        let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));
        if !first_ok || !rest_ok {
            return Err(PylonError::InvalidInput(format!("invalid denom: {value:?}")));
        }
        Ok(Denom(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Denom {
    type Error = PylonError;
    fn try_from(value: String) -> Result<Self> {
        Denom::new(value)
    }
}

impl From<Denom> for String {
    fn from(value: Denom) -> Self {
        value.0
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serde helper: amounts travel as decimal strings (JSON numbers cannot hold `u128` portably).
/// Plain unsigned JSON numbers are accepted on input.
pub mod amount_string {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = u128;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an unsigned integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
                Ok(v as u128)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
                v.parse::<u128>()
                    .map_err(|e| E::custom(format!("invalid amount {v:?}: {e}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// A single `(denom, amount)` pair; the wire form of [`Coins`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: Denom,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: Denom, amount: Amount) -> Coin {
        Coin { denom, amount }
    }
}

/// Canonical coin multiset: sorted by denom, no zero entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(BTreeMap<Denom, Amount>);

impl Coins {
    pub fn new() -> Coins {
        Coins(BTreeMap::new())
    }

    pub fn single(denom: Denom, amount: Amount) -> Coins {
        let mut out = Coins::new();
        if amount > 0 {
            out.0.insert(denom, amount);
        }
        out
    }

    /// Builds a canonical bundle, summing duplicate denominations (checked).
    pub fn from_pairs<I>(pairs: I) -> Result<Coins>
    where
        I: IntoIterator<Item = (Denom, Amount)>,
    {
        let mut out = Coins::new();
        for (denom, amount) in pairs {
            out.add_amount(denom, amount)?;
        }
        Ok(out)
    }

    pub fn amount_of(&self, denom: &Denom) -> Amount {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of denominations with a non-zero amount.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Denom, Amount)> + '_ {
        self.0.iter().map(|(d, a)| (d, *a))
    }

    pub fn add_amount(&mut self, denom: Denom, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let prev = self.amount_of(&denom);
        self.0.insert(denom, add_u128(prev, amount)?);
        Ok(())
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            out.add_amount(denom.clone(), amount)?;
        }
        Ok(out)
    }

    /// `self - other` per denomination; fails if any denomination would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Result<Coins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let prev = out.amount_of(denom);
            let next = sub_u128(prev, amount).map_err(|_| {
                PylonError::InvalidInput(format!(
                    "coin underflow for {denom}: {prev} - {amount}"
                ))
            })?;
            if next == 0 {
                out.0.remove(denom);
            } else {
                out.0.insert(denom.clone(), next);
            }
        }
        Ok(out)
    }

    /// True iff `self` holds at least `other` in every denomination `other` names.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other
            .iter()
            .all(|(denom, amount)| self.amount_of(denom) >= amount)
    }
}

impl TryFrom<Vec<Coin>> for Coins {
    type Error = PylonError;
    fn try_from(value: Vec<Coin>) -> Result<Self> {
        Coins::from_pairs(value.into_iter().map(|c| (c.denom, c.amount)))
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(value: Coins) -> Self {
        value
            .0
            .into_iter()
            .map(|(denom, amount)| Coin::new(denom, amount))
            .collect()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("0");
        }
        let mut first = true;
        for (denom, amount) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{amount}{denom}")?;
            first = false;
        }
        Ok(())
    }
}

/// Number of fixed-point atoms in `1.0` (18 decimal places).
pub const FEE_RATE_SCALE: u128 = 1_000_000_000_000_000_000;
pub const FEE_RATE_DECIMALS: usize = 18;

/// Fee fraction in `[0, 1]`, fixed point with 18 decimals.
///
/// Rounding rule: every fee is `floor(amount * rate)`; the payer-side remainder goes to `net`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeeRate(u128);

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate(0);
    pub const ONE: FeeRate = FeeRate(FEE_RATE_SCALE);

    pub fn from_atoms(atoms: u128) -> Result<FeeRate> {
        if atoms > FEE_RATE_SCALE {
            return Err(PylonError::InvalidInput(format!(
                "fee rate above 1.0: {atoms} atoms"
            )));
        }
        Ok(FeeRate(atoms))
    }

    pub fn from_bps(bps: u32) -> Result<FeeRate> {
        FeeRate::from_ratio(bps as u128, 10_000)
    }

    pub fn from_percent(percent: u32) -> Result<FeeRate> {
        FeeRate::from_ratio(percent as u128, 100)
    }

    /// `num / den`, floored to 18 decimals.
    pub fn from_ratio(num: u128, den: u128) -> Result<FeeRate> {
        FeeRate::from_atoms(mul_div_floor(num, FEE_RATE_SCALE, den)?)
    }

    pub fn atoms(self) -> u128 {
        self.0
    }

    /// `floor(amount * rate)`.
    pub fn fee_of(self, amount: Amount) -> Result<Amount> {
        mul_div_floor(amount, self.0, FEE_RATE_SCALE)
    }
}

impl Default for FeeRate {
    /// 10%.
    fn default() -> Self {
        FeeRate(FEE_RATE_SCALE / 10)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / FEE_RATE_SCALE;
        let frac = self.0 % FEE_RATE_SCALE;
        write!(f, "{int}.{frac:0width$}", width = FEE_RATE_DECIMALS)
    }
}

impl FromStr for FeeRate {
    type Err = PylonError;

    /// Parses a plain decimal such as `"0.1"` or `"0.025"` (at most 18 fractional digits).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PylonError::InvalidInput(format!("invalid fee rate: {s:?}"));
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty()
            || frac_part.len() > FEE_RATE_DECIMALS
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let int: u128 = int_part.parse().map_err(|_| invalid())?;
        let frac: u128 = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{frac_part:0<width$}", width = FEE_RATE_DECIMALS);
            padded.parse().map_err(|_| invalid())?
        };
        let atoms = int
            .checked_mul(FEE_RATE_SCALE)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(invalid)?;
        FeeRate::from_atoms(atoms)
    }
}

impl TryFrom<String> for FeeRate {
    type Error = PylonError;
    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FeeRate> for String {
    fn from(value: FeeRate) -> Self {
        value.to_string()
    }
}

/// Identifies a recipe inside its cookbook.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipeKey {
    pub cookbook_id: String,
    pub recipe_id: String,
}

impl RecipeKey {
    pub fn new(cookbook_id: impl Into<String>, recipe_id: impl Into<String>) -> RecipeKey {
        RecipeKey {
            cookbook_id: cookbook_id.into(),
            recipe_id: recipe_id.into(),
        }
    }
}

impl fmt::Display for RecipeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cookbook_id, self.recipe_id)
    }
}

/// One admissible payment bundle for a recipe.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInput {
    pub coins: Coins,
}

/// Non-monetary product credited to the payer when an execution is actualized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutput {
    pub item_id: String,
    pub quantity: u64,
}

/// Recipe as resolved from the external catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub cookbook_id: String,
    pub id: String,
    /// Cookbook owner; receives the net amount on settlement.
    pub owner: Address,
    pub coin_inputs: Vec<CoinInput>,
    /// Maturity delay in blocks.
    pub block_interval: u64,
    /// Recipe-specific fee; `None` falls back to the configured default.
    #[serde(default)]
    pub fee_rate: Option<FeeRate>,
    #[serde(default)]
    pub outputs: Vec<ItemOutput>,
    pub enabled: bool,
}

impl Recipe {
    pub fn key(&self) -> RecipeKey {
        RecipeKey::new(self.cookbook_id.clone(), self.id.clone())
    }

    /// Structural checks applied when a recipe enters a catalog.
    pub fn validate(&self, bounds: &RuntimeBounds) -> Result<()> {
        if self.cookbook_id.is_empty() || self.id.is_empty() {
            return Err(PylonError::InvalidInput(
                "recipe cookbook_id and id must be non-empty".into(),
            ));
        }
        if self.coin_inputs.len() > bounds.max_coin_inputs_per_recipe {
            return Err(PylonError::BoundedValueExceeded(format!(
                "recipe {} has {} coin inputs (max {})",
                self.key(),
                self.coin_inputs.len(),
                bounds.max_coin_inputs_per_recipe
            )));
        }
        if self.outputs.iter().any(|o| o.item_id.is_empty()) {
            return Err(PylonError::InvalidInput(format!(
                "recipe {} has an output with an empty item_id",
                self.key()
            )));
        }
        Ok(())
    }
}

/// Identifier of a pending execution, allocated monotonically by [`crate::ExecutionState`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PendingExecutionId(pub u64);

impl fmt::Display for PendingExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An execution keeps the identifier of the pending entry it settled.
pub type ExecutionId = PendingExecutionId;

/// Recipe invocation awaiting maturity.
///
/// `recipe_owner`, `fee_rate` and `outputs` are snapshotted at invocation so later recipe
/// updates never change an already-pending entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExecution {
    pub id: PendingExecutionId,
    pub recipe: RecipeKey,
    pub coin_input_index: usize,
    pub payer: Address,
    pub recipe_owner: Address,
    /// Copy of the selected coin input; debited only at settlement.
    pub escrow: Coins,
    pub fee_rate: FeeRate,
    pub outputs: Vec<ItemOutput>,
    pub created_height: u64,
    pub maturity_height: u64,
}

/// Settled execution (write-once).
///
/// Conservation: `gross == fee + net` in every denomination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub recipe: RecipeKey,
    pub payer: Address,
    pub recipe_owner: Address,
    pub gross: Coins,
    pub fee: Coins,
    pub net: Coins,
    pub outputs: Vec<ItemOutput>,
    pub completed_height: u64,
}
