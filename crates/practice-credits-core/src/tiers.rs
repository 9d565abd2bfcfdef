//! Threshold tables for pay-as-you-go pricing.
//!
//! A table is an ordered list of tiers. Every tier but the last has a bounded
//! capacity, expressed as the number of units *in that tier* (not a cumulative
//! count). The last tier is unbounded and carries the lowest rate.
//!
//! ```text
//! [{capacity: 500, rate: 85}, {capacity: null, rate: 74}]
//!   units 0..500   -> 85 credits each
//!   units 500..    -> 74 credits each
//! ```

use serde::{Deserialize, Serialize};

/// One pricing tier as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Units in this tier; `None` marks the unbounded terminal tier.
    pub capacity: Option<u64>,
    /// Credits per unit inside this tier.
    pub rate: u64,
}

impl Tier {
    /// A tier holding `capacity` units.
    #[must_use]
    pub const fn bounded(capacity: u64, rate: u64) -> Self {
        Self {
            capacity: Some(capacity),
            rate,
        }
    }

    /// The unbounded terminal tier.
    #[must_use]
    pub const fn unbounded(rate: u64) -> Self {
        Self {
            capacity: None,
            rate,
        }
    }
}

/// Reasons a list of tiers is not a usable threshold table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    /// No tiers at all.
    #[error("threshold table has no tiers")]
    Empty,

    /// A bounded tier with zero capacity.
    #[error("tier {index} has zero capacity")]
    ZeroCapacity {
        /// Position of the tier.
        index: usize,
    },

    /// An unbounded tier that is not the last one.
    #[error("tier {index} is unbounded but is not the last tier")]
    UnboundedBeforeEnd {
        /// Position of the tier.
        index: usize,
    },

    /// The last tier has a capacity.
    #[error("last tier must be unbounded")]
    MissingTerminal,

    /// A tier priced at zero credits.
    #[error("tier {index} has a zero rate")]
    ZeroRate {
        /// Position of the tier.
        index: usize,
    },

    /// Some bounded tier is cheaper than the terminal tier.
    #[error("terminal rate {terminal} is not the lowest (tier {index} has {rate})")]
    TerminalNotLowest {
        /// Terminal tier rate.
        terminal: u64,
        /// Position of the cheaper tier.
        index: usize,
        /// Its rate.
        rate: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Band {
    capacity: u64,
    rate: u64,
}

/// A validated, immutable threshold table.
///
/// The terminal tier is stored apart from the bounded ones so that a tier walk
/// can never run off the end of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct ThresholdTable {
    bands: Vec<Band>,
    terminal_rate: u64,
}

impl ThresholdTable {
    /// Validate and build a table.
    ///
    /// # Errors
    ///
    /// Returns a [`TierError`] describing the first problem found.
    pub fn new(tiers: Vec<Tier>) -> Result<Self, TierError> {
        let (terminal, bounded) = tiers.split_last().ok_or(TierError::Empty)?;
        if terminal.capacity.is_some() {
            return Err(TierError::MissingTerminal);
        }
        if terminal.rate == 0 {
            return Err(TierError::ZeroRate {
                index: bounded.len(),
            });
        }

        let mut bands = Vec::with_capacity(bounded.len());
        for (index, tier) in bounded.iter().enumerate() {
            let capacity = tier
                .capacity
                .ok_or(TierError::UnboundedBeforeEnd { index })?;
            if capacity == 0 {
                return Err(TierError::ZeroCapacity { index });
            }
            if tier.rate == 0 {
                return Err(TierError::ZeroRate { index });
            }
            if tier.rate < terminal.rate {
                return Err(TierError::TerminalNotLowest {
                    terminal: terminal.rate,
                    index,
                    rate: tier.rate,
                });
            }
            bands.push(Band {
                capacity,
                rate: tier.rate,
            });
        }

        Ok(Self {
            bands,
            terminal_rate: terminal.rate,
        })
    }

    /// A table with a single unbounded tier.
    ///
    /// # Errors
    ///
    /// Returns [`TierError::ZeroRate`] if `rate` is zero.
    pub fn flat(rate: u64) -> Result<Self, TierError> {
        Self::new(vec![Tier::unbounded(rate)])
    }

    /// Default SMS table: 85 credits for the first 500 segments, 80 for the
    /// next 2000, 74 afterwards.
    #[must_use]
    pub fn default_sms() -> Self {
        Self {
            bands: vec![
                Band {
                    capacity: 500,
                    rate: 85,
                },
                Band {
                    capacity: 2000,
                    rate: 80,
                },
            ],
            terminal_rate: 74,
        }
    }

    /// Default voice table: 150 credits for the first 100 minutes, 130 for
    /// the next 400, 110 afterwards.
    #[must_use]
    pub fn default_voice() -> Self {
        Self {
            bands: vec![
                Band {
                    capacity: 100,
                    rate: 150,
                },
                Band {
                    capacity: 400,
                    rate: 130,
                },
            ],
            terminal_rate: 110,
        }
    }

    /// The tiers in configuration form.
    #[must_use]
    pub fn tiers(&self) -> Vec<Tier> {
        self.bands
            .iter()
            .map(|band| Tier::bounded(band.capacity, band.rate))
            .chain(std::iter::once(Tier::unbounded(self.terminal_rate)))
            .collect()
    }

    /// Number of tiers including the terminal one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bands.len() + 1
    }

    /// Always `false`: a validated table has at least its terminal tier.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Rate of the unbounded terminal tier.
    #[must_use]
    pub const fn terminal_rate(&self) -> u64 {
        self.terminal_rate
    }

    /// Position a cursor on the tier that holds the next unit after
    /// `consumed` units have already been used.
    ///
    /// Capacities are accumulated in order until the running total exceeds
    /// `consumed`; the cursor's remaining capacity is what is left of that
    /// tier.
    #[must_use]
    pub fn cursor_at(&self, consumed: u64) -> TierCursor<'_> {
        let mut tier_end = 0u64;
        for (index, band) in self.bands.iter().enumerate() {
            tier_end = tier_end.saturating_add(band.capacity);
            if consumed < tier_end {
                return TierCursor {
                    table: self,
                    index,
                    remaining: Some(tier_end - consumed),
                };
            }
        }
        TierCursor {
            table: self,
            index: self.bands.len(),
            remaining: None,
        }
    }
}

impl TryFrom<Vec<Tier>> for ThresholdTable {
    type Error = TierError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self, Self::Error> {
        Self::new(tiers)
    }
}

impl From<ThresholdTable> for Vec<Tier> {
    fn from(table: ThresholdTable) -> Self {
        table.tiers()
    }
}

/// A position inside a threshold table during a tier walk.
#[derive(Debug, Clone, Copy)]
pub struct TierCursor<'a> {
    table: &'a ThresholdTable,
    index: usize,
    remaining: Option<u64>,
}

impl TierCursor<'_> {
    /// Zero-based index of the current tier.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Units left in the current tier, `None` on the terminal tier.
    #[must_use]
    pub const fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// Credits per unit in the current tier.
    #[must_use]
    pub fn rate(&self) -> u64 {
        self.table
            .bands
            .get(self.index)
            .map_or(self.table.terminal_rate, |band| band.rate)
    }

    /// Whether the cursor sits on the unbounded tier.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.remaining.is_none()
    }

    /// Move to the start of the next tier. No-op on the terminal tier.
    pub fn advance(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.index += 1;
        self.remaining = self.table.bands.get(self.index).map(|band| band.capacity);
    }
}
