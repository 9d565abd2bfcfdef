//! Transaction queries shared by all backends.

use chrono::{DateTime, Utc};
use practice_credits_core::{CreditTransaction, TransactionType};

/// Order in which transactions are returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recent first (history display).
    #[default]
    NewestFirst,
    /// Chronological (period replay).
    OldestFirst,
}

/// Filter and paging for a per-account transaction query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Only this transaction type.
    pub transaction_type: Option<TransactionType>,
    /// Only transactions created strictly after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Result order.
    pub order: SortOrder,
    /// Matching transactions to skip.
    pub offset: usize,
    /// Maximum number of transactions; `None` for all.
    pub limit: Option<usize>,
}

impl TransactionQuery {
    /// All transactions, newest first.
    #[must_use]
    pub fn newest_first() -> Self {
        Self::default()
    }

    /// All transactions, oldest first.
    #[must_use]
    pub fn oldest_first() -> Self {
        Self {
            order: SortOrder::OldestFirst,
            ..Self::default()
        }
    }

    /// Restrict to one transaction type.
    #[must_use]
    pub const fn of_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    /// Restrict to transactions after `since`, if given.
    #[must_use]
    pub const fn since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    /// Skip `offset` matches and return at most `limit`.
    #[must_use]
    pub const fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether `tx` passes the filters (paging aside).
    #[must_use]
    pub fn matches(&self, tx: &CreditTransaction) -> bool {
        self.transaction_type
            .map_or(true, |kind| tx.transaction_type == kind)
            && self.since.map_or(true, |since| tx.created_at > since)
    }

    /// Apply filters and paging to transactions supplied in chronological
    /// order.
    pub fn select<I>(&self, chronological: I) -> Vec<CreditTransaction>
    where
        I: DoubleEndedIterator<Item = CreditTransaction>,
    {
        let limit = self.limit.unwrap_or(usize::MAX);
        let filtered = |iter: &mut dyn Iterator<Item = CreditTransaction>| {
            iter.filter(|tx| self.matches(tx))
                .skip(self.offset)
                .take(limit)
                .collect::<Vec<_>>()
        };
        match self.order {
            SortOrder::OldestFirst => filtered(&mut chronological.into_iter()),
            SortOrder::NewestFirst => filtered(&mut chronological.into_iter().rev()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_credits_core::{AccountId, ReferenceId, UsageType};

    fn history() -> Vec<CreditTransaction> {
        let account_id = AccountId::generate();
        let purchase = CreditTransaction::purchase(
            account_id,
            1000,
            1000,
            None,
            ReferenceId::generate(),
            serde_json::Value::Null,
        );
        let usage = |units| {
            CreditTransaction::usage(
                account_id,
                UsageType::Sms,
                10,
                0,
                Some(units),
                ReferenceId::generate(),
                serde_json::Value::Null,
            )
        };
        vec![purchase, usage(1), usage(2), usage(3)]
    }

    #[test]
    fn newest_first_reverses_and_pages() {
        let txs = history();
        let page = TransactionQuery::newest_first()
            .page(1, 2)
            .select(txs.clone().into_iter());
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].units, Some(2));
        assert_eq!(page[1].units, Some(1));
    }

    #[test]
    fn type_and_since_filters() {
        let txs = history();
        let since = txs[0].created_at;
        let usage = TransactionQuery::oldest_first()
            .of_type(TransactionType::SmsUsage)
            .since(Some(since - chrono::Duration::seconds(1)))
            .select(txs.clone().into_iter());
        assert_eq!(usage.len(), 3);
        assert_eq!(usage[0].units, Some(1));

        let purchases = TransactionQuery::newest_first()
            .of_type(TransactionType::Purchase)
            .select(txs.into_iter());
        assert_eq!(purchases.len(), 1);
    }
}
