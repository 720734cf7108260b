//! Coupon wallet mirror
//!
//! The wallet is the device's copy of the coupons the user has claimed. The
//! server is the system of record for claims, but two transitions happen
//! locally first: claiming (the server has accepted it, but a listing may not
//! show it yet) and redeeming (done at the counter and never pushed back).
//! Each entry therefore tracks whether it is known to match the server:
//!
//! - `Synced`: last reconcile saw the server agree with this entry
//! - `LocallyAhead`: a local transition the server has not reported yet
//! - `Stale`: restored from disk, not yet compared with the server
//!
//! Merges follow the coupon lifecycle order (see [`CouponStatus::rank`]) and
//! never move an entry backwards, so a redeemed coupon stays redeemed whatever
//! a later listing says.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{Coupon, CouponId, CouponStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Synced,
    LocallyAhead,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub coupon: Coupon,
    pub sync: SyncState,
}

/// Outcome of [`Wallet::mark_redeemed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    Redeemed,
    NotInWallet,
    /// The entry's effective status on the given day, when it is not `Claimed`
    NotRedeemable(CouponStatus),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    entries: Vec<WalletEntry>,
    /// Ids the user removed; reconcile will not bring them back
    #[serde(default)]
    dismissed: BTreeSet<CouponId>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare a wallet read back from storage
    ///
    /// Anything that was in sync when saved can no longer be assumed to be.
    pub fn restored(mut self) -> Self {
        for entry in &mut self.entries {
            if entry.sync == SyncState::Synced {
                entry.sync = SyncState::Stale;
            }
        }
        self
    }

    pub fn entries(&self) -> &[WalletEntry] {
        &self.entries
    }

    pub fn coupons(&self) -> Vec<Coupon> {
        self.entries.iter().map(|e| e.coupon.clone()).collect()
    }

    pub fn get(&self, id: CouponId) -> Option<&WalletEntry> {
        self.entries.iter().find(|e| e.coupon.id == id)
    }

    pub fn contains(&self, id: CouponId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dismissed(&self, id: CouponId) -> bool {
        self.dismissed.contains(&id)
    }

    /// Wallet-level state: any entry ahead wins, then any stale entry
    pub fn state(&self) -> SyncState {
        if self.entries.iter().any(|e| e.sync == SyncState::LocallyAhead) {
            SyncState::LocallyAhead
        } else if self.entries.iter().any(|e| e.sync == SyncState::Stale) {
            SyncState::Stale
        } else {
            SyncState::Synced
        }
    }

    /// Record a successful claim. Returns false, changing nothing, when the
    /// coupon is already in the wallet.
    pub fn insert_claimed(&mut self, coupon: &Coupon) -> bool {
        if self.contains(coupon.id) {
            return false;
        }

        let mut coupon = coupon.clone();
        if coupon.status.rank() < CouponStatus::Claimed.rank() {
            coupon.status = CouponStatus::Claimed;
        }

        self.dismissed.remove(&coupon.id);
        self.entries.push(WalletEntry {
            coupon,
            sync: SyncState::LocallyAhead,
        });
        true
    }

    /// Redeem a claimed coupon
    ///
    /// Only an entry that is `Claimed` and unexpired on `today` moves to
    /// `Redeemed`; anything else is reported back unchanged.
    pub fn mark_redeemed(&mut self, id: CouponId, today: NaiveDate) -> Redemption {
        let Some(entry) = self.entries.iter_mut().find(|e| e.coupon.id == id) else {
            return Redemption::NotInWallet;
        };
        match entry.coupon.effective_status(today) {
            CouponStatus::Claimed => {
                entry.coupon.status = CouponStatus::Redeemed;
                entry.sync = SyncState::LocallyAhead;
                Redemption::Redeemed
            }
            status => Redemption::NotRedeemable(status),
        }
    }

    /// Drop a coupon from the wallet and keep it out of future reconciles
    pub fn remove(&mut self, id: CouponId) -> Option<Coupon> {
        let index = self.entries.iter().position(|e| e.coupon.id == id)?;
        self.dismissed.insert(id);
        Some(self.entries.remove(index).coupon)
    }

    /// Merge the server's claimed-coupon listing into the wallet
    ///
    /// Returns true if anything changed.
    pub fn reconcile(&mut self, remote: Vec<Coupon>) -> bool {
        let before = self.clone();

        let mut remote: Vec<Coupon> = remote
            .into_iter()
            .filter(|c| !self.dismissed.contains(&c.id))
            .collect();

        let mut merged = Vec::with_capacity(self.entries.len() + remote.len());
        for entry in self.entries.drain(..) {
            match remote.iter().position(|c| c.id == entry.coupon.id) {
                Some(index) => merged.push(merge_entry(entry, remote.remove(index))),
                None if entry.sync == SyncState::LocallyAhead => merged.push(entry),
                None => {}
            }
        }
        merged.extend(remote.into_iter().map(|coupon| WalletEntry {
            coupon,
            sync: SyncState::Synced,
        }));

        self.entries = merged;
        *self != before
    }

    /// Forget everything, including dismissals
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dismissed.clear();
    }
}

fn merge_entry(local: WalletEntry, remote: Coupon) -> WalletEntry {
    if local.coupon.status.rank() > remote.status.rank() {
        let status = local.coupon.status;
        WalletEntry {
            coupon: Coupon { status, ..remote },
            sync: SyncState::LocallyAhead,
        }
    } else {
        WalletEntry {
            coupon: remote,
            sync: SyncState::Synced,
        }
    }
}
