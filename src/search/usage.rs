// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-user search allowances by subscription tier
//!
//! Independent of provider quotas: a user can be out of searches while every
//! provider still has capacity, and the other way round. Weeks start Monday
//! 00:00 local time, months on the 1st.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clock::Clock;
use super::types::SearchError;

/// Subscription tier reported by the auth collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Anonymous,
    Basic,
    Premium,
    Admin,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Anonymous => "anonymous",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Admin => "admin",
        }
    }

    /// Weekly and monthly allowance; `None` means unlimited
    pub fn limits(&self) -> Option<TierLimits> {
        match self {
            SubscriptionTier::Anonymous => Some(TierLimits::new(5, 10)),
            SubscriptionTier::Basic => Some(TierLimits::new(25, 100)),
            SubscriptionTier::Premium => Some(TierLimits::new(250, 1000)),
            SubscriptionTier::Admin => None,
        }
    }

    /// Whether queued requests from this tier jump ahead of others
    pub fn is_priority(&self) -> bool {
        matches!(self, SubscriptionTier::Premium | SubscriptionTier::Admin)
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anonymous" | "free" | "guest" => Ok(SubscriptionTier::Anonymous),
            "basic" => Ok(SubscriptionTier::Basic),
            "premium" | "pro" => Ok(SubscriptionTier::Premium),
            "admin" => Ok(SubscriptionTier::Admin),
            other => Err(format!("unknown subscription tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierLimits {
    pub weekly: u32,
    pub monthly: u32,
}

impl TierLimits {
    pub fn new(weekly: u32, monthly: u32) -> Self {
        Self { weekly, monthly }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    Week,
    Month,
}

impl fmt::Display for UsagePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsagePeriod::Week => f.write_str("weekly"),
            UsagePeriod::Month => f.write_str("monthly"),
        }
    }
}

/// Who is searching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub tier: SubscriptionTier,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, tier: SubscriptionTier) -> Self {
        Self {
            user_id: user_id.into(),
            tier,
        }
    }
}

/// Remaining allowance plus a message the UI can show as-is
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub weekly_used: u32,
    pub monthly_used: u32,
    /// `None` for unlimited tiers
    pub weekly_remaining: Option<u32>,
    pub monthly_remaining: Option<u32>,
    pub week_resets_on: NaiveDate,
    pub month_resets_on: NaiveDate,
    pub message: String,
}

/// One search counted against a user by [`UsageTracker::reserve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReservation {
    user_id: String,
    week_start: NaiveDate,
    month_start: NaiveDate,
}

#[derive(Debug, Clone, Copy)]
struct UserUsage {
    week_start: NaiveDate,
    weekly: u32,
    month_start: NaiveDate,
    monthly: u32,
}

impl UserUsage {
    fn new(today: NaiveDate) -> Self {
        Self {
            week_start: week_start(today),
            weekly: 0,
            month_start: month_start(today),
            monthly: 0,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        let week = week_start(today);
        if week != self.week_start {
            self.week_start = week;
            self.weekly = 0;
        }
        let month = month_start(today);
        if month != self.month_start {
            self.month_start = month;
            self.monthly = 0;
        }
    }

    /// First exhausted period, if any
    fn exhausted(&self, limits: TierLimits) -> Option<(UsagePeriod, u32)> {
        if self.weekly >= limits.weekly {
            Some((UsagePeriod::Week, limits.weekly))
        } else if self.monthly >= limits.monthly {
            Some((UsagePeriod::Month, limits.monthly))
        } else {
            None
        }
    }
}

/// Per-user weekly and monthly search counters
pub struct UsageTracker {
    clock: Arc<dyn Clock>,
    users: Mutex<HashMap<String, UserUsage>>,
}

impl UsageTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            users: Mutex::new(HashMap::new()),
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&Local).date_naive()
    }

    /// Check the allowance and count one search under a single lock
    ///
    /// Concurrent searches by one user cannot overspend. Hand the reservation
    /// back through [`release`](Self::release) when the search fails.
    ///
    /// # Errors
    /// `UsageLimitExceeded` if the user has no searches left; nothing is counted
    pub fn reserve(&self, user: &UserContext) -> Result<UsageReservation, SearchError> {
        let today = self.today();
        let reservation = UsageReservation {
            user_id: user.user_id.clone(),
            week_start: week_start(today),
            month_start: month_start(today),
        };

        let mut users = match self.users.lock() {
            Ok(users) => users,
            Err(_) => {
                warn!("Usage table lock poisoned; allowing search for {}", user.user_id);
                return Ok(reservation);
            }
        };
        let usage = users
            .entry(user.user_id.clone())
            .or_insert_with(|| UserUsage::new(today));
        usage.roll(today);

        if let Some((period, limit)) = user.tier.limits().and_then(|limits| usage.exhausted(limits)) {
            return Err(SearchError::UsageLimitExceeded {
                tier: user.tier.to_string(),
                period: period.to_string(),
                limit,
            });
        }

        usage.weekly = usage.weekly.saturating_add(1);
        usage.monthly = usage.monthly.saturating_add(1);
        debug!(
            "Usage for {} ({}): {} this week, {} this month",
            user.user_id, user.tier, usage.weekly, usage.monthly
        );
        Ok(reservation)
    }

    /// Give back a reserved search that did not complete
    ///
    /// Only windows that are still current are credited.
    pub fn release(&self, reservation: UsageReservation) {
        let Ok(mut users) = self.users.lock() else {
            return;
        };
        let Some(usage) = users.get_mut(&reservation.user_id) else {
            return;
        };
        if usage.week_start == reservation.week_start {
            usage.weekly = usage.weekly.saturating_sub(1);
        }
        if usage.month_start == reservation.month_start {
            usage.monthly = usage.monthly.saturating_sub(1);
        }
    }

    pub fn summary(&self, user: &UserContext) -> UsageSummary {
        let today = self.today();
        let mut usage = self
            .users
            .lock()
            .ok()
            .and_then(|users| users.get(&user.user_id).copied())
            .unwrap_or_else(|| UserUsage::new(today));
        usage.roll(today);

        let week_resets_on = usage.week_start + Duration::days(7);
        let month_resets_on = next_month_start(usage.month_start);

        let (weekly_remaining, monthly_remaining, message) = match user.tier.limits() {
            None => (
                None,
                None,
                format!("Unlimited searches on the {} plan.", user.tier),
            ),
            Some(limits) => {
                let weekly = limits.weekly.saturating_sub(usage.weekly);
                let monthly = limits.monthly.saturating_sub(usage.monthly);
                let message = match usage.exhausted(limits) {
                    Some((UsagePeriod::Week, limit)) => format!(
                        "You've used all {} searches for this week. Upgrade your plan or wait until {}.",
                        limit, week_resets_on
                    ),
                    Some((UsagePeriod::Month, limit)) => format!(
                        "You've used all {} searches for this month. Upgrade your plan or wait until {}.",
                        limit, month_resets_on
                    ),
                    None => format!(
                        "{} of {} searches left this week, {} of {} this month.",
                        weekly, limits.weekly, monthly, limits.monthly
                    ),
                };
                (Some(weekly), Some(monthly), message)
            }
        };

        UsageSummary {
            user_id: user.user_id.clone(),
            tier: user.tier,
            weekly_used: usage.weekly,
            monthly_used: usage.monthly,
            weekly_remaining,
            monthly_remaining,
            week_resets_on,
            month_resets_on,
            message,
        }
    }
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn next_month_start(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first + Duration::days(31))
}
