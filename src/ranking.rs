use serde::Serialize;

use crate::stats::compute_points;

pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 50;
pub const DEFAULT_COMBINED_LIMIT: i64 = 10;

/// Per-member progress totals as fetched by the repository
/// (`db::get_member_progress_totals`). Members with no progress records
/// arrive with all-zero numbers rather than being absent.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberProgressTotals {
    pub user_id: i64,
    pub display_name: String,
    pub avatar: String,
    pub days_smoke_free: i64,
    pub total_money_saved: i64,
    pub smoke_free_days: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RankingEntry {
    pub user_id: i64,
    pub full_name: String,
    pub avatar: String,
    pub rank: i64,
    pub days_smoke_free: i64,
    pub total_money_saved: i64,
    pub points: i64,
}

/// Rank all members: compute points, sort by (days smoke-free desc, money
/// saved desc, points desc) and assign 1-based positions. The sort is
/// stable, so members with fully equal keys keep the repository's order
/// and results are deterministic across calls. Ties still get distinct
/// consecutive ranks.
pub fn rank_members(totals: Vec<MemberProgressTotals>) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = totals
        .into_iter()
        .map(|t| {
            let points = compute_points(t.days_smoke_free, t.total_money_saved, t.smoke_free_days);
            RankingEntry {
                user_id: t.user_id,
                full_name: t.display_name,
                avatar: t.avatar,
                rank: 0,
                days_smoke_free: t.days_smoke_free,
                total_money_saved: t.total_money_saved,
                points,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.days_smoke_free
            .cmp(&a.days_smoke_free)
            .then(b.total_money_saved.cmp(&a.total_money_saved))
            .then(b.points.cmp(&a.points))
    });

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i as i64 + 1;
    }

    entries
}

pub fn leaderboard(totals: Vec<MemberProgressTotals>, limit: i64) -> Vec<RankingEntry> {
    let mut entries = rank_members(totals);
    entries.truncate(limit.max(0) as usize);
    entries
}

/// Rank over the full member population, then pick out one user.
/// Returns None for ids that produce no entry (unknown or non-member id).
pub fn user_rank(totals: Vec<MemberProgressTotals>, user_id: i64) -> Option<RankingEntry> {
    rank_members(totals)
        .into_iter()
        .find(|entry| entry.user_id == user_id)
}

#[derive(Debug, Serialize, Clone)]
pub struct LeaderboardWithUser {
    pub leaderboard: Vec<RankingEntry>,
    pub current_user_rank: Option<RankingEntry>,
}

/// Top-N slice plus the caller's own entry from the full ranking. Both
/// views come from a single ranked sequence, so the caller's entry is
/// inside the slice exactly when their rank is within the limit — no
/// splice/dedupe step is needed on the consumer side.
pub fn leaderboard_with_user(
    totals: Vec<MemberProgressTotals>,
    user_id: i64,
    limit: i64,
) -> LeaderboardWithUser {
    let mut ranked = rank_members(totals);
    let current_user_rank = ranked.iter().find(|e| e.user_id == user_id).cloned();
    ranked.truncate(limit.max(0) as usize);

    LeaderboardWithUser {
        leaderboard: ranked,
        current_user_rank,
    }
}
