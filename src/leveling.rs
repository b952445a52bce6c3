//! XP curve and level progress.
//!
//! The backend owns a player's level. This module only answers "how far into
//! that level is the player", using the accelerating `100 * n^1.5` curve.

use crate::util::clamp_percent;
use serde::{Deserialize, Serialize};

/// XP needed to clear level 1.
pub const BASE_XP: f64 = 100.0;

/// Progress within the level the backend reports for a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub level: u32,
    /// XP earned since the level started. Negative when `level` is ahead of
    /// the XP total (stale client data).
    pub current_xp: i64,
    /// Width of the current level's XP band. Always positive.
    pub next_level_xp: i64,
    /// Percentage through the level, capped at 100 but not floored at 0.
    pub progress: i64,
}

impl LevelInfo {
    pub fn xp_to_next_level(&self) -> i64 {
        self.next_level_xp - self.current_xp
    }

    /// XP into the level, clamped to the level's band for labels.
    pub fn display_current_xp(&self) -> i64 {
        self.current_xp.clamp(0, self.next_level_xp)
    }

    /// XP still missing, consistent with [`Self::display_current_xp`].
    pub fn display_xp_to_next_level(&self) -> i64 {
        self.next_level_xp - self.display_current_xp()
    }

    /// Progress clamped to `0..=100` for bars and labels.
    pub fn display_progress(&self) -> u8 {
        clamp_percent(self.progress)
    }

    /// Whether the XP total actually falls inside the reported level's band.
    pub fn is_consistent(&self) -> bool {
        self.current_xp >= 0 && self.current_xp < self.next_level_xp
    }
}

/// Cumulative XP required to complete level `n`: `floor(100 * n^1.5)`.
///
/// `n * sqrt(n)` keeps perfect squares exact (`level_threshold(4) == 800`).
pub fn level_threshold(n: u32) -> i64 {
    let n = f64::from(n);
    (BASE_XP * n * n.sqrt()).floor() as i64
}

/// Progress of a player at the backend-reported `level` holding `total_xp`.
///
/// The level is trusted as given; see [`level_for_total_xp`] for what the
/// curve alone would say. Level 0 is read as level 1.
pub fn compute_level_info(level: u32, total_xp: u64) -> LevelInfo {
    let level = if level == 0 {
        log::debug!("level 0 reported, treating as level 1");
        1
    } else {
        level
    };

    let current_level_threshold = if level > 1 {
        level_threshold(level - 1)
    } else {
        0
    };
    let next_level_threshold = level_threshold(level);

    let total_xp = i64::try_from(total_xp).unwrap_or(i64::MAX);
    let current_xp = total_xp.saturating_sub(current_level_threshold);
    let next_level_xp = next_level_threshold - current_level_threshold;
    let progress = ((current_xp as f64 / next_level_xp as f64 * 100.0).floor() as i64).min(100);

    let info = LevelInfo {
        level,
        current_xp,
        next_level_xp,
        progress,
    };

    if !info.is_consistent() {
        log::debug!(
            "level {} does not match {} total xp (curve says level {})",
            level,
            total_xp,
            level_for_total_xp(total_xp.max(0) as u64)
        );
    }

    info
}

/// Level implied by the curve alone: the smallest `L >= 1` with
/// `total_xp < level_threshold(L)`.
pub fn level_for_total_xp(total_xp: u64) -> u32 {
    let xp = i64::try_from(total_xp).unwrap_or(i64::MAX);

    // Start near the closed-form inverse, then settle on the exact integer.
    let estimate = (total_xp as f64 / BASE_XP).powf(2.0 / 3.0).floor();
    let mut cleared = if estimate >= f64::from(u32::MAX - 1) {
        u32::MAX - 1
    } else {
        estimate as u32
    };

    while cleared > 0 && level_threshold(cleared) > xp {
        cleared -= 1;
    }
    while cleared < u32::MAX - 1 && level_threshold(cleared + 1) <= xp {
        cleared += 1;
    }

    cleared + 1
}
