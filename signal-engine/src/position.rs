//! R-based position sizing
//!
//! Position size is derived from a fixed fraction of capital at risk per
//! trade (one "R"), scaled by grade. The stop and target are percentage
//! offsets from the entry, so the per-share risk is known up front and the
//! quantity follows from risk / per-share-risk.

use crate::config::PositionConfig;
use common::{Grade, PositionPlan};

pub struct PositionSizer {
    config: PositionConfig,
}

impl PositionSizer {
    pub fn new(config: PositionConfig) -> Self {
        Self { config }
    }

    /// Plan an entry at `entry_price` for the given grade.
    ///
    /// A zero grade multiplier (C by default) or a non-positive entry yields
    /// an empty plan: prices are still filled in so the signal remains
    /// readable, but quantity and exposure are zero.
    pub fn plan(&self, entry_price: f64, grade: Grade) -> PositionPlan {
        let cfg = &self.config;
        let stop_price = entry_price * (1.0 - cfg.stop_loss_pct);
        let target_price = entry_price * (1.0 + cfg.take_profit_pct);
        let r_value = cfg.capital * cfg.r_ratio;

        let multiplier = self.grade_multiplier(grade);
        let per_share_risk = entry_price - stop_price;
        let quantity = if entry_price <= 0.0 || per_share_risk <= 0.0 || multiplier <= 0.0 {
            0
        } else {
            (r_value * multiplier / per_share_risk).floor() as u64
        };

        let position_value = quantity as f64 * entry_price;
        let position_pct = if cfg.capital > 0.0 {
            position_value / cfg.capital * 100.0
        } else {
            0.0
        };

        PositionPlan {
            entry_price,
            stop_price,
            target_price,
            r_value,
            quantity,
            position_value,
            position_pct,
        }
    }

    fn grade_multiplier(&self, grade: Grade) -> f64 {
        match grade {
            Grade::S => self.config.r_mult_s,
            Grade::A => self.config.r_mult_a,
            Grade::B => self.config.r_mult_b,
            Grade::C => self.config.r_mult_c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::new(PositionConfig::default())
    }

    #[test]
    fn a_grade_sizing_from_defaults() {
        // Capital 100M, 0.5% risk -> R = 500,000 KRW. Entry 50,000 with a 3%
        // stop risks 1,500 per share, so an A grade (1.0x) buys 333 shares.
        let plan = sizer().plan(50_000.0, Grade::A);

        assert_eq!(plan.quantity, 333);
        assert!((plan.stop_price - 48_500.0).abs() < 1e-6);
        assert!((plan.target_price - 52_500.0).abs() < 1e-6);
        assert!((plan.r_value - 500_000.0).abs() < 1e-6);
        assert!((plan.position_value - 333.0 * 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn grade_scales_the_quantity() {
        let sizer = sizer();
        let s = sizer.plan(50_000.0, Grade::S);
        let a = sizer.plan(50_000.0, Grade::A);
        let b = sizer.plan(50_000.0, Grade::B);

        assert_eq!(s.quantity, 500); // 1.5x
        assert_eq!(a.quantity, 333);
        assert_eq!(b.quantity, 166); // 0.5x
        assert!(s.position_pct > a.position_pct);
        assert!(a.position_pct > b.position_pct);
    }

    #[test]
    fn c_grade_gets_an_empty_plan_with_prices() {
        let plan = sizer().plan(50_000.0, Grade::C);

        assert_eq!(plan.quantity, 0);
        assert_eq!(plan.position_value, 0.0);
        assert_eq!(plan.position_pct, 0.0);
        // Prices are still meaningful for the reader.
        assert!(plan.stop_price > 0.0);
        assert!(plan.target_price > plan.entry_price);
    }

    #[test]
    fn non_positive_entry_is_harmless() {
        let plan = sizer().plan(0.0, Grade::S);
        assert_eq!(plan.quantity, 0);
        assert_eq!(plan.position_value, 0.0);
    }
}
