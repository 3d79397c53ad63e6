//! Grid connection point power balance.

use crate::devices::Device;

/// Result of the balance at the connection point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBalance {
    /// Net import in kW (negative = export).
    pub power_kw: f64,
    pub over_limit: bool,
}

/// Tolerance above the limit before `over_limit` trips (kW).
const LIMIT_EPS_KW: f64 = 1e-6;

/// Sums [`Device::grid_kw`] over `devices`: loads add, generation and
/// storage discharge subtract.
pub fn net_grid_kw<'a>(devices: impl IntoIterator<Item = &'a dyn Device>) -> f64 {
    devices.into_iter().map(|d| d.grid_kw()).sum()
}

/// Computes the balance at the connection point from the net import.
///
/// With the grid unavailable the connection carries nothing and can never
/// be over its limit. A non-finite net degrades to zero.
///
/// # Examples
///
/// ```
/// use plant_sim::sim::power_balance::grid_balance;
///
/// let b = grid_balance(15.0, true, 10.0);
/// assert_eq!(b.power_kw, 15.0);
/// assert!(b.over_limit);
/// ```
pub fn grid_balance(net_kw: f64, available: bool, limit_kw: f64) -> GridBalance {
    if !available {
        return GridBalance {
            power_kw: 0.0,
            over_limit: false,
        };
    }
    let power_kw = if net_kw.is_finite() { net_kw } else { 0.0 };
    GridBalance {
        power_kw,
        over_limit: power_kw > limit_kw + LIMIT_EPS_KW,
    }
}
