/// Stop ratchet
///
/// **Core Rule:** Stops may tighten, never loosen.
///
/// - Long positions: stop can only rise
/// - Short positions: stop can only fall
use crate::domain::Side;

/// Apply the ratchet to a proposed stop level.
///
/// Returns the level the stop should move to. With no current stop the
/// proposed level is taken as is.
///
/// # Example
/// ```
/// use xbtlab_core::account::ratchet_stop;
/// use xbtlab_core::domain::Side;
///
/// // Tightening: 95 -> 100 (allowed)
/// assert_eq!(ratchet_stop(Side::Long, Some(95.0), 100.0), 100.0);
///
/// // Loosening: 100 -> 90 (blocked, stays at 100)
/// assert_eq!(ratchet_stop(Side::Long, Some(100.0), 90.0), 100.0);
/// ```
pub fn ratchet_stop(side: Side, current: Option<f64>, proposed: f64) -> f64 {
    match current {
        None => proposed,
        Some(current) => match side {
            Side::Long => current.max(proposed),
            Side::Short => current.min(proposed),
        },
    }
}
