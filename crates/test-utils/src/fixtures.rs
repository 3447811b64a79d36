//! Common test fixtures.

/// Configured production locations as (latitude, longitude).
pub const LOCATIONS: [(f64, f64); 4] = [
    (53.908585, 9.193248),
    (53.518114, 9.918907),
    (49.735281, 9.703521),
    (51.160670, 12.410260),
];
