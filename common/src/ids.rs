//! Entity identifiers for EC4X
//!
//! Every entity kind gets its own nominal ID type: IDs are opaque,
//! monotonically assigned by the entity store, ordered, and hashable.
//! Cross-kind references fail at construction because the types do not
//! convert into one another.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Default, Serialize, Deserialize,
            PartialEq, Eq, PartialOrd, Ord, Hash,
        )]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }

            /// The ID following this one in allocation order.
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A house (player empire)
    HouseId, "H"
);
define_id!(
    /// A star system on the map
    SystemId, "S"
);
define_id!(
    /// A fleet of squadrons and spacelift ships
    FleetId, "F"
);
define_id!(
    /// A squadron: flagship plus escorts, the combat unit of engagement
    SquadronId, "Q"
);
define_id!(
    /// An individual ship
    ShipId, "V"
);
define_id!(
    /// A colony on a system's primary world
    ColonyId, "C"
);
define_id!(
    /// A ground unit (army, marine, battery, shield)
    GroundUnitId, "G"
);
define_id!(
    /// An orbital or surface facility (spaceport, shipyard, starbase)
    FacilityId, "B"
);

/// A game instance identifier, assigned by the host.
pub type GameId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_ordered_by_allocation() {
        let a = FleetId::new(1);
        let b = a.next();
        assert!(a < b);
        assert_eq!(b.raw(), 2);
    }

    #[test]
    fn display_uses_kind_prefix() {
        assert_eq!(HouseId::new(3).to_string(), "H3");
        assert_eq!(SystemId::new(12).to_string(), "S12");
        assert_eq!(ShipId::new(7).to_string(), "V7");
    }
}
