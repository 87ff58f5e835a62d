use core::fmt;
use core::num::NonZeroU32;

/// Declares a compact, typed identifier.
///
/// - `u32` keeps tables small (a model holds tens of variables, an NLP
///   thousands of rows)
/// - `NonZero` lets `Option<Id>` stay the size of the id itself
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Create an id from a 0-based position by storing position+1.
            pub fn from_index(index: usize) -> Self {
                let raw = u32::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_add(1))
                    .and_then(NonZeroU32::new);
                match raw {
                    Some(raw) => Self(raw),
                    None => panic!(concat!($tag, " index overflow: {}"), index),
                }
            }

            /// Recover the 0-based position.
            pub fn index(self) -> usize {
                (self.0.get() - 1) as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({})"), self.index())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "{}"), self.index())
            }
        }
    };
}

typed_id!(
    /// Position of a continuous variable in its model's declaration order.
    VarId,
    "v"
);

typed_id!(
    /// Position of a constraint in its model's registration order.
    ConstraintId,
    "c"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip_index() {
        for i in [0_usize, 1, 2, 42, 10_000] {
            assert_eq!(VarId::from_index(i).index(), i);
            assert_eq!(ConstraintId::from_index(i).index(), i);
        }
    }

    #[test]
    fn option_id_is_small() {
        assert_eq!(
            core::mem::size_of::<VarId>(),
            core::mem::size_of::<Option<VarId>>()
        );
    }

    #[test]
    fn display_uses_tag() {
        assert_eq!(VarId::from_index(3).to_string(), "v3");
        assert_eq!(format!("{:?}", ConstraintId::from_index(0)), "c(0)");
    }

    #[test]
    fn ids_order_by_declaration() {
        assert!(VarId::from_index(1) < VarId::from_index(2));
    }
}
