//! Handle types for arena storage.
//!
//! Using `NonZeroU32` enables `Option<T>` niche optimization (no extra space).

use core::num::NonZeroU32;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Create from a 0-based index.
            ///
            /// Arenas never grow past `u32::MAX - 1` entries; [`crate::limits::Limits`]
            /// caps them far below that.
            #[must_use]
            pub fn from_index(index: usize) -> Self {
                let raw = u32::try_from(index + 1).unwrap_or(u32::MAX);
                Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MAX))
            }

            /// Get the 0-based index.
            #[must_use]
            pub const fn to_index(self) -> usize {
                (self.0.get() - 1) as usize
            }
        }
    };
}

define_id!(
    /// Module identifier.
    ModuleId
);

define_id!(
    /// Schema node identifier.
    NodeId
);

define_id!(
    /// Typedef identifier.
    TypedefId
);

define_id!(
    /// Identity identifier.
    IdentityId
);

define_id!(
    /// Feature identifier.
    FeatureId
);

define_id!(
    /// Data node identifier, local to one [`crate::data::DataTree`].
    DataId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        let id = NodeId::from_index(0);
        assert_eq!(id.to_index(), 0);
        let id = NodeId::from_index(41);
        assert_eq!(id.to_index(), 41);
    }

    #[test]
    fn test_option_niche() {
        assert_eq!(
            std::mem::size_of::<Option<NodeId>>(),
            std::mem::size_of::<NodeId>()
        );
    }
}
