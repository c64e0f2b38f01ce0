//! Flag bit sets for nodes, sockets and graphs
//!
//! Each set is a transparent `u32` newtype so the persisted form stays a plain
//! integer. The scheduler-only node tags ([`NodeFlags::SORT_TAG`] and
//! [`NodeFlags::CYCLE_TAG`]) are transient and stripped before saving.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                const $flag:ident = $value:expr;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            $(
                $(#[$fmeta])*
                pub const $flag: Self = Self($value);
            )*

            const NAMES: &'static [(&'static str, u32)] = &[$((stringify!($flag), $value)),*];

            /// No bits set
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Build a set from raw bits, keeping unknown bits
            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            /// Raw bit value
            pub const fn bits(self) -> u32 {
                self.0
            }

            /// True when no bit is set
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// True when every bit of `other` is set
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// True when any bit of `other` is set
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Set every bit of `other`
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Clear every bit of `other`
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            /// Set or clear every bit of `other`
            pub fn set(&mut self, other: Self, on: bool) {
                if on {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }

            /// Bits set in `self` but not in `other`
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = Self;

            fn not(self) -> Self {
                Self(!self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut names = Vec::new();
                let mut known = 0;
                for (name, bits) in Self::NAMES {
                    if bits.count_ones() == 1 && self.0 & bits != 0 {
                        names.push(*name);
                        known |= bits;
                    }
                }
                write!(f, "{}(", stringify!($name))?;
                write!(f, "{}", names.join(" | "))?;
                let unknown = self.0 & !known;
                if unknown != 0 {
                    if !names.is_empty() {
                        write!(f, " | ")?;
                    }
                    write!(f, "{:#x}", unknown)?;
                }
                write!(f, ")")
            }
        }
    };
}

flag_set! {
    /// Per-node flag bits
    pub struct NodeFlags {
        /// Selected in an editor
        const SELECT = 1;
        /// Node needs execution
        const UPDATE = 2;
        /// Scheduler-only: node fully processed by the current sort
        const SORT_TAG = 4;
        /// Scheduler-only: node is mid-visit
        const CYCLE_TAG = 8;
        /// Skipped by every exec mode
        const DISABLED = 16;
        /// Transient node, never persisted
        const ZOMBIE = 32;
        /// Persisted as a lightweight proxy; the real node is saved by an external owner
        const SAVE_PROXY = 64;
        /// Force socket inheritance for this type and its descendants
        const FORCE_SOCKET_INHERIT = 128;
        /// Force flag inheritance for this type and its descendants
        const FORCE_FLAG_INHERIT = 256;
        /// Both inheritance forcing bits
        const FORCE_INHERIT = 128 | 256;
    }
}

flag_set! {
    /// Per-socket flag bits
    pub struct SocketFlags {
        /// Selected in an editor
        const SELECT = 1;
        /// Socket has a pending, unpropagated change
        const UPDATE = 2;
        /// Socket accepts more than one connection
        const MULTI = 4;
        /// Do not give this output socket MULTI by default
        const NO_MULTI_OUTPUTS = 8;
        /// Hidden from generic editing surfaces
        const PRIVATE = 16;
        /// Editors must not offer a value widget for this socket
        const NO_UI_EDITING = 128;
    }
}

flag_set! {
    /// Graph-level flag bits
    pub struct GraphFlags {
        /// Selected in an editor
        const SELECT = 1;
        /// Cached sortlist is stale
        const RESORT = 2;
        /// Graph may contain cycles
        const CYCLIC_ALLOWED = 4;
        /// Last sort found a cycle
        const CYCLIC = 8;
    }
}

impl NodeFlags {
    /// Bits that only the scheduler uses while sorting or visiting
    pub const SCHEDULER_TAGS: Self = Self(4 | 8);

    /// Flags as they should be persisted
    pub const fn persistent(self) -> Self {
        self.difference(Self::SCHEDULER_TAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_contains() {
        let mut flags = NodeFlags::empty();
        flags.insert(NodeFlags::UPDATE | NodeFlags::SORT_TAG);
        assert!(flags.contains(NodeFlags::UPDATE));
        assert!(flags.intersects(NodeFlags::SCHEDULER_TAGS));

        flags.remove(NodeFlags::SORT_TAG);
        assert!(!flags.intersects(NodeFlags::SCHEDULER_TAGS));

        flags.set(NodeFlags::DISABLED, true);
        assert!(flags.contains(NodeFlags::DISABLED));
        flags.set(NodeFlags::DISABLED, false);
        assert_eq!(flags, NodeFlags::UPDATE);
    }

    #[test]
    fn test_persistent_strips_tags() {
        let flags = NodeFlags::UPDATE | NodeFlags::CYCLE_TAG | NodeFlags::SAVE_PROXY;
        assert_eq!(flags.persistent(), NodeFlags::UPDATE | NodeFlags::SAVE_PROXY);
    }

    #[test]
    fn test_force_inherit_is_union() {
        assert!(NodeFlags::FORCE_INHERIT.contains(NodeFlags::FORCE_SOCKET_INHERIT));
        assert!(NodeFlags::FORCE_INHERIT.contains(NodeFlags::FORCE_FLAG_INHERIT));
    }

    #[test]
    fn test_debug_lists_names() {
        let flags = SocketFlags::MULTI | SocketFlags::from_bits(1 << 20);
        assert_eq!(format!("{:?}", flags), "SocketFlags(MULTI | 0x100000)");
        assert_eq!(format!("{:?}", GraphFlags::empty()), "GraphFlags()");
    }

    #[test]
    fn test_serialized_as_integer() {
        let flags = SocketFlags::MULTI | SocketFlags::PRIVATE;
        assert_eq!(serde_json::to_string(&flags).unwrap(), "20");
    }
}
